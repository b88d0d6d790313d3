//! Batch driver: discover stream files and run the pipeline over each.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use triad_analysis::{FileReport, MatchPipeline};
use triad_core::{BatchConfig, Config, CorrectedKickoff, Error, MatchRecord, Result};

use crate::summary::RunSummary;

/// A file that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {message}", .path.display())]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

impl FileFailure {
    fn new(path: &Path, error: impl std::fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

/// Report of one file that was processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub path: PathBuf,
    pub report: FileReport,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Per-file reports in discovery order.
    pub reports: Vec<ProcessedFile>,
    pub summary: RunSummary,
    pub failures: Vec<FileFailure>,
}

impl BatchResult {
    /// Records in discovery order.
    pub fn records(&self) -> impl Iterator<Item = &MatchRecord> {
        self.reports.iter().filter_map(|f| f.report.outcome.record())
    }

    /// Files whose kick-off was corrected, with the correction applied.
    pub fn corrections(&self) -> impl Iterator<Item = (&Path, &CorrectedKickoff)> {
        self.reports.iter().filter_map(|f| {
            f.report
                .correction
                .as_ref()
                .filter(|c| c.applied)
                .map(|c| (f.path.as_path(), c))
        })
    }
}

/// Runs the match pipeline over every stream file under an input root.
#[derive(Debug, Clone)]
pub struct BatchDriver {
    batch: BatchConfig,
    pipeline: MatchPipeline,
}

impl BatchDriver {
    /// Create a new driver.
    pub fn new(config: &Config) -> Self {
        Self {
            batch: config.batch.clone(),
            pipeline: MatchPipeline::new(config),
        }
    }

    /// Stream files under `root`, recursively, in sorted order.
    ///
    /// A missing or unreadable root is an error; unreadable subdirectories
    /// are skipped with a warning.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(Error::input_root(format!(
                "{} is not a readable directory",
                root.display()
            )));
        }
        let entries = fs::read_dir(root)
            .map_err(|e| Error::input_root(format!("{}: {e}", root.display())))?;

        let mut files = Vec::new();
        let mut pending: Vec<PathBuf> = Vec::new();
        self.collect_entries(entries, &mut files, &mut pending);

        while let Some(dir) = pending.pop() {
            match fs::read_dir(&dir) {
                Ok(entries) => self.collect_entries(entries, &mut files, &mut pending),
                Err(e) => warn!("Skipping unreadable directory {}: {e}", dir.display()),
            }
        }

        files.sort();
        Ok(files)
    }

    fn collect_entries(
        &self,
        entries: fs::ReadDir,
        files: &mut Vec<PathBuf>,
        pending: &mut Vec<PathBuf>,
    ) {
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
            } else if !self.is_skipped(&path) {
                files.push(path);
            }
        }
    }

    fn is_skipped(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.batch
            .skip_extensions
            .iter()
            .any(|suffix| name.ends_with(&suffix.to_lowercase()))
    }

    /// Run the pipeline over one file.
    pub fn process_file(&self, path: &Path) -> std::result::Result<FileReport, FileFailure> {
        let file = File::open(path).map_err(|e| FileFailure::new(path, e))?;
        self.pipeline
            .process_reader(BufReader::new(file))
            .map_err(|e| FileFailure::new(path, e))
    }

    /// Process every file under `root` and reduce the results.
    pub fn run(&self, root: &Path) -> Result<BatchResult> {
        let files = self.discover(root)?;
        info!("Found {} files under {}", files.len(), root.display());

        let results = self.process_all(&files)?;

        let mut batch = BatchResult::default();
        for (path, result) in files.into_iter().zip(results) {
            batch.summary.record(&result);
            match result {
                Ok(report) => batch.reports.push(ProcessedFile { path, report }),
                Err(failure) => {
                    warn!("Error processing {failure}");
                    batch.failures.push(failure);
                }
            }
        }

        Ok(batch)
    }

    fn process_all(
        &self,
        files: &[PathBuf],
    ) -> Result<Vec<std::result::Result<FileReport, FileFailure>>> {
        let done = AtomicUsize::new(0);
        let total = files.len();
        let process = |path: &PathBuf| {
            debug!("Processing {}", path.display());
            let result = self.process_file(path);
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if self.batch.progress_every > 0 && n % self.batch.progress_every == 0 {
                info!("Processed {n}/{total} files");
            }
            result
        };

        match self.batch.workers {
            1 => Ok(files.iter().map(process).collect()),
            0 => Ok(files.par_iter().map(process).collect()),
            workers => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| Error::config(format!("worker pool: {e}")))?;
                Ok(pool.install(|| files.par_iter().map(process).collect()))
            }
        }
    }
}
