//! Directory-wide unlocking with per-file failure isolation.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::api::high_level::{UnlockOptions, default_thread_count, unlock_file};
use crate::credentials::Credentials;
use crate::error::{ErrorKind, PdfError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Worker count; defaults to the available parallelism
    pub threads: Option<usize>,
    pub unlock: UnlockOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Unlocked {
        output: PathBuf,
        was_encrypted: bool,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl FileOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Unlocked { .. })
    }
}

/// Totals plus one outcome per enumerated file, keyed by path relative
/// to the input root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub processed: usize,
    pub failed: usize,
    pub outcomes: BTreeMap<PathBuf, FileOutcome>,
}

/// `*.pdf` files under `root` (extension compared case-insensitively),
/// as sorted paths relative to `root`.
pub fn enumerate_documents(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| PdfError::Io(io::Error::from(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_pdf = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            found.push(relative.to_path_buf());
        }
    }
    found.sort();
    Ok(found)
}

/// Unlock every document under `input_root` into the mirrored path under
/// `output_root`.
///
/// Enumeration and pool setup errors are returned; everything that goes
/// wrong with an individual file, panics included, is recorded in its
/// outcome.
pub fn run_batch(
    input_root: &Path,
    output_root: &Path,
    credentials: &Credentials,
    options: &BatchOptions,
) -> Result<BatchResult> {
    let files = enumerate_documents(input_root, options.recursive)?;
    fs::create_dir_all(output_root)?;
    debug!(files = files.len(), root = %input_root.display(), "enumerated batch");

    let pool = ThreadPoolBuilder::new()
        .num_threads(options.threads.unwrap_or_else(default_thread_count))
        .build()
        .map_err(|e| PdfError::Io(io::Error::other(e)))?;

    let processed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let log: Mutex<Vec<(PathBuf, FileOutcome)>> = Mutex::new(Vec::with_capacity(files.len()));

    pool.install(|| {
        files.par_iter().for_each(|relative| {
            let input = input_root.join(relative);
            let output = output_root.join(relative);
            let outcome = process_file(&input, &output, credentials, &options.unlock);
            if outcome.is_success() {
                processed.fetch_add(1, Ordering::Relaxed);
            } else {
                failed.fetch_add(1, Ordering::Relaxed);
            }
            log.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((relative.clone(), outcome));
        });
    });

    let result = BatchResult {
        processed: processed.into_inner(),
        failed: failed.into_inner(),
        outcomes: log
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect(),
    };
    info!(
        processed = result.processed,
        failed = result.failed,
        "batch finished"
    );
    Ok(result)
}

fn process_file(
    input: &Path,
    output: &Path,
    credentials: &Credentials,
    options: &UnlockOptions,
) -> FileOutcome {
    let attempt = catch_unwind(AssertUnwindSafe(|| {
        unlock_file(input, output, credentials, options)
    }));
    match attempt {
        Ok(Ok(outcome)) => {
            debug!(input = %input.display(), "unlocked");
            FileOutcome::Unlocked {
                output: output.to_path_buf(),
                was_encrypted: outcome.was_encrypted,
            }
        }
        Ok(Err(e)) => {
            warn!(input = %input.display(), error = %e, "failed to unlock");
            FileOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            }
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".into());
            warn!(input = %input.display(), %message, "worker panicked");
            FileOutcome::Failed {
                kind: ErrorKind::Internal,
                message,
            }
        }
    }
}
