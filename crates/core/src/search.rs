//! Ordered password search: the lowest-index candidate that verifies
//! wins, whatever the evaluation strategy.

use std::io;
use std::path::Path;
use std::time::Instant;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::debug;

use crate::api::high_level::default_thread_count;
use crate::document::{PDFDocument, SecurityHandler, create_security_handler};
use crate::error::{PdfError, Result};

/// Anything that can say whether a password opens a document.
///
/// `Ok(false)` is a wrong password; `Err` stops the search.
pub trait PasswordVerifier: Sync {
    fn check(&self, password: &[u8]) -> Result<bool>;
}

impl<H: SecurityHandler + ?Sized> PasswordVerifier for H {
    fn check(&self, password: &[u8]) -> Result<bool> {
        match self.authenticate(password) {
            Ok(_) => Ok(true),
            Err(e) if !e.is_fatal_for_search() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    /// Position in the candidate list
    pub index: usize,
    pub password: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// One candidate at a time, stopping at the first match.
    #[default]
    Sequential,
    /// Candidates evaluated concurrently on a rayon pool. Candidates past
    /// the first match may be tried.
    Parallel { threads: Option<usize> },
}

/// Sequential search with no deadline.
pub fn search<V: PasswordVerifier + ?Sized>(
    verifier: &V,
    candidates: &[Vec<u8>],
) -> Result<Option<SearchMatch>> {
    search_with(verifier, candidates, SearchStrategy::Sequential, None)
}

pub fn search_with<V: PasswordVerifier + ?Sized>(
    verifier: &V,
    candidates: &[Vec<u8>],
    strategy: SearchStrategy,
    deadline: Option<Instant>,
) -> Result<Option<SearchMatch>> {
    let found = match strategy {
        SearchStrategy::Sequential => search_sequential(verifier, candidates, deadline)?,
        SearchStrategy::Parallel { threads } => {
            search_parallel(verifier, candidates, threads, deadline)?
        }
    };
    match &found {
        Some(m) => debug!(index = m.index, "password found"),
        None => debug!(candidates = candidates.len(), "no candidate matched"),
    }
    Ok(found)
}

/// Open `path` and search its password.
///
/// A document without encryption accepts any password, so the first
/// candidate matches.
pub fn search_file(path: impl AsRef<Path>, candidates: &[Vec<u8>]) -> Result<Option<SearchMatch>> {
    let data = std::fs::read(path.as_ref())?;
    let doc = PDFDocument::new(&data)?;
    let Some(dict) = doc.encryption_dict()? else {
        return Ok(candidates.first().map(|password| SearchMatch {
            index: 0,
            password: password.clone(),
        }));
    };
    let handler = create_security_handler(dict)?;
    search(&*handler, candidates)
}

fn check_deadline(deadline: Option<Instant>, tried: usize) -> Result<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(PdfError::DeadlineExceeded(tried)),
        _ => Ok(()),
    }
}

fn search_sequential<V: PasswordVerifier + ?Sized>(
    verifier: &V,
    candidates: &[Vec<u8>],
    deadline: Option<Instant>,
) -> Result<Option<SearchMatch>> {
    for (index, candidate) in candidates.iter().enumerate() {
        check_deadline(deadline, index)?;
        if verifier.check(candidate)? {
            return Ok(Some(SearchMatch {
                index,
                password: candidate.clone(),
            }));
        }
    }
    Ok(None)
}

fn search_parallel<V: PasswordVerifier + ?Sized>(
    verifier: &V,
    candidates: &[Vec<u8>],
    threads: Option<usize>,
    deadline: Option<Instant>,
) -> Result<Option<SearchMatch>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.unwrap_or_else(default_thread_count))
        .build()
        .map_err(|e| PdfError::Io(io::Error::other(e)))?;

    // find_map_first keeps the lowest index among all Some results, so an
    // error at index i only wins over a match at j > i.
    pool.install(|| {
        candidates
            .par_iter()
            .enumerate()
            .find_map_first(|(index, candidate)| {
                if let Err(e) = check_deadline(deadline, index) {
                    return Some(Err(e));
                }
                match verifier.check(candidate) {
                    Ok(true) => Some(Ok(SearchMatch {
                        index,
                        password: candidate.clone(),
                    })),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                }
            })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static [u8]);

    impl PasswordVerifier for Fixed {
        fn check(&self, password: &[u8]) -> Result<bool> {
            Ok(password == self.0)
        }
    }

    fn list(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn empty_list_is_no_match() {
        assert_eq!(search(&Fixed(b"x"), &[]).unwrap(), None);
    }

    #[test]
    fn duplicates_report_first_index() {
        let found = search(&Fixed(b"b"), &list(&["a", "b", "b"])).unwrap().unwrap();
        assert_eq!(found.index, 1);
    }

    #[test]
    fn parallel_returns_lowest_index() {
        let candidates = list(&["a", "b", "c", "b", "b", "d", "b"]);
        for _ in 0..20 {
            let found = search_with(
                &Fixed(b"b"),
                &candidates,
                SearchStrategy::Parallel { threads: Some(4) },
                None,
            )
            .unwrap()
            .unwrap();
            assert_eq!(found.index, 1);
        }
    }

    #[test]
    fn expired_deadline_stops_search() {
        let err = search_with(
            &Fixed(b"b"),
            &list(&["a", "b"]),
            SearchStrategy::Sequential,
            Some(Instant::now()),
        )
        .unwrap_err();
        assert!(matches!(err, PdfError::DeadlineExceeded(0)));
    }
}
