//! Fluent configuration for unlocking.
//!
//! # Example
//! ```ignore
//! use pdfunlock_core::api::UnlockerBuilder;
//!
//! let unlocker = UnlockerBuilder::new()
//!     .candidates(["letmein", "hunter2"])
//!     .parallel_search(Some(4))
//!     .timeout(std::time::Duration::from_secs(30))
//!     .build();
//! let outcome = unlocker.unlock_file("locked.pdf".as_ref(), "open.pdf".as_ref())?;
//! ```

use std::path::Path;
use std::time::Duration;

use crate::credentials::{CredentialProvider, Credentials};
use crate::error::Result;
use crate::search::SearchStrategy;

use super::high_level::{UnlockOptions, UnlockOutcome, unlock_bytes, unlock_file};

/// Builder for an [`Unlocker`]. Without credentials the empty password
/// is used.
#[derive(Debug, Clone, Default)]
pub struct UnlockerBuilder {
    credentials: Option<Credentials>,
    options: UnlockOptions,
}

impl UnlockerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a single password.
    pub fn password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.credentials = Some(Credentials::Password(password.as_ref().to_vec()));
        self
    }

    /// Search these candidates in order.
    pub fn candidates<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        self.credentials = Some(Credentials::Candidates(
            candidates.into_iter().map(|p| p.as_ref().to_vec()).collect(),
        ));
        self
    }

    /// Resolve credentials from a provider now.
    pub fn provider(mut self, provider: &dyn CredentialProvider) -> Result<Self> {
        self.credentials = Some(Credentials::from_provider(provider)?);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Evaluate candidates concurrently; `None` uses every core.
    pub fn parallel_search(mut self, threads: Option<usize>) -> Self {
        self.options.search = SearchStrategy::Parallel { threads };
        self
    }

    pub fn options(mut self, options: UnlockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Unlocker {
        Unlocker {
            credentials: self
                .credentials
                .unwrap_or_else(|| Credentials::Password(Vec::new())),
            options: self.options,
        }
    }
}

/// Credentials and options bound together.
#[derive(Debug, Clone)]
pub struct Unlocker {
    credentials: Credentials,
    options: UnlockOptions,
}

impl Unlocker {
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub const fn options(&self) -> &UnlockOptions {
        &self.options
    }

    pub fn unlock_bytes(&self, data: &[u8]) -> Result<UnlockOutcome> {
        unlock_bytes(data, &self.credentials, &self.options)
    }

    pub fn unlock_file(&self, input: &Path, output: &Path) -> Result<UnlockOutcome> {
        unlock_file(input, output, &self.credentials, &self.options)
    }
}
