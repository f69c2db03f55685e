//! Public entry points for unlocking documents.
//!
//! # Example
//!
//! ```ignore
//! use pdfunlock_core::api::{unlock_bytes, UnlockOptions};
//! use pdfunlock_core::credentials::Credentials;
//!
//! let bytes = std::fs::read("locked.pdf")?;
//! let creds = Credentials::Password(b"secret".to_vec());
//! let outcome = unlock_bytes(&bytes, &creds, &UnlockOptions::default())?;
//! std::fs::write("unlocked.pdf", outcome.data)?;
//! ```

pub mod builder;
pub mod high_level;

pub use builder::{Unlocker, UnlockerBuilder};
pub use high_level::{
    EncryptionStatus, UnlockOptions, UnlockOutcome, check_encryption, check_encryption_file,
    default_thread_count, unlock, unlock_bytes, unlock_file,
};
