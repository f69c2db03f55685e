//! Single-file unlock pipeline: parse, authenticate, decrypt, rewrite.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::credentials::Credentials;
use crate::document::{
    EncryptionDict, FileKey, ObjectDecryptor, PDFDocument, SecurityHandler,
    create_security_handler, write_document,
};
use crate::error::{PdfError, Result};
use crate::model::objects::PDFDict;
use crate::search::{PasswordVerifier, SearchStrategy, search_with};

pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Per-file knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockOptions {
    /// Abort a file that takes longer than this.
    pub timeout: Option<Duration>,
    /// How candidate lists are searched.
    pub search: SearchStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionStatus {
    NotEncrypted,
    Encrypted {
        filter: String,
        v: i64,
        r: i64,
        key_length_bits: usize,
    },
}

impl EncryptionStatus {
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted { .. })
    }
}

impl fmt::Display for EncryptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEncrypted => f.write_str("not encrypted"),
            Self::Encrypted {
                filter,
                v,
                r,
                key_length_bits,
            } => write!(
                f,
                "encrypted (/{filter}, V={v}, R={r}, {key_length_bits}-bit key)"
            ),
        }
    }
}

/// Result of unlocking one document.
#[derive(Debug, Clone)]
pub struct UnlockOutcome {
    /// The rewritten, unencrypted file
    pub data: Vec<u8>,
    pub was_encrypted: bool,
    /// Index of the matching candidate when a list was searched
    pub password_index: Option<usize>,
    /// Number of objects written
    pub objects: usize,
}

/// Report whether `data` is encrypted without trying any password.
pub fn check_encryption(data: &[u8]) -> Result<EncryptionStatus> {
    let doc = PDFDocument::new(data)?;
    let Some(dict) = doc.encrypt_dict()? else {
        return Ok(EncryptionStatus::NotEncrypted);
    };
    let int = |d: &PDFDict, key: &str| d.get(key).and_then(|v| v.as_integral().ok());
    let key_length_bits = match EncryptionDict::from_dict(&dict, &doc.document_id()) {
        Ok(parsed) => parsed.length_bits,
        Err(_) => int(&dict, "Length")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(40),
    };
    Ok(EncryptionStatus::Encrypted {
        filter: dict
            .get("Filter")
            .and_then(|f| f.as_name().ok())
            .unwrap_or_default()
            .to_string(),
        v: int(&dict, "V").unwrap_or(0),
        r: int(&dict, "R").unwrap_or(0),
        key_length_bits,
    })
}

pub fn check_encryption_file(path: impl AsRef<Path>) -> Result<EncryptionStatus> {
    check_encryption(&fs::read(path.as_ref())?)
}

/// Unlock a document held in memory.
///
/// A plaintext document is rewritten as well; `was_encrypted` tells the
/// two apart. A candidate list that yields no match is
/// [`PdfError::IncorrectPassword`].
pub fn unlock_bytes(
    data: &[u8],
    credentials: &Credentials,
    options: &UnlockOptions,
) -> Result<UnlockOutcome> {
    let deadline = options.timeout.map(|t| Instant::now() + t);
    let doc = PDFDocument::new(data)?;

    let (decryptor, password_index) = match doc.encryption_dict()? {
        None => {
            debug!("document is not encrypted");
            (None, None)
        }
        Some(dict) => {
            let handler = create_security_handler(dict.clone())?;
            let (key, index) = match credentials {
                Credentials::Password(password) => (handler.authenticate(password)?, None),
                Credentials::Candidates(candidates) => {
                    let (key, index) =
                        find_key(&*handler, candidates, options.search, deadline)?;
                    (key, Some(index))
                }
            };
            debug!(v = dict.v, r = dict.r, key = ?key, "file key derived");
            (Some(ObjectDecryptor::new(key, dict)), index)
        }
    };

    let objects = doc.materialize(decryptor.as_ref(), deadline)?;
    let data = write_document(doc.version(), &objects, doc.trailer());
    Ok(UnlockOutcome {
        data,
        was_encrypted: decryptor.is_some(),
        password_index,
        objects: objects.len(),
    })
}

/// Verifier that keeps the file key of each accepted password.
struct KeyCapture<'a> {
    handler: &'a dyn SecurityHandler,
    accepted: Mutex<Vec<(Vec<u8>, FileKey)>>,
}

impl PasswordVerifier for KeyCapture<'_> {
    fn check(&self, password: &[u8]) -> Result<bool> {
        match self.handler.authenticate(password) {
            Ok(key) => {
                self.accepted
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((password.to_vec(), key));
                Ok(true)
            }
            Err(e) if !e.is_fatal_for_search() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Search `candidates` and return the file key of the winner with its
/// index. The key comes from the search itself.
fn find_key(
    handler: &dyn SecurityHandler,
    candidates: &[Vec<u8>],
    strategy: SearchStrategy,
    deadline: Option<Instant>,
) -> Result<(FileKey, usize)> {
    let capture = KeyCapture {
        handler,
        accepted: Mutex::new(Vec::new()),
    };
    let found = search_with(&capture, candidates, strategy, deadline)?
        .ok_or(PdfError::IncorrectPassword)?;
    let accepted = capture
        .accepted
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    let key = match accepted.into_iter().find(|(p, _)| *p == found.password) {
        Some((_, key)) => key,
        None => handler.authenticate(&found.password)?,
    };
    Ok((key, found.index))
}

/// Unlock with a single password.
pub fn unlock(data: &[u8], password: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let credentials = Credentials::Password(password.as_ref().to_vec());
    Ok(unlock_bytes(data, &credentials, &UnlockOptions::default())?.data)
}

/// Unlock `input` into `output`, creating parent directories. Nothing is
/// written unless unlocking succeeds.
pub fn unlock_file(
    input: &Path,
    output: &Path,
    credentials: &Credentials,
    options: &UnlockOptions,
) -> Result<UnlockOutcome> {
    let data = fs::read(input)?;
    let outcome = unlock_bytes(&data, credentials, options)?;
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &outcome.data)?;
    debug!(
        input = %input.display(),
        output = %output.display(),
        objects = outcome.objects,
        "wrote unlocked document"
    );
    Ok(outcome)
}
