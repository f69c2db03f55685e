//! Where passwords come from.
//!
//! The unlock pipeline never prompts or reads files itself; it asks a
//! [`CredentialProvider`] once and works from the resulting
//! [`Credentials`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{PdfError, Result};

/// Candidates tried by `--try-common`, in order.
pub const COMMON_PASSWORDS: [&str; 15] = [
    "password",
    "123456",
    "admin",
    "1234",
    "12345",
    "password123",
    "admin123",
    "pdf",
    "pass",
    "0000",
    "1111",
    "2222",
    "9999",
    "qwerty",
    "abc123",
];

/// Source of a single password or of a candidate list.
pub trait CredentialProvider {
    /// A single password, or `None` when this provider supplies a list.
    fn provide_password(&self) -> Result<Option<Vec<u8>>>;

    /// Ordered candidates for a search.
    fn provide_password_list(&self) -> Result<Vec<Vec<u8>>>;
}

/// Resolved credentials for one run.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(Vec<u8>),
    Candidates(Vec<Vec<u8>>),
}

impl Credentials {
    /// Ask `provider` once: a single password wins over a list.
    pub fn from_provider(provider: &dyn CredentialProvider) -> Result<Self> {
        match provider.provide_password()? {
            Some(password) => Ok(Self::Password(password)),
            None => Ok(Self::Candidates(provider.provide_password_list()?)),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(..)"),
            Self::Candidates(list) => write!(f, "Candidates({} entries)", list.len()),
        }
    }
}

#[derive(Clone)]
pub struct StaticPassword(pub Vec<u8>);

impl StaticPassword {
    pub fn new(password: impl AsRef<[u8]>) -> Self {
        Self(password.as_ref().to_vec())
    }
}

impl CredentialProvider for StaticPassword {
    fn provide_password(&self) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.0.clone()))
    }

    fn provide_password_list(&self) -> Result<Vec<Vec<u8>>> {
        Ok(vec![self.0.clone()])
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasswordList(pub Vec<Vec<u8>>);

impl PasswordList {
    pub fn new<I, P>(passwords: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        Self(passwords.into_iter().map(|p| p.as_ref().to_vec()).collect())
    }
}

impl CredentialProvider for PasswordList {
    fn provide_password(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn provide_password_list(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.0.clone())
    }
}

/// Candidates read from a UTF-8 file, one per line.
#[derive(Debug, Clone)]
pub struct PasswordListFile(pub PathBuf);

impl PasswordListFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().to_path_buf())
    }
}

impl CredentialProvider for PasswordListFile {
    fn provide_password(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn provide_password_list(&self) -> Result<Vec<Vec<u8>>> {
        let raw = fs::read(&self.0)?;
        let text = String::from_utf8(raw).map_err(|e| {
            PdfError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: {e}", self.0.display()),
            ))
        })?;
        Ok(parse_password_list(&text))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommonPasswords;

impl CredentialProvider for CommonPasswords {
    fn provide_password(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn provide_password_list(&self) -> Result<Vec<Vec<u8>>> {
        Ok(COMMON_PASSWORDS.iter().map(|p| p.as_bytes().to_vec()).collect())
    }
}

/// Trimmed lines; blank lines are skipped.
pub fn parse_password_list(text: &str) -> Vec<Vec<u8>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.as_bytes().to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn list_file_trims_and_skips_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "  first \n\n second\r\n\t\nthird").unwrap();
        let list = PasswordListFile::new(file.path())
            .provide_password_list()
            .unwrap();
        assert_eq!(list, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
    }

    #[test]
    fn missing_list_file_is_io() {
        let err = PasswordListFile::new("/nonexistent/list.txt")
            .provide_password_list()
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn single_password_wins() {
        let creds = Credentials::from_provider(&StaticPassword::new("pw")).unwrap();
        assert_eq!(creds, Credentials::Password(b"pw".to_vec()));
        let creds = Credentials::from_provider(&CommonPasswords).unwrap();
        let Credentials::Candidates(list) = creds else {
            panic!("expected candidates");
        };
        assert_eq!(list.len(), 15);
        assert_eq!(list[0], b"password");
    }
}
