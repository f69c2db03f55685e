//! pdfunlock - remove standard-handler encryption from PDF files.
//!
//! The pipeline parses the cross-reference chain, verifies a password
//! (or searches a candidate list), decrypts every reachable object and
//! writes a plaintext copy with the `/Encrypt` entry gone.

pub mod api;
pub mod batch;
pub mod codec;
pub mod credentials;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;
pub mod search;

pub use api::high_level;
pub use document::catalog as pdfdocument;
pub use document::security;

pub use error::{ErrorKind, PdfError, Result};
