//! Document layer: cross-reference loading, the standard security
//! handler, object decryption and rewriting.
//!
//! - `xref` - classic tables, xref streams and the recovery scan
//! - `catalog` - object loading and the reachable object graph (PDFDocument)
//! - `security` - key derivation and password verification
//! - `saslprep` - RFC 4013 SASLprep for revision 6 passwords
//! - `decrypt` - per-object string and stream decryption
//! - `writer` - serialization of the decrypted graph

pub mod catalog;
pub mod decrypt;
pub mod saslprep;
pub mod security;
pub mod writer;
pub mod xref;

pub use catalog::{PDFDocument, decode_stream};
pub use decrypt::{ObjectDecryptor, object_key};
pub use saslprep::saslprep;
pub use security::{
    CryptMethod, EncryptionDict, FileKey, Md5SecurityHandler, PASSWORD_PADDING, SecurityHandler,
    Sha2SecurityHandler, create_security_handler, derive_key, pad_password, password_hash, verify,
};
pub use writer::write_document;
pub use xref::{XRef, XRefEntry};
