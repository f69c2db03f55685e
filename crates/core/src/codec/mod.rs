//! Ciphers and stream decoders needed to unlock a document.
//!
//! - `aes`: AES-CBC for AESV2/AESV3 and the R6 hash
//! - `arcfour`: RC4 for V1/V2 crypt methods
//! - `flate`: FlateDecode with PNG predictors

pub mod aes;
pub mod arcfour;
pub mod flate;

pub use aes::{aes_cbc_decrypt, aes_cbc_encrypt, pad_aes, unpad_aes};
pub use arcfour::Arcfour;
pub use flate::{PredictorParams, apply_predictor, flate_decode};
