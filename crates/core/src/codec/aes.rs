//! AES-CBC primitives for the AESV2/AESV3 crypt methods and the R6 hash.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

use crate::error::{PdfError, Result};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;
type Aes256CbcEnc = Encryptor<aes::Aes256>;

pub const AES_BLOCK: usize = 16;

/// Decrypt `data` with AES-CBC, no padding removal.
///
/// The key selects AES-128 (16 bytes) or AES-256 (32 bytes). `data` must
/// be a whole number of blocks.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % AES_BLOCK != 0 {
        return Err(PdfError::DecodeError(format!(
            "AES ciphertext of {} bytes is not block aligned",
            data.len()
        )));
    }
    let mut buf = data.to_vec();
    let len = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| PdfError::DecodeError(e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| PdfError::InvalidPadding)?
            .len(),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| PdfError::DecodeError(e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| PdfError::InvalidPadding)?
            .len(),
        n => {
            return Err(PdfError::DecodeError(format!(
                "AES key must be 16 or 32 bytes, got {n}"
            )));
        }
    };
    buf.truncate(len);
    Ok(buf)
}

/// Encrypt whole blocks with AES-CBC, no padding added.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % AES_BLOCK != 0 {
        return Err(PdfError::DecodeError(format!(
            "AES plaintext of {} bytes is not block aligned",
            data.len()
        )));
    }
    let mut buf = data.to_vec();
    let len = data.len();
    let written = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|e| PdfError::DecodeError(e.to_string()))?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(|_| PdfError::DecodeError("AES encryption failed".into()))?
            .len(),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|e| PdfError::DecodeError(e.to_string()))?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(|_| PdfError::DecodeError("AES encryption failed".into()))?
            .len(),
        n => {
            return Err(PdfError::DecodeError(format!(
                "AES key must be 16 or 32 bytes, got {n}"
            )));
        }
    };
    buf.truncate(written);
    Ok(buf)
}

/// Strip PKCS#7 padding.
///
/// Fails with `InvalidPadding` when the last byte is 0 or larger than a
/// block, or when the padding bytes disagree.
pub fn unpad_aes(data: &[u8]) -> Result<&[u8]> {
    let Some(&last) = data.last() else {
        return Err(PdfError::InvalidPadding);
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > AES_BLOCK || pad_len > data.len() {
        return Err(PdfError::InvalidPadding);
    }
    let start = data.len() - pad_len;
    if data[start..].iter().any(|&b| b as usize != pad_len) {
        return Err(PdfError::InvalidPadding);
    }
    Ok(&data[..start])
}

/// Append PKCS#7 padding.
pub fn pad_aes(data: &[u8]) -> Vec<u8> {
    let pad_len = AES_BLOCK - data.len() % AES_BLOCK;
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}
