//! Per-object decryption of strings and streams.

use crate::codec::aes::{AES_BLOCK, aes_cbc_decrypt, unpad_aes};
use crate::codec::arcfour::Arcfour;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObject, PDFStream};

use super::security::{CryptMethod, EncryptionDict, FileKey};

/// Key for one object: MD5 of the file key, the low three bytes of the
/// object number and the low two bytes of the generation (plus `sAlT` for
/// AES-128), truncated to `min(n + 5, 16)`. AES-256 uses the file key.
pub fn object_key(file_key: &[u8], objid: u32, genno: u32, method: CryptMethod) -> Vec<u8> {
    if method == CryptMethod::AesV3 {
        return file_key.to_vec();
    }
    let mut context = md5::Context::new();
    context.consume(file_key);
    context.consume(&objid.to_le_bytes()[..3]);
    context.consume(&genno.to_le_bytes()[..2]);
    if method == CryptMethod::AesV2 {
        context.consume(b"sAlT");
    }
    let digest = context.finalize().0;
    digest[..(file_key.len() + 5).min(16)].to_vec()
}

/// Decrypts objects in place with a verified file key.
#[derive(Debug, Clone)]
pub struct ObjectDecryptor {
    key: FileKey,
    dict: EncryptionDict,
}

impl ObjectDecryptor {
    pub const fn new(key: FileKey, dict: EncryptionDict) -> Self {
        Self { key, dict }
    }

    pub const fn key(&self) -> &FileKey {
        &self.key
    }

    pub fn decrypt_bytes(
        &self,
        objid: u32,
        genno: u32,
        method: CryptMethod,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => {
                let key = object_key(self.key.as_bytes(), objid, genno, method);
                Ok(Arcfour::apply(&key, data))
            }
            CryptMethod::AesV2 | CryptMethod::AesV3 => {
                if data.is_empty() {
                    return Ok(Vec::new());
                }
                if data.len() < AES_BLOCK || data.len() % AES_BLOCK != 0 {
                    return Err(PdfError::DecodeError(format!(
                        "AES ciphertext of {} bytes in object {objid} is not block aligned",
                        data.len()
                    )));
                }
                let (iv, body) = data.split_at(AES_BLOCK);
                if body.is_empty() {
                    return Ok(Vec::new());
                }
                let key = object_key(self.key.as_bytes(), objid, genno, method);
                let plain = aes_cbc_decrypt(&key, iv, body)?;
                Ok(unpad_aes(&plain)?.to_vec())
            }
        }
    }

    pub fn decrypt_string(&self, objid: u32, genno: u32, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_bytes(objid, genno, self.dict.string_method, data)
    }

    /// Decrypt stream data, honouring `/Crypt` filters and unencrypted
    /// metadata. Cross-reference streams are left alone.
    pub fn decrypt_stream(&self, objid: u32, genno: u32, stream: &mut PDFStream) -> Result<()> {
        if stream.rawdata_is_decrypted() || stream.is_type("XRef") {
            return Ok(());
        }
        if stream.is_type("Metadata") && !self.dict.encrypt_metadata {
            return Ok(());
        }
        let method = match take_crypt_filter(stream) {
            Some(name) => self.dict.crypt_filter(&name)?,
            None => self.dict.stream_method,
        };
        let data = self.decrypt_bytes(objid, genno, method, stream.get_rawdata())?;
        stream.set_rawdata_decrypted(data);
        Ok(())
    }

    /// Decrypt every string and stream inside `obj`.
    pub fn decrypt_object(&self, objid: u32, genno: u32, obj: &mut PDFObject) -> Result<()> {
        match obj {
            PDFObject::String(s) => *s = self.decrypt_string(objid, genno, s)?,
            PDFObject::Array(items) => {
                for item in items {
                    self.decrypt_object(objid, genno, item)?;
                }
            }
            PDFObject::Dict(dict) => {
                for value in dict.values_mut() {
                    self.decrypt_object(objid, genno, value)?;
                }
            }
            PDFObject::Stream(stream) => {
                if stream.is_type("XRef") {
                    return Ok(());
                }
                for value in stream.attrs.values_mut() {
                    self.decrypt_object(objid, genno, value)?;
                }
                self.decrypt_stream(objid, genno, stream)?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Remove a `/Crypt` entry from the stream's filter chain and return the
/// crypt filter it names (`Identity` when no `/Name` is given).
fn take_crypt_filter(stream: &mut PDFStream) -> Option<String> {
    let filters: Vec<String> = match stream.get("Filter")? {
        PDFObject::Name(name) => vec![name.clone()],
        PDFObject::Array(items) => items
            .iter()
            .map(|f| f.as_name().unwrap_or_default().to_string())
            .collect(),
        _ => return None,
    };
    let index = filters.iter().position(|f| f == "Crypt")?;

    let parms = match stream.get("DecodeParms") {
        Some(PDFObject::Array(items)) => items.get(index).cloned(),
        Some(other) if filters.len() == 1 => Some(other.clone()),
        _ => None,
    };
    let name = parms
        .as_ref()
        .and_then(|p| p.as_dict().ok())
        .and_then(|p| p.get("Name"))
        .and_then(|n| n.as_name().ok())
        .unwrap_or("Identity")
        .to_string();

    if filters.len() == 1 {
        stream.attrs.shift_remove("Filter");
        stream.attrs.shift_remove("DecodeParms");
    } else {
        if let Some(PDFObject::Array(items)) = stream.attrs.get_mut("Filter") {
            items.remove(index);
        }
        if let Some(PDFObject::Array(items)) = stream.attrs.get_mut("DecodeParms")
            && index < items.len()
        {
            items.remove(index);
        }
    }
    Some(name)
}
