//! Standard security handler.
//!
//! Derives the file encryption key from a password and the `/Encrypt`
//! dictionary, and verifies candidate passwords for revisions 2 to 6.
//! Revisions 2-4 use the MD5/RC4 construction; 5 and 6 use SHA-2 with
//! AES-256 wrapped keys.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::saslprep::saslprep;
use crate::codec::aes::{aes_cbc_decrypt, aes_cbc_encrypt};
use crate::codec::arcfour::Arcfour;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFDict, PDFObject};

/// Password padding string.
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Significant password bytes for revisions 5 and 6.
const MAX_AES256_PASSWORD: usize = 127;

/// Cipher selected by a crypt filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// Data is stored in the clear.
    Identity,
    /// RC4 with a per-object key (`/V2`).
    Rc4,
    /// AES-128-CBC with a per-object key (`/AESV2`).
    AesV2,
    /// AES-256-CBC with the file key (`/AESV3`).
    AesV3,
}

impl CryptMethod {
    fn from_cfm(cfm: &str) -> Result<Self> {
        match cfm {
            "None" => Ok(Self::Identity),
            "V2" => Ok(Self::Rc4),
            "AESV2" => Ok(Self::AesV2),
            "AESV3" => Ok(Self::AesV3),
            other => Err(PdfError::UnsupportedFilter(format!(
                "crypt filter method /{other}"
            ))),
        }
    }
}

/// File encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct FileKey(Vec<u8>);

impl FileKey {
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Key bytes stay out of logs.
impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileKey({} bytes)", self.0.len())
    }
}

/// Parsed `/Encrypt` dictionary plus the first trailer `/ID` element.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionDict {
    pub filter: String,
    pub sub_filter: Option<String>,
    pub v: i64,
    pub r: i64,
    /// Key length in bits (40..=128 for RC4, 128 for AESV2, 256 for AESV3)
    pub length_bits: usize,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub oe: Option<Vec<u8>>,
    pub ue: Option<Vec<u8>>,
    pub perms: Option<Vec<u8>>,
    pub p: i32,
    pub encrypt_metadata: bool,
    pub document_id: Vec<u8>,
    pub string_method: CryptMethod,
    pub stream_method: CryptMethod,
    /// `/CF` entries: filter name to `/CFM` name
    crypt_filters: BTreeMap<String, String>,
}

impl EncryptionDict {
    /// Validate and extract the fields the standard handler needs.
    pub fn from_dict(dict: &PDFDict, document_id: &[u8]) -> Result<Self> {
        let filter = get_name(dict, "Filter")
            .ok_or_else(|| PdfError::EncryptionError("missing /Filter in /Encrypt".into()))?
            .to_string();
        if filter != "Standard" {
            return Err(PdfError::UnsupportedFilter(format!(
                "security handler /{filter}"
            )));
        }
        let sub_filter = get_name(dict, "SubFilter").map(str::to_string);

        let v = get_int_default(dict, "V", 0);
        let r = get_int(dict, "R")?;
        if !matches!((v, r), (0..=2, 2) | (1 | 2, 3) | (4, 4) | (5, 5) | (5, 6)) {
            return Err(PdfError::UnsupportedFilter(format!(
                "standard security handler V={v} R={r}"
            )));
        }

        let length_bits = match v {
            0 | 1 => 40,
            2 => {
                let bits = get_int_default(dict, "Length", 40);
                if !(40..=128).contains(&bits) || bits % 8 != 0 {
                    return Err(PdfError::EncryptionError(format!(
                        "invalid key length {bits}"
                    )));
                }
                bits as usize
            }
            4 => 128,
            _ => 256,
        };

        let hash_len = if r >= 5 { 48 } else { 32 };
        let o = get_fixed_bytes(dict, "O", hash_len)?;
        let u = get_fixed_bytes(dict, "U", hash_len)?;
        let (oe, ue) = if r >= 5 {
            (
                Some(get_fixed_bytes(dict, "OE", 32)?),
                Some(get_fixed_bytes(dict, "UE", 32)?),
            )
        } else {
            (None, None)
        };
        let perms = dict
            .get("Perms")
            .and_then(|p| p.as_string().ok())
            .map(<[u8]>::to_vec);

        let p = dict
            .get("P")
            .ok_or_else(|| PdfError::EncryptionError("missing /P in /Encrypt".into()))?
            .as_integral()?;
        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|b| b.as_bool().ok())
            .unwrap_or(true);

        let crypt_filters: BTreeMap<String, String> = dict
            .get("CF")
            .and_then(|cf| cf.as_dict().ok())
            .map(|cf| {
                cf.iter()
                    .filter_map(|(name, filter)| {
                        let params = filter.as_dict().ok()?;
                        let cfm = get_name(params, "CFM").unwrap_or("None");
                        Some((name.clone(), cfm.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut parsed = Self {
            filter,
            sub_filter,
            v,
            r,
            length_bits,
            o,
            u,
            oe,
            ue,
            perms,
            // Stored as a 32-bit pattern; writers use either sign convention.
            p: p as u32 as i32,
            encrypt_metadata,
            document_id: document_id.to_vec(),
            string_method: CryptMethod::Rc4,
            stream_method: CryptMethod::Rc4,
            crypt_filters,
        };
        if v >= 4 {
            parsed.string_method =
                parsed.crypt_filter(get_name(dict, "StrF").unwrap_or("Identity"))?;
            parsed.stream_method =
                parsed.crypt_filter(get_name(dict, "StmF").unwrap_or("Identity"))?;
        }
        Ok(parsed)
    }

    /// Resolve a crypt filter name through `/CF`.
    pub fn crypt_filter(&self, name: &str) -> Result<CryptMethod> {
        if name == "Identity" {
            return Ok(CryptMethod::Identity);
        }
        if self.v < 4 {
            return Ok(CryptMethod::Rc4);
        }
        let cfm = self.crypt_filters.get(name).ok_or_else(|| {
            PdfError::EncryptionError(format!("crypt filter /{name} not defined in /CF"))
        })?;
        CryptMethod::from_cfm(cfm)
    }

    /// File key length in bytes.
    pub const fn key_length(&self) -> usize {
        if self.r == 2 { 5 } else { self.length_bits / 8 }
    }
}

/// Key derivation and verification for one encryption dictionary.
pub trait SecurityHandler: Send + Sync {
    fn dict(&self) -> &EncryptionDict;

    /// File key implied by `password` taken as the user password.
    ///
    /// Pure: the same password and dictionary always produce the same
    /// bytes. Nothing is verified.
    fn derive_key(&self, password: &[u8]) -> Result<FileKey>;

    /// Verify `password` as the user password, then as the owner
    /// password, and return the file key.
    fn authenticate(&self, password: &[u8]) -> Result<FileKey>;

    fn verify(&self, password: &[u8]) -> bool {
        self.authenticate(password).is_ok()
    }
}

/// Select the handler for a validated dictionary.
pub fn create_security_handler(dict: EncryptionDict) -> Result<Box<dyn SecurityHandler>> {
    match dict.r {
        2..=4 => Ok(Box::new(Md5SecurityHandler::new(dict)?)),
        5 | 6 => Ok(Box::new(Sha2SecurityHandler::new(dict)?)),
        r => Err(PdfError::UnsupportedFilter(format!("revision {r}"))),
    }
}

/// Derive the file key for `password` without verifying it.
pub fn derive_key(password: &[u8], dict: &EncryptionDict) -> Result<FileKey> {
    create_security_handler(dict.clone())?.derive_key(password)
}

/// True iff `password` is the user or owner password.
pub fn verify(password: &[u8], dict: &EncryptionDict) -> bool {
    create_security_handler(dict.clone()).is_ok_and(|handler| handler.verify(password))
}

/// Pad or truncate a password to 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

/// Revisions 2-4: MD5 key derivation, RC4-based verification.
pub struct Md5SecurityHandler {
    dict: EncryptionDict,
}

impl Md5SecurityHandler {
    pub fn new(dict: EncryptionDict) -> Result<Self> {
        if !(2..=4).contains(&dict.r) {
            return Err(PdfError::UnsupportedFilter(format!(
                "revision {} is not an MD5 revision",
                dict.r
            )));
        }
        Ok(Self { dict })
    }

    /// File key from a user password.
    pub fn compute_key(&self, password: &[u8]) -> FileKey {
        let n = self.dict.key_length();
        let mut context = md5::Context::new();
        context.consume(pad_password(password));
        context.consume(&self.dict.o);
        context.consume(self.dict.p.to_le_bytes());
        context.consume(&self.dict.document_id);
        if self.dict.r >= 4 && !self.dict.encrypt_metadata {
            context.consume([0xFF, 0xFF, 0xFF, 0xFF]);
        }
        let mut digest = context.finalize().0;

        if self.dict.r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest[..n]).0;
            }
        }

        FileKey(digest[..n].to_vec())
    }

    /// `/U` value for a file key: 32 bytes for R2, the 16 significant
    /// bytes for R3 and R4.
    pub fn compute_user_hash(&self, key: &FileKey) -> Vec<u8> {
        if self.dict.r == 2 {
            return Arcfour::apply(key.as_bytes(), &PASSWORD_PADDING);
        }
        let mut context = md5::Context::new();
        context.consume(PASSWORD_PADDING);
        context.consume(&self.dict.document_id);
        let digest = context.finalize();
        rc4_rounds(key.as_bytes(), &digest.0, 0..20u8)
    }

    /// RC4 key protecting `/O`, derived from the owner password.
    pub fn owner_key(&self, owner_password: &[u8]) -> Vec<u8> {
        let mut digest = md5::compute(pad_password(owner_password)).0;
        if self.dict.r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(digest).0;
            }
        }
        digest[..self.dict.key_length()].to_vec()
    }

    /// Decrypt `/O` with an owner password, yielding the padded user
    /// password the owner password was bound to.
    pub fn recover_user_password(&self, owner_password: &[u8]) -> Vec<u8> {
        let key = self.owner_key(owner_password);
        if self.dict.r == 2 {
            Arcfour::apply(&key, &self.dict.o)
        } else {
            rc4_rounds(&key, &self.dict.o, (0..20u8).rev())
        }
    }

    fn check_user(&self, password: &[u8]) -> Option<FileKey> {
        let key = self.compute_key(password);
        let computed = self.compute_user_hash(&key);
        let significant = if self.dict.r == 2 { 32 } else { 16 };
        let matches: bool = computed[..significant]
            .ct_eq(&self.dict.u[..significant])
            .into();
        matches.then_some(key)
    }
}

impl SecurityHandler for Md5SecurityHandler {
    fn dict(&self) -> &EncryptionDict {
        &self.dict
    }

    fn derive_key(&self, password: &[u8]) -> Result<FileKey> {
        Ok(self.compute_key(password))
    }

    fn authenticate(&self, password: &[u8]) -> Result<FileKey> {
        if let Some(key) = self.check_user(password) {
            debug!(revision = self.dict.r, "authenticated with user password");
            return Ok(key);
        }
        let user_password = self.recover_user_password(password);
        if let Some(key) = self.check_user(&user_password) {
            debug!(revision = self.dict.r, "authenticated with owner password");
            return Ok(key);
        }
        Err(PdfError::IncorrectPassword)
    }
}

/// RC4 applied once per round with the key XORed by the round number.
fn rc4_rounds(key: &[u8], data: &[u8], rounds: impl Iterator<Item = u8>) -> Vec<u8> {
    let mut result = data.to_vec();
    for i in rounds {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        result = Arcfour::apply(&round_key, &result);
    }
    result
}

/// Revisions 5 and 6: SHA-2 verification hashes, AES-256 wrapped key.
pub struct Sha2SecurityHandler {
    dict: EncryptionDict,
    oe: Vec<u8>,
    ue: Vec<u8>,
}

impl Sha2SecurityHandler {
    pub fn new(dict: EncryptionDict) -> Result<Self> {
        if !matches!(dict.r, 5 | 6) {
            return Err(PdfError::UnsupportedFilter(format!(
                "revision {} is not an AES-256 revision",
                dict.r
            )));
        }
        let (Some(oe), Some(ue)) = (dict.oe.clone(), dict.ue.clone()) else {
            return Err(PdfError::EncryptionError("missing /OE or /UE".into()));
        };
        Ok(Self { dict, oe, ue })
    }

    /// SASLprep for R6, then the first 127 bytes.
    pub fn normalize_password(&self, password: &[u8]) -> Vec<u8> {
        let mut prepared = if self.dict.r == 6 {
            std::str::from_utf8(password)
                .ok()
                .and_then(|s| saslprep(s).ok())
                .map_or_else(|| password.to_vec(), String::into_bytes)
        } else {
            password.to_vec()
        };
        prepared.truncate(MAX_AES256_PASSWORD);
        prepared
    }

    fn hash(&self, password: &[u8], salt: &[u8], vector: Option<&[u8]>) -> Result<[u8; 32]> {
        password_hash(self.dict.r, password, salt, vector)
    }

    fn unwrap_key(&self, intermediate: &[u8; 32], wrapped: &[u8]) -> Result<FileKey> {
        let key = aes_cbc_decrypt(intermediate, &[0u8; 16], wrapped)?;
        self.check_perms(&key);
        Ok(FileKey(key))
    }

    fn check_perms(&self, key: &[u8]) {
        let Some(perms) = self.dict.perms.as_deref().filter(|p| p.len() >= 16) else {
            return;
        };
        match aes_cbc_decrypt(key, &[0u8; 16], &perms[..16]) {
            Ok(block) if &block[9..12] == b"adb" => {
                let p = i32::from_le_bytes([block[0], block[1], block[2], block[3]]);
                if p != self.dict.p {
                    warn!(perms_p = p, p = self.dict.p, "/Perms disagrees with /P");
                }
            }
            _ => warn!("/Perms does not decrypt to a valid block"),
        }
    }
}

impl SecurityHandler for Sha2SecurityHandler {
    fn dict(&self) -> &EncryptionDict {
        &self.dict
    }

    fn derive_key(&self, password: &[u8]) -> Result<FileKey> {
        let password = self.normalize_password(password);
        let u = &self.dict.u;
        let intermediate = self.hash(&password, &u[40..48], None)?;
        let key = aes_cbc_decrypt(&intermediate, &[0u8; 16], &self.ue)?;
        Ok(FileKey(key))
    }

    fn authenticate(&self, password: &[u8]) -> Result<FileKey> {
        let password = self.normalize_password(password);
        let u = &self.dict.u;
        let o = &self.dict.o;

        let user_hash = self.hash(&password, &u[32..40], None)?;
        if bool::from(user_hash[..].ct_eq(&u[..32])) {
            debug!(revision = self.dict.r, "authenticated with user password");
            let intermediate = self.hash(&password, &u[40..48], None)?;
            return self.unwrap_key(&intermediate, &self.ue);
        }

        let owner_hash = self.hash(&password, &o[32..40], Some(&u[..48]))?;
        if bool::from(owner_hash[..].ct_eq(&o[..32])) {
            debug!(revision = self.dict.r, "authenticated with owner password");
            let intermediate = self.hash(&password, &o[40..48], Some(&u[..48]))?;
            return self.unwrap_key(&intermediate, &self.oe);
        }

        Err(PdfError::IncorrectPassword)
    }
}

/// Verification hash for revisions 5 and 6.
///
/// R5 is a single SHA-256. R6 is the hardened hash: rounds of
/// AES-128-CBC over 64 copies of `password || K || vector`, each followed
/// by SHA-256/384/512 chosen by the first 16 ciphertext bytes mod 3. At
/// least 64 rounds run; the loop ends once the last ciphertext byte is
/// no greater than the round count minus 32.
pub fn password_hash(
    revision: i64,
    password: &[u8],
    salt: &[u8],
    vector: Option<&[u8]>,
) -> Result<[u8; 32]> {
    let vector = vector.unwrap_or(&[]);
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(vector);
    let mut k: Vec<u8> = hasher.finalize().to_vec();

    if revision >= 6 {
        let mut round: u32 = 0;
        loop {
            let mut block = Vec::with_capacity(password.len() + k.len() + vector.len());
            block.extend_from_slice(password);
            block.extend_from_slice(&k);
            block.extend_from_slice(vector);
            let k1 = block.repeat(64);

            let e = aes_cbc_encrypt(&k[..16], &k[16..32], &k1)?;
            k = match e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3 {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };

            round += 1;
            let last = u32::from(e[e.len() - 1]);
            if round >= 64 && last <= round - 32 {
                break;
            }
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    Ok(out)
}

fn get_name<'a>(dict: &'a PDFDict, key: &str) -> Option<&'a str> {
    dict.get(key).and_then(|v| v.as_name().ok())
}

fn get_int(dict: &PDFDict, key: &str) -> Result<i64> {
    dict.get(key)
        .ok_or_else(|| PdfError::EncryptionError(format!("missing /{key} in /Encrypt")))?
        .as_integral()
}

fn get_int_default(dict: &PDFDict, key: &str, default: i64) -> i64 {
    dict.get(key)
        .and_then(|v| v.as_integral().ok())
        .unwrap_or(default)
}

/// String entry of at least `len` bytes, truncated to `len`.
fn get_fixed_bytes(dict: &PDFDict, key: &str, len: usize) -> Result<Vec<u8>> {
    let bytes = match dict.get(key) {
        Some(PDFObject::String(s)) => s,
        Some(other) => {
            return Err(PdfError::TypeError {
                expected: "string",
                got: other.type_name(),
            });
        }
        None => {
            return Err(PdfError::EncryptionError(format!(
                "missing /{key} in /Encrypt"
            )));
        }
    };
    if bytes.len() < len {
        return Err(PdfError::EncryptionError(format!(
            "/{key} is {} bytes, expected {len}",
            bytes.len()
        )));
    }
    Ok(bytes[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_fills_and_truncates() {
        assert_eq!(pad_password(b""), PASSWORD_PADDING);
        let padded = pad_password(b"abc");
        assert_eq!(&padded[..3], b"abc");
        assert_eq!(&padded[3..], &PASSWORD_PADDING[..29]);
        assert_eq!(pad_password(&[b'x'; 40]), [b'x'; 32]);
    }

    #[test]
    fn file_key_debug_hides_bytes() {
        let key = FileKey::from_bytes(vec![0xAA; 16]);
        assert_eq!(format!("{key:?}"), "FileKey(16 bytes)");
    }

    #[test]
    fn r6_hash_differs_from_r5() {
        let r5 = password_hash(5, b"pw", b"saltsalt", None).unwrap();
        let r6 = password_hash(6, b"pw", b"saltsalt", None).unwrap();
        assert_ne!(r5, r6);
        assert_eq!(r6, password_hash(6, b"pw", b"saltsalt", None).unwrap());
    }

    #[test]
    fn unknown_cfm_is_unsupported() {
        assert!(matches!(
            CryptMethod::from_cfm("FooCrypt"),
            Err(PdfError::UnsupportedFilter(_))
        ));
    }
}
