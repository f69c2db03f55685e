//! In-memory fixture documents, encrypted with each supported scheme.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use pdfunlock_core::codec::aes::{aes_cbc_encrypt, pad_aes};
use pdfunlock_core::codec::arcfour::Arcfour;
use pdfunlock_core::document::catalog::PDFDocument;
use pdfunlock_core::document::decrypt::object_key;
use pdfunlock_core::document::security::{
    CryptMethod, EncryptionDict, Md5SecurityHandler, pad_password, password_hash,
};
use pdfunlock_core::document::writer::write_object;
use pdfunlock_core::model::objects::{IndirectObject, PDFDict, PDFObjRef, PDFObject, PDFStream};

pub const CONTENT: &[u8] = b"BT /F1 12 Tf 72 712 Td (Hello, unlocked world) Tj ET";
pub const TITLE: &[u8] = b"Quarterly report";
pub const REVISED_TITLE: &[u8] = b"Revised report";
pub const METADATA: &[u8] = b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"></x:xmpmeta>";
pub const DOC_ID: [u8; 16] = *b"fixture-doc-id!!";
pub const P: i64 = -1028;

const ENCRYPT_OBJID: u32 = 7;
const AES256_FILE_KEY: [u8; 32] = *b"0123456789abcdef0123456789ABCDEF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Plain,
    /// V1 R2
    Rc4Key40,
    /// V2 R3
    Rc4Key128,
    /// V4 R4 with an AESV2 crypt filter
    Aes128,
    /// V5 R6 with an AESV3 crypt filter
    Aes256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Classic,
    /// Non-stream objects packed in a compressed object stream, indexed
    /// by an xref stream.
    ObjectStreams,
    /// Classic file plus an update section that replaces the info dict.
    Incremental,
}

struct Security {
    dict: PDFDict,
    key: Vec<u8>,
    method: CryptMethod,
    skip_metadata: bool,
}

#[derive(Debug, Clone)]
pub struct FixtureBuilder {
    scheme: Scheme,
    user: Vec<u8>,
    owner: Vec<u8>,
    encrypt_metadata: bool,
    layout: Layout,
}

impl FixtureBuilder {
    pub fn new(scheme: Scheme) -> Self {
        Self {
            scheme,
            user: Vec::new(),
            owner: b"owner".to_vec(),
            encrypt_metadata: true,
            layout: Layout::Classic,
        }
    }

    pub fn user(mut self, password: &str) -> Self {
        self.user = password.as_bytes().to_vec();
        self
    }

    pub fn owner(mut self, password: &str) -> Self {
        self.owner = password.as_bytes().to_vec();
        self
    }

    pub fn encrypt_metadata(mut self, encrypt: bool) -> Self {
        self.encrypt_metadata = encrypt;
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let security = self.security();
        match self.layout {
            Layout::Classic => self.build_classic(security.as_ref(), false),
            Layout::Incremental => self.build_classic(security.as_ref(), true),
            Layout::ObjectStreams => self.build_object_streams(security.as_ref()),
        }
    }

    fn owner_or_user(&self) -> &[u8] {
        if self.owner.is_empty() {
            &self.user
        } else {
            &self.owner
        }
    }

    fn security(&self) -> Option<Security> {
        match self.scheme {
            Scheme::Plain => None,
            Scheme::Rc4Key40 => Some(self.legacy_security(1, 2, 40, CryptMethod::Rc4)),
            Scheme::Rc4Key128 => Some(self.legacy_security(2, 3, 128, CryptMethod::Rc4)),
            Scheme::Aes128 => Some(self.legacy_security(4, 4, 128, CryptMethod::AesV2)),
            Scheme::Aes256 => Some(self.aes256_security()),
        }
    }

    fn legacy_security(&self, v: i64, r: i64, bits: usize, method: CryptMethod) -> Security {
        let n = if r == 2 { 5 } else { bits / 8 };
        let mut digest = md5::compute(pad_password(self.owner_or_user())).0;
        if r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(digest).0;
            }
        }
        let owner_key = &digest[..n];
        let mut o = Arcfour::apply(owner_key, &pad_password(&self.user));
        if r >= 3 {
            for i in 1..=19u8 {
                let round_key: Vec<u8> = owner_key.iter().map(|b| b ^ i).collect();
                o = Arcfour::apply(&round_key, &o);
            }
        }

        let mut dict = standard_dict(v, r);
        if v >= 2 {
            dict.insert("Length".into(), PDFObject::Int(bits as i64));
        }
        dict.insert("O".into(), PDFObject::String(o));
        dict.insert("U".into(), PDFObject::String(vec![0; 32]));
        let skip_metadata = v == 4 && !self.encrypt_metadata;
        if v == 4 {
            insert_crypt_filter(&mut dict, "AESV2", 16);
            if skip_metadata {
                dict.insert("EncryptMetadata".into(), PDFObject::Bool(false));
            }
        }

        let parsed = EncryptionDict::from_dict(&dict, &DOC_ID).unwrap();
        let handler = Md5SecurityHandler::new(parsed).unwrap();
        let key = handler.compute_key(&self.user);
        let mut u = handler.compute_user_hash(&key);
        u.resize(32, 0);
        dict.insert("U".into(), PDFObject::String(u));

        Security {
            dict,
            key: key.as_bytes().to_vec(),
            method,
            skip_metadata,
        }
    }

    fn aes256_security(&self) -> Security {
        let (uvs, uks, ovs, oks) = (b"uvsalt01", b"uksalt01", b"ovsalt01", b"oksalt01");
        let zero_iv = [0u8; 16];

        let mut u = password_hash(6, &self.user, uvs, None).unwrap().to_vec();
        u.extend_from_slice(uvs);
        u.extend_from_slice(uks);
        let ue_key = password_hash(6, &self.user, uks, None).unwrap();
        let ue = aes_cbc_encrypt(&ue_key, &zero_iv, &AES256_FILE_KEY).unwrap();

        let owner = self.owner_or_user().to_vec();
        let mut o = password_hash(6, &owner, ovs, Some(&u)).unwrap().to_vec();
        o.extend_from_slice(ovs);
        o.extend_from_slice(oks);
        let oe_key = password_hash(6, &owner, oks, Some(&u)).unwrap();
        let oe = aes_cbc_encrypt(&oe_key, &zero_iv, &AES256_FILE_KEY).unwrap();

        let mut perms = (P as i32).to_le_bytes().to_vec();
        perms.extend_from_slice(&[0xFF; 4]);
        perms.push(if self.encrypt_metadata { b'T' } else { b'F' });
        perms.extend_from_slice(b"adbfixt");
        let perms = aes_cbc_encrypt(&AES256_FILE_KEY, &zero_iv, &perms).unwrap();

        let mut dict = standard_dict(5, 6);
        dict.insert("Length".into(), PDFObject::Int(256));
        dict.insert("O".into(), PDFObject::String(o));
        dict.insert("U".into(), PDFObject::String(u));
        dict.insert("OE".into(), PDFObject::String(oe));
        dict.insert("UE".into(), PDFObject::String(ue));
        dict.insert("Perms".into(), PDFObject::String(perms));
        insert_crypt_filter(&mut dict, "AESV3", 32);
        if !self.encrypt_metadata {
            dict.insert("EncryptMetadata".into(), PDFObject::Bool(false));
        }

        Security {
            dict,
            key: AES256_FILE_KEY.to_vec(),
            method: CryptMethod::AesV3,
            skip_metadata: !self.encrypt_metadata,
        }
    }

    fn build_classic(&self, security: Option<&Security>, incremental: bool) -> Vec<u8> {
        let mut out = header();
        let mut offsets = BTreeMap::new();
        for (objid, mut obj) in plain_objects() {
            if let Some(sec) = security {
                encrypt_object(sec, objid, &mut obj);
            }
            offsets.insert(objid, out.len());
            write_indirect(&mut out, objid, &obj);
        }
        if let Some(sec) = security {
            offsets.insert(ENCRYPT_OBJID, out.len());
            write_indirect(&mut out, ENCRYPT_OBJID, &PDFObject::Dict(sec.dict.clone()));
        }

        let xref_offset = out.len();
        out.extend_from_slice(b"xref\n");
        let size = offsets.keys().next_back().map_or(1, |last| last + 1);
        out.extend_from_slice(format!("0 {size}\n").as_bytes());
        for objid in 0..size {
            match offsets.get(&objid) {
                Some(offset) => out.extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes()),
                None => out.extend_from_slice(b"0000000000 65535 f\r\n"),
            }
        }
        write_trailer(&mut out, trailer_dict(size, security.is_some()), xref_offset);

        if incremental {
            let mut info = info_dict(REVISED_TITLE);
            if let Some(sec) = security {
                encrypt_object(sec, 5, &mut info);
            }
            let info_offset = out.len();
            write_indirect(&mut out, 5, &info);
            let update_offset = out.len();
            out.extend_from_slice(format!("xref\n5 1\n{info_offset:010} 00000 n\r\n").as_bytes());
            let mut trailer = trailer_dict(size, security.is_some());
            trailer.insert("Prev".into(), PDFObject::Int(xref_offset as i64));
            write_trailer(&mut out, trailer, update_offset);
        }
        out
    }

    fn build_object_streams(&self, security: Option<&Security>) -> Vec<u8> {
        const OBJSTM: u32 = 8;
        const XREF: u32 = 9;

        let mut out = header();
        let mut entries: BTreeMap<u32, (u8, usize, usize)> = BTreeMap::new();
        let mut packed = Vec::new();
        for (objid, mut obj) in plain_objects() {
            if matches!(obj, PDFObject::Stream(_)) {
                if let Some(sec) = security {
                    encrypt_object(sec, objid, &mut obj);
                }
                entries.insert(objid, (1, out.len(), 0));
                write_indirect(&mut out, objid, &obj);
            } else {
                entries.insert(objid, (2, OBJSTM as usize, packed.len()));
                packed.push((objid, obj));
            }
        }
        if let Some(sec) = security {
            entries.insert(ENCRYPT_OBJID, (1, out.len(), 0));
            write_indirect(&mut out, ENCRYPT_OBJID, &PDFObject::Dict(sec.dict.clone()));
        }

        let mut index = String::new();
        let mut bodies = Vec::new();
        for (objid, obj) in &packed {
            index.push_str(&format!("{objid} {} ", bodies.len()));
            write_object(&mut bodies, obj);
            bodies.push(b' ');
        }
        let mut content = index.clone().into_bytes();
        content.extend_from_slice(&bodies);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&content).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut attrs = PDFDict::new();
        attrs.insert("Type".into(), PDFObject::Name("ObjStm".into()));
        attrs.insert("N".into(), PDFObject::Int(packed.len() as i64));
        attrs.insert("First".into(), PDFObject::Int(index.len() as i64));
        attrs.insert("Filter".into(), PDFObject::Name("FlateDecode".into()));
        let mut objstm = PDFObject::Stream(Box::new(PDFStream::new(attrs, compressed)));
        if let Some(sec) = security {
            encrypt_object(sec, OBJSTM, &mut objstm);
        }
        entries.insert(OBJSTM, (1, out.len(), 0));
        write_indirect(&mut out, OBJSTM, &objstm);

        let xref_offset = out.len();
        entries.insert(XREF, (1, xref_offset, 0));
        let size = XREF + 1;
        let mut rows = Vec::new();
        for objid in 0..size {
            let (kind, field1, field2) = entries.get(&objid).copied().unwrap_or((0, 0, 0));
            rows.push(kind);
            rows.extend_from_slice(&(field1 as u32).to_be_bytes());
            rows.extend_from_slice(&(field2 as u16).to_be_bytes());
        }
        let mut attrs = trailer_dict(size, security.is_some());
        attrs.insert("Type".into(), PDFObject::Name("XRef".into()));
        attrs.insert(
            "W".into(),
            PDFObject::Array(vec![PDFObject::Int(1), PDFObject::Int(4), PDFObject::Int(2)]),
        );
        let xref = PDFObject::Stream(Box::new(PDFStream::new(attrs, rows)));
        write_indirect(&mut out, XREF, &xref);
        out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());
        out
    }
}

fn header() -> Vec<u8> {
    b"%PDF-1.6\n%\xE2\xE3\xCF\xD3\n".to_vec()
}

fn standard_dict(v: i64, r: i64) -> PDFDict {
    let mut dict = PDFDict::new();
    dict.insert("Filter".into(), PDFObject::Name("Standard".into()));
    dict.insert("V".into(), PDFObject::Int(v));
    dict.insert("R".into(), PDFObject::Int(r));
    dict.insert("P".into(), PDFObject::Int(P));
    dict
}

fn insert_crypt_filter(dict: &mut PDFDict, cfm: &str, length: i64) {
    let mut std_cf = PDFDict::new();
    std_cf.insert("CFM".into(), PDFObject::Name(cfm.into()));
    std_cf.insert("AuthEvent".into(), PDFObject::Name("DocOpen".into()));
    std_cf.insert("Length".into(), PDFObject::Int(length));
    let mut cf = PDFDict::new();
    cf.insert("StdCF".into(), PDFObject::Dict(std_cf));
    dict.insert("CF".into(), PDFObject::Dict(cf));
    dict.insert("StmF".into(), PDFObject::Name("StdCF".into()));
    dict.insert("StrF".into(), PDFObject::Name("StdCF".into()));
}

fn reference(objid: u32) -> PDFObject {
    PDFObject::Ref(PDFObjRef::new(objid, 0))
}

fn name(value: &str) -> PDFObject {
    PDFObject::Name(value.into())
}

fn info_dict(title: &[u8]) -> PDFObject {
    let mut info = PDFDict::new();
    info.insert("Title".into(), PDFObject::String(title.to_vec()));
    info.insert("Producer".into(), PDFObject::String(b"pdfunlock fixture".to_vec()));
    PDFObject::Dict(info)
}

fn plain_objects() -> Vec<(u32, PDFObject)> {
    let mut catalog = PDFDict::new();
    catalog.insert("Type".into(), name("Catalog"));
    catalog.insert("Pages".into(), reference(2));
    catalog.insert("Metadata".into(), reference(6));

    let mut pages = PDFDict::new();
    pages.insert("Type".into(), name("Pages"));
    pages.insert("Kids".into(), PDFObject::Array(vec![reference(3)]));
    pages.insert("Count".into(), PDFObject::Int(1));

    let mut page = PDFDict::new();
    page.insert("Type".into(), name("Page"));
    page.insert("Parent".into(), reference(2));
    page.insert(
        "MediaBox".into(),
        PDFObject::Array(vec![
            PDFObject::Int(0),
            PDFObject::Int(0),
            PDFObject::Int(612),
            PDFObject::Int(792),
        ]),
    );
    page.insert("Contents".into(), reference(4));

    let contents = PDFStream::new(PDFDict::new(), CONTENT.to_vec());

    let mut meta_attrs = PDFDict::new();
    meta_attrs.insert("Type".into(), name("Metadata"));
    meta_attrs.insert("Subtype".into(), name("XML"));
    let metadata = PDFStream::new(meta_attrs, METADATA.to_vec());

    vec![
        (1, PDFObject::Dict(catalog)),
        (2, PDFObject::Dict(pages)),
        (3, PDFObject::Dict(page)),
        (4, PDFObject::Stream(Box::new(contents))),
        (5, info_dict(TITLE)),
        (6, PDFObject::Stream(Box::new(metadata))),
    ]
}

fn trailer_dict(size: u32, encrypted: bool) -> PDFDict {
    let mut trailer = PDFDict::new();
    trailer.insert("Size".into(), PDFObject::Int(i64::from(size)));
    trailer.insert("Root".into(), reference(1));
    trailer.insert("Info".into(), reference(5));
    if encrypted {
        trailer.insert("Encrypt".into(), reference(ENCRYPT_OBJID));
    }
    trailer.insert(
        "ID".into(),
        PDFObject::Array(vec![
            PDFObject::String(DOC_ID.to_vec()),
            PDFObject::String(DOC_ID.to_vec()),
        ]),
    );
    trailer
}

fn write_indirect(out: &mut Vec<u8>, objid: u32, obj: &PDFObject) {
    out.extend_from_slice(format!("{objid} 0 obj\n").as_bytes());
    write_object(out, obj);
    out.extend_from_slice(b"\nendobj\n");
}

fn write_trailer(out: &mut Vec<u8>, trailer: PDFDict, xref_offset: usize) {
    out.extend_from_slice(b"trailer\n");
    write_object(out, &PDFObject::Dict(trailer));
    out.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());
}

fn encrypt_bytes(sec: &Security, objid: u32, data: &[u8]) -> Vec<u8> {
    let key = object_key(&sec.key, objid, 0, sec.method);
    match sec.method {
        CryptMethod::Identity => data.to_vec(),
        CryptMethod::Rc4 => Arcfour::apply(&key, data),
        CryptMethod::AesV2 | CryptMethod::AesV3 => {
            let iv = [objid as u8 ^ 0xA5; 16];
            let mut out = iv.to_vec();
            out.extend(aes_cbc_encrypt(&key, &iv, &pad_aes(data)).unwrap());
            out
        }
    }
}

fn encrypt_object(sec: &Security, objid: u32, obj: &mut PDFObject) {
    match obj {
        PDFObject::String(s) => *s = encrypt_bytes(sec, objid, s),
        PDFObject::Array(items) => {
            for item in items {
                encrypt_object(sec, objid, item);
            }
        }
        PDFObject::Dict(dict) => {
            for value in dict.values_mut() {
                encrypt_object(sec, objid, value);
            }
        }
        PDFObject::Stream(stream) => {
            if stream.is_type("Metadata") && sec.skip_metadata {
                return;
            }
            let data = encrypt_bytes(sec, objid, stream.get_rawdata());
            **stream = PDFStream::new(stream.attrs.clone(), data);
        }
        _ => {}
    }
}

/// Parse `bytes` and return every reachable object, unencrypted.
pub fn read_back(bytes: &[u8]) -> (PDFDocument, BTreeMap<u32, IndirectObject>) {
    let doc = PDFDocument::new(bytes).unwrap();
    assert!(!doc.is_encrypted(), "rewritten file still has /Encrypt");
    let objects = doc.materialize(None, None).unwrap();
    (doc, objects)
}

pub fn stream_data(objects: &BTreeMap<u32, IndirectObject>, objid: u32) -> Vec<u8> {
    objects[&objid]
        .object
        .as_stream()
        .unwrap()
        .get_rawdata()
        .to_vec()
}

pub fn info_title(objects: &BTreeMap<u32, IndirectObject>) -> Vec<u8> {
    objects[&5]
        .object
        .as_dict()
        .unwrap()
        .get("Title")
        .unwrap()
        .as_string()
        .unwrap()
        .to_vec()
}
