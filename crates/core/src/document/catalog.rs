//! Document loading: cross-reference chain, indirect objects, object
//! streams and the reachable object graph.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, warn};

use super::decrypt::ObjectDecryptor;
use super::security::EncryptionDict;
use super::xref::{
    XRef, XRefEntry, find_startxref, parse_xref_stream, parse_xref_table, read_number,
    scan_for_objects,
};
use crate::codec::flate::{PredictorParams, apply_predictor, flate_decode};
use crate::error::{PdfError, Result};
use crate::model::objects::{IndirectObject, PDFDict, PDFObjRef, PDFObject, PDFStream};
use crate::parser::PDFParser;
use crate::parser::lexer::is_whitespace;

const DEFAULT_VERSION: &str = "1.7";

/// A parsed PDF file: raw bytes plus its cross-reference sections.
///
/// Objects are parsed on demand; nothing is decrypted until
/// [`PDFDocument::materialize`] is given a decryptor.
#[derive(Debug, Clone)]
pub struct PDFDocument {
    data: Bytes,
    version: String,
    /// Newest section first
    xrefs: Vec<XRef>,
    /// Trailer keys merged across sections, newest wins
    trailer: PDFDict,
}

impl PDFDocument {
    pub fn new<D: AsRef<[u8]>>(data: D) -> Result<Self> {
        Self::from_bytes(Bytes::copy_from_slice(data.as_ref()))
    }

    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let version = read_version(&data).unwrap_or_else(|| {
            warn!("missing %PDF- header, assuming {DEFAULT_VERSION}");
            DEFAULT_VERSION.to_string()
        });

        let xrefs = match load_xref_chain(&data) {
            Ok(xrefs) => xrefs,
            Err(e) => {
                warn!(error = %e, "cross-reference chain unreadable, scanning for objects");
                vec![scan_for_objects(&data)?]
            }
        };

        let mut trailer = PDFDict::new();
        for xref in &xrefs {
            for (key, value) in &xref.trailer {
                trailer.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        if !trailer.contains_key("Root") {
            return Err(PdfError::SyntaxError("trailer has no /Root".into()));
        }

        debug!(
            version = %version,
            sections = xrefs.len(),
            "loaded cross-reference chain"
        );
        Ok(Self {
            data,
            version,
            xrefs,
            trailer,
        })
    }

    /// Header version, e.g. `1.6`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub const fn trailer(&self) -> &PDFDict {
        &self.trailer
    }

    pub fn xrefs(&self) -> &[XRef] {
        &self.xrefs
    }

    /// True when the table was rebuilt by the recovery scan.
    pub fn is_recovered(&self) -> bool {
        self.xrefs.iter().all(|x| x.is_fallback)
    }

    /// First element of the trailer `/ID`, or empty.
    pub fn document_id(&self) -> Vec<u8> {
        self.trailer
            .get("ID")
            .and_then(|id| self.resolve(id).ok())
            .and_then(|id| match id {
                PDFObject::Array(items) => items.first().cloned(),
                _ => None,
            })
            .and_then(|first| self.resolve(&first).ok())
            .and_then(|first| first.as_string().ok().map(<[u8]>::to_vec))
            .unwrap_or_default()
    }

    fn encrypt_ref(&self) -> Option<PDFObjRef> {
        match self.trailer.get("Encrypt") {
            Some(PDFObject::Ref(r)) => Some(*r),
            _ => None,
        }
    }

    /// The `/Encrypt` dictionary when it resolves to a non-empty
    /// dictionary.
    pub fn encrypt_dict(&self) -> Result<Option<PDFDict>> {
        let Some(entry) = self.trailer.get("Encrypt") else {
            return Ok(None);
        };
        match self.resolve(entry)? {
            PDFObject::Dict(dict) if !dict.is_empty() => Ok(Some(dict)),
            _ => Ok(None),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt_dict().is_ok_and(|d| d.is_some())
    }

    /// Parsed encryption parameters, `None` for a plaintext document.
    pub fn encryption_dict(&self) -> Result<Option<EncryptionDict>> {
        match self.encrypt_dict()? {
            Some(dict) => Ok(Some(EncryptionDict::from_dict(&dict, &self.document_id())?)),
            None => Ok(None),
        }
    }

    fn entry(&self, objid: u32) -> Option<XRefEntry> {
        self.xrefs.iter().find_map(|x| x.get(objid))
    }

    /// Follow a reference without decrypting. Missing objects are null.
    pub fn resolve(&self, obj: &PDFObject) -> Result<PDFObject> {
        let mut seen = HashSet::new();
        let mut current = obj.clone();
        while let PDFObject::Ref(r) = current {
            if !seen.insert(r.objid) {
                return Err(PdfError::SyntaxError(format!(
                    "reference cycle at object {}",
                    r.objid
                )));
            }
            current = self
                .load_object(r.objid, None, &mut HashMap::new())?
                .map_or(PDFObject::Null, |o| o.object);
        }
        Ok(current)
    }

    /// Load one object without decrypting it.
    pub fn getobj(&self, objid: u32) -> Result<Option<IndirectObject>> {
        self.load_object(objid, None, &mut HashMap::new())
    }

    /// Every object reachable from the trailer, decrypted when a
    /// decryptor is given.
    ///
    /// The `/Encrypt` dictionary is left out, as are references that
    /// resolve to nothing. Object and cross-reference streams are
    /// consumed rather than returned. The deadline is checked before
    /// each object.
    pub fn materialize(
        &self,
        decryptor: Option<&ObjectDecryptor>,
        deadline: Option<Instant>,
    ) -> Result<BTreeMap<u32, IndirectObject>> {
        let encrypt_objid = self.encrypt_ref().map(|r| r.objid);
        let mut pending = Vec::new();
        for (key, value) in &self.trailer {
            if key != "Encrypt" {
                value.for_each_ref(&mut |r| pending.push(r));
            }
        }

        let mut objects = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut containers = HashMap::new();
        while let Some(r) = pending.pop() {
            if Some(r.objid) == encrypt_objid || !seen.insert(r.objid) {
                continue;
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return Err(PdfError::DeadlineExceeded(objects.len()));
            }
            let Some(obj) = self.load_object(r.objid, decryptor, &mut containers)? else {
                debug!(objid = r.objid, "reference to missing object reads as null");
                continue;
            };
            if let PDFObject::Stream(s) = &obj.object
                && (s.is_type("XRef") || s.is_type("ObjStm"))
            {
                continue;
            }
            obj.object.for_each_ref(&mut |r| pending.push(r));
            objects.insert(r.objid, obj);
        }
        debug!(objects = objects.len(), "materialized object graph");
        Ok(objects)
    }

    fn load_object(
        &self,
        objid: u32,
        decryptor: Option<&ObjectDecryptor>,
        containers: &mut HashMap<u32, Vec<PDFObject>>,
    ) -> Result<Option<IndirectObject>> {
        match self.entry(objid) {
            None | Some(XRefEntry::Free) => Ok(None),
            Some(XRefEntry::InFile { offset, .. }) => {
                let (genno, mut object) = self.parse_object_at(offset, objid)?;
                if let Some(decryptor) = decryptor {
                    decryptor.decrypt_object(objid, genno, &mut object)?;
                }
                Ok(Some(IndirectObject::new(objid, genno, object)))
            }
            Some(XRefEntry::InStream {
                stream_objid,
                index,
            }) => {
                let members = match containers.entry(stream_objid) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => e.insert(self.load_object_stream(stream_objid, decryptor)?),
                };
                let object = members.get(index).cloned().ok_or_else(|| {
                    PdfError::SyntaxError(format!(
                        "object {objid}: index {index} out of range in object stream {stream_objid}"
                    ))
                })?;
                Ok(Some(IndirectObject::new(objid, 0, object)))
            }
        }
    }

    /// Decrypt and decode an object stream, returning its members in
    /// slot order.
    fn load_object_stream(
        &self,
        stream_objid: u32,
        decryptor: Option<&ObjectDecryptor>,
    ) -> Result<Vec<PDFObject>> {
        let Some(XRefEntry::InFile { offset, .. }) = self.entry(stream_objid) else {
            return Err(PdfError::SyntaxError(format!(
                "object stream {stream_objid} is not stored in the file body"
            )));
        };
        let (genno, object) = self.parse_object_at(offset, stream_objid)?;
        let mut stream = match object {
            PDFObject::Stream(stream) => stream,
            other => {
                return Err(PdfError::TypeError {
                    expected: "stream",
                    got: other.type_name(),
                });
            }
        };
        if let Some(decryptor) = decryptor {
            decryptor.decrypt_stream(stream_objid, genno, &mut stream)?;
        }
        let data = decode_stream(&stream)?;

        let n = stream_int(&stream, "N")?;
        let first = stream_int(&stream, "First")?;
        let header = data.get(..first).ok_or_else(|| {
            PdfError::SyntaxError(format!("object stream {stream_objid}: /First past end"))
        })?;

        let mut parser = PDFParser::new(header);
        let mut members = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            let _member_objid = parser.parse_object()?.as_int()?;
            let member_offset = usize::try_from(parser.parse_object()?.as_int()?)
                .map_err(|_| PdfError::SyntaxError("negative object stream offset".into()))?;
            let body = data.get(first + member_offset..).ok_or_else(|| {
                PdfError::SyntaxError(format!(
                    "object stream {stream_objid}: member offset {member_offset} past end"
                ))
            })?;
            members.push(PDFParser::new(body).parse_object()?);
        }
        debug!(stream_objid, members = members.len(), "expanded object stream");
        Ok(members)
    }

    fn parse_object_at(&self, offset: usize, objid: u32) -> Result<(u32, PDFObject)> {
        parse_indirect(&self.data, offset, objid, |len| self.stream_length(len))
    }

    /// `/Length` value, following one level of indirection.
    fn stream_length(&self, length: &PDFObject) -> Option<i64> {
        match length {
            PDFObject::Int(n) => Some(*n),
            PDFObject::Ref(r) => match self.entry(r.objid)? {
                XRefEntry::InFile { offset, .. } => {
                    parse_indirect(&self.data, offset, r.objid, |len| len.as_int().ok())
                        .ok()
                        .and_then(|(_, obj)| obj.as_int().ok())
                }
                _ => None,
            },
            _ => None,
        }
    }
}

/// Parse `n g obj ... endobj` at `offset`, returning the generation and
/// the object. `length` evaluates a stream's `/Length` entry.
fn parse_indirect(
    data: &Bytes,
    offset: usize,
    expected_objid: u32,
    length: impl Fn(&PDFObject) -> Option<i64>,
) -> Result<(u32, PDFObject)> {
    let input = data.get(offset..).filter(|d| !d.is_empty()).ok_or_else(|| {
        PdfError::SyntaxError(format!(
            "object {expected_objid}: offset {offset} outside file of {} bytes",
            data.len()
        ))
    })?;

    let mut parser = PDFParser::new(input);
    let objid = parser.parse_object()?.as_int()?;
    let genno = parser.parse_object()?.as_int()?;
    parser.expect_keyword(b"obj")?;
    if objid != i64::from(expected_objid) {
        return Err(PdfError::SyntaxError(format!(
            "expected object {expected_objid} at offset {offset}, found {objid}"
        )));
    }
    let genno = u32::try_from(genno)
        .map_err(|_| PdfError::SyntaxError(format!("bad generation {genno}")))?;

    let dict = match parser.parse_object()? {
        PDFObject::Dict(dict) => dict,
        other => return Ok((genno, other)),
    };

    let rest = parser.remaining();
    let mut pos = rest.iter().take_while(|&&b| is_whitespace(b)).count();
    if !rest[pos..].starts_with(b"stream") {
        return Ok((genno, PDFObject::Dict(dict)));
    }
    pos += 6;
    if rest.get(pos) == Some(&b'\r') {
        pos += 1;
    }
    if rest.get(pos) == Some(&b'\n') {
        pos += 1;
    }
    let body = &rest[pos..];
    let start = offset + (input.len() - body.len());

    let len = dict
        .get("Length")
        .and_then(|l| length(l))
        .and_then(|len| usize::try_from(len).ok())
        .filter(|&len| length_fits(body, len))
        .unwrap_or_else(|| find_endstream(body));

    let stream = PDFStream::new(dict, data.slice(start..start + len));
    Ok((genno, PDFObject::Stream(Box::new(stream))))
}

/// Declared length is trusted when `endstream` follows it.
fn length_fits(body: &[u8], len: usize) -> bool {
    body.get(len..).is_some_and(|after| {
        let skip = after.iter().take_while(|&&b| is_whitespace(b)).count();
        after[skip..].starts_with(b"endstream")
    })
}

/// Data length up to `endstream`, minus the end-of-line before it.
fn find_endstream(body: &[u8]) -> usize {
    let needle = b"endstream";
    let Some(mut end) = body.windows(needle.len()).position(|w| w == needle) else {
        return body.len();
    };
    if end > 0 && body[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && body[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

fn stream_int(stream: &PDFStream, key: &str) -> Result<usize> {
    let value = stream
        .get(key)
        .ok_or_else(|| PdfError::KeyError(key.to_string()))?
        .as_int()?;
    usize::try_from(value).map_err(|_| PdfError::SyntaxError(format!("negative /{key}")))
}

fn read_version(data: &[u8]) -> Option<String> {
    let head = &data[..data.len().min(1024)];
    let at = head.windows(5).position(|w| w == b"%PDF-")?;
    let version: String = head[at + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    (!version.is_empty()).then_some(version)
}

/// Walk `startxref`, `/XRefStm` and `/Prev`, newest first. Revisited
/// offsets end the walk.
fn load_xref_chain(data: &Bytes) -> Result<Vec<XRef>> {
    let mut pos = find_startxref(data)?;
    let mut visited = HashSet::new();
    let mut xrefs = Vec::new();

    while visited.insert(pos) {
        let xref = load_xref_at(data, pos)?;
        let offset_of = |key: &str| {
            xref.trailer
                .get(key)
                .and_then(|v| v.as_int().ok())
                .and_then(|n| usize::try_from(n).ok())
        };
        let xref_stm = offset_of("XRefStm");
        let prev = offset_of("Prev");

        // Hybrid files: the stream describes the compressed objects the
        // table leaves out, so it takes precedence.
        if let Some(stm_pos) = xref_stm
            && visited.insert(stm_pos)
        {
            match load_xref_stream_at(data, stm_pos) {
                Ok(stm) => xrefs.push(stm),
                Err(e) => warn!(offset = stm_pos, error = %e, "ignoring unreadable /XRefStm"),
            }
        }
        xrefs.push(xref);

        match prev {
            Some(prev) => pos = prev,
            None => break,
        }
    }
    Ok(xrefs)
}

fn load_xref_at(data: &Bytes, pos: usize) -> Result<XRef> {
    if data.get(pos..).is_some_and(|d| d.starts_with(b"xref")) {
        parse_xref_table(data, pos)
    } else {
        load_xref_stream_at(data, pos)
    }
}

fn load_xref_stream_at(data: &Bytes, pos: usize) -> Result<XRef> {
    let body = data
        .get(pos..)
        .ok_or_else(|| PdfError::SyntaxError(format!("xref offset {pos} outside file")))?;
    let (objid, _) = read_number(body)?;
    let objid = u32::try_from(objid)
        .map_err(|_| PdfError::SyntaxError(format!("bad xref stream object {objid}")))?;

    let (_, object) = parse_indirect(data, pos, objid, |len| len.as_int().ok())?;
    let stream = object.as_stream()?;
    if !stream.is_type("XRef") {
        return Err(PdfError::SyntaxError(format!(
            "object at offset {pos} is not an xref stream"
        )));
    }
    parse_xref_stream(stream, &decode_stream(stream)?)
}

/// Undo the stream's filter chain. Only `FlateDecode` (with predictors)
/// and `Crypt` are understood; anything else is an error.
pub fn decode_stream(stream: &PDFStream) -> Result<Vec<u8>> {
    let filters: Vec<&PDFObject> = match stream.get("Filter") {
        None | Some(PDFObject::Null) => Vec::new(),
        Some(PDFObject::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };
    let parms: Vec<Option<&PDFDict>> = match stream.get("DecodeParms") {
        Some(PDFObject::Array(items)) => items.iter().map(|p| p.as_dict().ok()).collect(),
        Some(other) => vec![other.as_dict().ok()],
        None => Vec::new(),
    };

    let mut data = stream.get_rawdata().to_vec();
    for (i, filter) in filters.iter().enumerate() {
        match filter.as_name()? {
            "FlateDecode" | "Fl" => {
                data = flate_decode(&data);
                if let Some(parms) = parms.get(i).copied().flatten() {
                    data = apply_predictor(data, &predictor_params(parms))?;
                }
            }
            "Crypt" => {}
            other => {
                return Err(PdfError::DecodeError(format!("unsupported filter /{other}")));
            }
        }
    }
    Ok(data)
}

fn predictor_params(parms: &PDFDict) -> PredictorParams {
    let get = |key: &str, default: usize| {
        parms
            .get(key)
            .and_then(|v| v.as_int().ok())
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(default)
    };
    let defaults = PredictorParams::default();
    PredictorParams {
        predictor: get("Predictor", defaults.predictor),
        colors: get("Colors", defaults.colors),
        bits_per_component: get("BitsPerComponent", defaults.bits_per_component),
        columns: get("Columns", defaults.columns),
    }
}
