//! Serialization of a decrypted object graph into a classic,
//! unencrypted PDF file.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::model::objects::{IndirectObject, PDFDict, PDFObject, PDFStream, name_to_bytes};
use crate::parser::lexer::{is_delimiter, is_whitespace};

/// Trailer keys carried over to the rewritten file.
const KEPT_TRAILER_KEYS: [&str; 3] = ["Root", "Info", "ID"];

/// Write `objects` as a complete document.
///
/// Objects keep their numbers and generations and are emitted in
/// ascending order. The trailer keeps only `/Root`, `/Info` and `/ID`;
/// `/Size` is recomputed.
pub fn write_document(
    version: &str,
    objects: &BTreeMap<u32, IndirectObject>,
    trailer: &PDFDict,
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("%PDF-{version}\n").as_bytes());
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets: BTreeMap<u32, (usize, u32)> = BTreeMap::new();
    for (&objid, obj) in objects {
        if let PDFObject::Stream(s) = &obj.object
            && (s.is_type("XRef") || s.is_type("ObjStm"))
        {
            continue;
        }
        offsets.insert(objid, (out.len(), obj.genno));
        out.extend_from_slice(format!("{objid} {} obj\n", obj.genno).as_bytes());
        write_object(&mut out, &obj.object);
        out.extend_from_slice(b"\nendobj\n");
    }

    let startxref = out.len();
    write_xref_table(&mut out, &offsets);

    let size = offsets.keys().next_back().map_or(1, |&last| last + 1);
    let mut new_trailer = PDFDict::new();
    new_trailer.insert("Size".into(), PDFObject::Int(i64::from(size)));
    for key in KEPT_TRAILER_KEYS {
        if let Some(value) = trailer.get(key) {
            new_trailer.insert(key.into(), value.clone());
        }
    }
    out.extend_from_slice(b"trailer\n");
    write_dict(&mut out, &new_trailer);
    out.extend_from_slice(format!("\nstartxref\n{startxref}\n%%EOF\n").as_bytes());
    out
}

fn write_xref_table(out: &mut Vec<u8>, offsets: &BTreeMap<u32, (usize, u32)>) {
    out.extend_from_slice(b"xref\n");

    // Contiguous runs, object 0 heading the first.
    let mut runs: Vec<(u32, Vec<Option<(usize, u32)>>)> = vec![(0, vec![None])];
    for (&objid, &entry) in offsets {
        match runs.last_mut() {
            Some((start, entries)) if *start + entries.len() as u32 == objid => {
                entries.push(Some(entry));
            }
            _ => runs.push((objid, vec![Some(entry)])),
        }
    }

    let mut text = String::new();
    for (start, entries) in runs {
        let _ = writeln!(text, "{start} {}", entries.len());
        for entry in entries {
            match entry {
                Some((offset, genno)) => {
                    let _ = write!(text, "{offset:010} {genno:05} n\r\n");
                }
                None => text.push_str("0000000000 65535 f\r\n"),
            }
        }
    }
    out.extend_from_slice(text.as_bytes());
}

pub fn write_object(out: &mut Vec<u8>, obj: &PDFObject) {
    match obj {
        PDFObject::Null => out.extend_from_slice(b"null"),
        PDFObject::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        PDFObject::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        PDFObject::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        PDFObject::Name(name) => write_name(out, name),
        PDFObject::String(s) => write_string(out, s),
        PDFObject::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        PDFObject::Dict(dict) => write_dict(out, dict),
        PDFObject::Stream(stream) => write_stream(out, stream),
        PDFObject::Ref(r) => out.extend_from_slice(format!("{} {} R", r.objid, r.genno).as_bytes()),
    }
}

fn write_dict(out: &mut Vec<u8>, dict: &PDFDict) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict {
        out.push(b' ');
        write_name(out, key);
        out.push(b' ');
        write_object(out, value);
    }
    out.extend_from_slice(b" >>");
}

fn write_stream(out: &mut Vec<u8>, stream: &PDFStream) {
    let data = stream.get_rawdata();
    let mut attrs = stream.attrs.clone();
    attrs.insert("Length".into(), PDFObject::Int(data.len() as i64));
    write_dict(out, &attrs);
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for b in name_to_bytes(name) {
        if b == b'#' || !(0x21..=0x7E).contains(&b) || is_delimiter(b) || is_whitespace(b) {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        } else {
            out.push(b);
        }
    }
}

/// Literal syntax for printable ASCII, hex otherwise.
fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    if s.iter().all(|b| (0x20..=0x7E).contains(b)) {
        out.push(b'(');
        for &b in s {
            if matches!(b, b'(' | b')' | b'\\') {
                out.push(b'\\');
            }
            out.push(b);
        }
        out.push(b')');
    } else {
        out.push(b'<');
        for b in s {
            out.extend_from_slice(format!("{b:02X}").as_bytes());
        }
        out.push(b'>');
    }
}

/// Plain decimal; non-finite values become 0.
fn format_real(r: f64) -> String {
    if !r.is_finite() {
        return "0".into();
    }
    let s = format!("{r}");
    if s.contains('.') { s } else { format!("{s}.0") }
}
