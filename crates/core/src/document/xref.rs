//! Cross-reference sections: classic tables, xref streams and the
//! recovery scan used when neither can be read.

use std::collections::BTreeMap;

use regex::bytes::Regex;
use tracing::debug;

use crate::error::{PdfError, Result};
use crate::model::objects::{PDFDict, PDFObject, PDFStream};
use crate::parser::PDFParser;
use crate::parser::lexer::is_whitespace;

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free entry. Shadows in-use entries from older sections.
    Free,
    /// Byte offset of `n g obj` in the file.
    InFile { offset: usize, genno: u32 },
    /// Slot `index` of object stream `stream_objid`.
    InStream { stream_objid: u32, index: usize },
}

/// One cross-reference section with its trailer.
#[derive(Debug, Default, Clone)]
pub struct XRef {
    pub entries: BTreeMap<u32, XRefEntry>,
    pub trailer: PDFDict,
    /// Built by scanning for object headers
    pub is_fallback: bool,
}

impl XRef {
    pub fn get(&self, objid: u32) -> Option<XRefEntry> {
        self.entries.get(&objid).copied()
    }
}

/// Offset named by the last `startxref` in the final kilobyte.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let needle = b"startxref";
    let search_start = data.len().saturating_sub(1024);
    let tail = &data[search_start..];
    let found = tail
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or(PdfError::NoValidXRef)?;

    let mut rest = &tail[found + needle.len()..];
    while let Some((&b, more)) = rest.split_first() {
        if !is_whitespace(b) {
            break;
        }
        rest = more;
    }
    let (value, _) = read_number(rest)?;
    usize::try_from(value).map_err(|_| PdfError::NoValidXRef)
}

/// Parse `xref` subsections and the following trailer at `pos`.
pub fn parse_xref_table(data: &[u8], pos: usize) -> Result<XRef> {
    let section = data
        .get(pos..)
        .filter(|s| s.starts_with(b"xref"))
        .ok_or_else(|| PdfError::SyntaxError(format!("no xref keyword at offset {pos}")))?;

    let mut xref = XRef::default();
    let mut cursor = skip_ws(section, 4);

    loop {
        if cursor >= section.len() {
            return Err(PdfError::SyntaxError("xref table without trailer".into()));
        }
        if section[cursor..].starts_with(b"trailer") {
            cursor += 7;
            break;
        }

        let (start, used) = read_number(&section[cursor..])?;
        cursor = skip_ws(section, cursor + used);
        let (count, used) = read_number(&section[cursor..])?;
        cursor = skip_ws(section, cursor + used);

        let mut base = u32::try_from(start)
            .map_err(|_| PdfError::SyntaxError(format!("invalid xref subsection start {start}")))?;
        let count = u32::try_from(count)
            .map_err(|_| PdfError::SyntaxError(format!("invalid xref subsection count {count}")))?;
        for i in 0..count {
            let (offset, used) = read_number(&section[cursor..])?;
            cursor = skip_ws(section, cursor + used);
            let (genno, used) = read_number(&section[cursor..])?;
            cursor = skip_ws(section, cursor + used);
            let marker = section.get(cursor).copied().unwrap_or(b'f');
            cursor = skip_ws(section, cursor + 1);

            // Some writers start the first subsection at 1 yet still list
            // the object 0 free entry.
            if i == 0 && base == 1 && marker == b'f' && offset == 0 && genno == 65535 {
                base = 0;
            }

            let objid = base.checked_add(i).ok_or_else(|| {
                PdfError::SyntaxError("xref subsection exceeds object number range".into())
            })?;
            let entry = match marker {
                b'n' => XRefEntry::InFile {
                    offset: usize::try_from(offset).map_err(|_| {
                        PdfError::SyntaxError(format!("negative offset for object {objid}"))
                    })?,
                    genno: genno.clamp(0, u32::MAX as i64) as u32,
                },
                b'f' => XRefEntry::Free,
                other => {
                    return Err(PdfError::SyntaxError(format!(
                        "bad xref entry marker {:?} for object {objid}",
                        other as char
                    )));
                }
            };
            // Within one section the first entry for an object wins.
            xref.entries.entry(objid).or_insert(entry);
        }
    }

    let mut parser = PDFParser::new(&section[cursor..]);
    xref.trailer = parser.parse_object()?.as_dict()?.clone();
    Ok(xref)
}

/// Build a section from a decoded xref stream.
pub fn parse_xref_stream(stream: &PDFStream, decoded: &[u8]) -> Result<XRef> {
    let widths = stream
        .get("W")
        .ok_or_else(|| PdfError::SyntaxError("missing W in xref stream".into()))?
        .as_array()?
        .iter()
        .map(|w| w.as_int().map(|n| n.clamp(0, 8) as usize))
        .collect::<Result<Vec<_>>>()?;
    let &[w0, w1, w2] = widths.as_slice() else {
        return Err(PdfError::SyntaxError("W must have 3 elements".into()));
    };
    let entry_size = w0 + w1 + w2;
    if entry_size == 0 {
        return Err(PdfError::SyntaxError("xref stream entries are empty".into()));
    }

    let size = stream
        .get("Size")
        .ok_or_else(|| PdfError::SyntaxError("missing Size in xref stream".into()))?
        .as_int()?;

    let index: Vec<(i64, i64)> = match stream.get("Index") {
        Some(idx) => idx
            .as_array()?
            .chunks_exact(2)
            .map(|pair| Ok((pair[0].as_int()?, pair[1].as_int()?)))
            .collect::<Result<_>>()?,
        None => vec![(0, size)],
    };

    let mut xref = XRef::default();
    let mut rows = decoded.chunks_exact(entry_size);
    'sections: for (start, count) in index {
        for i in 0..count.max(0) {
            let Some(row) = rows.next() else {
                break 'sections;
            };
            let Some(objid) = start.checked_add(i).and_then(|n| u32::try_from(n).ok()) else {
                continue;
            };
            let kind = if w0 == 0 { 1 } else { read_be(&row[..w0]) };
            let field1 = read_be(&row[w0..w0 + w1]);
            let field2 = read_be(&row[w0 + w1..]);
            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::InFile {
                    offset: field1 as usize,
                    genno: field2 as u32,
                },
                2 => XRefEntry::InStream {
                    stream_objid: field1 as u32,
                    index: field2 as usize,
                },
                // Unknown types are treated as null references.
                _ => continue,
            };
            xref.entries.entry(objid).or_insert(entry);
        }
    }

    for (key, value) in &stream.attrs {
        if !matches!(
            key.as_str(),
            "Length" | "Filter" | "DecodeParms" | "W" | "Index" | "Type"
        ) {
            xref.trailer.insert(key.clone(), value.clone());
        }
    }

    Ok(xref)
}

/// Recovery: locate every `n g obj` header and the last trailer.
///
/// Later definitions of the same object win, as an incremental update
/// would have it.
pub fn scan_for_objects(data: &[u8]) -> Result<XRef> {
    let header = Regex::new(r"(\d+)\s+(\d+)\s+obj\b")
        .map_err(|e| PdfError::SyntaxError(e.to_string()))?;

    let mut xref = XRef {
        is_fallback: true,
        ..XRef::default()
    };
    for cap in header.captures_iter(data) {
        let (Some(whole), Some(id), Some(gen_)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        // Skip digits that are the tail of a longer token.
        if whole.start() > 0 && !is_whitespace(data[whole.start() - 1]) {
            continue;
        }
        let (Ok((objid, _)), Ok((genno, _))) = (read_number(id.as_bytes()), read_number(gen_.as_bytes()))
        else {
            continue;
        };
        let (Ok(objid), Ok(genno)) = (u32::try_from(objid), u32::try_from(genno)) else {
            continue;
        };
        xref.entries.insert(
            objid,
            XRefEntry::InFile {
                offset: whole.start(),
                genno,
            },
        );
    }

    let trailer_pos = data
        .windows(7)
        .rposition(|w| w == b"trailer")
        .ok_or(PdfError::NoValidXRef)?;
    let mut parser = PDFParser::new(&data[trailer_pos + 7..]);
    xref.trailer = match parser.parse_object()? {
        PDFObject::Dict(dict) => dict,
        other => {
            return Err(PdfError::TypeError {
                expected: "dict",
                got: other.type_name(),
            });
        }
    };

    if xref.entries.is_empty() {
        return Err(PdfError::NoValidXRef);
    }
    debug!(objects = xref.entries.len(), "rebuilt xref by scanning");
    Ok(xref)
}

/// Read an unsigned decimal (optionally signed) number; returns (value, bytes used).
pub fn read_number(data: &[u8]) -> Result<(i64, usize)> {
    let negative = data.first() == Some(&b'-');
    let start = usize::from(negative || data.first() == Some(&b'+'));
    let digits = data[start..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return Err(PdfError::SyntaxError("expected number".into()));
    }
    let end = start + digits;
    let value = std::str::from_utf8(&data[start..end])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| PdfError::SyntaxError("number out of range".into()))?;
    Ok((if negative { -value } else { value }, end))
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn skip_ws(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    pos
}
