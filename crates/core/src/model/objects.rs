//! PDF object model.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;

/// Dictionary type. Insertion order is kept so rewritten output follows
/// the source key order.
pub type PDFDict = IndexMap<String, PDFObject>;

/// A parsed PDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    /// Name object (e.g., /Type, /Filter). Each source byte is held as
    /// the char of the same value; see [`name_from_bytes`].
    Name(String),
    /// String (byte array)
    String(Vec<u8>),
    Array(Vec<Self>),
    Dict(PDFDict),
    Stream(Box<PDFStream>),
    /// Indirect object reference
    Ref(PDFObjRef),
}

impl PDFObject {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(PdfError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Integer value, accepting reals with no fractional part.
    ///
    /// Some writers emit `/Length 128.0` or `/P -1028.0`.
    pub fn as_integral(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            Self::Real(r) if r.fract() == 0.0 && r.is_finite() => Ok(*r as i64),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(PdfError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Dictionary view. Streams expose their attribute dictionary.
    pub fn as_dict(&self) -> Result<&PDFDict> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&s.attrs),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    pub fn as_stream(&self) -> Result<&PDFStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    pub const fn as_ref(&self) -> Result<&PDFObjRef> {
        match self {
            Self::Ref(r) => Ok(r),
            _ => Err(PdfError::TypeError {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }

    /// Visit every indirect reference reachable inside this object.
    pub fn for_each_ref<F: FnMut(PDFObjRef)>(&self, f: &mut F) {
        match self {
            Self::Ref(r) => f(*r),
            Self::Array(arr) => {
                for item in arr {
                    item.for_each_ref(f);
                }
            }
            Self::Dict(dict) => {
                for value in dict.values() {
                    value.for_each_ref(f);
                }
            }
            Self::Stream(s) => {
                for value in s.attrs.values() {
                    value.for_each_ref(f);
                }
            }
            _ => {}
        }
    }
}

/// Decode name bytes one char per byte.
///
/// Names are byte strings with no fixed encoding. Mapping each byte to
/// the char of equal value keeps ASCII lookups working while non-UTF-8
/// bytes (Shift-JIS font names, for one) survive a rewrite unchanged.
pub fn name_from_bytes(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Inverse of [`name_from_bytes`]. Chars above U+00FF can only come from
/// names built in code and are written as UTF-8.
pub fn name_to_bytes(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len());
    for c in name.chars() {
        match u8::try_from(c) {
            Ok(b) => out.push(b),
            Err(_) => out.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }
    out
}

/// `objid genno R`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PDFObjRef {
    pub objid: u32,
    pub genno: u32,
}

impl PDFObjRef {
    pub const fn new(objid: u32, genno: u32) -> Self {
        Self { objid, genno }
    }
}

/// Stream attributes plus the bytes between `stream` and `endstream`.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    pub attrs: PDFDict,
    /// Raw (still encoded, possibly still encrypted) data
    rawdata: Bytes,
    /// Whether rawdata has already been decrypted
    rawdata_decrypted: bool,
}

impl PDFStream {
    pub fn new(attrs: PDFDict, rawdata: impl Into<Bytes>) -> Self {
        Self {
            attrs,
            rawdata: rawdata.into(),
            rawdata_decrypted: false,
        }
    }

    pub fn get_rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    pub const fn rawdata_is_decrypted(&self) -> bool {
        self.rawdata_decrypted
    }

    /// Replace rawdata and mark it as decrypted.
    pub fn set_rawdata_decrypted(&mut self, data: Vec<u8>) {
        self.rawdata = Bytes::from(data);
        self.rawdata_decrypted = true;
    }

    pub fn get(&self, name: &str) -> Option<&PDFObject> {
        self.attrs.get(name)
    }

    /// True when `/Type` names `type_name`.
    pub fn is_type(&self, type_name: &str) -> bool {
        matches!(self.attrs.get("Type"), Some(PDFObject::Name(n)) if n == type_name)
    }
}

/// A materialised indirect object.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub objid: u32,
    pub genno: u32,
    pub object: PDFObject,
}

impl IndirectObject {
    pub const fn new(objid: u32, genno: u32, object: PDFObject) -> Self {
        Self {
            objid,
            genno,
            object,
        }
    }
}
