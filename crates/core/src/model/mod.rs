//! PDF object model: values, references, streams and indirect objects.

pub mod objects;

pub use objects::{IndirectObject, PDFDict, PDFObjRef, PDFObject, PDFStream};
