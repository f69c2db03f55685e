//! Tokenizer and direct-object parser.

pub mod lexer;
pub mod pdf_parser;

pub use lexer::{Lexer, Token};
pub use pdf_parser::PDFParser;
