//! PDF object parser - builds `PDFObject`s from lexer tokens.

use crate::error::{PdfError, Result};
use crate::model::objects::{PDFDict, PDFObjRef, PDFObject};

use super::lexer::{Lexer, Token};

/// Nesting limit for arrays and dictionaries. Hostile files can nest
/// deeply enough to exhaust the stack otherwise.
const MAX_DEPTH: usize = 256;

/// Parses direct objects, folding `n g R` into references.
pub struct PDFParser<'a> {
    data: &'a [u8],
    lexer: Lexer<'a>,
    /// Pushed-back tokens, last element is the next token
    lookahead: Vec<(usize, Token)>,
}

impl<'a> PDFParser<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            lexer: Lexer::new(data),
            lookahead: Vec::new(),
        }
    }

    /// Position just past the last consumed token.
    pub fn tell(&self) -> usize {
        self.lookahead
            .last()
            .map_or_else(|| self.lexer.tell(), |(pos, _)| *pos)
    }

    /// Unconsumed input after the last consumed token.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.tell()..]
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.lexer.next_token().transpose()
    }

    fn push_back(&mut self, tok: (usize, Token)) {
        self.lookahead.push(tok);
    }

    /// Parse the next direct object.
    pub fn parse_object(&mut self) -> Result<PDFObject> {
        self.parse_at_depth(0)
    }

    /// Read the next token if it is the keyword `kw`.
    pub fn expect_keyword(&mut self, kw: &[u8]) -> Result<()> {
        match self.next_token()? {
            Some((_, tok)) if tok.is_keyword(kw) => Ok(()),
            Some((pos, tok)) => Err(PdfError::TokenError {
                pos,
                msg: format!(
                    "expected '{}', got {:?}",
                    String::from_utf8_lossy(kw),
                    tok
                ),
            }),
            None => Err(PdfError::UnexpectedEof),
        }
    }

    fn parse_at_depth(&mut self, depth: usize) -> Result<PDFObject> {
        let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
        self.token_to_object(pos, token, depth)
    }

    fn token_to_object(&mut self, pos: usize, token: Token, depth: usize) -> Result<PDFObject> {
        match token {
            Token::Int(n) => Ok(self.maybe_reference(n)?),
            Token::Real(n) => Ok(PDFObject::Real(n)),
            Token::Bool(b) => Ok(PDFObject::Bool(b)),
            Token::Name(s) => Ok(PDFObject::Name(s)),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::Keyword(kw) => match kw.as_slice() {
                b"null" => Ok(PDFObject::Null),
                b"[" => self.parse_array(depth + 1),
                b"<<" => self.parse_dict(depth + 1),
                _ => Err(PdfError::TokenError {
                    pos,
                    msg: format!("unexpected keyword: {}", String::from_utf8_lossy(&kw)),
                }),
            },
        }
    }

    /// `n` followed by `g R` is a reference; otherwise a plain integer.
    fn maybe_reference(&mut self, n: i64) -> Result<PDFObject> {
        let Some(second) = self.next_token()? else {
            return Ok(PDFObject::Int(n));
        };
        if let Token::Int(g) = second.1 {
            match self.next_token()? {
                Some((_, ref third)) if third.is_keyword(b"R") => {
                    let objid = u32::try_from(n).map_err(|_| PdfError::TokenError {
                        pos: second.0,
                        msg: format!("invalid object number {n}"),
                    })?;
                    let genno = u32::try_from(g).map_err(|_| PdfError::TokenError {
                        pos: second.0,
                        msg: format!("invalid generation number {g}"),
                    })?;
                    return Ok(PDFObject::Ref(PDFObjRef::new(objid, genno)));
                }
                Some(third) => self.push_back(third),
                None => {}
            }
        }
        self.push_back(second);
        Ok(PDFObject::Int(n))
    }

    fn parse_array(&mut self, depth: usize) -> Result<PDFObject> {
        self.check_depth(depth)?;
        let mut arr = Vec::new();
        loop {
            let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token.is_keyword(b"]") {
                break;
            }
            arr.push(self.token_to_object(pos, token, depth)?);
        }
        Ok(PDFObject::Array(arr))
    }

    fn parse_dict(&mut self, depth: usize) -> Result<PDFObject> {
        self.check_depth(depth)?;
        let mut dict = PDFDict::new();
        loop {
            let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            let key = match token {
                Token::Keyword(ref kw) if kw == b">>" => break,
                Token::Name(name) => name,
                _ => {
                    return Err(PdfError::TokenError {
                        pos,
                        msg: "expected name as dict key".into(),
                    });
                }
            };
            let value = self.parse_at_depth(depth)?;
            // Null values are equivalent to absent keys.
            if !value.is_null() {
                dict.insert(key, value);
            }
        }
        Ok(PDFObject::Dict(dict))
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(PdfError::TokenError {
                pos: self.tell(),
                msg: "objects nested too deeply".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_references() {
        let mut parser = PDFParser::new(b"[1 0 R 2 5 R 7]");
        let obj = parser.parse_object().unwrap();
        assert_eq!(
            obj,
            PDFObject::Array(vec![
                PDFObject::Ref(PDFObjRef::new(1, 0)),
                PDFObject::Ref(PDFObjRef::new(2, 5)),
                PDFObject::Int(7),
            ])
        );
    }

    #[test]
    fn integers_before_non_reference_are_kept() {
        let mut parser = PDFParser::new(b"3 4 obj");
        assert_eq!(parser.parse_object().unwrap(), PDFObject::Int(3));
        assert_eq!(parser.parse_object().unwrap(), PDFObject::Int(4));
        parser.expect_keyword(b"obj").unwrap();
    }

    #[test]
    fn dict_keeps_key_order_and_reports_tail() {
        let mut parser = PDFParser::new(b"<< /Z 1 /A (x) /M null >>\nstream\n");
        let obj = parser.parse_object().unwrap();
        let keys: Vec<&str> = obj.as_dict().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Z", "A"]);
        assert!(parser.remaining().starts_with(b"\nstream"));
    }

    #[test]
    fn tell_points_at_pushed_back_token() {
        let mut parser = PDFParser::new(b"10 20 endobj");
        parser.parse_object().unwrap();
        assert_eq!(parser.tell(), 3);
        assert_eq!(parser.remaining(), b"20 endobj");
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let data = [b'['; 1000];
        let mut parser = PDFParser::new(&data);
        assert!(parser.parse_object().is_err());
    }

    #[test]
    fn non_name_dict_key_is_rejected() {
        let mut parser = PDFParser::new(b"<< 1 2 >>");
        assert!(parser.parse_object().is_err());
    }
}
