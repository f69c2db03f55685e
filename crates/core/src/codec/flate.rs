//! FlateDecode and PNG predictors for cross-reference and object streams.

use std::io::Read;

use flate2::read::ZlibDecoder;
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{PdfError, Result};

/// Inflate a zlib stream.
///
/// Truncated or corrupted input yields whatever was decoded before the
/// failure, matching how readers treat damaged streams.
pub fn flate_decode(data: &[u8]) -> Vec<u8> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    if decoder.read_to_end(&mut out).is_ok() {
        return out;
    }
    decompress_corrupted(data)
}

fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

/// Parameters of a `/DecodeParms` dictionary that matter for predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: usize,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

/// Undo a predictor. Only PNG predictors (10..=15) are supported.
pub fn apply_predictor(data: Vec<u8>, params: &PredictorParams) -> Result<Vec<u8>> {
    match params.predictor {
        0 | 1 => Ok(data),
        10..=15 => png_unpredict(
            &data,
            params.columns,
            params.colors,
            params.bits_per_component,
        ),
        other => Err(PdfError::DecodeError(format!(
            "unsupported predictor {other}"
        ))),
    }
}

/// Bytes per predicted row, rejecting parameters that cannot describe a
/// row of `data`.
fn row_length(data_len: usize, columns: usize, colors: usize, bits: usize) -> Result<usize> {
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return Err(PdfError::DecodeError(format!(
            "invalid BitsPerComponent {bits}"
        )));
    }
    let row_bytes = colors
        .checked_mul(columns)
        .and_then(|n| n.checked_mul(bits))
        .map(|n| n.div_ceil(8))
        .filter(|&n| n > 0)
        .ok_or_else(|| {
            PdfError::DecodeError(format!(
                "invalid predictor row: {columns} columns x {colors} colors"
            ))
        })?;
    if row_bytes >= data_len {
        return Err(PdfError::DecodeError(format!(
            "predictor row of {row_bytes} bytes exceeds {data_len} bytes of data"
        )));
    }
    Ok(row_bytes)
}

fn png_unpredict(data: &[u8], columns: usize, colors: usize, bits: usize) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let row_bytes = row_length(data.len(), columns, colors, bits)?;
    let bpp = (colors * bits / 8).max(1);
    let row_size = row_bytes + 1;

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];
    let mut current_row = vec![0u8; row_bytes];

    for row in data.chunks_exact(row_size) {
        let filter_type = row[0];
        let row_data = &row[1..];

        for i in 0..row_bytes {
            let left = if i >= bpp { current_row[i - bpp] } else { 0 };
            let above = prev_row[i];
            let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            let predicted = match filter_type {
                1 => left,
                2 => above,
                3 => ((left as u16 + above as u16) / 2) as u8,
                4 => paeth(left, above, upper_left),
                _ => 0,
            };
            current_row[i] = row_data[i].wrapping_add(predicted);
        }

        result.extend_from_slice(&current_row);
        std::mem::swap(&mut prev_row, &mut current_row);
    }

    Ok(result)
}

const fn paeth(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}
