//! Encoding detection for transcript files.
//!
//! Recognition engines and earlier runs may leave transcripts in any
//! encoding. Before a transcript is read its bytes are classified: a BOM wins,
//! then strict UTF-8, then the `chardetng` statistical guess. Decoding is done
//! without replacement, so a mismatch between detected encoding and content
//! surfaces as an error instead of mojibake in the masters.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

/// A decoded text artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub encoding: &'static Encoding,
    pub text: String,
}

/// Determine the byte encoding of `bytes` and the BOM length to skip.
pub fn detect(bytes: &[u8]) -> (&'static Encoding, usize) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return (encoding, bom_len);
    }
    if std::str::from_utf8(bytes).is_ok() {
        return (UTF_8, 0);
    }
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    (detector.guess(None, true), 0)
}

/// Detect the encoding of `bytes` and decode them.
///
/// Returns a human-readable reason when the bytes are malformed for the
/// detected encoding.
pub fn decode(bytes: &[u8]) -> Result<DecodedText, String> {
    let (encoding, bom_len) = detect(bytes);
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        .ok_or_else(|| {
            format!(
                "bytes are malformed for detected encoding {}",
                encoding.name()
            )
        })?;
    Ok(DecodedText {
        encoding,
        text: text.into_owned(),
    })
}

/// Encode `text` for writing in `encoding`.
///
/// UTF-16 has no encoder in `encoding_rs`; such text is written as UTF-8,
/// which is what [`Encoding::output_encoding`] reports.
pub fn encode<'a>(text: &'a str, encoding: &'static Encoding) -> Result<Cow<'a, [u8]>, String> {
    let (bytes, used, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(format!("text cannot be represented in {}", used.name()));
    }
    Ok(bytes)
}

/// Byte-order mark of UTF-32 little-endian.
pub const UTF32LE_BOM: [u8; 4] = [0xFF, 0xFE, 0x00, 0x00];

/// Append `text` as UTF-32 little-endian code units.
pub fn push_utf32le(out: &mut Vec<u8>, text: &str) {
    out.reserve(text.len() * 4);
    for ch in text.chars() {
        out.extend_from_slice(&(ch as u32).to_le_bytes());
    }
}
