//! Stream filter decoding.
//!
//! The distilled object model only needs enough filters to make a document
//! walkable end to end: `FlateDecode` (via `flate2`, the same crate
//! `pmnxis-card-receipt-ocr` and `typst-typst` reach for), plus the two ASCII
//! transport filters that commonly wrap it inside PostScript-flavored
//! producers. Anything else is logged and passed through undecoded rather
//! than failing the whole document — a single unsupported image filter
//! shouldn't stop the rest of the page from rendering.

use std::io::Read;

use log::warn;

use crate::error::Error;
use crate::pdf::object::{Dictionary, Object};
use crate::pdf::resolver::Resolver;

pub fn decode<'a>(dict: Dictionary<'a>, raw: &'a [u8], resolver: &Resolver<'a>) -> Result<&'a [u8], Error> {
    let filters = filter_names(dict, resolver)?;
    let mut current = raw.to_vec();
    for name in &filters {
        current = apply_filter(name, &current)?;
    }
    Ok(resolver.byte_arena().alloc_vec(current))
}

/// Same filter pipeline, but without a `Resolver` available (used while
/// loading the xref table itself, before a `Resolver` can exist). Only
/// direct (non-indirect) `/Filter` names are supported here, which matches
/// what `/Type /XRef` streams actually use in practice.
pub fn decode_self_contained(dict: Dictionary, raw: &[u8]) -> Result<Vec<u8>, Error> {
    let mut names = Vec::new();
    match dict.get("Filter") {
        Some(Object::Name(n)) => names.push(String::from_utf8_lossy(n.as_bytes()).into_owned()),
        Some(Object::Array(arr)) => {
            for item in *arr {
                if let Some(n) = item.as_name() {
                    names.push(String::from_utf8_lossy(n.as_bytes()).into_owned());
                }
            }
        }
        _ => {}
    }
    let mut current = raw.to_vec();
    for name in &names {
        current = apply_filter(name, &current)?;
    }
    Ok(current)
}

fn filter_names(dict: Dictionary, resolver: &Resolver) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    match crate::pdf::deserialize::optional(dict, resolver, "Filter")? {
        Some(Object::Name(n)) => names.push(String::from_utf8_lossy(n.as_bytes()).into_owned()),
        Some(Object::Array(arr)) => {
            for item in arr {
                let resolved = resolver.resolve_object(item, true)?;
                if let Some(n) = resolved.as_name() {
                    names.push(String::from_utf8_lossy(n.as_bytes()).into_owned());
                }
            }
        }
        _ => {}
    }
    Ok(names)
}

fn apply_filter(name: &str, input: &[u8]) -> Result<Vec<u8>, Error> {
    match name {
        "FlateDecode" | "Fl" => flate_decode(input),
        "ASCIIHexDecode" | "AHx" => Ok(ascii_hex_decode(input)),
        "ASCII85Decode" | "A85" => Ok(ascii85_decode(input)),
        other => {
            warn!("unsupported stream filter `{other}`, passing bytes through undecoded");
            Ok(input.to_vec())
        }
    }
}

fn flate_decode(input: &[u8]) -> Result<Vec<u8>, Error> {
    let mut decoder = flate2::read::ZlibDecoder::new(input);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn ascii_hex_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut nibble: Option<u8> = None;
    for &b in input {
        if b == b'>' {
            break;
        }
        let Some(v) = hex_value(b) else { continue };
        match nibble.take() {
            Some(hi) => out.push((hi << 4) | v),
            None => nibble = Some(v),
        }
    }
    if let Some(hi) = nibble {
        out.push(hi << 4);
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn ascii85_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut group_len = 0;
    let mut iter = input.iter().copied().peekable();
    // Skip the conventional `<~` prefix if present.
    if input.starts_with(b"<~") {
        iter.next();
        iter.next();
    }
    while let Some(b) = iter.next() {
        if b == b'~' {
            break;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        if b == b'z' && group_len == 0 {
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        group[group_len] = b - b'!';
        group_len += 1;
        if group_len == 5 {
            out.extend_from_slice(&decode_group(&group, 5));
            group_len = 0;
        }
    }
    if group_len > 0 {
        for slot in group.iter_mut().skip(group_len) {
            *slot = 84; // pad with 'u' - '!'
        }
        let decoded = decode_group(&group, group_len);
        out.extend_from_slice(&decoded[..group_len - 1]);
    }
    out
}

fn decode_group(group: &[u8; 5], len: usize) -> [u8; 4] {
    let _ = len;
    let value = group
        .iter()
        .fold(0u32, |acc, &digit| acc.wrapping_mul(85).wrapping_add(digit as u32));
    value.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_hex_decodes_pairs_and_stops_at_eod_marker() {
        assert_eq!(ascii_hex_decode(b"48656c6c6f>ignored"), b"Hello");
    }

    #[test]
    fn ascii_hex_pads_an_odd_trailing_nibble_with_zero() {
        assert_eq!(ascii_hex_decode(b"4"), vec![0x40]);
    }

    #[test]
    fn ascii85_roundtrips_a_short_string() {
        // "Man " encodes to the classic `9jqo^` example from the ASCII85 spec.
        assert_eq!(ascii85_decode(b"9jqo^~>"), b"Man ");
    }

    #[test]
    fn ascii85_z_shorthand_expands_to_four_zero_bytes() {
        assert_eq!(ascii85_decode(b"z~>"), vec![0, 0, 0, 0]);
    }

    #[test]
    fn flate_decode_inflates_a_zlib_stream() {
        use std::io::Write;
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello world").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(flate_decode(&compressed).unwrap(), b"hello world");
    }

    #[test]
    fn unsupported_filter_passes_bytes_through_unchanged() {
        assert_eq!(apply_filter("DCTDecode", b"raw").unwrap(), b"raw");
    }
}
