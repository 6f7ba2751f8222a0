//! Cross-reference table and trailer loading.
//!
//! Grounded on the teacher's `pdf::file_structure`, which writes the
//! mirror-image of this: a classic xref table plus trailer dictionary
//! appended after the object stream. This module walks the file from the
//! end instead of building it from the front — find `startxref`, parse the
//! xref section(s) it points to (classic table or `/Type /XRef` stream,
//! per PDF 1.5+), and chain through `/Prev` until exhausted.

use std::collections::HashMap;

use crate::error::Error;
use crate::pdf::object::{Dictionary, Object, ObjectId};

#[derive(Debug, Clone, Copy)]
pub enum XrefEntry {
    /// A direct byte offset into the file for an uncompressed object.
    Offset(usize),
    /// An object stored inside an object stream: `(stream object number,
    /// index within that stream)`.
    InStream { stream_number: u32, index: u32 },
}

pub struct XrefTable {
    entries: HashMap<ObjectId, XrefEntry>,
    trailer_offset: usize,
}

impl XrefTable {
    /// Locates and parses the cross-reference chain starting from the
    /// `startxref` pointer near the end of the file.
    pub fn load(buffer: &[u8]) -> Result<XrefTable, Error> {
        let start = find_startxref(buffer)?;
        let mut entries = HashMap::new();
        let mut trailer_offset = None;
        let mut next = Some(start);
        let mut seen = std::collections::HashSet::new();

        while let Some(offset) = next {
            if !seen.insert(offset) {
                break; // guards against a `/Prev` cycle in a malformed file
            }
            let section = parse_xref_section(buffer, offset)?;
            if trailer_offset.is_none() {
                trailer_offset = Some(section.trailer_offset);
            }
            for (id, entry) in section.entries {
                entries.entry(id).or_insert(entry);
            }
            next = section.prev;
        }

        Ok(XrefTable {
            entries,
            trailer_offset: trailer_offset.ok_or(Error::Invalid(crate::error::InvalidKind::Header))?,
        })
    }

    pub fn offset_of(&self, id: ObjectId) -> Option<usize> {
        match self.entries.get(&id)? {
            XrefEntry::Offset(offset) => Some(*offset),
            // Resolving objects embedded in an object stream requires
            // decompressing that stream first; callers that need those ids
            // go through `Resolver::resolve_ref`, which special-cases
            // `InStream` via `entry_of`.
            XrefEntry::InStream { .. } => None,
        }
    }

    pub fn entry_of(&self, id: ObjectId) -> Option<XrefEntry> {
        self.entries.get(&id).copied()
    }

    /// Parses the trailer dictionary out of the primary (most recent) xref
    /// section. `buffer` must be the same slice the table was loaded from.
    pub fn trailer<'a>(&self, buffer: &'a [u8]) -> Dictionary<'a> {
        crate::pdf::syntax::parse_dictionary_at(buffer, self.trailer_offset)
            .unwrap_or(Dictionary { pairs: &[] })
    }
}

fn find_startxref(buffer: &[u8]) -> Result<usize, Error> {
    const TAIL_SCAN: usize = 2048;
    let start = buffer.len().saturating_sub(TAIL_SCAN);
    let tail = &buffer[start..];
    let needle = b"startxref";
    let pos = tail
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or(Error::Invalid(crate::error::InvalidKind::Header))?;
    let mut cursor = crate::cursor::Cursor::at(buffer, start + pos + needle.len())?;
    skip_whitespace(&mut cursor);
    let n = read_uint(&mut cursor)?;
    Ok(n as usize)
}

struct XrefSection {
    entries: HashMap<ObjectId, XrefEntry>,
    trailer_offset: usize,
    prev: Option<usize>,
}

fn parse_xref_section(buffer: &[u8], offset: usize) -> Result<XrefSection, Error> {
    let mut cursor = crate::cursor::Cursor::at(buffer, offset)?;
    skip_whitespace(&mut cursor);
    if cursor.peek_bytes(4).map(|b| b == b"xref").unwrap_or(false) {
        parse_classic_xref(buffer, offset)
    } else {
        parse_xref_stream(buffer, offset)
    }
}

/// `xref` \n `<first> <count>` \n `nnnnnnnnnn ggggg n/f` lines, repeated for
/// each subsection, followed by `trailer` and a dictionary.
fn parse_classic_xref(buffer: &[u8], offset: usize) -> Result<XrefSection, Error> {
    let mut cursor = crate::cursor::Cursor::at(buffer, offset)?;
    cursor.advance(4)?; // "xref"
    let mut entries = HashMap::new();

    loop {
        skip_whitespace(&mut cursor);
        if cursor.peek_bytes(7).map(|b| b == b"trailer").unwrap_or(false) {
            cursor.advance(7)?;
            break;
        }
        let first = read_uint(&mut cursor)?;
        skip_spaces(&mut cursor);
        let count = read_uint(&mut cursor)?;
        skip_whitespace(&mut cursor);
        for i in 0..count {
            skip_whitespace(&mut cursor);
            let line = cursor.bytes(20)?;
            let text = std::str::from_utf8(&line[..18]).map_err(|_| Error::Invalid(crate::error::InvalidKind::Header))?;
            let off: usize = text[0..10].trim().parse().map_err(|_| Error::Invalid(crate::error::InvalidKind::Header))?;
            let gen: u16 = text[11..16].trim().parse().map_err(|_| Error::Invalid(crate::error::InvalidKind::Header))?;
            let kind = line[17];
            let id = ObjectId { number: (first + i) as u32, generation: gen };
            if kind == b'n' {
                entries.insert(id, XrefEntry::Offset(off));
            }
        }
    }

    skip_whitespace(&mut cursor);
    let trailer_offset = cursor.position();
    let trailer = crate::pdf::syntax::parse_dictionary_at(buffer, trailer_offset)?;
    let prev = trailer
        .get("Prev")
        .and_then(Object::as_integer)
        .map(|n| n as usize);

    Ok(XrefSection { entries, trailer_offset, prev })
}

/// A `/Type /XRef` cross-reference stream (PDF 1.5+): the dictionary doubles
/// as the trailer, and entries are packed binary rows per `/W`.
fn parse_xref_stream(buffer: &[u8], offset: usize) -> Result<XrefSection, Error> {
    let obj = crate::pdf::syntax::parse_indirect_object_header_at(buffer, offset)?;
    let stream = obj.as_dict().ok_or(Error::Invalid(crate::error::InvalidKind::Header))?;
    let raw = obj
        .stream_raw_bytes()
        .ok_or(Error::Invalid(crate::error::InvalidKind::Header))?;

    let widths = stream
        .get("W")
        .and_then(Object::as_array)
        .ok_or(Error::MissingField { struct_name: "XRef", field: "W" })?;
    let w: Vec<usize> = widths
        .iter()
        .map(|o| o.as_integer().unwrap_or(0) as usize)
        .collect();
    if w.len() != 3 {
        return Err(Error::Invalid(crate::error::InvalidKind::Header));
    }

    let size = stream
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or(Error::MissingField { struct_name: "XRef", field: "Size" })?;

    let index: Vec<i64> = match stream.get("Index").and_then(Object::as_array) {
        Some(arr) => arr.iter().filter_map(Object::as_integer).collect(),
        None => vec![0, size],
    };

    // Streams are FlateDecode-compressed like any other stream; reuse the
    // filter pipeline, but it needs a `Resolver` for `/Length` indirection
    // in the general case. Cross-reference streams never reference other
    // indirect objects for their own parameters (per spec), so a length
    // taken directly from the dictionary is sufficient here.
    let decoded = crate::pdf::filters::decode_self_contained(stream, raw)?;

    let row_width = w[0] + w[1] + w[2];
    let mut entries = HashMap::new();
    let mut row_cursor = 0usize;
    let mut pairs = index.chunks(2);
    while let Some(&[first, count]) = pairs.next().map(|p| p) {
        for i in 0..count {
            if row_cursor + row_width > decoded.len() {
                break;
            }
            let row = &decoded[row_cursor..row_cursor + row_width];
            row_cursor += row_width;
            let kind = if w[0] == 0 { 1 } else { be_uint(&row[0..w[0]]) };
            let f2 = be_uint(&row[w[0]..w[0] + w[1]]);
            let f3 = be_uint(&row[w[0] + w[1]..]);
            let id = ObjectId { number: (first + i) as u32, generation: f3 as u16 };
            match kind {
                1 => {
                    entries.insert(id, XrefEntry::Offset(f2 as usize));
                }
                2 => {
                    entries.insert(id, XrefEntry::InStream { stream_number: f2 as u32, index: f3 as u32 });
                }
                _ => {}
            }
        }
    }

    let prev = stream.get("Prev").and_then(Object::as_integer).map(|n| n as usize);
    Ok(XrefSection { entries, trailer_offset: offset, prev })
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn skip_whitespace(cursor: &mut crate::cursor::Cursor) {
    while let Ok(b) = cursor.peek_u8() {
        if b.is_ascii_whitespace() {
            let _ = cursor.u8();
        } else {
            break;
        }
    }
}

fn skip_spaces(cursor: &mut crate::cursor::Cursor) {
    while let Ok(b) = cursor.peek_u8() {
        if b == b' ' {
            let _ = cursor.u8();
        } else {
            break;
        }
    }
}

fn read_uint(cursor: &mut crate::cursor::Cursor) -> Result<i64, Error> {
    let mut value: i64 = 0;
    let mut any = false;
    while let Ok(b) = cursor.peek_u8() {
        if b.is_ascii_digit() {
            value = value * 10 + (b - b'0') as i64;
            let _ = cursor.u8();
            any = true;
        } else {
            break;
        }
    }
    if any {
        Ok(value)
    } else {
        Err(Error::Invalid(crate::error::InvalidKind::Header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Each xref line must be exactly 20 bytes per the PDF spec
    /// (`nnnnnnnnnn ggggg n\r\n`), not just whitespace-separated fields.
    fn xref_line(offset: usize, generation: u16, kind: u8) -> String {
        format!("{:010} {:05} {}\r\n", offset, generation, kind as char)
    }

    #[test]
    fn loads_a_classic_single_section_xref_table() {
        let obj1 = b"1 0 obj\n<< /Type /Catalog >>\nendobj\n";
        let obj1_offset = 0;
        let xref_offset = obj1.len();

        let mut buffer = Vec::new();
        buffer.extend_from_slice(obj1);
        buffer.extend_from_slice(format!("xref\n0 2\n").as_bytes());
        buffer.extend_from_slice(xref_line(0, 65535, b'f').as_bytes());
        buffer.extend_from_slice(xref_line(obj1_offset, 0, b'n').as_bytes());
        buffer.extend_from_slice(b"trailer\n<< /Size 2 /Root 1 0 R >>\n");
        buffer.extend_from_slice(format!("startxref\n{}\n%%EOF", xref_offset).as_bytes());

        let table = XrefTable::load(&buffer).unwrap();
        let id = ObjectId { number: 1, generation: 0 };
        assert_eq!(table.offset_of(id), Some(obj1_offset));
        let root = table.trailer(&buffer).get("Root").unwrap().as_reference();
        assert_eq!(root, Some(id));
    }

    #[test]
    fn missing_startxref_is_an_error() {
        assert!(XrefTable::load(b"not a pdf").is_err());
    }
}
