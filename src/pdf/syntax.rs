//! The PDF object syntax: tokenizing and parsing the eight primitive object
//! types plus indirect object/reference syntax.
//!
//! The teacher's `pdf::file_structure`/`pdf::document_structure` only ever
//! serialize this syntax; this module is its dual, reading `Cursor`-bounded
//! byte ranges back into `Object`. Composite objects (arrays, dictionaries)
//! are assembled into `Vec`s first and then handed to `ObjectArena` so their
//! slices live as long as the document, matching the zero-copy borrow the
//! rest of the object model assumes.

use crate::arena::ByteArena;
use crate::cursor::Cursor;
use crate::error::{Error, InvalidKind};
use crate::pdf::object::{Dictionary, Name, Object, ObjectArena, ObjectId, PdfString, Stream};

pub fn parse_dictionary_at<'a>(buffer: &'a [u8], offset: usize) -> Result<Dictionary<'a>, Error> {
    // Trailers are small, self-contained dictionaries with no nested
    // streams; a scratch arena local to this call is fine since nothing it
    // allocates needs to outlive the returned `Dictionary` (the `Name`s and
    // scalar `Object`s inside still borrow straight from `buffer`, and
    // `Dictionary::pairs` is the only thing leaked past this call, intentionally).
    let object_arena = Box::leak(Box::new(ObjectArena::new()));
    let byte_arena = Box::leak(Box::new(ByteArena::new()));
    let mut cursor = Cursor::at(buffer, offset)?;
    skip_whitespace_and_comments(&mut cursor);
    let obj = parse_object(&mut cursor, byte_arena, object_arena)?;
    obj.as_dict().ok_or(Error::Invalid(InvalidKind::Header))
}

/// Parses `<n> <gen> obj ... endobj`, returning the inner object. If the
/// object is a stream, `raw_bytes` spans exactly the bytes between
/// `stream\n` and `endstream`.
pub fn parse_indirect_object_at<'a>(
    buffer: &'a [u8],
    offset: usize,
    byte_arena: &'a ByteArena,
    object_arena: &'a ObjectArena<'a>,
) -> Result<Object<'a>, Error> {
    let mut cursor = Cursor::at(buffer, offset)?;
    skip_whitespace_and_comments(&mut cursor);
    let _number = read_integer(&mut cursor)?;
    skip_whitespace_and_comments(&mut cursor);
    let _generation = read_integer(&mut cursor)?;
    skip_whitespace_and_comments(&mut cursor);
    expect_keyword(&mut cursor, b"obj")?;
    skip_whitespace_and_comments(&mut cursor);
    let obj = parse_object(&mut cursor, byte_arena, object_arena)?;
    skip_whitespace_and_comments(&mut cursor);

    if let Object::Dictionary(dict) = obj {
        if cursor.peek_bytes(6).map(|b| b == b"stream").unwrap_or(false) {
            cursor.advance(6)?;
            // `stream` is followed by CRLF or LF, never a bare CR.
            if cursor.peek_u8() == Ok(b'\r') {
                cursor.advance(1)?;
            }
            if cursor.peek_u8() == Ok(b'\n') {
                cursor.advance(1)?;
            }
            let length = stream_length(dict, &cursor.buffer()[cursor.position()..])?;
            let raw = cursor.bytes(length)?;
            return Ok(Object::Stream(Stream { dict, raw_bytes: raw }));
        }
    }
    Ok(obj)
}

/// The same parse as `parse_indirect_object_at`, but for an already-resolved
/// decoded buffer (used for objects embedded in an object stream, which are
/// bare objects with no `obj`/`endobj` wrapper or `/Length`).
pub fn parse_object_at<'a>(
    buffer: &'a [u8],
    offset: usize,
    byte_arena: &'a ByteArena,
    object_arena: &'a ObjectArena<'a>,
) -> Result<Object<'a>, Error> {
    let mut cursor = Cursor::at(buffer, offset)?;
    skip_whitespace_and_comments(&mut cursor);
    parse_object(&mut cursor, byte_arena, object_arena)
}

/// For `/Type /XRef`-free object stream headers only, used while the
/// cross-reference table for the document's own object stream hasn't fully
/// been loaded (never requires resolving `/Length` through an indirect
/// reference, since xref streams define their own lengths directly).
pub fn parse_indirect_object_header_at<'a>(buffer: &'a [u8], offset: usize) -> Result<Object<'a>, Error> {
    let object_arena = Box::leak(Box::new(ObjectArena::new()));
    let byte_arena = Box::leak(Box::new(ByteArena::new()));
    parse_indirect_object_at(buffer, offset, byte_arena, object_arena)
}

/// Reads one `(number, number)` pair, as found in object-stream header
/// tables (`objnum offset` repeated `N` times).
pub fn read_two_integers(cursor: &mut Cursor) -> Result<(i64, i64), Error> {
    skip_whitespace_and_comments(cursor);
    let a = read_integer(cursor)?;
    skip_whitespace_and_comments(cursor);
    let b = read_integer(cursor)?;
    Ok((a, b))
}

fn stream_length(dict: Dictionary, buffer: &[u8]) -> Result<usize, Error> {
    match dict.get("Length") {
        Some(Object::Integer(n)) => Ok(*n as usize),
        // An indirect `/Length` requires resolving through the xref table,
        // which this low-level parser doesn't have access to. Every
        // well-formed writer pads `endstream` with a newline before it, so
        // scanning for the keyword from here recovers the same length.
        _ => buffer
            .windows(9)
            .position(|w| w == b"endstream")
            .ok_or(Error::MissingField { struct_name: "Stream", field: "Length" }),
    }
}

fn parse_object<'a>(
    cursor: &mut Cursor<'a>,
    byte_arena: &'a ByteArena,
    object_arena: &'a ObjectArena<'a>,
) -> Result<Object<'a>, Error> {
    skip_whitespace_and_comments(cursor);
    let b = cursor.peek_u8()?;
    match b {
        b'/' => parse_name(cursor).map(Object::Name),
        b'(' => parse_literal_string(cursor, byte_arena).map(Object::String),
        b'<' => {
            if cursor.peek_bytes(2).map(|b| b == b"<<").unwrap_or(false) {
                parse_dictionary(cursor, byte_arena, object_arena)
            } else {
                parse_hex_string(cursor, byte_arena).map(Object::String)
            }
        }
        b'[' => parse_array(cursor, byte_arena, object_arena),
        b't' | b'f' => parse_boolean(cursor),
        b'n' => {
            expect_keyword(cursor, b"null")?;
            Ok(Object::Null)
        }
        b'+' | b'-' | b'.' | b'0'..=b'9' => parse_number_or_reference(cursor),
        _ => Err(Error::Invalid(InvalidKind::Header)),
    }
}

fn parse_name<'a>(cursor: &mut Cursor<'a>) -> Result<Name<'a>, Error> {
    cursor.advance(1)?; // '/'
    let start = cursor.position();
    while let Ok(b) = cursor.peek_u8() {
        if is_regular_char(b) {
            cursor.advance(1)?;
        } else {
            break;
        }
    }
    let end = cursor.position();
    Ok(Name(&cursor.buffer()[start..end]))
}

fn is_regular_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn parse_boolean<'a>(cursor: &mut Cursor<'a>) -> Result<Object<'a>, Error> {
    if cursor.peek_bytes(4).map(|b| b == b"true").unwrap_or(false) {
        cursor.advance(4)?;
        Ok(Object::Boolean(true))
    } else {
        expect_keyword(cursor, b"false")?;
        Ok(Object::Boolean(false))
    }
}

/// Disambiguates `<int>`, `<real>`, and `<int> <int> R` (an indirect
/// reference) by speculatively looking ahead after the first integer.
fn parse_number_or_reference<'a>(cursor: &mut Cursor<'a>) -> Result<Object<'a>, Error> {
    let checkpoint = *cursor;
    if let Ok(n) = read_integer(cursor) {
        if cursor.peek_u8().map(|b| b != b'.').unwrap_or(true) {
            let after_int = *cursor;
            skip_whitespace_and_comments(cursor);
            if let Ok(gen) = read_integer(cursor) {
                skip_whitespace_and_comments(cursor);
                if cursor.peek_u8() == Ok(b'R') {
                    let save = *cursor;
                    cursor.advance(1)?;
                    if cursor.peek_u8().map(|b| !is_regular_char(b)).unwrap_or(true) {
                        return Ok(Object::Reference(ObjectId { number: n as u32, generation: gen as u16 }));
                    }
                    *cursor = save;
                }
            }
            *cursor = after_int;
            return Ok(Object::Integer(n));
        }
    }
    *cursor = checkpoint;
    parse_real(cursor)
}

fn read_integer(cursor: &mut Cursor) -> Result<i64, Error> {
    let negative = match cursor.peek_u8()? {
        b'-' => {
            cursor.advance(1)?;
            true
        }
        b'+' => {
            cursor.advance(1)?;
            false
        }
        _ => false,
    };
    let mut value: i64 = 0;
    let mut any = false;
    while let Ok(b) = cursor.peek_u8() {
        if b.is_ascii_digit() {
            value = value * 10 + (b - b'0') as i64;
            cursor.advance(1)?;
            any = true;
        } else {
            break;
        }
    }
    if !any {
        return Err(Error::Invalid(InvalidKind::Header));
    }
    Ok(if negative { -value } else { value })
}

fn parse_real<'a>(cursor: &mut Cursor<'a>) -> Result<Object<'a>, Error> {
    let start = cursor.position();
    if matches!(cursor.peek_u8(), Ok(b'+') | Ok(b'-')) {
        cursor.advance(1)?;
    }
    let mut any_digits = false;
    while matches!(cursor.peek_u8(), Ok(b) if b.is_ascii_digit()) {
        cursor.advance(1)?;
        any_digits = true;
    }
    if cursor.peek_u8() == Ok(b'.') {
        cursor.advance(1)?;
        while matches!(cursor.peek_u8(), Ok(b) if b.is_ascii_digit()) {
            cursor.advance(1)?;
            any_digits = true;
        }
    }
    if !any_digits {
        return Err(Error::Invalid(InvalidKind::Header));
    }
    let end = cursor.position();
    let text = std::str::from_utf8(&cursor.buffer()[start..end]).map_err(|_| Error::Invalid(InvalidKind::Header))?;
    let value: f64 = text.parse().map_err(|_| Error::Invalid(InvalidKind::Header))?;
    Ok(Object::Real(value))
}

fn parse_literal_string<'a>(cursor: &mut Cursor<'a>, byte_arena: &'a ByteArena) -> Result<PdfString<'a>, Error> {
    cursor.advance(1)?; // '('
    let mut depth = 1u32;
    let mut out = Vec::new();
    loop {
        let b = cursor.u8()?;
        match b {
            b'(' => {
                depth += 1;
                out.push(b);
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                out.push(b);
            }
            b'\\' => {
                let esc = cursor.u8()?;
                match esc {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    b'(' | b')' | b'\\' => out.push(esc),
                    b'\r' => {
                        if cursor.peek_u8() == Ok(b'\n') {
                            cursor.advance(1)?;
                        }
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        let mut value = (esc - b'0') as u32;
                        for _ in 0..2 {
                            match cursor.peek_u8() {
                                Ok(d @ b'0'..=b'7') => {
                                    value = value * 8 + (d - b'0') as u32;
                                    cursor.advance(1)?;
                                }
                                _ => break,
                            }
                        }
                        out.push(value as u8);
                    }
                    other => out.push(other),
                }
            }
            _ => out.push(b),
        }
    }
    Ok(PdfString(byte_arena.alloc_vec(out)))
}

fn parse_hex_string<'a>(cursor: &mut Cursor<'a>, byte_arena: &'a ByteArena) -> Result<PdfString<'a>, Error> {
    cursor.advance(1)?; // '<'
    let mut nibble: Option<u8> = None;
    let mut out = Vec::new();
    loop {
        let b = cursor.u8()?;
        if b == b'>' {
            break;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        let value = hex_digit(b).ok_or(Error::Invalid(InvalidKind::Header))?;
        match nibble.take() {
            Some(hi) => out.push((hi << 4) | value),
            None => nibble = Some(value),
        }
    }
    if let Some(hi) = nibble {
        out.push(hi << 4);
    }
    Ok(PdfString(byte_arena.alloc_vec(out)))
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn parse_array<'a>(
    cursor: &mut Cursor<'a>,
    byte_arena: &'a ByteArena,
    object_arena: &'a ObjectArena<'a>,
) -> Result<Object<'a>, Error> {
    cursor.advance(1)?; // '['
    let mut items = Vec::new();
    loop {
        skip_whitespace_and_comments(cursor);
        if cursor.peek_u8()? == b']' {
            cursor.advance(1)?;
            break;
        }
        items.push(parse_object(cursor, byte_arena, object_arena)?);
    }
    Ok(Object::Array(object_arena.alloc_array(items)))
}

fn parse_dictionary<'a>(
    cursor: &mut Cursor<'a>,
    byte_arena: &'a ByteArena,
    object_arena: &'a ObjectArena<'a>,
) -> Result<Object<'a>, Error> {
    cursor.advance(2)?; // '<<'
    let mut pairs = Vec::new();
    loop {
        skip_whitespace_and_comments(cursor);
        if cursor.peek_bytes(2).map(|b| b == b">>").unwrap_or(false) {
            cursor.advance(2)?;
            break;
        }
        let key = parse_name(cursor)?;
        skip_whitespace_and_comments(cursor);
        let value = parse_object(cursor, byte_arena, object_arena)?;
        pairs.push((key, value));
    }
    Ok(Object::Dictionary(Dictionary { pairs: object_arena.alloc_pairs(pairs) }))
}

fn expect_keyword(cursor: &mut Cursor, keyword: &[u8]) -> Result<(), Error> {
    let got = cursor.bytes(keyword.len())?;
    if got == keyword {
        Ok(())
    } else {
        Err(Error::Invalid(InvalidKind::Header))
    }
}

fn skip_whitespace_and_comments(cursor: &mut Cursor) {
    loop {
        match cursor.peek_u8() {
            Ok(b) if b.is_ascii_whitespace() => {
                let _ = cursor.advance(1);
            }
            Ok(b'%') => {
                while !matches!(cursor.peek_u8(), Ok(b'\n') | Ok(b'\r') | Err(_)) {
                    let _ = cursor.advance(1);
                }
            }
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_dictionary_with_mixed_scalar_types() {
        let buffer = b"<< /Type /Page /Count 3 /Rotate -90 /Version 1.5 /Linearized true >>";
        let dict = parse_dictionary_at(buffer, 0).unwrap();
        assert!(dict.get("Type").unwrap().as_name_eq("Page"));
        assert_eq!(dict.get("Count").unwrap().as_integer(), Some(3));
        assert_eq!(dict.get("Rotate").unwrap().as_integer(), Some(-90));
        assert_eq!(dict.get("Version").unwrap().as_real(), Some(1.5));
        assert!(matches!(dict.get("Linearized"), Some(Object::Boolean(true))));
    }

    #[test]
    fn disambiguates_an_indirect_reference_from_two_bare_integers() {
        let object_arena = ObjectArena::new();
        let byte_arena = ByteArena::new();
        let obj = parse_object_at(b"12 0 R", 0, &byte_arena, &object_arena).unwrap();
        assert_eq!(obj.as_reference(), Some(ObjectId { number: 12, generation: 0 }));
    }

    #[test]
    fn a_bare_integer_followed_by_another_integer_is_not_a_reference_without_r() {
        let object_arena = ObjectArena::new();
        let byte_arena = ByteArena::new();
        let obj = parse_object_at(b"12 0 obj", 0, &byte_arena, &object_arena).unwrap();
        assert_eq!(obj.as_integer(), Some(12));
    }

    #[test]
    fn parses_nested_arrays_and_names() {
        let object_arena = ObjectArena::new();
        let byte_arena = ByteArena::new();
        let obj = parse_object_at(b"[1 2 [/A /B]]", 0, &byte_arena, &object_arena).unwrap();
        let Object::Array(items) = obj else { panic!("expected array") };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_integer(), Some(1));
        let Object::Array(inner) = &items[2] else { panic!("expected nested array") };
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn parses_literal_string_escapes() {
        let byte_arena = ByteArena::new();
        let mut cursor = Cursor::at(b"(line1\\nline2\\)end)", 0).unwrap();
        let s = parse_literal_string(&mut cursor, &byte_arena).unwrap();
        assert_eq!(s.0, b"line1\nline2)end");
    }

    #[test]
    fn parses_hex_string_with_odd_digit_count_padded() {
        let byte_arena = ByteArena::new();
        let mut cursor = Cursor::at(b"<48656c6c6f1>", 0).unwrap();
        let s = parse_hex_string(&mut cursor, &byte_arena).unwrap();
        assert_eq!(s.0, [b'H', b'e', b'l', b'l', b'o', 0x10]);
    }

    #[test]
    fn parses_an_indirect_object_with_a_stream() {
        let buffer = b"7 0 obj\n<< /Length 5 >>\nstream\nhello\nendstream\nendobj";
        let object_arena = ObjectArena::new();
        let byte_arena = ByteArena::new();
        let obj = parse_indirect_object_at(buffer, 0, &byte_arena, &object_arena).unwrap();
        let Object::Stream(stream) = obj else { panic!("expected stream") };
        assert_eq!(stream.raw_bytes, b"hello");
    }
}
