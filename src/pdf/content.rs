//! Content-stream tokenizing: turns the operand/operator syntax of a page's
//! content stream into a sequence of `Operation`s for `gstate` to execute.
//!
//! Content streams share PDF's scalar/string/name/array/dictionary grammar
//! with `pdf::syntax`, but operators (bare keywords like `re`, `Tj`, `cm`)
//! terminate a run of operands instead of nesting, so this is a separate,
//! flatter tokenizer rather than a reuse of the object parser. Grounded in
//! the operator table the teacher's (unused, PDF-writing) `operators!`
//! macro enumerates — inverted here from "emit this operator's text" into
//! "recognize this operator's text".

use crate::cursor::Cursor;
use crate::error::Error;

#[derive(Debug, Clone)]
pub enum Operand {
    Number(f64),
    Name(String),
    String(Vec<u8>),
    Array(Vec<Operand>),
    Dict(Vec<(String, Operand)>),
}

impl Operand {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Operand::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub operator: String,
    pub operands: Vec<Operand>,
    /// The raw bytes between a `BI` and its matching `EI`, for inline
    /// images (`operator == "BI"`); operands carry the image dictionary
    /// pairs, and this holds the sample data itself.
    pub inline_image_data: Option<Vec<u8>>,
}

pub fn parse_operations(content: &[u8]) -> Result<Vec<Operation>, Error> {
    let mut cursor = Cursor::new(content);
    let mut operations = Vec::new();
    let mut operands = Vec::new();

    loop {
        skip_whitespace_and_comments(&mut cursor);
        let Ok(b) = cursor.peek_u8() else { break };
        match b {
            b'/' => operands.push(Operand::Name(read_name(&mut cursor)?)),
            b'(' => operands.push(Operand::String(read_literal_string(&mut cursor)?)),
            b'<' => {
                if cursor.peek_bytes(2).map(|b| b == b"<<").unwrap_or(false) {
                    operands.push(read_dict(&mut cursor)?);
                } else {
                    operands.push(Operand::String(read_hex_string(&mut cursor)?));
                }
            }
            b'[' => operands.push(read_array(&mut cursor)?),
            b'+' | b'-' | b'.' | b'0'..=b'9' => operands.push(Operand::Number(read_number(&mut cursor)?)),
            _ => {
                let keyword = read_keyword(&mut cursor)?;
                if keyword == "BI" {
                    let (dict_operands, data) = read_inline_image(&mut cursor)?;
                    operations.push(Operation {
                        operator: "BI".to_string(),
                        operands: dict_operands,
                        inline_image_data: Some(data),
                    });
                } else {
                    operations.push(Operation {
                        operator: keyword,
                        operands: std::mem::take(&mut operands),
                        inline_image_data: None,
                    });
                }
            }
        }
    }
    Ok(operations)
}

fn read_inline_image(cursor: &mut Cursor) -> Result<(Vec<Operand>, Vec<u8>), Error> {
    let mut pairs = Vec::new();
    loop {
        skip_whitespace_and_comments(cursor);
        if cursor.peek_bytes(2).map(|b| b == b"ID").unwrap_or(false) {
            cursor.advance(2)?;
            break;
        }
        let key = read_name(cursor)?;
        skip_whitespace_and_comments(cursor);
        let value = read_value(cursor)?;
        pairs.push((key, value));
    }
    // One whitespace byte separates `ID` from the binary sample data.
    if cursor.peek_u8().map(|b| b.is_ascii_whitespace()).unwrap_or(false) {
        cursor.advance(1)?;
    }
    let start = cursor.position();
    let mut end = start;
    let buffer = cursor.buffer();
    while end + 2 <= buffer.len() {
        if &buffer[end..end + 2] == b"EI" && (end == 0 || buffer[end - 1].is_ascii_whitespace()) {
            break;
        }
        end += 1;
    }
    let data = buffer[start..end].to_vec();
    cursor.seek(end)?;
    cursor.advance(2)?; // "EI"
    Ok((
        pairs
            .into_iter()
            .map(|(k, v)| Operand::Dict(vec![(k, v)]))
            .collect(),
        data,
    ))
}

fn read_value(cursor: &mut Cursor) -> Result<Operand, Error> {
    skip_whitespace_and_comments(cursor);
    match cursor.peek_u8()? {
        b'/' => Ok(Operand::Name(read_name(cursor)?)),
        b'(' => Ok(Operand::String(read_literal_string(cursor)?)),
        b'<' => {
            if cursor.peek_bytes(2).map(|b| b == b"<<").unwrap_or(false) {
                read_dict(cursor)
            } else {
                Ok(Operand::String(read_hex_string(cursor)?))
            }
        }
        b'[' => read_array(cursor),
        b'+' | b'-' | b'.' | b'0'..=b'9' => Ok(Operand::Number(read_number(cursor)?)),
        _ => {
            read_keyword(cursor)?;
            Ok(Operand::Number(0.))
        }
    }
}

fn read_dict(cursor: &mut Cursor) -> Result<Operand, Error> {
    cursor.advance(2)?;
    let mut pairs = Vec::new();
    loop {
        skip_whitespace_and_comments(cursor);
        if cursor.peek_bytes(2).map(|b| b == b">>").unwrap_or(false) {
            cursor.advance(2)?;
            break;
        }
        let key = read_name(cursor)?;
        skip_whitespace_and_comments(cursor);
        let value = read_value(cursor)?;
        pairs.push((key, value));
    }
    Ok(Operand::Dict(pairs))
}

fn read_array(cursor: &mut Cursor) -> Result<Operand, Error> {
    cursor.advance(1)?;
    let mut items = Vec::new();
    loop {
        skip_whitespace_and_comments(cursor);
        if cursor.peek_u8()? == b']' {
            cursor.advance(1)?;
            break;
        }
        items.push(read_value(cursor)?);
    }
    Ok(Operand::Array(items))
}

fn read_name(cursor: &mut Cursor) -> Result<String, Error> {
    cursor.advance(1)?;
    let start = cursor.position();
    while let Ok(b) = cursor.peek_u8() {
        if is_regular_char(b) {
            cursor.advance(1)?;
        } else {
            break;
        }
    }
    let end = cursor.position();
    Ok(String::from_utf8_lossy(&cursor.buffer()[start..end]).into_owned())
}

fn read_keyword(cursor: &mut Cursor) -> Result<String, Error> {
    let start = cursor.position();
    while let Ok(b) = cursor.peek_u8() {
        if is_regular_char(b) {
            cursor.advance(1)?;
        } else {
            break;
        }
    }
    if cursor.position() == start {
        cursor.advance(1)?;
    }
    let end = cursor.position();
    Ok(String::from_utf8_lossy(&cursor.buffer()[start..end]).into_owned())
}

fn read_number(cursor: &mut Cursor) -> Result<f64, Error> {
    let start = cursor.position();
    if matches!(cursor.peek_u8(), Ok(b'+') | Ok(b'-')) {
        cursor.advance(1)?;
    }
    while matches!(cursor.peek_u8(), Ok(b) if b.is_ascii_digit()) {
        cursor.advance(1)?;
    }
    if cursor.peek_u8() == Ok(b'.') {
        cursor.advance(1)?;
        while matches!(cursor.peek_u8(), Ok(b) if b.is_ascii_digit()) {
            cursor.advance(1)?;
        }
    }
    let end = cursor.position();
    let text = std::str::from_utf8(&cursor.buffer()[start..end]).map_err(|_| Error::Invalid(crate::error::InvalidKind::Header))?;
    text.parse().map_err(|_| Error::Invalid(crate::error::InvalidKind::Header))
}

fn read_literal_string(cursor: &mut Cursor) -> Result<Vec<u8>, Error> {
    cursor.advance(1)?;
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
                    b'(' | b')' | b'\\' => out.push(esc),
                    b'\r' | b'\n' => {}
                    other => out.push(other),
                }
            }
            _ => out.push(b),
        }
    }
    Ok(out)
}

fn read_hex_string(cursor: &mut Cursor) -> Result<Vec<u8>, Error> {
    cursor.advance(1)?;
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
        let v = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => continue,
        };
        match nibble.take() {
            Some(hi) => out.push((hi << 4) | v),
            None => nibble = Some(v),
        }
    }
    if let Some(hi) = nibble {
        out.push(hi << 4);
    }
    Ok(out)
}

fn is_regular_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
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
    fn parses_operands_before_operator() {
        let ops = parse_operations(b"1 0 0 1 10 20 cm").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operator, "cm");
        assert_eq!(ops[0].operands.len(), 6);
    }

    #[test]
    fn parses_text_showing_array() {
        let ops = parse_operations(b"[(Hi) -250 (there)] TJ").unwrap();
        assert_eq!(ops[0].operator, "TJ");
        match &ops[0].operands[0] {
            Operand::Array(items) => assert_eq!(items.len(), 3),
            _ => panic!("expected array operand"),
        }
    }

    #[test]
    fn parses_inline_image_and_skips_to_ei() {
        let ops = parse_operations(b"BI /W 1 /H 1 /BPC 8 /CS /G ID \x7f EI").unwrap();
        assert_eq!(ops[0].operator, "BI");
        assert_eq!(ops[0].inline_image_data.as_deref(), Some(&b"\x7f"[..]));
    }
}
