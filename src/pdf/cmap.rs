//! Adobe CMap text-syntax parsing: code→CID mapping for composite
//! (`/Type0`) fonts, and code→Unicode mapping for `/ToUnicode` streams.
//!
//! There is no CMap parser in the example pack (the teacher only writes
//! PDF, never reads it), so this is grounded directly in the PDF/PostScript
//! CMap operators themselves: `begincodespacerange`, `begincidrange`/
//! `begincidchar`, and `beginbfrange`/`beginbfchar`. The grammar is a
//! restricted PostScript token stream, so this reuses the same hex-string
//! and integer tokenizing rules as `pdf::syntax` rather than a full
//! PostScript interpreter.

use crate::error::Error;

#[derive(Debug, Clone, Copy)]
pub struct CodespaceRange {
    pub low: u32,
    pub high: u32,
    pub byte_len: u8,
}

#[derive(Debug, Default)]
pub struct CMap {
    pub codespace_ranges: Vec<CodespaceRange>,
    cid_ranges: Vec<(u32, u32, u32)>,
    cid_chars: Vec<(u32, u32)>,
    unicode_ranges: Vec<(u32, u32, Vec<u32>)>,
    unicode_chars: Vec<(u32, Vec<u32>)>,
}

impl CMap {
    /// Maps a raw character code to a CID, defaulting to 0 (`.notdef`) for
    /// codes not covered by any range, per the CMap spec.
    pub fn cid_for_code(&self, code: u32) -> u32 {
        if let Some(&(_, cid)) = self.cid_chars.iter().find(|&&(c, _)| c == code) {
            return cid;
        }
        for &(lo, hi, base) in &self.cid_ranges {
            if code >= lo && code <= hi {
                return base + (code - lo);
            }
        }
        0
    }

    /// Maps a raw character code to Unicode scalar values, for `/ToUnicode`
    /// CMaps. Returns an empty vec if unmapped.
    pub fn unicode_for_code(&self, code: u32) -> Vec<u32> {
        if let Some((_, values)) = self.unicode_chars.iter().find(|(c, _)| *c == code) {
            return values.clone();
        }
        for (lo, hi, base) in &self.unicode_ranges {
            if code >= *lo && code <= *hi {
                if base.len() == 1 {
                    return vec![base[0] + (code - lo)];
                }
                return base.clone();
            }
        }
        Vec::new()
    }

    /// The byte length of the code starting at `bytes`, per the
    /// codespace ranges (falls back to 1 if none match, 2 as a common
    /// default for CJK encodings when no ranges were declared at all).
    pub fn code_byte_length(&self, bytes: &[u8]) -> usize {
        for range in &self.codespace_ranges {
            let len = range.byte_len as usize;
            if bytes.len() < len {
                continue;
            }
            let mut value = 0u32;
            for &b in &bytes[..len] {
                value = (value << 8) | b as u32;
            }
            if value >= range.low && value <= range.high {
                return len;
            }
        }
        if self.codespace_ranges.is_empty() { 1 } else { self.codespace_ranges[0].byte_len as usize }
    }

    pub fn parse(source: &[u8]) -> Result<CMap, Error> {
        let mut cmap = CMap::default();
        let mut tok = Tokenizer::new(source);
        let mut pending_hex: Vec<Vec<u8>> = Vec::new();

        while let Some(token) = tok.next_token() {
            match token {
                Token::Keyword(b"begincodespacerange") => {
                    pending_hex.clear();
                    while let Some(t) = tok.next_token() {
                        match t {
                            Token::Hex(bytes) => pending_hex.push(bytes),
                            Token::Keyword(b"endcodespacerange") => break,
                            _ => {}
                        }
                    }
                    for pair in pending_hex.chunks(2) {
                        if let [lo, hi] = pair {
                            cmap.codespace_ranges.push(CodespaceRange {
                                low: bytes_to_u32(lo),
                                high: bytes_to_u32(hi),
                                byte_len: lo.len() as u8,
                            });
                        }
                    }
                    pending_hex.clear();
                }
                Token::Keyword(b"begincidrange") => {
                    parse_cid_ranges(&mut tok, &mut cmap.cid_ranges)?;
                }
                Token::Keyword(b"begincidchar") => {
                    parse_cid_chars(&mut tok, &mut cmap.cid_chars)?;
                }
                Token::Keyword(b"beginbfrange") => {
                    parse_bf_ranges(&mut tok, &mut cmap.unicode_ranges)?;
                }
                Token::Keyword(b"beginbfchar") => {
                    parse_bf_chars(&mut tok, &mut cmap.unicode_chars)?;
                }
                _ => {}
            }
        }
        Ok(cmap)
    }
}

fn parse_cid_ranges(tok: &mut Tokenizer, out: &mut Vec<(u32, u32, u32)>) -> Result<(), Error> {
    loop {
        match tok.next_token() {
            Some(Token::Keyword(b"endcidrange")) | None => return Ok(()),
            Some(Token::Hex(lo)) => {
                let hi = expect_hex(tok)?;
                let cid = expect_int(tok)?;
                out.push((bytes_to_u32(&lo), bytes_to_u32(&hi), cid as u32));
            }
            _ => {}
        }
    }
}

fn parse_cid_chars(tok: &mut Tokenizer, out: &mut Vec<(u32, u32)>) -> Result<(), Error> {
    loop {
        match tok.next_token() {
            Some(Token::Keyword(b"endcidchar")) | None => return Ok(()),
            Some(Token::Hex(code)) => {
                let cid = expect_int(tok)?;
                out.push((bytes_to_u32(&code), cid as u32));
            }
            _ => {}
        }
    }
}

fn parse_bf_ranges(tok: &mut Tokenizer, out: &mut Vec<(u32, u32, Vec<u32>)>) -> Result<(), Error> {
    loop {
        match tok.next_token() {
            Some(Token::Keyword(b"endbfrange")) | None => return Ok(()),
            Some(Token::Hex(lo)) => {
                let hi = expect_hex(tok)?;
                match tok.next_token() {
                    Some(Token::Hex(dst)) => {
                        out.push((bytes_to_u32(&lo), bytes_to_u32(&hi), utf16be_to_scalars(&dst)));
                    }
                    Some(Token::ArrayStart) => {
                        let mut i = 0u32;
                        loop {
                            match tok.next_token() {
                                Some(Token::Hex(dst)) => {
                                    out.push((bytes_to_u32(&lo) + i, bytes_to_u32(&lo) + i, utf16be_to_scalars(&dst)));
                                    i += 1;
                                }
                                Some(Token::ArrayEnd) | None => break,
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

fn parse_bf_chars(tok: &mut Tokenizer, out: &mut Vec<(u32, Vec<u32>)>) -> Result<(), Error> {
    loop {
        match tok.next_token() {
            Some(Token::Keyword(b"endbfchar")) | None => return Ok(()),
            Some(Token::Hex(code)) => {
                if let Some(Token::Hex(dst)) = tok.next_token() {
                    out.push((bytes_to_u32(&code), utf16be_to_scalars(&dst)));
                }
            }
            _ => {}
        }
    }
}

fn expect_hex(tok: &mut Tokenizer) -> Result<Vec<u8>, Error> {
    match tok.next_token() {
        Some(Token::Hex(bytes)) => Ok(bytes),
        _ => Err(Error::Invalid(crate::error::InvalidKind::Header)),
    }
}

fn expect_int(tok: &mut Tokenizer) -> Result<i64, Error> {
    match tok.next_token() {
        Some(Token::Int(n)) => Ok(n),
        _ => Err(Error::Invalid(crate::error::InvalidKind::Header)),
    }
}

fn bytes_to_u32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn utf16be_to_scalars(bytes: &[u8]) -> Vec<u32> {
    let units: Vec<u16> = bytes.chunks(2).map(|c| if c.len() == 2 { ((c[0] as u16) << 8) | c[1] as u16 } else { c[0] as u16 }).collect();
    char::decode_utf16(units).map(|r| r.unwrap_or('\u{FFFD}') as u32).collect()
}

enum Token<'a> {
    Keyword(&'a [u8]),
    Hex(Vec<u8>),
    Int(i64),
    ArrayStart,
    ArrayEnd,
    Other,
}

struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Tokenizer { data, pos: 0 }
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        loop {
            while self.pos < self.data.len() && self.data[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos >= self.data.len() {
                return None;
            }
            let b = self.data[self.pos];
            if b == b'%' {
                while self.pos < self.data.len() && self.data[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }

        let b = self.data[self.pos];
        match b {
            b'<' => {
                let start = self.pos + 1;
                let mut end = start;
                while end < self.data.len() && self.data[end] != b'>' {
                    end += 1;
                }
                let hex_digits: Vec<u8> = self.data[start..end].iter().copied().filter(|c| !c.is_ascii_whitespace()).collect();
                self.pos = (end + 1).min(self.data.len());
                Some(Token::Hex(hex_pairs_to_bytes(&hex_digits)))
            }
            b'[' => {
                self.pos += 1;
                Some(Token::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Some(Token::ArrayEnd)
            }
            b'/' => {
                let start = self.pos;
                self.pos += 1;
                while self.pos < self.data.len() && !self.data[self.pos].is_ascii_whitespace() {
                    self.pos += 1;
                }
                Some(Token::Keyword(&self.data[start..self.pos]))
            }
            b'-' | b'0'..=b'9' => {
                let start = self.pos;
                self.pos += 1;
                while self.pos < self.data.len() && self.data[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
                std::str::from_utf8(&self.data[start..self.pos]).ok()?.parse().ok().map(Token::Int)
            }
            _ => {
                let start = self.pos;
                while self.pos < self.data.len()
                    && !self.data[self.pos].is_ascii_whitespace()
                    && !matches!(self.data[self.pos], b'<' | b'>' | b'[' | b']' | b'/')
                {
                    self.pos += 1;
                }
                if self.pos == start {
                    self.pos += 1;
                    Some(Token::Other)
                } else {
                    Some(Token::Keyword(&self.data[start..self.pos]))
                }
            }
        }
    }
}

fn hex_pairs_to_bytes(digits: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((digits.len() + 1) / 2);
    let mut i = 0;
    while i < digits.len() {
        let hi = hex_value(digits[i]);
        let lo = if i + 1 < digits.len() { hex_value(digits[i + 1]) } else { 0 };
        out.push((hi << 4) | lo);
        i += 2;
    }
    out
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cidrange_and_maps_codes() {
        let src = b"1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n1 begincidrange\n<0003> <0005> 10\nendcidrange";
        let cmap = CMap::parse(src).unwrap();
        assert_eq!(cmap.cid_for_code(0x0003), 10);
        assert_eq!(cmap.cid_for_code(0x0004), 11);
        assert_eq!(cmap.cid_for_code(0x0000), 0);
    }

    #[test]
    fn parses_bfchar_to_unicode() {
        let src = b"1 beginbfchar\n<01> <0041>\nendbfchar";
        let cmap = CMap::parse(src).unwrap();
        assert_eq!(cmap.unicode_for_code(0x01), vec![0x41]);
    }
}
