//! Embedded font program parsing: SFNT/TrueType outlines and CFF Type 2
//! charstrings, unified behind a single `Glyph` outline shape that
//! `pdf::gstate` asks for by glyph index.

pub mod agl;
pub mod cff;
pub mod charstring;
pub mod sfnt;

use crate::error::Error;
use crate::path::Path;

/// A parsed embedded font program, abstracting over the two outline
/// formats PDF embeds (`FontFile2`/TrueType `glyf`, `FontFile3`/CFF).
pub enum FontProgram {
    TrueType(sfnt::SfntFont),
    Cff(cff::CffFont),
}

impl FontProgram {
    pub fn parse(bytes: &[u8]) -> Result<FontProgram, Error> {
        if bytes.len() >= 4 && &bytes[0..4] == b"OTTO" {
            // CFF outlines wrapped in an SFNT/OpenType container: unwrap to
            // the `CFF ` table and parse that with the CFF path.
            let sfnt = sfnt::SfntFont::parse(bytes)?;
            let cff_bytes = sfnt
                .table(b"CFF ")
                .ok_or(Error::Invalid(crate::error::InvalidKind::Header))?;
            Ok(FontProgram::Cff(cff::CffFont::parse(cff_bytes)?))
        } else if bytes.len() >= 4 && (&bytes[0..4] == b"\x00\x01\x00\x00" || &bytes[0..4] == b"true") {
            Ok(FontProgram::TrueType(sfnt::SfntFont::parse(bytes)?))
        } else {
            Ok(FontProgram::Cff(cff::CffFont::parse(bytes)?))
        }
    }

    pub fn units_per_em(&self) -> u16 {
        match self {
            FontProgram::TrueType(f) => f.units_per_em(),
            FontProgram::Cff(f) => f.units_per_em(),
        }
    }

    pub fn glyph_outline(&self, glyph_index: u16) -> Result<Path, Error> {
        match self {
            FontProgram::TrueType(f) => f.glyph_outline(glyph_index),
            FontProgram::Cff(f) => f.glyph_outline(glyph_index),
        }
    }

    /// Maps a Unicode scalar value to a glyph index using the font's
    /// internal `cmap` (TrueType) or charset-derived name table (CFF), when
    /// the caller has no better source (e.g. no `/Differences` or CMap).
    pub fn glyph_for_unicode(&self, codepoint: u32) -> Option<u16> {
        match self {
            FontProgram::TrueType(f) => f.glyph_for_unicode(codepoint),
            FontProgram::Cff(f) => f.glyph_for_name(agl::name_for_unicode(codepoint)?),
        }
    }

    pub fn glyph_for_name(&self, name: &str) -> Option<u16> {
        match self {
            FontProgram::TrueType(f) => agl::unicode_for_name(name).and_then(|cp| f.glyph_for_unicode(cp)),
            FontProgram::Cff(f) => f.glyph_for_name(name),
        }
    }
}
