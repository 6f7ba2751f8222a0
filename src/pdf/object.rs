//! The PDF object model: a tagged union of the eight PDF primitive types plus
//! indirect references.
//!
//! Grounded on the teacher's `victor/src/pdf/object.rs`, which represents
//! `Object` as an explicit enum borrowing byte slices for names/strings
//! rather than modeling a class hierarchy. That crate only ever *writes*
//! objects; this one also parses and resolves them, so `Object` here borrows
//! from the document buffer (or from arena-allocated decoded stream bytes)
//! instead of from literal Rust source.

use std::fmt;

use crate::arena::Arena;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Name<'a>(pub &'a [u8]);

impl<'a> Name<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    pub fn eq_str(&self, s: &str) -> bool {
        self.0 == s.as_bytes()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PdfString<'a>(pub &'a [u8]);

impl<'a> PdfString<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Dictionary<'a> {
    pub pairs: &'a [(Name<'a>, Object<'a>)],
}

impl<'a> Dictionary<'a> {
    pub fn get(&self, key: &str) -> Option<&Object<'a>> {
        self.pairs
            .iter()
            .find(|(name, _)| name.eq_str(key))
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Stream<'a> {
    pub dict: Dictionary<'a>,
    /// Raw (still-encoded) stream bytes as they appear in the file, not
    /// including the `stream`/`endstream` keywords.
    pub raw_bytes: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub enum Object<'a> {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Name<'a>),
    String(PdfString<'a>),
    Array(&'a [Object<'a>]),
    Dictionary(Dictionary<'a>),
    Stream(Stream<'a>),
    Reference(ObjectId),
}

impl<'a> Object<'a> {
    pub fn type_of(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Boolean(_) => "boolean",
            Object::Integer(_) => "integer",
            Object::Real(_) => "real",
            Object::Name(_) => "name",
            Object::String(_) => "string",
            Object::Array(_) => "array",
            Object::Dictionary(_) => "dictionary",
            Object::Stream(_) => "stream",
            Object::Reference(_) => "reference",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Object::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match *self {
            Object::Real(v) => Some(v),
            _ => None,
        }
    }

    /// Widens an integer to a real; accepts either representation, as PDF
    /// numeric fields commonly do.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Object::Integer(v) => Some(v as f64),
            Object::Real(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_name_eq(&self, s: &str) -> bool {
        match self {
            Object::Name(name) => name.eq_str(s),
            _ => false,
        }
    }

    pub fn as_name(&self) -> Option<Name<'a>> {
        match *self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&'a [Object<'a>]> {
        match *self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<Dictionary<'a>> {
        match *self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(s.dict),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<PdfString<'a>> {
        match *self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match *self {
            Object::Reference(id) => Some(id),
            _ => None,
        }
    }

    pub fn dict_get(&self, key: &str) -> Option<&Object<'a>> {
        self.as_dict()?.get(key)
    }

    pub fn stream_dict(&self) -> Option<Dictionary<'a>> {
        match *self {
            Object::Stream(s) => Some(s.dict),
            _ => None,
        }
    }

    pub fn stream_raw_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Object::Stream(s) => Some(s.raw_bytes),
            _ => None,
        }
    }
}

/// Backing storage for the composite shapes the parser builds on the fly:
/// `Object::Array` slices and `Dictionary` key/value slices. Neither can
/// borrow from the source file directly, since nothing of that shape sits
/// contiguously in PDF syntax; bump-allocating them keeps every `Object<'a>`
/// a plain borrowed value with no owning containers to track.
pub struct ObjectArena<'a> {
    arrays: Arena<Vec<Object<'a>>>,
    pairs: Arena<Vec<(Name<'a>, Object<'a>)>>,
}

impl<'a> ObjectArena<'a> {
    pub fn new() -> Self {
        ObjectArena { arrays: Arena::new(), pairs: Arena::new() }
    }

    /// Takes `&'a self` (not merely `&self`) so the returned slice is
    /// genuinely tied to the arena's own lifetime rather than to the
    /// borrow of this call — `Arena::alloc`'s output lifetime matches its
    /// receiver's, the same reasoning that makes `LazyRef::get`'s
    /// `T::arena(resolver).alloc(...)` sound for `&'a RecordArenas`.
    pub fn alloc_array(&'a self, items: Vec<Object<'a>>) -> &'a [Object<'a>] {
        self.arrays.alloc(items).as_slice()
    }

    pub fn alloc_pairs(&'a self, pairs: Vec<(Name<'a>, Object<'a>)>) -> &'a [(Name<'a>, Object<'a>)] {
        self.pairs.alloc(pairs).as_slice()
    }
}

impl<'a> Default for ObjectArena<'a> {
    fn default() -> Self {
        ObjectArena::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_number_widens_an_integer_but_not_a_name() {
        assert_eq!(Object::Integer(7).as_number(), Some(7.0));
        assert_eq!(Object::Real(1.5).as_number(), Some(1.5));
        assert_eq!(Object::Name(Name(b"Foo")).as_number(), None);
    }

    #[test]
    fn as_dict_unwraps_a_stream_to_its_dictionary() {
        let pairs = [(Name(b"Length"), Object::Integer(3))];
        let dict = Dictionary { pairs: &pairs };
        let stream = Object::Stream(Stream { dict, raw_bytes: b"abc" });
        assert!(stream.as_dict().unwrap().get("Length").unwrap().as_integer() == Some(3));
    }

    #[test]
    fn dictionary_get_finds_by_name_and_is_none_for_missing_keys() {
        let pairs = [(Name(b"Type"), Object::Name(Name(b"Page"))), (Name(b"Count"), Object::Integer(1))];
        let dict = Dictionary { pairs: &pairs };
        assert!(dict.get("Type").unwrap().as_name_eq("Page"));
        assert!(dict.get("Missing").is_none());
    }

    #[test]
    fn object_id_displays_as_pdf_reference_syntax() {
        assert_eq!(ObjectId { number: 5, generation: 0 }.to_string(), "5 0 R");
    }
}
