//! Typed deserialization of dictionary objects into Rust structs.
//!
//! The source drives this with byte-offset reflection over a packed C struct;
//! that has no safe Rust equivalent, and a derive macro is explicitly out of
//! scope (spec §4.F design notes). What survives instead is the same overall
//! shape: a `Deserialize` impl exposes a static slice of `FieldDescriptor`s,
//! and a single framework loop in `deserialize_into` walks the slice calling
//! each descriptor's function pointer. Each pointer is a non-capturing
//! closure, so the slice is a plain `'static` table exactly like the
//! C original's descriptor array, just keyed by fn pointer instead of offset.

use crate::error::Error;
use crate::pdf::object::{Dictionary, Object};
use crate::pdf::resolver::Resolver;

/// One entry in a type's static field table.
pub struct FieldDescriptor<T> {
    pub key: &'static str,
    pub apply: for<'a> fn(&mut T, Dictionary<'a>, &Resolver<'a>) -> Result<(), Error>,
}

pub trait Deserialize<'a>: Sized + Default {
    const STRUCT_NAME: &'static str;
    const FIELDS: &'static [FieldDescriptor<Self>];

    fn deserialize(obj: &Object<'a>, resolver: &Resolver<'a>) -> Result<Self, Error> {
        let mut value = Self::default();
        Self::deserialize_into(&mut value, obj, resolver)?;
        Ok(value)
    }

    fn deserialize_into(slot: &mut Self, obj: &Object<'a>, resolver: &Resolver<'a>) -> Result<(), Error> {
        let resolved = resolver.resolve_object(obj, true)?;
        let dict = resolved.as_dict().ok_or(Error::IncorrectType {
            expected: "dictionary",
            got: resolved.type_of(),
        })?;
        for field in Self::FIELDS {
            (field.apply)(slot, dict, resolver)?;
        }
        Ok(())
    }
}

/// Looks up `key`, resolving one indirection, and fails if absent.
pub fn require<'a>(
    dict: Dictionary<'a>,
    resolver: &Resolver<'a>,
    struct_name: &'static str,
    key: &'static str,
) -> Result<Object<'a>, Error> {
    let raw = dict.get(key).ok_or(Error::MissingField { struct_name, field: key })?;
    resolver.resolve_object(raw, true)
}

/// Looks up `key`, resolving one indirection; `None` if absent.
pub fn optional<'a>(
    dict: Dictionary<'a>,
    resolver: &Resolver<'a>,
    key: &str,
) -> Result<Option<Object<'a>>, Error> {
    match dict.get(key) {
        Some(raw) => Ok(Some(resolver.resolve_object(raw, true)?)),
        None => Ok(None),
    }
}

pub fn optional_int(dict: Dictionary, resolver: &Resolver, key: &str) -> Result<Option<i64>, Error> {
    Ok(optional(dict, resolver, key)?.and_then(|o| o.as_integer()))
}

pub fn optional_number(dict: Dictionary, resolver: &Resolver, key: &str) -> Result<Option<f64>, Error> {
    Ok(optional(dict, resolver, key)?.and_then(|o| o.as_number()))
}

pub fn optional_name_owned(dict: Dictionary, resolver: &Resolver, key: &str) -> Result<Option<String>, Error> {
    Ok(optional(dict, resolver, key)?
        .and_then(|o| o.as_name())
        .map(|n| String::from_utf8_lossy(n.as_bytes()).into_owned()))
}

pub fn optional_string_owned(dict: Dictionary, resolver: &Resolver, key: &str) -> Result<Option<Vec<u8>>, Error> {
    Ok(optional(dict, resolver, key)?
        .and_then(|o| o.as_string())
        .map(|s| s.as_bytes().to_vec()))
}

/// Reads an array of numbers (e.g. `Rect`-shaped fields like `/MediaBox`).
pub fn optional_number_array(
    dict: Dictionary,
    resolver: &Resolver,
    key: &str,
) -> Result<Option<Vec<f64>>, Error> {
    let Some(obj) = optional(dict, resolver, key)? else { return Ok(None) };
    let arr = obj.as_array().ok_or(Error::IncorrectType { expected: "array", got: obj.type_of() })?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let resolved = resolver.resolve_object(item, true)?;
        out.push(resolved.as_number().ok_or(Error::IncorrectType {
            expected: "number",
            got: resolved.type_of(),
        })?);
    }
    Ok(Some(out))
}

/// Reads an array of references without following them further (used for
/// `/Kids`, `/Contents` when it's an array, `/Annots`, etc).
pub fn optional_reference_array(
    dict: Dictionary,
    resolver: &Resolver,
    key: &str,
) -> Result<Vec<crate::pdf::object::ObjectId>, Error> {
    let Some(obj) = optional(dict, resolver, key)? else { return Ok(Vec::new()) };
    match obj {
        Object::Array(items) => items
            .iter()
            .map(|item| {
                item.as_reference()
                    .ok_or(Error::IncorrectType { expected: "reference", got: item.type_of() })
            })
            .collect(),
        // A singleton is legal where an array is expected, e.g. `/Contents 5 0 R`.
        Object::Reference(id) => Ok(vec![id]),
        _ => Err(Error::IncorrectType { expected: "array", got: obj.type_of() }),
    }
}

/// Reads a dictionary-valued field as a list of `(name, reference)` pairs,
/// without resolving the references (used for `/Font`, `/XObject` resource
/// subdictionaries).
pub fn optional_name_reference_map(
    dict: Dictionary,
    resolver: &Resolver,
    key: &str,
) -> Result<Vec<(String, crate::pdf::object::ObjectId)>, Error> {
    let Some(obj) = optional(dict, resolver, key)? else { return Ok(Vec::new()) };
    let sub = obj.as_dict().ok_or(Error::IncorrectType { expected: "dictionary", got: obj.type_of() })?;
    sub.pairs
        .iter()
        .map(|(name, value)| {
            let id = value
                .as_reference()
                .ok_or(Error::IncorrectType { expected: "reference", got: value.type_of() })?;
            Ok((String::from_utf8_lossy(name.as_bytes()).into_owned(), id))
        })
        .collect()
}
