//! Indirect-reference resolution and cycle-safe lazy materialization of
//! typed records.
//!
//! `Resolver` owns the xref mapping and exposes `resolve_ref`/`resolve_object`
//! per spec §4.E. `LazyRef<T>` defers deserialization until a consumer asks
//! for it, and — per spec §4.F / §9 — installs its memoized pointer *before*
//! recursing into the nested `deserialize` call, so a back-edge (e.g.
//! `Page.Parent`) observes the partially-initialized parent rather than
//! looping forever.

use std::cell::Cell;
use std::collections::HashMap;

use crate::arena::{Arena, ByteArena};
use crate::error::Error;
use crate::pdf::deserialize::Deserialize;
use crate::pdf::object::{Dictionary, Object, ObjectArena, ObjectId};
use crate::pdf::xref::XrefTable;

/// Implemented once per typed record so that `LazyRef<T>` knows which arena
/// to allocate `T` in. Rust has no generic "allocate any T" arena without
/// type erasure, so each record kind gets its own `Arena<T>` field on
/// `Resolver`, and `Record::arena` is the dispatch table entry for it —
/// the Rust-idiomatic stand-in for the source's single untyped arena.
pub trait Record: Default + 'static {
    const STRUCT_NAME: &'static str;
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self>;
}

pub struct Resolver<'a> {
    buffer: &'a [u8],
    xref: XrefTable,
    byte_arena: &'a ByteArena,
    object_arena: &'a ObjectArena<'a>,
    object_cache_map: std::cell::RefCell<HashMap<ObjectId, Object<'a>>>,
    /// Owned by the caller (like `byte_arena`), not by `Resolver` itself, so
    /// that `&'a Arena<T>` can be handed out regardless of how long a given
    /// `&Resolver` borrow happens to be.
    pub(crate) records: &'a RecordArenas,
}

/// One `Arena<T>` per typed record kind used by the deserialization
/// framework. Grouped in a single struct so `Resolver` stays a single
/// lifetime-carrying type.
#[derive(Default)]
pub struct RecordArenas {
    pub catalog: Arena<crate::pdf::types::Catalog>,
    pub page_tree_node: Arena<crate::pdf::types::PageTreeNode>,
    pub page: Arena<crate::pdf::types::Page>,
    pub resources: Arena<crate::pdf::types::Resources>,
    pub font_dict: Arena<crate::pdf::types::FontDict>,
    pub stream_dict: Arena<crate::pdf::types::StreamDictRecord>,
    pub form_xobject: Arena<crate::pdf::types::FormXObject>,
    pub gstate_params: Arena<crate::pdf::types::GStateParams>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        buffer: &'a [u8],
        xref: XrefTable,
        byte_arena: &'a ByteArena,
        object_arena: &'a ObjectArena<'a>,
        records: &'a RecordArenas,
    ) -> Self {
        Resolver {
            buffer,
            xref,
            byte_arena,
            object_arena,
            object_cache_map: std::cell::RefCell::new(HashMap::new()),
            records,
        }
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    pub fn byte_arena(&self) -> &'a ByteArena {
        self.byte_arena
    }

    pub fn object_arena(&self) -> &'a ObjectArena<'a> {
        self.object_arena
    }

    pub fn trailer(&self) -> Dictionary<'a> {
        // SAFETY: the trailer dictionary is parsed once at xref-load time out
        // of the same buffer this resolver borrows for `'a`; `XrefTable`
        // stores it as raw offsets/bytes tied to that same buffer.
        self.xref.trailer(self.buffer)
    }

    pub fn root(&self) -> Result<ObjectId, Error> {
        self.trailer()
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or(Error::MissingField { struct_name: "Trailer", field: "Root" })
    }

    /// Parses and returns the object at a given indirect reference, without
    /// following further indirection. Objects are memoized by id so that
    /// `resolve_ref` called twice for the same id returns the same parsed
    /// shape (not pointer-equal, since `Object` here is a value type, but
    /// value-equal).
    pub fn resolve_ref(&self, id: ObjectId) -> Result<Object<'a>, Error> {
        if let Some(obj) = self.object_cache_map.borrow().get(&id) {
            return Ok(*obj);
        }
        let obj = match self.xref.entry_of(id) {
            Some(crate::pdf::xref::XrefEntry::Offset(offset)) => crate::pdf::syntax::parse_indirect_object_at(
                self.buffer,
                offset,
                self.byte_arena,
                self.object_arena,
            )?,
            Some(crate::pdf::xref::XrefEntry::InStream { stream_number, index }) => {
                self.resolve_compressed_object(stream_number, index)?
            }
            None => return Err(Error::MissingObject(id)),
        };
        self.object_cache_map.borrow_mut().insert(id, obj);
        Ok(obj)
    }

    /// Resolves an object stored inside an object stream (`/Type
    /// /ObjStm`): decode the stream, then re-enter the object syntax at the
    /// recorded sub-offset.
    fn resolve_compressed_object(&self, stream_number: u32, index: u32) -> Result<Object<'a>, Error> {
        let stream_id = ObjectId { number: stream_number, generation: 0 };
        let stream_offset = self
            .xref
            .offset_of(stream_id)
            .ok_or(Error::MissingObject(stream_id))?;
        let stream_obj = crate::pdf::syntax::parse_indirect_object_at(
            self.buffer,
            stream_offset,
            self.byte_arena,
            self.object_arena,
        )?;
        let dict = stream_obj
            .as_dict()
            .ok_or(Error::IncorrectType { expected: "dictionary", got: stream_obj.type_of() })?;
        let n = dict
            .get("N")
            .and_then(Object::as_integer)
            .ok_or(Error::MissingField { struct_name: "ObjStm", field: "N" })? as u32;
        let first = dict
            .get("First")
            .and_then(Object::as_integer)
            .ok_or(Error::MissingField { struct_name: "ObjStm", field: "First" })? as usize;
        let decoded = self.decode_stream(&stream_obj)?;

        let mut header_cursor = crate::cursor::Cursor::new(decoded);
        let mut offset = None;
        for i in 0..n {
            let pairs = crate::pdf::syntax::read_two_integers(&mut header_cursor)?;
            if i == index {
                offset = Some(first + pairs.1 as usize);
            }
        }
        let offset = offset.ok_or(Error::MissingObject(ObjectId { number: stream_number, generation: 0 }))?;
        crate::pdf::syntax::parse_object_at(decoded, offset, self.byte_arena, self.object_arena)
    }

    /// Resolves `obj` through at most one indirection when `unwrap` is true;
    /// otherwise returns it unchanged. Never follows more than one hop: the
    /// framework resolves on demand rather than eagerly walking chains, both
    /// to avoid cycles and to preserve reference identity.
    pub fn resolve_object(&self, obj: &Object<'a>, unwrap: bool) -> Result<Object<'a>, Error> {
        match (*obj, unwrap) {
            (Object::Reference(id), true) => self.resolve_ref(id),
            _ => Ok(*obj),
        }
    }

    pub fn decode_stream(&self, stream: &Object<'a>) -> Result<&'a [u8], Error> {
        let (dict, raw) = match stream {
            Object::Stream(s) => (s.dict, s.raw_bytes),
            _ => {
                return Err(Error::IncorrectType { expected: "stream", got: obj_type_name(stream) })
            }
        };
        crate::pdf::filters::decode(dict, raw, self)
    }
}

fn obj_type_name(obj: &Object) -> &'static str {
    obj.type_of()
}

/// A deferred reference to a typed record: the raw indirect-ref id plus a
/// memoized resolved pointer, initially empty.
pub struct LazyRef<T> {
    id: ObjectId,
    memo: Cell<Option<std::ptr::NonNull<T>>>,
}

impl<T> std::fmt::Debug for LazyRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "LazyRef({})", self.id)
    }
}

impl<T> Clone for LazyRef<T> {
    fn clone(&self) -> Self {
        LazyRef { id: self.id, memo: Cell::new(self.memo.get()) }
    }
}

impl<T> Default for LazyRef<T> {
    fn default() -> Self {
        LazyRef { id: ObjectId { number: 0, generation: 0 }, memo: Cell::new(None) }
    }
}

impl<T: Record + for<'a> Deserialize<'a>> LazyRef<T> {
    pub fn new(id: ObjectId) -> Self {
        LazyRef { id, memo: Cell::new(None) }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// At-most-once materialization per ref per resolver. The memoized
    /// pointer is installed before the nested `deserialize` call runs, so a
    /// back-edge that resolves the same ref mid-flight observes the
    /// (partially built) record instead of recursing forever.
    pub fn get<'a>(&self, resolver: &Resolver<'a>) -> Result<&'a T, Error> {
        if let Some(ptr) = self.memo.get() {
            // SAFETY: once installed, the pointer refers to an arena
            // allocation that lives as long as `resolver`'s arenas, i.e.
            // `'a`.
            return Ok(unsafe { ptr.as_ref() });
        }

        let slot: &'a mut T = T::arena(resolver).alloc(T::default());
        let ptr = std::ptr::NonNull::from(&*slot);
        self.memo.set(Some(ptr));

        let raw = resolver.resolve_ref(self.id)?;
        // SAFETY: `ptr` was just derived from `slot`, which nothing else has
        // observed yet outside of `self.memo` (a raw pointer, not a live
        // Rust reference); we reassert exclusive access to fill in fields.
        // A cyclic `get()` call during `deserialize_into` below will read
        // `self.memo` and construct a shared reference to this same record;
        // because rendering is single-threaded and the cyclic read only
        // inspects fields already written by the time the cycle is
        // actually exercised by this crate's record shapes (`Page.Parent`
        // is read after, never during, its own construction), this mirrors
        // the source's "install before recursing" rule exactly.
        let slot: &mut T = unsafe { &mut *ptr.as_ptr() };
        T::deserialize_into(slot, &raw, resolver)?;
        Ok(unsafe { ptr.as_ref() })
    }
}
