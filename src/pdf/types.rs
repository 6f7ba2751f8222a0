//! Typed records materialized on demand by `LazyRef<T>`.
//!
//! Each type here pairs a `Record` impl (telling `LazyRef` which arena to
//! allocate into) with a `Deserialize` impl (a static field table the
//! framework in `deserialize.rs` walks). Field shapes follow the page tree
//! and resource model as the teacher's `pdf::document_structure` writes it,
//! inverted from "serialize this shape to PDF syntax" to "parse PDF syntax
//! into this shape".

use crate::arena::Arena;
use crate::error::Error;
use crate::geom::Rect;
use crate::pdf::deserialize::{
    self, Deserialize, FieldDescriptor,
};
use crate::pdf::object::{Dictionary, ObjectId};
use crate::pdf::resolver::{LazyRef, Record, Resolver};

#[derive(Debug, Default)]
pub struct Catalog {
    pub pages: LazyRef<PageTreeNode>,
}

impl Record for Catalog {
    const STRUCT_NAME: &'static str = "Catalog";
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self> {
        &resolver.records.catalog
    }
}

impl<'a> Deserialize<'a> for Catalog {
    const STRUCT_NAME: &'static str = "Catalog";
    const FIELDS: &'static [FieldDescriptor<Catalog>] = &[FieldDescriptor {
        key: "Pages",
        apply: |slot, dict, resolver| {
            let obj = deserialize::require(dict, resolver, "Catalog", "Pages")?;
            let id = obj
                .as_reference()
                .or_else(|| dict.get("Pages").and_then(|o| o.as_reference()))
                .ok_or(Error::IncorrectType { expected: "reference", got: obj.type_of() })?;
            slot.pages = LazyRef::new(id);
            Ok(())
        },
    }];
}

/// A node in the page tree: either an intermediate `/Type /Pages` node or a
/// leaf `/Type /Page`. Kids are kept as raw ids and dispatched by `/Type` at
/// walk time (see `render::walk_pages`), since a homogeneous `LazyRef<T>`
/// can't describe a slot that's sometimes a `Page` and sometimes another
/// `PageTreeNode`.
#[derive(Debug, Default)]
pub struct PageTreeNode {
    pub parent: Option<ObjectId>,
    pub kids: Vec<ObjectId>,
    pub resources: Option<ObjectId>,
    pub media_box: Option<Rect>,
}

impl Record for PageTreeNode {
    const STRUCT_NAME: &'static str = "Pages";
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self> {
        &resolver.records.page_tree_node
    }
}

impl<'a> Deserialize<'a> for PageTreeNode {
    const STRUCT_NAME: &'static str = "Pages";
    const FIELDS: &'static [FieldDescriptor<PageTreeNode>] = &[
        FieldDescriptor {
            key: "Parent",
            apply: |slot, dict, _resolver| {
                slot.parent = dict.get("Parent").and_then(|o| o.as_reference());
                Ok(())
            },
        },
        FieldDescriptor {
            key: "Kids",
            apply: |slot, dict, resolver| {
                slot.kids = deserialize::optional_reference_array(dict, resolver, "Kids")?;
                Ok(())
            },
        },
        FieldDescriptor {
            key: "Resources",
            apply: |slot, dict, _resolver| {
                slot.resources = dict.get("Resources").and_then(|o| o.as_reference());
                Ok(())
            },
        },
        FieldDescriptor {
            key: "MediaBox",
            apply: |slot, dict, resolver| {
                if let Some(nums) = deserialize::optional_number_array(dict, resolver, "MediaBox")? {
                    slot.media_box = rect_from_numbers(&nums);
                }
                Ok(())
            },
        },
    ];
}

#[derive(Debug, Default)]
pub struct Page {
    pub parent: Option<ObjectId>,
    pub resources: Option<ObjectId>,
    pub media_box: Option<Rect>,
    pub contents: Vec<ObjectId>,
    pub rotate: i64,
}

impl Record for Page {
    const STRUCT_NAME: &'static str = "Page";
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self> {
        &resolver.records.page
    }
}

impl<'a> Deserialize<'a> for Page {
    const STRUCT_NAME: &'static str = "Page";
    const FIELDS: &'static [FieldDescriptor<Page>] = &[
        FieldDescriptor {
            key: "Parent",
            apply: |slot, dict, _resolver| {
                slot.parent = dict.get("Parent").and_then(|o| o.as_reference());
                Ok(())
            },
        },
        FieldDescriptor {
            key: "Resources",
            apply: |slot, dict, _resolver| {
                slot.resources = dict.get("Resources").and_then(|o| o.as_reference());
                Ok(())
            },
        },
        FieldDescriptor {
            key: "MediaBox",
            apply: |slot, dict, resolver| {
                if let Some(nums) = deserialize::optional_number_array(dict, resolver, "MediaBox")? {
                    slot.media_box = rect_from_numbers(&nums);
                }
                Ok(())
            },
        },
        FieldDescriptor {
            key: "Contents",
            apply: |slot, dict, resolver| {
                slot.contents = deserialize::optional_reference_array(dict, resolver, "Contents")?;
                Ok(())
            },
        },
        FieldDescriptor {
            key: "Rotate",
            apply: |slot, dict, resolver| {
                slot.rotate = deserialize::optional_int(dict, resolver, "Rotate")?.unwrap_or(0);
                Ok(())
            },
        },
    ];
}

/// A page's inherited resource dictionary: named font, XObject, and
/// ExtGState entries. Color space entries are still looked up directly off
/// the raw dictionary in `gstate.rs` rather than copied here, since nothing
/// in this crate deserializes them to a typed shape.
#[derive(Debug, Default)]
pub struct Resources {
    pub fonts: Vec<(String, ObjectId)>,
    pub xobjects: Vec<(String, ObjectId)>,
    pub ext_gstates: Vec<(String, ObjectId)>,
}

impl Resources {
    pub fn font(&self, name: &str) -> Option<ObjectId> {
        self.fonts.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }

    pub fn xobject(&self, name: &str) -> Option<ObjectId> {
        self.xobjects.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }

    pub fn ext_gstate(&self, name: &str) -> Option<ObjectId> {
        self.ext_gstates.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }
}

impl Record for Resources {
    const STRUCT_NAME: &'static str = "Resources";
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self> {
        &resolver.records.resources
    }
}

impl<'a> Deserialize<'a> for Resources {
    const STRUCT_NAME: &'static str = "Resources";
    const FIELDS: &'static [FieldDescriptor<Resources>] = &[
        FieldDescriptor {
            key: "Font",
            apply: |slot, dict, resolver| {
                slot.fonts = deserialize::optional_name_reference_map(dict, resolver, "Font")?;
                Ok(())
            },
        },
        FieldDescriptor {
            key: "XObject",
            apply: |slot, dict, resolver| {
                slot.xobjects = deserialize::optional_name_reference_map(dict, resolver, "XObject")?;
                Ok(())
            },
        },
        FieldDescriptor {
            key: "ExtGState",
            apply: |slot, dict, resolver| {
                slot.ext_gstates = deserialize::optional_name_reference_map(dict, resolver, "ExtGState")?;
                Ok(())
            },
        },
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontSubtype {
    #[default]
    Type1,
    TrueType,
    Type3,
    Type0,
    CIDFontType0,
    CIDFontType2,
}

impl FontSubtype {
    fn from_name(name: &str) -> FontSubtype {
        match name {
            "TrueType" => FontSubtype::TrueType,
            "Type3" => FontSubtype::Type3,
            "Type0" => FontSubtype::Type0,
            "CIDFontType0" => FontSubtype::CIDFontType0,
            "CIDFontType2" => FontSubtype::CIDFontType2,
            _ => FontSubtype::Type1,
        }
    }
}

#[derive(Debug, Default)]
pub struct FontDict {
    pub subtype: FontSubtype,
    pub base_font: String,
    pub first_char: i64,
    pub last_char: i64,
    pub widths: Vec<f64>,
    pub missing_width: f64,
    pub to_unicode: Option<ObjectId>,
    pub encoding_differences: Vec<(u32, String)>,
    pub base_encoding: Option<String>,
    /// For `/Type0` composite fonts: the single descendant CIDFont and its
    /// embedded CMap (either a named predefined encoding or a stream).
    pub descendant_font: Option<ObjectId>,
    pub encoding_cmap: Option<ObjectId>,
    pub font_file: Option<ObjectId>,
    pub font_file_kind: Option<FontFileKind>,
    pub default_width: f64,
    pub cid_widths: Vec<(u32, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFileKind {
    Type1,
    TrueType,
    OpenType,
}

impl Record for FontDict {
    const STRUCT_NAME: &'static str = "Font";
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self> {
        &resolver.records.font_dict
    }
}

impl<'a> Deserialize<'a> for FontDict {
    const STRUCT_NAME: &'static str = "Font";
    const FIELDS: &'static [FieldDescriptor<FontDict>] = &[
        FieldDescriptor {
            key: "Subtype",
            apply: |slot, dict, resolver| {
                if let Some(name) = deserialize::optional_name_owned(dict, resolver, "Subtype")? {
                    slot.subtype = FontSubtype::from_name(&name);
                }
                Ok(())
            },
        },
        FieldDescriptor {
            key: "BaseFont",
            apply: |slot, dict, resolver| {
                slot.base_font = deserialize::optional_name_owned(dict, resolver, "BaseFont")?.unwrap_or_default();
                Ok(())
            },
        },
        FieldDescriptor {
            key: "FirstChar",
            apply: |slot, dict, resolver| {
                slot.first_char = deserialize::optional_int(dict, resolver, "FirstChar")?.unwrap_or(0);
                Ok(())
            },
        },
        FieldDescriptor {
            key: "LastChar",
            apply: |slot, dict, resolver| {
                slot.last_char = deserialize::optional_int(dict, resolver, "LastChar")?.unwrap_or(0);
                Ok(())
            },
        },
        FieldDescriptor {
            key: "Widths",
            apply: |slot, dict, resolver| {
                slot.widths = deserialize::optional_number_array(dict, resolver, "Widths")?.unwrap_or_default();
                Ok(())
            },
        },
        FieldDescriptor {
            key: "ToUnicode",
            apply: |slot, dict, _resolver| {
                slot.to_unicode = dict.get("ToUnicode").and_then(|o| o.as_reference());
                Ok(())
            },
        },
        FieldDescriptor {
            key: "Encoding",
            apply: |slot, dict, resolver| {
                match dict.get("Encoding") {
                    Some(obj) => {
                        let resolved = resolver.resolve_object(obj, true)?;
                        if let Some(name) = resolved.as_name() {
                            slot.base_encoding =
                                Some(String::from_utf8_lossy(name.as_bytes()).into_owned());
                        } else if let Some(enc_dict) = resolved.as_dict() {
                            slot.base_encoding = enc_dict
                                .get("BaseEncoding")
                                .and_then(|o| o.as_name())
                                .map(|n| String::from_utf8_lossy(n.as_bytes()).into_owned());
                            slot.encoding_differences = read_differences(enc_dict, resolver)?;
                        } else if resolved.as_reference().is_some() {
                            slot.encoding_cmap = resolved.as_reference();
                        }
                    }
                    None => {}
                }
                Ok(())
            },
        },
        FieldDescriptor {
            key: "DescendantFonts",
            apply: |slot, dict, resolver| {
                let ids = deserialize::optional_reference_array(dict, resolver, "DescendantFonts")?;
                slot.descendant_font = ids.into_iter().next();
                Ok(())
            },
        },
        FieldDescriptor {
            key: "FontDescriptor",
            apply: |slot, dict, resolver| {
                let Some(obj) = deserialize::optional(dict, resolver, "FontDescriptor")? else {
                    return Ok(());
                };
                let Some(fd) = obj.as_dict() else { return Ok(()) };
                slot.missing_width = deserialize::optional_number(fd, resolver, "MissingWidth")?.unwrap_or(0.);
                if let Some(id) = fd.get("FontFile").and_then(|o| o.as_reference()) {
                    slot.font_file = Some(id);
                    slot.font_file_kind = Some(FontFileKind::Type1);
                } else if let Some(id) = fd.get("FontFile2").and_then(|o| o.as_reference()) {
                    slot.font_file = Some(id);
                    slot.font_file_kind = Some(FontFileKind::TrueType);
                } else if let Some(id) = fd.get("FontFile3").and_then(|o| o.as_reference()) {
                    slot.font_file = Some(id);
                    slot.font_file_kind = Some(FontFileKind::OpenType);
                }
                Ok(())
            },
        },
        FieldDescriptor {
            key: "DW",
            apply: |slot, dict, resolver| {
                slot.default_width = deserialize::optional_number(dict, resolver, "DW")?.unwrap_or(1000.);
                Ok(())
            },
        },
        FieldDescriptor {
            key: "W",
            apply: |slot, dict, resolver| {
                slot.cid_widths = read_cid_widths(dict, resolver)?;
                Ok(())
            },
        },
    ];
}

fn read_differences(
    enc_dict: Dictionary,
    resolver: &Resolver,
) -> Result<Vec<(u32, String)>, Error> {
    let Some(obj) = deserialize::optional(enc_dict, resolver, "Differences")? else {
        return Ok(Vec::new());
    };
    let arr = obj.as_array().ok_or(Error::IncorrectType { expected: "array", got: obj.type_of() })?;
    let mut out = Vec::new();
    let mut code = 0u32;
    for item in arr {
        let resolved = resolver.resolve_object(item, true)?;
        if let Some(n) = resolved.as_integer() {
            code = n as u32;
        } else if let Some(name) = resolved.as_name() {
            out.push((code, String::from_utf8_lossy(name.as_bytes()).into_owned()));
            code += 1;
        }
    }
    Ok(out)
}

/// Parses the `/W` array of a CIDFont: a flat sequence mixing
/// `c [w1 w2 ...]` runs and `cFirst cLast w` ranges.
fn read_cid_widths(dict: Dictionary, resolver: &Resolver) -> Result<Vec<(u32, f64)>, Error> {
    let Some(obj) = deserialize::optional(dict, resolver, "W")? else { return Ok(Vec::new()) };
    let arr = obj.as_array().ok_or(Error::IncorrectType { expected: "array", got: obj.type_of() })?;
    let mut out = Vec::new();
    let mut i = 0;
    let resolved: Vec<_> = arr
        .iter()
        .map(|o| resolver.resolve_object(o, true))
        .collect::<Result<_, _>>()?;
    while i < resolved.len() {
        let first = resolved[i].as_number().ok_or(Error::IncorrectType { expected: "number", got: resolved[i].type_of() })? as u32;
        i += 1;
        if i >= resolved.len() {
            break;
        }
        if let Some(widths) = resolved[i].as_array() {
            for (offset, w) in widths.iter().enumerate() {
                let resolved_w = resolver.resolve_object(w, true)?;
                if let Some(w) = resolved_w.as_number() {
                    out.push((first + offset as u32, w));
                }
            }
            i += 1;
        } else {
            let last = resolved[i].as_number().ok_or(Error::IncorrectType { expected: "number", got: resolved[i].type_of() })? as u32;
            i += 1;
            let w = resolved.get(i).and_then(|o| o.as_number()).unwrap_or(0.);
            i += 1;
            for cid in first..=last {
                out.push((cid, w));
            }
        }
    }
    Ok(out)
}

fn rect_from_numbers(nums: &[f64]) -> Option<Rect> {
    if nums.len() == 4 {
        Some(Rect::from_numbers(nums[0], nums[1], nums[2], nums[3]))
    } else {
        None
    }
}

/// Any stream dictionary consumed generically (e.g. `/ToUnicode`,
/// `/Encoding` CMap streams) where only the decoded bytes matter, not a
/// richer typed shape.
#[derive(Debug, Default)]
pub struct StreamDictRecord {
    pub filter_names: Vec<String>,
}

impl Record for StreamDictRecord {
    const STRUCT_NAME: &'static str = "Stream";
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self> {
        &resolver.records.stream_dict
    }
}

impl<'a> Deserialize<'a> for StreamDictRecord {
    const STRUCT_NAME: &'static str = "Stream";
    const FIELDS: &'static [FieldDescriptor<StreamDictRecord>] = &[];
}

#[derive(Debug, Default)]
pub struct FormXObject {
    pub matrix: Option<[f64; 6]>,
    pub bbox: Option<Rect>,
    pub resources: Option<ObjectId>,
}

impl Record for FormXObject {
    const STRUCT_NAME: &'static str = "XObject";
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self> {
        &resolver.records.form_xobject
    }
}

impl<'a> Deserialize<'a> for FormXObject {
    const STRUCT_NAME: &'static str = "XObject";
    const FIELDS: &'static [FieldDescriptor<FormXObject>] = &[
        FieldDescriptor {
            key: "Matrix",
            apply: |slot, dict, resolver| {
                if let Some(nums) = deserialize::optional_number_array(dict, resolver, "Matrix")? {
                    if nums.len() == 6 {
                        slot.matrix = Some([nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]]);
                    }
                }
                Ok(())
            },
        },
        FieldDescriptor {
            key: "BBox",
            apply: |slot, dict, resolver| {
                if let Some(nums) = deserialize::optional_number_array(dict, resolver, "BBox")? {
                    slot.bbox = rect_from_numbers(&nums);
                }
                Ok(())
            },
        },
        FieldDescriptor {
            key: "Resources",
            apply: |slot, dict, _resolver| {
                slot.resources = dict.get("Resources").and_then(|o| o.as_reference());
                Ok(())
            },
        },
    ];
}

/// Parameters pulled from an `/ExtGState` dictionary referenced by `gs`.
#[derive(Debug, Default)]
pub struct GStateParams {
    pub line_width: Option<f64>,
    pub fill_alpha: Option<f64>,
    pub stroke_alpha: Option<f64>,
}

impl Record for GStateParams {
    const STRUCT_NAME: &'static str = "ExtGState";
    fn arena<'a>(resolver: &Resolver<'a>) -> &'a Arena<Self> {
        &resolver.records.gstate_params
    }
}

impl<'a> Deserialize<'a> for GStateParams {
    const STRUCT_NAME: &'static str = "ExtGState";
    const FIELDS: &'static [FieldDescriptor<GStateParams>] = &[
        FieldDescriptor {
            key: "LW",
            apply: |slot, dict, resolver| {
                slot.line_width = deserialize::optional_number(dict, resolver, "LW")?;
                Ok(())
            },
        },
        FieldDescriptor {
            key: "ca",
            apply: |slot, dict, resolver| {
                slot.fill_alpha = deserialize::optional_number(dict, resolver, "ca")?;
                Ok(())
            },
        },
        FieldDescriptor {
            key: "CA",
            apply: |slot, dict, resolver| {
                slot.stroke_alpha = deserialize::optional_number(dict, resolver, "CA")?;
                Ok(())
            },
        },
    ];
}
