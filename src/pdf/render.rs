//! Top-level page rendering: walks the page tree to a leaf `Page`, sets up
//! a device-space canvas from its `/MediaBox` (with the PDF-to-raster Y
//! flip baked into the initial CTM), and drives `gstate::Interpreter` over
//! its content streams.

use crate::canvas::{Canvas, Rgba};
use crate::error::Error;
use crate::geom::Mat3;
use crate::pdf::gstate::Interpreter;
use crate::pdf::object::ObjectId;
use crate::pdf::resolver::{LazyRef, Resolver};
use crate::pdf::types::{Page, PageTreeNode, Resources};

/// Default media box (US Letter, in points) used when a page and all its
/// ancestors omit `/MediaBox` — PDF requires every page to have one via
/// inheritance, but malformed files sometimes don't.
const DEFAULT_MEDIA_BOX: (f64, f64, f64, f64) = (0.0, 0.0, 612.0, 792.0);

/// Dots-per-unit used to turn a page's point-sized MediaBox into a pixel
/// grid. 1.0 keeps a 1:1 mapping (one pixel per point); callers that need a
/// higher-resolution raster should scale the returned canvas's CTM
/// themselves by adjusting this before calling `render_page`.
const DEFAULT_SCALE: f64 = 1.0;

pub fn render_page(resolver: &Resolver, page_number: usize) -> Result<Canvas, Error> {
    let root_id = resolver.root()?;
    let catalog = crate::pdf::resolver::LazyRef::<crate::pdf::types::Catalog>::new(root_id).get(resolver)?;
    let mut pages = Vec::new();
    collect_pages(resolver, catalog.pages.id(), None, None, &mut pages, 0)?;

    let page_id = *pages.get(page_number).ok_or(Error::MissingField { struct_name: "Document", field: "Page" })?;
    let page: &Page = LazyRef::new(page_id).get(resolver)?;

    let media_box = page.media_box.unwrap_or_else(|| crate::geom::Rect::from_numbers(
        DEFAULT_MEDIA_BOX.0,
        DEFAULT_MEDIA_BOX.1,
        DEFAULT_MEDIA_BOX.2,
        DEFAULT_MEDIA_BOX.3,
    ));
    let width = (media_box.width() * DEFAULT_SCALE).round().max(1.0) as u32;
    let height = (media_box.height() * DEFAULT_SCALE).round().max(1.0) as u32;

    // PDF user space has Y increasing upward with the origin at the
    // MediaBox's lower-left corner; device space (and the BMP writer) has Y
    // increasing downward from the top. Flip Y and shift by the box's
    // origin and the page's `/Rotate` before any content-stream `cm`s run.
    let base_ctm = Mat3::translation(-media_box.min.x, -media_box.min.y)
        .mul(Mat3::pdf(1.0, 0.0, 0.0, -1.0, 0.0, height as f64))
        .mul(rotation_matrix(page.rotate))
        .mul(Mat3::scaling(DEFAULT_SCALE, DEFAULT_SCALE));

    let mut canvas = Canvas::new(width, height, Rgba::WHITE);
    let resources: Option<&Resources> = match page.resources {
        Some(id) => Some(LazyRef::new(id).get(resolver)?),
        None => None,
    };

    let mut interpreter = Interpreter::new(resolver, &mut canvas, base_ctm);
    let content = concatenated_content(resolver, &page.contents)?;
    interpreter.run(&content, resources)?;

    Ok(canvas)
}

pub fn page_count(resolver: &Resolver) -> Result<usize, Error> {
    let root_id = resolver.root()?;
    let catalog = crate::pdf::resolver::LazyRef::<crate::pdf::types::Catalog>::new(root_id).get(resolver)?;
    let mut pages = Vec::new();
    collect_pages(resolver, catalog.pages.id(), None, None, &mut pages, 0)?;
    Ok(pages.len())
}

const MAX_PAGE_TREE_DEPTH: u32 = 64;

/// Depth-first walk of the page tree, dispatching each kid by its own
/// `/Type` (a `PageTreeNode` kid recurses, a `Page` kid is collected) since
/// `PageTreeNode::kids` stores raw `ObjectId`s rather than a homogeneous
/// `LazyRef<T>`.
fn collect_pages(
    resolver: &Resolver,
    node_id: ObjectId,
    inherited_resources: Option<ObjectId>,
    inherited_media_box: Option<crate::geom::Rect>,
    out: &mut Vec<ObjectId>,
    depth: u32,
) -> Result<(), Error> {
    if depth >= MAX_PAGE_TREE_DEPTH {
        return Err(Error::RecursionLimit);
    }
    let obj = resolver.resolve_ref(node_id)?;
    let dict = obj.as_dict().ok_or(Error::IncorrectType { expected: "dictionary", got: obj.type_of() })?;
    let is_leaf = dict.get("Type").map(|o| o.as_name_eq("Page")).unwrap_or(false) || dict.get("Kids").is_none();

    if is_leaf {
        out.push(node_id);
        return Ok(());
    }

    let node: &PageTreeNode = LazyRef::new(node_id).get(resolver)?;
    let resources = node.resources.or(inherited_resources);
    let media_box = node.media_box.or(inherited_media_box);
    for &kid in &node.kids {
        inherit_and_recurse(resolver, kid, resources, media_box, out, depth + 1)?;
    }
    Ok(())
}

fn inherit_and_recurse(
    resolver: &Resolver,
    kid_id: ObjectId,
    resources: Option<ObjectId>,
    media_box: Option<crate::geom::Rect>,
    out: &mut Vec<ObjectId>,
    depth: u32,
) -> Result<(), Error> {
    collect_pages(resolver, kid_id, resources, media_box, out, depth)
}

/// Concatenates a page's (possibly multiple) content streams with a space
/// between each, per PDF's rule that `/Contents` may be an array whose
/// entries are processed as a single logical stream.
fn concatenated_content(resolver: &Resolver, content_ids: &[ObjectId]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    for &id in content_ids {
        let obj = resolver.resolve_ref(id)?;
        let bytes = resolver.decode_stream(&obj)?;
        out.extend_from_slice(bytes);
        out.push(b'\n');
    }
    Ok(out)
}

fn rotation_matrix(rotate: i64) -> Mat3 {
    match ((rotate % 360) + 360) % 360 {
        90 => Mat3::pdf(0.0, 1.0, -1.0, 0.0, 0.0, 0.0),
        180 => Mat3::pdf(-1.0, 0.0, 0.0, -1.0, 0.0, 0.0),
        270 => Mat3::pdf(0.0, -1.0, 1.0, 0.0, 0.0, 0.0),
        _ => Mat3::IDENTITY,
    }
}
