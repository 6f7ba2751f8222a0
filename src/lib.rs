//! Renders PDF documents to raster images.
//!
//! `pdf` holds the parser, typed object model, and content-stream
//! interpreter; `fonts` parses the embedded TrueType/CFF glyph outlines
//! `pdf::gstate` asks for; `path`/`geom`/`canvas` are the shared
//! rasterization primitives neither of those is specific to.

pub mod arena;
mod cursor;

pub mod canvas;
pub mod error;
pub mod fonts;
pub mod geom;
pub mod path;
pub mod pdf;

pub use error::Error;
