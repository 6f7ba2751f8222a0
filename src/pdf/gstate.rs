//! Graphics and text state, and the content-stream interpreter that drives
//! `canvas`/`path`/`fonts` from the `Operation`s `content::parse_operations`
//! produces.
//!
//! The `q`/`Q`/`cm` stack-and-compose pattern mirrors how the teacher
//! threads state through its own SVG path-building code
//! (`svg::path`/`svg::geometry`), generalized here from a single current
//! transform to the full PDF graphics state (color, line width, text
//! parameters) the specification's operator table calls for.

use std::collections::HashMap;
use std::rc::Rc;

use crate::canvas::{Canvas, Rgba};
use crate::error::Error;
use crate::fonts::FontProgram;
use crate::geom::{Mat3, Rect, Vec2};
use crate::path::{FillRule, Path};
use crate::pdf::cmap::CMap;
use crate::pdf::content::{Operand, Operation};
use crate::pdf::object::ObjectId;
use crate::pdf::resolver::{LazyRef, Resolver};
use crate::pdf::types::{FontDict, FontSubtype, FormXObject, GStateParams, Resources};

#[derive(Debug, Clone)]
pub struct GraphicsState {
    pub ctm: Mat3,
    pub fill_color: Rgba,
    pub stroke_color: Rgba,
    pub line_width: f64,
    pub fill_alpha: f64,
    pub stroke_alpha: f64,
    pub font: Option<ObjectId>,
    pub font_size: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    pub horizontal_scaling: f64,
    pub leading: f64,
    pub text_rise: f64,
    pub render_mode: i64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: Mat3::IDENTITY,
            fill_color: Rgba::BLACK,
            stroke_color: Rgba::BLACK,
            line_width: 1.0,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            text_rise: 0.0,
            render_mode: 0,
        }
    }
}

/// A font resolved for rendering: its dictionary, the CIDFont descendant's
/// dictionary for composite fonts (carrying `/W`/`/DW`), the embedded
/// outline program(s), and an encoding CMap if one was embedded as a
/// stream. Borrowed straight out of the document's arenas (`'a`), so no
/// cloning is needed to cache it across `Tf`/`Tj` calls.
struct LoadedFont<'a> {
    dict: &'a FontDict,
    descendant: Option<&'a FontDict>,
    program: Option<Rc<FontProgram>>,
    descendant_program: Option<Rc<FontProgram>>,
    cmap: Option<Rc<CMap>>,
}

pub struct Interpreter<'a, 'r> {
    resolver: &'r Resolver<'a>,
    canvas: &'r mut Canvas,
    stack: Vec<GraphicsState>,
    state: GraphicsState,
    path: Path,
    pending_clip: Option<FillRule>,
    /// Device-space bound a Form XObject's `/BBox` imposes on everything it
    /// paints, per the `Do` operator's contract. Saved/restored around each
    /// `do_xobject` recursion rather than carried on `GraphicsState`, since
    /// nothing else in this crate's clip model (`W`/`W*`) tracks a region.
    clip: Option<Rect>,
    text_matrix: Mat3,
    text_line_matrix: Mat3,
    font_cache: HashMap<ObjectId, Rc<LoadedFont<'a>>>,
    depth: u32,
}

const MAX_FORM_DEPTH: u32 = 32;

impl<'a, 'r> Interpreter<'a, 'r> {
    pub fn new(resolver: &'r Resolver<'a>, canvas: &'r mut Canvas, base_ctm: Mat3) -> Self {
        let mut state = GraphicsState::default();
        state.ctm = base_ctm;
        Interpreter {
            resolver,
            canvas,
            stack: Vec::new(),
            state,
            path: Path::new(),
            pending_clip: None,
            clip: None,
            text_matrix: Mat3::IDENTITY,
            text_line_matrix: Mat3::IDENTITY,
            font_cache: HashMap::new(),
            depth: 0,
        }
    }

    pub fn run(&mut self, content: &[u8], resources: Option<&'a Resources>) -> Result<(), Error> {
        let operations = crate::pdf::content::parse_operations(content)?;
        for op in &operations {
            self.execute(op, resources)?;
        }
        Ok(())
    }

    fn execute(&mut self, op: &Operation, resources: Option<&'a Resources>) -> Result<(), Error> {
        let n = |op: &Operation, i: usize| op.operands.get(i).and_then(Operand::as_number).unwrap_or(0.0);
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                self.state = self.stack.pop().ok_or(Error::GStateUnderflow)?;
            }
            "cm" => {
                let m = Mat3::pdf(n(op, 0), n(op, 1), n(op, 2), n(op, 3), n(op, 4), n(op, 5));
                self.state.ctm = m.mul(self.state.ctm);
            }
            "w" => self.state.line_width = n(op, 0),
            "gs" => {
                if let (Some(name), Some(resources)) = (op.operands.first().and_then(operand_name), resources) {
                    self.apply_ext_gstate(name, resources)?;
                }
            }
            "m" => {
                let p = Vec2::new(n(op, 0), n(op, 1));
                self.path.move_to(p);
            }
            "l" => {
                let p = Vec2::new(n(op, 0), n(op, 1));
                self.path.line_to(p);
            }
            "c" => {
                self.path.curve_to(Vec2::new(n(op, 0), n(op, 1)), Vec2::new(n(op, 2), n(op, 3)), Vec2::new(n(op, 4), n(op, 5)));
            }
            "v" => {
                let current = self.path.current_point();
                self.path.curve_to(current, Vec2::new(n(op, 0), n(op, 1)), Vec2::new(n(op, 2), n(op, 3)));
            }
            "y" => {
                let p3 = Vec2::new(n(op, 2), n(op, 3));
                self.path.curve_to(Vec2::new(n(op, 0), n(op, 1)), p3, p3);
            }
            "re" => {
                let (x, y, w, h) = (n(op, 0), n(op, 1), n(op, 2), n(op, 3));
                self.path.move_to(Vec2::new(x, y));
                self.path.line_to(Vec2::new(x + w, y));
                self.path.line_to(Vec2::new(x + w, y + h));
                self.path.line_to(Vec2::new(x, y + h));
                self.path.close();
            }
            "h" => self.path.close(),
            "S" => {
                self.stroke();
                self.end_path();
            }
            "s" => {
                self.path.close();
                self.stroke();
                self.end_path();
            }
            "f" | "F" => {
                self.fill(FillRule::NonZero);
                self.end_path();
            }
            "f*" => {
                self.fill(FillRule::EvenOdd);
                self.end_path();
            }
            "B" => {
                self.fill(FillRule::NonZero);
                self.stroke();
                self.end_path();
            }
            "B*" => {
                self.fill(FillRule::EvenOdd);
                self.stroke();
                self.end_path();
            }
            "b" => {
                self.path.close();
                self.fill(FillRule::NonZero);
                self.stroke();
                self.end_path();
            }
            "b*" => {
                self.path.close();
                self.fill(FillRule::EvenOdd);
                self.stroke();
                self.end_path();
            }
            "n" => self.end_path(),
            "W" => self.pending_clip = Some(FillRule::NonZero),
            "W*" => self.pending_clip = Some(FillRule::EvenOdd),
            "g" => self.state.fill_color = gray(n(op, 0)),
            "G" => self.state.stroke_color = gray(n(op, 0)),
            "rg" => self.state.fill_color = rgb(n(op, 0), n(op, 1), n(op, 2)),
            "RG" => self.state.stroke_color = rgb(n(op, 0), n(op, 1), n(op, 2)),
            "k" => self.state.fill_color = cmyk(n(op, 0), n(op, 1), n(op, 2), n(op, 3)),
            "K" => self.state.stroke_color = cmyk(n(op, 0), n(op, 1), n(op, 2), n(op, 3)),
            "BT" => {
                self.text_matrix = Mat3::IDENTITY;
                self.text_line_matrix = Mat3::IDENTITY;
            }
            "ET" => {}
            "Tc" => self.state.char_spacing = n(op, 0),
            "Tw" => self.state.word_spacing = n(op, 0),
            "Tz" => self.state.horizontal_scaling = n(op, 0) / 100.0,
            "TL" => self.state.leading = n(op, 0),
            "Ts" => self.state.text_rise = n(op, 0),
            "Tr" => self.state.render_mode = n(op, 0) as i64,
            "Tf" => {
                if let Some(name) = op.operands.first().and_then(operand_name) {
                    if let Some(resources) = resources {
                        self.state.font = resources.font(name);
                    }
                }
                self.state.font_size = n(op, 1);
            }
            "Td" => {
                let m = Mat3::translation(n(op, 0), n(op, 1));
                self.text_line_matrix = m.mul(self.text_line_matrix);
                self.text_matrix = self.text_line_matrix;
            }
            "TD" => {
                self.state.leading = -n(op, 1);
                let m = Mat3::translation(n(op, 0), n(op, 1));
                self.text_line_matrix = m.mul(self.text_line_matrix);
                self.text_matrix = self.text_line_matrix;
            }
            "Tm" => {
                self.text_line_matrix = Mat3::pdf(n(op, 0), n(op, 1), n(op, 2), n(op, 3), n(op, 4), n(op, 5));
                self.text_matrix = self.text_line_matrix;
            }
            "T*" => {
                let m = Mat3::translation(0.0, -self.state.leading);
                self.text_line_matrix = m.mul(self.text_line_matrix);
                self.text_matrix = self.text_line_matrix;
            }
            "Tj" => {
                if let Some(Operand::String(bytes)) = op.operands.first() {
                    self.show_text(bytes)?;
                }
            }
            "'" => {
                let m = Mat3::translation(0.0, -self.state.leading);
                self.text_line_matrix = m.mul(self.text_line_matrix);
                self.text_matrix = self.text_line_matrix;
                if let Some(Operand::String(bytes)) = op.operands.first() {
                    self.show_text(bytes)?;
                }
            }
            "\"" => {
                self.state.word_spacing = n(op, 0);
                self.state.char_spacing = n(op, 1);
                let m = Mat3::translation(0.0, -self.state.leading);
                self.text_line_matrix = m.mul(self.text_line_matrix);
                self.text_matrix = self.text_line_matrix;
                if let Some(Operand::String(bytes)) = op.operands.get(2) {
                    self.show_text(bytes)?;
                }
            }
            "TJ" => {
                if let Some(Operand::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Operand::String(bytes) => self.show_text(bytes)?,
                            Operand::Number(adjust) => {
                                let tx = -adjust / 1000.0 * self.state.font_size * self.state.horizontal_scaling;
                                self.text_matrix = Mat3::translation(tx, 0.0).mul(self.text_matrix);
                            }
                            _ => {}
                        }
                    }
                }
            }
            "Do" => {
                if let Some(name) = op.operands.first().and_then(operand_name) {
                    if let Some(resources) = resources {
                        self.do_xobject(name, resources)?;
                    }
                }
            }
            _ => {} // unrecognized or unsupported operator: ignored, not fatal
        }
        Ok(())
    }

    fn end_path(&mut self) {
        if let Some(rule) = self.pending_clip.take() {
            // `W`/`W*` mark the current path as the new clip region but
            // don't change it until the next painting operator; this crate
            // only tracks the coarser Form XObject `/BBox` clip (`self.clip`,
            // set in `do_xobject`), not an arbitrary clip path, so the
            // marked region itself is dropped here.
            let _ = rule;
        }
        self.path = Path::new();
    }

    fn fill(&mut self, rule: FillRule) {
        let device_path = self.path.transform(self.state.ctm);
        let mut color = self.state.fill_color;
        color.a = (color.a as f64 * self.state.fill_alpha).round() as u8;
        self.canvas.fill_path(&device_path, rule, color, self.clip);
    }

    fn stroke(&mut self) {
        // Stroking is approximated by filling a rectangle per polyline
        // segment rather than adding a dedicated outline-offset pass,
        // which keeps the rasterizer to a single fill code path.
        let line_width = (self.state.line_width.max(0.1)) * self.state.ctm.determinant().abs().sqrt();
        let device_path = self.path.transform(self.state.ctm);
        let mut color = self.state.stroke_color;
        color.a = (color.a as f64 * self.state.stroke_alpha).round() as u8;
        for contour in device_path.contours() {
            for window in contour.points.windows(2) {
                let (a, b) = (window[0], window[1]);
                let quad = stroke_quad(a, b, line_width.max(0.5));
                self.canvas.fill_path(&quad, FillRule::NonZero, color, self.clip);
            }
        }
    }

    fn apply_ext_gstate(&mut self, name: &str, resources: &Resources) -> Result<(), Error> {
        let Some(id) = find_ext_gstate(resources, name) else { return Ok(()) };
        let params: &GStateParams = LazyRef::new(id).get(self.resolver)?;
        if let Some(lw) = params.line_width {
            self.state.line_width = lw;
        }
        if let Some(ca) = params.fill_alpha {
            self.state.fill_alpha = ca;
        }
        if let Some(ca) = params.stroke_alpha {
            self.state.stroke_alpha = ca;
        }
        Ok(())
    }

    fn show_text(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let Some(font_id) = self.state.font else { return Ok(()) };
        let font = self.load_font(font_id)?;
        let mut i = 0;
        while i < bytes.len() {
            let code_len = font.cmap.as_ref().map(|c| c.code_byte_length(&bytes[i..])).unwrap_or(1).max(1).min(bytes.len() - i);
            let code = bytes[i..i + code_len].iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
            i += code_len;

            let width = glyph_width(&font, code) / 1000.0 * self.state.font_size;
            if self.state.render_mode != 3 {
                if let Some(glyph_path) = self.glyph_path(&font, code)? {
                    let scale = self.state.font_size / units_per_em(&font) as f64;
                    let glyph_to_text =
                        Mat3::scaling(scale * self.state.horizontal_scaling, scale).mul(Mat3::translation(0.0, self.state.text_rise));
                    let device_path = glyph_path.transform(glyph_to_text.mul(self.text_matrix).mul(self.state.ctm));
                    let mut color = self.state.fill_color;
                    color.a = (color.a as f64 * self.state.fill_alpha).round() as u8;
                    self.canvas.fill_path(&device_path, FillRule::NonZero, color, self.clip);
                }
            }

            let word_spacing = if code_len == 1 && code == 0x20 { self.state.word_spacing } else { 0.0 };
            let tx = (width + self.state.char_spacing + word_spacing) * self.state.horizontal_scaling;
            self.text_matrix = Mat3::translation(tx, 0.0).mul(self.text_matrix);
        }
        Ok(())
    }

    fn glyph_path(&mut self, font: &LoadedFont<'a>, code: u32) -> Result<Option<Path>, Error> {
        let (program, glyph_index) = match font.dict.subtype {
            FontSubtype::Type0 | FontSubtype::CIDFontType0 | FontSubtype::CIDFontType2 => {
                let Some(program) = &font.descendant_program else { return Ok(None) };
                let cid = font.cmap.as_ref().map(|c| c.cid_for_code(code)).unwrap_or(code);
                (program.clone(), cid as u16)
            }
            _ => {
                let Some(program) = &font.program else { return Ok(None) };
                let glyph_index = self.simple_glyph_index(font, program, code);
                (program.clone(), glyph_index)
            }
        };
        Ok(Some(program.glyph_outline(glyph_index)?))
    }

    fn simple_glyph_index(&self, font: &LoadedFont<'a>, program: &FontProgram, code: u32) -> u16 {
        if let Some((_, name)) = font.dict.encoding_differences.iter().find(|(c, _)| *c == code) {
            if let Some(gid) = program.glyph_for_name(name) {
                return gid;
            }
        }
        program.glyph_for_unicode(code).unwrap_or(0)
    }

    fn load_font(&mut self, id: ObjectId) -> Result<Rc<LoadedFont<'a>>, Error> {
        if let Some(font) = self.font_cache.get(&id) {
            return Ok(font.clone());
        }
        let dict: &'a FontDict = LazyRef::new(id).get(self.resolver)?;

        let program = match dict.font_file {
            Some(file_id) => Some(Rc::new(self.load_font_program(file_id)?)),
            None => None,
        };

        let mut descendant = None;
        let mut descendant_program = None;
        if let Some(descendant_id) = dict.descendant_font {
            let descendant_dict: &'a FontDict = LazyRef::new(descendant_id).get(self.resolver)?;
            if let Some(file_id) = descendant_dict.font_file {
                descendant_program = Some(Rc::new(self.load_font_program(file_id)?));
            }
            descendant = Some(descendant_dict);
        }

        let cmap = match dict.encoding_cmap {
            Some(cmap_id) => {
                let bytes = self.resolve_stream_bytes(cmap_id)?;
                Some(Rc::new(CMap::parse(bytes)?))
            }
            None => None,
        };

        let loaded = Rc::new(LoadedFont { dict, descendant, program, descendant_program, cmap });
        self.font_cache.insert(id, loaded.clone());
        Ok(loaded)
    }

    fn load_font_program(&self, file_id: ObjectId) -> Result<FontProgram, Error> {
        let bytes = self.resolve_stream_bytes(file_id)?;
        FontProgram::parse(bytes)
    }

    fn resolve_stream_bytes(&self, id: ObjectId) -> Result<&'a [u8], Error> {
        let obj = self.resolver.resolve_ref(id)?;
        self.resolver.decode_stream(&obj)
    }

    fn do_xobject(&mut self, name: &str, resources: &'a Resources) -> Result<(), Error> {
        let Some(id) = resources.xobject(name) else { return Ok(()) };
        let obj = self.resolver.resolve_ref(id)?;
        let Some(dict) = obj.as_dict() else { return Ok(()) };
        let is_form = dict.get("Subtype").map(|o| o.as_name_eq("Form")).unwrap_or(false);
        if !is_form {
            return Ok(()); // image XObjects are out of scope for this interpreter
        }
        if self.depth >= MAX_FORM_DEPTH {
            return Err(Error::RecursionLimit);
        }
        let form: &'a FormXObject = LazyRef::new(id).get(self.resolver)?;
        let form_resources: Option<&'a Resources> = match form.resources {
            Some(res_id) => Some(LazyRef::new(res_id).get(self.resolver)?),
            None => None,
        };

        self.stack.push(self.state.clone());
        if let Some(m) = form.matrix {
            self.state.ctm = Mat3::pdf(m[0], m[1], m[2], m[3], m[4], m[5]).mul(self.state.ctm);
        }

        // `/BBox` is defined in the form's own coordinate space, so it's
        // projected to device space by the CTM as composed above (the same
        // matrix the form's content stream paints with), then intersected
        // with whatever clip the caller already had so nested forms only
        // ever narrow the region.
        let saved_clip = self.clip;
        let device_bbox = form.bbox.map(|b| b.transform(self.state.ctm));
        self.clip = match (self.clip, device_bbox) {
            // A disjoint bbox and outer clip means nothing should paint, not
            // that the clip is lifted, so fall back to a zero-area rect
            // rather than `None`.
            (Some(existing), Some(bbox)) => {
                Some(existing.intersect(&bbox).unwrap_or(Rect::new(existing.min, existing.min)))
            }
            (existing, None) => existing,
            (None, Some(bbox)) => Some(bbox),
        };

        self.depth += 1;
        let content = self.resolver.decode_stream(&obj)?;
        let result = self.run(content, form_resources.or(Some(resources)));
        self.depth -= 1;
        self.clip = saved_clip;
        self.state = self.stack.pop().ok_or(Error::GStateUnderflow)?;
        result
    }
}

fn find_ext_gstate(resources: &Resources, name: &str) -> Option<ObjectId> {
    resources.ext_gstate(name)
}

fn glyph_width(font: &LoadedFont, code: u32) -> f64 {
    if let Some(descendant) = font.descendant {
        return descendant
            .cid_widths
            .iter()
            .find(|(cid, _)| *cid == code)
            .map(|(_, w)| *w)
            .unwrap_or(descendant.default_width);
    }
    let dict = font.dict;
    let idx = code as i64 - dict.first_char;
    if idx >= 0 && (idx as usize) < dict.widths.len() {
        dict.widths[idx as usize]
    } else {
        dict.missing_width
    }
}

fn units_per_em(font: &LoadedFont) -> u16 {
    font.program
        .as_ref()
        .or(font.descendant_program.as_ref())
        .map(|p| p.units_per_em())
        .unwrap_or(1000)
}

fn operand_name(operand: &Operand) -> Option<&str> {
    match operand {
        Operand::Name(n) => Some(n.as_str()),
        _ => None,
    }
}

fn gray(v: f64) -> Rgba {
    let c = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba::new(c, c, c, 255)
}

fn rgb(r: f64, g: f64, b: f64) -> Rgba {
    let conv = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba::new(conv(r), conv(g), conv(b), 255)
}

fn cmyk(c: f64, m: f64, y: f64, k: f64) -> Rgba {
    let conv = |x: f64| (x.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba::new(conv((1.0 - c) * (1.0 - k)), conv((1.0 - m) * (1.0 - k)), conv((1.0 - y) * (1.0 - k)), 255)
}

fn stroke_quad(a: Vec2, b: Vec2, width: f64) -> Path {
    let dir = b.sub(a).normalize();
    let normal = dir.perpendicular().scale(width / 2.0);
    let mut quad = Path::new();
    quad.move_to(a.add(normal));
    quad.line_to(b.add(normal));
    quad.line_to(b.sub(normal));
    quad.line_to(a.sub(normal));
    quad.close();
    quad
}
