//! End-to-end tests: build a minimal PDF's bytes directly (classic xref
//! table, one page, a simple content stream), then drive it through the
//! parser/resolver/interpreter the same way the CLI binary does, and check
//! a few pixels of the resulting raster.

use pdfraster::arena::ByteArena;
use pdfraster::canvas::Rgba;
use pdfraster::pdf::object::ObjectArena;
use pdfraster::pdf::resolver::{RecordArenas, Resolver};
use pdfraster::pdf::xref::XrefTable;
use pdfraster::pdf::{page_count, render_page};

/// Appends an indirect object (`n 0 obj ... endobj`) to `buffer`, recording
/// its byte offset for the xref table being built alongside it.
struct PdfBuilder {
    buffer: Vec<u8>,
    offsets: Vec<usize>, // offsets[i] is the offset of object (i + 1)
}

impl PdfBuilder {
    fn new() -> Self {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"%PDF-1.7\n");
        PdfBuilder { buffer, offsets: Vec::new() }
    }

    fn add_object(&mut self, body: &str) -> u32 {
        let number = self.offsets.len() as u32 + 1;
        self.offsets.push(self.buffer.len());
        self.buffer.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
        number
    }

    fn add_stream(&mut self, dict_body: &str, content: &[u8]) -> u32 {
        let number = self.offsets.len() as u32 + 1;
        self.offsets.push(self.buffer.len());
        self.buffer
            .extend_from_slice(format!("{number} 0 obj\n<< {dict_body} /Length {} >>\nstream\n", content.len()).as_bytes());
        self.buffer.extend_from_slice(content);
        self.buffer.extend_from_slice(b"\nendstream\nendobj\n");
        number
    }

    fn finish(mut self, root: u32) -> Vec<u8> {
        let xref_offset = self.buffer.len();
        let count = self.offsets.len() as u32 + 1;
        self.buffer.extend_from_slice(format!("xref\n0 {count}\n").as_bytes());
        self.buffer.extend_from_slice(b"0000000000 65535 f \r\n");
        for &offset in &self.offsets {
            self.buffer.extend_from_slice(format!("{offset:010} 00000 n \r\n").as_bytes());
        }
        self.buffer
            .extend_from_slice(format!("trailer\n<< /Size {count} /Root {root} 0 R >>\n").as_bytes());
        self.buffer.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());
        self.buffer
    }
}

/// Builds a single-page, 100x100pt document with a 40x40pt filled red
/// square whose lower-left corner is 10pt from the page's own origin.
fn one_page_with_red_square() -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    // Object numbers are assigned in the order `add_object`/`add_stream`
    // is called; reserve them up front by numbering the calls below.
    let catalog = 1;
    let pages = 2;
    let page = 3;
    let content = 4;
    assert_eq!(pdf.add_object(&format!("<< /Type /Catalog /Pages {pages} 0 R >>")), catalog);
    assert_eq!(pdf.add_object(&format!("<< /Type /Pages /Kids [{page} 0 R] /Count 1 >>")), pages);
    assert_eq!(
        pdf.add_object(&format!(
            "<< /Type /Page /Parent {pages} 0 R /MediaBox [0 0 100 100] /Contents {content} 0 R >>"
        )),
        page
    );
    assert_eq!(pdf.add_stream("", b"1 0 0 rg\n10 10 40 40 re\nf"), content);
    pdf.finish(catalog)
}

/// Builds a single-page, 100x100pt document that paints a Form XObject whose
/// content stream fills an 80x80pt blue square, but whose own `/BBox` only
/// covers the square's lower-left 20x20pt — everything the form paints
/// outside that box should be clipped away.
fn one_page_with_a_form_bbox_narrower_than_its_content() -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    let catalog = 1;
    let pages = 2;
    let page = 3;
    let content = 4;
    let form_resources = 5;
    let form = 6;
    assert_eq!(pdf.add_object(&format!("<< /Type /Catalog /Pages {pages} 0 R >>")), catalog);
    assert_eq!(pdf.add_object(&format!("<< /Type /Pages /Kids [{page} 0 R] /Count 1 >>")), pages);
    assert_eq!(
        pdf.add_object(&format!(
            "<< /Type /Page /Parent {pages} 0 R /MediaBox [0 0 100 100] /Contents {content} 0 R \
             /Resources << /XObject << /Fm1 {form} 0 R >> >> >>"
        )),
        page
    );
    assert_eq!(pdf.add_stream("", b"q 1 0 0 1 10 10 cm /Fm1 Do Q"), content);
    assert_eq!(pdf.add_object("<< >>"), form_resources);
    assert_eq!(
        pdf.add_stream(
            &format!("/Type /XObject /Subtype /Form /BBox [0 0 20 20] /Resources {form_resources} 0 R"),
            b"0 0 1 rg\n0 0 80 80 re\nf"
        ),
        form
    );
    pdf.finish(catalog)
}

fn render(buffer: &[u8], page_number: usize) -> pdfraster::canvas::Canvas {
    let xref = XrefTable::load(buffer).unwrap();
    let byte_arena = ByteArena::new();
    let object_arena = ObjectArena::new();
    let records = RecordArenas::default();
    let resolver = Resolver::new(buffer, xref, &byte_arena, &object_arena, &records);
    render_page(&resolver, page_number).unwrap()
}

#[test]
fn renders_a_filled_rectangle_at_the_expected_device_pixels() {
    let buffer = one_page_with_red_square();
    let canvas = render(&buffer, 0);

    assert_eq!((canvas.width(), canvas.height()), (100, 100));

    // PDF space (20, 20) (inside the square) is on-screen near the bottom
    // after the render-space Y flip: device row `height - 20`.
    let inside = canvas.get_pixel(20, 100 - 20);
    assert_eq!(inside, Rgba::new(255, 0, 0, 255));

    // A corner of the canvas well outside the square stays the white
    // background.
    let outside = canvas.get_pixel(5, 5);
    assert_eq!(outside, Rgba::new(255, 255, 255, 255));
}

#[test]
fn a_form_xobjects_content_is_clipped_to_its_own_bbox() {
    let buffer = one_page_with_a_form_bbox_narrower_than_its_content();
    let canvas = render(&buffer, 0);

    // Page-space (20, 20) is inside both the painted square and the form's
    // /BBox (translated to (10..30, 10..30) by the content stream's `cm`).
    let inside_bbox = canvas.get_pixel(20, 100 - 20);
    assert_eq!(inside_bbox, Rgba::new(0, 0, 255, 255));

    // Page-space (50, 50) is inside the 80x80 square the form paints but
    // well outside its /BBox, so it must stay the white background.
    let outside_bbox = canvas.get_pixel(50, 100 - 50);
    assert_eq!(outside_bbox, Rgba::new(255, 255, 255, 255));
}

#[test]
fn page_count_reports_a_single_page_document_correctly() {
    let buffer = one_page_with_red_square();
    let xref = XrefTable::load(&buffer).unwrap();
    let byte_arena = ByteArena::new();
    let object_arena = ObjectArena::new();
    let records = RecordArenas::default();
    let resolver = Resolver::new(&buffer, xref, &byte_arena, &object_arena, &records);
    assert_eq!(page_count(&resolver).unwrap(), 1);
}

#[test]
fn out_of_range_page_number_is_an_error() {
    let buffer = one_page_with_red_square();
    let xref = XrefTable::load(&buffer).unwrap();
    let byte_arena = ByteArena::new();
    let object_arena = ObjectArena::new();
    let records = RecordArenas::default();
    let resolver = Resolver::new(&buffer, xref, &byte_arena, &object_arena, &records);
    assert!(render_page(&resolver, 1).is_err());
}
