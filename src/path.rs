//! Path construction, Bézier flattening, and non-zero-winding-rule scanline
//! rasterization.
//!
//! There's no vector rasterizer in the example pack to ground this on
//! directly, so the shape here follows the teacher's general house style
//! (plain structs, `Vec`-backed builders, no external geometry crate) while
//! implementing the fixed-recursion-depth flattening and supersampled
//! scanline fill the specification calls for.

use crate::geom::{Mat3, Rect, Vec2};

pub const QUAD_FLATNESS: f64 = 0.1;
pub const CUBIC_FLATNESS: f64 = 0.1;
pub const MAX_SUBDIVISION_DEPTH: u32 = 16;
/// Vertical supersampling factor for antialiasing.
pub const SUPERSAMPLE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// A single closed or open subpath: a polyline built up from flattened
/// line/curve segments, in the order the content stream issued them.
#[derive(Debug, Clone, Default)]
pub struct Contour {
    pub points: Vec<Vec2>,
    pub closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Path {
    contours: Vec<Contour>,
    current: Vec2,
    start: Vec2,
}

impl Path {
    pub fn new() -> Self {
        Path::default()
    }

    pub fn move_to(&mut self, p: Vec2) {
        self.contours.push(Contour { points: vec![p], closed: false });
        self.current = p;
        self.start = p;
    }

    pub fn line_to(&mut self, p: Vec2) {
        if self.contours.is_empty() {
            self.move_to(p);
            return;
        }
        self.contours.last_mut().unwrap().points.push(p);
        self.current = p;
    }

    pub fn curve_to(&mut self, c1: Vec2, c2: Vec2, p: Vec2) {
        let start = self.current;
        flatten_cubic(start, c1, c2, p, 0, &mut |pt| self.line_to_flattened(pt));
        self.current = p;
    }

    fn line_to_flattened(&mut self, p: Vec2) {
        if self.contours.is_empty() {
            self.contours.push(Contour { points: vec![p], closed: false });
        } else {
            self.contours.last_mut().unwrap().points.push(p);
        }
    }

    pub fn quad_to(&mut self, c: Vec2, p: Vec2) {
        let start = self.current;
        flatten_quad(start, c, p, 0, &mut |pt| self.line_to_flattened(pt));
        self.current = p;
    }

    pub fn close(&mut self) {
        if let Some(contour) = self.contours.last_mut() {
            contour.closed = true;
            self.current = self.start;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contours.iter().all(|c| c.points.len() < 2)
    }

    pub fn current_point(&self) -> Vec2 {
        self.current
    }

    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    pub fn transform(&self, m: Mat3) -> Path {
        Path {
            contours: self
                .contours
                .iter()
                .map(|c| Contour {
                    points: c.points.iter().map(|&p| m.transform_point(p)).collect(),
                    closed: c.closed,
                })
                .collect(),
            current: m.transform_point(self.current),
            start: m.transform_point(self.start),
        }
    }

    pub fn bounds(&self) -> Option<Rect> {
        let mut iter = self.contours.iter().flat_map(|c| c.points.iter());
        let first = *iter.next()?;
        let mut rect = Rect::new(first, first);
        for &p in iter {
            rect = rect.union(&Rect::new(p, p));
        }
        Some(rect)
    }

    pub fn extend(&mut self, other: &Path) {
        self.contours.extend(other.contours.iter().cloned());
    }
}

fn flatten_quad(p0: Vec2, p1: Vec2, p2: Vec2, depth: u32, emit: &mut impl FnMut(Vec2)) {
    if depth >= MAX_SUBDIVISION_DEPTH || quad_is_flat(p0, p1, p2) {
        emit(p2);
        return;
    }
    let p01 = p0.lerp(p1, 0.5);
    let p12 = p1.lerp(p2, 0.5);
    let mid = p01.lerp(p12, 0.5);
    flatten_quad(p0, p01, mid, depth + 1, emit);
    flatten_quad(mid, p12, p2, depth + 1, emit);
}

fn quad_is_flat(p0: Vec2, p1: Vec2, p2: Vec2) -> bool {
    distance_to_segment(p1, p0, p2) <= QUAD_FLATNESS
}

fn flatten_cubic(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, depth: u32, emit: &mut impl FnMut(Vec2)) {
    if depth >= MAX_SUBDIVISION_DEPTH || cubic_is_flat(p0, p1, p2, p3) {
        emit(p3);
        return;
    }
    let p01 = p0.lerp(p1, 0.5);
    let p12 = p1.lerp(p2, 0.5);
    let p23 = p2.lerp(p3, 0.5);
    let p012 = p01.lerp(p12, 0.5);
    let p123 = p12.lerp(p23, 0.5);
    let mid = p012.lerp(p123, 0.5);
    flatten_cubic(p0, p01, p012, mid, depth + 1, emit);
    flatten_cubic(mid, p123, p23, p3, depth + 1, emit);
}

fn cubic_is_flat(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2) -> bool {
    distance_to_segment(p1, p0, p3) <= CUBIC_FLATNESS && distance_to_segment(p2, p0, p3) <= CUBIC_FLATNESS
}

fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = b.sub(a);
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return p.sub(a).length();
    }
    ab.cross(p.sub(a)).abs() / len_sq.sqrt()
}

/// Scanline-rasterizes `path` into a list of `(y, x0, x1, coverage)` spans
/// covering pixel `y` in `[y0, y1)`, with `coverage` in `0.0..=1.0` from
/// `SUPERSAMPLE`-times vertical supersampling. Horizontal coverage is
/// treated as fully covered between crossing points (no horizontal
/// supersampling), matching a typical scanline-fill antialiasing scheme.
pub fn rasterize(path: &Path, fill_rule: FillRule, bounds: Rect) -> Vec<(i32, i32, i32, f32)> {
    let y0 = bounds.min.y.floor() as i32;
    let y1 = bounds.max.y.ceil() as i32;
    let x0 = bounds.min.x.floor() as i32;
    let x1 = bounds.max.x.ceil() as i32;
    if y1 <= y0 || x1 <= x0 {
        return Vec::new();
    }

    let width = (x1 - x0) as usize;
    let mut row_coverage = vec![0f32; width];
    let mut spans = Vec::new();

    for y in y0..y1 {
        row_coverage.iter_mut().for_each(|c| *c = 0.0);
        for sub in 0..SUPERSAMPLE {
            let sample_y = y as f64 + (sub as f64 + 0.5) / SUPERSAMPLE as f64;
            let crossings = scan_crossings(path, sample_y);
            accumulate_coverage(&crossings, fill_rule, x0, &mut row_coverage, 1.0 / SUPERSAMPLE as f32);
        }
        let mut x = 0;
        while x < width {
            if row_coverage[x] > 0.0 {
                let start = x;
                let coverage = row_coverage[x];
                while x < width && (row_coverage[x] - coverage).abs() < 1e-6 {
                    x += 1;
                }
                spans.push((y, x0 + start as i32, x0 + x as i32, coverage));
            } else {
                x += 1;
            }
        }
    }
    spans
}

struct Crossing {
    x: f64,
    winding: i32,
}

fn scan_crossings(path: &Path, y: f64) -> Vec<Crossing> {
    let mut crossings = Vec::new();
    for contour in path.contours() {
        let pts = &contour.points;
        if pts.len() < 2 {
            continue;
        }
        let n = pts.len();
        for i in 0..n {
            let a = pts[i];
            // An open contour is implicitly closed for fill purposes: PDF
            // fill operators always close every subpath first.
            let b = pts[(i + 1) % n];
            if (a.y <= y && b.y > y) || (b.y <= y && a.y > y) {
                let t = (y - a.y) / (b.y - a.y);
                let x = a.x + t * (b.x - a.x);
                let winding = if b.y > a.y { 1 } else { -1 };
                crossings.push(Crossing { x, winding });
            }
        }
    }
    crossings.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());
    crossings
}

fn accumulate_coverage(crossings: &[Crossing], fill_rule: FillRule, x0: i32, row: &mut [f32], weight: f32) {
    let mut winding = 0;
    let mut i = 0;
    while i < crossings.len() {
        let inside_before = is_inside(winding, fill_rule);
        winding += crossings[i].winding;
        let inside_after = is_inside(winding, fill_rule);
        if !inside_before && inside_after {
            // Entering a filled region: find where it ends.
            let enter_x = crossings[i].x;
            let mut w2 = winding;
            let mut j = i + 1;
            while j < crossings.len() && is_inside(w2, fill_rule) {
                w2 += crossings[j].winding;
                j += 1;
            }
            let exit_x = if j <= crossings.len() && j > 0 { crossings[j - 1].x } else { enter_x };
            paint_span(row, x0, enter_x, exit_x, weight);
            winding = w2;
            i = j;
        } else {
            i += 1;
        }
    }
}

fn is_inside(winding: i32, fill_rule: FillRule) -> bool {
    match fill_rule {
        FillRule::NonZero => winding != 0,
        FillRule::EvenOdd => winding % 2 != 0,
    }
}

fn paint_span(row: &mut [f32], x0: i32, start_x: f64, end_x: f64, weight: f32) {
    let start = (start_x.floor() as i32 - x0).max(0) as usize;
    let end = ((end_x.ceil() as i32 - x0).max(0) as usize).min(row.len());
    for slot in row.iter_mut().take(end).skip(start) {
        *slot += weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterizes_a_filled_square_fully_covered_in_the_middle() {
        let mut path = Path::new();
        path.move_to(Vec2::new(0., 0.));
        path.line_to(Vec2::new(10., 0.));
        path.line_to(Vec2::new(10., 10.));
        path.line_to(Vec2::new(0., 10.));
        path.close();

        let spans = rasterize(&path, FillRule::NonZero, Rect::from_numbers(0., 0., 10., 10.));
        let row5: Vec<_> = spans.iter().filter(|(y, ..)| *y == 5).collect();
        assert!(!row5.is_empty());
        let (_, x0, x1, coverage) = row5[0];
        assert_eq!((*x0, *x1), (0, 10));
        assert!((coverage - 1.0).abs() < 1e-4);
    }

    #[test]
    fn flattening_respects_flatness_bound() {
        let mut path = Path::new();
        path.move_to(Vec2::new(0., 0.));
        path.curve_to(Vec2::new(0., 50.), Vec2::new(50., 50.), Vec2::new(50., 0.));
        let contour = &path.contours()[0];
        assert!(contour.points.len() > 2);
    }
}
