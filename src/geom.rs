//! 2D vectors, 3×3 affine matrices, and axis-aligned rectangles.
//!
//! PDF's `cm`/`Tm` operators carry six numbers `[a b c d e f]` that map to the
//! 3×3 matrix `{{a,b,0},{c,d,0},{e,f,1}}` and compose left-to-right the way PDF
//! describes matrix concatenation. `Mat3` mirrors that convention directly
//! instead of wrapping a general-purpose linear-algebra crate, so the operator
//! semantics in `content`/`gstate` read the same as the spec prose.

use std::ops::Mul;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    pub fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(self, factor: f64) -> Vec2 {
        Vec2::new(self.x * factor, self.y * factor)
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross(self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn normalize(self) -> Vec2 {
        let len = self.length();
        if len == 0. {
            self
        } else {
            self.scale(1. / len)
        }
    }

    /// Rotate 90° counter-clockwise.
    pub fn perpendicular(self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }

    pub fn lerp(self, other: Vec2, t: f64) -> Vec2 {
        self.add(other.sub(self).scale(t))
    }
}

/// A row-vector affine transform: `(x', y', 1) = (x, y, 1) · self`.
///
/// Fields are named after the six PDF matrix operands so `Mat3::pdf(a, b, c, d,
/// e, f)` reads the same as the operator that produced it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat3 {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3 { a: 1., b: 0., c: 0., d: 1., e: 0., f: 0. };

    pub fn pdf(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Mat3 { a, b, c, d, e, f }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Mat3::pdf(1., 0., 0., 1., tx, ty)
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Mat3::pdf(sx, 0., 0., sy, 0., 0.)
    }

    /// Standard row-vector matrix product: `self · other`, i.e. applying the
    /// result is the same as applying `self` then `other`.
    pub fn mul(self, other: Mat3) -> Mat3 {
        Mat3 {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn transform_point(self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x * self.a + p.y * self.c + self.e,
            p.x * self.b + p.y * self.d + self.f,
        )
    }

    /// Transforms a direction vector: ignores translation.
    pub fn transform_vector(self, v: Vec2) -> Vec2 {
        Vec2::new(v.x * self.a + v.y * self.c, v.x * self.b + v.y * self.d)
    }

    pub fn determinant(self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn invert(self) -> Option<Mat3> {
        let det = self.determinant();
        if det == 0. {
            return None;
        }
        let inv_det = 1. / det;
        let a = self.d * inv_det;
        let b = -self.b * inv_det;
        let c = -self.c * inv_det;
        let d = self.a * inv_det;
        let e = -(self.e * a + self.f * c);
        let f = -(self.e * b + self.f * d);
        Some(Mat3 { a, b, c, d, e, f })
    }
}

impl Mul for Mat3 {
    type Output = Mat3;
    fn mul(self, other: Mat3) -> Mat3 {
        Mat3::mul(self, other)
    }
}

impl Default for Mat3 {
    fn default() -> Self {
        Mat3::IDENTITY
    }
}

/// Axis-aligned rectangle, always canonicalized so `min <= max` componentwise.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Rect {
            min: Vec2::new(min.x.min(max.x), min.y.min(max.y)),
            max: Vec2::new(min.x.max(max.x), min.y.max(max.y)),
        }
    }

    /// Canonicalizes four raw numbers as found in a PDF rectangle array,
    /// which may list corners in any order.
    pub fn from_numbers(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Rect::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn transform(&self, m: Mat3) -> Rect {
        let corners = [
            Vec2::new(self.min.x, self.min.y),
            Vec2::new(self.max.x, self.min.y),
            Vec2::new(self.min.x, self.max.y),
            Vec2::new(self.max.x, self.max.y),
        ];
        let mut min = m.transform_point(corners[0]);
        let mut max = min;
        for &corner in &corners[1..] {
            let p = m.transform_point(corner);
            min = Vec2::new(min.x.min(p.x), min.y.min(p.y));
            max = Vec2::new(max.x.max(p.x), max.y.max(p.y));
        }
        Rect { min, max }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: Vec2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Vec2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let min = Vec2::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y));
        let max = Vec2::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y));
        if min.x <= max.x && min.y <= max.y {
            Some(Rect { min, max })
        } else {
            None
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_composition_matches_transform_order() {
        let a = Mat3::translation(3., 4.);
        let b = Mat3::scaling(2., 2.);
        let p = Vec2::new(1., 1.);
        let via_points = b.transform_point(a.transform_point(p));
        let via_compose = (a * b).transform_point(p);
        assert!((via_points.x - via_compose.x).abs() < 1e-9);
        assert!((via_points.y - via_compose.y).abs() < 1e-9);
    }

    #[test]
    fn rect_canonicalizes_any_corner_order() {
        let r = Rect::from_numbers(10., 20., -5., -1.);
        assert_eq!(r.min, Vec2::new(-5., -1.));
        assert_eq!(r.max, Vec2::new(10., 20.));
    }

    #[test]
    fn rect_transform_is_bounding_box_of_corners() {
        let r = Rect::from_numbers(0., 0., 2., 2.);
        // 45° rotation-like shear via a generic matrix
        let m = Mat3::pdf(1., 1., -1., 1., 0., 0.);
        let t = r.transform(m);
        assert!(t.min.x <= 0. && t.max.x >= 0.);
    }

    #[test]
    fn invert_round_trips() {
        let m = Mat3::pdf(2., 0.5, -1., 3., 5., -2.);
        let inv = m.invert().unwrap();
        let p = Vec2::new(7., -3.);
        let round_tripped = (m * inv).transform_point(p);
        assert!((round_tripped.x - p.x).abs() < 1e-9);
        assert!((round_tripped.y - p.y).abs() < 1e-9);
    }
}
