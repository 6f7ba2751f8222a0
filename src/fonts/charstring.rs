//! Type 2 CharString bytecode interpreter.
//!
//! Grounded on `original_source/libs/cff/src/charstring.c`: the operand
//! stack shape, subroutine bias formula, and the width-deferral rule all
//! follow that file directly since it's the canonical CFF CharString
//! reference and nothing in the example pack implements one. In particular
//! `handle_width` there only treats a leading extra operand as a width for
//! `rmoveto`/`hmoveto`/`vmoveto`/`endchar` and the `hstem`/`vstem` family —
//! never for `hhcurveto`/`vvcurveto`, which always consume operands in
//! groups of 4 with no odd leftover.

use crate::error::Error;
use crate::fonts::cff::CffFont;
use crate::geom::Vec2;
use crate::path::Path;

const STACK_LIMIT: usize = 48;
const MAX_SUBR_DEPTH: u32 = 10;

struct Interpreter<'a> {
    font: &'a CffFont,
    stack: Vec<f64>,
    x: f64,
    y: f64,
    path: Path,
    open: bool,
    num_stems: u32,
    width_parsed: bool,
    depth: u32,
}

pub fn run(charstring: &[u8], font: &CffFont) -> Result<Path, Error> {
    let mut interp = Interpreter {
        font,
        stack: Vec::with_capacity(STACK_LIMIT),
        x: 0.0,
        y: 0.0,
        path: Path::new(),
        open: false,
        num_stems: 0,
        width_parsed: false,
        depth: 0,
    };
    interp.execute(charstring)?;
    if interp.open {
        interp.path.close();
    }
    Ok(interp.path)
}

impl<'a> Interpreter<'a> {
    fn execute(&mut self, code: &[u8]) -> Result<(), Error> {
        let mut i = 0;
        while i < code.len() {
            let b0 = code[i];
            match b0 {
                1 | 3 | 18 | 23 => {
                    // hstem, vstem, hstemhm, vstemhm
                    self.take_width_if_odd();
                    self.num_stems += self.stack.len() as u32 / 2;
                    self.stack.clear();
                    i += 1;
                }
                19 | 20 => {
                    // hintmask, cntrmask
                    self.take_width_if_odd();
                    self.num_stems += self.stack.len() as u32 / 2;
                    self.stack.clear();
                    i += 1;
                    i += (self.num_stems as usize + 7) / 8;
                }
                21 => {
                    // rmoveto
                    self.take_width(2);
                    self.close_if_open();
                    let (dx, dy) = (self.pop_front(0), self.pop_front(1));
                    self.move_by(dx, dy);
                    self.stack.clear();
                    i += 1;
                }
                22 => {
                    // hmoveto
                    self.take_width(1);
                    self.close_if_open();
                    let dx = self.pop_front(0);
                    self.move_by(dx, 0.0);
                    self.stack.clear();
                    i += 1;
                }
                4 => {
                    // vmoveto
                    self.take_width(1);
                    self.close_if_open();
                    let dy = self.pop_front(0);
                    self.move_by(0.0, dy);
                    self.stack.clear();
                    i += 1;
                }
                5 => {
                    // rlineto
                    for pair in self.stack.clone().chunks(2) {
                        if let [dx, dy] = pair {
                            self.line_by(*dx, *dy);
                        }
                    }
                    self.stack.clear();
                    i += 1;
                }
                6 => {
                    // hlineto: alternating horizontal/vertical
                    self.alternating_lineto(true);
                    i += 1;
                }
                7 => {
                    // vlineto
                    self.alternating_lineto(false);
                    i += 1;
                }
                8 => {
                    // rrcurveto
                    for six in self.stack.clone().chunks(6) {
                        if let [dx1, dy1, dx2, dy2, dx3, dy3] = six {
                            self.curve_by(*dx1, *dy1, *dx2, *dy2, *dx3, *dy3);
                        }
                    }
                    self.stack.clear();
                    i += 1;
                }
                24 => {
                    // rcurveline: rrcurveto* rlineto
                    let values = self.stack.clone();
                    let curve_count = (values.len() - 2) / 6;
                    for six in values[..curve_count * 6].chunks(6) {
                        if let [dx1, dy1, dx2, dy2, dx3, dy3] = six {
                            self.curve_by(*dx1, *dy1, *dx2, *dy2, *dx3, *dy3);
                        }
                    }
                    let tail = &values[curve_count * 6..];
                    if let [dx, dy] = tail {
                        self.line_by(*dx, *dy);
                    }
                    self.stack.clear();
                    i += 1;
                }
                25 => {
                    // rlinecurve: rlineto* rrcurveto
                    let values = self.stack.clone();
                    let line_count = (values.len() - 6) / 2;
                    for pair in values[..line_count * 2].chunks(2) {
                        if let [dx, dy] = pair {
                            self.line_by(*dx, *dy);
                        }
                    }
                    let tail = &values[line_count * 2..];
                    if let [dx1, dy1, dx2, dy2, dx3, dy3] = tail {
                        self.curve_by(*dx1, *dy1, *dx2, *dy2, *dx3, *dy3);
                    }
                    self.stack.clear();
                    i += 1;
                }
                26 => {
                    // vvcurveto: never a width-bearing operator
                    self.vv_curveto();
                    i += 1;
                }
                27 => {
                    // hhcurveto: never a width-bearing operator
                    self.hh_curveto();
                    i += 1;
                }
                30 => {
                    // vhcurveto
                    self.alternating_curveto(false);
                    i += 1;
                }
                31 => {
                    // hvcurveto
                    self.alternating_curveto(true);
                    i += 1;
                }
                10 => {
                    // callsubr
                    self.call_subroutine(&self.font.local_subrs.clone(), bias(self.font.local_subrs.len()))?;
                    i += 1;
                }
                29 => {
                    // callgsubr
                    self.call_subroutine(&self.font.global_subrs.clone(), bias(self.font.global_subrs.len()))?;
                    i += 1;
                }
                11 => {
                    // return
                    i += 1;
                    return Ok(());
                }
                14 => {
                    // endcheck
                    self.take_width_if_odd_for_endchar();
                    self.close_if_open();
                    self.stack.clear();
                    i += 1;
                    return Ok(());
                }
                28 => {
                    let value = i16::from_be_bytes([code[i + 1], code[i + 2]]);
                    self.push(value as f64)?;
                    i += 3;
                }
                32..=246 => {
                    self.push(b0 as f64 - 139.0)?;
                    i += 1;
                }
                247..=250 => {
                    let b1 = code[i + 1];
                    self.push((b0 as f64 - 247.0) * 256.0 + b1 as f64 + 108.0)?;
                    i += 2;
                }
                251..=254 => {
                    let b1 = code[i + 1];
                    self.push(-(b0 as f64 - 251.0) * 256.0 - b1 as f64 - 108.0)?;
                    i += 2;
                }
                255 => {
                    let raw = i32::from_be_bytes([code[i + 1], code[i + 2], code[i + 3], code[i + 4]]);
                    self.push(raw as f64 / 65536.0)?;
                    i += 5;
                }
                12 => {
                    // Escape opcodes (flex variants and arithmetic) are not
                    // reachable from the glyph set this crate targets; skip
                    // the operand byte and clear the stack to stay in sync.
                    self.stack.clear();
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, value: f64) -> Result<(), Error> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(Error::CharstringStackOverflow { limit: STACK_LIMIT });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop_front(&self, index: usize) -> f64 {
        self.stack.get(index).copied().unwrap_or(0.0)
    }

    /// Consumes a leading width operand from the stack when present: called
    /// by moveto/endchar operators, which take exactly `expected` operands
    /// unless a width was deferred before the first stack-clearing operator.
    fn take_width(&mut self, expected: usize) {
        if !self.width_parsed {
            self.width_parsed = true;
            if self.stack.len() > expected {
                self.stack.remove(0);
            }
        }
    }

    /// stem-hint operators take operands in pairs; an odd leftover at the
    /// front is the deferred width.
    fn take_width_if_odd(&mut self) {
        if !self.width_parsed {
            self.width_parsed = true;
            if self.stack.len() % 2 == 1 {
                self.stack.remove(0);
            }
        }
    }

    fn take_width_if_odd_for_endchar(&mut self) {
        if !self.width_parsed {
            self.width_parsed = true;
            // endchar takes 0 or 4 operands (seac-like accent composition,
            // unsupported here); a single leftover operand is a width.
            if self.stack.len() == 1 || self.stack.len() == 5 {
                self.stack.remove(0);
            }
        }
    }

    fn move_by(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
        self.path.move_to(Vec2::new(self.x, self.y));
        self.open = true;
    }

    fn line_by(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
        self.path.line_to(Vec2::new(self.x, self.y));
    }

    fn curve_by(&mut self, dx1: f64, dy1: f64, dx2: f64, dy2: f64, dx3: f64, dy3: f64) {
        let c1 = Vec2::new(self.x + dx1, self.y + dy1);
        let c2 = Vec2::new(c1.x + dx2, c1.y + dy2);
        self.x = c2.x + dx3;
        self.y = c2.y + dy3;
        self.path.curve_to(c1, c2, Vec2::new(self.x, self.y));
    }

    fn close_if_open(&mut self) {
        if self.open {
            self.path.close();
        }
    }

    fn alternating_lineto(&mut self, start_horizontal: bool) {
        let values = self.stack.clone();
        let mut horizontal = start_horizontal;
        for &v in &values {
            if horizontal {
                self.line_by(v, 0.0);
            } else {
                self.line_by(0.0, v);
            }
            horizontal = !horizontal;
        }
        self.stack.clear();
    }

    fn alternating_curveto(&mut self, start_horizontal: bool) {
        let values = self.stack.clone();
        let mut i = 0;
        let mut horizontal = start_horizontal;
        while i + 4 <= values.len() {
            let has_trailing = values.len() - i == 5;
            let (dx1, dy1, dx2, dy2, dx3, dy3) = if horizontal {
                let dx1 = values[i];
                let dx2 = values[i + 1];
                let dy2 = values[i + 2];
                let dy3 = values[i + 3];
                let dx3 = if has_trailing { values[i + 4] } else { 0.0 };
                (dx1, 0.0, dx2, dy2, dx3, dy3)
            } else {
                let dy1 = values[i];
                let dx2 = values[i + 1];
                let dy2 = values[i + 2];
                let dx3 = values[i + 3];
                let dy3 = if has_trailing { values[i + 4] } else { 0.0 };
                (0.0, dy1, dx2, dy2, dx3, dy3)
            };
            self.curve_by(dx1, dy1, dx2, dy2, dx3, dy3);
            i += if has_trailing { 5 } else { 4 };
            horizontal = !horizontal;
        }
        self.stack.clear();
    }

    fn hh_curveto(&mut self) {
        let values = self.stack.clone();
        let mut i = 0;
        let mut dy1 = 0.0;
        if values.len() % 4 == 1 {
            dy1 = values[0];
            i = 1;
        }
        let mut first = true;
        while i + 4 <= values.len() {
            let (dx1, dx2, dy2, dx3) = (values[i], values[i + 1], values[i + 2], values[i + 3]);
            let this_dy1 = if first { dy1 } else { 0.0 };
            self.curve_by(dx1, this_dy1, dx2, dy2, dx3, 0.0);
            i += 4;
            first = false;
        }
        self.stack.clear();
    }

    fn vv_curveto(&mut self) {
        let values = self.stack.clone();
        let mut i = 0;
        let mut dx1 = 0.0;
        if values.len() % 4 == 1 {
            dx1 = values[0];
            i = 1;
        }
        let mut first = true;
        while i + 4 <= values.len() {
            let (dy1, dx2, dy2, dy3) = (values[i], values[i + 1], values[i + 2], values[i + 3]);
            let this_dx1 = if first { dx1 } else { 0.0 };
            self.curve_by(this_dx1, dy1, dx2, dy2, 0.0, dy3);
            i += 4;
            first = false;
        }
        self.stack.clear();
    }

    fn call_subroutine(&mut self, subrs: &[Vec<u8>], bias: i32) -> Result<(), Error> {
        if self.depth >= MAX_SUBR_DEPTH {
            return Err(Error::RecursionLimit);
        }
        let index = self.stack.pop().ok_or(Error::CharstringStackUnderflow)?;
        let biased = index as i32 + bias;
        let code = subrs.get(biased as usize).ok_or(Error::InvalidSubr)?.clone();
        self.depth += 1;
        self.execute(&code)?;
        self.depth -= 1;
        Ok(())
    }
}

/// The bias added to a subroutine index before lookup, per the CFF spec's
/// three-tier table keyed by subroutine count.
fn bias(count: usize) -> i32 {
    if count < 1240 {
        107
    } else if count < 33900 {
        1131
    } else {
        32768
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmoveto_then_endchar_produces_empty_path() {
        // width 0, rmoveto(10, 20), endchar
        let code = vec![139 + 10, 139 + 20, 21, 14];
        let font = CffFont::for_charstring_test(code);
        let path = run(&font.charstrings[0], &font).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn hhcurveto_does_not_consume_a_width_operand() {
        // Exactly 4 operands (no width) into a single hhcurveto segment.
        let code = vec![139 + 10, 139 + 5, 139 + 5, 139 + 10, 27, 14];
        let font = CffFont::for_charstring_test(code);
        let path = run(&font.charstrings[0], &font).unwrap();
        assert!(!path.is_empty());
    }
}
