//! Offscreen rasterization into plain RGBA buffers. All geometry arrives in
//! CSS pixels and is multiplied by the device pixel ratio exactly once, at
//! draw time, so panels drawn at different ratios stay aligned.

use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};

use crate::layout::{DendrogramLayout, Orientation};

pub const STROKE: (u8, u8, u8) = (0, 0, 0);
/// ColorBrewer Set1 red, used for highlighted clusters.
pub const ACCENT: (u8, u8, u8) = (228, 26, 28);

/// ColorBrewer RdBu endpoints for the continuous diverging palette.
pub const DIVERGING_LOW: (u8, u8, u8) = (33, 102, 172);
pub const DIVERGING_MID: (u8, u8, u8) = (247, 247, 247);
pub const DIVERGING_HIGH: (u8, u8, u8) = (178, 24, 43);

/// ColorBrewer Spectral 11-class palette, low to high.
pub const SPECTRAL_11: [(u8, u8, u8); 11] = [
    (94, 79, 162),
    (50, 136, 189),
    (102, 194, 165),
    (171, 221, 164),
    (230, 245, 152),
    (255, 255, 191),
    (254, 224, 139),
    (253, 174, 97),
    (244, 109, 67),
    (213, 62, 79),
    (158, 1, 66),
];

/// An RGBA pixel buffer, white on creation. Writes outside the buffer are
/// clipped, never wrapped onto the next row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Pixmap {
    pub fn new(width: u32, height: u32) -> Pixmap {
        Pixmap {
            width,
            height,
            data: vec![255u8; width as usize * height as usize * 4],
        }
    }

    pub fn set(&mut self, x: u32, y: u32, r: u8, g: u8, b: u8) {
        if x < self.width && y < self.height {
            let idx = (y as usize * self.width as usize + x as usize) * 4;
            self.data[idx] = r;
            self.data[idx + 1] = g;
            self.data[idx + 2] = b;
            self.data[idx + 3] = 255;
        }
    }

    pub fn get(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        (self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }

    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, r: u8, g: u8, b: u8) {
        let x1 = (x + w).min(self.width);
        let y1 = (y + h).min(self.height);
        for py in y..y1 {
            for px in x..x1 {
                self.set(px, py, r, g, b);
            }
        }
    }

    /// Copy `src` into this buffer with its top-left corner at `(dst_x, dst_y)`,
    /// clipping whatever falls outside.
    pub fn blit(&mut self, src: &Pixmap, dst_x: u32, dst_y: u32) {
        if dst_x >= self.width {
            return;
        }
        let cols = src.width.min(self.width - dst_x) as usize;
        for sy in 0..src.height {
            let dy = dst_y + sy;
            if dy >= self.height {
                break;
            }
            let src_start = sy as usize * src.width as usize * 4;
            let dst_start = (dy as usize * self.width as usize + dst_x as usize) * 4;
            self.data[dst_start..dst_start + cols * 4]
                .copy_from_slice(&src.data[src_start..src_start + cols * 4]);
        }
    }
}

/// CSS pixels to device pixels.
pub fn dev(css: f64, dpr: f64) -> u32 {
    (css * dpr).round().max(0.0) as u32
}

/// Rasterize one axis dendrogram. Highlighted polylines draw last so the
/// accent stays visible where strokes cross.
pub fn draw_dendrogram(
    layout: &DendrogramLayout,
    orientation: Orientation,
    highlight: &FxHashSet<u32>,
    dpr: f64,
) -> Pixmap {
    let span_u = layout.step_size * layout.leaf_count as f64;
    let (w_css, h_css) = orientation.to_panel(span_u, layout.axis_height);
    let mut pix = Pixmap::new(dev(w_css, dpr).max(1), dev(h_css, dpr).max(1));
    let thickness = (dpr.round() as u32).max(1);

    for poly in &layout.polylines {
        if highlight.contains(&poly.cluster_id) {
            continue;
        }
        for (ua, va, ub, vb) in poly.segments() {
            let (xa, ya) = orientation.to_panel(ua, va);
            let (xb, yb) = orientation.to_panel(ub, vb);
            stroke_segment(&mut pix, xa, ya, xb, yb, dpr, thickness, STROKE.0, STROKE.1, STROKE.2);
        }
    }
    for &id in highlight.iter() {
        if let Some(cluster) = layout.clusters.get(&id) {
            for (ua, va, ub, vb) in cluster.segment.segments() {
                let (xa, ya) = orientation.to_panel(ua, va);
                let (xb, yb) = orientation.to_panel(ub, vb);
                stroke_segment(&mut pix, xa, ya, xb, yb, dpr, thickness, ACCENT.0, ACCENT.1, ACCENT.2);
            }
        }
    }
    pix
}

/// Fill an axis-aligned segment as a rectangle `thickness` device pixels
/// wide, rounding each endpoint independently.
fn stroke_segment(
    pix: &mut Pixmap,
    xa: f64,
    ya: f64,
    xb: f64,
    yb: f64,
    dpr: f64,
    thickness: u32,
    r: u8,
    g: u8,
    b: u8,
) {
    let x0 = dev(xa.min(xb), dpr);
    let x1 = dev(xa.max(xb), dpr);
    let y0 = dev(ya.min(yb), dpr);
    let y1 = dev(ya.max(yb), dpr);
    pix.fill_rect(x0, y0, x1 - x0 + thickness, y1 - y0 + thickness, r, g, b);
}

/// Which palette colors the matrix cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    Diverging,
    Spectral,
}

/// Value-to-color mapping for the heatmap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueScale {
    pub lo: f64,
    pub hi: f64,
    pub palette: Palette,
}

impl ValueScale {
    /// Derive the scale from the data: the observed min..max, or symmetric
    /// around zero so equal magnitudes get equal saturation (the natural
    /// choice once rows are z-scored).
    pub fn from_values(values: &[Vec<f64>], palette: Palette, symmetric: bool) -> ValueScale {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for row in values {
            for &v in row {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        if !lo.is_finite() || !hi.is_finite() {
            lo = 0.0;
            hi = 0.0;
        }
        if symmetric {
            let m = lo.abs().max(hi.abs());
            lo = -m;
            hi = m;
        }
        ValueScale { lo, hi, palette }
    }

    pub fn color(&self, v: f64) -> (u8, u8, u8) {
        let t = if self.hi > self.lo {
            ((v - self.lo) / (self.hi - self.lo)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        match self.palette {
            Palette::Diverging => {
                if t < 0.5 {
                    lerp_rgb(DIVERGING_LOW, DIVERGING_MID, t * 2.0)
                } else {
                    lerp_rgb(DIVERGING_MID, DIVERGING_HIGH, (t - 0.5) * 2.0)
                }
            }
            Palette::Spectral => {
                let bin = ((t * SPECTRAL_11.len() as f64) as usize).min(SPECTRAL_11.len() - 1);
                SPECTRAL_11[bin]
            }
        }
    }
}

fn lerp_rgb(a: (u8, u8, u8), b: (u8, u8, u8), t: f64) -> (u8, u8, u8) {
    let ch = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    (ch(a.0, b.0), ch(a.1, b.1), ch(a.2, b.2))
}

/// Rasterize the value matrix. Cell edges are device-rounded per slot so
/// rounding never accumulates across the panel.
pub fn draw_heatmap(
    row_order: &[usize],
    col_order: &[usize],
    values: &[Vec<f64>],
    scale: &ValueScale,
    cell: f64,
    dpr: f64,
) -> Pixmap {
    let w = dev(cell * col_order.len() as f64, dpr).max(1);
    let h = dev(cell * row_order.len() as f64, dpr).max(1);
    let mut pix = Pixmap::new(w, h);
    for (row_slot, &row_input) in row_order.iter().enumerate() {
        let y0 = dev(row_slot as f64 * cell, dpr);
        let y1 = dev((row_slot + 1) as f64 * cell, dpr);
        for (col_slot, &col_input) in col_order.iter().enumerate() {
            let x0 = dev(col_slot as f64 * cell, dpr);
            let x1 = dev((col_slot + 1) as f64 * cell, dpr);
            let (r, g, b) = scale.color(values[row_input][col_input]);
            pix.fill_rect(x0, y0, x1 - x0, y1 - y0, r, g, b);
        }
    }
    pix
}

// 5x8 bitmap font, printable ASCII 32..=126. One byte per glyph row, the
// high five bits carry the pixels.
const GLYPHS_5X8: [[u8; 8]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x20, 0x20, 0x20, 0x20, 0x20, 0x00, 0x20, 0x00], // '!'
    [0x50, 0x50, 0x50, 0x00, 0x00, 0x00, 0x00, 0x00], // '"'
    [0x50, 0x50, 0xF8, 0x50, 0xF8, 0x50, 0x50, 0x00], // '#'
    [0x20, 0x78, 0xA0, 0x70, 0x28, 0xF0, 0x20, 0x00], // '$'
    [0xC0, 0xC8, 0x10, 0x20, 0x40, 0x98, 0x18, 0x00], // '%'
    [0x40, 0xA0, 0xA0, 0x40, 0xA8, 0x90, 0x68, 0x00], // '&'
    [0x20, 0x20, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00], // '\''
    [0x10, 0x20, 0x40, 0x40, 0x40, 0x20, 0x10, 0x00], // '('
    [0x40, 0x20, 0x10, 0x10, 0x10, 0x20, 0x40, 0x00], // ')'
    [0x00, 0x20, 0xA8, 0x70, 0xA8, 0x20, 0x00, 0x00], // '*'
    [0x00, 0x20, 0x20, 0xF8, 0x20, 0x20, 0x00, 0x00], // '+'
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x20, 0x40], // ','
    [0x00, 0x00, 0x00, 0xF8, 0x00, 0x00, 0x00, 0x00], // '-'
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x20, 0x00], // '.'
    [0x00, 0x08, 0x10, 0x20, 0x40, 0x80, 0x00, 0x00], // '/'
    [0x70, 0x88, 0x98, 0xA8, 0xC8, 0x88, 0x70, 0x00], // '0'
    [0x20, 0x60, 0x20, 0x20, 0x20, 0x20, 0x70, 0x00], // '1'
    [0x70, 0x88, 0x08, 0x30, 0x40, 0x80, 0xF8, 0x00], // '2'
    [0xF8, 0x10, 0x20, 0x10, 0x08, 0x88, 0x70, 0x00], // '3'
    [0x10, 0x30, 0x50, 0x90, 0xF8, 0x10, 0x10, 0x00], // '4'
    [0xF8, 0x80, 0xF0, 0x08, 0x08, 0x88, 0x70, 0x00], // '5'
    [0x30, 0x40, 0x80, 0xF0, 0x88, 0x88, 0x70, 0x00], // '6'
    [0xF8, 0x08, 0x10, 0x20, 0x40, 0x40, 0x40, 0x00], // '7'
    [0x70, 0x88, 0x88, 0x70, 0x88, 0x88, 0x70, 0x00], // '8'
    [0x70, 0x88, 0x88, 0x78, 0x08, 0x10, 0x60, 0x00], // '9'
    [0x00, 0x00, 0x20, 0x00, 0x00, 0x20, 0x00, 0x00], // ':'
    [0x00, 0x00, 0x20, 0x00, 0x00, 0x20, 0x20, 0x40], // ';'
    [0x08, 0x10, 0x20, 0x40, 0x20, 0x10, 0x08, 0x00], // '<'
    [0x00, 0x00, 0xF8, 0x00, 0xF8, 0x00, 0x00, 0x00], // '='
    [0x80, 0x40, 0x20, 0x10, 0x20, 0x40, 0x80, 0x00], // '>'
    [0x70, 0x88, 0x08, 0x10, 0x20, 0x00, 0x20, 0x00], // '?'
    [0x70, 0x88, 0xB8, 0xA8, 0xB8, 0x80, 0x70, 0x00], // '@'
    [0x70, 0x88, 0x88, 0xF8, 0x88, 0x88, 0x88, 0x00], // 'A'
    [0xF0, 0x88, 0x88, 0xF0, 0x88, 0x88, 0xF0, 0x00], // 'B'
    [0x70, 0x88, 0x80, 0x80, 0x80, 0x88, 0x70, 0x00], // 'C'
    [0xE0, 0x90, 0x88, 0x88, 0x88, 0x90, 0xE0, 0x00], // 'D'
    [0xF8, 0x80, 0x80, 0xF0, 0x80, 0x80, 0xF8, 0x00], // 'E'
    [0xF8, 0x80, 0x80, 0xF0, 0x80, 0x80, 0x80, 0x00], // 'F'
    [0x70, 0x88, 0x80, 0xB8, 0x88, 0x88, 0x70, 0x00], // 'G'
    [0x88, 0x88, 0x88, 0xF8, 0x88, 0x88, 0x88, 0x00], // 'H'
    [0x70, 0x20, 0x20, 0x20, 0x20, 0x20, 0x70, 0x00], // 'I'
    [0x38, 0x10, 0x10, 0x10, 0x10, 0x90, 0x60, 0x00], // 'J'
    [0x88, 0x90, 0xA0, 0xC0, 0xA0, 0x90, 0x88, 0x00], // 'K'
    [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0xF8, 0x00], // 'L'
    [0x88, 0xD8, 0xA8, 0xA8, 0x88, 0x88, 0x88, 0x00], // 'M'
    [0x88, 0xC8, 0xA8, 0x98, 0x88, 0x88, 0x88, 0x00], // 'N'
    [0x70, 0x88, 0x88, 0x88, 0x88, 0x88, 0x70, 0x00], // 'O'
    [0xF0, 0x88, 0x88, 0xF0, 0x80, 0x80, 0x80, 0x00], // 'P'
    [0x70, 0x88, 0x88, 0x88, 0xA8, 0x90, 0x68, 0x00], // 'Q'
    [0xF0, 0x88, 0x88, 0xF0, 0xA0, 0x90, 0x88, 0x00], // 'R'
    [0x70, 0x88, 0x80, 0x70, 0x08, 0x88, 0x70, 0x00], // 'S'
    [0xF8, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x00], // 'T'
    [0x88, 0x88, 0x88, 0x88, 0x88, 0x88, 0x70, 0x00], // 'U'
    [0x88, 0x88, 0x88, 0x88, 0x88, 0x50, 0x20, 0x00], // 'V'
    [0x88, 0x88, 0x88, 0xA8, 0xA8, 0xD8, 0x88, 0x00], // 'W'
    [0x88, 0x88, 0x50, 0x20, 0x50, 0x88, 0x88, 0x00], // 'X'
    [0x88, 0x88, 0x50, 0x20, 0x20, 0x20, 0x20, 0x00], // 'Y'
    [0xF8, 0x08, 0x10, 0x20, 0x40, 0x80, 0xF8, 0x00], // 'Z'
    [0x70, 0x40, 0x40, 0x40, 0x40, 0x40, 0x70, 0x00], // '['
    [0x00, 0x80, 0x40, 0x20, 0x10, 0x08, 0x00, 0x00], // '\\'
    [0x70, 0x10, 0x10, 0x10, 0x10, 0x10, 0x70, 0x00], // ']'
    [0x20, 0x50, 0x88, 0x00, 0x00, 0x00, 0x00, 0x00], // '^'
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF8, 0x00], // '_'
    [0x40, 0x20, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00], // '`'
    [0x00, 0x00, 0x70, 0x08, 0x78, 0x88, 0x78, 0x00], // 'a'
    [0x80, 0x80, 0xB0, 0xC8, 0x88, 0x88, 0xF0, 0x00], // 'b'
    [0x00, 0x00, 0x70, 0x80, 0x80, 0x88, 0x70, 0x00], // 'c'
    [0x08, 0x08, 0x68, 0x98, 0x88, 0x88, 0x78, 0x00], // 'd'
    [0x00, 0x00, 0x70, 0x88, 0xF8, 0x80, 0x70, 0x00], // 'e'
    [0x30, 0x48, 0x40, 0xE0, 0x40, 0x40, 0x40, 0x00], // 'f'
    [0x00, 0x00, 0x78, 0x88, 0x78, 0x08, 0x70, 0x00], // 'g'
    [0x80, 0x80, 0xB0, 0xC8, 0x88, 0x88, 0x88, 0x00], // 'h'
    [0x20, 0x00, 0x60, 0x20, 0x20, 0x20, 0x70, 0x00], // 'i'
    [0x10, 0x00, 0x30, 0x10, 0x10, 0x90, 0x60, 0x00], // 'j'
    [0x80, 0x80, 0x90, 0xA0, 0xC0, 0xA0, 0x90, 0x00], // 'k'
    [0x60, 0x20, 0x20, 0x20, 0x20, 0x20, 0x70, 0x00], // 'l'
    [0x00, 0x00, 0xD0, 0xA8, 0xA8, 0xA8, 0xA8, 0x00], // 'm'
    [0x00, 0x00, 0xB0, 0xC8, 0x88, 0x88, 0x88, 0x00], // 'n'
    [0x00, 0x00, 0x70, 0x88, 0x88, 0x88, 0x70, 0x00], // 'o'
    [0x00, 0x00, 0xF0, 0x88, 0xF0, 0x80, 0x80, 0x00], // 'p'
    [0x00, 0x00, 0x78, 0x88, 0x78, 0x08, 0x08, 0x00], // 'q'
    [0x00, 0x00, 0xB0, 0xC8, 0x80, 0x80, 0x80, 0x00], // 'r'
    [0x00, 0x00, 0x70, 0x80, 0x70, 0x08, 0xF0, 0x00], // 's'
    [0x40, 0x40, 0xE0, 0x40, 0x40, 0x48, 0x30, 0x00], // 't'
    [0x00, 0x00, 0x88, 0x88, 0x88, 0x98, 0x68, 0x00], // 'u'
    [0x00, 0x00, 0x88, 0x88, 0x88, 0x50, 0x20, 0x00], // 'v'
    [0x00, 0x00, 0x88, 0x88, 0xA8, 0xA8, 0x50, 0x00], // 'w'
    [0x00, 0x00, 0x88, 0x50, 0x20, 0x50, 0x88, 0x00], // 'x'
    [0x00, 0x00, 0x88, 0x88, 0x78, 0x08, 0x70, 0x00], // 'y'
    [0x00, 0x00, 0xF8, 0x10, 0x20, 0x40, 0xF8, 0x00], // 'z'
    [0x10, 0x20, 0x20, 0x40, 0x20, 0x20, 0x10, 0x00], // '{'
    [0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x00], // '|'
    [0x40, 0x20, 0x20, 0x10, 0x20, 0x20, 0x40, 0x00], // '}'
    [0x00, 0x00, 0x40, 0xA8, 0x10, 0x00, 0x00, 0x00], // '~'
];

/// Truncation marker drawn in place of the last character of a long label.
const ELLIPSIS: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xA8, 0x00];

fn glyph(c: char) -> &'static [u8; 8] {
    let b = c as usize;
    if (32..127).contains(&b) {
        &GLYPHS_5X8[b - 32]
    } else {
        &GLYPHS_5X8[(b'?' - 32) as usize]
    }
}

/// Glyph cell size in device pixels for a given row/column thickness:
/// a multiple of 8 so the bitmap scales without remainder.
pub fn char_size_for(cell_dev: u32) -> u32 {
    ((cell_dev / 8) * 8).min(64).max(8)
}

fn write_char(pix: &mut Pixmap, base_x: u32, base_y: u32, data: &[u8; 8], char_size: u32, r: u8, g: u8, b: u8) {
    let ratio = char_size / 8;
    for j in 0..8u32 {
        let row = data[j as usize];
        for k in 0..8u32 {
            if (row >> (7 - k)) & 1 == 1 {
                pix.fill_rect(base_x + k * ratio, base_y + j * ratio, ratio, ratio, r, g, b);
            }
        }
    }
}

/// Same glyph rotated a quarter turn clockwise, for column labels.
fn write_char_rot90(pix: &mut Pixmap, base_x: u32, base_y: u32, data: &[u8; 8], char_size: u32, r: u8, g: u8, b: u8) {
    let ratio = char_size / 8;
    for j in 0..8u32 {
        let row = data[j as usize];
        for k in 0..8u32 {
            if (row >> (7 - k)) & 1 == 1 {
                pix.fill_rect(base_x + (7 - j) * ratio, base_y + k * ratio, ratio, ratio, r, g, b);
            }
        }
    }
}

/// Stable label color from a SHA256 digest, normalized and brightened.
pub fn label_color(name: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();

    let mut r = digest[24] as f32 / 255.0;
    let mut g = digest[8] as f32 / 255.0;
    let mut b = digest[16] as f32 / 255.0;

    let sum = r + g + b;
    if sum > 0.0 {
        r /= sum;
        g /= sum;
        b /= sum;
    }

    let max_component = r.max(g).max(b);
    let f = if max_component > 0.0 { 1.5f32.min(1.0 / max_component) } else { 1.0 };

    (
        (255.0 * (r * f).min(1.0)).round() as u8,
        (255.0 * (g * f).min(1.0)).round() as u8,
        (255.0 * (b * f).min(1.0)).round() as u8,
    )
}

fn truncated(name: &str, max_chars: usize) -> (usize, bool) {
    let len = name.chars().count();
    let shown = len.min(max_chars);
    (shown, len > shown)
}

/// Draw row labels, one per display slot top to bottom, left aligned next to
/// the matrix. Long labels end in a trailing-dots marker.
pub fn draw_row_labels(
    labels: &[&str],
    cell: f64,
    dpr: f64,
    max_chars: usize,
    color_background: bool,
) -> Pixmap {
    let cell_dev = dev(cell, dpr).max(1);
    let char_size = char_size_for(cell_dev);
    let width = max_chars as u32 * char_size + char_size / 2;
    let height = dev(cell * labels.len() as f64, dpr).max(1);
    let mut pix = Pixmap::new(width.max(1), height);

    for (slot, name) in labels.iter().enumerate() {
        let y0 = dev(slot as f64 * cell, dpr);
        let y1 = dev((slot + 1) as f64 * cell, dpr);
        if color_background {
            let (r, g, b) = label_color(name);
            pix.fill_rect(0, y0, width, y1 - y0, r, g, b);
        }
        let base_y = y0 + (y1 - y0).saturating_sub(char_size) / 2;
        let (shown, cut) = truncated(name, max_chars);
        for (i, c) in name.chars().take(shown).enumerate() {
            // +3 nudge keeps the first column off the panel seam
            let base_x = i as u32 * char_size + 3;
            let data = if cut && i == shown - 1 { &ELLIPSIS } else { glyph(c) };
            write_char(&mut pix, base_x, base_y, data, char_size, 0, 0, 0);
        }
    }
    pix
}

/// Draw column labels reading downward, one per display slot left to right.
pub fn draw_col_labels(
    labels: &[&str],
    cell: f64,
    dpr: f64,
    max_chars: usize,
    color_background: bool,
) -> Pixmap {
    let cell_dev = dev(cell, dpr).max(1);
    let char_size = char_size_for(cell_dev);
    let width = dev(cell * labels.len() as f64, dpr).max(1);
    let height = max_chars as u32 * char_size + char_size / 2;
    let mut pix = Pixmap::new(width, height.max(1));

    for (slot, name) in labels.iter().enumerate() {
        let x0 = dev(slot as f64 * cell, dpr);
        let x1 = dev((slot + 1) as f64 * cell, dpr);
        if color_background {
            let (r, g, b) = label_color(name);
            pix.fill_rect(x0, 0, x1 - x0, height, r, g, b);
        }
        let base_x = x0 + (x1 - x0).saturating_sub(char_size) / 2;
        let (shown, cut) = truncated(name, max_chars);
        for (i, c) in name.chars().take(shown).enumerate() {
            let base_y = i as u32 * char_size + 3;
            let data = if cut && i == shown - 1 { &ELLIPSIS } else { glyph(c) };
            write_char_rot90(&mut pix, base_x, base_y, data, char_size, 0, 0, 0);
        }
    }
    pix
}
