//! Color model and lookup tables for raster synthesis.
//!
//! The two-color gradient walks HSV space between the configured background
//! and foreground, quantized into a table large enough that neighbouring
//! normalized values stay visually continuous.

use serde::{Deserialize, Serialize};

/// Entries in the two-color gradient table.
const LUT_SIZE: usize = 65_536;

/// RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::from_rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::from_rgb(1.0, 1.0, 1.0);

    pub const fn from_rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    /// Packed `0xAARRGGBB` with full alpha.
    pub fn to_argb(self) -> u32 {
        pack_argb(self.r, self.g, self.b)
    }
}

pub(crate) fn colors_equal(a: Color, b: Color) -> bool {
    const EPSILON: f32 = 1.0e-8;
    (a.r - b.r).abs() <= EPSILON && (a.g - b.g).abs() <= EPSILON && (a.b - b.b).abs() <= EPSILON
}

pub(crate) fn pack_argb(r: f32, g: f32, b: f32) -> u32 {
    let to_byte = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u32;
    0xFF00_0000 | (to_byte(r) << 16) | (to_byte(g) << 8) | to_byte(b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorScheme {
    /// High energy renders dark on a light background.
    Grayscale,
    /// High energy renders light on a dark background.
    GrayscaleReversed,
    /// Background-to-foreground gradient walked in HSV space.
    BiColor,
}

/// Unquantized gray level for a normalized value.
pub(crate) fn grayscale_level(value: f32, reversed: bool) -> f32 {
    let level = if reversed { value } else { 1.0 - value };
    level.clamp(0.0, 1.0)
}

pub(crate) fn grayscale_byte(value: f32, reversed: bool) -> u8 {
    (grayscale_level(value, reversed) * 255.0).round() as u8
}

pub(crate) fn grayscale_argb(value: f32, reversed: bool) -> u32 {
    let byte = grayscale_byte(value, reversed) as u32;
    0xFF00_0000 | (byte << 16) | (byte << 8) | byte
}

/// Table index for a normalized value, saturating at the ends.
pub(crate) fn lut_index(value: f32) -> usize {
    (value.clamp(0.0, 1.0) * (LUT_SIZE - 1) as f32).round() as usize
}

/// Precomputed gradient in both output layouts.
pub(crate) struct PaletteLut {
    pub packed: Vec<u32>,
    pub planar: Vec<[f32; 3]>,
}

/// Memoized gradient table, rebuilt only when an endpoint color changes.
pub(crate) struct PaletteCache {
    background: Color,
    foreground: Color,
    lut: Option<PaletteLut>,
}

impl PaletteCache {
    pub fn new() -> Self {
        Self {
            background: Color::WHITE,
            foreground: Color::BLACK,
            lut: None,
        }
    }

    pub fn lut(&mut self, background: Color, foreground: Color) -> &PaletteLut {
        if !colors_equal(self.background, background)
            || !colors_equal(self.foreground, foreground)
        {
            self.background = background;
            self.foreground = foreground;
            self.lut = None;
        }
        self.lut
            .get_or_insert_with(|| build_bicolor_lut(background, foreground))
    }
}

fn build_bicolor_lut(background: Color, foreground: Color) -> PaletteLut {
    let [bg_h, bg_s, bg_v] = rgb_to_hsv(background);
    let [fg_h, fg_s, fg_v] = rgb_to_hsv(foreground);

    // Hue travels the shorter arc of the color circle.
    let mut hue_delta = fg_h - bg_h;
    if hue_delta > 0.5 {
        hue_delta -= 1.0;
    } else if hue_delta < -0.5 {
        hue_delta += 1.0;
    }

    let max_index = (LUT_SIZE - 1) as f32;
    let mut packed = Vec::with_capacity(LUT_SIZE);
    let mut planar = Vec::with_capacity(LUT_SIZE);
    for i in 0..LUT_SIZE {
        let t = i as f32 / max_index;
        let color = hsv_to_rgb(
            bg_h + hue_delta * t,
            bg_s + (fg_s - bg_s) * t,
            bg_v + (fg_v - bg_v) * t,
        );
        packed.push(color.to_argb());
        planar.push([color.r, color.g, color.b]);
    }
    PaletteLut { packed, planar }
}

/// Hue, saturation, and value, all in `[0, 1]`.
fn rgb_to_hsv(color: Color) -> [f32; 3] {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    [hue, saturation, max]
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Color {
    let hue = hue.rem_euclid(1.0) * 6.0;
    let sector = (hue.floor() as i32).rem_euclid(6);
    let fraction = hue - hue.floor();
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * fraction);
    let t = value * (1.0 - saturation * (1.0 - fraction));
    let (r, g, b) = match sector {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };
    Color { r, g, b }
}
