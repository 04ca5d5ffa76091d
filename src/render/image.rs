//! Raster synthesis: maps a frequency matrix onto a pixel grid, normalizes
//! against the active value range, and applies the configured color mapping.
//!
//! Both axes scale independently. An axis shrinks by averaging the source
//! cells that overlap each pixel, grows by linear interpolation between
//! source boundaries, and copies directly when the counts match. Averaging
//! and interpolation are linear, so running the frequency axis before the
//! time axis is exact, not an approximation.

use crate::dsp::FrequencyMatrix;
use crate::render::palette::{self, ColorScheme, PaletteCache};
use crate::settings::{ContrastMode, SpectrogramSettings};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

/// Values at or below this floor are ignored by adaptive range scans.
const ADAPTIVE_EPSILON: f64 = 1.0e-14;
/// Minimum overlap, in source-cell units, for a boundary cell to contribute
/// to a decimated pixel.
const OVERLAP_THRESHOLD: f64 = 0.4;

/// Memory layout of the synthesized pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// One packed `0xAARRGGBB` integer per pixel.
    Packed,
    /// Separate red/green/blue float planes.
    Planar,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PixelStorage {
    Packed(Vec<u32>),
    Planar {
        red: Vec<f32>,
        green: Vec<f32>,
        blue: Vec<f32>,
    },
}

impl PixelStorage {
    pub fn packed(&self) -> Option<&[u32]> {
        match self {
            PixelStorage::Packed(pixels) => Some(pixels),
            PixelStorage::Planar { .. } => None,
        }
    }

    /// Packed pixels reinterpreted as raw bytes in native byte order.
    pub fn packed_bytes(&self) -> Option<&[u8]> {
        self.packed().map(bytemuck::cast_slice)
    }

    pub fn planes(&self) -> Option<(&[f32], &[f32], &[f32])> {
        match self {
            PixelStorage::Planar { red, green, blue } => Some((red, green, blue)),
            PixelStorage::Packed(_) => None,
        }
    }
}

/// Finished raster: normalized values plus the color-mapped pixels. Row 0 is
/// the top of the image; the lowest selected frequency bin sits on the
/// bottom row.
#[derive(Debug, Clone)]
pub struct SpectrogramImage {
    width: usize,
    height: usize,
    values: Vec<f32>,
    pixels: PixelStorage,
}

impl SpectrogramImage {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Normalized `[0, 1]` value at column `x`, row `y`.
    pub fn value(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    /// Row-major normalized values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn pixels(&self) -> &PixelStorage {
        &self.pixels
    }
}

/// Stateful raster stage; owns the memoized gradient table so repeated
/// renders with unchanged colors skip the LUT rebuild.
pub struct ImageRenderer {
    palette: PaletteCache,
}

impl Default for ImageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageRenderer {
    pub fn new() -> Self {
        Self {
            palette: PaletteCache::new(),
        }
    }

    /// Synthesize a `width`×`height` raster from the matrix under the given
    /// settings. An empty matrix (or a zero-area request) renders as the
    /// background extreme.
    pub fn render(
        &mut self,
        matrix: &FrequencyMatrix,
        width: usize,
        height: usize,
        settings: &SpectrogramSettings,
    ) -> SpectrogramImage {
        if width == 0 || height == 0 || matrix.is_empty() || matrix.bin_count() == 0 {
            let values = vec![0.0f32; width * height];
            let pixels = self.colorize(&values, settings);
            return SpectrogramImage {
                width,
                height,
                values,
                pixels,
            };
        }

        let (low_bin, high_bin) = selected_bins(matrix.bin_count(), settings);
        let bin_len = high_bin - low_bin + 1;

        let scaled = if matrix.column_count() == width && bin_len == height {
            copy_unscaled(matrix, low_bin, width, height)
        } else {
            scale_matrix(matrix, low_bin, high_bin, width, height)
        };

        let (range_min, range_max) = value_range(matrix, low_bin, high_bin, settings);
        let span = range_max - range_min;
        let inv_range = if span > 0.0 {
            1.0 / span
        } else {
            warn!(
                "[image] empty normalization range at {}, clamping to the low extreme",
                range_min
            );
            0.0
        };

        // Normalize and flip so bin `low_bin` lands on the bottom row.
        let mut values = vec![0.0f32; width * height];
        for row in 0..height {
            let source = &scaled[(height - 1 - row) * width..(height - row) * width];
            let target = &mut values[row * width..(row + 1) * width];
            for (out, &raw) in target.iter_mut().zip(source) {
                *out = ((raw - range_min) * inv_range).clamp(0.0, 1.0) as f32;
            }
        }

        let pixels = self.colorize(&values, settings);
        SpectrogramImage {
            width,
            height,
            values,
            pixels,
        }
    }

    fn colorize(&mut self, values: &[f32], settings: &SpectrogramSettings) -> PixelStorage {
        match settings.pixel_format() {
            PixelFormat::Packed => PixelStorage::Packed(self.packed_pixels(values, settings)),
            PixelFormat::Planar => self.planar_pixels(values, settings),
        }
    }

    fn packed_pixels(&mut self, values: &[f32], settings: &SpectrogramSettings) -> Vec<u32> {
        match settings.color_scheme() {
            ColorScheme::Grayscale => values
                .iter()
                .map(|&value| palette::grayscale_argb(value, false))
                .collect(),
            ColorScheme::GrayscaleReversed => values
                .iter()
                .map(|&value| palette::grayscale_argb(value, true))
                .collect(),
            ColorScheme::BiColor => {
                let lut = self
                    .palette
                    .lut(settings.background_color(), settings.foreground_color());
                values
                    .iter()
                    .map(|&value| lut.packed[palette::lut_index(value)])
                    .collect()
            }
        }
    }

    fn planar_pixels(&mut self, values: &[f32], settings: &SpectrogramSettings) -> PixelStorage {
        let mut red = Vec::with_capacity(values.len());
        let mut green = Vec::with_capacity(values.len());
        let mut blue = Vec::with_capacity(values.len());

        match settings.color_scheme() {
            ColorScheme::Grayscale | ColorScheme::GrayscaleReversed => {
                let reversed = settings.color_scheme() == ColorScheme::GrayscaleReversed;
                for &value in values {
                    let level = palette::grayscale_level(value, reversed);
                    red.push(level);
                    green.push(level);
                    blue.push(level);
                }
            }
            ColorScheme::BiColor => {
                let lut = self
                    .palette
                    .lut(settings.background_color(), settings.foreground_color());
                for &value in values {
                    let [r, g, b] = lut.planar[palette::lut_index(value)];
                    red.push(r);
                    green.push(g);
                    blue.push(b);
                }
            }
        }

        PixelStorage::Planar { red, green, blue }
    }
}

/// Inclusive bin range covering the configured display frequencies, clamped
/// to the matrix. The upper index rounds up so a partially covered bin is
/// still shown.
fn selected_bins(bin_count: usize, settings: &SpectrogramSettings) -> (usize, usize) {
    let bin_width = settings.possible_max_frequency() / bin_count as f64;
    if !(bin_width > 0.0) {
        return (0, bin_count - 1);
    }

    let last = (bin_count - 1) as f64;
    let low = (settings.min_display_frequency() / bin_width)
        .floor()
        .clamp(0.0, last) as usize;
    let high = (settings.max_display_frequency() / bin_width)
        .ceil()
        .clamp(0.0, last) as usize;
    (low, high.max(low))
}

/// Normalization endpoints. Fixed mode offsets the configured limits by the
/// adjustment percentages; adaptive mode scans the visible region of the raw
/// matrix and falls back to the fixed range when nothing rises above the
/// noise floor.
fn value_range(
    matrix: &FrequencyMatrix,
    low_bin: usize,
    high_bin: usize,
    settings: &SpectrogramSettings,
) -> (f64, f64) {
    let limit_span = settings.upper_limit() - settings.lower_limit();
    let fixed_min = settings.lower_limit() + limit_span * settings.lower_adjustment() / 100.0;
    let fixed_max = settings.upper_limit() + limit_span * settings.upper_adjustment() / 100.0;
    if settings.contrast_mode() == ContrastMode::Fixed {
        return (fixed_min, fixed_max);
    }

    let mut observed_min = f64::INFINITY;
    let mut observed_max = f64::NEG_INFINITY;
    for index in 0..matrix.column_count() {
        for &value in &matrix.column(index)[low_bin..=high_bin] {
            if value <= ADAPTIVE_EPSILON {
                continue;
            }
            observed_min = observed_min.min(value);
            observed_max = observed_max.max(value);
        }
    }

    if observed_min < observed_max {
        (observed_min, observed_max)
    } else {
        (fixed_min, fixed_max)
    }
}

/// Direct copy for the 1:1 case, still row-major with bin order preserved.
fn copy_unscaled(
    matrix: &FrequencyMatrix,
    low_bin: usize,
    width: usize,
    height: usize,
) -> Vec<f64> {
    let mut scaled = vec![0.0; width * height];
    for x in 0..width {
        let column = &matrix.column(x)[low_bin..low_bin + height];
        for (row, &value) in column.iter().enumerate() {
            scaled[row * width + x] = value;
        }
    }
    scaled
}

/// Scale the selected matrix region to `width`×`height`, frequency axis
/// first, then time, each axis choosing copy/average/interpolate on its own.
fn scale_matrix(
    matrix: &FrequencyMatrix,
    low_bin: usize,
    high_bin: usize,
    width: usize,
    height: usize,
) -> Vec<f64> {
    let time_len = matrix.column_count();

    let mut columns = Vec::with_capacity(time_len);
    for t in 0..time_len {
        let mut mapped = Vec::with_capacity(height);
        scale_axis(&matrix.column(t)[low_bin..=high_bin], height, &mut mapped);
        columns.push(mapped);
    }

    let mut scaled = vec![0.0; width * height];
    let mut series = Vec::with_capacity(time_len);
    let mut mapped = Vec::with_capacity(width);
    for row in 0..height {
        series.clear();
        series.extend(columns.iter().map(|column| column[row]));
        mapped.clear();
        scale_axis(&series, width, &mut mapped);
        scaled[row * width..(row + 1) * width].copy_from_slice(&mapped);
    }
    scaled
}

fn scale_axis(values: &[f64], out_len: usize, out: &mut Vec<f64>) {
    match out_len.cmp(&values.len()) {
        Ordering::Equal => out.extend_from_slice(values),
        Ordering::Less => decimate_axis(values, out_len, out),
        Ordering::Greater => interpolate_axis(values, out_len, out),
    }
}

/// Shrink an axis by unweighted averaging of the source cells overlapping
/// each pixel interval. Boundary cells whose overlap falls below the
/// threshold are dropped, except when they are the only contributor.
fn decimate_axis(values: &[f64], out_len: usize, out: &mut Vec<f64>) {
    let src_len = values.len();
    let ratio = src_len as f64 / out_len as f64;

    for index in 0..out_len {
        let start = index as f64 * ratio;
        let end = start + ratio;
        let mut first = start.floor() as usize;
        let mut last = (end.ceil() as usize).saturating_sub(1).min(src_len - 1);

        if first < last {
            let first_overlap = (first + 1) as f64 - start;
            if first_overlap < OVERLAP_THRESHOLD {
                first += 1;
            }
        }
        if last > first {
            let last_overlap = end.min(src_len as f64) - last as f64;
            if last_overlap < OVERLAP_THRESHOLD {
                last -= 1;
            }
        }

        let sum: f64 = values[first..=last].iter().sum();
        out.push(sum / (last - first + 1) as f64);
    }
}

/// Grow an axis by linear interpolation. Each source index owns the first
/// pixel of its segment; the last source value holds to the end of the axis.
fn interpolate_axis(values: &[f64], out_len: usize, out: &mut Vec<f64>) {
    let src_len = values.len();
    if src_len == 1 {
        out.extend(std::iter::repeat_n(values[0], out_len));
        return;
    }

    for source in 0..src_len {
        let run_start = (source * out_len).div_ceil(src_len);
        let run_end = ((source + 1) * out_len).div_ceil(src_len);
        if source + 1 < src_len {
            let step = (values[source + 1] - values[source]) / (run_end - run_start) as f64;
            for offset in 0..run_end - run_start {
                out.push(values[source] + step * offset as f64);
            }
        } else {
            out.extend(std::iter::repeat_n(values[source], run_end - run_start));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::palette::Color;
    use approx::assert_abs_diff_eq;

    fn fixed_settings(lower: f64, upper: f64) -> SpectrogramSettings {
        let mut settings = SpectrogramSettings::default();
        settings.set_value_limits(lower, upper);
        settings
    }

    fn single_row_matrix(values: &[f64]) -> FrequencyMatrix {
        FrequencyMatrix::from_columns(values.iter().map(|&v| vec![v]).collect())
    }

    #[test]
    fn unscaled_raster_flips_bins_vertically() {
        let columns: Vec<Vec<f64>> = (0..10)
            .map(|t| (0..8).map(|b| (t * 8 + b) as f64).collect())
            .collect();
        let matrix = FrequencyMatrix::from_columns(columns);
        let settings = fixed_settings(0.0, 100.0);

        let image = ImageRenderer::new().render(&matrix, 10, 8, &settings);
        assert_eq!(image.width(), 10);
        assert_eq!(image.height(), 8);
        for x in 0..10 {
            for y in 0..8 {
                let expected = (matrix.value(x, 7 - y) / 100.0) as f32;
                assert_abs_diff_eq!(image.value(x, y), expected, epsilon = 1.0e-6);
            }
        }
    }

    #[test]
    fn normalization_clamps_at_both_extremes() {
        let matrix = FrequencyMatrix::from_columns(vec![vec![-10.0, 50.0, 110.0]]);
        let settings = fixed_settings(0.0, 100.0);
        let image = ImageRenderer::new().render(&matrix, 1, 3, &settings);

        // Bottom row is the lowest bin.
        assert_eq!(image.value(0, 2), 0.0);
        assert_abs_diff_eq!(image.value(0, 1), 0.5, epsilon = 1.0e-6);
        assert_eq!(image.value(0, 0), 1.0);

        let packed = image.pixels().packed().unwrap();
        assert_eq!(packed[2], 0xFFFF_FFFF);
        assert_eq!(packed[1], 0xFF80_8080);
        assert_eq!(packed[0], 0xFF00_0000);
    }

    #[test]
    fn decimation_averages_whole_cells() {
        let matrix = single_row_matrix(&[0.0, 10.0, 20.0, 30.0]);
        let settings = fixed_settings(0.0, 100.0);
        let image = ImageRenderer::new().render(&matrix, 2, 1, &settings);
        assert_abs_diff_eq!(image.value(0, 0), 0.05, epsilon = 1.0e-6);
        assert_abs_diff_eq!(image.value(1, 0), 0.25, epsilon = 1.0e-6);
    }

    #[test]
    fn decimation_drops_slim_boundary_overlaps() {
        // Four cells onto three pixels: each pixel spans 4/3 cells, so the
        // cell hanging 1/3 over a pixel edge is below the 0.4 threshold.
        let matrix = single_row_matrix(&[0.0, 40.0, 80.0, 120.0]);
        let settings = fixed_settings(0.0, 200.0);
        let image = ImageRenderer::new().render(&matrix, 3, 1, &settings);
        assert_abs_diff_eq!(image.value(0, 0), 0.0, epsilon = 1.0e-6);
        assert_abs_diff_eq!(image.value(1, 0), 0.3, epsilon = 1.0e-6);
        assert_abs_diff_eq!(image.value(2, 0), 0.6, epsilon = 1.0e-6);
    }

    #[test]
    fn upscale_interpolates_between_sources() {
        let matrix = single_row_matrix(&[10.0, 30.0]);
        let settings = fixed_settings(0.0, 100.0);
        let image = ImageRenderer::new().render(&matrix, 4, 1, &settings);
        assert_abs_diff_eq!(image.value(0, 0), 0.1, epsilon = 1.0e-6);
        assert_abs_diff_eq!(image.value(1, 0), 0.2, epsilon = 1.0e-6);
        assert_abs_diff_eq!(image.value(2, 0), 0.3, epsilon = 1.0e-6);
        assert_abs_diff_eq!(image.value(3, 0), 0.3, epsilon = 1.0e-6);
    }

    #[test]
    fn mixed_axes_compose_frequency_then_time() {
        let matrix = FrequencyMatrix::from_columns(vec![
            vec![0.0, 20.0, 40.0, 60.0],
            vec![40.0, 60.0, 80.0, 100.0],
        ]);
        let settings = fixed_settings(0.0, 100.0);
        let image = ImageRenderer::new().render(&matrix, 4, 2, &settings);

        // Frequency pairs average to [10, 50] and [50, 90]; the time axis
        // then interpolates each row across four pixels.
        let bottom: Vec<f32> = (0..4).map(|x| image.value(x, 1)).collect();
        let top: Vec<f32> = (0..4).map(|x| image.value(x, 0)).collect();
        for (actual, expected) in bottom.iter().zip([0.1, 0.3, 0.5, 0.5]) {
            assert_abs_diff_eq!(*actual, expected, epsilon = 1.0e-6);
        }
        for (actual, expected) in top.iter().zip([0.5, 0.7, 0.9, 0.9]) {
            assert_abs_diff_eq!(*actual, expected, epsilon = 1.0e-6);
        }
    }

    #[test]
    fn adaptive_contrast_tracks_observed_range() {
        let matrix = FrequencyMatrix::from_columns(vec![vec![0.0, 40.0, 60.0, 0.0]]);
        let mut settings = fixed_settings(0.0, 100.0);
        settings.set_contrast_mode(ContrastMode::Adaptive);
        let image = ImageRenderer::new().render(&matrix, 1, 4, &settings);

        // Zeros sit below the scan floor; 40 and 60 become the range.
        assert_eq!(image.value(0, 2), 0.0);
        assert_eq!(image.value(0, 1), 1.0);
        assert_eq!(image.value(0, 3), 0.0);
        assert_eq!(image.value(0, 0), 0.0);
    }

    #[test]
    fn adaptive_contrast_falls_back_to_fixed_range() {
        let matrix = FrequencyMatrix::from_columns(vec![vec![0.0, 50.0, 0.0, 0.0]]);
        let mut settings = fixed_settings(0.0, 100.0);
        settings.set_contrast_mode(ContrastMode::Adaptive);
        let image = ImageRenderer::new().render(&matrix, 1, 4, &settings);
        // A single distinct value cannot span a range; the fixed limits apply.
        assert_abs_diff_eq!(image.value(0, 2), 0.5, epsilon = 1.0e-6);
    }

    #[test]
    fn adjustments_shift_the_fixed_range() {
        let matrix = FrequencyMatrix::from_columns(vec![vec![50.0]]);
        let mut settings = fixed_settings(0.0, 100.0);
        settings.set_value_adjustments(0.0, -50.0);
        let image = ImageRenderer::new().render(&matrix, 1, 1, &settings);
        assert_eq!(image.value(0, 0), 1.0);
    }

    #[test]
    fn degenerate_range_clamps_to_low_extreme() {
        let matrix = FrequencyMatrix::from_columns(vec![vec![75.0]]);
        let settings = fixed_settings(50.0, 50.0);
        let image = ImageRenderer::new().render(&matrix, 1, 1, &settings);
        assert_eq!(image.value(0, 0), 0.0);
    }

    #[test]
    fn display_range_selects_bin_subset() {
        let matrix = FrequencyMatrix::from_columns(vec![(0..8).map(|b| (b * 10) as f64).collect()]);
        let mut settings = fixed_settings(0.0, 100.0);
        // Default rate puts the bin width at 3 kHz; 6..12 kHz covers bins 2..=4.
        settings.set_display_frequency_range(6_000.0, 12_000.0);
        let image = ImageRenderer::new().render(&matrix, 1, 3, &settings);
        assert_abs_diff_eq!(image.value(0, 0), 0.4, epsilon = 1.0e-6);
        assert_abs_diff_eq!(image.value(0, 1), 0.3, epsilon = 1.0e-6);
        assert_abs_diff_eq!(image.value(0, 2), 0.2, epsilon = 1.0e-6);
    }

    #[test]
    fn packed_and_planar_agree() {
        let matrix = FrequencyMatrix::from_columns(vec![
            vec![0.0, 30.0],
            vec![60.0, 100.0],
        ]);
        let mut settings = fixed_settings(0.0, 100.0);
        settings.set_color_scheme(ColorScheme::BiColor);
        settings.set_background_color(Color::from_rgb(0.05, 0.05, 0.2));
        settings.set_foreground_color(Color::from_rgb(1.0, 0.8, 0.1));

        let mut renderer = ImageRenderer::new();
        let packed_image = renderer.render(&matrix, 2, 2, &settings);
        settings.set_pixel_format(PixelFormat::Planar);
        let planar_image = renderer.render(&matrix, 2, 2, &settings);

        let packed = packed_image.pixels().packed().unwrap();
        let (red, green, blue) = planar_image.pixels().planes().unwrap();
        for i in 0..4 {
            assert_eq!(packed[i], palette::pack_argb(red[i], green[i], blue[i]));
        }
    }

    #[test]
    fn bicolor_extremes_use_endpoint_colors() {
        let background = Color::from_rgb(0.0, 0.2, 0.4);
        let foreground = Color::from_rgb(0.8, 0.4, 0.0);
        let matrix = FrequencyMatrix::from_columns(vec![vec![0.0, 100.0]]);
        let mut settings = fixed_settings(0.0, 100.0);
        settings.set_color_scheme(ColorScheme::BiColor);
        settings.set_background_color(background);
        settings.set_foreground_color(foreground);

        let image = ImageRenderer::new().render(&matrix, 1, 2, &settings);
        let packed = image.pixels().packed().unwrap();
        assert_eq!(packed[1], background.to_argb());
        assert_eq!(packed[0], foreground.to_argb());
    }

    #[test]
    fn empty_matrix_renders_background() {
        let matrix = FrequencyMatrix::new(0);
        let settings = SpectrogramSettings::default();
        let image = ImageRenderer::new().render(&matrix, 4, 3, &settings);
        assert_eq!(image.values().len(), 12);
        assert!(image.values().iter().all(|&v| v == 0.0));

        let packed = image.pixels().packed().unwrap();
        assert!(packed.iter().all(|&p| p == 0xFFFF_FFFF));
        assert_eq!(image.pixels().packed_bytes().unwrap().len(), 48);
    }
}
