//! Mutable parameter registry coordinating the pipeline stages.
//!
//! Every mutator compares the incoming value against the stored one (with a
//! small epsilon for floats) and ignores no-op writes; a real change raises
//! the dirty flags of exactly the stages that must re-run. Flags are sticky:
//! they stay raised across further writes until the stage that serviced them
//! acknowledges with the matching `clear_*` call.

use crate::dsp::fft::{AmplitudeScale, LogFloor};
use crate::dsp::window::WindowKind;
use crate::render::image::PixelFormat;
use crate::render::palette::{Color, ColorScheme, colors_equal};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tolerance used by every float-valued mutator.
const VALUE_EPSILON: f64 = 1.0e-8;

pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;
const DEFAULT_WINDOW_DURATION: f64 = 0.02;
const DEFAULT_STRIDE_DURATION: f64 = 0.01;

/// Pipeline stages ordered by how much downstream work a change invalidates.
/// A deeper stage implies every stage after it, so consumers can compare
/// levels instead of reasoning about individual flag combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Invalidation {
    #[default]
    None,
    /// Resynthesize the raster from the existing frequency matrix.
    Image,
    /// Recompute the transform for every analysis window.
    Transform,
    /// Re-slice (and re-taper) sample windows from buffered data.
    WindowData,
    /// Re-read source samples.
    Data,
}

/// Which channel of the source feeds the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelMode {
    Mixdown,
    Left,
    Right,
}

/// Where the normalization range comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContrastMode {
    /// Configured value limits plus adjustments.
    Fixed,
    /// Observed min/max of the visible matrix region.
    Adaptive,
}

#[derive(Debug, Clone)]
pub struct SpectrogramSettings {
    sample_rate: f64,
    window_duration: f64,
    stride_duration: f64,
    samples_per_window: usize,
    samples_per_stride: usize,
    actual_window_duration: f64,
    actual_stride_duration: f64,
    window_function: WindowKind,
    amplitude_scale: AmplitudeScale,
    min_display_frequency: f64,
    max_display_frequency: f64,
    lower_limit: f64,
    upper_limit: f64,
    lower_adjustment: f64,
    upper_adjustment: f64,
    contrast_mode: ContrastMode,
    color_scheme: ColorScheme,
    background_color: Color,
    foreground_color: Color,
    pixel_format: PixelFormat,
    pixel_duration: f64,
    channel_mode: ChannelMode,
    data_required: bool,
    window_data_required: bool,
    transform_required: bool,
    image_required: bool,
}

impl Default for SpectrogramSettings {
    fn default() -> Self {
        let mut settings = Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_duration: DEFAULT_WINDOW_DURATION,
            stride_duration: DEFAULT_STRIDE_DURATION,
            samples_per_window: 0,
            samples_per_stride: 0,
            actual_window_duration: 0.0,
            actual_stride_duration: 0.0,
            window_function: WindowKind::Hann,
            amplitude_scale: AmplitudeScale::LogPower {
                floor: LogFloor::Epsilon,
            },
            min_display_frequency: 0.0,
            max_display_frequency: DEFAULT_SAMPLE_RATE * 0.5,
            lower_limit: 0.0,
            upper_limit: 100.0,
            lower_adjustment: 0.0,
            upper_adjustment: 0.0,
            contrast_mode: ContrastMode::Fixed,
            color_scheme: ColorScheme::Grayscale,
            background_color: Color::WHITE,
            foreground_color: Color::BLACK,
            pixel_format: PixelFormat::Packed,
            pixel_duration: DEFAULT_STRIDE_DURATION,
            channel_mode: ChannelMode::Mixdown,
            data_required: false,
            window_data_required: false,
            transform_required: false,
            image_required: false,
        };
        settings.recompute_sample_counts();
        settings
    }
}

impl SpectrogramSettings {
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn window_duration(&self) -> f64 {
        self.window_duration
    }

    pub fn stride_duration(&self) -> f64 {
        self.stride_duration
    }

    /// Window length in samples, always a power of two.
    pub fn samples_per_window(&self) -> usize {
        self.samples_per_window
    }

    /// Hop length in samples, at least one.
    pub fn samples_per_stride(&self) -> usize {
        self.samples_per_stride
    }

    /// Duration actually covered by [`Self::samples_per_window`].
    pub fn actual_window_duration(&self) -> f64 {
        self.actual_window_duration
    }

    /// Duration actually covered by [`Self::samples_per_stride`].
    pub fn actual_stride_duration(&self) -> f64 {
        self.actual_stride_duration
    }

    pub fn window_function(&self) -> WindowKind {
        self.window_function
    }

    pub fn amplitude_scale(&self) -> AmplitudeScale {
        self.amplitude_scale
    }

    pub fn min_display_frequency(&self) -> f64 {
        self.min_display_frequency
    }

    pub fn max_display_frequency(&self) -> f64 {
        self.max_display_frequency
    }

    /// Nyquist limit of the current sample rate.
    pub fn possible_max_frequency(&self) -> f64 {
        self.sample_rate * 0.5
    }

    pub fn lower_limit(&self) -> f64 {
        self.lower_limit
    }

    pub fn upper_limit(&self) -> f64 {
        self.upper_limit
    }

    pub fn lower_adjustment(&self) -> f64 {
        self.lower_adjustment
    }

    pub fn upper_adjustment(&self) -> f64 {
        self.upper_adjustment
    }

    pub fn contrast_mode(&self) -> ContrastMode {
        self.contrast_mode
    }

    pub fn color_scheme(&self) -> ColorScheme {
        self.color_scheme
    }

    pub fn background_color(&self) -> Color {
        self.background_color
    }

    pub fn foreground_color(&self) -> Color {
        self.foreground_color
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Source time represented by one output pixel column.
    pub fn pixel_duration(&self) -> f64 {
        self.pixel_duration
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.channel_mode
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if !differs(self.sample_rate, sample_rate) {
            return;
        }
        self.sample_rate = sample_rate;
        self.recompute_sample_counts();
        self.mark_window_data();
    }

    pub fn set_window_duration(&mut self, seconds: f64) {
        if !differs(self.window_duration, seconds) {
            return;
        }
        self.window_duration = seconds;
        self.recompute_sample_counts();
        self.mark_window_data();
    }

    pub fn set_stride_duration(&mut self, seconds: f64) {
        if !differs(self.stride_duration, seconds) {
            return;
        }
        self.stride_duration = seconds;
        self.recompute_sample_counts();
        self.mark_window_data();
    }

    pub fn set_window_function(&mut self, kind: WindowKind) {
        if self.window_function == kind {
            return;
        }
        self.window_function = kind;
        self.mark_window_data();
    }

    pub fn set_amplitude_scale(&mut self, scale: AmplitudeScale) {
        if self.amplitude_scale == scale {
            return;
        }
        self.amplitude_scale = scale;
        self.transform_required = true;
    }

    pub fn set_display_frequency_range(&mut self, min_hz: f64, max_hz: f64) {
        if !differs(self.min_display_frequency, min_hz)
            && !differs(self.max_display_frequency, max_hz)
        {
            return;
        }
        self.min_display_frequency = min_hz;
        self.max_display_frequency = max_hz;
        self.image_required = true;
    }

    pub fn set_value_limits(&mut self, lower: f64, upper: f64) {
        if !differs(self.lower_limit, lower) && !differs(self.upper_limit, upper) {
            return;
        }
        self.lower_limit = lower;
        self.upper_limit = upper;
        self.image_required = true;
    }

    /// Shift the normalization endpoints by a percentage of the limit span.
    pub fn set_value_adjustments(&mut self, lower_percent: f64, upper_percent: f64) {
        if !differs(self.lower_adjustment, lower_percent)
            && !differs(self.upper_adjustment, upper_percent)
        {
            return;
        }
        self.lower_adjustment = lower_percent;
        self.upper_adjustment = upper_percent;
        self.image_required = true;
    }

    pub fn set_contrast_mode(&mut self, mode: ContrastMode) {
        if self.contrast_mode == mode {
            return;
        }
        self.contrast_mode = mode;
        self.image_required = true;
    }

    pub fn set_color_scheme(&mut self, scheme: ColorScheme) {
        if self.color_scheme == scheme {
            return;
        }
        self.color_scheme = scheme;
        self.image_required = true;
    }

    pub fn set_background_color(&mut self, color: Color) {
        if colors_equal(self.background_color, color) {
            return;
        }
        self.background_color = color;
        self.image_required = true;
    }

    pub fn set_foreground_color(&mut self, color: Color) {
        if colors_equal(self.foreground_color, color) {
            return;
        }
        self.foreground_color = color;
        self.image_required = true;
    }

    pub fn set_pixel_format(&mut self, format: PixelFormat) {
        if self.pixel_format == format {
            return;
        }
        self.pixel_format = format;
        self.image_required = true;
    }

    pub fn set_pixel_duration(&mut self, seconds: f64) {
        if !differs(self.pixel_duration, seconds) {
            return;
        }
        self.pixel_duration = seconds;
        self.data_required = true;
    }

    pub fn set_channel_mode(&mut self, mode: ChannelMode) {
        if self.channel_mode == mode {
            return;
        }
        self.channel_mode = mode;
        self.data_required = true;
    }

    pub fn new_data_required(&self) -> bool {
        self.data_required
    }

    pub fn new_window_data_required(&self) -> bool {
        self.window_data_required
    }

    pub fn new_transform_required(&self) -> bool {
        self.transform_required
    }

    pub fn new_image_required(&self) -> bool {
        self.image_required
    }

    /// Deepest stage currently flagged. Earlier stages imply the later ones,
    /// so re-running from this stage onward services every raised flag.
    pub fn highest_invalidation(&self) -> Invalidation {
        if self.data_required {
            Invalidation::Data
        } else if self.window_data_required {
            Invalidation::WindowData
        } else if self.transform_required {
            Invalidation::Transform
        } else if self.image_required {
            Invalidation::Image
        } else {
            Invalidation::None
        }
    }

    pub fn clear_data(&mut self) {
        self.data_required = false;
    }

    pub fn clear_window_data(&mut self) {
        self.window_data_required = false;
    }

    pub fn clear_transform(&mut self) {
        self.transform_required = false;
    }

    pub fn clear_image(&mut self) {
        self.image_required = false;
    }

    pub fn reset_flags(&mut self) {
        self.data_required = false;
        self.window_data_required = false;
        self.transform_required = false;
        self.image_required = false;
    }

    fn mark_window_data(&mut self) {
        self.window_data_required = true;
        self.transform_required = true;
    }

    /// Derive the sample counts from the requested durations: the window
    /// snaps to the nearest power of two, the stride keeps the requested
    /// stride-to-window ratio, and the actual durations are read back from
    /// the snapped counts.
    fn recompute_sample_counts(&mut self) {
        self.samples_per_window = nearest_power_of_two(self.sample_rate * self.window_duration);

        let ratio = if self.window_duration.abs() > f64::EPSILON {
            self.stride_duration / self.window_duration
        } else {
            1.0
        };
        self.samples_per_stride =
            ((self.samples_per_window as f64 * ratio).round() as usize).max(1);

        if self.sample_rate > 0.0 {
            self.actual_window_duration = self.samples_per_window as f64 / self.sample_rate;
            self.actual_stride_duration = self.samples_per_stride as f64 / self.sample_rate;
        } else {
            self.actual_window_duration = 0.0;
            self.actual_stride_duration = 0.0;
        }

        debug!(
            "[settings] window {} samples ({:.4} s), stride {} samples ({:.4} s)",
            self.samples_per_window,
            self.actual_window_duration,
            self.samples_per_stride,
            self.actual_stride_duration
        );
    }
}

fn differs(stored: f64, incoming: f64) -> bool {
    (stored - incoming).abs() > VALUE_EPSILON
}

/// Nearest power of two to `target`; ties resolve upward.
fn nearest_power_of_two(target: f64) -> usize {
    if !target.is_finite() || target <= 1.0 {
        return 1;
    }
    let exponent = (target.log2().floor() as u32).min(62);
    let below = 1u64 << exponent;
    let above = below << 1;
    if target - (below as f64) < (above as f64) - target {
        below as usize
    } else {
        above as usize
    }
}

/// Plain serializable copy of every user-facing parameter, for embedders that
/// persist viewer sessions. Restoring goes through the mutators so the dirty
/// flags reflect what actually changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub sample_rate: f64,
    pub window_duration: f64,
    pub stride_duration: f64,
    pub window_function: WindowKind,
    pub amplitude_scale: AmplitudeScale,
    pub min_display_frequency: f64,
    pub max_display_frequency: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub lower_adjustment: f64,
    pub upper_adjustment: f64,
    pub contrast_mode: ContrastMode,
    pub color_scheme: ColorScheme,
    pub background_color: Color,
    pub foreground_color: Color,
    pub pixel_format: PixelFormat,
    pub pixel_duration: f64,
    pub channel_mode: ChannelMode,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self::capture(&SpectrogramSettings::default())
    }
}

impl SettingsSnapshot {
    pub fn capture(settings: &SpectrogramSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate(),
            window_duration: settings.window_duration(),
            stride_duration: settings.stride_duration(),
            window_function: settings.window_function(),
            amplitude_scale: settings.amplitude_scale(),
            min_display_frequency: settings.min_display_frequency(),
            max_display_frequency: settings.max_display_frequency(),
            lower_limit: settings.lower_limit(),
            upper_limit: settings.upper_limit(),
            lower_adjustment: settings.lower_adjustment(),
            upper_adjustment: settings.upper_adjustment(),
            contrast_mode: settings.contrast_mode(),
            color_scheme: settings.color_scheme(),
            background_color: settings.background_color(),
            foreground_color: settings.foreground_color(),
            pixel_format: settings.pixel_format(),
            pixel_duration: settings.pixel_duration(),
            channel_mode: settings.channel_mode(),
        }
    }

    pub fn apply_to(&self, settings: &mut SpectrogramSettings) {
        settings.set_sample_rate(self.sample_rate);
        settings.set_window_duration(self.window_duration);
        settings.set_stride_duration(self.stride_duration);
        settings.set_window_function(self.window_function);
        settings.set_amplitude_scale(self.amplitude_scale);
        settings.set_display_frequency_range(
            self.min_display_frequency,
            self.max_display_frequency,
        );
        settings.set_value_limits(self.lower_limit, self.upper_limit);
        settings.set_value_adjustments(self.lower_adjustment, self.upper_adjustment);
        settings.set_contrast_mode(self.contrast_mode);
        settings.set_color_scheme(self.color_scheme);
        settings.set_background_color(self.background_color);
        settings.set_foreground_color(self.foreground_color);
        settings.set_pixel_format(self.pixel_format);
        settings.set_pixel_duration(self.pixel_duration);
        settings.set_channel_mode(self.channel_mode);
    }
}
