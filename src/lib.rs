//! Spectrogram synthesis pipeline.
//!
//! Turns windows of PCM samples into a displayable time-frequency raster:
//! analysis windows taper each sample window, an in-place radix-2 transform
//! produces the spectrum, and the renderer maps a matrix of per-bin values
//! onto a color-mapped pixel buffer. [`settings::SpectrogramSettings`] sits
//! between the stages, deriving transform-compatible sample counts from
//! user-facing durations and flagging which stage must re-run after each
//! parameter change. Audio decoding, display, and persistence belong to the
//! embedding application.

pub mod dsp;
pub mod render;
pub mod settings;
pub mod util;

pub use dsp::fft::{AmplitudeScale, LogFloor};
pub use dsp::window::WindowKind;
pub use dsp::{FrequencyMatrix, analyze_window};
pub use render::image::{ImageRenderer, PixelFormat, PixelStorage, SpectrogramImage};
pub use render::palette::{Color, ColorScheme};
pub use settings::{
    ChannelMode, ContrastMode, Invalidation, SettingsSnapshot, SpectrogramSettings,
};
