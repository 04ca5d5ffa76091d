//! Analysis window functions and the 8-bit level-remap table.
//!
//! Coefficient arrays taper a sample window before the transform to trade
//! main-lobe width against side-lobe leakage. All kinds are deterministic in
//! `(kind, len)`, which is also the key of the shared coefficient cache.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, RwLock};

/// Fraction of the span tapered on each side of [`WindowKind::GaussianTapered`].
const GAUSSIAN_TAPER_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum WindowKind {
    Rectangular,
    Hann,
    Hamming,
    Blackman,
    Nuttall,
    BlackmanHarris,
    FlatTop,
    KaiserBessel,
    Bartlett,
    Triangular,
    Welch,
    Gaussian { sigma: f64 },
    GaussianSquared { sigma: f64 },
    GaussianTapered { sigma: f64 },
    Tukey { alpha: f64 },
    GaussianTukey { sigma: f64, alpha: f64 },
}

impl WindowKind {
    /// Per-sample taper coefficients. `None` means no tapering is applied
    /// (the rectangular window), letting callers skip the multiply entirely.
    pub fn coefficients(self, len: usize) -> Option<Vec<f64>> {
        match self {
            WindowKind::Rectangular => None,
            WindowKind::Hann => Some(cosine_sum(len, &[0.5, 0.5])),
            WindowKind::Hamming => Some(cosine_sum(len, &[0.53836, 0.46164])),
            WindowKind::Blackman => Some(cosine_sum(len, &[0.42, 0.5, 0.08])),
            WindowKind::Nuttall => {
                Some(cosine_sum(len, &[0.355_768, 0.487_396, 0.144_232, 0.012_604]))
            }
            WindowKind::BlackmanHarris => {
                Some(cosine_sum(len, &[0.35875, 0.48829, 0.14128, 0.01168]))
            }
            WindowKind::FlatTop => Some(cosine_sum(
                len,
                &[
                    0.215_578_95,
                    0.416_631_58,
                    0.277_263_158,
                    0.083_578_947,
                    0.006_947_368,
                ],
            )),
            // Cosine-sum approximation of the Kaiser-Bessel window; the
            // constants leave it unnormalized with a peak near 2.487.
            WindowKind::KaiserBessel => Some(cosine_sum(len, &[1.0, 1.24, 0.244, 0.00305])),
            WindowKind::Bartlett => Some(tent(len, len.saturating_sub(1) as f64)),
            WindowKind::Triangular => Some(tent(len, len as f64)),
            WindowKind::Welch => Some(welch(len)),
            WindowKind::Gaussian { sigma } => Some(gaussian(len, sigma, false)),
            WindowKind::GaussianSquared { sigma } => Some(gaussian(len, sigma, true)),
            WindowKind::GaussianTapered { sigma } => Some(gaussian_tapered(len, sigma)),
            WindowKind::Tukey { alpha } => Some(tukey(len, alpha)),
            WindowKind::GaussianTukey { sigma, alpha } => Some(gaussian_tukey(len, sigma, alpha)),
        }
    }

    /// Shared coefficients from the global cache. `None` mirrors
    /// [`WindowKind::coefficients`] for the no-taper case.
    pub fn cached(self, len: usize) -> Option<Arc<[f64]>> {
        if matches!(self, WindowKind::Rectangular) {
            return None;
        }
        Some(WindowCache::global().get(self, len))
    }

    fn key_bits(self) -> (u8, u64, u64) {
        match self {
            WindowKind::Rectangular => (0, 0, 0),
            WindowKind::Hann => (1, 0, 0),
            WindowKind::Hamming => (2, 0, 0),
            WindowKind::Blackman => (3, 0, 0),
            WindowKind::Nuttall => (4, 0, 0),
            WindowKind::BlackmanHarris => (5, 0, 0),
            WindowKind::FlatTop => (6, 0, 0),
            WindowKind::KaiserBessel => (7, 0, 0),
            WindowKind::Bartlett => (8, 0, 0),
            WindowKind::Triangular => (9, 0, 0),
            WindowKind::Welch => (10, 0, 0),
            WindowKind::Gaussian { sigma } => (11, canonical_f64_bits(sigma), 0),
            WindowKind::GaussianSquared { sigma } => (12, canonical_f64_bits(sigma), 0),
            WindowKind::GaussianTapered { sigma } => (13, canonical_f64_bits(sigma), 0),
            WindowKind::Tukey { alpha } => (14, canonical_f64_bits(alpha), 0),
            WindowKind::GaussianTukey { sigma, alpha } => {
                (15, canonical_f64_bits(sigma), canonical_f64_bits(alpha))
            }
        }
    }
}

impl PartialEq for WindowKind {
    fn eq(&self, other: &Self) -> bool {
        self.key_bits() == other.key_bits()
    }
}

impl Eq for WindowKind {}

impl Hash for WindowKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (tag, first, second) = self.key_bits();
        state.write_u8(tag);
        state.write_u64(first);
        state.write_u64(second);
    }
}

#[inline]
fn canonical_f64_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct WindowKey {
    kind: WindowKind,
    len: usize,
}

struct WindowCache {
    entries: RwLock<FxHashMap<WindowKey, Arc<[f64]>>>,
}

impl WindowCache {
    fn global() -> &'static WindowCache {
        static INSTANCE: OnceLock<WindowCache> = OnceLock::new();
        INSTANCE.get_or_init(|| WindowCache {
            entries: RwLock::new(FxHashMap::default()),
        })
    }

    fn get(&self, kind: WindowKind, len: usize) -> Arc<[f64]> {
        if len == 0 {
            return Arc::from([]);
        }

        let key = WindowKey { kind, len };
        if let Some(existing) = self.entries.read().unwrap().get(&key) {
            return Arc::clone(existing);
        }

        let mut write = self.entries.write().unwrap();
        Arc::clone(
            write
                .entry(key)
                .or_insert_with(|| Arc::from(kind.coefficients(len).unwrap_or_else(|| vec![1.0; len]))),
        )
    }
}

/// Generalized cosine sum over the symmetric span `s = len − 1` with
/// alternating term signs: `a0 − a1·cos(2πn/s) + a2·cos(4πn/s) − …`.
fn cosine_sum(len: usize, terms: &[f64]) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![1.0];
    }

    let span = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let phase = TAU * n as f64 / span;
            terms
                .iter()
                .enumerate()
                .map(|(order, coeff)| {
                    let term = coeff * (phase * order as f64).cos();
                    if order % 2 == 0 { term } else { -term }
                })
                .sum()
        })
        .collect()
}

/// Piecewise-linear tent `1 − |(n − s/2)/(base/2)|`; Bartlett passes
/// `base = len − 1` (exact zero endpoints), Triangular passes `base = len`.
fn tent(len: usize, base: f64) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![1.0];
    }

    let center = (len - 1) as f64 * 0.5;
    let half = base * 0.5;
    (0..len)
        .map(|n| 1.0 - ((n as f64 - center) / half).abs())
        .collect()
}

fn welch(len: usize) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![1.0];
    }

    let center = (len - 1) as f64 * 0.5;
    (0..len)
        .map(|n| {
            let t = (n as f64 - center) / center;
            1.0 - t * t
        })
        .collect()
}

fn gaussian(len: usize, sigma: f64, squared: bool) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![1.0];
    }

    let sigma = if sigma.is_finite() && sigma > 0.0 {
        sigma
    } else {
        0.4
    };

    let center = (len - 1) as f64 * 0.5;
    let spread = sigma * center;
    (0..len)
        .map(|n| {
            let t = (n as f64 - center) / spread;
            let value = (-0.5 * t * t).exp();
            if squared { value * value } else { value }
        })
        .collect()
}

fn gaussian_tapered(len: usize, sigma: f64) -> Vec<f64> {
    let taper = planck_taper(len, GAUSSIAN_TAPER_FRACTION);
    gaussian(len, sigma, false)
        .into_iter()
        .zip(taper)
        .map(|(g, p)| g * p)
        .collect()
}

fn tukey(len: usize, alpha: f64) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![1.0];
    }

    let alpha = if alpha.is_finite() {
        alpha.clamp(0.0, 1.0)
    } else {
        0.5
    };

    let span = (len - 1) as f64;
    let taper = alpha * span * 0.5;
    if taper <= 0.0 {
        return vec![1.0; len];
    }

    (0..len)
        .map(|n| {
            let position = n as f64;
            let mirrored = if position <= span * 0.5 {
                position
            } else {
                span - position
            };
            if mirrored >= taper {
                1.0
            } else {
                0.5 * (1.0 + (PI * (mirrored / taper - 1.0)).cos())
            }
        })
        .collect()
}

fn gaussian_tukey(len: usize, sigma: f64, alpha: f64) -> Vec<f64> {
    tukey(len, alpha)
        .into_iter()
        .zip(gaussian(len, sigma, false))
        .map(|(t, g)| t * g)
        .collect()
}

/// Smooth zero-to-one ramp over the first/last `epsilon` fraction of the
/// span, exactly zero at the endpoints and exactly one on the plateau.
fn planck_taper(len: usize, epsilon: f64) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![1.0];
    }

    let span = (len - 1) as f64;
    let half = span * 0.5;
    let taper_span = (epsilon * span).min(half);
    if taper_span <= 0.0 {
        return vec![1.0; len];
    }

    (0..len)
        .map(|i| {
            let position = i as f64;
            let mirrored = if position <= half {
                position
            } else {
                span - position
            };
            planck_taper_value(mirrored, taper_span)
        })
        .collect()
}

fn planck_taper_value(distance: f64, taper_span: f64) -> f64 {
    if distance <= 0.0 {
        return 0.0;
    }
    if distance >= taper_span {
        return 1.0;
    }

    let term1 = taper_span / distance;
    let denom = taper_span - distance;
    if denom <= f64::EPSILON {
        return 1.0;
    }
    let term2 = taper_span / denom;
    1.0 / ((term1 - term2).exp() + 1.0)
}

/// Build the 256-entry contrast remap table: indices below `from` map to 0,
/// indices above `to` map to 255, and `[from, to]` is linear. Independent of
/// audio windowing; consumers remap 8-bit intensity through it.
pub fn level_filter(from: u8, to: u8) -> [u8; 256] {
    let lo = from as usize;
    let hi = to as usize;
    let mut table = [0u8; 256];
    for (index, slot) in table.iter_mut().enumerate() {
        *slot = if index < lo {
            0
        } else if index > hi || hi == lo {
            255
        } else {
            (((index - lo) * 255) as f64 / (hi - lo) as f64).round() as u8
        };
    }
    table
}
