//! In-place radix-2 transform over split real/imaginary buffers, plus the
//! amplitude scales applied when collapsing complex bins to display values.
//!
//! The forward pass is unnormalized; the inverse removes the full `n` gain so
//! a forward/inverse round trip reproduces the input.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// `10 / ln(10)`, so `x.ln() * LOG_FACTOR` is `10·log10(x)`.
const LOG_FACTOR: f64 = 10.0 * std::f64::consts::LOG10_E;
/// Additive floor keeping log scales finite on silent bins.
const LOG_EPSILON: f64 = 1.0e-14;

/// Replacement policy for non-positive inputs to the log scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogFloor {
    /// Add a tiny epsilon before the log; silence maps to a deep negative value.
    Epsilon,
    /// Clamp to at least one before the log; silence maps to zero.
    Unit,
}

impl LogFloor {
    fn apply(self, value: f64) -> f64 {
        match self {
            LogFloor::Epsilon => value + LOG_EPSILON,
            LogFloor::Unit => value.max(1.0),
        }
    }
}

/// How a complex bin is collapsed to the scalar stored in the frequency matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmplitudeScale {
    /// `sqrt(re² + im²)`.
    Magnitude,
    /// `re² + im²`.
    Power,
    /// `10·log10(power)` after the floor policy.
    LogPower { floor: LogFloor },
    /// `20·log10(magnitude)`, the floor applied to the magnitude itself.
    LogRootPower { floor: LogFloor },
}

impl AmplitudeScale {
    pub fn convert(self, re: f64, im: f64) -> f64 {
        let power = re * re + im * im;
        match self {
            AmplitudeScale::Magnitude => power.sqrt(),
            AmplitudeScale::Power => power,
            AmplitudeScale::LogPower { floor } => floor.apply(power).ln() * LOG_FACTOR,
            AmplitudeScale::LogRootPower { floor } => {
                floor.apply(power.sqrt()).ln() * (2.0 * LOG_FACTOR)
            }
        }
    }
}

/// Unnormalized in-place forward transform. Returns `false` without touching
/// the buffers when the length is zero, not a power of two, or the two slices
/// disagree.
pub fn forward(real: &mut [f64], imag: &mut [f64]) -> bool {
    let n = real.len();
    if !n.is_power_of_two() || imag.len() != n {
        return false;
    }

    bit_reverse(real, imag);

    let mut half = 1;
    while half < n {
        // Twiddle recurrence: w ← w·e^{iδ} with δ = −π/half, seeded so the
        // update is w += w·(cos δ − 1 + i·sin δ) without trig in the loop.
        let delta = -PI / half as f64;
        let seed = (delta * 0.5).sin();
        let advance_re = -2.0 * seed * seed;
        let advance_im = delta.sin();
        let mut twiddle_re = 1.0;
        let mut twiddle_im = 0.0;

        for group in 0..half {
            let mut p = group;
            while p < n {
                let q = p + half;
                let product_re = twiddle_re * real[q] - twiddle_im * imag[q];
                let product_im = twiddle_re * imag[q] + twiddle_im * real[q];
                real[q] = real[p] - product_re;
                imag[q] = imag[p] - product_im;
                real[p] += product_re;
                imag[p] += product_im;
                p += half * 2;
            }
            let previous_re = twiddle_re;
            twiddle_re += previous_re * advance_re - twiddle_im * advance_im;
            twiddle_im += twiddle_im * advance_re + previous_re * advance_im;
        }

        half *= 2;
    }

    true
}

/// Inverse transform derived from the forward one: conjugate, run the forward
/// pass, conjugate again and divide by `n`. Same length rules as [`forward`].
pub fn inverse(real: &mut [f64], imag: &mut [f64]) -> bool {
    let n = real.len();
    if !n.is_power_of_two() || imag.len() != n {
        return false;
    }

    for value in imag.iter_mut() {
        *value = -*value;
    }
    let transformed = forward(real, imag);
    debug_assert!(transformed);

    let scale = 1.0 / n as f64;
    for value in real.iter_mut() {
        *value *= scale;
    }
    for value in imag.iter_mut() {
        *value *= -scale;
    }
    true
}

fn bit_reverse(real: &mut [f64], imag: &mut [f64]) {
    let n = real.len();
    let mut target = 0usize;
    for index in 1..n {
        let mut mask = n >> 1;
        while target & mask != 0 {
            target ^= mask;
            mask >>= 1;
        }
        target ^= mask;
        if index < target {
            real.swap(index, target);
            imag.swap(index, target);
        }
    }
}

/// Collapse the non-redundant half of a real-input spectrum (`n/2 + 1` bins)
/// to display values under the given scale.
pub fn half_spectrum(real: &[f64], imag: &[f64], scale: AmplitudeScale) -> Vec<f64> {
    let bins = real.len() / 2 + 1;
    real.iter()
        .zip(imag)
        .take(bins)
        .map(|(&re, &im)| scale.convert(re, im))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rustfft::FftPlanner;
    use rustfft::num_complex::Complex;
    use std::f64::consts::TAU;

    fn test_signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|n| {
                let t = n as f64 / len as f64;
                (TAU * 3.0 * t).sin() + 0.5 * (TAU * 17.0 * t + 0.3).cos() + 0.1 * (t - 0.5)
            })
            .collect()
    }

    #[test]
    fn rejects_invalid_lengths() {
        let mut real = vec![1.0, 2.0, 3.0];
        let mut imag = vec![0.0, 0.0, 0.0];
        assert!(!forward(&mut real, &mut imag));
        assert_eq!(real, vec![1.0, 2.0, 3.0]);

        let mut empty_re: Vec<f64> = Vec::new();
        let mut empty_im: Vec<f64> = Vec::new();
        assert!(!forward(&mut empty_re, &mut empty_im));
        assert!(!inverse(&mut empty_re, &mut empty_im));

        let mut real = vec![1.0, 2.0, 3.0, 4.0];
        let mut short_imag = vec![0.0, 0.0];
        assert!(!forward(&mut real, &mut short_imag));
        assert!(!inverse(&mut real, &mut short_imag));
    }

    #[test]
    fn zero_input_stays_zero() {
        for len in [1usize, 2, 8, 64, 1024] {
            let mut real = vec![0.0; len];
            let mut imag = vec![0.0; len];
            assert!(forward(&mut real, &mut imag));
            for (&re, &im) in real.iter().zip(&imag) {
                assert_eq!(re, 0.0);
                assert_eq!(im, 0.0);
            }
        }
    }

    #[test]
    fn impulse_spreads_flat() {
        let mut real = vec![0.0; 16];
        let mut imag = vec![0.0; 16];
        real[0] = 1.0;
        assert!(forward(&mut real, &mut imag));
        for (&re, &im) in real.iter().zip(&imag) {
            assert_abs_diff_eq!(re, 1.0, epsilon = 1.0e-12);
            assert_abs_diff_eq!(im, 0.0, epsilon = 1.0e-12);
        }
    }

    #[test]
    fn sine_concentrates_energy_at_its_bin() {
        let len = 1024;
        let bin = 200;
        let mut real: Vec<f64> = (0..len)
            .map(|n| (TAU * bin as f64 * n as f64 / len as f64).sin())
            .collect();
        let mut imag = vec![0.0; len];
        assert!(forward(&mut real, &mut imag));

        let magnitudes = half_spectrum(&real, &imag, AmplitudeScale::Magnitude);
        assert_eq!(magnitudes.len(), len / 2 + 1);
        assert_abs_diff_eq!(magnitudes[bin], len as f64 / 2.0, epsilon = 1.0e-6);
        for (index, &magnitude) in magnitudes.iter().enumerate() {
            if index != bin {
                assert!(magnitude < 1.0e-6, "bin {index} leaked {magnitude}");
            }
        }
    }

    #[test]
    fn round_trip_recovers_signal() {
        let original = test_signal(512);
        let mut real = original.clone();
        let mut imag = vec![0.0; original.len()];
        assert!(forward(&mut real, &mut imag));
        assert!(inverse(&mut real, &mut imag));
        for (recovered, expected) in real.iter().zip(&original) {
            assert_abs_diff_eq!(recovered, expected, epsilon = 1.0e-9);
        }
        for &im in &imag {
            assert_abs_diff_eq!(im, 0.0, epsilon = 1.0e-9);
        }
    }

    #[test]
    fn round_trip_recovers_complex_input() {
        let len = 128;
        let re_in = test_signal(len);
        let im_in: Vec<f64> = (0..len).map(|n| (0.7 * n as f64).sin()).collect();
        let mut real = re_in.clone();
        let mut imag = im_in.clone();
        assert!(forward(&mut real, &mut imag));
        assert!(inverse(&mut real, &mut imag));
        for i in 0..len {
            assert_abs_diff_eq!(real[i], re_in[i], epsilon = 1.0e-9);
            assert_abs_diff_eq!(imag[i], im_in[i], epsilon = 1.0e-9);
        }
    }

    #[test]
    fn matches_planner_output() {
        let len = 256;
        let signal = test_signal(len);
        let mut real = signal.clone();
        let mut imag = vec![0.0; len];
        assert!(forward(&mut real, &mut imag));

        let mut reference: Vec<Complex<f64>> =
            signal.iter().map(|&re| Complex::new(re, 0.0)).collect();
        FftPlanner::new().plan_fft_forward(len).process(&mut reference);

        for i in 0..len {
            assert_abs_diff_eq!(real[i], reference[i].re, epsilon = 1.0e-9);
            assert_abs_diff_eq!(imag[i], reference[i].im, epsilon = 1.0e-9);
        }
    }

    #[test]
    fn amplitude_scales_convert_known_values() {
        assert_abs_diff_eq!(AmplitudeScale::Magnitude.convert(3.0, 4.0), 5.0, epsilon = 1.0e-12);
        assert_abs_diff_eq!(AmplitudeScale::Power.convert(3.0, 4.0), 25.0, epsilon = 1.0e-12);

        let log_power = AmplitudeScale::LogPower {
            floor: LogFloor::Epsilon,
        };
        assert_abs_diff_eq!(log_power.convert(3.0, 4.0), 10.0 * 25.0f64.log10(), epsilon = 1.0e-9);

        let log_root = AmplitudeScale::LogRootPower {
            floor: LogFloor::Epsilon,
        };
        assert_abs_diff_eq!(log_root.convert(3.0, 4.0), 20.0 * 5.0f64.log10(), epsilon = 1.0e-9);
        // The floor hits the magnitude, so root-power silence sits twice as deep.
        assert_abs_diff_eq!(log_root.convert(0.0, 0.0), -280.0, epsilon = 1.0e-9);
    }

    #[test]
    fn log_floors_differ_on_silence() {
        let epsilon_floor = AmplitudeScale::LogPower {
            floor: LogFloor::Epsilon,
        };
        let unit_floor = AmplitudeScale::LogPower {
            floor: LogFloor::Unit,
        };
        assert_abs_diff_eq!(epsilon_floor.convert(0.0, 0.0), -140.0, epsilon = 1.0e-9);
        assert_abs_diff_eq!(unit_floor.convert(0.0, 0.0), 0.0, epsilon = 1.0e-12);
        // Above the floor the two policies agree.
        assert_abs_diff_eq!(
            unit_floor.convert(10.0, 0.0),
            epsilon_floor.convert(10.0, 0.0),
            epsilon = 1.0e-9
        );
    }

    #[test]
    fn half_spectrum_emits_nonredundant_bins() {
        let mut real = test_signal(8);
        let mut imag = vec![0.0; 8];
        assert!(forward(&mut real, &mut imag));
        let bins = half_spectrum(&real, &imag, AmplitudeScale::Power);
        assert_eq!(bins.len(), 5);
        for (index, &bin) in bins.iter().enumerate() {
            let expected = real[index] * real[index] + imag[index] * imag[index];
            assert_abs_diff_eq!(bin, expected, epsilon = 1.0e-12);
        }
    }
}
