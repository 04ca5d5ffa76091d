//! DSP core: analysis windows, the radix-2 transform, and the frequency
//! matrix handed to the raster stage.

pub mod fft;
pub mod window;

use self::fft::AmplitudeScale;

/// Columnar store of transform output: one column per analysis window, one
/// entry per frequency bin, oldest column first. Every column has the same
/// bin count.
#[derive(Debug, Clone)]
pub struct FrequencyMatrix {
    columns: Vec<Vec<f64>>,
    bins: usize,
}

impl FrequencyMatrix {
    pub fn new(bins: usize) -> Self {
        Self {
            columns: Vec::new(),
            bins,
        }
    }

    /// Adopt prebuilt columns; the first column fixes the bin count.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Self {
        let bins = columns.first().map_or(0, Vec::len);
        debug_assert!(columns.iter().all(|column| column.len() == bins));
        Self { columns, bins }
    }

    /// Append one transform column. Rejects (and drops) columns whose bin
    /// count disagrees with the matrix.
    pub fn push_column(&mut self, column: Vec<f64>) -> bool {
        if column.len() != self.bins {
            return false;
        }
        self.columns.push(column);
        true
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn bin_count(&self) -> usize {
        self.bins
    }

    pub fn column(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    pub fn value(&self, column: usize, bin: usize) -> f64 {
        self.columns[column][bin]
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Run one analysis window through taper, transform, and amplitude scaling.
/// Returns the `len/2 + 1` display values, or `None` when the window length
/// cannot be transformed.
pub fn analyze_window(
    samples: &[f64],
    taper: Option<&[f64]>,
    scale: AmplitudeScale,
) -> Option<Vec<f64>> {
    let mut real = samples.to_vec();
    if let Some(taper) = taper {
        debug_assert_eq!(real.len(), taper.len());
        for (sample, coeff) in real.iter_mut().zip(taper.iter()) {
            *sample *= coeff;
        }
    }

    let mut imag = vec![0.0; real.len()];
    if !fft::forward(&mut real, &mut imag) {
        return None;
    }
    Some(fft::half_spectrum(&real, &imag, scale))
}
