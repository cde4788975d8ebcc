/// Threshold selection for the GPD tail fit.
///
/// The threshold u is the 90th percentile of every intensity in the
/// sample. The tail is every observation at or above u, kept in sample
/// order.

use crate::model::{Observation, Sample, TAIL_QUANTILE};

/// Percentile with linear interpolation between order statistics
/// (`numpy.percentile` default, R type 7).
///
/// `q` is a fraction in `[0, 1]`. Returns `None` for an empty slice or any
/// non-finite value.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    Some(sorted[lo] + (h - h.floor()) * (sorted[hi] - sorted[lo]))
}

/// Threshold and the observations used for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct TailSelection {
    pub threshold: f64,
    pub tail: Vec<Observation>,
}

impl TailSelection {
    pub fn len(&self) -> usize {
        self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tail.is_empty()
    }
}

/// Computes u for the sample and returns the tail subset.
pub fn select_tail(sample: &Sample) -> TailSelection {
    // Sample::new has already rejected empty and non-finite input.
    let threshold = percentile(&sample.intensities(), TAIL_QUANTILE).unwrap_or(f64::NAN);

    let tail = sample
        .observations()
        .iter()
        .copied()
        .filter(|o| o.intensity >= threshold)
        .collect();

    TailSelection { threshold, tail }
}
