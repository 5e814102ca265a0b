// One-dimensional fixed-width histograms
//
// Binning is chosen once, from the first dataset filled, and then copied to
// the second dataset via `empty_like` so both sides share identical bins.

use serde::{Deserialize, Serialize};

/// Binned distribution of one numeric field
///
/// `contents` holds `n_bins + 2` slots: underflow first, overflow last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    pub name: String,
    pub n_bins: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub contents: Vec<f64>,
    pub entries: u64,
    pub sum_w: f64,
    pub sum_wx: f64,
    pub sum_wx2: f64,
}

/// Persisted set of distributions for one side of a comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionFile {
    pub histograms: Vec<Histogram1D>,
}

impl Histogram1D {
    /// Empty histogram with `n_bins` equal-width bins over `[x_min, x_max)`
    pub fn new(name: impl Into<String>, n_bins: usize, x_min: f64, x_max: f64) -> Self {
        let n_bins = n_bins.max(1);
        Self {
            name: name.into(),
            n_bins,
            x_min,
            x_max,
            contents: vec![0.0; n_bins + 2],
            entries: 0,
            sum_w: 0.0,
            sum_wx: 0.0,
            sum_wx2: 0.0,
        }
    }

    /// Histogram whose range is derived from `values`, then filled with them
    ///
    /// The range spans the finite minimum and maximum; the upper edge is
    /// pushed out by a tiny fraction of the width so the maximum lands in
    /// the last bin. A single distinct value gets a range of ±1 around it and
    /// no finite values at all give `[0, 1)`.
    pub fn auto_binned(name: impl Into<String>, values: &[f64], n_bins: usize) -> Self {
        let (x_min, x_max) = auto_range(values);
        let mut hist = Self::new(name, n_bins, x_min, x_max);
        hist.fill_all(values);
        hist
    }

    /// Same name and binning, no contents and no statistics
    pub fn empty_like(&self) -> Self {
        let mut hist = self.clone();
        hist.reset();
        hist
    }

    /// Clear contents, entries and all accumulated statistics
    pub fn reset(&mut self) {
        self.contents.iter_mut().for_each(|c| *c = 0.0);
        self.entries = 0;
        self.sum_w = 0.0;
        self.sum_wx = 0.0;
        self.sum_wx2 = 0.0;
    }

    /// Whether `other` has the same name and bin edges
    pub fn same_binning(&self, other: &Histogram1D) -> bool {
        self.name == other.name
            && self.n_bins == other.n_bins
            && self.x_min == other.x_min
            && self.x_max == other.x_max
    }

    /// Slot for `x`: 0 underflow, `n_bins + 1` overflow
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.x_min {
            0
        } else if x >= self.x_max {
            self.n_bins + 1
        } else {
            let width = (self.x_max - self.x_min) / self.n_bins as f64;
            let bin = ((x - self.x_min) / width) as usize;
            bin.min(self.n_bins - 1) + 1
        }
    }

    /// Add one unit-weight entry; non-finite values are ignored
    pub fn fill(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        let bin = self.find_bin(x);
        self.contents[bin] += 1.0;
        self.entries += 1;
        // under/overflow entries are counted but stay out of the moments
        if bin != 0 && bin != self.n_bins + 1 {
            self.sum_w += 1.0;
            self.sum_wx += x;
            self.sum_wx2 += x * x;
        }
    }

    pub fn fill_all(&mut self, values: &[f64]) {
        for &x in values {
            self.fill(x);
        }
    }

    /// Mean of in-range entries
    pub fn mean(&self) -> f64 {
        if self.sum_w == 0.0 {
            0.0
        } else {
            self.sum_wx / self.sum_w
        }
    }

    pub fn underflow(&self) -> f64 {
        self.contents[0]
    }

    pub fn overflow(&self) -> f64 {
        self.contents[self.n_bins + 1]
    }
}

fn auto_range(values: &[f64]) -> (f64, f64) {
    let mut finite = values.iter().copied().filter(|v| v.is_finite());
    let Some(first) = finite.next() else {
        return (0.0, 1.0);
    };

    let (lo, hi) = finite.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo == hi {
        return (lo - 1.0, upper_edge_above(hi, hi + 1.0));
    }

    let width = hi - lo;
    (lo, upper_edge_above(hi, hi + width * 1e-6))
}

/// `candidate` if it lies strictly above `hi`, else the next float above `hi`
///
/// Large magnitudes swallow a small nudge, which would push `hi` into overflow.
fn upper_edge_above(hi: f64, candidate: f64) -> f64 {
    if candidate > hi {
        candidate
    } else if hi == 0.0 {
        f64::from_bits(1)
    } else if hi > 0.0 {
        f64::from_bits(hi.to_bits() + 1)
    } else {
        f64::from_bits(hi.to_bits() - 1)
    }
}
