//! Circular low-pass filter for compass headings.
//!
//! A plain exponential moving average breaks at the 0°/360° seam: averaging
//! 350° and 10° gives 180°.  [`HeadingFilter`] instead moves the estimate
//! along the shortest arc toward each raw reading:
//!
//! ```text
//! d = wrap(R − H)            into (−180, 180]
//! H = normalize(H + α · d)   into [0, 360)
//! ```
//!
//! # Example
//!
//! ```rust
//! use questhud_perception::heading::HeadingFilter;
//!
//! let mut filter = HeadingFilter::new(0.3);
//! filter.seed(350.0);
//! filter.update(10.0);
//! // 350° + 0.3 · 20° = 356°, moving through north rather than back to 340°.
//! assert!((filter.estimate() - 356.0).abs() < 1e-9);
//! ```

/// Default smoothing factor: each reading closes 30% of the gap.
pub const DEFAULT_SMOOTHING: f64 = 0.3;

/// Normalise any finite angle into `[0, 360)`.
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round tiny negative inputs up to exactly 360.0.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Signed shortest angular difference `to − from`, in `(−180, 180]`.
pub fn shortest_difference(from: f64, to: f64) -> f64 {
    let diff = normalize_degrees(to) - normalize_degrees(from);
    if diff > 180.0 {
        diff - 360.0
    } else if diff <= -180.0 {
        diff + 360.0
    } else {
        diff
    }
}

/// Exponential moving average on the circle.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingFilter {
    alpha: f64,
    estimate: f64,
}

impl HeadingFilter {
    /// Create a filter whose estimate starts at north.
    ///
    /// `alpha` is clamped to `[0, 1]`; non-finite values fall back to
    /// [`DEFAULT_SMOOTHING`].
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            DEFAULT_SMOOTHING
        };
        Self { alpha, estimate: 0.0 }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current smoothed heading in `[0, 360)`.
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Overwrite the estimate without smoothing.
    pub fn seed(&mut self, heading: f64) {
        self.estimate = normalize_degrees(heading);
    }

    /// Fold one raw reading into the estimate and return the new value.
    pub fn update(&mut self, raw: f64) -> f64 {
        let diff = shortest_difference(self.estimate, raw);
        self.estimate = normalize_degrees(self.estimate + diff * self.alpha);
        self.estimate
    }
}

impl Default for HeadingFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING)
    }
}
