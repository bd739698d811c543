use ndarray::{Array2, ArrayView2, ArrayViewMut2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// Linear contrast stretch mapping raw scalar samples onto `0..=255`.
///
/// Samples at or below `level - 0.5 - (window - 1) / 2` map to 0, samples above
/// `level - 0.5 + (window - 1) / 2` map to 255 and everything in between is
/// interpolated linearly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWindowLevel")]
pub struct WindowLevel {
    window: f64,
    level: f64,
}

#[derive(Deserialize)]
struct RawWindowLevel {
    window: f64,
    level: f64,
}

impl TryFrom<RawWindowLevel> for WindowLevel {
    type Error = RenderError;

    fn try_from(raw: RawWindowLevel) -> Result<Self> {
        WindowLevel::new(raw.window, raw.level)
    }
}

impl Default for WindowLevel {
    /// Bone / soft tissue contrast for CT data.
    fn default() -> Self {
        Self {
            window: 2000.0,
            level: 300.0,
        }
    }
}

impl WindowLevel {
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidWindowLevel`] if `window` is below 1 or
    /// either value is not finite.
    pub fn new(window: f64, level: f64) -> Result<Self> {
        if !window.is_finite() || !level.is_finite() || window < 1.0 {
            return Err(RenderError::InvalidWindowLevel { window });
        }
        Ok(Self { window, level })
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Lower and upper bounds of the linear ramp.
    pub fn bounds(&self) -> (f64, f64) {
        let center = self.level - 0.5;
        let half_width = (self.window - 1.0) / 2.0;
        (center - half_width, center + half_width)
    }

    #[inline]
    pub fn apply<T: Into<f64>>(&self, sample: T) -> u8 {
        let sample = sample.into();
        let (lower, upper) = self.bounds();
        if sample <= lower {
            0
        } else if sample > upper {
            255
        } else {
            // window == 1 collapses the ramp, both branches above cover it
            let ramp = (sample - (self.level - 0.5)) / (self.window - 1.0) + 0.5;
            (ramp * 255.0).round().clamp(0.0, 255.0) as u8
        }
    }

    /// Normalize every sample of a decoded slice.
    pub fn apply_slice<T>(&self, slice: ArrayView2<'_, T>) -> Array2<u8>
    where
        T: Copy + Into<f64>,
    {
        slice.mapv(|sample| self.apply(sample))
    }

    /// Normalize a decoded slice into `out`, which must have the same shape.
    pub fn apply_slice_into<T>(&self, slice: ArrayView2<'_, T>, out: ArrayViewMut2<'_, u8>)
    where
        T: Copy + Into<f64>,
    {
        Zip::from(out)
            .and(slice)
            .for_each(|out, &sample| *out = self.apply(sample));
    }
}
