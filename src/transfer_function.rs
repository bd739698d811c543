use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// Number of entries in the lookup table uploaded to the GPU.
pub const TRANSFER_FUNCTION_RESOLUTION: u32 = 256;

/// A single intensity to color/opacity mapping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Normalized intensity in `[0, 1]`.
    pub intensity: f32,
    /// Straight (not premultiplied) RGBA, each channel in `[0, 1]`.
    pub color: [f32; 4],
}

impl ControlPoint {
    pub fn new(intensity: f32, color: [f32; 4]) -> Self {
        Self { intensity, color }
    }
}

/// Piecewise-linear mapping from normalized intensity to RGBA.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ControlPoint>", into = "Vec<ControlPoint>")]
pub struct TransferFunction {
    points: Vec<ControlPoint>,
}

impl TryFrom<Vec<ControlPoint>> for TransferFunction {
    type Error = RenderError;

    fn try_from(points: Vec<ControlPoint>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<TransferFunction> for Vec<ControlPoint> {
    fn from(transfer_function: TransferFunction) -> Self {
        transfer_function.points
    }
}

impl Default for TransferFunction {
    /// Transparent air, faint soft tissue and opaque bone.
    fn default() -> Self {
        Self {
            points: vec![
                ControlPoint::new(0.0, [0.0, 0.0, 0.0, 0.0]),
                ControlPoint::new(0.3, [0.0, 0.0, 0.0, 0.0]),
                ControlPoint::new(0.4, [0.75, 0.35, 0.25, 0.02]),
                ControlPoint::new(0.6, [0.9, 0.75, 0.6, 0.08]),
                ControlPoint::new(0.8, [1.0, 0.95, 0.9, 0.5]),
                ControlPoint::new(1.0, [1.0, 1.0, 1.0, 0.9]),
            ],
        }
    }
}

impl TransferFunction {
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidTransferFunction`] for an empty point
    /// list, intensities outside `[0, 1]` or not strictly increasing, and
    /// color channels outside `[0, 1]`.
    pub fn new(points: Vec<ControlPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(RenderError::InvalidTransferFunction(
                "at least one control point is required".into(),
            ));
        }
        for (i, point) in points.iter().enumerate() {
            if !(0.0..=1.0).contains(&point.intensity) {
                return Err(RenderError::InvalidTransferFunction(format!(
                    "point {i} has intensity {} outside [0, 1]",
                    point.intensity
                )));
            }
            if point.color.iter().any(|c| !(0.0..=1.0).contains(c)) {
                return Err(RenderError::InvalidTransferFunction(format!(
                    "point {i} has color {:?} outside [0, 1]",
                    point.color
                )));
            }
        }
        if let Some(i) = points
            .windows(2)
            .position(|pair| pair[1].intensity <= pair[0].intensity)
        {
            return Err(RenderError::InvalidTransferFunction(format!(
                "intensities must be strictly increasing, point {} is not",
                i + 1
            )));
        }
        Ok(Self { points })
    }

    /// Linear grayscale ramp from transparent black to opaque white.
    pub fn grayscale() -> Self {
        Self {
            points: vec![
                ControlPoint::new(0.0, [0.0, 0.0, 0.0, 0.0]),
                ControlPoint::new(1.0, [1.0, 1.0, 1.0, 1.0]),
            ],
        }
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    pub fn lookup(&self, intensity: f32) -> Vec4 {
        let first = &self.points[0];
        let last = &self.points[self.points.len() - 1];
        if intensity.is_nan() || intensity <= first.intensity {
            return Vec4::from_array(first.color);
        }
        if intensity >= last.intensity {
            return Vec4::from_array(last.color);
        }

        // First point strictly above the intensity; always exists after the checks above.
        let upper = self
            .points
            .partition_point(|point| point.intensity <= intensity);
        let (a, b) = (&self.points[upper - 1], &self.points[upper]);
        let t = (intensity - a.intensity) / (b.intensity - a.intensity);
        Vec4::from_array(a.color).lerp(Vec4::from_array(b.color), t)
    }

    /// Evenly spaced RGBA8 table covering `[0, 1]`, entry `i` holding the color
    /// at intensity `i / (resolution - 1)`.
    pub fn to_lut(&self, resolution: u32) -> Vec<[u8; 4]> {
        let steps = resolution.max(2) - 1;
        (0..resolution)
            .map(|i| {
                let color = self.lookup(i as f32 / steps as f32);
                (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0)
                    .round()
                    .to_array()
                    .map(|c| c as u8)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> TransferFunction {
        TransferFunction::new(vec![
            ControlPoint::new(0.25, [0.0, 0.0, 0.0, 0.0]),
            ControlPoint::new(0.75, [1.0, 0.5, 0.0, 1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_between_points() {
        let tf = ramp();
        assert_eq!(tf.lookup(0.5), Vec4::new(0.5, 0.25, 0.0, 0.5));
        assert_eq!(tf.lookup(0.75), Vec4::new(1.0, 0.5, 0.0, 1.0));
    }

    #[test]
    fn clamps_out_of_range_intensities() {
        let tf = ramp();
        assert_eq!(tf.lookup(-1.0), Vec4::ZERO);
        assert_eq!(tf.lookup(0.1), Vec4::ZERO);
        assert_eq!(tf.lookup(2.0), Vec4::new(1.0, 0.5, 0.0, 1.0));
        assert_eq!(tf.lookup(f32::NAN), Vec4::ZERO);
    }

    #[test]
    fn single_point_is_constant() {
        let tf = TransferFunction::new(vec![ControlPoint::new(0.5, [0.2, 0.4, 0.6, 0.8])]).unwrap();
        assert_eq!(tf.lookup(0.0), tf.lookup(1.0));
    }

    #[test]
    fn rejects_malformed_points() {
        assert!(TransferFunction::new(Vec::new()).is_err());
        assert!(TransferFunction::new(vec![ControlPoint::new(1.5, [0.0; 4])]).is_err());
        assert!(TransferFunction::new(vec![ControlPoint::new(0.5, [0.0, 2.0, 0.0, 1.0])]).is_err());
        let unsorted = vec![
            ControlPoint::new(0.6, [0.0; 4]),
            ControlPoint::new(0.2, [1.0; 4]),
        ];
        assert!(matches!(
            TransferFunction::new(unsorted),
            Err(RenderError::InvalidTransferFunction(_))
        ));
        let duplicate = vec![
            ControlPoint::new(0.2, [0.0; 4]),
            ControlPoint::new(0.2, [1.0; 4]),
        ];
        assert!(TransferFunction::new(duplicate).is_err());
        assert!(TransferFunction::new(vec![ControlPoint::new(f32::NAN, [0.0; 4])]).is_err());
    }

    #[test]
    fn presets_are_valid() {
        assert!(TransferFunction::new(TransferFunction::default().points().to_vec()).is_ok());
        assert!(TransferFunction::new(TransferFunction::grayscale().points().to_vec()).is_ok());
    }

    #[test]
    fn lookup_table_spans_the_range() {
        let lut = TransferFunction::grayscale().to_lut(TRANSFER_FUNCTION_RESOLUTION);
        assert_eq!(lut.len(), 256);
        assert_eq!(lut[0], [0, 0, 0, 0]);
        assert_eq!(lut[128], [128, 128, 128, 128]);
        assert_eq!(lut[255], [255, 255, 255, 255]);
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"[{"intensity": 0.0, "color": [0, 0, 0, 0]},
                       {"intensity": 1.0, "color": [1, 1, 1, 1]}]"#;
        let tf: TransferFunction = serde_json::from_str(json).unwrap();
        assert_eq!(tf, TransferFunction::grayscale());

        let json = r#"[{"intensity": 0.8, "color": [0, 0, 0, 0]},
                       {"intensity": 0.1, "color": [1, 1, 1, 1]}]"#;
        assert!(serde_json::from_str::<TransferFunction>(json).is_err());
    }
}
