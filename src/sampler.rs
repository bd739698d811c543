//! Trilinear sampling of an uploaded volume.
//!
//! [`VolumeSampler`] is the contract shared by the CPU reference path and the
//! WGSL program: normalized coordinates in `[0, 1]^3` with x along the width,
//! y along the height and z along the depth of the volume, clamp-to-edge
//! addressing and intensities in `[0, 1]`.

use glam::Vec3;
use ndarray::Array3;

use crate::{interpolator::Interpolator, volume::Volume, volume::VolumeShape};

/// Squared length below which a gradient is treated as degenerate.
pub const DEGENERATE_GRADIENT_EPSILON: f32 = 1e-12;

pub trait VolumeSampler: Send + Sync {
    /// Dimensions of the sampled grid.
    fn shape(&self) -> VolumeShape;

    /// Intensity in `[0, 1]` at a normalized texture coordinate.
    fn sample(&self, coord: Vec3) -> f32;

    /// Normalized central-difference gradient, or `None` in flat regions
    /// where the difference vector has no usable direction.
    fn gradient(&self, coord: Vec3, step: f32) -> Option<Vec3> {
        let gradient = Interpolator::central_difference(|p| self.sample(p), coord, step);
        (gradient.length_squared() > DEGENERATE_GRADIENT_EPSILON).then(|| gradient.normalize())
    }
}

/// Host-side copy of a volume with the same semantics as the GPU texture.
#[derive(Debug, Clone)]
pub struct CpuVolumeSampler {
    data: Array3<u8>,
}

impl CpuVolumeSampler {
    pub fn upload(volume: &Volume) -> Self {
        Self {
            data: volume.data().as_standard_layout().into_owned(),
        }
    }
}

impl VolumeSampler for CpuVolumeSampler {
    fn shape(&self) -> VolumeShape {
        self.data.dim().into()
    }

    fn sample(&self, coord: Vec3) -> f32 {
        let (depth, height, width) = self.data.dim();
        let x = Interpolator::texel_coordinate(coord.x, width);
        let y = Interpolator::texel_coordinate(coord.y, height);
        let z = Interpolator::texel_coordinate(coord.z, depth);
        Interpolator::trilinear_interpolate(&self.data.view(), z, y, x) / 255.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::DataScale;
    use proptest::prelude::*;

    fn sampler_from_fn(
        shape: (usize, usize, usize),
        f: impl Fn(usize, usize, usize) -> u8,
    ) -> CpuVolumeSampler {
        let data = Array3::from_shape_fn(shape, |(z, y, x)| f(z, y, x));
        CpuVolumeSampler::upload(&Volume::new(data, DataScale::default(), None))
    }

    #[test]
    fn shape_matches_volume() {
        let sampler = sampler_from_fn((6, 4, 2), |_, _, _| 0);
        assert_eq!(sampler.shape(), VolumeShape::new(6, 4, 2));
    }

    #[test]
    fn axes_follow_canonical_layout() {
        // Intensity grows along the width only, so x must pick it up.
        let sampler = sampler_from_fn((2, 2, 2), |_, _, x| if x == 1 { 255 } else { 0 });
        assert_eq!(sampler.sample(Vec3::new(0.0, 0.5, 0.5)), 0.0);
        assert_eq!(sampler.sample(Vec3::new(1.0, 0.5, 0.5)), 1.0);
        assert_eq!(sampler.sample(Vec3::new(0.5, 0.0, 1.0)), 0.5);
    }

    #[test]
    fn flat_region_has_no_gradient() {
        let sampler = sampler_from_fn((4, 4, 4), |_, _, _| 120);
        assert_eq!(sampler.gradient(Vec3::splat(0.5), 0.005), None);
    }

    #[test]
    fn gradient_points_up_the_ramp() {
        let sampler = sampler_from_fn((4, 4, 4), |z, _, _| (z * 60) as u8);
        let gradient = sampler.gradient(Vec3::splat(0.5), 0.1).unwrap();
        assert!((gradient - Vec3::Z).length() < 1e-6);
    }

    proptest! {
        #[test]
        fn never_extrapolates_outside_the_cube(
            x in -3.0f32..4.0,
            y in -3.0f32..4.0,
            z in -3.0f32..4.0,
        ) {
            let sampler = sampler_from_fn((3, 5, 4), |z, y, x| (z * 40 + y * 10 + x * 3) as u8);
            let clamped = Vec3::new(x, y, z).clamp(Vec3::ZERO, Vec3::ONE);
            prop_assert_eq!(sampler.sample(Vec3::new(x, y, z)), sampler.sample(clamped));
            let value = sampler.sample(Vec3::new(x, y, z));
            prop_assert!((0.0..=1.0).contains(&value));
        }
    }
}
