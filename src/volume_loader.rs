use crate::{
    error::{RenderError, Result},
    volume::{DataScale, Volume, VolumeShape, VoxelSpacing},
    window_level::WindowLevel,
};

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use web_time::Instant;

/// One decoded cross-section of the series.
#[derive(Debug, Clone)]
pub struct ScalarSlice<T> {
    /// Position in acquisition order.
    pub index: usize,
    /// Samples in (height, width) layout.
    pub pixels: Array2<T>,
}

impl<T> ScalarSlice<T> {
    pub fn new(index: usize, pixels: Array2<T>) -> Self {
        Self { index, pixels }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.pixels.dim()
    }
}

/// Parameters used while assembling a volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub window_level: WindowLevel,
    /// Physical voxel spacing when the series provides it.
    pub spacing: Option<VoxelSpacing>,
    /// Used when `spacing` is absent or invalid.
    pub fallback_scale: DataScale,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Assemble a volume from slices that are already sorted along the
    /// acquisition axis.
    ///
    /// # Arguments
    ///
    /// * `slices` - Decoded slices in acquisition order
    /// * `options` - Window/level and scale configuration
    ///
    /// # Errors
    ///
    /// Returns error if no slices are supplied or their dimensions differ
    pub fn load_from_slices<T>(slices: &[ScalarSlice<T>], options: &LoadOptions) -> Result<Volume>
    where
        T: Copy + Into<f64> + Send + Sync,
    {
        let started = Instant::now();

        Self::validate_dimensions(slices)?;

        let volume_array = Self::build_volume_array(slices, options.window_level);
        let shape: VolumeShape = volume_array.dim().into();

        let spacing = options.spacing.filter(VoxelSpacing::is_valid);
        let scale = match spacing {
            Some(spacing) => DataScale::from_spacing(shape, spacing),
            None => {
                log::info!(
                    "No usable voxel spacing, falling back to scale {:?}",
                    options.fallback_scale.as_vec3()
                );
                options.fallback_scale
            }
        };

        log::info!(
            "Assembled volume {:?} with scale {:?} in {:?}",
            shape,
            scale.as_vec3(),
            started.elapsed()
        );

        Ok(Volume::new(volume_array, scale, spacing))
    }

    fn validate_dimensions<T>(slices: &[ScalarSlice<T>]) -> Result<()> {
        let first = slices.first().ok_or(RenderError::EmptyVolume)?;
        let expected = first.dim();
        if expected.0 == 0 || expected.1 == 0 {
            return Err(RenderError::InvalidVolumeShape {
                slice: first.index,
                expected,
                found: expected,
            });
        }
        match slices.iter().find(|slice| slice.dim() != expected) {
            Some(slice) => Err(RenderError::InvalidVolumeShape {
                slice: slice.index,
                expected,
                found: slice.dim(),
            }),
            None => Ok(()),
        }
    }

    /// Normalize the slices in parallel straight into the stacked volume.
    fn build_volume_array<T>(slices: &[ScalarSlice<T>], window_level: WindowLevel) -> Array3<u8>
    where
        T: Copy + Into<f64> + Send + Sync,
    {
        let (height, width) = slices[0].dim();
        let mut volume = Array3::<u8>::zeros((slices.len(), height, width));

        volume
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(slices.par_iter())
            .for_each(|(out, slice)| window_level.apply_slice_into(slice.pixels.view(), out));

        volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{CpuVolumeSampler, VolumeSampler};
    use glam::Vec3;

    fn stack(depth: usize, height: usize, width: usize) -> Vec<ScalarSlice<i16>> {
        (0..depth)
            .map(|i| ScalarSlice::new(i, Array2::from_elem((height, width), i as i16 * 100)))
            .collect()
    }

    #[test]
    fn shape_round_trip() {
        let volume = VolumeLoader::load_from_slices(&stack(7, 5, 3), &LoadOptions::default())
            .expect("should assemble");
        assert_eq!(volume.shape(), VolumeShape::new(7, 5, 3));
        assert_eq!(volume.data().len(), 7 * 5 * 3);
        assert_eq!(
            CpuVolumeSampler::upload(&volume).shape(),
            VolumeShape::new(7, 5, 3)
        );
    }

    #[test]
    fn slice_order_is_preserved() {
        let options = LoadOptions::default();
        let volume = VolumeLoader::load_from_slices(&stack(4, 2, 2), &options).unwrap();
        for i in 0..4 {
            let expected = options.window_level.apply(i as i16 * 100);
            assert!(volume.slice(i).unwrap().iter().all(|&v| v == expected));
        }
    }

    #[test]
    fn inconsistent_slices_are_rejected() {
        let mut slices = stack(3, 4, 4);
        slices[2] = ScalarSlice::new(2, Array2::zeros((4, 5)));
        let err = VolumeLoader::load_from_slices(&slices, &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidVolumeShape {
                slice: 2,
                expected: (4, 4),
                found: (4, 5)
            }
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        let slices: Vec<ScalarSlice<u16>> = Vec::new();
        assert!(matches!(
            VolumeLoader::load_from_slices(&slices, &LoadOptions::default()),
            Err(RenderError::EmptyVolume)
        ));
        let slices = vec![ScalarSlice::new(0, Array2::<u16>::zeros((0, 4)))];
        assert!(matches!(
            VolumeLoader::load_from_slices(&slices, &LoadOptions::default()),
            Err(RenderError::InvalidVolumeShape { .. })
        ));
    }

    #[test]
    fn scale_prefers_spacing() {
        let options = LoadOptions {
            spacing: Some(VoxelSpacing {
                column: 1.0,
                row: 1.0,
                slice: 2.0,
            }),
            ..LoadOptions::default()
        };
        let volume = VolumeLoader::load_from_slices(&stack(2, 8, 8), &options).unwrap();
        assert_eq!(volume.scale().as_vec3(), Vec3::new(1.0, 1.0, 0.5));
        assert!(volume.spacing().is_some());
    }

    #[test]
    fn scale_falls_back_without_spacing() {
        let volume =
            VolumeLoader::load_from_slices(&stack(2, 8, 8), &LoadOptions::default()).unwrap();
        assert_eq!(volume.scale(), DataScale::default());

        let options = LoadOptions {
            spacing: Some(VoxelSpacing {
                column: f32::NAN,
                row: 1.0,
                slice: 1.0,
            }),
            fallback_scale: DataScale::UNIFORM,
            ..LoadOptions::default()
        };
        let volume = VolumeLoader::load_from_slices(&stack(2, 8, 8), &options).unwrap();
        assert_eq!(volume.scale().as_vec3(), Vec3::ONE);
        assert!(volume.spacing().is_none());
    }
}
