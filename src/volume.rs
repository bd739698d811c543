use glam::Vec3;
use ndarray::{Array3, ArrayView2, s};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// Dimensions of a volume in the canonical (depth, height, width) layout.
///
/// Depth indexes slices, height rows and width columns. The GPU texture uses
/// width as x, height as y and depth as z, so the flat buffer can be uploaded
/// without reordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolumeShape {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl VolumeShape {
    pub fn new(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.depth * self.height * self.width
    }

    /// Dimensions in texture axis order (x, y, z).
    pub fn texture_extent(&self) -> (u32, u32, u32) {
        (self.width as u32, self.height as u32, self.depth as u32)
    }
}

impl From<(usize, usize, usize)> for VolumeShape {
    fn from((depth, height, width): (usize, usize, usize)) -> Self {
        Self::new(depth, height, width)
    }
}

/// Physical distance between voxel centres along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoxelSpacing {
    /// Distance between columns (x).
    pub column: f32,
    /// Distance between rows (y).
    pub row: f32,
    /// Distance between slices (z).
    pub slice: f32,
}

impl VoxelSpacing {
    pub fn is_valid(&self) -> bool {
        [self.column, self.row, self.slice]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Per-axis anisotropy correction in texture axis order (x, y, z).
///
/// Every component is finite and positive; the texture coordinate divides
/// by it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec3", into = "Vec3")]
pub struct DataScale(Vec3);

impl TryFrom<Vec3> for DataScale {
    type Error = RenderError;

    fn try_from(scale: Vec3) -> Result<Self> {
        DataScale::new(scale)
    }
}

impl From<DataScale> for Vec3 {
    fn from(scale: DataScale) -> Self {
        scale.0
    }
}

impl Default for DataScale {
    /// Hand-tuned correction for series without spacing information.
    fn default() -> Self {
        Self(Vec3::new(0.49, 1.0, 0.49))
    }
}

impl DataScale {
    /// No correction, all axes span the full cube.
    pub const UNIFORM: Self = Self(Vec3::ONE);

    /// # Errors
    ///
    /// Returns [`RenderError::InvalidDataScale`] if a component is zero,
    /// negative or not finite.
    pub fn new(scale: Vec3) -> Result<Self> {
        if !scale.is_finite() || scale.min_element() <= 0.0 {
            return Err(RenderError::InvalidDataScale {
                scale: scale.to_array(),
            });
        }
        Ok(Self(scale))
    }

    /// Relative physical extent of each axis, the longest one being 1.
    pub fn from_spacing(shape: VolumeShape, spacing: VoxelSpacing) -> Self {
        let extent = Vec3::new(
            shape.width as f32 * spacing.column,
            shape.height as f32 * spacing.row,
            shape.depth as f32 * spacing.slice,
        );
        Self(extent / extent.max_element())
    }

    pub fn as_vec3(&self) -> Vec3 {
        self.0
    }
}

/// An assembled 3D scalar field of window/level normalized intensities.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<u8>,
    scale: DataScale,
    spacing: Option<VoxelSpacing>,
}

impl Volume {
    pub fn new(data: Array3<u8>, scale: DataScale, spacing: Option<VoxelSpacing>) -> Self {
        Self {
            data,
            scale,
            spacing,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn shape(&self) -> VolumeShape {
        self.data.dim().into()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    /// The voxels as one contiguous (depth, height, width) buffer.
    pub fn as_bytes(&self) -> std::borrow::Cow<'_, [u8]> {
        match self.data.as_slice() {
            Some(slice) => std::borrow::Cow::Borrowed(slice),
            None => std::borrow::Cow::Owned(self.data.iter().copied().collect()),
        }
    }

    pub fn scale(&self) -> DataScale {
        self.scale
    }

    pub fn spacing(&self) -> Option<VoxelSpacing> {
        self.spacing
    }

    pub fn slice(&self, index: usize) -> Option<ArrayView2<'_, u8>> {
        (index < self.data.dim().0).then(|| self.data.slice(s![index, .., ..]))
    }
}
