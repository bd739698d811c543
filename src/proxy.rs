//! Proxy geometry the volume is drawn on: a stack of axis-aligned quads
//! spanning the unit cube, seen through a fixed orthographic camera.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

const NEAR_PLANE: f32 = 0.1;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProxyVertex {
    pub position: [f32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSetup {
    /// Number of quads the cube is cut into along z.
    pub slice_count: u32,
    /// Distance from the eye to the centre of the cube.
    pub camera_distance: f32,
    /// Half of the visible height in object units.
    pub half_extent: f32,
}

impl Default for ViewSetup {
    fn default() -> Self {
        Self {
            slice_count: 256,
            camera_distance: 2.5,
            half_extent: 0.75,
        }
    }
}

impl ViewSetup {
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidViewSetup`] if there are no slices, the
    /// visible extent is not positive or the cube would cross the near plane.
    pub fn validate(&self) -> Result<()> {
        if self.slice_count == 0 {
            return Err(RenderError::InvalidViewSetup(
                "slice_count must be >= 1".to_string(),
            ));
        }
        if !self.half_extent.is_finite() || self.half_extent <= 0.0 {
            return Err(RenderError::InvalidViewSetup(format!(
                "half_extent must be finite and > 0, got {}",
                self.half_extent
            )));
        }
        // The cube spans camera_distance +- 0.5 along the view axis.
        if !self.camera_distance.is_finite() || self.camera_distance - 0.5 < NEAR_PLANE {
            return Err(RenderError::InvalidViewSetup(format!(
                "camera_distance must be at least {}, got {}",
                NEAR_PLANE + 0.5,
                self.camera_distance
            )));
        }
        Ok(())
    }

    pub fn model_view(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, -self.camera_distance))
            * Mat4::from_translation(Vec3::splat(-0.5))
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        let half_height = self.half_extent;
        let half_width = half_height * aspect;
        Mat4::orthographic_rh(
            -half_width,
            half_width,
            -half_height,
            half_height,
            NEAR_PLANE,
            self.camera_distance + 2.0,
        )
    }

    /// Object-space z of quad `index`, quads ordered back to front.
    pub fn slice_depth(&self, index: u32) -> f32 {
        if self.slice_count <= 1 {
            0.5
        } else {
            index as f32 / (self.slice_count - 1) as f32
        }
    }

    /// Two triangles per quad, farthest quad first.
    pub fn vertices(&self) -> Vec<ProxyVertex> {
        (0..self.slice_count.max(1))
            .flat_map(|index| {
                let z = self.slice_depth(index);
                [
                    [0.0, 0.0, z],
                    [1.0, 0.0, z],
                    [1.0, 1.0, z],
                    [0.0, 0.0, z],
                    [1.0, 1.0, z],
                    [0.0, 1.0, z],
                ]
                .map(|position| ProxyVertex { position })
            })
            .collect()
    }

    /// Object-space (x, y) covered by the centre of pixel (`column`, `row`),
    /// or `None` if the pixel misses the cube.
    pub fn pixel_to_object(
        &self,
        column: u32,
        row: u32,
        width: u32,
        height: u32,
    ) -> Option<(f32, f32)> {
        let aspect = width as f32 / height as f32;
        let ndc_x = 2.0 * (column as f32 + 0.5) / width as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * (row as f32 + 0.5) / height as f32;
        let x = ndc_x * self.half_extent * aspect + 0.5;
        let y = ndc_y * self.half_extent + 0.5;
        ((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)).then_some((x, y))
    }
}
