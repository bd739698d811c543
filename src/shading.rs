//! Per-fragment shading of the volume.
//!
//! A [`FragmentProgram`] turns one [`FragmentContext`] into an RGBA color from
//! immutable per-frame inputs. The same program is evaluated on the CPU by
//! [`crate::cpu_renderer::CpuRenderer`] and, through its WGSL source, on the
//! GPU by [`crate::gpu_renderer::GpuRenderer`].

use std::borrow::Cow;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::{
    enums::DegenerateNormal,
    error::{RenderError, Result},
    sampler::VolumeSampler,
    transfer_function::TransferFunction,
    volume::DataScale,
};

/// Half width of the band around the iso-weight.
pub const ISO_TOLERANCE: f32 = 0.02;

/// A positional light in eye space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Light {
    pub position: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::new(1.0, 1.0, 1.0),
            ambient: Vec3::ONE,
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
        }
    }
}

/// Lighting and gating parameters, fixed for the duration of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadingParameters {
    pub lighting_enabled: bool,
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub shininess: f32,
    pub iso_weight: f32,
    /// Step of the central differences, in normalized texture units.
    pub cell_size: f32,
    pub light: Light,
    pub degenerate_normal: DegenerateNormal,
}

impl Default for ShadingParameters {
    fn default() -> Self {
        Self {
            lighting_enabled: true,
            ambient: 0.1,
            diffuse: 0.7,
            specular: 0.2,
            shininess: 1.1,
            iso_weight: 0.0,
            cell_size: 0.005,
            light: Light::default(),
            degenerate_normal: DegenerateNormal::default(),
        }
    }
}

impl ShadingParameters {
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidShadingParameters`] if a coefficient is
    /// negative or not finite, or `cell_size` is not positive.
    pub fn validate(&self) -> Result<()> {
        let coefficients = [
            ("ambient", self.ambient),
            ("diffuse", self.diffuse),
            ("specular", self.specular),
            ("shininess", self.shininess),
        ];
        if let Some((name, value)) = coefficients
            .iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            return Err(RenderError::InvalidShadingParameters(format!(
                "{name} must be finite and >= 0, got {value}"
            )));
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(RenderError::InvalidShadingParameters(format!(
                "cell_size must be finite and > 0, got {}",
                self.cell_size
            )));
        }
        if !self.iso_weight.is_finite() {
            return Err(RenderError::InvalidShadingParameters(
                "iso_weight must be finite".to_string(),
            ));
        }
        let light = &self.light;
        if ![light.position, light.ambient, light.diffuse, light.specular]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(RenderError::InvalidShadingParameters(
                "light components must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Flip lighting on or off and return the new state.
    pub fn toggle_lighting(&mut self) -> bool {
        self.lighting_enabled = !self.lighting_enabled;
        self.lighting_enabled
    }
}

/// Interpolated per-fragment inputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FragmentContext {
    pub tex_coord: Vec3,
    pub eye_position: Vec3,
}

impl FragmentContext {
    /// Build the context of an object-space position in the unit cube.
    pub fn new(position: Vec3, scale: DataScale, model_view: &glam::Mat4) -> Self {
        Self {
            tex_coord: texture_coordinate(position, scale),
            eye_position: model_view.transform_point3(position),
        }
    }
}

/// Everything a program reads while shading one frame.
#[derive(Clone, Copy)]
pub struct FrameInputs<'a> {
    pub sampler: &'a dyn VolumeSampler,
    pub transfer_function: &'a TransferFunction,
    pub params: &'a ShadingParameters,
}

/// A pluggable shading program.
pub trait FragmentProgram: Send + Sync {
    fn label(&self) -> &str;

    /// WGSL module with `vs_main` and `fs_main` entry points, bound to the
    /// layout of [`crate::gpu_renderer::GpuRenderer`].
    fn wgsl_source(&self) -> Cow<'static, str>;

    fn evaluate(&self, ctx: &FragmentContext, frame: &FrameInputs<'_>) -> Vec4;

    /// Called for samples inside the iso band. Returning a color replaces the
    /// shaded result, `None` leaves it untouched.
    fn iso_preview(&self, _ctx: &FragmentContext, _weight: f32) -> Option<Vec4> {
        None
    }
}

/// Affine remap from object space to texture space: `p / D + D - 1`.
pub fn texture_coordinate(position: Vec3, scale: DataScale) -> Vec3 {
    let scale = scale.as_vec3();
    position / scale + scale - Vec3::ONE
}

pub fn in_iso_band(weight: f32, iso_weight: f32) -> bool {
    weight > iso_weight - ISO_TOLERANCE && weight < iso_weight + ISO_TOLERANCE
}

/// Blinn-Phong intensity for a single light, `view` being the eye-space
/// position of the fragment.
pub fn blinn_phong(normal: Vec3, view: Vec3, params: &ShadingParameters) -> Vec3 {
    let light = &params.light;
    let l = (light.position - view).normalize_or_zero();
    let h = (l + view).normalize_or_zero();

    params.ambient * light.ambient
        + params.diffuse * l.dot(normal).max(0.0) * light.diffuse
        + params.specular * normal.dot(h).abs().powf(params.shininess) * light.specular
}

/// Transfer-function lookup lit by the volume gradient.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlinnPhongProgram;

impl BlinnPhongProgram {
    fn normal(ctx: &FragmentContext, frame: &FrameInputs<'_>) -> Option<Vec3> {
        let params = frame.params;
        frame
            .sampler
            .gradient(ctx.tex_coord, params.cell_size)
            .or_else(|| match params.degenerate_normal {
                DegenerateNormal::Unlit => None,
                DegenerateNormal::FacingViewer => {
                    Some((-ctx.eye_position).try_normalize().unwrap_or(Vec3::Z))
                }
            })
    }
}

impl FragmentProgram for BlinnPhongProgram {
    fn label(&self) -> &str {
        "Blinn-Phong Volume Program"
    }

    fn wgsl_source(&self) -> Cow<'static, str> {
        Cow::Borrowed(include_str!("shaders/volume_render.wgsl"))
    }

    fn evaluate(&self, ctx: &FragmentContext, frame: &FrameInputs<'_>) -> Vec4 {
        // Outside the data cube along the slice axis.
        if ctx.tex_coord.z < 0.0 {
            return Vec4::ZERO;
        }

        let params = frame.params;
        let weight = frame.sampler.sample(ctx.tex_coord);

        if in_iso_band(weight, params.iso_weight) {
            if let Some(color) = self.iso_preview(ctx, weight) {
                return color;
            }
        }

        let mut color = frame.transfer_function.lookup(weight);

        if params.lighting_enabled {
            if let Some(normal) = Self::normal(ctx, frame) {
                let intensity = blinn_phong(normal, ctx.eye_position, params);
                color = (color.truncate() * intensity).extend(color.w);
            }
        }

        color
    }
}
