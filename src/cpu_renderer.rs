use glam::{Vec3, Vec4};
use image::RgbaImage;
use rayon::prelude::*;
use web_time::Instant;

use crate::{
    proxy::ViewSetup,
    shading::{FragmentContext, FragmentProgram, FrameInputs},
    volume::DataScale,
};

/// Reference renderer evaluating a [`FragmentProgram`] on the CPU with the
/// same proxy geometry and blending as the GPU pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuRenderer {
    pub view: ViewSetup,
}

impl CpuRenderer {
    pub fn new(view: ViewSetup) -> Self {
        Self { view }
    }

    pub fn render(
        &self,
        program: &dyn FragmentProgram,
        frame: &FrameInputs<'_>,
        scale: DataScale,
        width: u32,
        height: u32,
    ) -> RgbaImage {
        let started = Instant::now();
        let model_view = self.view.model_view();

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map(|row| {
                (0..width)
                    .flat_map(|column| {
                        let color = self
                            .view
                            .pixel_to_object(column, row, width, height)
                            .map_or(Vec4::ZERO, |(x, y)| {
                                self.composite(program, frame, scale, &model_view, x, y)
                            });
                        Self::to_rgba8(color)
                    })
                    .collect::<Vec<u8>>()
            })
            .collect();

        log::debug!(
            "CPU frame {}x{} with {} slices in {:?}",
            width,
            height,
            self.view.slice_count,
            started.elapsed()
        );

        // Buffer length is width * height * 4 by construction.
        RgbaImage::from_raw(width, height, pixel_data)
            .unwrap_or_else(|| RgbaImage::new(width, height))
    }

    fn composite(
        &self,
        program: &dyn FragmentProgram,
        frame: &FrameInputs<'_>,
        scale: DataScale,
        model_view: &glam::Mat4,
        x: f32,
        y: f32,
    ) -> Vec4 {
        (0..self.view.slice_count.max(1)).fold(Vec4::ZERO, |dst, index| {
            let position = Vec3::new(x, y, self.view.slice_depth(index));
            let ctx = FragmentContext::new(position, scale, model_view);
            blend_over(program.evaluate(&ctx, frame), dst)
        })
    }

    fn to_rgba8(color: Vec4) -> [u8; 4] {
        (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0)
            .round()
            .to_array()
            .map(|c| c as u8)
    }
}

/// Straight-alpha "over" blending, matching `wgpu::BlendState::ALPHA_BLENDING`.
pub fn blend_over(src: Vec4, dst: Vec4) -> Vec4 {
    let src_alpha = src.w.clamp(0.0, 1.0);
    let rgb = src.truncate() * src_alpha + dst.truncate() * (1.0 - src_alpha);
    let alpha = src.w + dst.w * (1.0 - src_alpha);
    rgb.extend(alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sampler::CpuVolumeSampler,
        shading::{BlinnPhongProgram, ShadingParameters},
        transfer_function::TransferFunction,
        volume::Volume,
    };
    use ndarray::Array3;

    fn render(fill: u8, scale: DataScale) -> RgbaImage {
        let volume = Volume::new(Array3::from_elem((4, 4, 4), fill), scale, None);
        let sampler = CpuVolumeSampler::upload(&volume);
        let tf = TransferFunction::grayscale();
        let params = ShadingParameters::default();
        let frame = FrameInputs {
            sampler: &sampler,
            transfer_function: &tf,
            params: &params,
        };
        let renderer = CpuRenderer::new(ViewSetup {
            slice_count: 8,
            ..ViewSetup::default()
        });
        renderer.render(&BlinnPhongProgram, &frame, volume.scale(), 32, 32)
    }

    #[test]
    fn empty_volume_is_transparent() {
        let image = render(0, DataScale::UNIFORM);
        assert_eq!(image.dimensions(), (32, 32));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn dense_volume_covers_the_cube_only() {
        let image = render(255, DataScale::UNIFORM);
        assert_eq!(image.get_pixel(16, 16).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let scale = DataScale::default();
        assert_eq!(render(180, scale), render(180, scale));
    }

    #[test]
    fn blend_over_matches_alpha_blending() {
        let dst = Vec4::new(0.0, 0.0, 1.0, 1.0);
        let src = Vec4::new(1.0, 0.0, 0.0, 0.25);
        let out = blend_over(src, dst);
        assert_eq!(out, Vec4::new(0.25, 0.0, 0.75, 1.0));
        assert_eq!(blend_over(Vec4::ZERO, dst), dst);
    }
}
