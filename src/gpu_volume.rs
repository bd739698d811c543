use crate::{
    error::{RenderError, Result},
    transfer_function::{TRANSFER_FUNCTION_RESOLUTION, TransferFunction},
    volume::{DataScale, Volume, VolumeShape},
};

/// A volume resident in GPU memory as a trilinearly filtered 3D texture.
pub struct GpuVolume {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    shape: VolumeShape,
    scale: DataScale,
}

impl GpuVolume {
    /// Check that a volume fits into a single 3D texture of the device.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ResourceExhausted`] if any dimension exceeds
    /// `max_texture_dimension_3d`.
    pub fn check_limits(shape: VolumeShape, limits: &wgpu::Limits) -> Result<()> {
        let max = limits.max_texture_dimension_3d as usize;
        let axes = [
            ("width", shape.width),
            ("height", shape.height),
            ("depth", shape.depth),
        ];
        match axes.iter().find(|(_, size)| *size > max) {
            Some((axis, size)) => Err(RenderError::ResourceExhausted {
                shape,
                reason: format!("{axis} {size} exceeds max_texture_dimension_3d {max}"),
            }),
            None => Ok(()),
        }
    }

    /// Transfer the volume to the device. Blocks until the data is queued.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ResourceExhausted`] if the volume exceeds the
    /// device limits or the device runs out of memory. Not retried.
    pub async fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        volume: &Volume,
    ) -> Result<Self> {
        let shape = volume.shape();
        Self::check_limits(shape, &device.limits())?;

        let (width, height, depth) = shape.texture_extent();
        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        // (depth, height, width) row-major matches the texture's x-fastest layout
        let data = volume.as_bytes();
        queue.write_texture(
            wgpu::TexelCopyTextureInfoBase {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            texture_size,
        );

        if let Some(error) = device.pop_error_scope().await {
            return Err(RenderError::ResourceExhausted {
                shape,
                reason: error.to_string(),
            });
        }

        log::info!(
            "Uploaded volume {:?} ({} bytes) to GPU",
            shape,
            shape.voxel_count()
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            shape,
            scale: volume.scale(),
        })
    }

    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    pub fn scale(&self) -> DataScale {
        self.scale
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Linear filtering, clamped at the edges.
    pub fn create_sampler(device: &wgpu::Device) -> wgpu::Sampler {
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }
}

/// The transfer function as a single-row 2D lookup texture.
///
/// 1D textures read back as zero on the GL backend, a `width x 1` 2D texture
/// is readable everywhere.
pub struct GpuTransferFunction {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTransferFunction {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        transfer_function: &TransferFunction,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: TRANSFER_FUNCTION_RESOLUTION,
            height: 1,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Transfer Function Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let lut = transfer_function.to_lut(TRANSFER_FUNCTION_RESOLUTION);
        queue.write_texture(
            wgpu::TexelCopyTextureInfoBase {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&lut),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(TRANSFER_FUNCTION_RESOLUTION * 4),
                rows_per_image: Some(1),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self { texture, view }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_within_limits() {
        let limits = wgpu::Limits::downlevel_defaults();
        assert!(GpuVolume::check_limits(VolumeShape::new(256, 256, 256), &limits).is_ok());
    }

    #[test]
    fn oversized_axis_is_rejected() {
        let limits = wgpu::Limits::downlevel_defaults();
        let max = limits.max_texture_dimension_3d as usize;
        let err = GpuVolume::check_limits(VolumeShape::new(max + 1, 64, 64), &limits).unwrap_err();
        match err {
            RenderError::ResourceExhausted { shape, reason } => {
                assert_eq!(shape.depth, max + 1);
                assert!(reason.starts_with("depth"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
