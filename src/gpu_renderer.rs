use image::RgbaImage;
use web_time::Instant;
use wgpu::{PollType, util::DeviceExt};

use crate::{
    error::{RenderError, Result},
    gpu_volume::{GpuTransferFunction, GpuVolume},
    proxy::{ProxyVertex, ViewSetup},
    shading::{FragmentProgram, ShadingParameters},
    transfer_function::TransferFunction,
    volume::{DataScale, Volume},
};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct WGPU {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl WGPU {
    /// Request a device from the default adapter.
    pub async fn request() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        log::info!("Using adapter {:?}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Volume Render Device"),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await?;
        Ok(Self { device, queue })
    }
}

/// Uniform block of the volume program.
/// Layout must match WGSL `ShadingUniforms` exactly.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadingUniforms {
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub data_scale: [f32; 3],
    pub iso_weight: f32,
    pub light_position: [f32; 3],
    pub cell_size: f32,
    pub light_ambient: [f32; 3],
    pub k_ambient: f32,
    pub light_diffuse: [f32; 3],
    pub k_diffuse: f32,
    pub light_specular: [f32; 3],
    pub k_specular: f32,
    pub shininess: f32,
    pub lighting_enabled: u32,
    pub degenerate_policy: u32,
    pub _padding: f32,
}

impl ShadingUniforms {
    pub fn new(
        params: &ShadingParameters,
        scale: DataScale,
        view: &ViewSetup,
        aspect: f32,
    ) -> Self {
        let light = &params.light;
        Self {
            model_view: view.model_view().to_cols_array_2d(),
            projection: view.projection(aspect).to_cols_array_2d(),
            data_scale: scale.as_vec3().to_array(),
            iso_weight: params.iso_weight,
            light_position: light.position.to_array(),
            cell_size: params.cell_size,
            light_ambient: light.ambient.to_array(),
            k_ambient: params.ambient,
            light_diffuse: light.diffuse.to_array(),
            k_diffuse: params.diffuse,
            light_specular: light.specular.to_array(),
            k_specular: params.specular,
            shininess: params.shininess,
            lighting_enabled: u32::from(params.lighting_enabled),
            degenerate_policy: params.degenerate_normal.as_uniform(),
            _padding: 0.0,
        }
    }
}

/// Renders a volume into an offscreen RGBA framebuffer with a
/// [`FragmentProgram`].
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
    sampler: wgpu::Sampler,
    volume: GpuVolume,
    transfer_function: GpuTransferFunction,
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    dimensions: (u32, u32), // (width, height)
    view: ViewSetup,
    params: ShadingParameters,
    needs_redraw: bool,
}

impl GpuRenderer {
    /// Upload the volume and transfer function and build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidOutputSize`] for an empty framebuffer,
    /// the validation error of invalid `params` or `view`,
    /// [`RenderError::ResourceExhausted`] if the volume does not fit on the
    /// device and [`RenderError::ShaderCompilation`] if the program's WGSL
    /// fails validation.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        wgpu: WGPU,
        volume: &Volume,
        transfer_function: &TransferFunction,
        params: ShadingParameters,
        program: &dyn FragmentProgram,
        view: ViewSetup,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidOutputSize { width, height });
        }
        params.validate()?;
        view.validate()?;

        let WGPU { device, queue } = wgpu;

        let gpu_volume = GpuVolume::upload(&device, &queue, volume).await?;
        let gpu_transfer_function = GpuTransferFunction::upload(&device, &queue, transfer_function);
        let sampler = GpuVolume::create_sampler(&device);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volume Render Bind Group Layout"),
            entries: &[
                // 3D texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Transfer function
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline = Self::create_pipeline(&device, &bind_group_layout, program).await?;

        let aspect = width as f32 / height as f32;
        let uniforms = ShadingUniforms::new(&params, gpu_volume.scale(), &view, aspect);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shading Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let vertices = view.vertices();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Proxy Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let (target, target_view) = Self::create_target(&device, width, height);

        let bind_group = Self::create_bind_group(
            &device,
            &bind_group_layout,
            &gpu_volume,
            &sampler,
            &gpu_transfer_function,
            &uniform_buffer,
        );

        log::info!(
            "GPU renderer ready: program {:?}, {}x{}, {} slices",
            program.label(),
            width,
            height,
            view.slice_count
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            bind_group,
            uniform_buffer,
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            sampler,
            volume: gpu_volume,
            transfer_function: gpu_transfer_function,
            target,
            target_view,
            dimensions: (width, height),
            view,
            params,
            needs_redraw: true,
        })
    }

    async fn create_pipeline(
        device: &wgpu::Device,
        bind_group_layout: &wgpu::BindGroupLayout,
        program: &dyn FragmentProgram,
    ) -> Result<wgpu::RenderPipeline> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.label()),
            source: wgpu::ShaderSource::Wgsl(program.wgsl_source()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Volume Render Pipeline Layout"),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Volume Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<ProxyVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        match device.pop_error_scope().await {
            Some(error) => Err(RenderError::ShaderCompilation(error.to_string())),
            None => Ok(pipeline),
        }
    }

    fn create_target(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume Render Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        (target, view)
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        volume: &GpuVolume,
        sampler: &wgpu::Sampler,
        transfer_function: &GpuTransferFunction,
        uniform_buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Render Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(volume.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(transfer_function.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        })
    }

    fn rebuild_bind_group(&mut self) {
        self.bind_group = Self::create_bind_group(
            &self.device,
            &self.bind_group_layout,
            &self.volume,
            &self.sampler,
            &self.transfer_function,
            &self.uniform_buffer,
        );
    }

    fn write_uniforms(&mut self) {
        let (width, height) = self.dimensions;
        let aspect = width as f32 / height as f32;
        let uniforms = ShadingUniforms::new(&self.params, self.volume.scale(), &self.view, aspect);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        self.needs_redraw = true;
    }

    pub fn shading_parameters(&self) -> &ShadingParameters {
        &self.params
    }

    /// Flip lighting and schedule a redraw. Returns the new state.
    pub fn toggle_lighting(&mut self) -> bool {
        let enabled = self.params.toggle_lighting();
        log::info!("Lighting {}", if enabled { "enabled" } else { "disabled" });
        self.write_uniforms();
        enabled
    }

    /// # Errors
    ///
    /// Returns [`RenderError::InvalidShadingParameters`] and keeps the
    /// current parameters if `params` is invalid.
    pub fn set_shading_parameters(&mut self, params: ShadingParameters) -> Result<()> {
        params.validate()?;
        self.params = params;
        self.write_uniforms();
        Ok(())
    }

    /// Replace the transfer function texture. The previous texture is
    /// released once in-flight frames complete.
    pub fn set_transfer_function(&mut self, transfer_function: &TransferFunction) {
        self.transfer_function =
            GpuTransferFunction::upload(&self.device, &self.queue, transfer_function);
        self.rebuild_bind_group();
        self.needs_redraw = true;
    }

    /// Upload a new volume and swap it in as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ResourceExhausted`] if the new volume does not
    /// fit; the current volume stays in place.
    pub async fn replace_volume(&mut self, volume: &Volume) -> Result<()> {
        self.volume = GpuVolume::upload(&self.device, &self.queue, volume).await?;
        self.rebuild_bind_group();
        self.write_uniforms();
        Ok(())
    }

    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    pub fn volume(&self) -> &GpuVolume {
        &self.volume
    }

    /// Draw one frame and read it back.
    ///
    /// # Errors
    ///
    /// Returns an error if the readback buffer cannot be mapped.
    pub async fn render(&mut self) -> Result<RgbaImage> {
        let started = Instant::now();
        let (width, height) = self.dimensions;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Volume Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Volume Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.draw(0..self.vertex_count, 0..1);
        }

        let unpadded_bytes_per_row = width * 4;
        let padded_bytes_per_row = unpadded_bytes_per_row
            .div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfoBase {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(PollType::Wait {
            submission_index: None,
            timeout: None,
        });
        receiver.await.map_err(|_| RenderError::ReadbackCanceled)??;

        let data = buffer_slice.get_mapped_range();
        let pixel_data: Vec<u8> = data
            .chunks(padded_bytes_per_row as usize)
            .flat_map(|row| &row[..unpadded_bytes_per_row as usize])
            .copied()
            .collect();
        drop(data);
        staging_buffer.unmap();

        self.needs_redraw = false;
        log::debug!("GPU frame {}x{} in {:?}", width, height, started.elapsed());

        let found = pixel_data.len();
        RgbaImage::from_raw(width, height, pixel_data).ok_or(RenderError::ReadbackSize {
            expected: unpadded_bytes_per_row as usize * height as usize,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cpu_renderer::CpuRenderer,
        enums::DegenerateNormal,
        sampler::CpuVolumeSampler,
        shading::{BlinnPhongProgram, FrameInputs},
        transfer_function::ControlPoint,
    };
    use ndarray::Array3;

    const SIZE: u32 = 32;

    #[test]
    fn uniform_layout_matches_wgsl() {
        // Two mat4x4 plus six 16-byte rows.
        assert_eq!(std::mem::size_of::<ShadingUniforms>(), 224);
        assert_eq!(std::mem::size_of::<ShadingUniforms>() % 16, 0);
    }

    #[test]
    fn uniforms_carry_shading_state() {
        let params = ShadingParameters {
            lighting_enabled: false,
            degenerate_normal: DegenerateNormal::FacingViewer,
            iso_weight: 0.4,
            ..ShadingParameters::default()
        };
        let view = ViewSetup::default();
        let uniforms = ShadingUniforms::new(&params, DataScale::default(), &view, 1.0);
        assert_eq!(uniforms.lighting_enabled, 0);
        assert_eq!(uniforms.degenerate_policy, 1);
        assert_eq!(uniforms.iso_weight, 0.4);
        assert_eq!(uniforms.data_scale, [0.49, 1.0, 0.49]);
        assert_eq!(uniforms.cell_size, 0.005);
        assert_eq!(uniforms.k_ambient, 0.1);
    }

    #[test]
    fn program_source_validates() {
        let source = BlinnPhongProgram.wgsl_source();
        let module = naga::front::wgsl::parse_str(&source)
            .unwrap_or_else(|err| panic!("{}", err.emit_to_string(&source)));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .expect("volume program should validate");

        let entry_points: Vec<_> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
        assert!(entry_points.contains(&"vs_main"));
        assert!(entry_points.contains(&"fs_main"));
    }

    async fn device() -> Option<WGPU> {
        match WGPU::request().await {
            Ok(wgpu) => Some(wgpu),
            Err(err) => {
                eprintln!("skipping GPU test: {err}");
                None
            }
        }
    }

    /// Sphere of intensity 200 in a 24^3 volume of zeros.
    fn sphere(scale: DataScale) -> Volume {
        let data = Array3::from_shape_fn((24, 24, 24), |(z, y, x)| {
            let d = glam::Vec3::new(x as f32, y as f32, z as f32) - glam::Vec3::splat(11.5);
            if d.length() < 8.0 { 200 } else { 0 }
        });
        Volume::new(data, scale, None)
    }

    fn render_cpu(
        volume: &Volume,
        transfer_function: &TransferFunction,
        params: &ShadingParameters,
        view: ViewSetup,
    ) -> RgbaImage {
        let sampler = CpuVolumeSampler::upload(volume);
        let frame = FrameInputs {
            sampler: &sampler,
            transfer_function,
            params,
        };
        CpuRenderer::new(view).render(&BlinnPhongProgram, &frame, volume.scale(), SIZE, SIZE)
    }

    async fn render_gpu(
        wgpu: WGPU,
        volume: &Volume,
        transfer_function: &TransferFunction,
        params: ShadingParameters,
        view: ViewSetup,
    ) -> RgbaImage {
        let mut renderer = GpuRenderer::new(
            wgpu,
            volume,
            transfer_function,
            params,
            &BlinnPhongProgram,
            view,
            SIZE,
            SIZE,
        )
        .await
        .unwrap();
        renderer.render().await.unwrap()
    }

    fn max_channel_difference(a: &RgbaImage, b: &RgbaImage) -> u8 {
        a.as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(x, y)| x.abs_diff(*y))
            .max()
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn zero_output_size_is_rejected() {
        let Some(wgpu) = device().await else {
            return;
        };
        let volume = sphere(DataScale::UNIFORM);
        let result = GpuRenderer::new(
            wgpu,
            &volume,
            &TransferFunction::grayscale(),
            ShadingParameters::default(),
            &BlinnPhongProgram,
            ViewSetup::default(),
            0,
            64,
        )
        .await;
        assert!(matches!(
            result,
            Err(RenderError::InvalidOutputSize {
                width: 0,
                height: 64
            })
        ));
    }

    #[tokio::test]
    async fn gpu_frame_matches_cpu_reference() {
        let Some(wgpu) = device().await else {
            return;
        };
        // Default scale clips the front of the cube, negative depth must stay
        // transparent on both paths.
        let volume = sphere(DataScale::default());
        let transfer_function = TransferFunction::grayscale();
        let params = ShadingParameters {
            lighting_enabled: false,
            ..ShadingParameters::default()
        };
        let view = ViewSetup {
            slice_count: 8,
            ..ViewSetup::default()
        };

        let cpu = render_cpu(&volume, &transfer_function, &params, view);
        let gpu = render_gpu(wgpu, &volume, &transfer_function, params, view).await;

        assert!(cpu.pixels().any(|p| p[3] > 0));
        // LUT quantization plus one rounding per blended slice.
        assert!(max_channel_difference(&cpu, &gpu) <= 12);
    }

    #[tokio::test]
    async fn gpu_flat_region_keeps_transfer_color() {
        let Some(wgpu) = device().await else {
            return;
        };
        let volume = Volume::new(Array3::zeros((8, 8, 8)), DataScale::UNIFORM, None);
        let red = [1.0, 0.0, 0.0, 1.0];
        let points = vec![ControlPoint::new(0.0, red), ControlPoint::new(1.0, red)];
        let transfer_function = TransferFunction::new(points).unwrap();
        let params = ShadingParameters::default();
        let view = ViewSetup {
            slice_count: 4,
            ..ViewSetup::default()
        };

        let cpu = render_cpu(&volume, &transfer_function, &params, view);
        let gpu = render_gpu(wgpu, &volume, &transfer_function, params, view).await;

        let centre = SIZE / 2;
        assert_eq!(gpu.get_pixel(centre, centre).0, [255, 0, 0, 255]);
        assert_eq!(max_channel_difference(&cpu, &gpu), 0);
    }
}
