use std::path::PathBuf;

use dicom_volume_render::{
    BlinnPhongProgram, CpuRenderer, CpuVolumeSampler, FrameInputs, GpuRenderer, Processor,
    RenderConfig, RenderError, ScalarSlice, Volume, VolumeLoader, VoxelSpacing, WGPU,
};
use image::RgbaImage;
use ndarray::Array2;

const PHANTOM_SIZE: usize = 128;

/// Synthetic CT phantom in Hounsfield units: air around a soft tissue
/// sphere with a bone shell.
fn phantom_slices() -> Vec<ScalarSlice<i16>> {
    let center = PHANTOM_SIZE as f32 / 2.0;
    (0..PHANTOM_SIZE)
        .map(|z| {
            let pixels = Array2::from_shape_fn((PHANTOM_SIZE, PHANTOM_SIZE), |(y, x)| {
                let dx = x as f32 - center;
                let dy = y as f32 - center;
                let dz = z as f32 - center;
                let radius = (dx * dx + dy * dy + dz * dz).sqrt() / center;
                match radius {
                    r if r < 0.6 => 40,
                    r if r < 0.8 => 1200,
                    _ => -1000,
                }
            });
            ScalarSlice::new(z, pixels)
        })
        .collect()
}

async fn render_gpu(config: &RenderConfig, volume: &Volume) -> Result<RgbaImage, RenderError> {
    let wgpu = WGPU::request().await?;
    let mut renderer = GpuRenderer::new(
        wgpu,
        volume,
        &config.transfer_function,
        config.shading,
        &BlinnPhongProgram,
        config.view,
        config.width,
        config.height,
    )
    .await?;
    renderer.render().await
}

fn render_cpu(config: &RenderConfig, volume: &Volume) -> RgbaImage {
    let sampler = CpuVolumeSampler::upload(volume);
    let frame = FrameInputs {
        sampler: &sampler,
        transfer_function: &config.transfer_function,
        params: &config.shading,
    };
    CpuRenderer::new(config.view).render(
        &BlinnPhongProgram,
        &frame,
        volume.scale(),
        config.width,
        config.height,
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => RenderConfig::load(&path).expect("should have loaded the render config"),
        None => RenderConfig::default(),
    };

    let mut options = config.load_options();
    options.spacing = Some(VoxelSpacing {
        column: 1.0,
        row: 1.0,
        slice: 1.0,
    });
    let volume = VolumeLoader::load_from_slices(&phantom_slices(), &options)
        .expect("should have assembled the phantom");

    let image = match config.processor {
        Processor::GPU => match render_gpu(&config, &volume).await {
            Ok(image) => image,
            Err(err @ RenderError::AdapterUnavailable(_))
            | Err(err @ RenderError::DeviceCreationFailed(_)) => {
                log::warn!("No GPU available ({err}), rendering on the CPU");
                render_cpu(&config, &volume)
            }
            Err(err) => panic!("GPU rendering failed: {err}"),
        },
        Processor::CPU => render_cpu(&config, &volume),
    };

    image
        .save("result.png")
        .expect("should have saved result.png");
}
