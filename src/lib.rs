//! # DICOM-volume-render library
//!
//! This crate renders a stack of decoded DICOM slices as a semi-transparent,
//! lit volume.

//!
//! Slices are window/level normalized, stacked into a dense 3D grid and
//! uploaded as a trilinearly filtered 3D texture. Each frame a stack of
//! proxy quads is rasterized and every fragment:
//!  - samples the volume,
//!  - maps the intensity to color and opacity through a transfer function,
//!  - optionally lights the result with Blinn-Phong using the
//!    finite-difference gradient of the volume as normal.
//!
//!  The same [`FragmentProgram`] runs on the GPU (wgpu, WGSL) and on the CPU
//!  (rayon) so frames can be produced without a graphics adapter.
//!  Decoding DICOM files and sorting them by position is left to the caller:
//!  the loader expects slices already in acquisition order.
//!
//!  Volumes use a single axis order throughout: arrays are
//!  (depth, height, width) and texture coordinates are (x = width,
//!  y = height, z = depth).
//!
//! # Examples
//!
//! ## Rendering a slice stack on the CPU
//!
//! ```no_run
//! # use dicom_volume_render::{
//! #     BlinnPhongProgram, CpuRenderer, CpuVolumeSampler, FrameInputs, LoadOptions,
//! #     ScalarSlice, ShadingParameters, TransferFunction, VolumeLoader,
//! # };
//! # use ndarray::Array2;
//! let slices: Vec<ScalarSlice<i16>> = (0..64)
//!     .map(|i| ScalarSlice::new(i, Array2::from_elem((128, 128), 400)))
//!     .collect();
//! let volume = VolumeLoader::load_from_slices(&slices, &LoadOptions::default())
//!     .expect("slices should share one shape");
//! let sampler = CpuVolumeSampler::upload(&volume);
//! let transfer_function = TransferFunction::default();
//! let params = ShadingParameters::default();
//! let frame = FrameInputs {
//!     sampler: &sampler,
//!     transfer_function: &transfer_function,
//!     params: &params,
//! };
//! let image = CpuRenderer::default().render(&BlinnPhongProgram, &frame, volume.scale(), 256, 256);
//! image.save("result.png").expect("should have saved the frame");
//! ```

pub mod config;
pub mod cpu_renderer;
pub mod enums;
pub mod error;
pub mod gpu_renderer;
pub mod gpu_volume;
mod interpolator;
pub mod proxy;
pub mod sampler;
pub mod shading;
pub mod transfer_function;
pub mod volume;
pub mod volume_loader;
pub mod window_level;

pub use config::RenderConfig;
pub use cpu_renderer::CpuRenderer;
pub use enums::{DegenerateNormal, Processor};
pub use error::{RenderError, Result};
pub use gpu_renderer::{GpuRenderer, WGPU};
pub use gpu_volume::GpuVolume;
pub use proxy::ViewSetup;
pub use sampler::{CpuVolumeSampler, VolumeSampler};
pub use shading::{
    BlinnPhongProgram, FragmentContext, FragmentProgram, FrameInputs, ShadingParameters,
};
pub use transfer_function::{ControlPoint, TransferFunction};
pub use volume::{DataScale, Volume, VolumeShape, VoxelSpacing};
pub use volume_loader::{LoadOptions, ScalarSlice, VolumeLoader};
pub use window_level::WindowLevel;
