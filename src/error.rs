//! Error types for loading, configuring and rendering volumes.

use thiserror::Error;

use crate::volume::VolumeShape;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No slices supplied")]
    EmptyVolume,

    #[error("Slice {slice} has shape {found:?}, expected {expected:?} (height, width)")]
    InvalidVolumeShape {
        slice: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid window/level: window must be finite and >= 1, got {window}")]
    InvalidWindowLevel { window: f64 },

    #[error("Invalid transfer function: {0}")]
    InvalidTransferFunction(String),

    #[error("Invalid data scale {scale:?}: components must be finite and > 0")]
    InvalidDataScale { scale: [f32; 3] },

    #[error("Invalid shading parameters: {0}")]
    InvalidShadingParameters(String),

    #[error("Invalid view setup: {0}")]
    InvalidViewSetup(String),

    #[error("Invalid output size {width}x{height}: both sides must be > 0")]
    InvalidOutputSize { width: u32, height: u32 },

    #[error("Volume {shape:?} exceeds device limits: {reason}")]
    ResourceExhausted { shape: VolumeShape, reason: String },

    #[error("No suitable graphics adapter: {0}")]
    AdapterUnavailable(#[from] wgpu::RequestAdapterError),

    #[error("Failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Readback was canceled before completion")]
    ReadbackCanceled,

    #[error("Readback returned {found} bytes, expected {expected}")]
    ReadbackSize { expected: usize, found: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, RenderError>;
