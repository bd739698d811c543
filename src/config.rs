//! Render configuration loaded from JSON.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    enums::Processor,
    error::{RenderError, Result},
    proxy::ViewSetup,
    shading::ShadingParameters,
    transfer_function::TransferFunction,
    volume::DataScale,
    volume_loader::LoadOptions,
    window_level::WindowLevel,
};

/// Everything the renderer can be configured with. Missing fields take
/// their defaults; invalid values are rejected while loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub window_level: WindowLevel,
    /// Anisotropy correction used when the series carries no spacing.
    pub fallback_scale: DataScale,
    pub shading: ShadingParameters,
    pub transfer_function: TransferFunction,
    pub view: ViewSetup,
    pub width: u32,
    pub height: u32,
    pub processor: Processor,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_level: WindowLevel::default(),
            fallback_scale: DataScale::default(),
            shading: ShadingParameters::default(),
            transfer_function: TransferFunction::default(),
            view: ViewSetup::default(),
            width: 512,
            height: 512,
            processor: Processor::default(),
        }
    }
}

impl RenderConfig {
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or holds invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values serde cannot reject on its own.
    ///
    /// # Errors
    ///
    /// Returns the first invalid output size, shading or view value.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidOutputSize {
                width: self.width,
                height: self.height,
            });
        }
        self.shading.validate()?;
        self.view.validate()
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::from_json_str(&fs::read_to_string(path.as_ref())?)?;
        log::debug!("Loaded render config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            window_level: self.window_level,
            spacing: None,
            fallback_scale: self.fallback_scale,
        }
    }
}
