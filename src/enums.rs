use serde::{Deserialize, Serialize};

/// Where frames are shaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Processor {
    CPU,
    #[default]
    GPU,
}

/// What the lit shading path does when the estimated gradient vanishes
/// (flat regions of the volume).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegenerateNormal {
    /// Keep the transfer-function color as is.
    #[default]
    Unlit,
    /// Light the sample with a normal pointing at the eye.
    FacingViewer,
}

impl DegenerateNormal {
    /// Value written into the shader uniforms.
    pub fn as_uniform(self) -> u32 {
        match self {
            DegenerateNormal::Unlit => 0,
            DegenerateNormal::FacingViewer => 1,
        }
    }
}
