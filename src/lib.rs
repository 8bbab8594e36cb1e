#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod renderer;
pub mod scene;

pub use errors::{Result, TesseraError};
pub use renderer::core::bindless::{BindlessTexture, DEFAULT_SLOT};
pub use renderer::core::resources::{MaterialData, MeshData, MeshId, Submesh, Vertex};
pub use renderer::graph::passes::{CompositePass, GeometryPass, HzbBuildPass, ShadowDepthPass};
pub use renderer::graph::{PassBackend, PassOutput, RenderPass, RenderPassPipeline};
pub use renderer::settings::{BatchSettings, BindlessSettings, RendererSettings};
pub use renderer::{FrameOutcome, Renderer};
pub use scene::{
    Aabb, BoneRange, CameraSnapshot, DirectionalLight, DrawRequest, FrameData, LightLists, ShadowConfig,
};
