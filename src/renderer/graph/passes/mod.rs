//! Built-in render passes, in execution order:
//!
//! 1. [`ShadowDepthPass`]: light-space depth for the first shadow caster
//! 2. [`GeometryPass`]: culled indirect scene draw into HDR attachments
//! 3. [`HzbBuildPass`]: depth pyramid for next frame's occlusion test
//! 4. [`CompositePass`]: tonemap onto the swapchain image

mod composite;
mod geometry;
mod hzb;
mod shadow;

pub use composite::CompositePass;
pub use geometry::{COLOR_FORMAT, GeometryOutput, GeometryPass, VELOCITY_FORMAT};
pub use hzb::HzbBuildPass;
pub use shadow::{SHADOW_FORMAT, ShadowDepthPass, ShadowOutput};
