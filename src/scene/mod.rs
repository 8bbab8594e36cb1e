//! Scene-side inputs of the renderer.
//!
//! The scene graph itself lives outside this crate. This module only defines
//! the snapshot types it hands over each frame:
//! - CameraSnapshot / Frustum: view parameters and culling planes
//! - Aabb: local and world bounds
//! - DrawRequest / FrameData: per-frame submission
//! - Light lists and fog volumes for leaf passes

pub mod bounds;
pub mod camera;
pub mod draw;
pub mod light;

pub use bounds::Aabb;
pub use camera::{CameraSnapshot, Frustum};
pub use draw::{BoneRange, DrawRequest, FrameData};
pub use light::{DirectionalLight, FogVolume, LightLists, PointLight, RectLight, ShadowConfig};
