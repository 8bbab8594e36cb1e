//! GPU resource helpers shared by the passes.
//!
//! - allocator.rs: FrameBufferAllocator, one fixed GPU array per frame slot
//! - mesh.rs: MeshRegistry and the vertex/material formats
//! - tracked.rs: Tracked ids for attachment identity

mod allocator;
mod mesh;
mod tracked;

pub use allocator::FrameBufferAllocator;
pub use mesh::{
    GpuMesh, MaterialData, MeshData, MeshId, MeshLayout, MeshLookup, MeshRegistry, Submesh, Vertex,
};
pub use tracked::{CachedBindGroup, ResourceId, Tracked};
