//! Mesh registry
//!
//! Stand-in for the external asset system: uploads vertex/index data once and
//! hands out a stable [`MeshId`] that draw requests refer to. The batcher only
//! needs the CPU-side [`MeshLayout`]; draw calls additionally need the GPU
//! buffers in [`GpuMesh`].

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use crate::scene::Aabb;

new_key_type! {
    /// Identity of an uploaded mesh asset. Draw requests are bucketed by it.
    pub struct MeshId;
}

/// Interleaved vertex consumed by the geometry and shadow shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Uint16x4,
        4 => Float32x4,
    ];

    #[must_use]
    pub const fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    #[must_use]
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
            joints: [0; 4],
            weights: [0.0; 4],
        }
    }
}

/// GPU material record; one per material of each mesh group, indexed by
/// the instance record's material index.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    pub base_color: [f32; 4],
    /// Bindless slot of the albedo texture.
    pub albedo_slot: u32,
    /// Bindless slot of the normal map.
    pub normal_slot: u32,
    pub metallic: f32,
    pub roughness: f32,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
            albedo_slot: 0,
            normal_slot: 0,
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

/// A draw range inside a mesh's shared vertex/index buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Submesh {
    pub base_index: u32,
    pub index_count: u32,
    pub base_vertex: i32,
    /// Transform relative to the mesh root.
    pub transform: Mat4,
    /// Index into the owning mesh's material list.
    pub material_index: u32,
}

/// CPU-side description the batcher needs to build commands for a mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshLayout {
    pub submeshes: SmallVec<[Submesh; 4]>,
    pub materials: SmallVec<[MaterialData; 4]>,
    /// Local-space bounds of all submeshes.
    pub bounds: Aabb,
}

impl MeshLayout {
    #[inline]
    #[must_use]
    pub fn submesh_count(&self) -> u32 {
        self.submeshes.len() as u32
    }

    /// Materials the batcher emits for this mesh. A mesh without materials
    /// still gets one default entry so its records never index a neighbor's.
    #[inline]
    #[must_use]
    pub fn material_count(&self) -> u32 {
        self.materials.len().max(1) as u32
    }
}

/// Resolves mesh identities to layouts.
pub trait MeshLookup {
    fn layout(&self, id: MeshId) -> Option<&MeshLayout>;
}

impl MeshLookup for SlotMap<MeshId, MeshLayout> {
    fn layout(&self, id: MeshId) -> Option<&MeshLayout> {
        self.get(id)
    }
}

/// CPU mesh data ready for upload.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub label: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<Submesh>,
    pub materials: Vec<MaterialData>,
}

impl MeshData {
    /// Computes local bounds from the indexed vertices of every submesh.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        let points = self.submeshes.iter().flat_map(|submesh| {
            let start = submesh.base_index as usize;
            let end = (start + submesh.index_count as usize).min(self.indices.len());
            self.indices[start.min(end)..end].iter().filter_map(move |&index| {
                let vertex = usize::try_from(i64::from(index) + i64::from(submesh.base_vertex)).ok()?;
                self.vertices
                    .get(vertex)
                    .map(|v| submesh.transform.transform_point3(Vec3::from(v.position)))
            })
        });
        Aabb::from_points(points)
    }

    #[must_use]
    pub fn layout(&self) -> MeshLayout {
        MeshLayout {
            submeshes: self.submeshes.iter().copied().collect(),
            materials: self.materials.iter().copied().collect(),
            bounds: self.bounds(),
        }
    }

    /// Unit cube centered on the origin with one submesh and one material.
    #[must_use]
    pub fn cube(material: MaterialData) -> Self {
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Y, Vec3::Z),
            (Vec3::Y, Vec3::NEG_Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::Z, Vec3::X),
            (Vec3::Z, Vec3::Y, Vec3::X),
            (Vec3::NEG_Z, Vec3::Y, Vec3::NEG_X),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, up, right) in FACES {
            let base = vertices.len() as u32;
            let center = normal * 0.5;
            for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                let position = center + right * (u - 0.5) + up * (v - 0.5);
                vertices.push(Vertex::new(position, normal, [u, 1.0 - v]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self {
            label: "Cube".to_string(),
            submeshes: vec![Submesh {
                base_index: 0,
                index_count: indices.len() as u32,
                base_vertex: 0,
                transform: Mat4::IDENTITY,
                material_index: 0,
            }],
            vertices,
            indices,
            materials: vec![material],
        }
    }
}

/// Uploaded mesh: layout plus its GPU buffers.
pub struct GpuMesh {
    pub layout: MeshLayout,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
}

/// Owns every uploaded mesh for the lifetime of the renderer.
#[derive(Default)]
pub struct MeshRegistry {
    meshes: SlotMap<MeshId, GpuMesh>,
}

impl MeshRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload(&mut self, device: &wgpu::Device, data: &MeshData) -> MeshId {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertices", data.label)),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Indices", data.label)),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let id = self.meshes.insert(GpuMesh {
            layout: data.layout(),
            vertex_buffer,
            index_buffer,
        });
        log::debug!(
            "Uploaded mesh '{}' ({} vertices, {} submeshes) as {id:?}",
            data.label,
            data.vertices.len(),
            data.submeshes.len()
        );
        id
    }

    pub fn remove(&mut self, id: MeshId) -> Option<GpuMesh> {
        self.meshes.remove(id)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: MeshId) -> Option<&GpuMesh> {
        self.meshes.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl MeshLookup for MeshRegistry {
    fn layout(&self, id: MeshId) -> Option<&MeshLayout> {
        self.meshes.get(id).map(|mesh| &mesh.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_matches_attribute_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 56);
        assert_eq!(std::mem::size_of::<MaterialData>(), 32);
    }

    #[test]
    fn cube_bounds_are_unit() {
        let cube = MeshData::cube(MaterialData::default());
        let bounds = cube.bounds();
        assert_eq!(bounds.min, Vec3::splat(-0.5));
        assert_eq!(bounds.max, Vec3::splat(0.5));
        assert_eq!(cube.indices.len(), 36);
    }

    #[test]
    fn bounds_respect_submesh_transform() {
        let mut cube = MeshData::cube(MaterialData::default());
        cube.submeshes[0].transform = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let bounds = cube.bounds();
        assert_eq!(bounds.min.y, 1.5);
        assert_eq!(bounds.max.y, 2.5);
    }
}
