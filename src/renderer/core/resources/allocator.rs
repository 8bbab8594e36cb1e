//! Per-Frame Buffer Allocator
//!
//! A fixed-capacity GPU array replicated once per frame slot, fed from a
//! single CPU staging vector. Each frame the owner resets the staging data,
//! pushes records, and uploads everything with one `write_buffer` into the
//! slot's copy. Capacity never grows: a full allocator rejects further pushes
//! so the caller can log and drop.

use bytemuck::Pod;

/// Fixed-capacity, frame-slot-replicated GPU array of `T`.
pub struct FrameBufferAllocator<T: Pod> {
    /// CPU-side staging data for the frame being recorded
    host_data: Vec<T>,
    /// Maximum element count
    capacity: u32,
    /// One GPU buffer per frame slot
    buffers: Vec<wgpu::Buffer>,
}

impl<T: Pod> FrameBufferAllocator<T> {
    /// Creates `frame_count` buffers of `capacity` elements each.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        capacity: u32,
        frame_count: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let size = (u64::from(capacity.max(1)) * Self::stride()).max(16);
        let buffers = (0..frame_count)
            .map(|slot| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{label} [frame {slot}]")),
                    size,
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        log::debug!("{label}: {frame_count} x {capacity} elements ({size} bytes each)");

        Self {
            host_data: Vec::with_capacity(capacity as usize),
            capacity,
            buffers,
        }
    }

    /// Byte size of one element.
    #[inline]
    #[must_use]
    pub fn stride() -> u64 {
        std::mem::size_of::<T>() as u64
    }

    /// Reset at the beginning of each frame
    pub fn reset(&mut self) {
        self.host_data.clear();
    }

    /// Replaces the staging data with `data`.
    ///
    /// Returns `false` (and stores nothing) when `data` exceeds the capacity.
    pub fn fill(&mut self, data: &[T]) -> bool {
        self.host_data.clear();
        if data.len() > self.capacity as usize {
            return false;
        }
        self.host_data.extend_from_slice(data);
        true
    }

    /// Uploads the staging data into the buffer of `slot` with one copy.
    pub fn upload(&self, queue: &wgpu::Queue, slot: usize) {
        if self.host_data.is_empty() {
            return;
        }
        if let Some(buffer) = self.buffers.get(slot) {
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(&self.host_data));
        }
    }

    /// GPU buffer backing `slot`.
    #[inline]
    #[must_use]
    pub fn buffer(&self, slot: usize) -> Option<&wgpu::Buffer> {
        self.buffers.get(slot)
    }

    #[inline]
    #[must_use]
    pub fn host_data(&self) -> &[T] {
        &self.host_data
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Element count staged for the current frame
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.host_data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.host_data.is_empty()
    }
}
