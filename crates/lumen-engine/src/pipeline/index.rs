use wgpu::util::DeviceExt;

use crate::value::ScalarValue;

/// Engine-owned `Uint32` index buffer.
pub struct IndexBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

impl IndexBuffer {
    /// Uploads the 32-bit view of each value. Returns `None` for an empty
    /// slice, which selects non-indexed drawing.
    pub fn new(device: &wgpu::Device, values: &[ScalarValue]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let indices: Vec<u32> = values.iter().map(ScalarValue::as_u32).collect();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen index buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Some(Self {
            buffer,
            count: indices.len() as u32,
        })
    }

    #[inline]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn format(&self) -> wgpu::IndexFormat {
        wgpu::IndexFormat::Uint32
    }

    pub fn destroy(self) {
        self.buffer.destroy();
    }
}
