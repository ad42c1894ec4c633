//! Caller-owned vertex data.
//!
//! A [`VertexBuffer`] lives on the CPU and is only borrowed by draws. Each
//! engine keeps its own GPU copy, keyed by [`VertexBufferId`] and refreshed
//! when the buffer's generation changes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::ScalarValue;

use super::error::{PipelineError, Result};

/// One attribute inside an interleaved vertex.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: wgpu::VertexFormat,
    pub offset: u64,
}

/// Interleaved layout of a single vertex stream.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Tightly packs `formats` at consecutive shader locations starting at 0.
    pub fn packed(formats: &[wgpu::VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, &format)| {
                let attr = VertexAttribute {
                    location: location as u32,
                    format,
                    offset,
                };
                offset += format.size();
                attr
            })
            .collect();
        Self {
            stride: offset,
            attributes,
        }
    }

    /// Checks the layout against device limits and WebGPU alignment rules.
    pub fn validate(&self, limits: &wgpu::Limits) -> Result<()> {
        let fail = |msg: String| Err(PipelineError::PipelineBuild(msg));

        if self.attributes.len() > limits.max_vertex_attributes as usize {
            return fail(format!(
                "{} vertex attributes exceed the device limit of {}",
                self.attributes.len(),
                limits.max_vertex_attributes
            ));
        }
        if self.stride > u64::from(limits.max_vertex_buffer_array_stride) {
            return fail(format!(
                "vertex stride {} exceeds the device limit of {}",
                self.stride, limits.max_vertex_buffer_array_stride
            ));
        }
        if self.stride % 4 != 0 {
            return fail(format!("vertex stride {} is not a multiple of 4", self.stride));
        }

        for (i, attr) in self.attributes.iter().enumerate() {
            if attr.location >= limits.max_vertex_attributes {
                return fail(format!("vertex attribute location {} out of range", attr.location));
            }
            if self.attributes[..i].iter().any(|a| a.location == attr.location) {
                return fail(format!("vertex attribute location {} used twice", attr.location));
            }
            if attr.offset % attr.format.size().min(4) != 0 {
                return fail(format!(
                    "vertex attribute at location {} has misaligned offset {}",
                    attr.location, attr.offset
                ));
            }
            if attr.offset + attr.format.size() > self.stride {
                return fail(format!(
                    "vertex attribute at location {} overruns the {}-byte stride",
                    attr.location, self.stride
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: a.format,
                offset: a.offset,
                shader_location: a.location,
            })
            .collect()
    }
}

/// Process-unique identity of a [`VertexBuffer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexBufferId(u64);

impl VertexBufferId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        VertexBufferId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Interleaved vertex data plus its layout.
///
/// Every mutation bumps [`generation`](Self::generation) so engines know their
/// uploaded copy is stale. Clones receive a fresh id.
pub struct VertexBuffer {
    id: VertexBufferId,
    generation: u64,
    layout: VertexLayout,
    data: Vec<u8>,
}

impl VertexBuffer {
    pub fn new(layout: VertexLayout) -> Self {
        Self {
            id: VertexBufferId::next(),
            generation: 0,
            layout,
            data: Vec::new(),
        }
    }

    /// Builds a buffer from plain-old-data vertices matching `layout`.
    pub fn from_pod<T: bytemuck::Pod>(layout: VertexLayout, vertices: &[T]) -> Result<Self> {
        let mut buffer = Self::new(layout);
        buffer.set_data(bytemuck::cast_slice(vertices).to_vec())?;
        Ok(buffer)
    }

    /// Builds a packed buffer from rows of scalar values, one row per vertex,
    /// one value per attribute component.
    pub fn from_rows(formats: &[wgpu::VertexFormat], rows: &[Vec<ScalarValue>]) -> Result<Self> {
        let mut buffer = Self::new(VertexLayout::packed(formats));
        for row in rows {
            buffer.push_vertex(row)?;
        }
        Ok(buffer)
    }

    #[inline]
    pub fn id(&self) -> VertexBufferId {
        self.id
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn vertex_count(&self) -> u64 {
        if self.layout.stride == 0 {
            return 0;
        }
        self.data.len() as u64 / self.layout.stride
    }

    /// Replaces the raw bytes. Length must be a whole number of vertices.
    pub fn set_data(&mut self, data: Vec<u8>) -> Result<()> {
        if self.layout.stride == 0 || data.len() as u64 % self.layout.stride != 0 {
            return Err(PipelineError::InvalidArgument(format!(
                "{} bytes is not a whole number of {}-byte vertices",
                data.len(),
                self.layout.stride
            )));
        }
        self.data = data;
        self.generation += 1;
        Ok(())
    }

    /// Appends one vertex, encoding each component with its attribute format.
    ///
    /// Only valid for layouts whose attributes are sorted by offset and tightly
    /// packed, as produced by [`VertexLayout::packed`].
    pub fn push_vertex(&mut self, values: &[ScalarValue]) -> Result<()> {
        let expected: usize = self
            .layout
            .attributes
            .iter()
            .map(|a| component_count(a.format).unwrap_or(0))
            .sum();
        if values.len() != expected {
            return Err(PipelineError::InvalidArgument(format!(
                "vertex has {} components, layout expects {expected}",
                values.len()
            )));
        }

        let mut bytes = Vec::with_capacity(self.layout.stride as usize);
        let mut values = values.iter();
        for attr in &self.layout.attributes {
            let count = component_count(attr.format).ok_or_else(|| {
                PipelineError::InvalidArgument(format!(
                    "cannot encode scalar values as {:?}",
                    attr.format
                ))
            })?;
            for value in values.by_ref().take(count) {
                encode_component(attr.format, value, &mut bytes);
            }
        }
        bytes.resize(self.layout.stride as usize, 0);

        self.data.extend_from_slice(&bytes);
        self.generation += 1;
        Ok(())
    }
}

impl Clone for VertexBuffer {
    fn clone(&self) -> Self {
        Self {
            id: VertexBufferId::next(),
            generation: self.generation,
            layout: self.layout.clone(),
            data: self.data.clone(),
        }
    }
}

impl std::fmt::Debug for VertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBuffer")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("layout", &self.layout)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn component_count(format: wgpu::VertexFormat) -> Option<usize> {
    use wgpu::VertexFormat as F;
    match format {
        F::Float32 | F::Uint32 | F::Sint32 => Some(1),
        F::Float32x2 | F::Uint32x2 | F::Sint32x2 => Some(2),
        F::Float32x3 | F::Uint32x3 | F::Sint32x3 => Some(3),
        F::Float32x4 | F::Uint32x4 | F::Sint32x4 | F::Unorm8x4 | F::Uint8x4 => Some(4),
        _ => None,
    }
}

fn encode_component(format: wgpu::VertexFormat, value: &ScalarValue, out: &mut Vec<u8>) {
    use wgpu::VertexFormat as F;
    match format {
        F::Float32 | F::Float32x2 | F::Float32x3 | F::Float32x4 => {
            out.extend_from_slice(bytemuck::bytes_of(&value.as_f32()))
        }
        F::Uint32 | F::Uint32x2 | F::Uint32x3 | F::Uint32x4 => {
            out.extend_from_slice(bytemuck::bytes_of(&value.as_u32()))
        }
        F::Sint32 | F::Sint32x2 | F::Sint32x3 | F::Sint32x4 => {
            out.extend_from_slice(bytemuck::bytes_of(&value.as_i32()))
        }
        F::Unorm8x4 | F::Uint8x4 => out.push(value.as_u8()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wgpu::VertexFormat as F;

    #[test]
    fn packed_layout_assigns_offsets_and_locations() {
        let layout = VertexLayout::packed(&[F::Float32x3, F::Float32x4]);
        assert_eq!(layout.stride, 28);
        assert_eq!(layout.attributes[0].offset, 0);
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[1].location, 1);
    }

    #[test]
    fn equal_layouts_built_separately_compare_equal() {
        let a = VertexLayout::packed(&[F::Float32x2, F::Unorm8x4]);
        let b = VertexLayout::packed(&[F::Float32x2, F::Unorm8x4]);
        assert_eq!(a, b);
    }

    #[test]
    fn rows_encode_per_format() {
        let rows = vec![vec![
            ScalarValue::float(1.0),
            ScalarValue::integer(0x10),
            ScalarValue::integer(0x20),
            ScalarValue::integer(0x30),
            ScalarValue::integer(0x40),
        ]];
        let vb = VertexBuffer::from_rows(&[F::Float32, F::Unorm8x4], &rows).unwrap();
        assert_eq!(vb.data(), &[0x00, 0x00, 0x80, 0x3F, 0x10, 0x20, 0x30, 0x40]);
        assert_eq!(vb.vertex_count(), 1);
    }

    #[test]
    fn wrong_component_count_is_rejected() {
        let err = VertexBuffer::from_rows(&[F::Float32x2], &[vec![ScalarValue::float(0.0)]]);
        assert!(matches!(err, Err(PipelineError::InvalidArgument(_))));
    }

    #[test]
    fn mutation_bumps_generation() {
        let mut vb = VertexBuffer::new(VertexLayout::packed(&[F::Float32]));
        let g0 = vb.generation();
        vb.push_vertex(&[ScalarValue::float(0.5)]).unwrap();
        assert!(vb.generation() > g0);

        let g1 = vb.generation();
        vb.set_data(vec![0; 8]).unwrap();
        assert!(vb.generation() > g1);
        assert_eq!(vb.vertex_count(), 2);
    }

    #[test]
    fn set_data_requires_whole_vertices() {
        let mut vb = VertexBuffer::new(VertexLayout::packed(&[F::Float32x2]));
        assert!(vb.set_data(vec![0; 12]).is_err());
    }

    #[test]
    fn clones_get_distinct_ids() {
        let vb = VertexBuffer::new(VertexLayout::packed(&[F::Float32]));
        let copy = vb.clone();
        assert_ne!(vb.id(), copy.id());
    }

    #[test]
    fn validate_rejects_overrunning_attribute() {
        let layout = VertexLayout {
            stride: 8,
            attributes: vec![VertexAttribute {
                location: 0,
                format: F::Float32x4,
                offset: 0,
            }],
        };
        assert!(layout.validate(&wgpu::Limits::default()).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_locations() {
        let mut layout = VertexLayout::packed(&[F::Float32, F::Float32]);
        layout.attributes[1].location = 0;
        assert!(layout.validate(&wgpu::Limits::default()).is_err());
    }

    #[test]
    fn validate_accepts_packed_layout() {
        let layout = VertexLayout::packed(&[F::Float32x3, F::Float32x4]);
        assert!(layout.validate(&wgpu::Limits::default()).is_ok());
    }
}
