//! Offscreen frame buffer, attachment description and colour readback.

use crate::value::ScalarValue;

use super::command::AspectMask;
use super::error::{PipelineError, Result};

/// Every supported colour format stores one pixel in 4 bytes.
pub const COLOR_BYTES_PER_PIXEL: u32 = 4;

/// Byte order of an 8-bit-per-channel colour attachment.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelOrder {
    /// Byte 0 is blue. Matches the PNG export channel swap.
    Bgra,
    Rgba,
}

impl ChannelOrder {
    /// Returns the order for a supported colour attachment format.
    ///
    /// sRGB formats are not supported: expected values are packed linearly
    /// and would never match an exact comparison.
    pub fn of(format: wgpu::TextureFormat) -> Option<Self> {
        match format {
            wgpu::TextureFormat::Bgra8Unorm => Some(ChannelOrder::Bgra),
            wgpu::TextureFormat::Rgba8Unorm => Some(ChannelOrder::Rgba),
            _ => None,
        }
    }

    /// Reorders RGBA channels into storage byte order.
    #[inline]
    pub fn to_storage(self, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
        match self {
            ChannelOrder::Bgra => [b, g, r, a],
            ChannelOrder::Rgba => [r, g, b, a],
        }
    }

    /// Packs RGBA channels into the little-endian 32-bit word read back from the GPU.
    #[inline]
    pub fn pack(self, rgba: [u8; 4]) -> u32 {
        u32::from_le_bytes(self.to_storage(rgba))
    }

    /// Inverse of [`pack`](Self::pack).
    #[inline]
    pub fn unpack(self, packed: u32) -> [u8; 4] {
        // Both orders are their own inverse.
        self.to_storage(packed.to_le_bytes())
    }
}

/// Normalized float to 8-bit unorm, round-to-nearest.
#[inline]
pub fn unorm8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Attachment formats shared by the frame buffer and every pipeline built
/// against it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttachmentSet {
    pub color_format: wgpu::TextureFormat,
    pub depth_stencil_format: Option<wgpu::TextureFormat>,
}

impl AttachmentSet {
    /// Validates the formats for use as render attachments.
    pub fn new(
        color_format: wgpu::TextureFormat,
        depth_stencil_format: Option<wgpu::TextureFormat>,
    ) -> Result<Self> {
        if ChannelOrder::of(color_format).is_none() {
            return Err(PipelineError::UnsupportedFormat {
                format: color_format,
                reason: "colour attachment must be linear 8-bit RGBA or BGRA unorm",
            });
        }
        if let Some(format) = depth_stencil_format
            && !format.is_depth_stencil_format()
        {
            return Err(PipelineError::UnsupportedFormat {
                format,
                reason: "not a depth/stencil format",
            });
        }
        Ok(Self {
            color_format,
            depth_stencil_format,
        })
    }

    /// Aspects that can be cleared or probed.
    pub fn aspects(&self) -> AspectMask {
        let mut mask = AspectMask::COLOR;
        if let Some(format) = self.depth_stencil_format {
            if format.has_depth_aspect() {
                mask |= AspectMask::DEPTH;
            }
            if format.has_stencil_aspect() {
                mask |= AspectMask::STENCIL;
            }
        }
        mask
    }
}

/// Colour + optional depth/stencil textures sized at initialization.
pub struct FrameBuffer {
    width: u32,
    height: u32,
    attachments: AttachmentSet,

    color: wgpu::Texture,
    color_view: wgpu::TextureView,

    depth_stencil: Option<(wgpu::Texture, wgpu::TextureView)>,
}

impl FrameBuffer {
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        attachments: AttachmentSet,
    ) -> Result<Self> {
        let max = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(PipelineError::Resource(format!(
                "cannot allocate a {width}x{height} frame buffer (max dimension {max})"
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lumen frame color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: attachments.color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_stencil = attachments.depth_stencil_format.map(|format| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("lumen frame depth/stencil"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        Ok(Self {
            width,
            height,
            attachments,
            color,
            color_view,
            depth_stencil,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn attachments(&self) -> &AttachmentSet {
        &self.attachments
    }

    pub(crate) fn color_attachment(
        &self,
        load: wgpu::LoadOp<wgpu::Color>,
    ) -> wgpu::RenderPassColorAttachment<'_> {
        wgpu::RenderPassColorAttachment {
            view: &self.color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        }
    }

    /// Depth/stencil attachment with `depth_load` / `stencil_load` applied to
    /// whichever aspects the format has. `None` if there is no such attachment.
    pub(crate) fn depth_stencil_attachment(
        &self,
        depth_load: wgpu::LoadOp<f32>,
        stencil_load: wgpu::LoadOp<u32>,
    ) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
        let (_, view) = self.depth_stencil.as_ref()?;
        let aspects = self.attachments.aspects();

        Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: aspects.contains(AspectMask::DEPTH).then_some(wgpu::Operations {
                load: depth_load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: aspects
                .contains(AspectMask::STENCIL)
                .then_some(wgpu::Operations {
                    load: stencil_load,
                    store: wgpu::StoreOp::Store,
                }),
        })
    }

    /// Records a copy of a colour rectangle into `buffer` using `layout`.
    pub(crate) fn copy_color_region(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        x: u32,
        y: u32,
        layout: &ReadbackLayout,
        buffer: &wgpu::Buffer,
    ) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(layout.padded_bytes_per_row),
                    rows_per_image: Some(layout.height),
                },
            },
            wgpu::Extent3d {
                width: layout.width,
                height: layout.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Releases the textures immediately instead of waiting for the last handle.
    pub fn destroy(self) {
        if let Some((texture, view)) = self.depth_stencil {
            drop(view);
            texture.destroy();
        }
        drop(self.color_view);
        self.color.destroy();
    }
}

/// Row layout of a texture-to-buffer copy.
///
/// wgpu requires `bytes_per_row` to be a multiple of
/// [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`]; rows are padded accordingly and the
/// padding is stripped again by [`unpack`](Self::unpack).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct ReadbackLayout {
    pub width: u32,
    pub height: u32,
    pub unpadded_bytes_per_row: u32,
    pub padded_bytes_per_row: u32,
}

impl ReadbackLayout {
    pub fn new(width: u32, height: u32) -> Self {
        let unpadded_bytes_per_row = width * COLOR_BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;
        Self {
            width,
            height,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        }
    }

    #[inline]
    pub fn buffer_size(&self) -> u64 {
        u64::from(self.padded_bytes_per_row) * u64::from(self.height)
    }

    /// Converts mapped rows into integer-tagged packed pixels, row-major.
    pub fn unpack(&self, data: &[u8]) -> Vec<ScalarValue> {
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize);
        for row in data
            .chunks(self.padded_bytes_per_row as usize)
            .take(self.height as usize)
        {
            let row = &row[..(self.unpadded_bytes_per_row as usize).min(row.len())];
            pixels.extend(
                row.chunks_exact(COLOR_BYTES_PER_PIXEL as usize)
                    .map(|px| ScalarValue::from(u32::from_le_bytes([px[0], px[1], px[2], px[3]]))),
            );
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        let layout = ReadbackLayout::new(3, 2);
        assert_eq!(layout.unpadded_bytes_per_row, 12);
        assert_eq!(layout.padded_bytes_per_row, 256);
        assert_eq!(layout.buffer_size(), 512);

        let layout = ReadbackLayout::new(64, 1);
        assert_eq!(layout.padded_bytes_per_row, 256);

        let layout = ReadbackLayout::new(65, 1);
        assert_eq!(layout.padded_bytes_per_row, 512);
    }

    #[test]
    fn unpack_strips_row_padding() {
        let layout = ReadbackLayout::new(2, 2);
        let mut data = vec![0xEEu8; layout.buffer_size() as usize];
        let stride = layout.padded_bytes_per_row as usize;
        data[0..8].copy_from_slice(&[1, 0, 0, 0, 2, 0, 0, 0]);
        data[stride..stride + 8].copy_from_slice(&[3, 0, 0, 0, 4, 0, 0, 0]);

        let pixels: Vec<u32> = layout.unpack(&data).iter().map(ScalarValue::as_u32).collect();
        assert_eq!(pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn unpacked_pixels_are_integer_tagged() {
        let layout = ReadbackLayout::new(1, 1);
        let data = vec![0xDD, 0xCC, 0xBB, 0xAA];
        let mut padded = data.clone();
        padded.resize(layout.buffer_size() as usize, 0);
        let pixels = layout.unpack(&padded);
        assert_eq!(pixels.len(), 1);
        assert!(pixels[0].is_integer());
        assert_eq!(pixels[0].as_u32(), 0xAABB_CCDD);
    }

    #[test]
    fn channel_order_round_trips() {
        for order in [ChannelOrder::Bgra, ChannelOrder::Rgba] {
            let rgba = [10, 20, 30, 40];
            assert_eq!(order.unpack(order.pack(rgba)), rgba);
        }
        assert_eq!(ChannelOrder::Bgra.pack([0x11, 0x22, 0x33, 0x44]), 0x4411_2233);
    }

    #[test]
    fn unorm8_rounds_and_clamps() {
        assert_eq!(unorm8(0.0), 0);
        assert_eq!(unorm8(1.0), 255);
        assert_eq!(unorm8(0.5), 128);
        assert_eq!(unorm8(-3.0), 0);
        assert_eq!(unorm8(7.0), 255);
    }

    #[test]
    fn attachment_set_rejects_unsupported_formats() {
        assert!(AttachmentSet::new(wgpu::TextureFormat::Rgba16Float, None).is_err());
        for srgb in [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ] {
            let err = AttachmentSet::new(srgb, None).unwrap_err();
            assert!(
                matches!(err, PipelineError::UnsupportedFormat { format, .. } if format == srgb),
                "{err}"
            );
        }
        assert!(
            AttachmentSet::new(
                wgpu::TextureFormat::Bgra8Unorm,
                Some(wgpu::TextureFormat::Rgba8Unorm)
            )
            .is_err()
        );
    }

    #[test]
    fn aspects_follow_depth_stencil_format() {
        let color_only = AttachmentSet::new(wgpu::TextureFormat::Bgra8Unorm, None).unwrap();
        assert_eq!(color_only.aspects(), AspectMask::COLOR);

        let depth = AttachmentSet::new(
            wgpu::TextureFormat::Bgra8Unorm,
            Some(wgpu::TextureFormat::Depth32Float),
        )
        .unwrap();
        assert_eq!(depth.aspects(), AspectMask::COLOR | AspectMask::DEPTH);

        let both = AttachmentSet::new(
            wgpu::TextureFormat::Bgra8Unorm,
            Some(wgpu::TextureFormat::Depth24PlusStencil8),
        )
        .unwrap();
        assert_eq!(both.aspects(), AspectMask::all());
    }
}
