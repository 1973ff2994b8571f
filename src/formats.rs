//! Buffer-type semantics and their fixed texture format mappings.
//!
//! Every render-target attachment is classified by a [`BufferType`] which
//! drives format selection, attachment-point classification, and cubemap-ness.
//! The mappings are pure functions of the buffer type so two independently
//! created attachments of the same type are always format-compatible.
//!
//! wgpu exposes no renderable 3-channel formats, so the RGB classes widen to
//! RGBA at the same bit depth and numeric class (RGB8 → `Rgba8Unorm`,
//! RGB16F → `Rgba16Float`, RGB16_SNORM → `Rgba16Snorm`).

/// Semantic classification of a framebuffer attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// 8-bit LDR color.
    Color,
    /// 16-bit float HDR color.
    ColorHdr,
    /// 16-bit signed-normalized color, for data that needs symmetric precision
    /// around zero (e.g. the BRDF integration LUT).
    ColorSnorm,
    /// 8-bit LDR color with alpha.
    ColorAlpha,
    /// 16-bit float HDR color with alpha.
    ColorHdrAlpha,
    /// Single 8-bit channel (occlusion, masks).
    Grayscale,
    /// 32-bit float depth.
    Depth,
    /// Combined 24-bit depth + 8-bit stencil.
    DepthAndStencil,
    /// HDR color cubemap.
    CubemapHdr,
    /// HDR color cubemap with alpha.
    CubemapHdrAlpha,
}

/// Which framebuffer slot class an attachment occupies.
///
/// Color attachments may coexist (each at a unique index); the depth and
/// stencil slots are single-use per framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentClass {
    Color,
    Depth,
    Stencil,
    DepthAndStencil,
}

impl BufferType {
    /// The concrete texture format backing this buffer type. Pure and total.
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            BufferType::Color => wgpu::TextureFormat::Rgba8Unorm,
            BufferType::ColorHdr => wgpu::TextureFormat::Rgba16Float,
            BufferType::ColorSnorm => wgpu::TextureFormat::Rgba16Snorm,
            BufferType::ColorAlpha => wgpu::TextureFormat::Rgba8Unorm,
            BufferType::ColorHdrAlpha => wgpu::TextureFormat::Rgba16Float,
            BufferType::Grayscale => wgpu::TextureFormat::R8Unorm,
            BufferType::Depth => wgpu::TextureFormat::Depth32Float,
            BufferType::DepthAndStencil => wgpu::TextureFormat::Depth24PlusStencil8,
            BufferType::CubemapHdr => wgpu::TextureFormat::Rgba16Float,
            BufferType::CubemapHdrAlpha => wgpu::TextureFormat::Rgba16Float,
        }
    }

    /// The framebuffer slot class this buffer type binds to. Pure and total.
    pub fn attachment_class(self) -> AttachmentClass {
        match self {
            BufferType::Depth => AttachmentClass::Depth,
            BufferType::DepthAndStencil => AttachmentClass::DepthAndStencil,
            _ => AttachmentClass::Color,
        }
    }

    /// Whether this type allocates a six-face cubemap texture.
    pub fn is_cubemap(self) -> bool {
        matches!(self, BufferType::CubemapHdr | BufferType::CubemapHdrAlpha)
    }

    /// Whether this type occupies a color slot.
    pub fn is_color(self) -> bool {
        self.attachment_class() == AttachmentClass::Color
    }

    /// Whether this type carries a depth plane.
    pub fn has_depth(self) -> bool {
        matches!(
            self.attachment_class(),
            AttachmentClass::Depth | AttachmentClass::DepthAndStencil
        )
    }

    /// Whether this type carries a stencil plane.
    pub fn has_stencil(self) -> bool {
        matches!(
            self.attachment_class(),
            AttachmentClass::Stencil | AttachmentClass::DepthAndStencil
        )
    }

    /// The sample type shaders use to read this attachment.
    pub fn sample_type(self) -> wgpu::TextureSampleType {
        if self.has_depth() {
            wgpu::TextureSampleType::Depth
        } else {
            wgpu::TextureSampleType::Float { filterable: true }
        }
    }

    /// Short human-readable slot name, used in error reporting.
    pub fn slot_name(self) -> &'static str {
        match self.attachment_class() {
            AttachmentClass::Color => "color",
            AttachmentClass::Depth => "depth",
            AttachmentClass::Stencil => "stencil",
            AttachmentClass::DepthAndStencil => "depth+stencil",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_mapping_is_fixed() {
        assert_eq!(
            BufferType::Color.texture_format(),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            BufferType::ColorHdr.texture_format(),
            wgpu::TextureFormat::Rgba16Float
        );
        assert_eq!(
            BufferType::ColorSnorm.texture_format(),
            wgpu::TextureFormat::Rgba16Snorm
        );
        assert_eq!(
            BufferType::ColorAlpha.texture_format(),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            BufferType::ColorHdrAlpha.texture_format(),
            wgpu::TextureFormat::Rgba16Float
        );
        assert_eq!(
            BufferType::Grayscale.texture_format(),
            wgpu::TextureFormat::R8Unorm
        );
        assert_eq!(
            BufferType::Depth.texture_format(),
            wgpu::TextureFormat::Depth32Float
        );
        assert_eq!(
            BufferType::DepthAndStencil.texture_format(),
            wgpu::TextureFormat::Depth24PlusStencil8
        );
        assert_eq!(
            BufferType::CubemapHdr.texture_format(),
            wgpu::TextureFormat::Rgba16Float
        );
        assert_eq!(
            BufferType::CubemapHdrAlpha.texture_format(),
            wgpu::TextureFormat::Rgba16Float
        );
    }

    #[test]
    fn attachment_classes() {
        assert_eq!(BufferType::Color.attachment_class(), AttachmentClass::Color);
        assert_eq!(
            BufferType::Grayscale.attachment_class(),
            AttachmentClass::Color
        );
        assert_eq!(BufferType::Depth.attachment_class(), AttachmentClass::Depth);
        assert_eq!(
            BufferType::DepthAndStencil.attachment_class(),
            AttachmentClass::DepthAndStencil
        );
        assert_eq!(
            BufferType::CubemapHdr.attachment_class(),
            AttachmentClass::Color
        );
    }

    #[test]
    fn cubemap_types_are_cubemaps() {
        assert!(BufferType::CubemapHdr.is_cubemap());
        assert!(BufferType::CubemapHdrAlpha.is_cubemap());
        assert!(!BufferType::ColorHdr.is_cubemap());
        assert!(!BufferType::Depth.is_cubemap());
    }

    #[test]
    fn depth_and_stencil_planes() {
        assert!(BufferType::Depth.has_depth());
        assert!(!BufferType::Depth.has_stencil());
        assert!(BufferType::DepthAndStencil.has_depth());
        assert!(BufferType::DepthAndStencil.has_stencil());
        assert!(!BufferType::ColorHdr.has_depth());
    }

    #[test]
    fn depth_types_sample_as_depth() {
        assert_eq!(
            BufferType::Depth.sample_type(),
            wgpu::TextureSampleType::Depth
        );
        assert_eq!(
            BufferType::ColorHdr.sample_type(),
            wgpu::TextureSampleType::Float { filterable: true }
        );
    }
}
