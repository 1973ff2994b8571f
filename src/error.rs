//! Error taxonomy for the renderer.
//!
//! Resource construction errors and usage-protocol violations are fatal and
//! surface as [`RenderError`] at the call site; there is no retry or degraded
//! mode. Shader compilation failures are deliberately *not* errors — they are
//! logged and the previous good pipeline keeps running so shaders can be
//! edited live (see [`crate::shader`]).

use thiserror::Error;

/// All the ways resource construction or pass usage can fail.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Image data with a channel count the texture layer cannot represent.
    #[error("unsupported channel count {0} (expected 1, 2, 3, or 4)")]
    UnsupportedChannelCount(u32),

    /// A cubemap face source that is not square.
    #[error("cubemap face must be square, got {width}x{height}")]
    NonSquareCubemapFace { width: u32, height: u32 },

    /// Cubemap face sources of differing sizes.
    #[error("cubemap faces must all match, face {face} is {width}x{height}, expected {expected}x{expected}")]
    MismatchedCubemapFace {
        face: usize,
        width: u32,
        height: u32,
        expected: u32,
    },

    /// A second depth or stencil attachment on a framebuffer that already has one.
    #[error("framebuffer already has a {existing} attachment, cannot attach {requested}")]
    AttachmentSlotCollision {
        existing: &'static str,
        requested: &'static str,
    },

    /// A framebuffer that failed its completeness rules.
    #[error("framebuffer incomplete: {0}")]
    IncompleteFramebuffer(String),

    /// Mip level outside the attachment's allocated chain.
    #[error("mip level {requested} out of range, texture has {available} mip levels")]
    MipOutOfRange { requested: u32, available: u32 },

    /// Cubemap face index outside 0..6, or a face requested of a 2D target.
    #[error("cubemap face {0} out of range (valid faces are 0..6)")]
    CubemapFaceOutOfRange(i32),

    /// Mip or face activation against a render-only (non-sampleable) attachment.
    #[error("render-only attachments support only mip 0 and no cubemap faces")]
    RenderOnlyAttachmentActivation,

    /// Sampling conversion requested for an attachment with no sampleable texture.
    #[error("attachment targets a render-only buffer and cannot be sampled")]
    AttachmentNotSampleable,

    /// Lookup of an attachment the framebuffer does not have.
    #[error("framebuffer has no {0} attachment")]
    AttachmentNotFound(&'static str),

    /// `pop_usage_block` without a matching push.
    #[error("texture unit usage block underflow: pop without matching push")]
    UsageBlockUnderflow,

    /// A uniform name the shader's block does not declare.
    #[error("shader declares no uniform named `{0}`")]
    UnknownUniform(String),

    /// A value pushed into a uniform slot of a different type.
    #[error("uniform `{name}` expects {expected}, got {got}")]
    UniformTypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },

    /// Blit between framebuffers whose dimensions do not match.
    #[error("blit requires matching dimensions, {src_width}x{src_height} vs {dst_width}x{dst_height}")]
    BlitSizeMismatch {
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    },

    /// HDR or LDR image decode failure.
    #[error("image load failed: {0}")]
    Image(#[from] image::ImageError),

    /// Shader source file read failure (hot reload).
    #[error("shader io: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;
