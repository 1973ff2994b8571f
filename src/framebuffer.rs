//! Render targets: framebuffers and their typed attachments.
//!
//! A [`Framebuffer`] owns an ordered set of [`Attachment`]s classified by
//! [`BufferType`]: any number of color attachments (each at a unique,
//! sequentially assigned index) and at most one depth, stencil, or combined
//! depth+stencil attachment. Attachments are added during setup and live as
//! long as the framebuffer.
//!
//! There is no ambient "currently bound" target: [`Framebuffer::activate`]
//! returns a scoped `wgpu::RenderPass` wired to the chosen mip level (and
//! cubemap face, for cubemap attachments) with the viewport set to that
//! mip's size. Dropping the pass ends the activation.
//!
//! Slot bookkeeping is kept in a pure [`AttachmentPlanner`] so the
//! collision and completeness rules are checkable without a GPU device.

use crate::error::{RenderError, Result};
use crate::formats::{AttachmentClass, BufferType};
use crate::gpu::GpuContext;
use crate::texture::{Texture, TextureHandle, TextureKind, TextureParams, mip_size};

/// What backs an attachment: a sampleable texture or a render-only buffer.
///
/// Render-only attachments trade sampleability for nothing in particular on
/// wgpu, but they keep the contract honest: passes cannot read them, they
/// have a single mip, and they never appear in a texture registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    Texture,
    Renderbuffer,
}

/// How an activation treats existing attachment contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    /// Clear color attachments to the framebuffer clear color, depth to 1.0.
    Clear,
    /// Preserve previous contents (additive passes, overlays).
    Keep,
}

/// One binding point inside a framebuffer.
#[derive(Debug)]
pub struct Attachment {
    target: AttachmentTarget,
    buffer_type: BufferType,
    /// Sequential index among color attachments; `None` for depth/stencil.
    color_index: Option<u32>,
    texture: Texture,
    /// Render views indexed `face * mip_count + mip` (one face for 2D).
    views: Vec<wgpu::TextureView>,
}

impl Attachment {
    fn new(
        target: AttachmentTarget,
        buffer_type: BufferType,
        color_index: Option<u32>,
        texture: Texture,
    ) -> Result<Self> {
        let faces = texture.kind().layer_count();
        let mips = texture.mip_count();
        let mut views = Vec::with_capacity((faces * mips) as usize);
        for face in 0..faces {
            for mip in 0..mips {
                let face_arg = (texture.kind() == TextureKind::Cube).then_some(face);
                views.push(texture.attachment_view(mip, face_arg)?);
            }
        }
        Ok(Self {
            target,
            buffer_type,
            color_index,
            texture,
            views,
        })
    }

    fn render_view(&self, mip: u32, face: Option<u32>) -> Result<&wgpu::TextureView> {
        if self.target == AttachmentTarget::Renderbuffer && (mip != 0 || face.is_some()) {
            return Err(RenderError::RenderOnlyAttachmentActivation);
        }
        if mip >= self.texture.mip_count() {
            return Err(RenderError::MipOutOfRange {
                requested: mip,
                available: self.texture.mip_count(),
            });
        }
        let face = match (self.texture.kind(), face) {
            (TextureKind::Cube, Some(f)) if f < 6 => f,
            (TextureKind::Cube, Some(f)) => return Err(RenderError::CubemapFaceOutOfRange(f as i32)),
            (TextureKind::Cube, None) => return Err(RenderError::CubemapFaceOutOfRange(-1)),
            // A face selection is meaningless for 2D attachments and ignored,
            // so mixed cubemap/2D framebuffers can still activate a face.
            (TextureKind::D2, _) => 0,
        };
        Ok(&self.views[(face * self.texture.mip_count() + mip) as usize])
    }

    /// The buffer type this attachment was created with.
    pub fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    /// Index among the framebuffer's color attachments, if this is one.
    pub fn color_index(&self) -> Option<u32> {
        self.color_index
    }

    /// Whether a texture or a render-only buffer backs this attachment.
    pub fn target(&self) -> AttachmentTarget {
        self.target
    }

    /// View this attachment as a sampleable [`Texture`].
    ///
    /// Pure accessor; fails for render-only attachments.
    pub fn texture(&self) -> Result<&Texture> {
        match self.target {
            AttachmentTarget::Texture => Ok(&self.texture),
            AttachmentTarget::Renderbuffer => Err(RenderError::AttachmentNotSampleable),
        }
    }

    /// Mutable texture access, for the sampler mip-range guard.
    pub fn texture_mut(&mut self) -> Result<&mut Texture> {
        match self.target {
            AttachmentTarget::Texture => Ok(&mut self.texture),
            AttachmentTarget::Renderbuffer => Err(RenderError::AttachmentNotSampleable),
        }
    }

    /// Bindable handle for the texture registry.
    pub fn handle(&self) -> Result<TextureHandle> {
        Ok(self.texture()?.handle())
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn mip_count(&self) -> u32 {
        self.texture.mip_count()
    }
}

/// Pure slot bookkeeping for attachment creation.
///
/// Tracks which single-use slots are taken and hands out sequential color
/// indices. [`Framebuffer`] delegates all collision decisions here.
#[derive(Debug, Default, Clone)]
pub struct AttachmentPlanner {
    has_depth: bool,
    has_stencil: bool,
    num_color: u32,
}

impl AttachmentPlanner {
    /// Claim the slot for `buffer_type`. Returns the color index for color
    /// types, `None` for depth/stencil. A second claim on the depth or
    /// stencil slot is a fatal construction error.
    pub fn claim(&mut self, buffer_type: BufferType) -> Result<Option<u32>> {
        match buffer_type.attachment_class() {
            AttachmentClass::Color => {
                let index = self.num_color;
                self.num_color += 1;
                Ok(Some(index))
            }
            AttachmentClass::Depth => {
                self.check_depth_free(buffer_type)?;
                self.has_depth = true;
                Ok(None)
            }
            AttachmentClass::Stencil => {
                self.check_stencil_free(buffer_type)?;
                self.has_stencil = true;
                Ok(None)
            }
            AttachmentClass::DepthAndStencil => {
                self.check_depth_free(buffer_type)?;
                self.check_stencil_free(buffer_type)?;
                self.has_depth = true;
                self.has_stencil = true;
                Ok(None)
            }
        }
    }

    fn check_depth_free(&self, requested: BufferType) -> Result<()> {
        if self.has_depth {
            return Err(RenderError::AttachmentSlotCollision {
                existing: "depth",
                requested: requested.slot_name(),
            });
        }
        Ok(())
    }

    fn check_stencil_free(&self, requested: BufferType) -> Result<()> {
        if self.has_stencil {
            return Err(RenderError::AttachmentSlotCollision {
                existing: "stencil",
                requested: requested.slot_name(),
            });
        }
        Ok(())
    }

    pub fn has_color(&self) -> bool {
        self.num_color > 0
    }

    pub fn has_depth(&self) -> bool {
        self.has_depth
    }

    pub fn has_stencil(&self) -> bool {
        self.has_stencil
    }

    pub fn num_color_attachments(&self) -> u32 {
        self.num_color
    }

    /// The completeness rules a finished framebuffer must satisfy.
    pub fn check_complete(&self) -> Result<()> {
        if self.num_color == 0 && !self.has_depth && !self.has_stencil {
            return Err(RenderError::IncompleteFramebuffer(
                "no attachments".to_string(),
            ));
        }
        Ok(())
    }
}

/// An off-screen render target with typed attachments.
///
/// Created once at setup with a fixed size; attachments are added during
/// setup and never removed. The framebuffer owns its attachments outright.
pub struct Framebuffer {
    label: String,
    width: u32,
    height: u32,
    clear_color: wgpu::Color,
    planner: AttachmentPlanner,
    attachments: Vec<Attachment>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            clear_color: wgpu::Color::BLACK,
            planner: AttachmentPlanner::default(),
            attachments: Vec::new(),
        }
    }

    /// Set the color all color attachments clear to.
    pub fn set_clear_color(&mut self, color: wgpu::Color) {
        self.clear_color = color;
    }

    /// Allocate a sampleable texture attachment of the framebuffer's size
    /// and bind it at the next slot for its buffer type.
    pub fn attach_texture(
        &mut self,
        gpu: &GpuContext,
        buffer_type: BufferType,
        params: &TextureParams,
    ) -> Result<&Attachment> {
        let color_index = self.planner.claim(buffer_type)?;

        let kind = if buffer_type.is_cubemap() {
            TextureKind::Cube
        } else {
            TextureKind::D2
        };
        // Copy usages back the blit operations (depth sharing between the
        // deferred and forward passes, color seeding of the bloom chain).
        // Depth24Plus-class formats are not copyable and reject the flags.
        let mut usage =
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        if buffer_type != BufferType::DepthAndStencil {
            usage |= wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
        }

        let label = format!("{} {}", self.label, attachment_label(buffer_type, color_index));
        let texture = Texture::new(
            gpu,
            kind,
            self.width,
            self.height,
            buffer_type.texture_format(),
            usage,
            params,
            &label,
        )?;

        self.attachments.push(Attachment::new(
            AttachmentTarget::Texture,
            buffer_type,
            color_index,
            texture,
        )?);
        self.check_complete()?;
        Ok(self.attachments.last().unwrap())
    }

    /// Allocate a render-only attachment (no sampling, single mip).
    pub fn attach_renderbuffer(
        &mut self,
        gpu: &GpuContext,
        buffer_type: BufferType,
    ) -> Result<&Attachment> {
        let color_index = self.planner.claim(buffer_type)?;

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if buffer_type.has_depth() && buffer_type != BufferType::DepthAndStencil {
            usage |= wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
        }

        let label = format!("{} {}", self.label, attachment_label(buffer_type, color_index));
        let texture = Texture::new(
            gpu,
            TextureKind::D2,
            self.width,
            self.height,
            buffer_type.texture_format(),
            usage,
            &TextureParams::default(),
            &label,
        )?;

        self.attachments.push(Attachment::new(
            AttachmentTarget::Renderbuffer,
            buffer_type,
            color_index,
            texture,
        )?);
        self.check_complete()?;
        Ok(self.attachments.last().unwrap())
    }

    /// Begin a render pass over every attachment at mip 0.
    pub fn activate<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        load: LoadAction,
    ) -> Result<wgpu::RenderPass<'e>> {
        self.activate_at(encoder, 0, None, load)
    }

    /// Begin a render pass over every attachment at the chosen mip level
    /// and, for cubemap attachments, the chosen face.
    ///
    /// The viewport is set to the mip's size (halved per level, floor 1).
    /// Non-zero mips and faces are usage errors against render-only
    /// attachments.
    pub fn activate_at<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        mip: u32,
        face: Option<u32>,
        load: LoadAction,
    ) -> Result<wgpu::RenderPass<'e>> {
        self.check_complete()?;

        let mut color_attachments: Vec<(u32, &wgpu::TextureView)> = Vec::new();
        let mut depth_view: Option<&wgpu::TextureView> = None;
        let mut depth_has_stencil = false;

        for attachment in &self.attachments {
            let view = attachment.render_view(mip, face)?;
            match attachment.color_index {
                Some(index) => color_attachments.push((index, view)),
                None => {
                    depth_view = Some(view);
                    depth_has_stencil = attachment.buffer_type.has_stencil();
                }
            }
        }
        // Draw-buffer wiring follows the color indices, not insertion order.
        color_attachments.sort_by_key(|(index, _)| *index);

        let color_ops = wgpu::Operations {
            load: match load {
                LoadAction::Clear => wgpu::LoadOp::Clear(self.clear_color),
                LoadAction::Keep => wgpu::LoadOp::Load,
            },
            store: wgpu::StoreOp::Store,
        };
        let colors: Vec<Option<wgpu::RenderPassColorAttachment>> = color_attachments
            .iter()
            .map(|(_, view)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: color_ops,
                    depth_slice: None,
                })
            })
            .collect();

        let depth_stencil_attachment =
            depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: match load {
                        LoadAction::Clear => wgpu::LoadOp::Clear(1.0),
                        LoadAction::Keep => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: depth_has_stencil.then_some(wgpu::Operations {
                    load: match load {
                        LoadAction::Clear => wgpu::LoadOp::Clear(0),
                        LoadAction::Keep => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &colors,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let vw = mip_size(self.width, mip);
        let vh = mip_size(self.height, mip);
        pass.set_viewport(0.0, 0.0, vw as f32, vh as f32, 0.0, 1.0);

        Ok(pass)
    }

    /// Copy this framebuffer's depth plane into `target`'s depth attachment.
    ///
    /// Shares depth between passes without re-rendering it (deferred →
    /// forward). Dimensions and depth formats must match.
    pub fn blit_depth_to(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &Framebuffer,
    ) -> Result<()> {
        let src = self.depth_attachment()?;
        let dst = target.depth_attachment()?;
        if self.width != target.width || self.height != target.height {
            return Err(RenderError::BlitSizeMismatch {
                src_width: self.width,
                src_height: self.height,
                dst_width: target.width,
                dst_height: target.height,
            });
        }
        encoder.copy_texture_to_texture(
            src.texture.raw().as_image_copy(),
            dst.texture.raw().as_image_copy(),
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Copy color attachment 0 into `target`'s color attachment 0.
    ///
    /// Both attachments must share dimensions and format (the bloom chain
    /// seeds its mip 0 this way from the lighting output).
    pub fn blit_color_to(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &Framebuffer,
    ) -> Result<()> {
        let src = self.color_attachment(0)?;
        let dst = target.color_attachment(0)?;
        if self.width != target.width || self.height != target.height {
            return Err(RenderError::BlitSizeMismatch {
                src_width: self.width,
                src_height: self.height,
                dst_width: target.width,
                dst_height: target.height,
            });
        }
        encoder.copy_texture_to_texture(
            src.texture.raw().as_image_copy(),
            dst.texture.raw().as_image_copy(),
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// The framebuffer's own completeness rules, checked before any pass is
    /// recorded (wgpu validates attachment compatibility as well, later).
    pub fn check_complete(&self) -> Result<()> {
        self.planner.check_complete()?;
        for attachment in &self.attachments {
            if attachment.width() != self.width || attachment.height() != self.height {
                return Err(RenderError::IncompleteFramebuffer(format!(
                    "attachment size {}x{} does not match framebuffer {}x{}",
                    attachment.width(),
                    attachment.height(),
                    self.width,
                    self.height
                )));
            }
        }
        let mut indices: Vec<u32> = self
            .attachments
            .iter()
            .filter_map(|a| a.color_index)
            .collect();
        indices.sort_unstable();
        for (expected, actual) in indices.iter().enumerate() {
            if *actual != expected as u32 {
                return Err(RenderError::IncompleteFramebuffer(format!(
                    "color indices not contiguous: expected {expected}, found {actual}"
                )));
            }
        }
        Ok(())
    }

    /// Color attachment at `index`.
    pub fn color_attachment(&self, index: u32) -> Result<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.color_index == Some(index))
            .ok_or(RenderError::AttachmentNotFound("color"))
    }

    /// Mutable color attachment access (sampler mip-range guard).
    pub fn color_attachment_mut(&mut self, index: u32) -> Result<&mut Attachment> {
        self.attachments
            .iter_mut()
            .find(|a| a.color_index == Some(index))
            .ok_or(RenderError::AttachmentNotFound("color"))
    }

    /// The depth (or depth+stencil) attachment.
    pub fn depth_attachment(&self) -> Result<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.buffer_type.has_depth())
            .ok_or(RenderError::AttachmentNotFound("depth"))
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn num_color_attachments(&self) -> u32 {
        self.planner.num_color_attachments()
    }

    pub fn has_color(&self) -> bool {
        self.planner.has_color()
    }

    pub fn has_depth(&self) -> bool {
        self.planner.has_depth()
    }

    pub fn has_stencil(&self) -> bool {
        self.planner.has_stencil()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The color formats in index order, for pipeline construction.
    pub fn color_formats(&self) -> Vec<wgpu::TextureFormat> {
        let mut formats: Vec<(u32, wgpu::TextureFormat)> = self
            .attachments
            .iter()
            .filter_map(|a| a.color_index.map(|i| (i, a.buffer_type.texture_format())))
            .collect();
        formats.sort_by_key(|(i, _)| *i);
        formats.into_iter().map(|(_, f)| f).collect()
    }

    /// The depth format, if a depth attachment exists.
    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.attachments
            .iter()
            .find(|a| a.buffer_type.has_depth())
            .map(|a| a.buffer_type.texture_format())
    }
}

fn attachment_label(buffer_type: BufferType, color_index: Option<u32>) -> String {
    match color_index {
        Some(i) => format!("Color {i} ({buffer_type:?})"),
        None => format!("{buffer_type:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_indices_assigned_sequentially() {
        let mut planner = AttachmentPlanner::default();
        assert_eq!(planner.claim(BufferType::ColorHdr).unwrap(), Some(0));
        assert_eq!(planner.claim(BufferType::ColorHdrAlpha).unwrap(), Some(1));
        assert_eq!(planner.claim(BufferType::Grayscale).unwrap(), Some(2));
        assert_eq!(planner.num_color_attachments(), 3);
    }

    #[test]
    fn depth_slot_is_single_use() {
        let mut planner = AttachmentPlanner::default();
        assert_eq!(planner.claim(BufferType::Depth).unwrap(), None);
        let err = planner.claim(BufferType::Depth).unwrap_err();
        assert!(matches!(err, RenderError::AttachmentSlotCollision { .. }));
    }

    #[test]
    fn combined_depth_stencil_blocks_both_slots() {
        let mut planner = AttachmentPlanner::default();
        planner.claim(BufferType::DepthAndStencil).unwrap();
        assert!(planner.claim(BufferType::Depth).is_err());
        assert!(planner.has_depth());
        assert!(planner.has_stencil());
    }

    #[test]
    fn depth_after_combined_is_rejected_but_colors_still_flow() {
        // The end-to-end attach scenario at the planning level: HDR color,
        // then depth+stencil, completeness holds; a second depth throws.
        let mut planner = AttachmentPlanner::default();
        assert_eq!(planner.claim(BufferType::ColorHdrAlpha).unwrap(), Some(0));
        assert_eq!(planner.claim(BufferType::DepthAndStencil).unwrap(), None);
        planner.check_complete().unwrap();
        assert!(planner.claim(BufferType::Depth).is_err());
        // The failed claim must not have consumed a color index.
        assert_eq!(planner.claim(BufferType::Color).unwrap(), Some(1));
        assert_eq!(planner.num_color_attachments(), 2);
    }

    #[test]
    fn empty_framebuffer_is_incomplete() {
        let planner = AttachmentPlanner::default();
        assert!(matches!(
            planner.check_complete().unwrap_err(),
            RenderError::IncompleteFramebuffer(_)
        ));
    }

    #[test]
    fn two_color_attachments_get_indices_in_call_order() {
        let mut planner = AttachmentPlanner::default();
        let first = planner.claim(BufferType::ColorHdr).unwrap();
        let second = planner.claim(BufferType::ColorSnorm).unwrap();
        assert_eq!(first, Some(0));
        assert_eq!(second, Some(1));
    }
}
