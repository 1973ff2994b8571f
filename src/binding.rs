//! Texture-unit allocation and the shader input registry.
//!
//! Independently-written passes need to claim texture binding slots without
//! coordinating with each other. The protocol: a [`TextureRegistry`] holds
//! sources in explicit registration order and replays them through a
//! [`TextureBinder`] once per shader update, threading the next free unit
//! through the chain. Stable order means stable units, so two sources can
//! never collide.
//!
//! Unit `u` occupies bind group entries `2u` (texture) and `2u + 1`
//! (sampler) of a pass's texture bind group; a shader consuming registry
//! inputs declares its bindings in the same order the sources registered.
//!
//! For per-draw textures (material maps that change with every mesh and
//! must not permanently consume units), [`TextureBinder::push_usage_block`]
//! checkpoints the allocator, [`next`] hands out increasing units, and
//! [`pop_usage_block`] restores the checkpoint — a nested scratch
//! allocator, not a global counter.
//!
//! [`next`]: TextureUnitAllocator::next
//! [`pop_usage_block`]: TextureBinder::pop_usage_block

use crate::error::{RenderError, Result};
use crate::shader::Shader;
use crate::texture::TextureHandle;

/// Hands out sequential texture units with nested checkpoints.
#[derive(Debug, Default, Clone)]
pub struct TextureUnitAllocator {
    next: u32,
    blocks: Vec<u32>,
}

impl TextureUnitAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next free unit.
    pub fn next(&mut self) -> u32 {
        let unit = self.next;
        self.next += 1;
        unit
    }

    /// Remember the current next-free unit.
    pub fn push_usage_block(&mut self) {
        self.blocks.push(self.next);
    }

    /// Restore the most recent checkpoint. Popping with no matching push is
    /// a fatal protocol violation.
    pub fn pop_usage_block(&mut self) -> Result<()> {
        match self.blocks.pop() {
            Some(saved) => {
                self.next = saved;
                Ok(())
            }
            None => Err(RenderError::UsageBlockUnderflow),
        }
    }

    /// Drop all state, returning allocation to unit 0.
    pub fn reset(&mut self) {
        self.next = 0;
        self.blocks.clear();
    }

    /// The unit the next claim would return.
    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// A texture bound to a specific unit under a specific sampler uniform name.
#[derive(Debug, Clone)]
pub struct BoundTexture {
    pub unit: u32,
    pub name: String,
    pub handle: TextureHandle,
}

/// Collects unit → texture assignments for one shader update.
///
/// The binder is the only path to a texture bind group: sources claim units
/// through it, and the recorded order becomes the bind group layout.
#[derive(Debug, Default)]
pub struct TextureBinder {
    allocator: TextureUnitAllocator,
    bindings: Vec<BoundTexture>,
}

impl TextureBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh frame: unit allocation begins at 0.
    pub fn reset(&mut self) {
        self.allocator.reset();
        self.bindings.clear();
    }

    /// Bind `handle` under `name` at the next free unit; returns the unit.
    pub fn bind(&mut self, name: impl Into<String>, handle: TextureHandle) -> u32 {
        let unit = self.allocator.next();
        self.bindings.push(BoundTexture {
            unit,
            name: name.into(),
            handle,
        });
        unit
    }

    /// Checkpoint the allocator for per-draw bindings.
    pub fn push_usage_block(&mut self) {
        self.allocator.push_usage_block();
    }

    /// Restore the last checkpoint, releasing every unit (and recorded
    /// binding) claimed since the matching push.
    pub fn pop_usage_block(&mut self) -> Result<()> {
        self.allocator.pop_usage_block()?;
        let live = self.allocator.peek();
        self.bindings.retain(|b| b.unit < live);
        Ok(())
    }

    /// Recorded bindings in unit order.
    pub fn bindings(&self) -> &[BoundTexture] {
        &self.bindings
    }

    /// The unit the next bind would claim.
    pub fn next_unit(&self) -> u32 {
        self.allocator.peek()
    }

    /// Bind group layout entries matching the current bindings: texture at
    /// `2u`, sampler at `2u + 1`, fragment-visible.
    pub fn layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        let mut entries = Vec::with_capacity(self.bindings.len() * 2);
        for binding in &self.bindings {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding.unit * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: binding.handle.sample_type,
                    view_dimension: binding.handle.dimension,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding.unit * 2 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(
                    if binding.handle.sample_type == wgpu::TextureSampleType::Depth {
                        wgpu::SamplerBindingType::NonFiltering
                    } else {
                        wgpu::SamplerBindingType::Filtering
                    },
                ),
                count: None,
            });
        }
        entries
    }

    /// Build the bind group layout for the current bindings.
    pub fn create_layout(&self, device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &self.layout_entries(),
        })
    }

    /// Build the bind group for the current bindings.
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &str,
    ) -> wgpu::BindGroup {
        let mut entries = Vec::with_capacity(self.bindings.len() * 2);
        for binding in &self.bindings {
            entries.push(wgpu::BindGroupEntry {
                binding: binding.unit * 2,
                resource: wgpu::BindingResource::TextureView(&binding.handle.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding.unit * 2 + 1,
                resource: wgpu::BindingResource::Sampler(&binding.handle.sampler),
            });
        }
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }
}

/// Something that binds one or more textures into a shader update.
pub trait TextureSource {
    /// Claim units from the binder for every texture this source provides.
    fn bind_textures(&self, binder: &mut TextureBinder) -> Result<()>;
}

/// Something that pushes uniform values into a shader when asked.
pub trait UniformSource {
    fn update_uniforms(&self, shader: &mut Shader) -> Result<()>;
}

/// A single named texture as a registry source.
#[derive(Debug, Clone)]
pub struct NamedTexture {
    pub name: String,
    pub handle: TextureHandle,
}

impl NamedTexture {
    pub fn new(name: impl Into<String>, handle: TextureHandle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

impl TextureSource for NamedTexture {
    fn bind_textures(&self, binder: &mut TextureBinder) -> Result<()> {
        binder.bind(self.name.clone(), self.handle.clone());
        Ok(())
    }
}

/// An ordered list of texture sources replayed every frame.
///
/// Units are assigned by registration order, never by container iteration
/// order, so the assignment is deterministic across frames and runs.
#[derive(Default)]
pub struct TextureRegistry {
    sources: Vec<Box<dyn TextureSource>>,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source. Its units come after every earlier source's.
    pub fn add_source(&mut self, source: Box<dyn TextureSource>) {
        self.sources.push(source);
    }

    /// Reset the binder and replay every source in registration order.
    pub fn bind_all(&self, binder: &mut TextureBinder) -> Result<()> {
        binder.reset();
        for source in &self.sources {
            source.bind_textures(binder)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Handles need real wgpu resources, so protocol tests run against the
    // allocator, which is the part that carries the invariants.

    #[test]
    fn units_are_sequential_from_zero() {
        let mut alloc = TextureUnitAllocator::new();
        assert_eq!(alloc.next(), 0);
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
    }

    #[test]
    fn pop_restores_allocator_state() {
        let mut alloc = TextureUnitAllocator::new();
        alloc.push_usage_block();
        let a = alloc.next();
        let _b = alloc.next();
        alloc.pop_usage_block().unwrap();
        let c = alloc.next();
        assert_eq!(c, a);
    }

    #[test]
    fn nested_blocks_restore_in_lifo_order() {
        let mut alloc = TextureUnitAllocator::new();
        let base = alloc.next(); // 0
        alloc.push_usage_block();
        assert_eq!(alloc.next(), 1);
        alloc.push_usage_block();
        assert_eq!(alloc.next(), 2);
        assert_eq!(alloc.next(), 3);
        alloc.pop_usage_block().unwrap();
        assert_eq!(alloc.peek(), 2);
        alloc.pop_usage_block().unwrap();
        assert_eq!(alloc.peek(), 1);
        assert_eq!(base, 0);
    }

    #[test]
    fn unmatched_pop_is_a_protocol_violation() {
        let mut alloc = TextureUnitAllocator::new();
        assert!(matches!(
            alloc.pop_usage_block(),
            Err(RenderError::UsageBlockUnderflow)
        ));
    }

    #[test]
    fn reset_returns_to_unit_zero() {
        let mut alloc = TextureUnitAllocator::new();
        alloc.next();
        alloc.push_usage_block();
        alloc.next();
        alloc.reset();
        assert_eq!(alloc.peek(), 0);
        // A pop after reset has no surviving push to match.
        assert!(alloc.pop_usage_block().is_err());
    }
}
