//! Shader programs with by-name uniforms and composable uniform sources.
//!
//! One [`Shader`] type covers every pass in the renderer, parameterized by a
//! [`ShaderConfig`] (vertex input, target formats, blend, depth, polygon
//! mode) instead of one struct per pass. A shader owns a single uniform
//! block whose field layout is declared at construction; values are pushed
//! by name with WGSL-correct packing, and pluggable [`UniformSource`]s push
//! their own uniforms on demand — the seam through which the framebuffer
//! and texture layers feed data into draw calls.
//!
//! Compilation failures are deliberately soft: wgpu validation errors are
//! captured in an error scope, logged with the full diagnostic, and the
//! previous good pipeline keeps running. A broken shader renders wrong, not
//! crashed, so it can be edited live.
//!
//! Bind group convention: group 0 is the uniform block, group 1 the texture
//! units (see [`crate::binding`]), group 2 per-draw material textures.

use std::rc::Rc;

use crate::binding::UniformSource;
use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;

/// Prefix reserved for engine-injected uniforms (`qrk_bloomMipChain`,
/// `qrk_ssaoKernel`, ...). Material and user uniforms are unprefixed.
pub const ENGINE_UNIFORM_PREFIX: &str = "qrk_";

/// A value for one uniform block field.
#[derive(Debug, Clone)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
    Int(i32),
    Uint(u32),
    /// Fixed-length array of vec4s (16-byte stride).
    Vec4Array(Vec<[f32; 4]>),
}

impl UniformValue {
    fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "f32",
            UniformValue::Vec2(_) => "vec2<f32>",
            UniformValue::Vec3(_) => "vec3<f32>",
            UniformValue::Vec4(_) => "vec4<f32>",
            UniformValue::Mat4(_) => "mat4x4<f32>",
            UniformValue::Int(_) => "i32",
            UniformValue::Uint(_) => "u32",
            UniformValue::Vec4Array(_) => "array<vec4<f32>>",
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec2(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec3(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec4(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Mat4(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Int(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Uint(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec4Array(v) => bytemuck::cast_slice(v).to_vec(),
        }
    }
}

/// Declared type of a uniform block field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Int,
    Uint,
    /// Array of vec4s with the given element count.
    Vec4Array(u32),
}

impl UniformType {
    /// WGSL size in bytes.
    fn size(self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Uint => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat4 => 64,
            UniformType::Vec4Array(n) => 16 * n,
        }
    }

    /// WGSL alignment in bytes.
    fn align(self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Uint => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 | UniformType::Vec4 | UniformType::Mat4 => 16,
            UniformType::Vec4Array(_) => 16,
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            UniformType::Float => "f32",
            UniformType::Vec2 => "vec2<f32>",
            UniformType::Vec3 => "vec3<f32>",
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Mat4 => "mat4x4<f32>",
            UniformType::Int => "i32",
            UniformType::Uint => "u32",
            UniformType::Vec4Array(_) => "array<vec4<f32>>",
        }
    }

    fn matches(self, value: &UniformValue) -> bool {
        matches!(
            (self, value),
            (UniformType::Float, UniformValue::Float(_))
                | (UniformType::Vec2, UniformValue::Vec2(_))
                | (UniformType::Vec3, UniformValue::Vec3(_))
                | (UniformType::Vec4, UniformValue::Vec4(_))
                | (UniformType::Mat4, UniformValue::Mat4(_))
                | (UniformType::Int, UniformValue::Int(_))
                | (UniformType::Uint, UniformValue::Uint(_))
        ) || matches!((self, value), (UniformType::Vec4Array(n), UniformValue::Vec4Array(v)) if v.len() as u32 <= n)
    }
}

#[derive(Debug, Clone)]
struct UniformField {
    name: String,
    ty: UniformType,
    offset: u32,
}

/// The field layout of a shader's uniform block, packed per WGSL rules.
///
/// Field offsets follow declaration order with each field aligned to its
/// WGSL alignment; the block size rounds up to 16.
#[derive(Debug, Clone, Default)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    size: u32,
}

impl UniformLayout {
    pub fn builder() -> UniformLayoutBuilder {
        UniformLayoutBuilder::default()
    }

    /// Total block size in bytes (16-byte aligned, minimum 16).
    pub fn size(&self) -> u32 {
        self.size
    }

    fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Byte offset of `name`, if declared.
    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.field(name).map(|f| f.offset)
    }
}

/// Declares uniform block fields in order.
#[derive(Debug, Default)]
pub struct UniformLayoutBuilder {
    fields: Vec<UniformField>,
    cursor: u32,
}

impl UniformLayoutBuilder {
    pub fn field(mut self, name: impl Into<String>, ty: UniformType) -> Self {
        let align = ty.align();
        let offset = self.cursor.next_multiple_of(align);
        self.cursor = offset + ty.size();
        self.fields.push(UniformField {
            name: name.into(),
            ty,
            offset,
        });
        self
    }

    pub fn build(self) -> UniformLayout {
        UniformLayout {
            fields: self.fields,
            size: self.cursor.next_multiple_of(16).max(16),
        }
    }
}

/// Depth configuration for shaders drawing into a depth attachment.
#[derive(Debug, Clone, Copy)]
pub struct DepthConfig {
    pub format: wgpu::TextureFormat,
    pub write: bool,
    pub compare: wgpu::CompareFunction,
}

/// Everything a pipeline needs besides the WGSL source.
#[derive(Clone)]
pub struct ShaderConfig {
    pub label: String,
    /// Vertex buffer layout; `None` renders a fullscreen triangle from the
    /// vertex index alone.
    pub vertex_layout: Option<wgpu::VertexBufferLayout<'static>>,
    pub target_formats: Vec<wgpu::TextureFormat>,
    pub blend: Option<wgpu::BlendState>,
    pub depth: Option<DepthConfig>,
    pub polygon_mode: wgpu::PolygonMode,
    pub cull_mode: Option<wgpu::Face>,
}

impl ShaderConfig {
    /// A fullscreen pass writing one color target, no blend, no depth.
    pub fn screen(label: impl Into<String>, target_format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.into(),
            vertex_layout: None,
            target_formats: vec![target_format],
            blend: Some(wgpu::BlendState::REPLACE),
            depth: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            cull_mode: None,
        }
    }

    pub fn with_blend(mut self, blend: wgpu::BlendState) -> Self {
        self.blend = Some(blend);
        self
    }

    pub fn with_depth(mut self, depth: DepthConfig) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// A shader program: module, pipeline, uniform block, uniform sources.
///
/// The pipeline is absent while no compile has ever succeeded; draws are
/// skipped (not failed) in that state.
pub struct Shader {
    config: ShaderConfig,
    uniform_layout: UniformLayout,
    uniform_data: Vec<u8>,
    uniform_dirty: bool,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_bind_group_layout: wgpu::BindGroupLayout,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    empty_texture_bind_group: Option<wgpu::BindGroup>,
    extra_bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline: Option<wgpu::RenderPipeline>,
    sources: Vec<Rc<dyn UniformSource>>,
}

impl Shader {
    /// Create a shader and attempt a first compile.
    ///
    /// `texture_layout_entries` describes group 1 (the texture units this
    /// shader consumes, in unit order); `extra_layouts` any further groups
    /// (per-draw material textures).
    pub fn new(
        gpu: &GpuContext,
        source: &str,
        uniform_layout: UniformLayout,
        texture_layout_entries: &[wgpu::BindGroupLayoutEntry],
        extra_layouts: Vec<wgpu::BindGroupLayout>,
        config: ShaderConfig,
    ) -> Self {
        let device = &gpu.device;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} Uniforms", config.label)),
            size: uniform_layout.size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Uniform Layout", config.label)),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Uniform Bind Group", config.label)),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Texture Layout", config.label)),
                entries: texture_layout_entries,
            });

        // Group 1 must be set at draw time even when the shader samples
        // nothing, so texture-less shaders get an empty bind group.
        let empty_texture_bind_group = texture_layout_entries.is_empty().then(|| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} Empty Textures", config.label)),
                layout: &texture_bind_group_layout,
                entries: &[],
            })
        });

        let uniform_data = vec![0u8; uniform_layout.size() as usize];

        let mut shader = Self {
            config,
            uniform_layout,
            uniform_data,
            uniform_dirty: true,
            uniform_buffer,
            uniform_bind_group,
            uniform_bind_group_layout,
            texture_bind_group_layout,
            empty_texture_bind_group,
            extra_bind_group_layouts: extra_layouts,
            pipeline: None,
            sources: Vec::new(),
        };
        shader.recompile(gpu, source);
        shader
    }

    /// Compile `source` and swap in the new pipeline on success.
    ///
    /// On validation failure the full compiler output is logged and the
    /// previous pipeline (if any) keeps running. Never returns an error.
    pub fn recompile(&mut self, gpu: &GpuContext, source: &str) {
        let device = &gpu.device;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.config.label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut bind_group_layouts: Vec<&wgpu::BindGroupLayout> =
            vec![&self.uniform_bind_group_layout, &self.texture_bind_group_layout];
        bind_group_layouts.extend(self.extra_bind_group_layouts.iter());

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", self.config.label)),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let vertex_buffers: Vec<wgpu::VertexBufferLayout> =
            self.config.vertex_layout.clone().into_iter().collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = self
            .config
            .target_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: self.config.blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&self.config.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs"),
                buffers: &vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs"),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                polygon_mode: self.config.polygon_mode,
                cull_mode: self.config.cull_mode,
                ..Default::default()
            },
            depth_stencil: self.config.depth.map(|d| wgpu::DepthStencilState {
                format: d.format,
                depth_write_enabled: d.write,
                depth_compare: d.compare,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        match pollster::block_on(device.pop_error_scope()) {
            None => {
                self.pipeline = Some(pipeline);
            }
            Some(error) => {
                // Soft failure: keep the last good pipeline running.
                log::error!("shader `{}` failed to compile:\n{error}", self.config.label);
            }
        }
    }

    /// Whether a compiled pipeline exists.
    pub fn is_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Push a value into the uniform block by name.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<()> {
        let field = self
            .uniform_layout
            .field(name)
            .ok_or_else(|| RenderError::UnknownUniform(name.to_string()))?;
        if !field.ty.matches(&value) {
            return Err(RenderError::UniformTypeMismatch {
                name: name.to_string(),
                expected: field.ty.type_name(),
                got: value.type_name(),
            });
        }
        let offset = field.offset as usize;
        let bytes = value.bytes();
        self.uniform_data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        self.uniform_dirty = true;
        Ok(())
    }

    /// Add a pluggable uniform source, replayed by [`update_uniforms`].
    ///
    /// [`update_uniforms`]: Shader::update_uniforms
    pub fn add_uniform_source(&mut self, source: Rc<dyn UniformSource>) {
        self.sources.push(source);
    }

    /// Ask every registered uniform source to push its uniforms.
    pub fn update_uniforms(&mut self) -> Result<()> {
        let sources = std::mem::take(&mut self.sources);
        let result = sources.iter().try_for_each(|s| s.update_uniforms(self));
        self.sources = sources;
        result
    }

    /// Upload the uniform block if anything changed since the last flush.
    pub fn flush_uniforms(&mut self, gpu: &GpuContext) {
        if self.uniform_dirty {
            gpu.queue
                .write_buffer(&self.uniform_buffer, 0, &self.uniform_data);
            self.uniform_dirty = false;
        }
    }

    /// Layout of group 1 for building texture bind groups.
    pub fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_bind_group_layout
    }

    /// Bind pipeline and groups 0/1 on `pass`. Returns `false` (and binds
    /// nothing) while no compile has succeeded.
    pub fn apply(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        textures: Option<&wgpu::BindGroup>,
    ) -> bool {
        let Some(pipeline) = &self.pipeline else {
            return false;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        match textures.or(self.empty_texture_bind_group.as_ref()) {
            Some(bind_group) => pass.set_bind_group(1, bind_group, &[]),
            None => {}
        }
        true
    }

    /// Fullscreen draw: apply and emit the 3-vertex triangle.
    pub fn draw_fullscreen(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        textures: Option<&wgpu::BindGroup>,
    ) {
        if self.apply(pass, textures) {
            pass.draw(0..3, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_fields_pack_tightly() {
        let layout = UniformLayout::builder()
            .field("qrk_exposure", UniformType::Float)
            .field("qrk_toneMapOp", UniformType::Int)
            .field("qrk_gamma", UniformType::Float)
            .build();
        assert_eq!(layout.offset_of("qrk_exposure"), Some(0));
        assert_eq!(layout.offset_of("qrk_toneMapOp"), Some(4));
        assert_eq!(layout.offset_of("qrk_gamma"), Some(8));
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn vec3_aligns_to_sixteen() {
        let layout = UniformLayout::builder()
            .field("qrk_time", UniformType::Float)
            .field("qrk_lightDir", UniformType::Vec3)
            .field("qrk_intensity", UniformType::Float)
            .build();
        assert_eq!(layout.offset_of("qrk_time"), Some(0));
        assert_eq!(layout.offset_of("qrk_lightDir"), Some(16));
        // f32 packs into the vec3's trailing pad slot.
        assert_eq!(layout.offset_of("qrk_intensity"), Some(28));
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn matrices_and_arrays_use_sixteen_byte_strides() {
        let layout = UniformLayout::builder()
            .field("qrk_viewProj", UniformType::Mat4)
            .field("qrk_ssaoKernel", UniformType::Vec4Array(64))
            .build();
        assert_eq!(layout.offset_of("qrk_viewProj"), Some(0));
        assert_eq!(layout.offset_of("qrk_ssaoKernel"), Some(64));
        assert_eq!(layout.size(), 64 + 64 * 16);
    }

    #[test]
    fn block_size_is_at_least_sixteen() {
        let layout = UniformLayout::builder()
            .field("qrk_mip", UniformType::Float)
            .build();
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn type_mismatch_is_detected() {
        let ty = UniformType::Vec3;
        assert!(ty.matches(&UniformValue::Vec3([0.0; 3])));
        assert!(!ty.matches(&UniformValue::Vec4([0.0; 4])));
        assert!(!ty.matches(&UniformValue::Float(0.0)));
    }

    #[test]
    fn array_values_may_not_exceed_declared_length() {
        let ty = UniformType::Vec4Array(4);
        assert!(ty.matches(&UniformValue::Vec4Array(vec![[0.0; 4]; 4])));
        assert!(!ty.matches(&UniformValue::Vec4Array(vec![[0.0; 4]; 5])));
    }

    #[test]
    fn engine_prefix_is_reserved() {
        assert_eq!(ENGINE_UNIFORM_PREFIX, "qrk_");
    }
}
