//! The per-frame deferred rendering pipeline.
//!
//! [`DeferredPipeline`] owns every render target and pass and executes the
//! fixed stage sequence each frame, each stage wrapped in a named GPU debug
//! group:
//!
//! 1. shadow (optional) — scene depth from the directional light
//! 2. geometry — G-Buffer fill, optionally wireframe
//! 3. G-Buffer visualization — debug short-circuit straight to screen
//! 4. SSAO (optional) — raw occlusion, then blur
//! 5. lighting — deferred resolve into the HDR scene target
//! 6. forward — depth blit from the G-Buffer, then skybox and overlays
//!    that need the real depth buffer
//! 7. bloom (optional) — mip pyramid over the scene color
//! 8. tone map & gamma — HDR resolve with the bloom mix
//! 9. antialiasing / present — FXAA or a plain blit to the surface
//! 10. overlay composite — the editor hook, always last
//!
//! Option changes that need more than a uniform (camera control, vsync,
//! skybox) are diffed against the previous frame's snapshot and applied in
//! [`DeferredPipeline::prepare_frame`], before stage 1.

use glam::{Mat4, Vec3};

use crate::binding::{NamedTexture, TextureBinder, TextureRegistry, TextureSource};
use crate::bloom::{BloomConfig, BloomPass};
use crate::camera::Camera;
use crate::error::Result;
use crate::formats::BufferType;
use crate::framebuffer::{Framebuffer, LoadAction};
use crate::gpu::GpuContext;
use crate::ibl::{IblBaker, IblMaps};
use crate::mesh::{Mesh, Transform, Vertex3d};
use crate::options::{FrameChanges, RenderOptions, diff_options};
use crate::shader::{
    DepthConfig, Shader, ShaderConfig, UniformLayout, UniformType, UniformValue,
};
use crate::shadow::{DirectionalLight, ShadowPass};
use crate::ssao::{SsaoConfig, SsaoPass};
use crate::texture::{Texture, TextureHandle, TextureParams};

/// Upper bound on scene draw calls per pass (sizes the model uniform ring).
pub const MAX_SCENE_DRAWS: u32 = 1024;
/// Dynamic-offset stride for per-draw model uniforms.
const MODEL_STRIDE: u64 = 256;
/// Scene-drawing stages per frame (shadow, geometry, debug normals). Each
/// gets its own region of the model buffer: all uniform writes in a frame
/// are staged until submit, so passes must not share offsets.
const SCENE_PASS_REGIONS: u32 = 3;

/// Per-draw uniforms for scene geometry (bind group 2, dynamic offset).
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniforms {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    base_color: [f32; 4],
    /// x: roughness, y: metallic, z: emission strength.
    material: [f32; 4],
}

/// Surface properties for one draw call.
#[derive(Clone)]
pub struct Material {
    /// Albedo texture; a 1x1 white fallback is used when absent.
    pub albedo: Option<TextureHandle>,
    pub base_color: [f32; 4],
    pub roughness: f32,
    pub metallic: f32,
    pub emission: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: None,
            base_color: [1.0, 1.0, 1.0, 1.0],
            roughness: 0.5,
            metallic: 0.0,
            emission: 0.0,
        }
    }
}

/// Scene geometry provider — the seam to the external model loader.
///
/// The pipeline activates the right framebuffer and shader, then hands the
/// scene a [`ScenePass`] to issue draw calls through. Implementations stay
/// ignorant of which stage (geometry, shadow, debug) is drawing them.
pub trait DrawScene {
    fn draw(&self, pass: &mut ScenePass<'_, '_>) -> Result<()>;
}

/// GPU plumbing shared by every scene-drawing stage.
struct SceneResources {
    model_buffer: wgpu::Buffer,
    model_bind_group: wgpu::BindGroup,
    model_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    default_albedo: Texture,
}

impl SceneResources {
    fn new(gpu: &GpuContext) -> Result<Self> {
        let model_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Model Uniforms"),
            size: (MAX_SCENE_DRAWS * SCENE_PASS_REGIONS) as u64 * MODEL_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let model_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Scene Model Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<ModelUniforms>() as u64,
                        ),
                    },
                    count: None,
                }],
            });

        let model_bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Model Bind Group"),
            layout: &model_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &model_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<ModelUniforms>() as u64),
                }),
            }],
        });

        let material_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Scene Material Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let default_albedo = Texture::from_data(
            gpu,
            &[255, 255, 255, 255],
            1,
            1,
            4,
            &TextureParams::default(),
            "Default Albedo",
        )?;

        Ok(Self {
            model_buffer,
            model_bind_group,
            model_layout,
            material_layout,
            default_albedo,
        })
    }
}

/// Records scene draw calls into an active render pass.
///
/// Material textures are bound through a usage block so per-draw units are
/// handed back after every draw instead of leaking out of the registry's
/// allocation.
pub struct ScenePass<'a, 'e> {
    pass: &'a mut wgpu::RenderPass<'e>,
    gpu: &'a GpuContext,
    resources: &'a SceneResources,
    binder: &'a mut TextureBinder,
    bind_materials: bool,
    /// Which model-buffer region this stage writes (see `SCENE_PASS_REGIONS`).
    region: u32,
    draw_index: u32,
}

impl ScenePass<'_, '_> {
    /// Draw one mesh with its transform and material.
    pub fn draw_mesh(
        &mut self,
        mesh: &Mesh,
        transform: &Transform,
        material: &Material,
    ) -> Result<()> {
        if self.draw_index >= MAX_SCENE_DRAWS {
            log::warn!("scene draw budget exhausted ({MAX_SCENE_DRAWS}), dropping draw");
            return Ok(());
        }

        let model = transform.matrix();
        let uniforms = ModelUniforms {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            base_color: material.base_color,
            material: [material.roughness, material.metallic, material.emission, 0.0],
        };
        let offset = (self.region * MAX_SCENE_DRAWS + self.draw_index) as u64 * MODEL_STRIDE;
        self.gpu
            .queue
            .write_buffer(&self.resources.model_buffer, offset, bytemuck::bytes_of(&uniforms));
        self.pass
            .set_bind_group(2, &self.resources.model_bind_group, &[offset as u32]);

        if self.bind_materials {
            self.binder.push_usage_block();
            let albedo = material
                .albedo
                .clone()
                .unwrap_or_else(|| self.resources.default_albedo.handle());
            self.binder.bind("albedoMap", albedo.clone());

            let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Scene Material"),
                layout: &self.resources.material_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&albedo.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&albedo.sampler),
                    },
                ],
            });
            self.pass.set_bind_group(3, &bind_group, &[]);
            self.binder.pop_usage_block()?;
        }

        mesh.draw(self.pass);
        self.draw_index += 1;
        Ok(())
    }
}

/// The G-Buffer: one framebuffer, four color attachments plus depth.
struct GBuffer {
    framebuffer: Framebuffer,
}

impl GBuffer {
    fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self> {
        let mut framebuffer = Framebuffer::new(width, height, "G-Buffer");
        framebuffer.attach_texture(gpu, BufferType::ColorHdrAlpha, &TextureParams::default())?;
        framebuffer.attach_texture(gpu, BufferType::ColorHdrAlpha, &TextureParams::default())?;
        framebuffer.attach_texture(gpu, BufferType::ColorAlpha, &TextureParams::default())?;
        framebuffer.attach_texture(gpu, BufferType::ColorHdrAlpha, &TextureParams::default())?;
        framebuffer.attach_texture(gpu, BufferType::Depth, &TextureParams::default())?;
        Ok(Self { framebuffer })
    }

    fn handles(&self) -> Result<GBufferTextures> {
        Ok(GBufferTextures {
            position: self.framebuffer.color_attachment(0)?.handle()?,
            normal_roughness: self.framebuffer.color_attachment(1)?.handle()?,
            albedo_metallic: self.framebuffer.color_attachment(2)?.handle()?,
            emission: self.framebuffer.color_attachment(3)?.handle()?,
        })
    }
}

/// The G-Buffer's sampleable side, registered with the lighting registry.
#[derive(Clone)]
struct GBufferTextures {
    position: TextureHandle,
    normal_roughness: TextureHandle,
    albedo_metallic: TextureHandle,
    emission: TextureHandle,
}

impl TextureSource for GBufferTextures {
    fn bind_textures(&self, binder: &mut TextureBinder) -> Result<()> {
        binder.bind("qrk_gPosition", self.position.clone());
        binder.bind("qrk_gNormalRoughness", self.normal_roughness.clone());
        binder.bind("qrk_gAlbedoMetallic", self.albedo_metallic.clone());
        binder.bind("qrk_gEmission", self.emission.clone());
        Ok(())
    }
}

/// Everything the per-frame state machine owns.
pub struct DeferredPipeline {
    width: u32,
    height: u32,

    scene_resources: SceneResources,
    gbuffer: GBuffer,
    main: Framebuffer,
    post: Framebuffer,

    shadow: ShadowPass,
    ssao: SsaoPass,
    bloom: BloomPass,
    ibl_baker: IblBaker,
    ibl_maps: IblMaps,
    skybox_room: Mesh,

    geometry_shader: Shader,
    geometry_wireframe_shader: Shader,
    lighting_shader: Shader,
    skybox_shader: Shader,
    normals_shader: Shader,
    tonemap_shader: Shader,
    fxaa_shader: Shader,
    present_shader: Shader,
    gbuffer_vis_shader: Shader,

    registry: TextureRegistry,
    binder: TextureBinder,

    previous_options: RenderOptions,
    baked_skybox: Option<String>,
}

impl DeferredPipeline {
    pub fn new(gpu: &GpuContext, options: &RenderOptions) -> Result<Self> {
        let width = gpu.width();
        let height = gpu.height();

        let scene_resources = SceneResources::new(gpu)?;
        let gbuffer = GBuffer::new(gpu, width, height)?;

        let mut main = Framebuffer::new(width, height, "Main HDR");
        main.attach_texture(gpu, BufferType::ColorHdr, &TextureParams::default())?;
        main.attach_texture(gpu, BufferType::Depth, &TextureParams::default())?;

        let mut post = Framebuffer::new(width, height, "Tone Mapped");
        post.attach_texture(gpu, BufferType::ColorAlpha, &TextureParams::default())?;

        let shadow = ShadowPass::new(gpu, scene_resources.model_layout.clone())?;
        let handles = gbuffer.handles()?;
        let ssao = SsaoPass::new(
            gpu,
            width,
            height,
            handles.position.clone(),
            handles.normal_roughness.clone(),
            SsaoConfig {
                radius: options.ssao_radius,
                bias: options.ssao_bias,
                ..Default::default()
            },
        )?;
        let bloom = BloomPass::new(gpu, width, height, BloomConfig::default())?;
        let (ibl_baker, ibl_maps) = IblBaker::new(gpu)?;

        // The lighting registry, in registration order. Units are stable
        // because this order is.
        let mut registry = TextureRegistry::new();
        registry.add_source(Box::new(handles.clone()));
        registry.add_source(Box::new(NamedTexture::new(
            "qrk_shadowMap",
            shadow.map_handle()?,
        )));
        registry.add_source(Box::new(NamedTexture::new(
            "qrk_ssao",
            ssao.blurred_handle()?,
        )));
        registry.add_source(Box::new(NamedTexture::new(
            "qrk_irradianceMap",
            ibl_maps.irradiance_handle()?,
        )));
        registry.add_source(Box::new(NamedTexture::new(
            "qrk_ggxPrefilteredEnvMap",
            ibl_maps.prefiltered_handle()?,
        )));
        registry.add_source(Box::new(NamedTexture::new(
            "qrk_ggxBrdfIntegrationMap",
            ibl_maps.brdf_lut_handle()?,
        )));

        let mut binder = TextureBinder::new();
        registry.bind_all(&mut binder)?;

        let geometry_config = |wireframe: bool| ShaderConfig {
            label: if wireframe {
                "Geometry (Wireframe)".to_string()
            } else {
                "Geometry".to_string()
            },
            vertex_layout: Some(Vertex3d::LAYOUT),
            target_formats: gbuffer.framebuffer.color_formats(),
            blend: Some(wgpu::BlendState::REPLACE),
            depth: Some(DepthConfig {
                format: BufferType::Depth.texture_format(),
                write: true,
                compare: wgpu::CompareFunction::LessEqual,
            }),
            polygon_mode: if wireframe {
                wgpu::PolygonMode::Line
            } else {
                wgpu::PolygonMode::Fill
            },
            cull_mode: Some(wgpu::Face::Back),
        };
        let geometry_uniforms = || {
            UniformLayout::builder()
                .field("qrk_view", UniformType::Mat4)
                .field("qrk_viewProj", UniformType::Mat4)
                .build()
        };
        let geometry_shader = Shader::new(
            gpu,
            include_str!("shaders/geometry.wgsl"),
            geometry_uniforms(),
            &[],
            vec![
                scene_resources.model_layout.clone(),
                scene_resources.material_layout.clone(),
            ],
            geometry_config(false),
        );
        let geometry_wireframe_shader = Shader::new(
            gpu,
            include_str!("shaders/geometry.wgsl"),
            geometry_uniforms(),
            &[],
            vec![
                scene_resources.model_layout.clone(),
                scene_resources.material_layout.clone(),
            ],
            geometry_config(true),
        );

        let lighting_shader = Shader::new(
            gpu,
            include_str!("shaders/lighting.wgsl"),
            UniformLayout::builder()
                .field("qrk_invView", UniformType::Mat4)
                .field("qrk_lightViewProj", UniformType::Mat4)
                .field("qrk_lightDir", UniformType::Vec3)
                .field("qrk_shadowBias", UniformType::Float)
                .field("qrk_lightColor", UniformType::Vec3)
                .field("qrk_ggxPrefilteredEnvMapMaxLOD", UniformType::Float)
                .field("qrk_ambientIntensity", UniformType::Float)
                .field("qrk_ssaoEnabled", UniformType::Int)
                .field("qrk_shadowEnabled", UniformType::Int)
                .build(),
            &binder.layout_entries(),
            Vec::new(),
            // The main target carries a depth attachment (cleared here,
            // overwritten by the G-Buffer blit before the forward stage),
            // so the fullscreen pipeline must declare a matching depth
            // state even though it never tests it.
            ShaderConfig::screen("Deferred Lighting", BufferType::ColorHdr.texture_format())
                .with_depth(DepthConfig {
                    format: BufferType::Depth.texture_format(),
                    write: false,
                    compare: wgpu::CompareFunction::Always,
                }),
        );

        let skybox_shader = Shader::new(
            gpu,
            include_str!("shaders/skybox.wgsl"),
            UniformLayout::builder()
                .field("qrk_skyView", UniformType::Mat4)
                .field("qrk_proj", UniformType::Mat4)
                .build(),
            &cube_texture_entries(),
            Vec::new(),
            ShaderConfig {
                label: "Skybox".to_string(),
                vertex_layout: Some(Vertex3d::LAYOUT),
                target_formats: vec![BufferType::ColorHdr.texture_format()],
                blend: Some(wgpu::BlendState::REPLACE),
                depth: Some(DepthConfig {
                    format: BufferType::Depth.texture_format(),
                    write: false,
                    compare: wgpu::CompareFunction::LessEqual,
                }),
                polygon_mode: wgpu::PolygonMode::Fill,
                cull_mode: None,
            },
        );

        let normals_shader = Shader::new(
            gpu,
            include_str!("shaders/normals_vis.wgsl"),
            UniformLayout::builder()
                .field("qrk_viewProj", UniformType::Mat4)
                .build(),
            &[],
            vec![scene_resources.model_layout.clone()],
            ShaderConfig {
                label: "Debug Normals".to_string(),
                vertex_layout: Some(Vertex3d::LAYOUT),
                target_formats: vec![BufferType::ColorHdr.texture_format()],
                blend: Some(wgpu::BlendState::REPLACE),
                depth: Some(DepthConfig {
                    format: BufferType::Depth.texture_format(),
                    write: false,
                    compare: wgpu::CompareFunction::LessEqual,
                }),
                polygon_mode: wgpu::PolygonMode::Fill,
                cull_mode: Some(wgpu::Face::Back),
            },
        );

        let tonemap_shader = Shader::new(
            gpu,
            include_str!("shaders/tonemap.wgsl"),
            UniformLayout::builder()
                .field("qrk_bloomStrength", UniformType::Float)
                .field("qrk_toneMapOp", UniformType::Int)
                .field("qrk_gammaCorrect", UniformType::Int)
                .field("qrk_gamma", UniformType::Float)
                .build(),
            &two_texture_entries(),
            Vec::new(),
            ShaderConfig::screen("Tone Map", BufferType::ColorAlpha.texture_format()),
        );

        let fxaa_shader = Shader::new(
            gpu,
            include_str!("shaders/fxaa.wgsl"),
            UniformLayout::builder()
                .field("qrk_resolution", UniformType::Vec2)
                .build(),
            &one_texture_entries(),
            Vec::new(),
            ShaderConfig::screen("FXAA", gpu.config.format),
        );

        let present_shader = Shader::new(
            gpu,
            include_str!("shaders/blit.wgsl"),
            UniformLayout::builder().build(),
            &one_texture_entries(),
            Vec::new(),
            ShaderConfig::screen("Present", gpu.config.format),
        );

        let gbuffer_vis_shader = Shader::new(
            gpu,
            include_str!("shaders/gbuffer_vis.wgsl"),
            UniformLayout::builder()
                .field("qrk_channel", UniformType::Int)
                .build(),
            &gbuffer_vis_entries(),
            Vec::new(),
            ShaderConfig::screen("G-Buffer Visualization", gpu.config.format),
        );

        Ok(Self {
            width,
            height,
            scene_resources,
            gbuffer,
            main,
            post,
            shadow,
            ssao,
            bloom,
            ibl_baker,
            ibl_maps,
            skybox_room: Mesh::room(gpu),
            geometry_shader,
            geometry_wireframe_shader,
            lighting_shader,
            skybox_shader,
            normals_shader,
            tonemap_shader,
            fxaa_shader,
            present_shader,
            gbuffer_vis_shader,
            registry,
            binder,
            previous_options: options.clone(),
            baked_skybox: None,
        })
    }

    /// Diff the option snapshot against last frame's and apply whatever
    /// must land before stage 1: vsync and the skybox re-bake. The caller
    /// handles camera-control rebinding with the returned flags.
    pub fn prepare_frame(
        &mut self,
        gpu: &mut GpuContext,
        options: &RenderOptions,
    ) -> Result<FrameChanges> {
        let changes = diff_options(&self.previous_options, options);

        if changes.vsync {
            gpu.set_vsync(options.vsync);
        }

        let needs_bake = !options.skybox_path.is_empty()
            && self.baked_skybox.as_deref() != Some(options.skybox_path.as_str());
        if needs_bake {
            let equirect = Texture::from_hdr_file(gpu, &options.skybox_path)?;
            self.ibl_baker.bake(gpu, &equirect, &mut self.ibl_maps)?;
            self.baked_skybox = Some(options.skybox_path.clone());
        }

        self.previous_options = options.clone();
        Ok(changes)
    }

    /// Recreate every screen-sized target after a window resize.
    pub fn resize(&mut self, gpu: &GpuContext, options: &RenderOptions) -> Result<()> {
        if gpu.width() == self.width && gpu.height() == self.height {
            return Ok(());
        }
        log::debug!("resizing pipeline to {}x{}", gpu.width(), gpu.height());
        let baked = self.baked_skybox.clone();
        *self = Self::new(gpu, options)?;
        // Re-bake the environment the old pipeline had.
        if let Some(path) = baked {
            let equirect = Texture::from_hdr_file(gpu, &path)?;
            self.ibl_baker.bake(gpu, &equirect, &mut self.ibl_maps)?;
            self.baked_skybox = Some(path);
        }
        Ok(())
    }

    /// Execute one frame and present it.
    pub fn render<F>(
        &mut self,
        gpu: &GpuContext,
        scene: &dyn DrawScene,
        camera: &Camera,
        options: &RenderOptions,
        overlay: F,
    ) -> Result<()>
    where
        F: FnOnce(&GpuContext, &mut wgpu::RenderPass<'_>),
    {
        let Ok(output) = gpu.surface.get_current_texture() else {
            log::warn!("surface texture unavailable, skipping frame");
            return Ok(());
        };
        let screen_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let view = camera.view_matrix();
        let projection = camera.projection(gpu.aspect());
        let view_proj = projection * view;
        let light = DirectionalLight {
            direction: Vec3::from_array(options.light_direction).normalize_or(Vec3::NEG_Y),
            color: Vec3::from_array(options.light_color),
            ..Default::default()
        };
        let light_view_proj = light.view_projection(Vec3::ZERO);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame"),
            });

        // 1. Shadow
        if options.shadows_enabled {
            encoder.push_debug_group("Shadow");
            self.shadow.shader_mut().set_uniform(
                "qrk_lightViewProj",
                UniformValue::Mat4(light_view_proj.to_cols_array_2d()),
            )?;
            self.shadow.shader_mut().flush_uniforms(gpu);
            {
                let mut pass = self
                    .shadow
                    .framebuffer()
                    .activate(&mut encoder, LoadAction::Clear)?;
                if self.shadow.shader().apply(&mut pass, None) {
                    let mut scene_pass = ScenePass {
                        pass: &mut pass,
                        gpu,
                        resources: &self.scene_resources,
                        binder: &mut self.binder,
                        bind_materials: false,
                        region: 0,
                        draw_index: 0,
                    };
                    scene.draw(&mut scene_pass)?;
                }
            }
            encoder.pop_debug_group();
        }

        // 2. Geometry
        encoder.push_debug_group("Geometry");
        {
            let shader = if options.wireframe {
                &mut self.geometry_wireframe_shader
            } else {
                &mut self.geometry_shader
            };
            shader.set_uniform("qrk_view", UniformValue::Mat4(view.to_cols_array_2d()))?;
            shader.set_uniform(
                "qrk_viewProj",
                UniformValue::Mat4(view_proj.to_cols_array_2d()),
            )?;
            shader.flush_uniforms(gpu);

            let mut pass = self
                .gbuffer
                .framebuffer
                .activate(&mut encoder, LoadAction::Clear)?;
            if shader.apply(&mut pass, None) {
                let mut scene_pass = ScenePass {
                    pass: &mut pass,
                    gpu,
                    resources: &self.scene_resources,
                    binder: &mut self.binder,
                    bind_materials: true,
                    region: 1,
                    draw_index: 0,
                };
                scene.draw(&mut scene_pass)?;
            }
        }
        encoder.pop_debug_group();

        // 3. G-Buffer visualization: short-circuits the rest of the frame.
        if options.gbuffer_vis_enabled {
            encoder.push_debug_group("G-Buffer Visualization");
            self.gbuffer_vis_shader.set_uniform(
                "qrk_channel",
                UniformValue::Int(options.gbuffer_vis_channel.shader_index()),
            )?;
            self.gbuffer_vis_shader.flush_uniforms(gpu);

            let mut vis_binder = TextureBinder::new();
            self.gbuffer.handles()?.bind_textures(&mut vis_binder)?;
            let bind_group = vis_binder.create_bind_group(
                &gpu.device,
                self.gbuffer_vis_shader.texture_layout(),
                "G-Buffer Visualization",
            );
            {
                let mut pass = screen_pass(&mut encoder, &screen_view, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
                self.gbuffer_vis_shader
                    .draw_fullscreen(&mut pass, Some(&bind_group));
            }
            encoder.pop_debug_group();

            // The overlay still composites on top of the debug view.
            {
                let mut pass = screen_pass(&mut encoder, &screen_view, wgpu::LoadOp::Load);
                overlay(gpu, &mut pass);
            }
            gpu.queue.submit(std::iter::once(encoder.finish()));
            output.present();
            return Ok(());
        }

        // 4. SSAO
        if options.ssao_enabled {
            encoder.push_debug_group("SSAO");
            self.ssao.draw(gpu, &mut encoder, projection)?;
            encoder.pop_debug_group();
        }

        // 5. Lighting
        encoder.push_debug_group("Deferred Lighting");
        {
            let shader = &mut self.lighting_shader;
            shader.set_uniform(
                "qrk_invView",
                UniformValue::Mat4(view.inverse().to_cols_array_2d()),
            )?;
            shader.set_uniform(
                "qrk_lightViewProj",
                UniformValue::Mat4(light_view_proj.to_cols_array_2d()),
            )?;
            shader.set_uniform(
                "qrk_lightDir",
                UniformValue::Vec3(light.direction.to_array()),
            )?;
            shader.set_uniform("qrk_shadowBias", UniformValue::Float(options.shadow_bias))?;
            shader.set_uniform("qrk_lightColor", UniformValue::Vec3(light.color.to_array()))?;
            shader.set_uniform(
                "qrk_ggxPrefilteredEnvMapMaxLOD",
                UniformValue::Float(self.ibl_maps.max_prefilter_lod()?),
            )?;
            shader.set_uniform(
                "qrk_ambientIntensity",
                UniformValue::Float(options.ambient_intensity),
            )?;
            shader.set_uniform(
                "qrk_ssaoEnabled",
                UniformValue::Int(options.ssao_enabled as i32),
            )?;
            shader.set_uniform(
                "qrk_shadowEnabled",
                UniformValue::Int(options.shadows_enabled as i32),
            )?;
            shader.update_uniforms()?;
            shader.flush_uniforms(gpu);

            self.registry.bind_all(&mut self.binder)?;
            let bind_group = self.binder.create_bind_group(
                &gpu.device,
                self.lighting_shader.texture_layout(),
                "Lighting Inputs",
            );

            let mut pass = self.main.activate(&mut encoder, LoadAction::Clear)?;
            self.lighting_shader
                .draw_fullscreen(&mut pass, Some(&bind_group));
        }
        encoder.pop_debug_group();

        // 6. Forward: reuse the geometry pass depth, then draw what needs it.
        encoder.push_debug_group("Forward");
        {
            self.gbuffer
                .framebuffer
                .blit_depth_to(&mut encoder, &self.main)?;

            self.skybox_shader.set_uniform(
                "qrk_skyView",
                UniformValue::Mat4(camera.sky_view_matrix().to_cols_array_2d()),
            )?;
            self.skybox_shader.set_uniform(
                "qrk_proj",
                UniformValue::Mat4(projection.to_cols_array_2d()),
            )?;
            self.skybox_shader.flush_uniforms(gpu);

            let mut sky_binder = TextureBinder::new();
            sky_binder.bind("qrk_skybox", self.ibl_maps.environment_handle()?);
            let sky_bind_group = sky_binder.create_bind_group(
                &gpu.device,
                self.skybox_shader.texture_layout(),
                "Skybox",
            );
            {
                let mut pass = self.main.activate(&mut encoder, LoadAction::Keep)?;
                if self.skybox_shader.apply(&mut pass, Some(&sky_bind_group)) {
                    self.skybox_room.draw(&mut pass);
                }
            }

            if options.debug_normals {
                self.normals_shader.set_uniform(
                    "qrk_viewProj",
                    UniformValue::Mat4(view_proj.to_cols_array_2d()),
                )?;
                self.normals_shader.flush_uniforms(gpu);
                let mut pass = self.main.activate(&mut encoder, LoadAction::Keep)?;
                if self.normals_shader.apply(&mut pass, None) {
                    let mut scene_pass = ScenePass {
                        pass: &mut pass,
                        gpu,
                        resources: &self.scene_resources,
                        binder: &mut self.binder,
                        bind_materials: false,
                        region: 2,
                        draw_index: 0,
                    };
                    scene.draw(&mut scene_pass)?;
                }
            }
        }
        encoder.pop_debug_group();

        // 7. Bloom
        if options.bloom_enabled {
            encoder.push_debug_group("Bloom");
            self.bloom.multipass_draw(gpu, &mut encoder, &self.main)?;
            encoder.pop_debug_group();
        }

        // 8. Tone map & gamma
        encoder.push_debug_group("Tone Map");
        {
            let strength = if options.bloom_enabled {
                options.bloom_strength
            } else {
                0.0
            };
            self.tonemap_shader
                .set_uniform("qrk_bloomStrength", UniformValue::Float(strength))?;
            self.tonemap_shader.set_uniform(
                "qrk_toneMapOp",
                UniformValue::Int(options.tone_map_op.shader_index()),
            )?;
            self.tonemap_shader.set_uniform(
                "qrk_gammaCorrect",
                UniformValue::Int(options.gamma_correct as i32),
            )?;
            self.tonemap_shader
                .set_uniform("qrk_gamma", UniformValue::Float(options.gamma))?;
            self.tonemap_shader.flush_uniforms(gpu);

            let mut tonemap_binder = TextureBinder::new();
            tonemap_binder.bind("qrk_scene", self.main.color_attachment(0)?.handle()?);
            tonemap_binder.bind("qrk_bloomMipChain", self.bloom.output_handle()?);
            let bind_group = tonemap_binder.create_bind_group(
                &gpu.device,
                self.tonemap_shader.texture_layout(),
                "Tone Map Inputs",
            );

            let mut pass = self.post.activate(&mut encoder, LoadAction::Clear)?;
            self.tonemap_shader
                .draw_fullscreen(&mut pass, Some(&bind_group));
        }
        encoder.pop_debug_group();

        // 9. Antialiasing / present
        encoder.push_debug_group("Present");
        {
            let mut present_binder = TextureBinder::new();
            present_binder.bind("qrk_screen", self.post.color_attachment(0)?.handle()?);

            let shader = if options.fxaa_enabled {
                self.fxaa_shader.set_uniform(
                    "qrk_resolution",
                    UniformValue::Vec2([gpu.width() as f32, gpu.height() as f32]),
                )?;
                self.fxaa_shader.flush_uniforms(gpu);
                &self.fxaa_shader
            } else {
                &self.present_shader
            };
            let bind_group = present_binder.create_bind_group(
                &gpu.device,
                shader.texture_layout(),
                "Present Input",
            );

            let mut pass = screen_pass(&mut encoder, &screen_view, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
            shader.draw_fullscreen(&mut pass, Some(&bind_group));
        }
        encoder.pop_debug_group();

        // 10. Overlay composite, always last.
        {
            let mut pass = screen_pass(&mut encoder, &screen_view, wgpu::LoadOp::Load);
            overlay(gpu, &mut pass);
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// The lighting texture registry, for registering additional sources
    /// before the first frame.
    pub fn registry_mut(&mut self) -> &mut TextureRegistry {
        &mut self.registry
    }

    /// The lighting shader, for attaching external uniform sources.
    pub fn lighting_shader_mut(&mut self) -> &mut Shader {
        &mut self.lighting_shader
    }
}

/// Begin a plain color pass on the surface.
fn screen_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Screen"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn one_texture_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    sampled_entries(&[wgpu::TextureViewDimension::D2])
}

fn two_texture_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    sampled_entries(&[wgpu::TextureViewDimension::D2, wgpu::TextureViewDimension::D2])
}

fn cube_texture_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    sampled_entries(&[wgpu::TextureViewDimension::Cube])
}

fn gbuffer_vis_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    sampled_entries(&[wgpu::TextureViewDimension::D2; 4])
}

fn sampled_entries(dimensions: &[wgpu::TextureViewDimension]) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(dimensions.len() * 2);
    for (unit, dimension) in dimensions.iter().enumerate() {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (unit * 2) as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: *dimension,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (unit * 2 + 1) as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_uniforms_fit_the_dynamic_stride() {
        assert!(std::mem::size_of::<ModelUniforms>() as u64 <= MODEL_STRIDE);
        // Dynamic offsets must be 256-aligned on baseline limits.
        assert_eq!(MODEL_STRIDE % 256, 0);
    }

    #[test]
    fn default_material_is_white_dielectric() {
        let material = Material::default();
        assert_eq!(material.base_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(material.metallic, 0.0);
        assert!(material.albedo.is_none());
    }

    #[test]
    fn sampled_entries_follow_the_unit_convention() {
        let entries = sampled_entries(&[
            wgpu::TextureViewDimension::D2,
            wgpu::TextureViewDimension::Cube,
        ]);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].binding, 0);
        assert_eq!(entries[1].binding, 1);
        assert_eq!(entries[2].binding, 2);
        assert_eq!(entries[3].binding, 3);
    }
}
