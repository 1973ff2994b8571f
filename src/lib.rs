//! # Phalanx
//!
//! **A physically-based deferred renderer built on wgpu.**
//!
//! Phalanx rasterizes a scene into a G-Buffer, resolves direct and
//! image-based lighting, applies ambient occlusion, bloom, tone mapping and
//! antialiasing, and composites to the screen — with every live parameter
//! exposed through a plain options struct an overlay editor can mutate.
//!
//! The load-bearing pieces are the resource layer and the pipeline built on
//! it: typed framebuffer attachments with explicit lifetime and activation
//! rules, a texture-unit allocation protocol that lets independently-written
//! passes share binding slots without coordination, and the multi-pass
//! techniques (cubemap face rendering, GGX prefiltering, irradiance
//! convolution, SSAO, a bloom mip pyramid) composed into one per-frame
//! sequence with explicit cross-pass dependencies.
//!
//! ## Quick Start
//!
//! ```no_run
//! use phalanx::*;
//!
//! struct Empty;
//! impl DrawScene for Empty {
//!     fn draw(&self, _pass: &mut ScenePass) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() {
//!     run(AppConfig::default(), |gpu| AppSetup {
//!         scene: Box::new(Empty),
//!         options: RenderOptions::default(),
//!         camera: Camera::new(),
//!         editor: None,
//!     });
//! }
//! ```
//!
//! ## Philosophy
//!
//! - **No ambient GPU state** — every render target is activated through an
//!   explicit, scoped pass; nothing assumes what was bound before it.
//! - **Crash loudly, except shaders** — resource and protocol errors are
//!   fatal `Err`s; shader compile failures log and keep the last good
//!   pipeline so WGSL can be edited live.
//! - **Deterministic binding** — texture units follow registration order,
//!   never container iteration order.

mod app;
mod binding;
mod bloom;
mod camera;
mod cubemap;
mod error;
mod formats;
mod framebuffer;
mod gpu;
mod hot_shader;
mod ibl;
mod input;
mod mesh;
mod options;
mod pipeline;
mod shader;
mod shadow;
mod ssao;
mod texture;

pub use app::{AppConfig, AppSetup, Editor, run};
pub use binding::{
    BoundTexture, NamedTexture, TextureBinder, TextureRegistry, TextureSource,
    TextureUnitAllocator, UniformSource,
};
pub use bloom::{BloomConfig, BloomDraw, BloomPass, multipass_plan};
pub use camera::{Camera, CameraController, FlyController, OrbitController};
pub use cubemap::{CubemapRenderHelper, FACE_VIEWS, face_projection, face_view};
pub use error::{RenderError, Result};
pub use formats::{AttachmentClass, BufferType};
pub use framebuffer::{
    Attachment, AttachmentPlanner, AttachmentTarget, Framebuffer, LoadAction,
};
pub use gpu::GpuContext;
pub use hot_shader::HotShader;
pub use ibl::{
    BRDF_LUT_SIZE, ENVIRONMENT_SIZE, IRRADIANCE_SIZE, IblBaker, IblMaps, PREFILTER_MIP_LEVELS,
    PREFILTER_SIZE, prefilter_roughness,
};
pub use input::Input;
pub use mesh::{Mesh, Transform, Vertex3d};
pub use options::{
    CameraControlMode, FrameChanges, GBufferChannel, RenderOptions, ToneMapOp, diff_options,
};
pub use pipeline::{DeferredPipeline, DrawScene, MAX_SCENE_DRAWS, Material, ScenePass};
pub use shader::{
    DepthConfig, ENGINE_UNIFORM_PREFIX, Shader, ShaderConfig, UniformLayout, UniformType,
    UniformValue,
};
pub use shadow::{DirectionalLight, SHADOW_MAP_SIZE, ShadowPass};
pub use ssao::{SsaoConfig, SsaoPass, generate_kernel, generate_noise, kernel_scale};
pub use texture::{
    MipPolicy, MipmapGenerator, Texture, TextureHandle, TextureKind, TextureParams,
    f32_to_f16_bits, mip_count_for, mip_size, validate_cubemap_faces,
};

// Re-export wgpu so downstream code can reach the full API without version
// skew, and math types for convenience.
pub use wgpu;
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

// Re-export commonly used winit types for convenience.
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;
