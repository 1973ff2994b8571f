//! Application runner: window, event loop, frame timing, and the
//! camera-controller binding contract.
//!
//! The runner owns the pieces the pipeline treats as external: the winit
//! window, the input snapshot, the active camera controller, and the
//! parameter editor. Each frame it lets the editor mutate the option
//! snapshot, applies pre-frame changes (rebinding the camera controller
//! when the control mode flipped), advances the camera, and hands the
//! frame to the pipeline.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::camera::{Camera, CameraController, FlyController, OrbitController};
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::options::{CameraControlMode, RenderOptions};
use crate::pipeline::{DeferredPipeline, DrawScene};

/// Window configuration.
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "phalanx".to_string(),
            width: 1600,
            height: 900,
        }
    }
}

/// The external parameter editor's surface: mutate options before the
/// frame (reading whatever input it likes), draw the overlay after all 3D
/// content.
pub trait Editor {
    fn edit(&mut self, input: &Input, options: &mut RenderOptions);
    fn draw_overlay(&mut self, gpu: &GpuContext, pass: &mut wgpu::RenderPass<'_>);
}

/// Everything a setup closure hands back to the runner.
pub struct AppSetup {
    pub scene: Box<dyn DrawScene>,
    pub options: RenderOptions,
    pub camera: Camera,
    pub editor: Option<Box<dyn Editor>>,
}

/// Run the renderer with a setup closure.
///
/// The closure receives the GPU context once it exists and returns the
/// scene, initial options, and camera.
pub fn run<S>(config: AppConfig, setup: S)
where
    S: FnOnce(&GpuContext) -> AppSetup + 'static,
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        config,
        setup: Some(Box::new(setup)),
        state: None,
    };
    event_loop.run_app(&mut app).expect("Event loop failed");
}

type SetupFn = Box<dyn FnOnce(&GpuContext) -> AppSetup>;

struct AppState {
    window: Arc<Window>,
    gpu: GpuContext,
    pipeline: DeferredPipeline,
    scene: Box<dyn DrawScene>,
    options: RenderOptions,
    camera: Camera,
    editor: Option<Box<dyn Editor>>,
    input: Input,
    fly: FlyController,
    orbit: OrbitController,
    active_control: CameraControlMode,
    last_frame: Instant,
}

impl AppState {
    fn active_controller(&mut self) -> &mut dyn CameraController {
        match self.active_control {
            CameraControlMode::Fly => &mut self.fly,
            CameraControlMode::Orbit => &mut self.orbit,
        }
    }

    /// Swap the bound controller, letting the incoming one adopt the
    /// camera's current pose.
    fn bind_controller(&mut self, mode: CameraControlMode) {
        self.active_control = mode;
        let camera = self.camera;
        self.active_controller().on_bind(&camera);
    }

    fn frame(&mut self) -> crate::error::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        // Editor contract: read modified values, write derived ones back.
        if let Some(editor) = self.editor.as_mut() {
            editor.edit(&self.input, &mut self.options);
        }
        self.options.frame_ms = dt * 1000.0;

        let changes = self.pipeline.prepare_frame(&mut self.gpu, &self.options)?;
        if changes.camera_control {
            self.bind_controller(self.options.camera_control);
        }

        let input = std::mem::take(&mut self.input);
        let controller: &mut dyn CameraController = match self.active_control {
            CameraControlMode::Fly => &mut self.fly,
            CameraControlMode::Orbit => &mut self.orbit,
        };
        controller.update(&mut self.camera, &input, dt);
        self.input = input;

        let editor = &mut self.editor;
        self.pipeline.render(
            &self.gpu,
            self.scene.as_ref(),
            &self.camera,
            &self.options,
            |gpu, pass| {
                if let Some(editor) = editor.as_mut() {
                    editor.draw_overlay(gpu, pass);
                }
            },
        )?;

        self.input.begin_frame();
        Ok(())
    }
}

struct App {
    config: AppConfig,
    setup: Option<SetupFn>,
    state: Option<AppState>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let window = Arc::new(
            event_loop
                .create_window(
                    WindowAttributes::default()
                        .with_title(&self.config.title)
                        .with_inner_size(winit::dpi::LogicalSize::new(
                            self.config.width,
                            self.config.height,
                        )),
                )
                .expect("Failed to create window"),
        );

        let gpu = GpuContext::new(window.clone());
        let setup = self.setup.take().expect("setup closure already consumed");
        let AppSetup {
            scene,
            options,
            camera,
            editor,
        } = setup(&gpu);

        let pipeline = match DeferredPipeline::new(&gpu, &options) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("pipeline setup failed: {e}");
                event_loop.exit();
                return;
            }
        };

        let mut state = AppState {
            window,
            gpu,
            pipeline,
            scene,
            options,
            camera,
            editor,
            input: Input::new(),
            fly: FlyController::new(),
            orbit: OrbitController::new(),
            active_control: CameraControlMode::Fly,
            last_frame: Instant::now(),
        };
        let mode = state.options.camera_control;
        state.bind_controller(mode);
        state.window.request_redraw();
        self.state = Some(state);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        state.input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.gpu.resize(size.width, size.height);
                if let Err(e) = state.pipeline.resize(&state.gpu, &state.options) {
                    log::error!("resize failed: {e}");
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = state.frame() {
                    // Resource and protocol errors are programmer errors;
                    // crash loudly rather than render wrong frames.
                    log::error!("frame failed: {e}");
                    event_loop.exit();
                    return;
                }
                state.window.request_redraw();
            }
            _ => {}
        }
    }
}
