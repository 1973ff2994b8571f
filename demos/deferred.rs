//! Full deferred pipeline demo: a roughness/metallic sphere grid over a
//! floor plane, lit by a directional light and an optional HDR environment.
//!
//! Pass an equirectangular `.hdr` file as the first argument to light the
//! scene with it:
//!
//! ```sh
//! cargo run --example deferred -- assets/studio.hdr
//! ```
//!
//! Keys: 1 wireframe, 2 SSAO, 3 bloom, 4 FXAA, 5 shadows, G G-Buffer view,
//! N debug normals, C camera mode, V vsync.

use phalanx::*;

struct SphereGrid {
    sphere: Mesh,
    cube: Mesh,
    floor: Mesh,
}

impl DrawScene for SphereGrid {
    fn draw(&self, pass: &mut ScenePass) -> Result<()> {
        pass.draw_mesh(
            &self.floor,
            &Transform::from_position(Vec3::new(0.0, -1.2, 0.0)),
            &Material {
                base_color: [0.35, 0.35, 0.38, 1.0],
                roughness: 0.85,
                ..Default::default()
            },
        )?;

        // 6x3 grid: roughness left to right, metallic bottom to top.
        for row in 0..3 {
            for col in 0..6 {
                let roughness = (col as f32 / 5.0).max(0.05);
                let metallic = row as f32 / 2.0;
                pass.draw_mesh(
                    &self.sphere,
                    &Transform::from_position(Vec3::new(
                        (col as f32 - 2.5) * 2.4,
                        row as f32 * 2.4,
                        0.0,
                    )),
                    &Material {
                        base_color: [0.8, 0.2, 0.2, 1.0],
                        roughness,
                        metallic,
                        ..Default::default()
                    },
                )?;
            }
        }

        // A couple of emissive cubes to feed the bloom pyramid.
        for (x, color) in [(-9.0, [0.2, 0.6, 1.0, 1.0]), (9.0, [1.0, 0.6, 0.1, 1.0])] {
            pass.draw_mesh(
                &self.cube,
                &Transform::from_position(Vec3::new(x, 1.0, -2.0)).uniform_scale(1.5),
                &Material {
                    base_color: color,
                    emission: 8.0,
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }
}

/// Keyboard stand-in for the overlay parameter editor.
struct KeyEditor;

impl Editor for KeyEditor {
    fn edit(&mut self, input: &Input, options: &mut RenderOptions) {
        if input.key_pressed(KeyCode::Digit1) {
            options.wireframe = !options.wireframe;
        }
        if input.key_pressed(KeyCode::Digit2) {
            options.ssao_enabled = !options.ssao_enabled;
        }
        if input.key_pressed(KeyCode::Digit3) {
            options.bloom_enabled = !options.bloom_enabled;
        }
        if input.key_pressed(KeyCode::Digit4) {
            options.fxaa_enabled = !options.fxaa_enabled;
        }
        if input.key_pressed(KeyCode::Digit5) {
            options.shadows_enabled = !options.shadows_enabled;
        }
        if input.key_pressed(KeyCode::KeyG) {
            options.gbuffer_vis_enabled = !options.gbuffer_vis_enabled;
        }
        if input.key_pressed(KeyCode::KeyN) {
            options.debug_normals = !options.debug_normals;
        }
        if input.key_pressed(KeyCode::KeyC) {
            options.camera_control = match options.camera_control {
                CameraControlMode::Fly => CameraControlMode::Orbit,
                CameraControlMode::Orbit => CameraControlMode::Fly,
            };
        }
        if input.key_pressed(KeyCode::KeyV) {
            options.vsync = !options.vsync;
        }
    }

    fn draw_overlay(&mut self, _gpu: &GpuContext, _pass: &mut wgpu::RenderPass<'_>) {
        // A real editor composites its UI here, after all 3D content.
    }
}

fn main() {
    let skybox_path = std::env::args().nth(1).unwrap_or_default();

    run(AppConfig::default(), move |gpu| {
        let scene = SphereGrid {
            sphere: Mesh::sphere(gpu, 48, 24),
            cube: Mesh::cube(gpu),
            floor: Mesh::plane(gpu, 30.0),
        };

        let options = RenderOptions {
            skybox_path,
            ..Default::default()
        };

        AppSetup {
            scene: Box::new(scene),
            options,
            camera: Camera::new()
                .at(Vec3::new(0.0, 3.0, 14.0))
                .looking_at(Vec3::new(0.0, 2.0, 0.0)),
            editor: Some(Box::new(KeyEditor)),
        }
    });
}
