//! Live render parameters — the contract with the external parameter
//! editor.
//!
//! The orchestrator exchanges this plain, serializable struct with the
//! editor every frame: the editor mutates whatever it likes, and the
//! pipeline compares the new snapshot against the previous frame's before
//! the frame begins, applying the handful of changes that need more than a
//! uniform update (camera control rebinding, vsync, a skybox re-bake).

use serde::{Deserialize, Serialize};

/// Tone-mapping operator selection, matched by the post-process shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneMapOp {
    None,
    Reinhard,
    ReinhardLuminance,
    Aces,
}

impl ToneMapOp {
    /// The integer the tone-map shader switches on.
    pub fn shader_index(self) -> i32 {
        match self {
            ToneMapOp::None => 0,
            ToneMapOp::Reinhard => 1,
            ToneMapOp::ReinhardLuminance => 2,
            ToneMapOp::Aces => 3,
        }
    }
}

/// Which G-Buffer channel the debug visualization shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GBufferChannel {
    Position,
    Normal,
    Albedo,
    Roughness,
    Metallic,
    Emission,
}

impl GBufferChannel {
    pub fn shader_index(self) -> i32 {
        match self {
            GBufferChannel::Position => 0,
            GBufferChannel::Normal => 1,
            GBufferChannel::Albedo => 2,
            GBufferChannel::Roughness => 3,
            GBufferChannel::Metallic => 4,
            GBufferChannel::Emission => 5,
        }
    }
}

/// How camera input is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraControlMode {
    /// Mouse-look with WASD flight.
    Fly,
    /// Orbit around a focal point.
    Orbit,
}

/// The full per-frame option snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub camera_control: CameraControlMode,
    pub vsync: bool,
    /// Path of the equirectangular HDR skybox source. Changing it re-runs
    /// the whole IBL chain.
    pub skybox_path: String,

    pub shadows_enabled: bool,
    pub shadow_bias: f32,
    pub wireframe: bool,

    pub gbuffer_vis_enabled: bool,
    pub gbuffer_vis_channel: GBufferChannel,
    pub debug_normals: bool,

    pub ssao_enabled: bool,
    pub ssao_radius: f32,
    pub ssao_bias: f32,

    pub bloom_enabled: bool,
    /// Blend factor mixing the bloom chain into the scene at tone-map time.
    pub bloom_strength: f32,

    pub tone_map_op: ToneMapOp,
    pub gamma_correct: bool,
    pub gamma: f32,

    pub fxaa_enabled: bool,

    pub light_direction: [f32; 3],
    pub light_color: [f32; 3],
    pub ambient_intensity: f32,

    // Derived values written back for the editor's display.
    pub frame_ms: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            camera_control: CameraControlMode::Fly,
            vsync: true,
            skybox_path: String::new(),
            shadows_enabled: true,
            shadow_bias: 0.002,
            wireframe: false,
            gbuffer_vis_enabled: false,
            gbuffer_vis_channel: GBufferChannel::Albedo,
            debug_normals: false,
            ssao_enabled: true,
            ssao_radius: 0.5,
            ssao_bias: 0.025,
            bloom_enabled: true,
            bloom_strength: 0.04,
            tone_map_op: ToneMapOp::Aces,
            gamma_correct: true,
            gamma: 2.2,
            fxaa_enabled: true,
            light_direction: [-0.5, -1.0, -0.3],
            light_color: [3.0, 3.0, 3.0],
            ambient_intensity: 1.0,
            frame_ms: 0.0,
        }
    }
}

/// The option deltas that need applying before the frame starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameChanges {
    pub camera_control: bool,
    pub vsync: bool,
    pub skybox: bool,
}

impl FrameChanges {
    pub fn any(&self) -> bool {
        self.camera_control || self.vsync || self.skybox
    }
}

/// Compare this frame's snapshot against the previous frame's.
pub fn diff_options(previous: &RenderOptions, current: &RenderOptions) -> FrameChanges {
    FrameChanges {
        camera_control: previous.camera_control != current.camera_control,
        vsync: previous.vsync != current.vsync,
        skybox: previous.skybox_path != current.skybox_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_snapshots_produce_no_changes() {
        let options = RenderOptions::default();
        assert!(!diff_options(&options, &options.clone()).any());
    }

    #[test]
    fn skybox_swap_is_detected() {
        let previous = RenderOptions::default();
        let mut current = previous.clone();
        current.skybox_path = "env/studio.hdr".to_string();
        let changes = diff_options(&previous, &current);
        assert!(changes.skybox);
        assert!(!changes.vsync);
        assert!(!changes.camera_control);
    }

    #[test]
    fn uniform_only_changes_need_no_reapply() {
        let previous = RenderOptions::default();
        let mut current = previous.clone();
        current.bloom_strength = 0.2;
        current.tone_map_op = ToneMapOp::Reinhard;
        current.ssao_enabled = false;
        assert!(!diff_options(&previous, &current).any());
    }

    #[test]
    fn control_mode_swap_is_detected() {
        let previous = RenderOptions::default();
        let mut current = previous.clone();
        current.camera_control = CameraControlMode::Orbit;
        assert!(diff_options(&previous, &current).camera_control);
    }

    #[test]
    fn tone_map_indices_match_the_shader_switch() {
        assert_eq!(ToneMapOp::None.shader_index(), 0);
        assert_eq!(ToneMapOp::Reinhard.shader_index(), 1);
        assert_eq!(ToneMapOp::ReinhardLuminance.shader_index(), 2);
        assert_eq!(ToneMapOp::Aces.shader_index(), 3);
    }

}
