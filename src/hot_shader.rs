//! Hot-reloadable shader sources.
//!
//! A [`HotShader`] watches a WGSL file on disk and reports when it changes;
//! [`HotShader::apply_to`] recompiles the owning [`Shader`] with the new
//! source. Compile failures are soft (see [`crate::shader`]), so a broken
//! edit keeps the last working pipeline on screen while the file is fixed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;
use crate::gpu::GpuContext;
use crate::shader::Shader;

/// A shader source that can be hot-reloaded from disk.
pub struct HotShader {
    path: PathBuf,
    last_modified: SystemTime,
    source: String,
}

impl HotShader {
    /// Load a shader source from the given file path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let source = fs::read_to_string(&path)?;
        let last_modified = fs::metadata(&path)?.modified()?;

        Ok(Self {
            path,
            last_modified,
            source,
        })
    }

    /// Check whether the file changed and re-read it if so.
    /// Returns `true` if the source was reloaded.
    pub fn check_reload(&mut self) -> bool {
        let Ok(metadata) = fs::metadata(&self.path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };

        if modified > self.last_modified {
            if let Ok(source) = fs::read_to_string(&self.path) {
                log::info!("reloading shader {}", self.path.display());
                self.source = source;
                self.last_modified = modified;
                return true;
            }
        }

        false
    }

    /// Reload if the file changed, recompiling `shader` with the new source.
    /// Returns `true` if a recompile was attempted.
    pub fn apply_to(&mut self, gpu: &GpuContext, shader: &mut Shader) -> bool {
        if self.check_reload() {
            shader.recompile(gpu, &self.source);
            true
        } else {
            false
        }
    }

    /// The current shader source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The watched file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_shader(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_initial_source() {
        let path = temp_shader("phalanx_hot_initial.wgsl", "// v1");
        let shader = HotShader::new(&path).unwrap();
        assert_eq!(shader.source(), "// v1");
        fs::remove_file(path).ok();
    }

    #[test]
    fn unchanged_file_does_not_reload() {
        let path = temp_shader("phalanx_hot_unchanged.wgsl", "// v1");
        let mut shader = HotShader::new(&path).unwrap();
        assert!(!shader.check_reload());
        fs::remove_file(path).ok();
    }

    #[test]
    fn modified_file_reloads() {
        let path = temp_shader("phalanx_hot_modified.wgsl", "// v1");
        let mut shader = HotShader::new(&path).unwrap();

        // File mtime resolution can be coarse; make sure the rewrite lands
        // strictly later.
        std::thread::sleep(std::time::Duration::from_millis(50));
        fs::write(&path, "// v2").unwrap();

        assert!(shader.check_reload());
        assert_eq!(shader.source(), "// v2");
        fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(HotShader::new("/nonexistent/shader.wgsl").is_err());
    }
}
