use crate::pricing::Technology;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Maximum bounding box a sliced model may occupy, in millimeters, per
/// technology. These are the printer build-volume limits from the data model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuildVolume {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BuildVolume {
    pub const FDM: BuildVolume = BuildVolume {
        x: 250.0,
        y: 210.0,
        z: 210.0,
    };

    pub const SLA: BuildVolume = BuildVolume {
        x: 120.0,
        y: 120.0,
        z: 150.0,
    };

    pub fn for_technology(tech: Technology) -> Self {
        match tech {
            Technology::Fdm => Self::FDM,
            Technology::Sla => Self::SLA,
        }
    }

    /// True if a model of the given bounding box (any axis permutation, since
    /// the orientation the slicer reports is not necessarily the one the
    /// printer will use) fits within this build volume.
    pub fn fits(&self, measured_x: f64, measured_y: f64, measured_z: f64) -> bool {
        measured_x <= self.x && measured_y <= self.y && measured_z <= self.z
    }
}

/// Per-request scratch state for an in-flight slice job: the set of
/// filesystem paths created while handling the upload, removed as a unit
/// when the request finishes, errors, or the handling task is dropped early.
///
/// Paths are removed in reverse-registration order so files inside a
/// directory are unlinked before the directory itself.
pub struct UploadContext {
    pub request_id: String,
    pub workdir: PathBuf,
    cleanup: Vec<PathBuf>,
}

impl UploadContext {
    pub fn new(request_id: impl Into<String>, workdir: PathBuf) -> Self {
        Self {
            request_id: request_id.into(),
            workdir,
            cleanup: Vec::new(),
        }
    }

    /// Register a path for removal when this context is dropped.
    pub fn track(&mut self, path: PathBuf) {
        self.cleanup.push(path);
    }
}

impl Drop for UploadContext {
    fn drop(&mut self) {
        for path in self.cleanup.drain(..).rev() {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(err) = result {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        request_id = %self.request_id,
                        path = %path.display(),
                        error = %err,
                        "failed to clean up upload scratch path"
                    );
                }
            }
        }
        if let Err(err) = std::fs::remove_dir_all(&self.workdir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    request_id = %self.request_id,
                    path = %self.workdir.display(),
                    error = %err,
                    "failed to clean up upload workdir"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_volume_fits_checks_all_axes() {
        let vol = BuildVolume::FDM;
        assert!(vol.fits(249.0, 200.0, 200.0));
        assert!(!vol.fits(260.0, 200.0, 200.0));
        assert!(!vol.fits(100.0, 220.0, 100.0));
    }

    #[test]
    fn cleanup_removes_tracked_paths_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("job");
        std::fs::create_dir_all(&workdir).unwrap();
        let tracked = workdir.join("scratch.stl");
        std::fs::write(&tracked, b"data").unwrap();

        {
            let mut ctx = UploadContext::new("req-1", workdir.clone());
            ctx.track(tracked.clone());
        }

        assert!(!tracked.exists());
        assert!(!workdir.exists());
    }
}
