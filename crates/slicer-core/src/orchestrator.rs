//! Measurement, build-volume validation, and slicer invocation — the
//! MEASURED → VALIDATED → SLICED states of the slicing pipeline.

use crate::runner::SubprocessRunner;
use once_cell::sync::Lazy;
use regex::Regex;
use slicer_config::PathsConfig;
use slicer_types::{BuildVolume, SlicerError, SlicerResult, Technology};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

static SIZE_X_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"size_x\s*=\s*([0-9.]+)").unwrap());
static SIZE_Y_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"size_y\s*=\s*([0-9.]+)").unwrap());
static SIZE_Z_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"size_z\s*=\s*([0-9.]+)").unwrap());

/// Bounding box reported by the slicer's info mode. A missing axis is
/// treated as 0 per the measurement contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredDimensions {
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
}

/// Parse `size_x`/`size_y`/`size_z` out of the slicer's info-mode output.
pub fn parse_measure_output(output: &str) -> MeasuredDimensions {
    MeasuredDimensions {
        size_x: extract_size(&SIZE_X_RE, output),
        size_y: extract_size(&SIZE_Y_RE, output),
        size_z: extract_size(&SIZE_Z_RE, output),
    }
}

fn extract_size(re: &Regex, output: &str) -> f64 {
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Reject if any measured axis exceeds the technology's build volume. Axes
/// are compared positionally: the orientation step is expected to have
/// already put the model in its final printing orientation.
pub fn validate_build_volume(tech: Technology, measured: MeasuredDimensions) -> SlicerResult<()> {
    let limit = BuildVolume::for_technology(tech);
    if limit.fits(measured.size_x, measured.size_y, measured.size_z) {
        Ok(())
    } else {
        Err(SlicerError::ModelExceedsBuildVolume {
            technology: tech,
            measured_x: measured.size_x,
            measured_y: measured.size_y,
            measured_z: measured.size_z,
            limit_x: limit.x,
            limit_y: limit.y,
            limit_z: limit.z,
        })
    }
}

/// Render a layer height the way profile filenames spell it: no trailing
/// zeros beyond what the allowed set requires (`0.2`, `0.025`).
fn format_layer_height(layer_height: f64) -> String {
    let mut s = format!("{layer_height:.3}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

/// `<profiles_dir>/<TECH>_<layer>mm.ini`, per the profile-selection contract.
pub fn profile_path(profiles_dir: &Path, tech: Technology, layer_height: f64) -> PathBuf {
    profiles_dir.join(format!(
        "{}_{}mm.ini",
        tech.as_str(),
        format_layer_height(layer_height)
    ))
}

/// Final slicer output artifact name: `output-<unix_ms>.<ext>`. A caller
/// racing another request in the same millisecond should append its own
/// disambiguator (e.g. the request id) before this call.
pub fn output_filename(tech: Technology, disambiguator: &str) -> SlicerResult<String> {
    let unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| SlicerError::Internal(format!("system clock before unix epoch: {e}")))?
        .as_millis();
    let ext = match tech {
        Technology::Fdm => "gcode",
        Technology::Sla => "sl1",
    };
    Ok(format!("output-{unix_ms}-{disambiguator}.{ext}"))
}

/// Everything the slicer invocation needs beyond the profile and input path.
pub struct SliceRequest<'a> {
    pub tech: Technology,
    pub layer_height: f64,
    pub infill_percent: u8,
    pub input_path: &'a Path,
    pub output_path: &'a Path,
}

/// Invoke the slicer in measurement mode (`--info`) against `input_path`.
pub async fn measure(
    runner: &SubprocessRunner,
    paths: &PathsConfig,
    tech: Technology,
    input_path: &Path,
) -> SlicerResult<MeasuredDimensions> {
    let binary = match tech {
        Technology::Fdm => &paths.fdm_slicer_binary,
        Technology::Sla => &paths.sla_slicer_binary,
    };
    let input = input_path.to_string_lossy().into_owned();
    let output = runner
        .run(binary, &["--info", input.as_str()], None)
        .await
        .map_err(|e| SlicerError::Internal(format!("measurement pass failed: {e}")))?;
    Ok(parse_measure_output(&output.stdout))
}

/// Compose and run the final slice invocation, per §4.4 step 7:
/// `--load <profile> --center 100,100 <input>` plus technology-specific
/// flags, writing to `output_path`.
pub async fn slice(
    runner: &SubprocessRunner,
    paths: &PathsConfig,
    profiles_dir: &Path,
    request: &SliceRequest<'_>,
) -> SlicerResult<()> {
    let profile = profile_path(profiles_dir, request.tech, request.layer_height);
    if !profile.exists() {
        return Err(SlicerError::Internal(format!(
            "slicer profile not found: {}",
            profile.display()
        )));
    }

    let binary = match request.tech {
        Technology::Fdm => &paths.fdm_slicer_binary,
        Technology::Sla => &paths.sla_slicer_binary,
    };

    let profile_str = profile.to_string_lossy().into_owned();
    let input_str = request.input_path.to_string_lossy().into_owned();
    let output_str = request.output_path.to_string_lossy().into_owned();

    let mut args: Vec<&str> = vec!["--load", profile_str.as_str(), "--center", "100,100"];

    let infill_flag;
    match request.tech {
        Technology::Fdm => {
            infill_flag = format!("{}%", request.infill_percent);
            args.extend([
                "--support-material",
                "--support-material-auto",
                "--gcode-flavor",
                "marlin",
                "--export-gcode",
                "--output",
                output_str.as_str(),
                "--fill-density",
                infill_flag.as_str(),
            ]);
        }
        Technology::Sla => {
            args.extend(["--export-sla", "--output", output_str.as_str()]);
        }
    }
    args.push(input_str.as_str());

    runner
        .run(binary, &args, None)
        .await
        .map(|_| ())
        .map_err(|e| SlicerError::Internal(format!("slicer invocation failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_measure_output_treating_missing_axes_as_zero() {
        let output = "size_x = 100.5\nsize_z = 50\n";
        let dims = parse_measure_output(output);
        assert_eq!(dims.size_x, 100.5);
        assert_eq!(dims.size_y, 0.0);
        assert_eq!(dims.size_z, 50.0);
    }

    #[test]
    fn validate_build_volume_rejects_oversized_models() {
        let measured = MeasuredDimensions {
            size_x: 260.0,
            size_y: 100.0,
            size_z: 100.0,
        };
        assert!(matches!(
            validate_build_volume(Technology::Fdm, measured),
            Err(SlicerError::ModelExceedsBuildVolume { .. })
        ));
    }

    #[test]
    fn validate_build_volume_accepts_fitting_models() {
        let measured = MeasuredDimensions {
            size_x: 100.0,
            size_y: 100.0,
            size_z: 50.0,
        };
        assert!(validate_build_volume(Technology::Fdm, measured).is_ok());
    }

    #[test]
    fn profile_path_formats_layer_height_without_trailing_zeros() {
        let dir = Path::new("configs");
        assert_eq!(
            profile_path(dir, Technology::Fdm, 0.2),
            dir.join("FDM_0.2mm.ini")
        );
        assert_eq!(
            profile_path(dir, Technology::Sla, 0.025),
            dir.join("SLA_0.025mm.ini")
        );
    }

    #[test]
    fn output_filename_embeds_timestamp_and_extension() {
        let name = output_filename(Technology::Fdm, "req1").unwrap();
        assert!(name.starts_with("output-"));
        assert!(name.ends_with(".gcode"));

        let name = output_filename(Technology::Sla, "req1").unwrap();
        assert!(name.ends_with(".sl1"));
    }
}
