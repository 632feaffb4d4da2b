//! Top-level per-request orchestration: wires ingestion, conversion,
//! orientation, measurement, slicing, parsing, and pricing into the single
//! `UPLOADED → ... → DONE` pipeline described in the component design.

use crate::pricing::PricingRegistry;
use crate::runner::SubprocessRunner;
use crate::{estimator, orchestrator, parsing, pipeline};
use serde::Serialize;
use slicer_config::SlicerConfig;
use slicer_types::{SlicerError, SlicerResult, Technology, UploadContext};
use std::path::{Path, PathBuf};

/// Everything a slice job needs, already validated by the HTTP layer
/// (layer height against the technology's allowed set, infill clamped to
/// 0..=100). `uploaded_path` must already live under `scratch_dir` — the
/// service is expected to have streamed the multipart body there directly.
pub struct SliceJobInput {
    pub request_id: String,
    pub tech: Technology,
    pub layer_height: f64,
    pub material: String,
    pub infill_percent: u8,
    pub depth_mm: f64,
    pub original_filename: String,
    pub uploaded_path: PathBuf,
    pub scratch_dir: PathBuf,
}

/// The full JSON response body for a successful `/slice/{TECH}` request.
#[derive(Debug, Clone, Serialize)]
pub struct SliceResponse {
    pub technology: String,
    pub material: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infill: Option<String>,
    pub hourly_rate: u64,
    pub print_time_seconds: u64,
    pub print_time_readable: String,
    pub material_used_m: f64,
    pub object_height_mm: f64,
    pub estimated_price_huf: u64,
    pub download_url: String,
}

/// Run one slice job to completion. On any error, every scratch path
/// created along the way has already been (or will be, via `UploadContext`'s
/// `Drop`) removed by the time this function returns. The final artifact
/// under `paths.output_dir` is deliberately never tracked for cleanup.
pub async fn run_slice_job(
    input: SliceJobInput,
    pricing: &PricingRegistry,
    runner: &SubprocessRunner,
    config: &SlicerConfig,
) -> SlicerResult<SliceResponse> {
    let paths = &config.paths;
    let workdir = input.scratch_dir.join(&input.request_id);
    tokio::fs::create_dir_all(&workdir)
        .await
        .map_err(|e| SlicerError::Internal(format!("failed to create scratch directory: {e}")))?;
    let mut ctx = UploadContext::new(input.request_id.clone(), workdir.clone());

    let ext = Path::new(&input.original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let renamed_path = workdir.join(format!("upload.{ext}"));
    tokio::fs::rename(&input.uploaded_path, &renamed_path)
        .await
        .map_err(|e| SlicerError::Internal(format!("failed to stage upload: {e}")))?;
    ctx.track(renamed_path.clone());

    let entry_path = if ext == pipeline::ARCHIVE_EXT {
        let extract_dir = workdir.join("extracted");
        pipeline::extract_archive(
            &renamed_path,
            &extract_dir,
            config.max_zip_entries,
            config.max_zip_uncompressed_bytes,
        )
        .await?;
        ctx.track(extract_dir.clone());
        pipeline::find_supported_entry(&extract_dir)?
    } else {
        renamed_path.clone()
    };

    let kind = entry_path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(pipeline::classify_extension)
        .ok_or(SlicerError::UnsupportedUpload)?;

    let stl_path = pipeline::convert_to_stl(kind, &entry_path, input.depth_mm, runner, paths).await?;
    if stl_path != entry_path {
        ctx.track(stl_path.clone());
    }

    let mesh_path = match pipeline::orient_best_effort(&stl_path, runner, paths).await {
        Some(oriented) => {
            ctx.track(oriented.clone());
            oriented
        }
        None => stl_path.clone(),
    };

    let measured = orchestrator::measure(runner, paths, input.tech, &mesh_path).await?;
    orchestrator::validate_build_volume(input.tech, measured)?;

    let output_dir = PathBuf::from(&paths.output_dir);
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|e| SlicerError::Internal(format!("failed to create output directory: {e}")))?;
    let filename = orchestrator::output_filename(input.tech, &input.request_id)?;
    let output_path = output_dir.join(&filename);

    let slice_request = orchestrator::SliceRequest {
        tech: input.tech,
        layer_height: input.layer_height,
        infill_percent: input.infill_percent,
        input_path: &mesh_path,
        output_path: &output_path,
    };
    let profiles_dir = PathBuf::from(&paths.profiles_dir);
    orchestrator::slice(runner, paths, &profiles_dir, &slice_request).await?;

    let outcome = match input.tech {
        Technology::Fdm => {
            let gcode = tokio::fs::read_to_string(&output_path)
                .await
                .map_err(|e| SlicerError::Internal(format!("failed to read slicer output: {e}")))?;
            parsing::parse_fdm_gcode(&gcode)
        }
        Technology::Sla => parsing::estimate_sla_time(measured.size_z, input.layer_height),
    };

    let hourly_rate = pricing.rate_for(input.tech, &input.material).await;
    let estimated_price_huf = estimator::estimated_price_huf(outcome.print_time_seconds, hourly_rate);

    let canonical_material = pricing
        .canonical_material(input.tech, &input.material)
        .await
        .unwrap_or(input.material);

    let response = SliceResponse {
        technology: input.tech.as_str().to_string(),
        material: canonical_material,
        infill: matches!(input.tech, Technology::Fdm)
            .then(|| format!("{}%", input.infill_percent)),
        hourly_rate,
        print_time_seconds: outcome.print_time_seconds,
        print_time_readable: outcome.print_time_readable,
        material_used_m: outcome.material_used_m,
        object_height_mm: measured.size_z,
        estimated_price_huf,
        download_url: format!("/download/{filename}"),
    };

    drop(ctx);
    Ok(response)
}
