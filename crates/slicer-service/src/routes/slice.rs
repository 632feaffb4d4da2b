use crate::errors::ApiError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Multipart, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use slicer_core::admission::client_key;
use slicer_core::{RateLimitDecision, SliceJobInput};
use slicer_core::SliceResponse;
use slicer_types::{LayerHeight, SlicerError, SlicerResult, Technology};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

const FIELD_FILE: &str = "choosenFile";
const FIELD_LAYER_HEIGHT: &str = "layerHeight";
const FIELD_MATERIAL: &str = "material";
const FIELD_INFILL: &str = "infill";
const FIELD_DEPTH: &str = "depth";

const DEFAULT_INFILL_PERCENT: u8 = 20;
const DEFAULT_DEPTH_MM: f64 = 3.0;

/// Parsed-but-not-yet-validated multipart form fields for a slice request.
#[derive(Default)]
struct RawFields {
    original_filename: Option<String>,
    file_bytes: Option<Bytes>,
    layer_height: Option<String>,
    material: Option<String>,
    infill: Option<String>,
    depth: Option<String>,
}

pub async fn slice(
    State(state): State<AppState>,
    Path(tech): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<SliceResponse>, ApiError> {
    let tech = Technology::parse(&tech)
        .ok_or_else(|| SlicerError::Validation(format!("unknown technology: {tech}")))?;

    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let key = client_key(forwarded_for, &remote.ip().to_string());
    match state.core.rate_limiter.check(&key).await {
        RateLimitDecision::Allow => {}
        RateLimitDecision::Deny {
            retry_after_seconds,
        } => return Err(SlicerError::RateLimitExceeded { retry_after_seconds }.into()),
    }

    let permit = state.core.queue.admit().await?;

    let raw = collect_fields(&mut multipart, state.core.config.max_upload_bytes).await?;

    let original_filename = raw
        .original_filename
        .ok_or_else(|| SlicerError::Validation(format!("missing file field `{FIELD_FILE}`")))?;
    let file_bytes = raw
        .file_bytes
        .ok_or_else(|| SlicerError::Validation(format!("missing file field `{FIELD_FILE}`")))?;

    let layer_height_raw = raw
        .layer_height
        .ok_or_else(|| SlicerError::Validation(format!("missing field `{FIELD_LAYER_HEIGHT}`")))?;
    let layer_height_value: f64 = layer_height_raw
        .trim()
        .parse()
        .map_err(|_| SlicerError::Validation(format!("{FIELD_LAYER_HEIGHT} must be a number")))?;
    let layer_height = LayerHeight::new(layer_height_value)?.validate_for(tech)?;

    let material = raw
        .material
        .ok_or_else(|| SlicerError::Validation(format!("missing field `{FIELD_MATERIAL}`")))?;

    let infill_percent = match raw.infill {
        Some(raw_infill) => parse_infill(&raw_infill)?,
        None => DEFAULT_INFILL_PERCENT,
    };

    let depth_mm = match raw.depth {
        Some(raw_depth) => raw_depth
            .trim()
            .parse::<f64>()
            .map_err(|_| SlicerError::Validation("depth must be a number".to_string()))?,
        None => DEFAULT_DEPTH_MM,
    };

    let request_id = uuid::Uuid::new_v4().to_string();
    let scratch_dir = PathBuf::from(&state.core.config.paths.scratch_dir);
    let staging_path = scratch_dir.join(format!("{request_id}.upload"));
    tokio::fs::create_dir_all(&scratch_dir)
        .await
        .map_err(|e| SlicerError::Internal(format!("failed to create scratch directory: {e}")))?;
    write_upload(&staging_path, &file_bytes).await?;

    let input = SliceJobInput {
        request_id,
        tech,
        layer_height: layer_height.value(),
        material,
        infill_percent,
        depth_mm,
        original_filename,
        uploaded_path: staging_path,
        scratch_dir,
    };

    let response = state.core.run_slice_job(input).await;
    drop(permit);
    Ok(Json(response?))
}

async fn write_upload(path: &std::path::Path, bytes: &Bytes) -> SlicerResult<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| SlicerError::Internal(format!("failed to stage upload: {e}")))?;
    file.write_all(bytes)
        .await
        .map_err(|e| SlicerError::Internal(format!("failed to stage upload: {e}")))?;
    Ok(())
}

fn parse_infill(raw: &str) -> SlicerResult<u8> {
    let trimmed = raw.trim().trim_end_matches('%');
    let value: u8 = trimmed
        .parse()
        .map_err(|_| SlicerError::Validation("infill must be an integer 0..=100".to_string()))?;
    if value > 100 {
        return Err(SlicerError::Validation(
            "infill must be between 0 and 100".to_string(),
        ));
    }
    Ok(value)
}

/// Stream every multipart field into memory, enforcing `max_upload_bytes`
/// against the uploaded file field as fields arrive.
async fn collect_fields(multipart: &mut Multipart, max_upload_bytes: u64) -> SlicerResult<RawFields> {
    let mut fields = RawFields::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SlicerError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            FIELD_FILE => {
                fields.original_filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| SlicerError::Validation(format!("failed to read upload: {e}")))?;
                if bytes.len() as u64 > max_upload_bytes {
                    return Err(SlicerError::Validation(format!(
                        "upload exceeds the maximum allowed size of {max_upload_bytes} bytes"
                    )));
                }
                fields.file_bytes = Some(bytes);
            }
            FIELD_LAYER_HEIGHT => fields.layer_height = Some(text(field).await?),
            FIELD_MATERIAL => fields.material = Some(text(field).await?),
            FIELD_INFILL => fields.infill = Some(text(field).await?),
            FIELD_DEPTH => fields.depth = Some(text(field).await?),
            _ => {}
        }
    }

    Ok(fields)
}

async fn text(field: axum::extract::multipart::Field<'_>) -> SlicerResult<String> {
    field
        .text()
        .await
        .map_err(|e| SlicerError::Validation(format!("invalid form field: {e}")))
}
