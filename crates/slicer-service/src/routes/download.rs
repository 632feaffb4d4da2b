use crate::errors::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use slicer_types::SlicerError;
use std::path::{Path as FsPath, PathBuf};
use tokio_util::io::ReaderStream;

/// Serve a finished print artifact by filename. `name` is taken verbatim off
/// the URL path, so it is rejected outright if it could escape `output_dir`.
pub async fn download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if name.contains('/') || name.contains('\\') || name == ".." || name.is_empty() {
        return Err(SlicerError::Validation("invalid download name".to_string()).into());
    }

    let output_dir = PathBuf::from(&state.core.config.paths.output_dir);
    let path = output_dir.join(&name);

    if FsPath::new(&name).file_name().map(|f| f.to_string_lossy().into_owned()) != Some(name.clone()) {
        return Err(SlicerError::Validation("invalid download name".to_string()).into());
    }

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SlicerError::ArtifactNotFound { name: name.clone() }
        } else {
            SlicerError::Internal(format!("failed to open artifact: {e}"))
        }
    })?;

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        body,
    )
        .into_response())
}
