use crate::errors::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use slicer_types::{SlicerError, Technology};

#[derive(Debug, Deserialize)]
pub struct CreateMaterialRequest {
    pub material: String,
    pub price: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriceRequest {
    pub price: u64,
}

#[derive(Debug, Serialize)]
pub struct MaterialResponse {
    pub technology: String,
    pub material: String,
    pub price: u64,
}

fn parse_technology(raw: &str) -> Result<Technology, ApiError> {
    Technology::parse(raw)
        .ok_or_else(|| SlicerError::Validation(format!("unknown technology: {raw}")).into())
}

pub async fn get_all(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.core.pricing.get_all().await)
}

pub async fn create(
    State(state): State<AppState>,
    Path(tech): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CreateMaterialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    crate::auth::require_admin(&headers, &state.core.config)?;
    let tech = parse_technology(&tech)?;

    let canonical = state
        .core
        .pricing
        .create(tech, &request.material, request.price)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MaterialResponse {
            technology: tech.as_str().to_string(),
            material: canonical,
            price: request.price,
        }),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    Path((tech, material)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<UpdatePriceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    crate::auth::require_admin(&headers, &state.core.config)?;
    let tech = parse_technology(&tech)?;

    let canonical = state
        .core
        .pricing
        .update(tech, &material, request.price)
        .await?;

    Ok(Json(MaterialResponse {
        technology: tech.as_str().to_string(),
        material: canonical,
        price: request.price,
    }))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((tech, material)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    crate::auth::require_admin(&headers, &state.core.config)?;
    let tech = parse_technology(&tech)?;

    state.core.pricing.delete(tech, &material).await?;
    Ok(StatusCode::OK)
}
