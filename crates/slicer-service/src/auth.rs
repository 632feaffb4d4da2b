use crate::errors::ApiError;
use axum::http::HeaderMap;
use slicer_config::SlicerConfig;
use slicer_types::SlicerError;

/// Admin auth: a single pre-shared token in the `x-api-key` header, compared
/// in constant time. Per the admin endpoint contract: 503 if the service
/// has no key configured, 401 if the header is missing or wrong.
pub fn require_admin(headers: &HeaderMap, config: &SlicerConfig) -> Result<(), ApiError> {
    let Some(expected) = config
        .admin_api_key
        .as_deref()
        .filter(|key| !key.is_empty())
    else {
        return Err(SlicerError::AdminKeyUnset.into());
    };

    let provided = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() || !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(SlicerError::Unauthorized.into());
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config_with_key(key: &str) -> SlicerConfig {
        let mut config = SlicerConfig::default();
        config.admin_api_key = Some(key.to_string());
        config
    }

    #[test]
    fn rejects_when_key_is_unset() {
        let headers = HeaderMap::new();
        let result = require_admin(&headers, &SlicerConfig::default());
        assert!(matches!(result, Err(ApiError(SlicerError::AdminKeyUnset))));
    }

    #[test]
    fn rejects_missing_header() {
        let headers = HeaderMap::new();
        let result = require_admin(&headers, &config_with_key("secret"));
        assert!(matches!(result, Err(ApiError(SlicerError::Unauthorized))));
    }

    #[test]
    fn rejects_wrong_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("wrong"));
        let result = require_admin(&headers, &config_with_key("secret"));
        assert!(matches!(result, Err(ApiError(SlicerError::Unauthorized))));
    }

    #[test]
    fn accepts_matching_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        assert!(require_admin(&headers, &config_with_key("secret")).is_ok());
    }
}
