//! Numbering preview endpoint.
//!
//! - POST /api/numbering/preview - Format the first numbers of a config

use super::error::AppError;
use crate::numbering::{NumberingConfig, NumberingPreview};
use axum::Json;
use serde::Deserialize;

/// Default numbers returned by a preview.
pub const DEFAULT_PREVIEW_COUNT: usize = 10;
/// Upper bound on numbers returned by a preview.
pub const MAX_PREVIEW_COUNT: usize = 100;

/// Preview request.
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    /// Configuration to format
    #[serde(default)]
    pub config: NumberingConfig,
    /// How many leading numbers to return
    #[serde(default)]
    pub count: Option<usize>,
}

/// Format the first numbers of a configuration plus the last one.
///
/// # Errors
///
/// 422 if the configuration is invalid.
pub async fn preview(
    Json(request): Json<PreviewRequest>,
) -> Result<Json<NumberingPreview>, AppError> {
    let count = request
        .count
        .unwrap_or(DEFAULT_PREVIEW_COUNT)
        .min(MAX_PREVIEW_COUNT);
    Ok(Json(request.config.preview(count)?))
}
