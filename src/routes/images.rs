//! Public image transformation endpoint

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::image_proxy::ImageQuery;

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// GET /images?url=&w=&h=&q=&fmt=
///
/// A matching `If-None-Match` is answered with 304 before the source is
/// fetched.
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let proxy = &state.image_proxy;
    let plan = proxy.plan(&query, header_str(&headers, header::ACCEPT))?;

    let etag = HeaderValue::from_str(&plan.etag)
        .map_err(|e| ApiError::internal(format!("Invalid ETag header: {e}")))?;
    let cache_control = HeaderValue::from_str(&format!(
        "public, max-age={}, immutable",
        proxy.cache_max_age()
    ))
    .map_err(|e| ApiError::internal(format!("Invalid Cache-Control header: {e}")))?;

    if header_str(&headers, header::IF_NONE_MATCH).is_some_and(|inm| plan.matches(inm)) {
        tracing::debug!(source = %plan.source, "Image not modified");
        return Ok((
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, etag),
                (header::CACHE_CONTROL, cache_control),
                (header::VARY, HeaderValue::from_static("Accept")),
            ],
        )
            .into_response());
    }

    let image = proxy.render(&plan).await?;

    tracing::debug!(
        source = %plan.source,
        width = ?plan.width,
        height = ?plan.height,
        format = image.format.content_type(),
        bytes = image.bytes.len(),
        "Image served"
    );

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(image.format.content_type()),
            ),
            (header::CACHE_CONTROL, cache_control),
            (header::VARY, HeaderValue::from_static("Accept")),
            (header::ETAG, etag),
        ],
        image.bytes,
    )
        .into_response())
}
