//! CORS Middleware Configuration

use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::CorsSettings;

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Methods used by the REST API. The gateway upgrade is a plain GET.
const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::DELETE];

/// Create CORS layer from settings.
///
/// An empty origin list allows any origin; unparsable origins are skipped.
pub fn create_cors_layer(settings: &CorsSettings) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(PREFLIGHT_MAX_AGE);

    match parse_origins(&settings.allowed_origins) {
        Some(origins) => layer.allow_origin(AllowOrigin::list(origins)),
        None => layer.allow_origin(Any),
    }
}

fn parse_origins(raw: &[String]) -> Option<Vec<HeaderValue>> {
    let origins: Vec<HeaderValue> = raw
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    (!origins.is_empty()).then_some(origins)
}
