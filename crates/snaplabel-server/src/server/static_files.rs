use axum::{
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Json,
};
use rust_embed::Embed;
use serde_json::json;

#[derive(Embed)]
#[folder = "web"]
struct WebAssets;

/// Serve the embedded single-page UI
pub async fn serve_static(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    // Unknown API routes get a JSON 404, not the page
    if path == "api" || path.starts_with("api/") {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": { "kind": "not_found", "message": format!("no route for /{}", path) }
            })),
        )
            .into_response();
    }

    let path = if path.is_empty() { "index.html" } else { path };
    if let Some(content) = <WebAssets as Embed>::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime.as_ref())],
            content.data.into_owned(),
        )
            .into_response();
    }

    if let Some(content) = <WebAssets as Embed>::get("index.html") {
        return Html(String::from_utf8_lossy(&content.data).to_string()).into_response();
    }

    Html(FALLBACK_HTML).into_response()
}

const FALLBACK_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>snaplabel</title></head>
<body>
    <h1>snaplabel</h1>
    <p>The web UI is not bundled in this build. The API is available under <code>/api</code>.</p>
</body>
</html>
"#;
