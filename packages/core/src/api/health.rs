use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// `GET /health`: liveness only; the loan store is in-process.
pub async fn health() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("ok"))
        .expect("health response should be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_is_uncached_plain_ok() {
        let resp = health().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    }
}
