use axum::response::Response;
use http_body_util::BodyExt;

/// Reads the whole response body as JSON. An empty body yields `Null`.
pub async fn response_to_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes();

    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is not valid JSON")
}
