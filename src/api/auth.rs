use axum::http::HeaderMap;

/// Pulls the backend credential out of `Authorization: Bearer <token>`. The
/// token is not validated here; the upstream service owns it and rejects bad
/// ones on its side.
pub fn extract_credential(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err("Missing or malformed Authorization header".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok-123"));
        assert_eq!(extract_credential(&headers).unwrap(), "tok-123");
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert!(extract_credential(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_credential(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert!(extract_credential(&headers).is_err());
    }
}
