use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::CatalogError;

/// Send a request and turn any non-2xx response into `CatalogError::Http`,
/// keeping the status, `Retry-After` and body untouched.
pub async fn send(request: RequestBuilder) -> Result<Response, CatalogError> {
    let response = request.send().await.map_err(CatalogError::from_reqwest)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    Err(CatalogError::Http {
        status: status.as_u16(),
        retry_after_ms,
        body,
    })
}

pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
    let body = response.text().await.map_err(CatalogError::from_reqwest)?;
    parse_json(&body)
}

/// Deserialize a response body; any shape mismatch is an envelope error.
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, CatalogError> {
    serde_json::from_str(body).map_err(|e| CatalogError::Envelope(e.to_string()))
}

/// `Retry-After` in delay-seconds form, converted to milliseconds.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(3000));
        assert_eq!(parse_retry_after(" 0 "), Some(0));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_parse_json_shape_mismatch_is_envelope_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Page {
            items: Vec<String>,
        }

        let error = parse_json::<Page>(r#"{"data": []}"#).unwrap_err();
        assert!(matches!(error, CatalogError::Envelope(_)));
    }
}
