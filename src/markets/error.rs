//! Kalshi API error classification
//!
//! Turns HTTP status/body pairs and transport failures into structured
//! errors so the retry layer can decide what is worth another attempt.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MarketError {
    #[error("Kalshi rate limit hit")]
    RateLimited,

    /// Upstream 5xx
    #[error("Kalshi server error {status}: {body}")]
    ServerError { status: u16, body: String },

    /// 4xx other than 429
    #[error("Kalshi rejected request {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Timeout, DNS, refused connection
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid Kalshi response: {0}")]
    InvalidResponse(String),
}

/// Kalshi error response format
#[derive(Debug, Deserialize)]
struct KalshiErrorResponse {
    #[serde(default)]
    error: Option<KalshiErrorBody>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KalshiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl MarketError {
    /// Parse a non-success API response into a structured error
    pub fn from_response(status: u16, body: &str) -> Self {
        let error_msg = match serde_json::from_str::<KalshiErrorResponse>(body) {
            Ok(parsed) => parsed
                .error
                .and_then(|e| e.message)
                .or(parsed.message)
                .unwrap_or_else(|| body.to_string()),
            Err(_) => body.to_string(),
        };

        let msg_lower = error_msg.to_lowercase();

        if status == 429 || msg_lower.contains("rate limit") || msg_lower.contains("too many requests") {
            return MarketError::RateLimited;
        }

        if status >= 500 {
            return MarketError::ServerError { status, body: error_msg };
        }

        MarketError::Rejected { status, body: error_msg }
    }

    /// Parse a network/reqwest error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            MarketError::NetworkError("Request timed out".to_string())
        } else if err.is_connect() {
            MarketError::NetworkError("Connection failed".to_string())
        } else if err.is_decode() {
            MarketError::InvalidResponse(err.to_string())
        } else {
            MarketError::NetworkError(err.to_string())
        }
    }

    /// Whether this error is retryable with exponential backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketError::RateLimited | MarketError::NetworkError(_) | MarketError::ServerError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited() {
        let err = MarketError::from_response(429, "");
        assert!(err.is_retryable());
        assert!(matches!(err, MarketError::RateLimited));
    }

    #[test]
    fn test_server_error_retryable() {
        let err = MarketError::from_response(503, "Service Unavailable");
        assert!(err.is_retryable());
        assert!(matches!(err, MarketError::ServerError { status: 503, .. }));
    }

    #[test]
    fn test_rejected_uses_nested_message() {
        let err = MarketError::from_response(400, r#"{"error":{"code":"bad","message":"invalid series"}}"#);
        assert!(!err.is_retryable());
        match err {
            MarketError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid series");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_response_not_retryable() {
        assert!(!MarketError::InvalidResponse("eof".into()).is_retryable());
    }
}
