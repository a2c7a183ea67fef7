use menu_proto::{DocumentError, FieldError, RawErrorBody, SchemaError};
use reqwest::StatusCode;
use thiserror::Error;

/// Everything the client library can fail with.
///
/// `Clone` because coalesced loads hand the same outcome to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Request timed out")]
    NetworkTimeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Validation failed: {}", describe(.fields))]
    ValidationFailed { fields: Vec<FieldError> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Session expired, sign in again")]
    AuthExpired,

    #[error("Media unavailable: {url}")]
    MediaUnavailable { url: String },

    #[error("Push channel disconnected: {0}")]
    ChannelDisconnected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session storage error: {0}")]
    Session(String),

    #[error("Upload rejected: {0}")]
    Upload(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

fn describe(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ClientError {
    /// Maps a non-success response to the taxonomy. `body` is the raw text so
    /// non-JSON error pages still produce a message.
    pub fn from_status(status: StatusCode, body: &str, resource: &str) -> Self {
        let parsed: RawErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .error
            .clone()
            .unwrap_or_else(|| body.trim().chars().take(200).collect());

        match status {
            StatusCode::UNAUTHORIZED => ClientError::AuthExpired,
            StatusCode::NOT_FOUND => ClientError::NotFound(resource.to_string()),
            StatusCode::CONFLICT => ClientError::Conflict(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let mut fields = parsed.field_errors();
                if fields.is_empty() {
                    fields.push(FieldError::new("request", message));
                }
                ClientError::ValidationFailed { fields }
            }
            StatusCode::PAYLOAD_TOO_LARGE => ClientError::Upload(message),
            _ => ClientError::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::NetworkTimeout
        } else if err.is_decode() {
            ClientError::ValidationFailed {
                fields: vec![FieldError::new("body", err.to_string())],
            }
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<SchemaError> for ClientError {
    fn from(err: SchemaError) -> Self {
        ClientError::ValidationFailed { fields: err.fields }
    }
}

impl From<DocumentError> for ClientError {
    fn from(err: DocumentError) -> Self {
        ClientError::ValidationFailed {
            fields: vec![FieldError::new("document", err.to_string())],
        }
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ClientError::from_status(StatusCode::UNAUTHORIZED, "", "menu/1"),
            ClientError::AuthExpired
        );
        assert_eq!(
            ClientError::from_status(StatusCode::NOT_FOUND, "", "menu/1"),
            ClientError::NotFound("menu/1".into())
        );
        assert_eq!(
            ClientError::from_status(StatusCode::CONFLICT, r#"{"error":"stale"}"#, "x"),
            ClientError::Conflict("stale".into())
        );
        assert_eq!(
            ClientError::from_status(StatusCode::BAD_GATEWAY, "upstream down", "x"),
            ClientError::ServerError {
                status: 502,
                message: "upstream down".into()
            }
        );
    }

    #[test]
    fn test_validation_keeps_field_errors() {
        let err = ClientError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"error":"bad","errors":{"price":"negative"}}"#,
            "menu/1",
        );
        match err {
            ClientError::ValidationFailed { fields } => {
                assert_eq!(fields, vec![FieldError::new("price", "negative")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
