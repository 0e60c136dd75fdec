use serde_json::{Value, json};
use thiserror::Error;

/// Error codes surfaced to MCP clients in tool error payloads.
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const REMOTE_API_ERROR: &str = "remote_api_error";
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
}

/// Failure of a single tool invocation.
///
/// Every variant is reported back to the calling agent as a tool-level error
/// result; none of them stop the server. The payload produced by
/// [`ToolError::to_value`] carries enough detail (code, message, remote status)
/// for an agent to decide whether to retry, change arguments, or give up.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Arguments were missing, mistyped, conflicting or out of range.
    /// Raised before any network or file I/O happens.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
    /// NotePM answered with a non-2xx status.
    #[error("NotePM API responded with status {status}: {message}")]
    RemoteApi {
        status: u16,
        message: String,
        body: Value,
    },
    /// The request never produced an HTTP response (DNS, connect, reset, timeout).
    #[error("{message}")]
    Transport { message: String, timed_out: bool },
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        ToolError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::invalid_field(field, format!("Missing required field '{field}'"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            ToolError::Validation { .. } => codes::VALIDATION_FAILED,
            ToolError::RemoteApi { .. } => codes::REMOTE_API_ERROR,
            ToolError::Transport { .. } => codes::TRANSPORT_ERROR,
            ToolError::UnknownTool(_) => codes::UNKNOWN_TOOL,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            ToolError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ToolError::RemoteApi { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether repeating the identical call could plausibly succeed.
    pub fn retryable(&self) -> bool {
        match self {
            ToolError::Transport { .. } => true,
            ToolError::RemoteApi { status, .. } => *status == 429 || *status >= 500,
            ToolError::Validation { .. } | ToolError::UnknownTool(_) => false,
        }
    }

    fn docs_hint(&self) -> Option<&'static str> {
        match self {
            ToolError::Validation { .. } => {
                Some("Check the tool's inputSchema (tools/list) and fix the named field.")
            }
            ToolError::RemoteApi { status: 401, .. } => {
                Some("NOTEPM_API_TOKEN was rejected. Issue a new token in NotePM settings.")
            }
            ToolError::RemoteApi { status: 403, .. } => {
                Some("The token's user lacks permission for this resource.")
            }
            ToolError::RemoteApi { status: 404, .. } => {
                Some("The referenced code or id does not exist. Search or list first to find it.")
            }
            ToolError::RemoteApi { status: 429, .. } => {
                Some("NotePM rate limit reached. Wait before retrying.")
            }
            ToolError::RemoteApi { .. } => None,
            ToolError::Transport {
                timed_out: true, ..
            } => Some("The request timed out. Retry later or raise NOTEPM_REQUEST_TIMEOUT_SECS."),
            ToolError::Transport { .. } => {
                Some("Check network connectivity and NOTEPM_TEAM / NOTEPM_API_BASE.")
            }
            ToolError::UnknownTool(_) => Some("Call tools/list for the available tool names."),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code(),
            "message": self.to_string(),
            "retryable": self.retryable(),
        });
        if let Some(field) = self.field() {
            payload["field"] = Value::String(field.to_string());
        }
        if let Some(docs_hint) = self.docs_hint() {
            payload["docs_hint"] = Value::String(docs_hint.to_string());
        }
        match self {
            ToolError::RemoteApi {
                status,
                message,
                body,
            } => {
                payload["details"] = json!({
                    "status": status,
                    "remote_message": message,
                    "body": body,
                });
            }
            ToolError::Transport { timed_out, .. } => {
                payload["details"] = json!({ "timed_out": timed_out });
            }
            ToolError::Validation { .. } | ToolError::UnknownTool(_) => {}
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        let err = ToolError::missing_field("page_code");
        assert_eq!(err.code(), codes::VALIDATION_FAILED);
        assert_eq!(err.field(), Some("page_code"));
        assert!(err.to_string().contains("page_code"));
        assert!(!err.retryable());
    }

    #[test]
    fn remote_error_payload_carries_status_and_message() {
        let err = ToolError::RemoteApi {
            status: 404,
            message: "not found".to_string(),
            body: json!({ "message": "not found" }),
        };
        let payload = err.to_value();
        assert_eq!(payload["error"], "remote_api_error");
        assert_eq!(payload["details"]["status"], 404);
        assert_eq!(payload["details"]["remote_message"], "not found");
        assert_eq!(payload["retryable"], false);
        assert!(payload["docs_hint"].is_string());
    }

    #[test]
    fn server_side_and_throttling_errors_are_retryable() {
        let throttled = ToolError::RemoteApi {
            status: 429,
            message: "slow down".to_string(),
            body: Value::Null,
        };
        let unavailable = ToolError::RemoteApi {
            status: 503,
            message: "maintenance".to_string(),
            body: Value::Null,
        };
        let conflict = ToolError::RemoteApi {
            status: 422,
            message: "invalid".to_string(),
            body: Value::Null,
        };
        assert!(throttled.retryable());
        assert!(unavailable.retryable());
        assert!(!conflict.retryable());
    }

    #[test]
    fn transport_payload_reports_timeout() {
        let err = ToolError::Transport {
            message: "timed out".to_string(),
            timed_out: true,
        };
        let payload = err.to_value();
        assert_eq!(payload["error"], "transport_error");
        assert_eq!(payload["details"]["timed_out"], true);
        assert_eq!(payload["retryable"], true);
    }
}
