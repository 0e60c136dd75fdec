//! HTTP adapter for the NotePM REST API (`/api/v1`).
//!
//! One method per remote operation. Every method issues exactly one HTTP
//! request, authenticated with the configured bearer token, and maps the
//! outcome to either the decoded JSON body or a [`ToolError`].

use std::path::Path;
use std::time::Duration;

use notepm_core::config::{ConfigError, NotepmConfig};
use notepm_core::error::ToolError;
use notepm_core::text::{truncate_chars, truncate_free_text};
use reqwest::header::LOCATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, StatusCode, Url, redirect};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::io::ReaderStream;

use crate::params::{
    AttachmentRef, CommentRef, CreateComment, CreateFolder, CreateGroup, CreateNote, CreatePage,
    CreateTag, GroupRef, ListFolders, NoteRef, PageRef, Paging, SearchAttachments,
    SearchComments, SearchGroups, SearchPages, SearchUsers, TagRef, UpdateComment, UpdateNote,
    UpdatePage, UploadAttachment, UploadSource, UserRef,
};

/// Upper bound for raw (non-JSON) error bodies quoted in error messages.
const RAW_ERROR_MESSAGE_MAX_CHARS: usize = 300;

#[derive(Debug)]
struct ApiCallResult {
    status: u16,
    body: Value,
}

enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Form),
}

pub struct NotepmClient {
    http: reqwest::Client,
    api_base: Url,
    api_token: String,
    max_body_length: usize,
    request_timeout: Duration,
}

impl NotepmClient {
    pub fn new(config: &NotepmConfig) -> Result<Self, ConfigError> {
        let api_base = Url::parse(&config.api_base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::InvalidApiBase(config.api_base.clone()))?;
        // Redirects are surfaced to the caller (attachment downloads) and
        // never followed with the bearer token attached.
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(redirect::Policy::none())
            .user_agent(concat!("notepm-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            api_base,
            api_token: config.api_token().to_string(),
            max_body_length: config.max_body_length,
            request_timeout: config.request_timeout,
        })
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_str()
    }

    // ── Pages ──────────────────────────────────────────────────────

    pub async fn search_pages(&self, params: &SearchPages) -> Result<Value, ToolError> {
        self.search(&["pages"], query_pairs(params)).await
    }

    pub async fn page_detail(&self, params: &PageRef) -> Result<Value, ToolError> {
        self.get(&["pages", &params.page_code], Vec::new()).await
    }

    pub async fn create_page(&self, params: &CreatePage) -> Result<Value, ToolError> {
        self.send_json(Method::POST, &["pages"], params).await
    }

    pub async fn update_page(&self, params: &UpdatePage) -> Result<Value, ToolError> {
        self.send_json(Method::PATCH, &["pages", &params.page_code], params)
            .await
    }

    pub async fn delete_page(&self, params: &PageRef) -> Result<Value, ToolError> {
        let result = self
            .send(
                Method::DELETE,
                &["pages", &params.page_code],
                Vec::new(),
                RequestBody::Empty,
            )
            .await?;
        Ok(or_confirmation(
            result,
            json!({ "message": "Page deleted", "page_code": params.page_code }),
        ))
    }

    // ── Notes ──────────────────────────────────────────────────────

    pub async fn list_notes(&self, paging: &Paging) -> Result<Value, ToolError> {
        self.get(&["notes"], query_pairs(paging)).await
    }

    pub async fn note_detail(&self, params: &NoteRef) -> Result<Value, ToolError> {
        self.get(&["notes", &params.note_code], Vec::new()).await
    }

    pub async fn create_note(&self, params: &CreateNote) -> Result<Value, ToolError> {
        self.send_json(Method::POST, &["notes"], params).await
    }

    pub async fn update_note(&self, params: &UpdateNote) -> Result<Value, ToolError> {
        self.send_json(Method::PATCH, &["notes", &params.note_code], params)
            .await
    }

    pub async fn delete_note(&self, params: &NoteRef) -> Result<Value, ToolError> {
        let result = self
            .send(
                Method::DELETE,
                &["notes", &params.note_code],
                Vec::new(),
                RequestBody::Empty,
            )
            .await?;
        Ok(or_confirmation(
            result,
            json!({ "message": "Note deleted", "note_code": params.note_code }),
        ))
    }

    pub async fn archive_note(&self, params: &NoteRef) -> Result<Value, ToolError> {
        let result = self
            .send(
                Method::PATCH,
                &["notes", &params.note_code, "archive"],
                Vec::new(),
                RequestBody::Empty,
            )
            .await?;
        Ok(or_confirmation(
            result,
            json!({ "message": "Note archived", "note_code": params.note_code }),
        ))
    }

    pub async fn unarchive_note(&self, params: &NoteRef) -> Result<Value, ToolError> {
        let result = self
            .send(
                Method::PATCH,
                &["notes", &params.note_code, "extract"],
                Vec::new(),
                RequestBody::Empty,
            )
            .await?;
        Ok(or_confirmation(
            result,
            json!({ "message": "Note restored from archive", "note_code": params.note_code }),
        ))
    }

    // ── Folders ────────────────────────────────────────────────────

    pub async fn list_folders(&self, params: &ListFolders) -> Result<Value, ToolError> {
        self.get(&["notes", &params.note_code, "folders"], query_pairs(params))
            .await
    }

    pub async fn create_folder(&self, params: &CreateFolder) -> Result<Value, ToolError> {
        self.send_json(Method::POST, &["notes", &params.note_code, "folders"], params)
            .await
    }

    // ── Comments ───────────────────────────────────────────────────

    pub async fn search_comments(&self, params: &SearchComments) -> Result<Value, ToolError> {
        self.search(&["comments"], query_pairs(params)).await
    }

    pub async fn create_comment(&self, params: &CreateComment) -> Result<Value, ToolError> {
        self.send_json(Method::POST, &["pages", &params.page_code, "comments"], params)
            .await
    }

    pub async fn update_comment(&self, params: &UpdateComment) -> Result<Value, ToolError> {
        let number = params.comment.comment_number.to_string();
        self.send_json(
            Method::PATCH,
            &["pages", &params.comment.page_code, "comments", &number],
            params,
        )
        .await
    }

    pub async fn delete_comment(&self, params: &CommentRef) -> Result<Value, ToolError> {
        let number = params.comment_number.to_string();
        let result = self
            .send(
                Method::DELETE,
                &["pages", &params.page_code, "comments", &number],
                Vec::new(),
                RequestBody::Empty,
            )
            .await?;
        Ok(or_confirmation(
            result,
            json!({
                "message": "Comment deleted",
                "page_code": params.page_code,
                "comment_number": params.comment_number
            }),
        ))
    }

    // ── Attachments ────────────────────────────────────────────────

    pub async fn search_attachments(
        &self,
        params: &SearchAttachments,
    ) -> Result<Value, ToolError> {
        self.search(&["attachments"], query_pairs(params)).await
    }

    /// Resolves where an attachment can be fetched from. The file content is
    /// never read: large binaries do not belong in a tool result.
    pub async fn attachment_download_info(
        &self,
        params: &AttachmentRef,
    ) -> Result<Value, ToolError> {
        let url = self.endpoint(&["attachments", "download", &params.file_id], &[]);
        let response = self
            .dispatch(Method::GET, url.clone(), RequestBody::Empty)
            .await?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return self.finish(response).await.map(|result| result.body);
        }

        let redirect_url = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        drop(response);

        let mut info = json!({
            "file_id": params.file_id,
            "download_url": url.as_str(),
            "requires_authorization": true,
            "message": "Fetch download_url with an 'Authorization: Bearer <NOTEPM_API_TOKEN>' header to get the file content."
        });
        if let Some(redirect_url) = redirect_url {
            info["redirect_url"] = Value::String(redirect_url);
            info["message"] = Value::String(
                "NotePM redirected the download. Fetch redirect_url directly, or download_url with an 'Authorization: Bearer <NOTEPM_API_TOKEN>' header.".to_string(),
            );
        }
        Ok(info)
    }

    pub async fn delete_attachment(&self, params: &AttachmentRef) -> Result<Value, ToolError> {
        let result = self
            .send(
                Method::DELETE,
                &["attachments", &params.file_id],
                Vec::new(),
                RequestBody::Empty,
            )
            .await?;
        Ok(or_confirmation(
            result,
            json!({ "message": "Attachment deleted", "file_id": params.file_id }),
        ))
    }

    pub async fn upload_attachment(&self, params: UploadAttachment) -> Result<Value, ToolError> {
        let contents = file_part(params.source, &params.file_name).await?;
        let mut form = Form::new()
            .text("page_code", params.page_code)
            .text("file[name]", params.file_name)
            .part("file[contents]", contents);
        if let Some(comment_number) = params.comment_number {
            form = form.text("comment_number", comment_number.to_string());
        }
        let result = self
            .send(
                Method::POST,
                &["attachments"],
                Vec::new(),
                RequestBody::Multipart(form),
            )
            .await?;
        Ok(result.body)
    }

    // ── Tags ───────────────────────────────────────────────────────

    pub async fn search_tags(&self, paging: &Paging) -> Result<Value, ToolError> {
        self.search(&["tags"], query_pairs(paging)).await
    }

    pub async fn create_tag(&self, params: &CreateTag) -> Result<Value, ToolError> {
        self.send_json(Method::POST, &["tags"], params).await
    }

    /// NotePM addresses tags by name in the request body, not the path.
    pub async fn delete_tag(&self, params: &TagRef) -> Result<Value, ToolError> {
        let result = self
            .send(
                Method::DELETE,
                &["tags"],
                Vec::new(),
                RequestBody::Json(json_body(params)?),
            )
            .await?;
        Ok(or_confirmation(
            result,
            json!({ "message": "Tag deleted", "name": params.name }),
        ))
    }

    // ── Users ──────────────────────────────────────────────────────

    pub async fn search_users(&self, params: &SearchUsers) -> Result<Value, ToolError> {
        self.search(&["users"], query_pairs(params)).await
    }

    pub async fn user_detail(&self, params: &UserRef) -> Result<Value, ToolError> {
        self.get(&["users", &params.user_code], Vec::new()).await
    }

    pub async fn current_user(&self) -> Result<Value, ToolError> {
        self.get(&["user", "account"], Vec::new()).await
    }

    // ── Groups ─────────────────────────────────────────────────────

    pub async fn search_groups(&self, params: &SearchGroups) -> Result<Value, ToolError> {
        self.search(&["groups"], query_pairs(params)).await
    }

    pub async fn create_group(&self, params: &CreateGroup) -> Result<Value, ToolError> {
        self.send_json(Method::POST, &["groups"], params).await
    }

    pub async fn group_detail(&self, params: &GroupRef) -> Result<Value, ToolError> {
        self.get(&["groups", &params.group_name], Vec::new()).await
    }

    pub async fn delete_group(&self, params: &GroupRef) -> Result<Value, ToolError> {
        let result = self
            .send(
                Method::DELETE,
                &["groups", &params.group_name],
                Vec::new(),
                RequestBody::Empty,
            )
            .await?;
        Ok(or_confirmation(
            result,
            json!({ "message": "Group deleted", "group_name": params.group_name }),
        ))
    }

    // ── Transport ──────────────────────────────────────────────────

    async fn get(
        &self,
        segments: &[&str],
        query: Vec<(String, String)>,
    ) -> Result<Value, ToolError> {
        let result = self
            .send(Method::GET, segments, query, RequestBody::Empty)
            .await?;
        Ok(result.body)
    }

    async fn search(
        &self,
        segments: &[&str],
        query: Vec<(String, String)>,
    ) -> Result<Value, ToolError> {
        let mut body = self.get(segments, query).await?;
        let truncated = truncate_free_text(&mut body, self.max_body_length);
        if truncated > 0 {
            tracing::debug!(
                truncated,
                max_chars = self.max_body_length,
                "shortened free-text fields in search result"
            );
        }
        Ok(body)
    }

    async fn send_json<T: Serialize>(
        &self,
        method: Method,
        segments: &[&str],
        params: &T,
    ) -> Result<Value, ToolError> {
        let body = json_body(params)?;
        let result = self
            .send(method, segments, Vec::new(), RequestBody::Json(body))
            .await?;
        Ok(result.body)
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: Vec<(String, String)>,
        body: RequestBody,
    ) -> Result<ApiCallResult, ToolError> {
        let url = self.endpoint(segments, &query);
        let response = self.dispatch(method, url, body).await?;
        self.finish(response).await
    }

    fn endpoint(&self, segments: &[&str], query: &[(String, String)]) -> Url {
        let mut url = self.api_base.clone();
        // Each segment is percent-encoded on its own, so codes and names
        // containing '/' or '?' cannot escape their path position.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            let mut qp = url.query_pairs_mut();
            for (k, v) in query {
                qp.append_pair(k, v);
            }
        }
        url
    }

    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: RequestBody,
    ) -> Result<reqwest::Response, ToolError> {
        tracing::debug!(method = %method, path = url.path(), "sending NotePM request");
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.api_token);
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Multipart(form) => request.multipart(form),
        };
        request.send().await.map_err(|e| self.transport_error(e))
    }

    async fn finish(&self, response: reqwest::Response) -> Result<ApiCallResult, ToolError> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = parse_response_body(&bytes);
        if !status.is_success() {
            let message = remote_message(&body, status);
            tracing::warn!(status = status.as_u16(), %message, "NotePM request failed");
            return Err(ToolError::RemoteApi {
                status: status.as_u16(),
                message,
                body,
            });
        }
        Ok(ApiCallResult {
            status: status.as_u16(),
            body,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ToolError {
        let timed_out = err.is_timeout();
        let message = if timed_out {
            format!(
                "NotePM API did not respond within {:?}",
                self.request_timeout
            )
        } else {
            format!("Failed to reach NotePM API at {}: {err}", self.api_base)
        };
        tracing::warn!(timed_out, error = %err, "NotePM request did not complete");
        ToolError::Transport { message, timed_out }
    }
}

async fn file_part(source: UploadSource, file_name: &str) -> Result<Part, ToolError> {
    let part = match source {
        UploadSource::Path(path) => {
            let (file, len) = open_upload_file(&path).await?;
            Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), len)
        }
        UploadSource::InlineBytes(bytes) => Part::bytes(bytes),
    };
    Ok(part.file_name(file_name.to_string()))
}

async fn open_upload_file(path: &Path) -> Result<(tokio::fs::File, u64), ToolError> {
    let unreadable = |e: std::io::Error| {
        ToolError::invalid_field(
            "file_path",
            format!("Cannot read '{}': {e}", path.display()),
        )
    };
    let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let metadata = file.metadata().await.map_err(unreadable)?;
    if !metadata.is_file() {
        return Err(ToolError::invalid_field(
            "file_path",
            format!("'{}' is not a regular file", path.display()),
        ));
    }
    Ok((file, metadata.len()))
}

fn json_body<T: Serialize>(params: &T) -> Result<Value, ToolError> {
    serde_json::to_value(params)
        .map_err(|e| ToolError::validation(format!("Failed to encode request body: {e}")))
}

/// Flattens serialized params into query pairs. `None` fields are already
/// skipped at serialization time; nulls are dropped defensively.
fn query_pairs<T: Serialize>(params: &T) -> Vec<(String, String)> {
    let Ok(Value::Object(map)) = serde_json::to_value(params) else {
        return Vec::new();
    };
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

/// Write endpoints that answer 204 or an empty body still get a payload the
/// agent can read.
fn or_confirmation(result: ApiCallResult, confirmation: Value) -> Value {
    if result.body.is_null() {
        tracing::debug!(status = result.status, "empty NotePM response, returning confirmation");
        confirmation
    } else {
        result.body
    }
}

fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

fn remote_message(body: &Value, status: StatusCode) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    };
    match body {
        Value::Object(fields) => {
            if let Some(message) = fields
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
            {
                return message.to_string();
            }
            if let Some(messages) = fields.get("messages") {
                let mut collected = Vec::new();
                collect_strings(messages, &mut collected);
                if !collected.is_empty() {
                    return collected.join("; ");
                }
            }
            if let Some(error) = fields.get("error").and_then(Value::as_str) {
                return error.to_string();
            }
            fallback()
        }
        Value::String(text) if !text.trim().is_empty() => {
            truncate_chars(text.trim(), RAW_ERROR_MESSAGE_MAX_CHARS).into_owned()
        }
        _ => fallback(),
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.push(text.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(fields) => fields.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use notepm_core::config::ConfigInputs;
    use serde_json::Map;

    use super::*;

    fn client(api_base: &str) -> NotepmClient {
        let config = NotepmConfig::resolve(ConfigInputs {
            api_base: Some(api_base.to_string()),
            api_token: Some("tok".to_string()),
            ..ConfigInputs::default()
        })
        .expect("valid config");
        NotepmClient::new(&config).expect("client builds")
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn endpoint_percent_encodes_each_segment() {
        let client = client("https://acme.notepm.jp/api/v1");
        let url = client.endpoint(&["groups", "dev/ops team"], &[]);
        assert_eq!(
            url.as_str(),
            "https://acme.notepm.jp/api/v1/groups/dev%2Fops%20team"
        );
        let url = client.endpoint(&["pages", "a?b#c"], &[]);
        assert_eq!(url.path(), "/api/v1/pages/a%3Fb%23c");
    }

    #[test]
    fn endpoint_appends_query_pairs() {
        let client = client("http://127.0.0.1:9/api/v1");
        let url = client.endpoint(
            &["pages"],
            &[
                ("q".to_string(), "日本 語".to_string()),
                ("page".to_string(), "2".to_string()),
            ],
        );
        assert_eq!(url.path(), "/api/v1/pages");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "日本 語".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn query_pairs_render_numbers_and_skip_absent_fields() {
        let params = SearchPages::from_args(&args(json!({
            "q": "release",
            "only_title": 1,
            "per_page": 5
        })))
        .unwrap();
        let mut pairs = query_pairs(&params);
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("include_archived".to_string(), "0".to_string()),
                ("only_title".to_string(), "1".to_string()),
                ("page".to_string(), "1".to_string()),
                ("per_page".to_string(), "5".to_string()),
                ("q".to_string(), "release".to_string()),
            ]
        );
    }

    #[test]
    fn remote_message_prefers_message_then_messages() {
        assert_eq!(
            remote_message(&json!({ "message": "not found" }), StatusCode::NOT_FOUND),
            "not found"
        );
        assert_eq!(
            remote_message(
                &json!({ "messages": { "title": ["too long"], "note_code": ["required"] } }),
                StatusCode::UNPROCESSABLE_ENTITY
            ),
            "required; too long"
        );
        assert_eq!(
            remote_message(&json!({ "error": "unauthorized" }), StatusCode::UNAUTHORIZED),
            "unauthorized"
        );
        assert_eq!(
            remote_message(&Value::Null, StatusCode::BAD_GATEWAY),
            "Bad Gateway"
        );
        assert_eq!(
            remote_message(
                &Value::String("<html>down</html>".to_string()),
                StatusCode::SERVICE_UNAVAILABLE
            ),
            "<html>down</html>"
        );
    }

    #[test]
    fn empty_bodies_parse_as_null() {
        assert!(parse_response_body(b"").is_null());
        assert!(parse_response_body(b" \n").is_null());
        assert_eq!(parse_response_body(b"{\"a\":1}"), json!({ "a": 1 }));
        assert_eq!(parse_response_body(b"plain"), json!("plain"));
    }

    #[test]
    fn confirmation_only_replaces_empty_bodies() {
        let empty = ApiCallResult {
            status: 204,
            body: Value::Null,
        };
        assert_eq!(
            or_confirmation(empty, json!({ "message": "Page deleted" })),
            json!({ "message": "Page deleted" })
        );
        let echoed = ApiCallResult {
            status: 200,
            body: json!({ "page": { "page_code": "p1" } }),
        };
        assert_eq!(
            or_confirmation(echoed, json!({ "message": "Page deleted" })),
            json!({ "page": { "page_code": "p1" } })
        );
    }

    #[tokio::test]
    async fn directory_is_not_uploadable() {
        let dir = std::env::temp_dir();
        let err = open_upload_file(&dir).await.unwrap_err();
        assert_eq!(err.field(), Some("file_path"));
    }

    #[tokio::test]
    async fn missing_upload_file_is_a_validation_error() {
        let err = open_upload_file(Path::new("/definitely/not/here.bin"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_failed");
        assert!(err.to_string().contains("/definitely/not/here.bin"));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transport_error() {
        let client = client("http://127.0.0.1:9/api/v1");
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.code(), "transport_error");
        assert!(err.retryable());
    }
}
