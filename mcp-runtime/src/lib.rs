use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Subcommand;
use notepm_core::config::{ConfigError, ConfigInputs, NotepmConfig};
use notepm_core::error::ToolError;
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

mod args;
pub mod client;
pub mod params;
pub mod tools;

pub use client::NotepmClient;
pub use tools::{ToolAccess, ToolCatalog};

use params::{
    AttachmentRef, CommentRef, CreateComment, CreateFolder, CreateGroup, CreateNote, CreatePage,
    CreateTag, GroupRef, ListFolders, NoteRef, PageRef, SearchAttachments, SearchComments,
    SearchGroups, SearchPages, SearchUsers, TagRef, UpdateComment, UpdateNote, UpdatePage,
    UploadAttachment, UserRef, list_paging,
};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2024-11-05", "2025-03-26", "2025-06-18"];
const MCP_SERVER_NAME: &str = "notepm-mcp";
/// Largest single message accepted on stdin, in either framing. Inline
/// base64 uploads dominate.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Subcommand, Clone, Debug, Default)]
pub enum McpCommands {
    /// Serve the NotePM tools over stdio (default)
    #[default]
    Serve,
    /// Print the tool catalog (names, descriptions, input schemas) and exit
    Tools,
}

pub async fn run(inputs: ConfigInputs, command: McpCommands) -> i32 {
    let catalog = ToolCatalog::from_env(inputs.strict_arguments);
    match command {
        McpCommands::Tools => {
            println!("{}", to_pretty_json(&catalog.list_payload()));
            0
        }
        McpCommands::Serve => {
            let server = match NotepmConfig::resolve(inputs)
                .and_then(|config| McpServer::new(&config, catalog))
            {
                Ok(server) => Arc::new(server),
                Err(err) => {
                    let payload = json!({
                        "error": "configuration_error",
                        "message": err.to_string(),
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    return 1;
                }
            };
            tokio::select! {
                result = server.serve_stdio() => match result {
                    Ok(()) => 0,
                    Err(err) => {
                        let payload = json!({
                            "error": "mcp_server_error",
                            "message": err,
                        });
                        eprintln!("{}", to_pretty_json(&payload));
                        1
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, shutting down");
                    0
                }
            }
        }
    }
}

/// How a message arrived on stdin. Responses are written back in the same
/// framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// One JSON document per line.
    Line,
    /// LSP-style `Content-Length` header block followed by the payload.
    ContentLength,
}

#[derive(Debug)]
enum Incoming {
    Message(Framing, Value),
    Malformed(Framing, String),
}

type Outbox = mpsc::UnboundedSender<(Framing, Value)>;

pub struct McpServer {
    client: NotepmClient,
    catalog: ToolCatalog,
    in_flight: Mutex<HashMap<String, AbortHandle>>,
}

impl McpServer {
    pub fn new(config: &NotepmConfig, catalog: ToolCatalog) -> Result<Self, ConfigError> {
        Ok(Self {
            client: NotepmClient::new(config)?,
            catalog,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub async fn serve_stdio(self: Arc<Self>) -> Result<(), String> {
        let reader = BufReader::new(io::stdin());
        self.serve(reader, io::stdout()).await
    }

    /// Reads requests until EOF. Each message is handled on its own task so a
    /// slow NotePM call never blocks the next request; a single writer task
    /// serializes responses onto `writer`.
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        tracing::info!(
            api_base = self.client.api_base(),
            tools = self.catalog.len(),
            "NotePM MCP server ready"
        );
        let (outbox, mut pending) = mpsc::unbounded_channel::<(Framing, Value)>();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some((framing, message)) = pending.recv().await {
                write_message(&mut writer, framing, &message).await?;
            }
            Ok::<(), std::io::Error>(())
        });

        loop {
            // The writer only stops early when the output side failed.
            let incoming = tokio::select! {
                incoming = read_message(&mut reader, MAX_FRAME_BYTES) => incoming
                    .map_err(|e| format!("Failed to read MCP message: {e}"))?,
                () = outbox.closed() => {
                    tracing::warn!("MCP output closed, no longer reading requests");
                    break;
                }
            };
            match incoming {
                None => {
                    tracing::info!("stdin closed, draining in-flight requests");
                    break;
                }
                Some(Incoming::Message(framing, message)) => {
                    self.dispatch(framing, message, &outbox);
                }
                Some(Incoming::Malformed(framing, reason)) => {
                    tracing::warn!(%reason, "discarding malformed MCP message");
                    let response = error_response(Value::Null, RpcError::parse_error(reason));
                    if outbox.send((framing, response)).is_err() {
                        break;
                    }
                }
            }
        }

        drop(outbox);
        writer_task
            .await
            .map_err(|e| format!("MCP writer task failed: {e}"))?
            .map_err(|e| format!("Failed to write MCP response: {e}"))
    }

    fn dispatch(self: &Arc<Self>, framing: Framing, message: Value, outbox: &Outbox) {
        if let Some((method, params)) = as_notification(&message) {
            self.handle_notification(method, params);
            return;
        }
        let request_key = message.get("id").map(request_key);
        let server = Arc::clone(self);
        let outbox = outbox.clone();
        let task = tokio::spawn(async move {
            for response in server.handle_incoming_message(message).await {
                if outbox.send((framing, response)).is_err() {
                    break;
                }
            }
        });
        if let Some(key) = request_key {
            self.track(key, task.abort_handle());
        }
    }

    fn track(&self, key: String, handle: AbortHandle) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.retain(|_, entry| !entry.is_finished());
            in_flight.insert(key, handle);
        }
    }

    fn cancel(&self, request_id: &Value) {
        let key = request_key(request_id);
        let handle = self
            .in_flight
            .lock()
            .ok()
            .and_then(|mut in_flight| in_flight.remove(&key));
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                tracing::info!(request_id = %key, "cancelled in-flight request");
            }
            _ => tracing::debug!(request_id = %key, "cancel for unknown or finished request"),
        }
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never issues outbound requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method, &params);
            None
        }
    }

    fn handle_notification(&self, method: &str, params: &Value) {
        match method {
            "notifications/cancelled" => {
                if let Some(request_id) = params.get("requestId") {
                    self.cancel(request_id);
                }
            }
            "notifications/initialized" => tracing::debug!("client initialized"),
            // Unknown notifications are ignored.
            _ => {}
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.catalog.list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self, params: &Value) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let protocol_version = requested
            .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(version))
            .unwrap_or(MCP_PROTOCOL_VERSION);
        if let Some(client) = params.get("clientInfo").and_then(|info| info.get("name")) {
            tracing::info!(%client, protocol_version, "MCP session initialized");
        }
        json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": "Tools for a NotePM team workspace. Use notepm_search to find pages by keyword and notepm_page_detail to read a page in full; search results shorten long bodies."
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let result = self.call_tool(name, &args).await;
        Ok(build_tool_call_response(name, result))
    }

    /// Runs one tool end to end: argument policy, validation, then exactly
    /// one NotePM request.
    pub async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let started = Instant::now();
        let result = match self.catalog.check_arguments(name, args) {
            Ok(()) => self.execute_tool(name, args).await,
            Err(err) => Err(err),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(tool = name, elapsed_ms, "tool call completed"),
            Err(err) => tracing::warn!(
                tool = name,
                elapsed_ms,
                code = err.code(),
                error = %err,
                "tool call failed"
            ),
        }
        result
    }

    async fn execute_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let client = &self.client;
        match name {
            "notepm_search" => client.search_pages(&SearchPages::from_args(args)?).await,
            "notepm_page_detail" => client.page_detail(&PageRef::from_args(args)?).await,
            "notepm_page_create" => client.create_page(&CreatePage::from_args(args)?).await,
            "notepm_page_update" => client.update_page(&UpdatePage::from_args(args)?).await,
            "notepm_page_delete" => client.delete_page(&PageRef::from_args(args)?).await,

            "notepm_note_list" => client.list_notes(&list_paging(args)?).await,
            "notepm_note_detail" => client.note_detail(&NoteRef::from_args(args)?).await,
            "notepm_note_create" => client.create_note(&CreateNote::from_args(args)?).await,
            "notepm_note_update" => client.update_note(&UpdateNote::from_args(args)?).await,
            "notepm_note_delete" => client.delete_note(&NoteRef::from_args(args)?).await,
            "notepm_note_archive" => client.archive_note(&NoteRef::from_args(args)?).await,
            "notepm_note_unarchive" => client.unarchive_note(&NoteRef::from_args(args)?).await,

            "notepm_folder_list" => client.list_folders(&ListFolders::from_args(args)?).await,
            "notepm_folder_create" => client.create_folder(&CreateFolder::from_args(args)?).await,

            "notepm_comment_search" => {
                client
                    .search_comments(&SearchComments::from_args(args)?)
                    .await
            }
            "notepm_comment_create" => {
                client
                    .create_comment(&CreateComment::from_args(args)?)
                    .await
            }
            "notepm_comment_update" => {
                client
                    .update_comment(&UpdateComment::from_args(args)?)
                    .await
            }
            "notepm_comment_delete" => client.delete_comment(&CommentRef::from_args(args)?).await,

            "notepm_attachment_search" => {
                client
                    .search_attachments(&SearchAttachments::from_args(args)?)
                    .await
            }
            "notepm_attachment_download" => {
                client
                    .attachment_download_info(&AttachmentRef::from_args(args)?)
                    .await
            }
            "notepm_attachment_delete" => {
                client
                    .delete_attachment(&AttachmentRef::from_args(args)?)
                    .await
            }
            "notepm_attachment_upload" => {
                client
                    .upload_attachment(UploadAttachment::from_args(args)?)
                    .await
            }

            "notepm_tag_search" => client.search_tags(&list_paging(args)?).await,
            "notepm_tag_create" => client.create_tag(&CreateTag::from_args(args)?).await,
            "notepm_tag_delete" => client.delete_tag(&TagRef::from_args(args)?).await,

            "notepm_user_search" => client.search_users(&SearchUsers::from_args(args)?).await,
            "notepm_user_detail" => client.user_detail(&UserRef::from_args(args)?).await,
            "notepm_user_me" => client.current_user().await,

            "notepm_group_search" => client.search_groups(&SearchGroups::from_args(args)?).await,
            "notepm_group_create" => client.create_group(&CreateGroup::from_args(args)?).await,
            "notepm_group_detail" => client.group_detail(&GroupRef::from_args(args)?).await,
            "notepm_group_delete" => client.delete_group(&GroupRef::from_args(args)?).await,

            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }
}

fn build_tool_call_response(tool_name: &str, result: Result<Value, ToolError>) -> Value {
    match result {
        Ok(data) => {
            let envelope = json!({
                "status": "complete",
                "tool": tool_name,
                "data": data
            });
            json!({
                "content": [{ "type": "text", "text": to_pretty_json(&envelope) }],
                "structuredContent": envelope
            })
        }
        Err(err) => {
            let envelope = json!({
                "status": "error",
                "tool": tool_name,
                "error": err.to_value()
            });
            json!({
                "isError": true,
                "content": [{ "type": "text", "text": to_pretty_json(&envelope) }],
                "structuredContent": envelope
            })
        }
    }
}

/// Single notifications are handled inline so a cancellation is applied
/// before the next message is read.
fn as_notification(message: &Value) -> Option<(&str, &Value)> {
    let obj = message.as_object()?;
    if obj.contains_key("id") || obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return None;
    }
    let method = obj.get("method").and_then(Value::as_str)?;
    Some((method, obj.get("params").unwrap_or(&Value::Null)))
}

/// JSON-RPC ids may be numbers or strings; `1` and `"1"` stay distinct.
fn request_key(id: &Value) -> String {
    id.to_string()
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// Outcome of reading one stdin line under the frame limit.
enum LineRead {
    Eof,
    Complete,
    /// The line exceeded the limit; the rest of it was discarded.
    Overflow,
}

async fn read_bounded_line<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> Result<LineRead, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let cap = limit as u64 + 1;
    let bytes_read = (&mut *reader).take(cap).read_until(b'\n', line).await?;
    if bytes_read == 0 {
        return Ok(LineRead::Eof);
    }
    if line.len() > limit && line.last() != Some(&b'\n') {
        discard_line(reader).await?;
        return Ok(LineRead::Overflow);
    }
    Ok(LineRead::Complete)
}

/// Skips input up to and including the next newline without buffering it.
async fn discard_line<R>(reader: &mut R) -> Result<(), std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (used, done) = {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|byte| *byte == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (buf.len(), false),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

/// Reads the next message. A bad newline-delimited message comes back as
/// `Malformed` and the stream stays usable; a broken Content-Length frame is
/// an error.
async fn read_message<R>(reader: &mut R, limit: usize) -> Result<Option<Incoming>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        match read_bounded_line(reader, &mut line, limit).await? {
            LineRead::Eof => return Ok(None),
            LineRead::Overflow => {
                return Ok(Some(Incoming::Malformed(
                    Framing::Line,
                    format!("Message exceeds {limit} bytes"),
                )));
            }
            LineRead::Complete => {}
        }
        let Ok(text) = std::str::from_utf8(&line) else {
            return Ok(Some(Incoming::Malformed(
                Framing::Line,
                "Message is not valid UTF-8".to_string(),
            )));
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return Ok(Some(parse_payload(Framing::Line, trimmed.as_bytes())));
        }
        if is_content_length_header(trimmed) {
            let first_header = trimmed.to_string();
            return read_framed_payload(reader, &first_header, limit)
                .await
                .map(Some);
        }
        return Ok(Some(Incoming::Malformed(
            Framing::Line,
            "Expected a JSON message or a Content-Length header".to_string(),
        )));
    }
}

async fn read_framed_payload<R>(
    reader: &mut R,
    first_header: &str,
    limit: usize,
) -> Result<Incoming, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length = parse_content_length(first_header)?;
    let mut line = Vec::new();
    loop {
        match read_bounded_line(reader, &mut line, limit).await? {
            LineRead::Eof => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Unexpected EOF while reading MCP headers",
                ));
            }
            LineRead::Overflow => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("MCP header line exceeds {limit} bytes"),
                ));
            }
            LineRead::Complete => {}
        }
        // Headers other than Content-Length are ignored, readable or not.
        let Ok(header) = std::str::from_utf8(&line) else {
            continue;
        };
        let header = header.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        if let Some(parsed) = parse_content_length(header)? {
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    if content_length > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Content-Length {content_length} exceeds {limit} bytes"),
        ));
    }
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;
    Ok(parse_payload(Framing::ContentLength, &payload))
}

fn is_content_length_header(line: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
}

fn parse_content_length(header: &str) -> Result<Option<usize>, std::io::Error> {
    let Some((name, value)) = header.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    value.trim().parse::<usize>().map(Some).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Invalid Content-Length header",
        )
    })
}

fn parse_payload(framing: Framing, payload: &[u8]) -> Incoming {
    match serde_json::from_slice(payload) {
        Ok(value) => Incoming::Message(framing, value),
        Err(e) => Incoming::Malformed(framing, format!("Invalid JSON payload: {e}")),
    }
}

async fn write_message<W>(writer: &mut W, framing: Framing, value: &Value) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
