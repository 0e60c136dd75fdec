//! Typed inputs, one per tool. `from_args` is the validation boundary: a
//! struct only exists once every required field is present and every
//! constraint holds, so handlers never see a malformed request.
//!
//! Fields marked `#[serde(skip)]` travel in the URL path; everything else is
//! serialized into the query string or JSON body.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use notepm_core::error::ToolError;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::args::{
    arg_flag, arg_optional_string, arg_optional_string_array, arg_optional_u64, ensure_max_chars,
    ensure_one_of, paging, required_string, required_u64,
};

type Args = Map<String, Value>;

pub(crate) const NOTE_SCOPES: [&str; 2] = ["open", "private"];
pub(crate) const USER_STATUSES: [&str; 3] = ["normal", "deleted", "suspended"];
pub(crate) const SEARCH_PER_PAGE_DEFAULT: u64 = 10;
pub(crate) const LIST_PER_PAGE_DEFAULT: u64 = 20;

const PAGE_TITLE_MAX_CHARS: usize = 100;
const PAGE_MEMO_MAX_CHARS: usize = 255;
const NOTE_NAME_MAX_CHARS: usize = 30;
const NOTE_DESCRIPTION_MAX_CHARS: usize = 200;
const FOLDER_NAME_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Paging {
    pub page: u64,
    pub per_page: u64,
}

impl Paging {
    fn from_args(args: &Args, default_per_page: u64) -> Result<Self, ToolError> {
        let (page, per_page) = paging(args, default_per_page)?;
        Ok(Self { page, per_page })
    }
}

// ── Pages ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SearchPages {
    pub q: String,
    pub only_title: u8,
    pub include_archived: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(flatten)]
    pub paging: Paging,
}

impl SearchPages {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            q: required_string(args, "q")?,
            only_title: arg_flag(args, "only_title")?,
            include_archived: arg_flag(args, "include_archived")?,
            note_code: arg_optional_string(args, "note_code")?,
            tag_name: arg_optional_string(args, "tag_name")?,
            created: arg_optional_string(args, "created")?,
            paging: Paging::from_args(args, SEARCH_PER_PAGE_DEFAULT)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PageRef {
    pub page_code: String,
}

impl PageRef {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            page_code: required_string(args, "page_code")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePage {
    pub note_code: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl CreatePage {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        let title = required_string(args, "title")?;
        ensure_max_chars("title", &title, PAGE_TITLE_MAX_CHARS)?;
        let memo = arg_optional_string(args, "memo")?;
        if let Some(memo) = &memo {
            ensure_max_chars("memo", memo, PAGE_MEMO_MAX_CHARS)?;
        }
        Ok(Self {
            note_code: required_string(args, "note_code")?,
            title,
            folder_id: arg_optional_u64(args, "folder_id")?,
            body: arg_optional_string(args, "body")?,
            memo,
            tags: arg_optional_string_array(args, "tags")?,
            user: arg_optional_string(args, "user")?,
            created_at: arg_optional_string(args, "created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatePage {
    #[serde(skip)]
    pub page_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl UpdatePage {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        let title = arg_optional_string(args, "title")?;
        if let Some(title) = &title {
            ensure_max_chars("title", title, PAGE_TITLE_MAX_CHARS)?;
        }
        let memo = arg_optional_string(args, "memo")?;
        if let Some(memo) = &memo {
            ensure_max_chars("memo", memo, PAGE_MEMO_MAX_CHARS)?;
        }
        Ok(Self {
            page_code: required_string(args, "page_code")?,
            title,
            folder_id: arg_optional_u64(args, "folder_id")?,
            body: arg_optional_string(args, "body")?,
            memo,
            tags: arg_optional_string_array(args, "tags")?,
        })
    }
}

// ── Notes & folders ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NoteRef {
    pub note_code: String,
}

impl NoteRef {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            note_code: required_string(args, "note_code")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateNote {
    pub name: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
}

impl CreateNote {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        let name = required_string(args, "name")?;
        ensure_max_chars("name", &name, NOTE_NAME_MAX_CHARS)?;
        let scope = required_string(args, "scope")?;
        ensure_one_of("scope", &scope, &NOTE_SCOPES)?;
        let description = arg_optional_string(args, "description")?;
        if let Some(description) = &description {
            ensure_max_chars("description", description, NOTE_DESCRIPTION_MAX_CHARS)?;
        }
        Ok(Self {
            name,
            scope,
            icon: arg_optional_string(args, "icon")?,
            description,
            groups: arg_optional_string_array(args, "groups")?,
            users: arg_optional_string_array(args, "users")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateNote {
    #[serde(skip)]
    pub note_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
}

impl UpdateNote {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        let name = arg_optional_string(args, "name")?;
        if let Some(name) = &name {
            ensure_max_chars("name", name, NOTE_NAME_MAX_CHARS)?;
        }
        let scope = arg_optional_string(args, "scope")?;
        if let Some(scope) = &scope {
            ensure_one_of("scope", scope, &NOTE_SCOPES)?;
        }
        let description = arg_optional_string(args, "description")?;
        if let Some(description) = &description {
            ensure_max_chars("description", description, NOTE_DESCRIPTION_MAX_CHARS)?;
        }
        Ok(Self {
            note_code: required_string(args, "note_code")?,
            name,
            scope,
            description,
            groups: arg_optional_string_array(args, "groups")?,
            users: arg_optional_string_array(args, "users")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListFolders {
    #[serde(skip)]
    pub note_code: String,
    pub include_archived: u8,
    #[serde(flatten)]
    pub paging: Paging,
}

impl ListFolders {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            note_code: required_string(args, "note_code")?,
            include_archived: arg_flag(args, "include_archived")?,
            paging: Paging::from_args(args, LIST_PER_PAGE_DEFAULT)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFolder {
    #[serde(skip)]
    pub note_code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<u64>,
}

impl CreateFolder {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        let name = required_string(args, "name")?;
        ensure_max_chars("name", &name, FOLDER_NAME_MAX_CHARS)?;
        Ok(Self {
            note_code: required_string(args, "note_code")?,
            name,
            parent_folder_id: arg_optional_u64(args, "parent_folder_id")?,
        })
    }
}

// ── Comments ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SearchComments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_by: Option<String>,
    #[serde(flatten)]
    pub paging: Paging,
}

impl SearchComments {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            q: arg_optional_string(args, "q")?,
            note_code: arg_optional_string(args, "note_code")?,
            page_code: arg_optional_string(args, "page_code")?,
            comment_by: arg_optional_string(args, "comment_by")?,
            paging: Paging::from_args(args, LIST_PER_PAGE_DEFAULT)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateComment {
    #[serde(skip)]
    pub page_code: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_user_codes: Option<Vec<String>>,
}

impl CreateComment {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            page_code: required_string(args, "page_code")?,
            body: required_string(args, "body")?,
            user: arg_optional_string(args, "user")?,
            created_at: arg_optional_string(args, "created_at")?,
            notify_user_codes: arg_optional_string_array(args, "notify_user_codes")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommentRef {
    pub page_code: String,
    pub comment_number: u64,
}

impl CommentRef {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            page_code: required_string(args, "page_code")?,
            comment_number: required_u64(args, "comment_number")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateComment {
    #[serde(skip)]
    pub comment: CommentRef,
    pub body: String,
}

impl UpdateComment {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            comment: CommentRef::from_args(args)?,
            body: required_string(args, "body")?,
        })
    }
}

// ── Attachments ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SearchAttachments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_code: Option<String>,
    #[serde(flatten)]
    pub paging: Paging,
}

impl SearchAttachments {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            q: arg_optional_string(args, "q")?,
            file_name: arg_optional_string(args, "file_name")?,
            note_code: arg_optional_string(args, "note_code")?,
            page_code: arg_optional_string(args, "page_code")?,
            paging: Paging::from_args(args, LIST_PER_PAGE_DEFAULT)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub file_id: String,
}

impl AttachmentRef {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            file_id: required_string(args, "file_id")?,
        })
    }
}

/// Where the bytes of an upload come from. Exactly one source per upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// Local file, streamed from disk.
    Path(PathBuf),
    /// Content already decoded from the `file_content_base64` argument.
    InlineBytes(Vec<u8>),
}

impl UploadSource {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        let file_path = arg_optional_string(args, "file_path")?;
        let inline = arg_optional_string(args, "file_content_base64")?;
        match (file_path, inline) {
            (Some(_), Some(_)) => Err(ToolError::invalid_field(
                "file_path",
                "Pass either 'file_path' or 'file_content_base64', not both",
            )),
            (None, None) => Err(ToolError::invalid_field(
                "file_path",
                "One of 'file_path' or 'file_content_base64' is required",
            )),
            (Some(path), None) => Ok(UploadSource::Path(PathBuf::from(path))),
            (None, Some(encoded)) => {
                let compact: String = encoded.split_whitespace().collect();
                STANDARD
                    .decode(compact.as_bytes())
                    .map(UploadSource::InlineBytes)
                    .map_err(|e| {
                        ToolError::invalid_field(
                            "file_content_base64",
                            format!("'file_content_base64' is not valid base64: {e}"),
                        )
                    })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadAttachment {
    pub page_code: String,
    pub file_name: String,
    pub source: UploadSource,
    pub comment_number: Option<u64>,
}

impl UploadAttachment {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            page_code: required_string(args, "page_code")?,
            file_name: required_string(args, "file_name")?,
            source: UploadSource::from_args(args)?,
            comment_number: arg_optional_u64(args, "comment_number")?,
        })
    }
}

// ── Tags, users, groups ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateTag {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
}

impl CreateTag {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            name: required_string(args, "name")?,
            parent_name: arg_optional_string(args, "parent_name")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TagRef {
    pub name: String,
}

impl TagRef {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            name: required_string(args, "name")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchUsers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub paging: Paging,
}

impl SearchUsers {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        let status = arg_optional_string(args, "status")?;
        if let Some(status) = &status {
            ensure_one_of("status", status, &USER_STATUSES)?;
        }
        Ok(Self {
            status,
            paging: Paging::from_args(args, LIST_PER_PAGE_DEFAULT)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UserRef {
    pub user_code: String,
}

impl UserRef {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            user_code: required_string(args, "user_code")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchGroups {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
    #[serde(flatten)]
    pub paging: Paging,
}

impl SearchGroups {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            name: arg_optional_string(args, "name")?,
            user_code: arg_optional_string(args, "user_code")?,
            paging: Paging::from_args(args, LIST_PER_PAGE_DEFAULT)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGroup {
    pub name: String,
}

impl CreateGroup {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            name: required_string(args, "name")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupRef {
    pub group_name: String,
}

impl GroupRef {
    pub(crate) fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            group_name: required_string(args, "group_name")?,
        })
    }
}

/// Paging-only tools (`notepm_note_list`, `notepm_tag_search`).
pub(crate) fn list_paging(args: &Args) -> Result<Paging, ToolError> {
    Paging::from_args(args, LIST_PER_PAGE_DEFAULT)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Args {
        value.as_object().cloned().expect("test args must be an object")
    }

    #[test]
    fn search_pages_defaults_match_remote_api() {
        let params = SearchPages::from_args(&map(json!({ "q": "deploy" }))).unwrap();
        let query = serde_json::to_value(&params).unwrap();
        assert_eq!(
            query,
            json!({
                "q": "deploy",
                "only_title": 0,
                "include_archived": 0,
                "page": 1,
                "per_page": 10
            })
        );
    }

    #[test]
    fn search_pages_requires_query() {
        let err = SearchPages::from_args(&map(json!({ "note_code": "n1" }))).unwrap_err();
        assert_eq!(err.field(), Some("q"));
    }

    #[test]
    fn update_page_keeps_code_out_of_body() {
        let params = UpdatePage::from_args(&map(json!({
            "page_code": "pc1",
            "title": "Renamed",
            "tags": ["a"]
        })))
        .unwrap();
        assert_eq!(params.page_code, "pc1");
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({ "title": "Renamed", "tags": ["a"] })
        );
    }

    #[test]
    fn create_page_enforces_title_length() {
        let err = CreatePage::from_args(&map(json!({
            "note_code": "n1",
            "title": "t".repeat(101)
        })))
        .unwrap_err();
        assert_eq!(err.field(), Some("title"));
    }

    #[test]
    fn create_note_validates_scope() {
        let ok = CreateNote::from_args(&map(json!({ "name": "N", "scope": "open" }))).unwrap();
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "name": "N", "scope": "open" })
        );
        let err =
            CreateNote::from_args(&map(json!({ "name": "N", "scope": "team" }))).unwrap_err();
        assert_eq!(err.field(), Some("scope"));
    }

    #[test]
    fn comment_update_needs_number_and_body() {
        let err = UpdateComment::from_args(&map(json!({ "page_code": "p", "body": "b" })))
            .unwrap_err();
        assert_eq!(err.field(), Some("comment_number"));
        let params = UpdateComment::from_args(&map(json!({
            "page_code": "p",
            "comment_number": 7,
            "body": "edited"
        })))
        .unwrap();
        assert_eq!(params.comment.comment_number, 7);
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({ "body": "edited" })
        );
    }

    #[test]
    fn upload_source_is_exclusive() {
        let both = map(json!({ "file_path": "/tmp/a", "file_content_base64": "aGk=" }));
        let neither = map(json!({}));
        assert!(matches!(
            UploadSource::from_args(&both),
            Err(ToolError::Validation { .. })
        ));
        assert!(matches!(
            UploadSource::from_args(&neither),
            Err(ToolError::Validation { .. })
        ));
    }

    #[test]
    fn upload_source_decodes_inline_content() {
        let args = map(json!({ "file_content_base64": "aGVs\nbG8=" }));
        assert_eq!(
            UploadSource::from_args(&args).unwrap(),
            UploadSource::InlineBytes(b"hello".to_vec())
        );
        let bad = map(json!({ "file_content_base64": "***" }));
        assert_eq!(
            UploadSource::from_args(&bad).unwrap_err().field(),
            Some("file_content_base64")
        );
    }

    #[test]
    fn user_status_is_restricted() {
        assert!(SearchUsers::from_args(&map(json!({ "status": "normal" }))).is_ok());
        assert_eq!(
            SearchUsers::from_args(&map(json!({ "status": "active" })))
                .unwrap_err()
                .field(),
            Some("status")
        );
    }
}
