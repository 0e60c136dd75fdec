//! The fixed NotePM tool catalog: names, descriptions and input schemas as
//! advertised through `tools/list`.
//!
//! Descriptions can be replaced per tool with an environment variable named
//! after the tool, upper-cased, with a `_DESCRIPTION` suffix
//! (`notepm_search` → `NOTEPM_SEARCH_DESCRIPTION`). Overrides are read once
//! when the catalog is built and never change afterwards.

use notepm_core::error::ToolError;
use serde_json::{Map, Value, json};

use crate::args::MAX_PER_PAGE;
use crate::params::{LIST_PER_PAGE_DEFAULT, NOTE_SCOPES, SEARCH_PER_PAGE_DEFAULT, USER_STATUSES};

/// Effect of a tool on remote state, surfaced as MCP tool annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAccess {
    Read,
    Write,
    Destructive,
}

#[derive(Debug)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    access: ToolAccess,
    input_schema: Value,
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: String,
    pub access: ToolAccess,
    pub input_schema: Value,
}

impl ToolDescriptor {
    fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
            "annotations": {
                "readOnlyHint": self.access == ToolAccess::Read,
                "destructiveHint": self.access == ToolAccess::Destructive,
                "openWorldHint": true
            }
        })
    }
}

/// Immutable, fully resolved tool catalog.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
    strict_arguments: bool,
}

impl ToolCatalog {
    /// Builds the catalog, reading description overrides from the process environment.
    pub fn from_env(strict_arguments: bool) -> Self {
        Self::with_overrides(strict_arguments, |key| std::env::var(key).ok())
    }

    pub fn with_overrides(
        strict_arguments: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let tools = tool_definitions()
            .into_iter()
            .map(|tool| {
                let description = lookup(&description_env_var(tool.name))
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| tool.description.to_string());
                let mut input_schema = tool.input_schema;
                if strict_arguments {
                    input_schema["additionalProperties"] = Value::Bool(false);
                }
                ToolDescriptor {
                    name: tool.name,
                    description,
                    access: tool.access,
                    input_schema,
                }
            })
            .collect();
        Self {
            tools,
            strict_arguments,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_payload(&self) -> Value {
        let tools: Vec<Value> = self.tools.iter().map(ToolDescriptor::to_value).collect();
        json!({ "tools": tools })
    }

    /// Rejects unknown tools, and in strict mode any argument the schema
    /// does not declare. Shape and presence of declared arguments are left
    /// to the typed inputs in `params`.
    pub fn check_arguments(&self, name: &str, args: &Map<String, Value>) -> Result<(), ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let declared = tool
            .input_schema
            .get("properties")
            .and_then(Value::as_object);
        for key in args.keys() {
            if declared.is_some_and(|properties| properties.contains_key(key)) {
                continue;
            }
            if self.strict_arguments {
                return Err(ToolError::invalid_field(
                    key.as_str(),
                    format!("Unknown argument '{key}' for tool '{name}'"),
                ));
            }
            tracing::debug!(tool = name, argument = %key, "ignoring undeclared argument");
        }
        Ok(())
    }
}

pub fn description_env_var(tool_name: &str) -> String {
    format!("{}_DESCRIPTION", tool_name.to_ascii_uppercase())
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

fn with_paging(mut properties: Value, default_per_page: u64) -> Value {
    properties["page"] = json!({
        "type": "integer",
        "minimum": 1,
        "default": 1,
        "description": "Page number (1-based)"
    });
    properties["per_page"] = json!({
        "type": "integer",
        "minimum": 1,
        "maximum": MAX_PER_PAGE,
        "default": default_per_page,
        "description": "Results per page"
    });
    properties
}

fn flag(description: &str) -> Value {
    json!({ "type": "integer", "enum": [0, 1], "default": 0, "description": description })
}

fn string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn bounded_string(description: &str, max_length: usize) -> Value {
    json!({ "type": "string", "maxLength": max_length, "description": description })
}

fn integer(description: &str) -> Value {
    json!({ "type": "integer", "minimum": 0, "description": description })
}

fn string_array(description: &str) -> Value {
    json!({ "type": "array", "items": { "type": "string" }, "description": description })
}

fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        // Pages
        ToolDefinition {
            name: "notepm_search",
            description: "Search NotePM pages. Terms are AND-matched keywords; natural-language questions are not supported. Long page bodies are shortened in results; use notepm_page_detail for the full text.",
            access: ToolAccess::Read,
            input_schema: object_schema(
                with_paging(
                    json!({
                        "q": string("Search keywords"),
                        "only_title": flag("1 to match titles only, 0 for full text"),
                        "include_archived": flag("1 to include archived pages"),
                        "note_code": string("Restrict to one note"),
                        "tag_name": string("Restrict to pages carrying this tag"),
                        "created": string("Creation date filter")
                    }),
                    SEARCH_PER_PAGE_DEFAULT,
                ),
                &["q"],
            ),
        },
        ToolDefinition {
            name: "notepm_page_detail",
            description: "Fetch one NotePM page, including its full body.",
            access: ToolAccess::Read,
            input_schema: object_schema(json!({ "page_code": string("Page code") }), &["page_code"]),
        },
        ToolDefinition {
            name: "notepm_page_create",
            description: "Create a NotePM page. note_code and title are required.",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "note_code": string("Note that will contain the page"),
                    "title": bounded_string("Page title", 100),
                    "folder_id": integer("Folder to place the page in"),
                    "body": string("Page body (Markdown)"),
                    "memo": bounded_string("Revision memo", 255),
                    "tags": string_array("Tag names"),
                    "user": string("Author user code or name"),
                    "created_at": string("Creation timestamp (ISO 8601)")
                }),
                &["note_code", "title"],
            ),
        },
        ToolDefinition {
            name: "notepm_page_update",
            description: "Update a NotePM page. page_code is required; omitted fields stay unchanged.",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "page_code": string("Page code"),
                    "title": bounded_string("Page title", 100),
                    "folder_id": integer("Folder to move the page to"),
                    "body": string("Page body (Markdown)"),
                    "memo": bounded_string("Revision memo", 255),
                    "tags": string_array("Tag names (replaces existing tags)")
                }),
                &["page_code"],
            ),
        },
        ToolDefinition {
            name: "notepm_page_delete",
            description: "Delete a NotePM page. page_code is required.",
            access: ToolAccess::Destructive,
            input_schema: object_schema(json!({ "page_code": string("Page code") }), &["page_code"]),
        },
        // Notes
        ToolDefinition {
            name: "notepm_note_list",
            description: "List NotePM notes.",
            access: ToolAccess::Read,
            input_schema: object_schema(with_paging(json!({}), LIST_PER_PAGE_DEFAULT), &[]),
        },
        ToolDefinition {
            name: "notepm_note_detail",
            description: "Fetch one NotePM note.",
            access: ToolAccess::Read,
            input_schema: object_schema(json!({ "note_code": string("Note code") }), &["note_code"]),
        },
        ToolDefinition {
            name: "notepm_note_create",
            description: "Create a NotePM note. name and scope (open/private) are required.",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "name": bounded_string("Note name", 30),
                    "scope": { "type": "string", "enum": NOTE_SCOPES, "description": "Visibility" },
                    "icon": string("Icon image, base64 encoded"),
                    "description": bounded_string("Note description", 200),
                    "groups": string_array("Group names granted access"),
                    "users": string_array("User codes granted access")
                }),
                &["name", "scope"],
            ),
        },
        ToolDefinition {
            name: "notepm_note_update",
            description: "Update a NotePM note. note_code is required; omitted fields stay unchanged.",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "note_code": string("Note code"),
                    "name": bounded_string("Note name", 30),
                    "scope": { "type": "string", "enum": NOTE_SCOPES, "description": "Visibility" },
                    "description": bounded_string("Note description", 200),
                    "groups": string_array("Group names granted access"),
                    "users": string_array("User codes granted access")
                }),
                &["note_code"],
            ),
        },
        ToolDefinition {
            name: "notepm_note_delete",
            description: "Delete a NotePM note. note_code is required.",
            access: ToolAccess::Destructive,
            input_schema: object_schema(json!({ "note_code": string("Note code") }), &["note_code"]),
        },
        ToolDefinition {
            name: "notepm_note_archive",
            description: "Archive a NotePM note.",
            access: ToolAccess::Write,
            input_schema: object_schema(json!({ "note_code": string("Note code") }), &["note_code"]),
        },
        ToolDefinition {
            name: "notepm_note_unarchive",
            description: "Restore an archived NotePM note.",
            access: ToolAccess::Write,
            input_schema: object_schema(json!({ "note_code": string("Note code") }), &["note_code"]),
        },
        // Folders
        ToolDefinition {
            name: "notepm_folder_list",
            description: "List the folders of a NotePM note.",
            access: ToolAccess::Read,
            input_schema: object_schema(
                with_paging(
                    json!({
                        "note_code": string("Note code"),
                        "include_archived": flag("1 to include archived folders")
                    }),
                    LIST_PER_PAGE_DEFAULT,
                ),
                &["note_code"],
            ),
        },
        ToolDefinition {
            name: "notepm_folder_create",
            description: "Create a folder inside a NotePM note. note_code and name are required.",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "note_code": string("Note code"),
                    "name": bounded_string("Folder name", 100),
                    "parent_folder_id": integer("Parent folder; omit to create at the note root")
                }),
                &["note_code", "name"],
            ),
        },
        // Comments
        ToolDefinition {
            name: "notepm_comment_search",
            description: "Search NotePM comments.",
            access: ToolAccess::Read,
            input_schema: object_schema(
                with_paging(
                    json!({
                        "q": string("Search keywords"),
                        "note_code": string("Restrict to one note"),
                        "page_code": string("Restrict to one page"),
                        "comment_by": string("Restrict to one author (user code)")
                    }),
                    LIST_PER_PAGE_DEFAULT,
                ),
                &[],
            ),
        },
        ToolDefinition {
            name: "notepm_comment_create",
            description: "Add a comment to a NotePM page. page_code and body are required.",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "page_code": string("Page code"),
                    "body": string("Comment text"),
                    "user": string("Author user code or name"),
                    "created_at": string("Creation timestamp (ISO 8601)"),
                    "notify_user_codes": string_array("Users to notify")
                }),
                &["page_code", "body"],
            ),
        },
        ToolDefinition {
            name: "notepm_comment_update",
            description: "Edit a comment on a NotePM page.",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "page_code": string("Page code"),
                    "comment_number": integer("Comment number within the page"),
                    "body": string("New comment text")
                }),
                &["page_code", "comment_number", "body"],
            ),
        },
        ToolDefinition {
            name: "notepm_comment_delete",
            description: "Delete a comment from a NotePM page.",
            access: ToolAccess::Destructive,
            input_schema: object_schema(
                json!({
                    "page_code": string("Page code"),
                    "comment_number": integer("Comment number within the page")
                }),
                &["page_code", "comment_number"],
            ),
        },
        // Attachments
        ToolDefinition {
            name: "notepm_attachment_search",
            description: "Search NotePM attachments.",
            access: ToolAccess::Read,
            input_schema: object_schema(
                with_paging(
                    json!({
                        "q": string("Search keywords"),
                        "file_name": string("File name filter"),
                        "note_code": string("Restrict to one note"),
                        "page_code": string("Restrict to one page")
                    }),
                    LIST_PER_PAGE_DEFAULT,
                ),
                &[],
            ),
        },
        ToolDefinition {
            name: "notepm_attachment_download",
            description: "Get download information for a NotePM attachment. The file itself is not transferred; fetch download_url with the API token.",
            access: ToolAccess::Read,
            input_schema: object_schema(json!({ "file_id": string("Attachment file id") }), &["file_id"]),
        },
        ToolDefinition {
            name: "notepm_attachment_delete",
            description: "Delete a NotePM attachment.",
            access: ToolAccess::Destructive,
            input_schema: object_schema(json!({ "file_id": string("Attachment file id") }), &["file_id"]),
        },
        ToolDefinition {
            name: "notepm_attachment_upload",
            description: "Upload a file to a NotePM page. page_code and file_name are required. Pass exactly one of file_path (local file) or file_content_base64 (base64 encoded content).",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "page_code": string("Page to attach the file to"),
                    "file_name": string("File name shown in NotePM"),
                    "file_path": string("Local path of the file to upload"),
                    "file_content_base64": string("File content, base64 encoded"),
                    "comment_number": integer("Attach to this comment instead of the page body")
                }),
                &["page_code", "file_name"],
            ),
        },
        // Tags
        ToolDefinition {
            name: "notepm_tag_search",
            description: "List NotePM tags.",
            access: ToolAccess::Read,
            input_schema: object_schema(with_paging(json!({}), LIST_PER_PAGE_DEFAULT), &[]),
        },
        ToolDefinition {
            name: "notepm_tag_create",
            description: "Create a NotePM tag. name is required.",
            access: ToolAccess::Write,
            input_schema: object_schema(
                json!({
                    "name": string("Tag name"),
                    "parent_name": string("Parent tag name")
                }),
                &["name"],
            ),
        },
        ToolDefinition {
            name: "notepm_tag_delete",
            description: "Delete a NotePM tag.",
            access: ToolAccess::Destructive,
            input_schema: object_schema(json!({ "name": string("Tag name") }), &["name"]),
        },
        // Users
        ToolDefinition {
            name: "notepm_user_search",
            description: "List NotePM users.",
            access: ToolAccess::Read,
            input_schema: object_schema(
                with_paging(
                    json!({
                        "status": { "type": "string", "enum": USER_STATUSES, "description": "Account status filter" }
                    }),
                    LIST_PER_PAGE_DEFAULT,
                ),
                &[],
            ),
        },
        ToolDefinition {
            name: "notepm_user_detail",
            description: "Fetch one NotePM user.",
            access: ToolAccess::Read,
            input_schema: object_schema(json!({ "user_code": string("User code") }), &["user_code"]),
        },
        ToolDefinition {
            name: "notepm_user_me",
            description: "Fetch the NotePM account that owns the API token.",
            access: ToolAccess::Read,
            input_schema: object_schema(json!({}), &[]),
        },
        // Groups
        ToolDefinition {
            name: "notepm_group_search",
            description: "List NotePM groups.",
            access: ToolAccess::Read,
            input_schema: object_schema(
                with_paging(
                    json!({
                        "name": string("Group name filter"),
                        "user_code": string("Only groups containing this user")
                    }),
                    LIST_PER_PAGE_DEFAULT,
                ),
                &[],
            ),
        },
        ToolDefinition {
            name: "notepm_group_create",
            description: "Create a NotePM group. name is required.",
            access: ToolAccess::Write,
            input_schema: object_schema(json!({ "name": string("Group name") }), &["name"]),
        },
        ToolDefinition {
            name: "notepm_group_detail",
            description: "Fetch one NotePM group.",
            access: ToolAccess::Read,
            input_schema: object_schema(json!({ "group_name": string("Group name") }), &["group_name"]),
        },
        ToolDefinition {
            name: "notepm_group_delete",
            description: "Delete a NotePM group.",
            access: ToolAccess::Destructive,
            input_schema: object_schema(json!({ "group_name": string("Group name") }), &["group_name"]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn catalog_names_are_unique_and_prefixed() {
        let catalog = ToolCatalog::with_overrides(false, |_| None);
        assert_eq!(catalog.len(), 32);
        let names: HashSet<_> = catalog.tools.iter().map(|tool| tool.name).collect();
        assert_eq!(names.len(), catalog.len());
        assert!(names.iter().all(|name| name.starts_with("notepm_")));
    }

    #[test]
    fn every_required_field_is_declared() {
        let catalog = ToolCatalog::with_overrides(false, |_| None);
        for tool in &catalog.tools {
            let properties = tool.input_schema["properties"]
                .as_object()
                .expect("schema has properties");
            if let Some(required) = tool.input_schema.get("required") {
                for field in required.as_array().expect("required is an array") {
                    let field = field.as_str().expect("required entries are strings");
                    assert!(
                        properties.contains_key(field),
                        "{} requires undeclared field {field}",
                        tool.name
                    );
                }
            }
        }
    }

    #[test]
    fn description_override_is_applied() {
        let catalog = ToolCatalog::with_overrides(false, |key| {
            (key == "NOTEPM_SEARCH_DESCRIPTION").then(|| "Team wiki search".to_string())
        });
        assert_eq!(
            catalog.get("notepm_search").unwrap().description,
            "Team wiki search"
        );
        assert!(
            catalog
                .get("notepm_page_detail")
                .unwrap()
                .description
                .starts_with("Fetch one NotePM page")
        );
    }

    #[test]
    fn blank_override_keeps_default() {
        let catalog = ToolCatalog::with_overrides(false, |_| Some("   ".to_string()));
        assert!(
            catalog
                .get("notepm_user_me")
                .unwrap()
                .description
                .starts_with("Fetch the NotePM account")
        );
    }

    #[test]
    fn env_var_names_follow_tool_names() {
        assert_eq!(description_env_var("notepm_search"), "NOTEPM_SEARCH_DESCRIPTION");
        assert_eq!(
            description_env_var("notepm_page_detail"),
            "NOTEPM_PAGE_DETAIL_DESCRIPTION"
        );
    }

    #[test]
    fn unknown_arguments_follow_strictness_policy() {
        let args = json!({ "page_code": "p1", "verbose": true })
            .as_object()
            .cloned()
            .unwrap();

        let lenient = ToolCatalog::with_overrides(false, |_| None);
        assert!(lenient.check_arguments("notepm_page_detail", &args).is_ok());

        let strict = ToolCatalog::with_overrides(true, |_| None);
        let err = strict
            .check_arguments("notepm_page_detail", &args)
            .unwrap_err();
        assert_eq!(err.field(), Some("verbose"));
        assert_eq!(
            strict.get("notepm_page_detail").unwrap().input_schema["additionalProperties"],
            false
        );
    }

    #[test]
    fn unknown_tool_is_reported() {
        let catalog = ToolCatalog::with_overrides(false, |_| None);
        let err = catalog
            .check_arguments("notepm_everything", &Map::new())
            .unwrap_err();
        assert_eq!(err.code(), "unknown_tool");
    }

    #[test]
    fn annotations_reflect_access() {
        let catalog = ToolCatalog::with_overrides(false, |_| None);
        let listed = catalog.list_payload();
        let tools = listed["tools"].as_array().unwrap();
        let delete = tools
            .iter()
            .find(|tool| tool["name"] == "notepm_page_delete")
            .unwrap();
        assert_eq!(delete["annotations"]["destructiveHint"], true);
        assert_eq!(delete["annotations"]["readOnlyHint"], false);
        let search = tools
            .iter()
            .find(|tool| tool["name"] == "notepm_search")
            .unwrap();
        assert_eq!(search["annotations"]["readOnlyHint"], true);
        assert_eq!(search["inputSchema"]["required"], json!(["q"]));
    }
}
