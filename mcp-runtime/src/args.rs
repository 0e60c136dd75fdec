//! Readers for the loosely typed JSON argument map delivered by `tools/call`.
//! Each helper names the offending field in its `ToolError`.

use notepm_core::error::ToolError;
use serde_json::{Map, Value};

pub(crate) const MAX_PER_PAGE: u64 = 100;

pub(crate) fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args.get(key).ok_or_else(|| ToolError::missing_field(key))?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.clone()),
        Value::String(_) => Err(ToolError::invalid_field(
            key,
            format!("'{key}' must not be empty"),
        )),
        Value::Null => Err(ToolError::missing_field(key)),
        _ => Err(ToolError::invalid_field(
            key,
            format!("'{key}' must be a string"),
        )),
    }
}

pub(crate) fn arg_optional_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(ToolError::invalid_field(
            key,
            format!("'{key}' must be a string"),
        )),
    }
}

pub(crate) fn required_u64(args: &Map<String, Value>, key: &str) -> Result<u64, ToolError> {
    arg_optional_u64(args, key)?.ok_or_else(|| ToolError::missing_field(key))
}

pub(crate) fn arg_optional_u64(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| {
                ToolError::invalid_field(key, format!("'{key}' must be an unsigned integer"))
            })
            .map(Some),
        Some(_) => Err(ToolError::invalid_field(
            key,
            format!("'{key}' must be an unsigned integer"),
        )),
    }
}

/// 0/1 switch as used by NotePM query parameters. Booleans are accepted too.
pub(crate) fn arg_flag(args: &Map<String, Value>, key: &str) -> Result<u8, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Bool(v)) => Ok(u8::from(*v)),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Ok(0),
            Some(1) => Ok(1),
            _ => Err(ToolError::invalid_field(
                key,
                format!("'{key}' must be 0 or 1"),
            )),
        },
        Some(_) => Err(ToolError::invalid_field(
            key,
            format!("'{key}' must be 0 or 1"),
        )),
    }
}

pub(crate) fn arg_optional_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, ToolError> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let items = value.as_array().ok_or_else(|| {
        ToolError::invalid_field(key, format!("'{key}' must be an array of strings"))
    })?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = item.as_str().ok_or_else(|| {
            ToolError::invalid_field(key, format!("'{key}' items must be strings"))
        })?;
        let normalized = text.trim();
        if !normalized.is_empty() {
            out.push(normalized.to_string());
        }
    }
    Ok(Some(out))
}

pub(crate) fn ensure_max_chars(key: &str, value: &str, max: usize) -> Result<(), ToolError> {
    if value.chars().count() > max {
        return Err(ToolError::invalid_field(
            key,
            format!("'{key}' must be at most {max} characters"),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_one_of(key: &str, value: &str, allowed: &[&str]) -> Result<(), ToolError> {
    if !allowed.contains(&value) {
        return Err(ToolError::invalid_field(
            key,
            format!("'{key}' must be one of: {}", allowed.join(", ")),
        ));
    }
    Ok(())
}

/// `page` / `per_page` passthrough with NotePM's bounds.
pub(crate) fn paging(
    args: &Map<String, Value>,
    default_per_page: u64,
) -> Result<(u64, u64), ToolError> {
    let page = arg_optional_u64(args, "page")?.unwrap_or(1);
    if page == 0 {
        return Err(ToolError::invalid_field("page", "'page' starts at 1"));
    }
    let per_page = arg_optional_u64(args, "per_page")?.unwrap_or(default_per_page);
    if per_page == 0 || per_page > MAX_PER_PAGE {
        return Err(ToolError::invalid_field(
            "per_page",
            format!("'per_page' must be between 1 and {MAX_PER_PAGE}"),
        ));
    }
    Ok((page, per_page))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("test args must be an object")
    }

    #[test]
    fn required_string_rejects_missing_blank_and_mistyped() {
        let args = map(json!({ "blank": "  ", "number": 3 }));
        assert_eq!(
            required_string(&args, "absent").unwrap_err().field(),
            Some("absent")
        );
        assert!(
            required_string(&args, "blank")
                .unwrap_err()
                .to_string()
                .contains("must not be empty")
        );
        assert!(
            required_string(&args, "number")
                .unwrap_err()
                .to_string()
                .contains("must be a string")
        );
    }

    #[test]
    fn optional_string_treats_blank_as_absent() {
        let args = map(json!({ "tag_name": "", "note_code": "abc" }));
        assert_eq!(arg_optional_string(&args, "tag_name").unwrap(), None);
        assert_eq!(
            arg_optional_string(&args, "note_code").unwrap(),
            Some("abc".to_string())
        );
    }

    #[test]
    fn flag_accepts_integers_and_booleans() {
        let args = map(json!({ "a": 1, "b": false, "c": 2, "d": "1" }));
        assert_eq!(arg_flag(&args, "a").unwrap(), 1);
        assert_eq!(arg_flag(&args, "b").unwrap(), 0);
        assert_eq!(arg_flag(&args, "missing").unwrap(), 0);
        assert_eq!(arg_flag(&args, "c").unwrap_err().field(), Some("c"));
        assert_eq!(arg_flag(&args, "d").unwrap_err().field(), Some("d"));
    }

    #[test]
    fn negative_integers_are_rejected() {
        let args = map(json!({ "folder_id": -4 }));
        assert_eq!(
            arg_optional_u64(&args, "folder_id").unwrap_err().field(),
            Some("folder_id")
        );
    }

    #[test]
    fn string_array_drops_blank_items() {
        let args = map(json!({ "tags": ["rust", " ", " mcp "], "bad": ["ok", 1] }));
        assert_eq!(
            arg_optional_string_array(&args, "tags").unwrap(),
            Some(vec!["rust".to_string(), "mcp".to_string()])
        );
        assert!(arg_optional_string_array(&args, "bad").is_err());
    }

    #[test]
    fn paging_applies_defaults_and_bounds() {
        assert_eq!(paging(&map(json!({})), 20).unwrap(), (1, 20));
        assert_eq!(
            paging(&map(json!({ "page": 3, "per_page": 100 })), 20).unwrap(),
            (3, 100)
        );
        assert_eq!(
            paging(&map(json!({ "page": 0 })), 20).unwrap_err().field(),
            Some("page")
        );
        assert_eq!(
            paging(&map(json!({ "per_page": 101 })), 20)
                .unwrap_err()
                .field(),
            Some("per_page")
        );
    }

    #[test]
    fn length_limits_count_characters_not_bytes() {
        assert!(ensure_max_chars("name", &"ノ".repeat(30), 30).is_ok());
        assert!(ensure_max_chars("name", &"ノ".repeat(31), 30).is_err());
    }
}
