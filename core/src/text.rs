use std::borrow::Cow;

use serde_json::Value;

pub const TRUNCATION_MARKER: &str = "...";

/// Free-text fields shortened in search results. Identifiers, titles and
/// timestamps are never touched.
pub const FREE_TEXT_FIELDS: [&str; 2] = ["body", "description"];

/// Cuts `value` to at most `max_chars` Unicode scalar values and appends
/// [`TRUNCATION_MARKER`]. Always cuts on a char boundary.
pub fn truncate_chars(value: &str, max_chars: usize) -> Cow<'_, str> {
    match value.char_indices().nth(max_chars) {
        None => Cow::Borrowed(value),
        Some((byte_index, _)) => {
            let mut truncated = String::with_capacity(byte_index + TRUNCATION_MARKER.len());
            truncated.push_str(&value[..byte_index]);
            truncated.push_str(TRUNCATION_MARKER);
            Cow::Owned(truncated)
        }
    }
}

/// Shortens the free-text fields of a search response in place and returns
/// how many fields were cut.
///
/// NotePM list endpoints answer with an object whose collection sits under a
/// resource key (`pages`, `comments`, `attachments`, ...). Every object found
/// in a top-level array, or directly under a top-level key, is shaped.
pub fn truncate_free_text(response: &mut Value, max_chars: usize) -> usize {
    let Some(root) = response.as_object_mut() else {
        return 0;
    };
    let mut truncated = 0;
    for value in root.values_mut() {
        match value {
            Value::Array(items) => {
                for item in items.iter_mut() {
                    truncated += truncate_item_fields(item, max_chars);
                }
            }
            Value::Object(_) => truncated += truncate_item_fields(value, max_chars),
            _ => {}
        }
    }
    truncated
}

fn truncate_item_fields(item: &mut Value, max_chars: usize) -> usize {
    let Some(fields) = item.as_object_mut() else {
        return 0;
    };
    let mut truncated = 0;
    for key in FREE_TEXT_FIELDS {
        let Some(Value::String(text)) = fields.get_mut(key) else {
            continue;
        };
        let shortened = match truncate_chars(text, max_chars) {
            Cow::Owned(shortened) => shortened,
            Cow::Borrowed(_) => continue,
        };
        *text = shortened;
        truncated += 1;
    }
    truncated
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn short_text_is_borrowed_unchanged() {
        assert!(matches!(truncate_chars("hello", 5), Cow::Borrowed("hello")));
        assert!(matches!(truncate_chars("", 3), Cow::Borrowed("")));
    }

    #[test]
    fn long_text_gets_marker() {
        assert_eq!(truncate_chars("abcdefgh", 3), "abc...");
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundary() {
        let text = "日本語のページ本文です";
        let cut = truncate_chars(text, 4);
        assert_eq!(cut, "日本語の...");
        assert_eq!(cut.chars().count(), 4 + TRUNCATION_MARKER.chars().count());

        let emoji = "👍🏽👍🏽👍🏽";
        let cut = truncate_chars(emoji, 3);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(cut.chars().count(), 3 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn search_payload_fields_are_bounded() {
        let mut response = json!({
            "pages": [
                { "page_code": "p1", "title": "タイトルはそのまま残るべきです", "body": "あ".repeat(50) },
                { "page_code": "p2", "body": "short" },
                { "page_code": "p3", "body": null }
            ],
            "meta": { "total": 3, "description": "x".repeat(20) }
        });
        let cut = truncate_free_text(&mut response, 10);
        assert_eq!(cut, 2);
        assert_eq!(response["pages"][0]["body"], format!("{}...", "あ".repeat(10)));
        assert_eq!(response["pages"][0]["title"], "タイトルはそのまま残るべきです");
        assert_eq!(response["pages"][1]["body"], "short");
        assert!(response["pages"][2]["body"].is_null());
        assert_eq!(response["meta"]["description"], format!("{}...", "x".repeat(10)));
        assert_eq!(response["meta"]["total"], 3);
    }

    #[test]
    fn non_object_payload_is_left_alone() {
        let mut response = json!(["not", "an", "object"]);
        assert_eq!(truncate_free_text(&mut response, 1), 0);
        assert_eq!(response, json!(["not", "an", "object"]));
    }
}
