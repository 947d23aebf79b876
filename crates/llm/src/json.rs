//! Lenient JSON extraction from model replies.

use serde_json::Value;

/// Finds the outermost `{ ... }` in `text` and parses it as an object.
///
/// Models often wrap JSON in prose or code fences. When strict parsing fails a
/// second attempt is made after fixing common slips (trailing commas, Python
/// booleans).
pub fn extract_json_object(text: &str) -> Option<Value> {
    let cleaned = text.trim();
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &cleaned[start..=end];

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => None,
        Err(_) => serde_json::from_str::<Value>(&fix_json_format(candidate))
            .ok()
            .filter(Value::is_object),
    }
}

fn fix_json_format(json_str: &str) -> String {
    json_str
        .replace("True", "true")
        .replace("False", "false")
        .replace(",}", "}")
        .replace(",]", "]")
        .replace(", }", " }")
        .replace(", ]", " ]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_from_code_fence() {
        let reply = "```json\n{\"score\": 0.7, \"rationale\": \"uses cache\"}\n```";
        let value = extract_json_object(reply).unwrap();
        assert_eq!(value["score"], 0.7);
    }

    #[test]
    fn test_repairs_trailing_comma() {
        let value = extract_json_object("{\"keywords\": [\"a\", \"b\",],}").unwrap();
        assert_eq!(value["keywords"][1], "b");
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }
}
