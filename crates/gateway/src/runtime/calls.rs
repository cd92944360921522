//! Tool-call extraction and validation helpers: locating `<fc>{…}</fc>`
//! blocks (and loose JSON calls) in model output, repairing the JSON
//! models actually produce, and guarding the argument schema.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn fc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<fc>\s*(\{.*?\})\s*</fc>").unwrap())
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?(.*?)```").unwrap())
}

fn loose_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)\{[^{}]*?"name"\s*:\s*"[^"]+"[^{}]*?"arguments"\s*:\s*\{.*?\}\s*\}"#)
            .unwrap()
    })
}

fn trailing_comma_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").unwrap())
}

/// Replace typographic quotes with their ASCII forms.
pub fn convert_smart_quotes(text: &str) -> String {
    text.replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"")
}

/// Best-effort parse of model-produced JSON: straight parse first (also
/// unwrapping a JSON-encoded string), then smart-quote and trailing-comma
/// repair. Returns only objects.
pub fn ensure_valid_json(text: &str) -> Option<Value> {
    let mut txt = text.trim().to_string();
    if txt.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(&txt) {
        Ok(Value::Object(map)) => return Some(Value::Object(map)),
        Ok(Value::String(inner)) => txt = inner,
        _ => {}
    }

    let repaired = trailing_comma_regex()
        .replace_all(&convert_smart_quotes(&txt), "$1")
        .into_owned();

    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Some(Value::Object(map)),
        _ => None,
    }
}

/// Schema guard for a `{name, arguments}` object: the name is a string,
/// arguments is an object, and every argument value is a scalar — unless
/// the whole document validates as a mongo-style operator query.
pub fn is_valid_function_call(obj: &Value) -> bool {
    let Some(map) = obj.as_object() else {
        return false;
    };
    let Some(name) = map.get("name") else {
        return false;
    };
    let Some(args) = map.get("arguments") else {
        return false;
    };
    if !name.is_string() {
        return false;
    }
    let Some(args) = args.as_object() else {
        return false;
    };
    args.values().all(|v| !v.is_object() && !v.is_array())
}

/// Recursive check for mongo-style filter documents: only `$`-prefixed
/// operator keys may hold nested objects or lists.
pub fn is_complex_vector_search(data: &Value) -> bool {
    let Some(map) = data.as_object() else {
        return false;
    };
    for (key, value) in map {
        if key.starts_with('$') {
            match value {
                Value::Object(_) => {
                    if !is_complex_vector_search(value) {
                        return false;
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if item.is_object() && !is_complex_vector_search(item) {
                            return false;
                        }
                    }
                }
                _ => {}
            }
        } else {
            match value {
                Value::Object(_) => {
                    if !is_complex_vector_search(value) {
                        return false;
                    }
                }
                Value::Array(_) => return false,
                _ => {}
            }
        }
    }
    true
}

/// A call object passes when it has the basic shape and either scalar
/// arguments or a valid operator query in them.
pub fn validate_call(obj: &Value) -> bool {
    if is_valid_function_call(obj) {
        return true;
    }
    // Nested arguments are allowed when they form a mongo-style query.
    let has_shape = obj.get("name").map(Value::is_string).unwrap_or(false)
        && obj.get("arguments").map(Value::is_object).unwrap_or(false);
    has_shape && obj.get("arguments").map(is_complex_vector_search).unwrap_or(false)
}

/// First `<fc>{…}</fc>` block in the text that validates.
pub fn extract_fc_block(text: &str) -> Option<Value> {
    for caps in fc_regex().captures_iter(text) {
        let payload = caps.get(1)?.as_str();
        if let Some(parsed) = ensure_valid_json(payload) {
            if validate_call(&parsed) {
                return Some(parsed);
            }
        }
    }
    None
}

/// Legacy loose scan: any `{"name":…, "arguments":{…}}` object in the
/// body of the text, fences stripped first.
pub fn extract_loose_calls(text: &str) -> Vec<Value> {
    let stripped = fence_regex().replace_all(text, "$1");
    let cleaned = convert_smart_quotes(&stripped);
    loose_call_regex()
        .find_iter(&cleaned)
        .filter_map(|m| ensure_valid_json(m.as_str()))
        .filter(validate_call)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ensure_valid_json_straight_parse() {
        let v = ensure_valid_json(r#"{"name":"t","arguments":{}}"#).unwrap();
        assert_eq!(v["name"], "t");
    }

    #[test]
    fn ensure_valid_json_unwraps_escaped_blob() {
        let escaped = r#""{\"name\":\"t\",\"arguments\":{}}""#;
        let v = ensure_valid_json(escaped).unwrap();
        assert_eq!(v["name"], "t");
    }

    #[test]
    fn ensure_valid_json_repairs_smart_quotes_and_commas() {
        let messy = "{\u{201C}name\u{201D}: \u{201C}t\u{201D}, \u{201C}arguments\u{201D}: {\u{201C}a\u{201D}: 1,}}";
        let v = ensure_valid_json(messy).unwrap();
        assert_eq!(v["arguments"]["a"], 1);
    }

    #[test]
    fn ensure_valid_json_rejects_garbage() {
        assert!(ensure_valid_json("not json at all").is_none());
        assert!(ensure_valid_json("").is_none());
        assert!(ensure_valid_json("[1,2,3]").is_none());
    }

    #[test]
    fn scalar_arguments_validate() {
        assert!(is_valid_function_call(&json!({
            "name": "get_flight_times",
            "arguments": {"departure": "LAX", "arrival": "JFK", "max_stops": 1}
        })));
    }

    #[test]
    fn nested_plain_arguments_rejected() {
        assert!(!is_valid_function_call(&json!({
            "name": "t",
            "arguments": {"nested": {"x": 1}}
        })));
        assert!(!is_valid_function_call(&json!({
            "name": "t",
            "arguments": {"list": [1, 2]}
        })));
    }

    #[test]
    fn missing_fields_rejected() {
        assert!(!is_valid_function_call(&json!({"name": "t"})));
        assert!(!is_valid_function_call(&json!({"arguments": {}})));
        assert!(!is_valid_function_call(&json!({"name": 3, "arguments": {}})));
    }

    #[test]
    fn mongo_operator_queries_validate() {
        assert!(is_complex_vector_search(&json!({
            "created_at": {"$gte": 1672531200, "$lte": 1704067200}
        })));
        assert!(is_complex_vector_search(&json!({
            "$or": [{"priority": {"$gt": 7}}, {"category": "emergency"}]
        })));
        assert!(is_complex_vector_search(&json!({
            "$and": [{"message_role": "assistant"}, {"created_at": {"$gte": 1700000000}}]
        })));
    }

    #[test]
    fn plain_list_under_normal_key_rejected() {
        assert!(!is_complex_vector_search(&json!({"tags": ["a", "b"]})));
    }

    #[test]
    fn validate_call_accepts_filter_arguments() {
        assert!(validate_call(&json!({
            "name": "vector_store_search",
            "arguments": {
                "query": "zero-day vulnerabilities",
                "filters": {"created_at": {"$gte": 1672531200}}
            }
        })));
    }

    #[test]
    fn extract_fc_block_basic() {
        let text = r#"Sure, let me check. <fc>{"name":"get_flight_times","arguments":{"departure":"LAX","arrival":"JFK"}}</fc>"#;
        let call = extract_fc_block(text).unwrap();
        assert_eq!(call["name"], "get_flight_times");
        assert_eq!(call["arguments"]["departure"], "LAX");
    }

    #[test]
    fn extract_fc_block_multiline_payload() {
        let text = "<fc>\n{\n  \"name\": \"computer\",\n  \"arguments\": {\n    \"command\": \"ls\"\n  }\n}\n</fc>";
        let call = extract_fc_block(text).unwrap();
        assert_eq!(call["name"], "computer");
    }

    #[test]
    fn extract_fc_block_skips_invalid_then_finds_valid() {
        let text = r#"<fc>{"bogus": true}</fc> and then <fc>{"name":"t","arguments":{}}</fc>"#;
        let call = extract_fc_block(text).unwrap();
        assert_eq!(call["name"], "t");
    }

    #[test]
    fn extract_fc_block_none_when_absent() {
        assert!(extract_fc_block("no calls here").is_none());
        assert!(extract_fc_block("<fc>not json</fc>").is_none());
    }

    #[test]
    fn extract_loose_call_in_fence() {
        let text = "Here you go:\n```json\n{\"name\": \"t\", \"arguments\": {\"a\": \"b\"}}\n```";
        let calls = extract_loose_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["arguments"]["a"], "b");
    }

    #[test]
    fn extract_loose_call_bare() {
        let text = r#"I will call {"name": "t", "arguments": {"q": "x"}} now."#;
        let calls = extract_loose_calls(text);
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn extract_loose_ignores_invalid() {
        assert!(extract_loose_calls("{\"name\": \"t\"}").is_empty());
    }
}
