//! Structured instruction blocks composed into the system message.
//!
//! Kept as keyed blocks so variants can exclude pieces — models with
//! native tool support get the protocol without the inline-markup
//! re-teaching (`TOOL_USAGE_PROTOCOL` dropped).

pub const TOOL_USAGE_PROTOCOL: (&str, &str) = (
    "TOOL_USAGE_PROTOCOL",
    r#"**STRICT TOOL USAGE PROTOCOL**
ALL tool calls MUST follow EXACT structure:
{
  "name": "<tool_name>",
  "arguments": {
    "<param>": "<value>"
  }
}
Every tool call must be wrapped in <fc> and </fc> tags, for example:
<fc>
{
  "name": "vector_store_search",
  "arguments": {
    "query": "post-quantum migration"
  }
}
</fc>
These tags let the host detect and stream calls cleanly.
Do not wrap function calls in markdown backticks; call them in plain text or they will fail."#,
);

pub const CODE_INTERPRETER: (&str, &str) = (
    "CODE_INTERPRETER",
    r#"**CODE INTERPRETER**
1. Always print output or script feedback.
2. Save generated files locally during execution; do not preview them in memory.
3. Generated images default to .png unless specified otherwise."#,
);

pub const VECTOR_SEARCH_RULES: (&str, &str) = (
    "VECTOR_SEARCH_RULES",
    r#"**VECTOR SEARCH RULES**
1. Temporal filters use UNIX timestamps (numeric).
2. Numeric ranges: $eq/$neq/$gte/$lte.
3. Boolean logic: $or/$and/$not.
4. Text matching: $match/$contains.
Pass a natural-language query as the 'query' parameter; the handler embeds it internally."#,
);

pub const VALIDATION_IMPERATIVES: (&str, &str) = (
    "VALIDATION_IMPERATIVES",
    r#"**VALIDATION IMPERATIVES**
1. Double-quotes ONLY for strings.
2. No trailing commas.
3. UNIX timestamps as NUMBERS (no quotes).
4. Operators must start with $."#,
);

pub const ERROR_HANDLING: (&str, &str) = (
    "ERROR_HANDLING",
    r#"**ERROR HANDLING**
- Invalid JSON: abort and request correction.
- Unknown tool: respond naturally.
- Missing parameters: ask for clarification."#,
);

pub const WEB_TOOLS: (&str, &str) = (
    "WEB_TOOLS",
    r#"**WEB TOOLS**
- web_search with a query performs a web search and returns numbered links.
- web_read(url) opens a page; content is paged. Use web_scroll(url, page) to continue reading.
- web_search(url, query) scans an already-opened page for a phrase."#,
);

const ALL_BLOCKS: &[(&str, &str)] = &[
    TOOL_USAGE_PROTOCOL,
    CODE_INTERPRETER,
    VECTOR_SEARCH_RULES,
    VALIDATION_IMPERATIVES,
    ERROR_HANDLING,
    WEB_TOOLS,
];

/// Join all instruction blocks except the excluded keys.
pub fn assemble_instructions(exclude_keys: &[&str]) -> String {
    ALL_BLOCKS
        .iter()
        .filter(|(key, _)| !exclude_keys.contains(key))
        .map(|(_, text)| *text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_includes_protocol() {
        let text = assemble_instructions(&[]);
        assert!(text.contains("STRICT TOOL USAGE PROTOCOL"));
        assert!(text.contains("VECTOR SEARCH RULES"));
    }

    #[test]
    fn exclusion_drops_only_named_block() {
        let text = assemble_instructions(&["TOOL_USAGE_PROTOCOL"]);
        assert!(!text.contains("STRICT TOOL USAGE PROTOCOL"));
        assert!(!text.contains("<fc>"));
        assert!(text.contains("VECTOR SEARCH RULES"));
        assert!(text.contains("ERROR HANDLING"));
    }

    #[test]
    fn unknown_exclusion_is_harmless() {
        assert_eq!(assemble_instructions(&["NO_SUCH_KEY"]), assemble_instructions(&[]));
    }
}
