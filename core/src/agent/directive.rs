// Tool-call directive scanner
//
// Finds `TOOL: <server_id> <tool_name> <json object>` requests embedded in
// generated text. The object's extent comes from the JSON parser itself, so
// nested braces inside arguments are fine.
use serde_json::Value;
use std::ops::Range;

pub const DIRECTIVE_PREFIX: &str = "TOOL:";

/// Arguments that could not be parsed as a JSON object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentError {
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub server_id: String,
    pub tool_name: String,
    pub arguments: Result<Value, ArgumentError>,
    /// Byte range of the whole directive in the scanned text
    pub span: Range<usize>,
}

enum Scan {
    Found(Directive),
    /// Prefix not followed by two tokens and an object
    Skip,
    /// Object never closes; nothing after it can be trusted
    Unterminated(Directive),
}

/// Every directive in `text`, left to right
pub fn scan_directives(text: &str) -> Vec<Directive> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(DIRECTIVE_PREFIX) {
        let start = cursor + offset;
        match scan_one(text, start) {
            Scan::Found(directive) => {
                cursor = directive.span.end;
                found.push(directive);
            }
            Scan::Skip => cursor = start + DIRECTIVE_PREFIX.len(),
            Scan::Unterminated(directive) => {
                found.push(directive);
                break;
            }
        }
    }
    found
}

fn scan_one(text: &str, start: usize) -> Scan {
    let pos = start + DIRECTIVE_PREFIX.len();
    let Some((server_id, pos)) = read_token(text, pos) else {
        return Scan::Skip;
    };
    let Some((tool_name, pos)) = read_token(text, pos) else {
        return Scan::Skip;
    };
    let open = skip_whitespace(text, pos);
    if !text[open..].starts_with('{') {
        return Scan::Skip;
    }

    let mut stream = serde_json::Deserializer::from_str(&text[open..]).into_iter::<Value>();
    if let Some(Ok(value)) = stream.next() {
        let end = open + stream.byte_offset();
        return Scan::Found(Directive {
            server_id,
            tool_name,
            arguments: Ok(value),
            span: start..end,
        });
    }

    // Not valid JSON: find where the object would end so scanning can resume
    match balanced_object_end(text, open) {
        Some(end) => {
            let raw = &text[open..end];
            let reason = serde_json::from_str::<Value>(raw)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "not a JSON object".to_string());
            Scan::Found(Directive {
                server_id,
                tool_name,
                arguments: Err(ArgumentError {
                    raw: raw.to_string(),
                    reason,
                }),
                span: start..end,
            })
        }
        None => Scan::Unterminated(Directive {
            server_id,
            tool_name,
            arguments: Err(ArgumentError {
                raw: text[open..].to_string(),
                reason: "unterminated JSON object".to_string(),
            }),
            span: start..text.len(),
        }),
    }
}

fn skip_whitespace(text: &str, pos: usize) -> usize {
    text[pos..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| pos + i)
        .unwrap_or(text.len())
}

/// A bare token: non-empty run of characters other than whitespace and `{`
fn read_token(text: &str, pos: usize) -> Option<(String, usize)> {
    let begin = skip_whitespace(text, pos);
    let end = text[begin..]
        .char_indices()
        .find(|(_, c)| c.is_whitespace() || *c == '{')
        .map(|(i, _)| begin + i)
        .unwrap_or(text.len());
    if end == begin {
        None
    } else {
        Some((text[begin..end].to_string(), end))
    }
}

/// End (exclusive) of the brace-balanced region opening at `open`,
/// ignoring braces inside string literals
fn balanced_object_end(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.as_bytes()[open..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_directive() {
        let text = "Checking files.\nTOOL: filesystem list_files {\"path\":\".\"}\n<END_OF_TURN>";
        let found = scan_directives(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].server_id, "filesystem");
        assert_eq!(found[0].tool_name, "list_files");
        assert_eq!(found[0].arguments, Ok(json!({"path": "."})));
        assert_eq!(&text[found[0].span.clone()], "TOOL: filesystem list_files {\"path\":\".\"}");
    }

    #[test]
    fn test_nested_braces_and_hyphenated_ids() {
        let text = r#"TOOL: brave-search search {"query": "rust {traits}", "opts": {"count": 2}} then more"#;
        let found = scan_directives(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].server_id, "brave-search");
        assert_eq!(
            found[0].arguments,
            Ok(json!({"query": "rust {traits}", "opts": {"count": 2}}))
        );
    }

    #[test]
    fn test_multiple_in_order() {
        let text = "TOOL: a t1 {}\nsome prose\nTOOL: b t2 {\"k\": 1}";
        let found = scan_directives(text);
        let names: Vec<_> = found
            .iter()
            .map(|d| (d.server_id.as_str(), d.tool_name.as_str()))
            .collect();
        assert_eq!(names, vec![("a", "t1"), ("b", "t2")]);
    }

    #[test]
    fn test_invalid_json_does_not_stop_scan() {
        let text = "TOOL: a t1 {path: 'x'}\nTOOL: b t2 {}";
        let found = scan_directives(text);
        assert_eq!(found.len(), 2);
        let err = found[0].arguments.as_ref().unwrap_err();
        assert_eq!(err.raw, "{path: 'x'}");
        assert_eq!(found[1].arguments, Ok(json!({})));
    }

    #[test]
    fn test_unterminated_object_ends_scan() {
        let text = "TOOL: a t1 {\"path\": \"x\"\nTOOL: b t2 {}";
        let found = scan_directives(text);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].arguments.as_ref().unwrap_err().reason,
            "unterminated JSON object"
        );
    }

    #[test]
    fn test_prefix_without_object_is_prose() {
        assert!(scan_directives("TOOL: is a word; TOOL: a b").is_empty());
        assert!(scan_directives("no directives here").is_empty());

        let found = scan_directives("TOOL: mention only. TOOL: fs ls {}");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].server_id, "fs");
    }

    #[test]
    fn test_braces_inside_strings_when_invalid() {
        let text = r#"TOOL: a t {"x": "}", bad} after TOOL: b t {}"#;
        let found = scan_directives(text);
        assert_eq!(found.len(), 2);
        assert!(found[0].arguments.is_err());
        assert_eq!(found[1].server_id, "b");
    }
}
