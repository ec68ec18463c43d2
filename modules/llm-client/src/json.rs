//! Tolerant parsing for JSON-mode responses.
//!
//! Models wrap JSON in markdown fences, prepend prose, or cut off mid-object
//! when they hit the token limit. `extract_json` strips fences, finds the
//! first `{` or `[`, trims trailing garbage, and attempts to repair
//! unclosed braces before giving up.

use serde_json::Value;

/// Strip markdown code fences from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Extract the first JSON value embedded in a model response.
pub fn extract_json(response: &str) -> Option<Value> {
    let cleaned = strip_code_blocks(response);

    let start = cleaned.find(['{', '['])?;
    let candidate = &cleaned[start..];

    // Fast path: the remainder parses as-is.
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }

    // Trim trailing garbage: walk back to the last closing bracket and try
    // every prefix ending at a `}` or `]`.
    let bytes = candidate.as_bytes();
    for end in (1..=bytes.len()).rev() {
        if bytes[end - 1] == b'}' || bytes[end - 1] == b']' {
            if let Ok(value) = serde_json::from_str(&candidate[..end]) {
                return Some(value);
            }
        }
    }

    // Repair: close unterminated strings/brackets left by a token cutoff.
    repair_truncated(candidate)
}

fn repair_truncated(candidate: &str) -> Option<Value> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in candidate.chars() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut repaired = candidate.trim_end().to_string();
    // Drop a dangling partial element (e.g. `"desc`, `, ` or `:`).
    while repaired.ends_with([',', ':']) || in_string {
        if in_string {
            repaired.push('"');
            in_string = false;
        } else {
            repaired.pop();
            repaired = repaired.trim_end().to_string();
        }
    }
    while let Some(close) = stack.pop() {
        repaired.push(close);
    }
    serde_json::from_str(&repaired).ok()
}
