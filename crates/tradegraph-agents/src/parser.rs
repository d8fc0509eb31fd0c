use tradegraph_models::TradeAction;

const PROPOSAL_MARKER: &str = "FINAL TRANSACTION PROPOSAL:";

/// Find the first JSON object embedded in free text.
///
/// Handles the formats models tend to produce:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Calling a tool now:\n{"key": "value"}`
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    let parse = |candidate: &str| {
        serde_json::from_str::<serde_json::Value>(candidate)
            .ok()
            .filter(serde_json::Value::is_object)
    };

    if trimmed.starts_with('{') {
        if let Some(value) = parse(trimmed) {
            return Some(value);
        }
    }

    if let Some(value) = markdown_block(trimmed).and_then(parse) {
        return Some(value);
    }

    first_balanced_object(trimmed).and_then(parse)
}

fn markdown_block(text: &str) -> Option<&str> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    start_markers.iter().find_map(|marker| {
        let start = text.find(marker)? + marker.len();
        let end = text[start..].find("```")?;
        Some(text[start..start + end].trim())
    })
}

/// First balanced `{ ... }`, skipping braces inside string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Read the recommended action out of a trader or judge statement.
///
/// Prefers the explicit `FINAL TRANSACTION PROPOSAL: **BUY**` marker, then the
/// last standalone upper-case BUY/SELL/HOLD, then falls back to the first line
/// as a free-form action.
pub fn extract_action(text: &str) -> TradeAction {
    let upper = text.to_ascii_uppercase();
    if let Some(pos) = upper.rfind(PROPOSAL_MARKER) {
        let tail = &upper[pos + PROPOSAL_MARKER.len()..];
        let word: String = tail
            .trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '_')
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .collect();
        if let Some(action) = TradeAction::from_word(&word) {
            return action;
        }
    }

    if let Some(action) = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| matches!(*w, "BUY" | "SELL" | "HOLD"))
        .last()
        .and_then(TradeAction::from_word)
    {
        return action;
    }

    match text.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => TradeAction::Other(line.to_string()),
        None => TradeAction::Hold,
    }
}
