//! Classification of raw agent output.
//!
//! Models and providers return turns in several shapes. [`resolve`] is the one
//! place that inspects them; everything downstream works with [`AgentOutput`].
//!
//! Recognised shapes:
//! - a plain string
//! - `{content, tool_calls: [{id, type, function: {name, arguments}}]}` where
//!   `arguments` is a JSON-encoded string
//! - flat tool calls `{id, name, arguments | args | input}`
//! - content part arrays with `{type: "text"}` and `{type: "tool_use"}` parts
//! - text that embeds a JSON object carrying `tool_calls`
//!
//! Nothing here fails: anything unrecognised is a final answer without content.

use serde_json::{Map, Value};
use tradegraph_models::ToolCall;

use crate::parser::extract_json_object;

#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    /// At least one named tool call. Never constructed with an empty list.
    ToolCalls(Vec<ToolCall>),
    /// The agent is done. `None` when no text could be extracted.
    Final(Option<String>),
}

impl AgentOutput {
    pub fn is_final(&self) -> bool {
        matches!(self, AgentOutput::Final(_))
    }
}

pub fn resolve(raw: &Value) -> AgentOutput {
    let calls = match raw {
        Value::String(text) => embedded_calls(text),
        Value::Object(obj) => object_calls(obj),
        Value::Array(parts) => part_calls(parts),
        _ => Vec::new(),
    };

    if calls.is_empty() {
        AgentOutput::Final(extract_content(raw))
    } else {
        AgentOutput::ToolCalls(calls)
    }
}

/// Text carried by a turn, if any. Whitespace-only text counts as none.
pub fn extract_content(raw: &Value) -> Option<String> {
    let text = match raw {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("content")
            .and_then(extract_content)
            .or_else(|| obj.get("text").and_then(Value::as_str).map(str::to_string)),
        Value::Array(parts) => {
            let texts: Vec<String> = parts.iter().filter_map(part_text).collect();
            (!texts.is_empty()).then(|| texts.join("\n"))
        }
        _ => None,
    };
    text.filter(|t| !t.trim().is_empty())
}

fn part_text(part: &Value) -> Option<String> {
    match part {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => {
            let is_text = obj
                .get("type")
                .and_then(Value::as_str)
                .map_or(true, |t| t == "text");
            if is_text {
                obj.get("text").and_then(Value::as_str).map(str::to_string)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn object_calls(obj: &Map<String, Value>) -> Vec<ToolCall> {
    let mut entries: Vec<&Value> = Vec::new();
    if let Some(Value::Array(list)) = obj.get("tool_calls") {
        entries.extend(list.iter());
    }
    if let Some(Value::Array(parts)) = obj.get("content") {
        entries.extend(parts.iter().filter(|p| is_tool_use(p)));
    }
    if entries.is_empty() {
        if let Some(Value::String(text)) = obj.get("content") {
            return embedded_calls(text);
        }
    }
    number_calls(entries)
}

fn part_calls(parts: &[Value]) -> Vec<ToolCall> {
    number_calls(parts.iter().filter(|p| is_tool_use(p)).collect())
}

fn embedded_calls(text: &str) -> Vec<ToolCall> {
    if !text.contains("tool_calls") {
        return Vec::new();
    }
    match extract_json_object(text) {
        Some(Value::Object(obj)) => match obj.get("tool_calls") {
            Some(Value::Array(list)) => number_calls(list.iter().collect()),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn is_tool_use(part: &Value) -> bool {
    part.get("type").and_then(Value::as_str) == Some("tool_use")
}

/// Parse entries in order, assigning `call_{n}` to any call without an id.
fn number_calls(entries: Vec<&Value>) -> Vec<ToolCall> {
    entries
        .into_iter()
        .filter_map(parse_call)
        .enumerate()
        .map(|(n, (id, name, arguments))| ToolCall {
            id: id.unwrap_or_else(|| format!("call_{n}")),
            name,
            arguments,
        })
        .collect()
}

fn parse_call(entry: &Value) -> Option<(Option<String>, String, Value)> {
    let obj = entry.as_object()?;
    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let (name, arguments) = match obj.get("function").and_then(Value::as_object) {
        Some(function) => (function.get("name"), function.get("arguments")),
        None => (
            obj.get("name"),
            obj.get("arguments")
                .or_else(|| obj.get("args"))
                .or_else(|| obj.get("input")),
        ),
    };

    let name = name
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())?
        .to_string();

    Some((id, name, normalize_arguments(arguments)))
}

fn normalize_arguments(arguments: Option<&Value>) -> Value {
    match arguments {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Value::Object(Map::new()),
        Some(Value::String(encoded)) => {
            serde_json::from_str(encoded).unwrap_or_else(|_| Value::String(encoded.clone()))
        }
        Some(other) => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_is_final() {
        assert_eq!(
            resolve(&json!("Market looks strong")),
            AgentOutput::Final(Some("Market looks strong".to_string()))
        );
    }

    #[test]
    fn null_empty_and_absent_calls_are_equivalent() {
        let absent = resolve(&json!({"content": "report"}));
        let null = resolve(&json!({"content": "report", "tool_calls": null}));
        let empty = resolve(&json!({"content": "report", "tool_calls": []}));
        assert_eq!(absent, AgentOutput::Final(Some("report".to_string())));
        assert_eq!(absent, null);
        assert_eq!(absent, empty);
    }

    #[test]
    fn openai_style_with_encoded_arguments() {
        let raw = json!({
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "get_news", "arguments": "{\"look_back_days\": 3}"}
            }]
        });
        let AgentOutput::ToolCalls(calls) = resolve(&raw) else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].name, "get_news");
        assert_eq!(calls[0].arguments["look_back_days"], 3);
    }

    #[test]
    fn flat_calls_get_deterministic_ids() {
        let raw = json!({"tool_calls": [
            {"name": "get_market_data", "args": {"look_back_days": 30}},
            {"arguments": {"ignored": true}},
            {"name": "get_sentiment"}
        ]});
        let AgentOutput::ToolCalls(calls) = resolve(&raw) else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].arguments["look_back_days"], 30);
        assert_eq!(calls[1].id, "call_1");
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn anthropic_content_parts() {
        let raw = json!({"content": [
            {"type": "text", "text": "Let me check the fundamentals."},
            {"type": "tool_use", "id": "toolu_1", "name": "get_fundamentals", "input": {}}
        ]});
        let AgentOutput::ToolCalls(calls) = resolve(&raw) else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].name, "get_fundamentals");

        let text_only = json!([{"type": "text", "text": "Part one"}, {"type": "text", "text": "Part two"}]);
        assert_eq!(
            resolve(&text_only),
            AgentOutput::Final(Some("Part one\nPart two".to_string()))
        );
    }

    #[test]
    fn embedded_json_in_text() {
        let raw = json!("I need data first.\n```json\n{\"tool_calls\": [{\"name\": \"get_news\", \"arguments\": {}}]}\n```");
        let AgentOutput::ToolCalls(calls) = resolve(&raw) else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].name, "get_news");
        assert_eq!(calls[0].id, "call_0");
    }

    #[test]
    fn embedded_empty_list_stays_final() {
        let text = "Report done. {\"tool_calls\": []}";
        assert_eq!(
            resolve(&json!(text)),
            AgentOutput::Final(Some(text.to_string()))
        );
    }

    #[test]
    fn unknown_shapes_have_no_content() {
        assert_eq!(resolve(&Value::Null), AgentOutput::Final(None));
        assert_eq!(resolve(&json!(42)), AgentOutput::Final(None));
        assert_eq!(resolve(&json!({"unexpected": true})), AgentOutput::Final(None));
        assert_eq!(resolve(&json!("   ")), AgentOutput::Final(None));
        assert!(resolve(&json!({"content": ""})).is_final());
    }

    #[test]
    fn unparseable_arguments_are_kept_as_text() {
        let raw = json!({"tool_calls": [{"function": {"name": "get_news", "arguments": "not json"}}]});
        let AgentOutput::ToolCalls(calls) = resolve(&raw) else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].arguments, json!("not json"));
    }

    #[test]
    fn content_from_text_field() {
        assert_eq!(
            extract_content(&json!({"text": "fallback"})),
            Some("fallback".to_string())
        );
    }
}
