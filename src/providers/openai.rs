//! OpenAI provider adapter (spec §4.2).

use std::collections::HashMap;

use serde_json::Value;

use super::types::{Extraction, ToolCall};

/// Extract `content` / `reasoning_content` / `tool_calls` from a complete
/// OpenAI `chat.completions` response body.
pub fn extract_buffered(body: &Value) -> Extraction {
    let Some(message) = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
    else {
        return Extraction::empty();
    };

    let text = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();
    let thinking = message
        .get("reasoning_content")
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let tool_calls = message
        .get("tool_calls")
        .and_then(|tc| tc.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let func = tc.get("function")?;
                    let name = func.get("name")?.as_str()?.to_string();
                    let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
                    let arguments: Value =
                        serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
                    Some(ToolCall { name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();

    let original_tokens = thinking.as_ref().map(|t| t.split_whitespace().count()).unwrap_or(0);

    Extraction {
        thinking,
        text,
        tool_calls,
        confidence: 1.0,
        original_tokens,
    }
}

/// Accumulates an OpenAI SSE stream's `choices[0].delta` fragments.
/// Tool call fragments are keyed by their `index` field since a single
/// tool call's `name`/`arguments` can arrive split across many chunks.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    text: String,
    thinking: String,
    tool_calls: HashMap<u64, (Option<String>, String)>,
    tool_call_order: Vec<u64>,
}

impl SseAccumulator {
    pub fn new() -> Self {
        SseAccumulator::default()
    }

    /// Feed one parsed SSE data payload. The literal `[DONE]` sentinel
    /// should be checked by the caller before calling this (it is not
    /// valid JSON and terminates the stream).
    pub fn feed(&mut self, event: &Value) {
        let Some(delta) = event
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("delta"))
        else {
            return;
        };

        if let Some(t) = delta.get("content").and_then(|c| c.as_str()) {
            self.text.push_str(t);
        }
        if let Some(t) = delta.get("reasoning_content").and_then(|c| c.as_str()) {
            self.thinking.push_str(t);
        }
        if let Some(tool_calls) = delta.get("tool_calls").and_then(|tc| tc.as_array()) {
            for tc in tool_calls {
                let Some(index) = tc.get("index").and_then(|i| i.as_u64()) else {
                    continue;
                };
                let entry = self
                    .tool_calls
                    .entry(index)
                    .or_insert_with(|| {
                        self.tool_call_order.push(index);
                        (None, String::new())
                    });
                if let Some(func) = tc.get("function") {
                    if let Some(name) = func.get("name").and_then(|n| n.as_str()) {
                        entry.0 = Some(entry.0.clone().unwrap_or_default() + name);
                    }
                    if let Some(args) = func.get("arguments").and_then(|a| a.as_str()) {
                        entry.1.push_str(args);
                    }
                }
            }
        }
    }

    pub fn finish(self) -> Extraction {
        let thinking = if self.thinking.is_empty() {
            None
        } else {
            Some(self.thinking)
        };
        let original_tokens = thinking.as_ref().map(|t| t.split_whitespace().count()).unwrap_or(0);

        let mut order = self.tool_call_order;
        order.sort_unstable();
        order.dedup();
        let tool_calls = order
            .into_iter()
            .filter_map(|index| {
                let (name, args_str) = self.tool_calls.get(&index)?;
                let arguments: Value =
                    serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
                Some(ToolCall {
                    name: name.clone().unwrap_or_default(),
                    arguments,
                })
            })
            .collect();

        Extraction {
            thinking,
            text: self.text,
            tool_calls,
            confidence: 1.0,
            original_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buffered_extraction_reads_reasoning_content_and_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "Generics allow...",
                    "reasoning_content": "I should explain generics carefully.",
                    "tool_calls": [{
                        "function": {"name": "search", "arguments": "{\"q\":\"rust generics\"}"}
                    }]
                }
            }]
        });
        let extraction = extract_buffered(&body);
        assert_eq!(extraction.thinking.as_deref(), Some("I should explain generics carefully."));
        assert_eq!(extraction.text, "Generics allow...");
        assert_eq!(extraction.tool_calls[0].name, "search");
    }

    #[test]
    fn sse_accumulator_joins_deltas_keyed_by_tool_call_index() {
        let mut acc = SseAccumulator::new();
        acc.feed(&json!({"choices": [{"delta": {"reasoning_content": "Step one. "}}]}));
        acc.feed(&json!({"choices": [{"delta": {"reasoning_content": "Step two."}}]}));
        acc.feed(&json!({"choices": [{"delta": {"content": "Hello"}}]}));
        acc.feed(&json!({"choices": [{"delta": {"content": " world"}}]}));
        acc.feed(&json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"name": "calc"}}]}}]}));
        acc.feed(&json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"a\":1}"}}]}}]}));
        let extraction = acc.finish();
        assert_eq!(extraction.thinking.as_deref(), Some("Step one. Step two."));
        assert_eq!(extraction.text, "Hello world");
        assert_eq!(extraction.tool_calls[0].name, "calc");
        assert_eq!(extraction.tool_calls[0].arguments["a"], 1);
    }
}
