//! Gemini provider adapter (spec §4.2).

use serde_json::Value;

use super::types::{Extraction, ToolCall};

/// Sentinel terminating any Gemini (and OpenAI-style) SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Extract parts from `candidates[0].content.parts[]`. A part with
/// `thought: true` plus `text` is thinking; a part with plain `text` is
/// visible text; `functionCall: {name, args}` is a tool call.
pub fn extract_buffered(body: &Value) -> Extraction {
    let Some(parts) = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|p| p.as_array())
    else {
        return Extraction::empty();
    };

    let mut thinking_parts = Vec::new();
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for part in parts {
        if let Some(func) = part.get("functionCall") {
            let name = func.get("name").and_then(|n| n.as_str()).unwrap_or("").to_string();
            let arguments = func.get("args").cloned().unwrap_or(Value::Null);
            tool_calls.push(ToolCall { name, arguments });
            continue;
        }
        let Some(text) = part.get("text").and_then(|t| t.as_str()) else {
            continue;
        };
        let is_thought = part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false);
        if is_thought {
            thinking_parts.push(text.to_string());
        } else {
            text_parts.push(text.to_string());
        }
    }

    let thinking = if thinking_parts.is_empty() {
        None
    } else {
        Some(thinking_parts.join("\n\n---\n\n"))
    };
    let original_tokens = thinking.as_ref().map(|t| t.split_whitespace().count()).unwrap_or(0);

    Extraction {
        thinking,
        text: text_parts.join(""),
        tool_calls,
        confidence: 1.0,
        original_tokens,
    }
}

/// Accumulates a chunked Gemini SSE stream (each event is a full
/// `GenerateContentResponse` fragment, the same shape as the buffered
/// body). Events after the `[DONE]` sentinel must not be fed.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    thinking_parts: Vec<String>,
    text_parts: Vec<String>,
    tool_calls: Vec<ToolCall>,
}

impl SseAccumulator {
    pub fn new() -> Self {
        SseAccumulator::default()
    }

    pub fn feed(&mut self, event: &Value) {
        let chunk = extract_buffered(event);
        if let Some(t) = chunk.thinking {
            self.thinking_parts.push(t);
        }
        if !chunk.text.is_empty() {
            self.text_parts.push(chunk.text);
        }
        self.tool_calls.extend(chunk.tool_calls);
    }

    pub fn finish(self) -> Extraction {
        let thinking = if self.thinking_parts.is_empty() {
            None
        } else {
            Some(self.thinking_parts.join("\n\n---\n\n"))
        };
        let original_tokens = thinking.as_ref().map(|t| t.split_whitespace().count()).unwrap_or(0);
        Extraction {
            thinking,
            text: self.text_parts.join(""),
            tool_calls: self.tool_calls,
            confidence: 1.0,
            original_tokens,
        }
    }
}
