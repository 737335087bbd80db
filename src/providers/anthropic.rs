//! Anthropic provider adapter (spec §4.2).
//!
//! Mirrors this codebase's style of navigating raw JSON with
//! `.get()`/`.as_str()` chains (see `clients/openai.rs`'s image-generation
//! response parsing) rather than deserialising into a typed response
//! struct — the wire shape is provider-controlled and only a handful of
//! fields are ever read.

use std::collections::HashMap;

use serde_json::Value;

use super::types::{ExtractedBlock, Extraction, ToolCall};

/// Extract thinking/text/tool_use blocks from a complete (buffered)
/// Anthropic `messages` response body.
///
/// Returns `Extraction::empty()` rather than an error on any parse
/// failure — adapters must never throw (spec §4.2 "resilient parsing").
pub fn extract_buffered(body: &Value) -> Extraction {
    let mut blocks = Vec::new();
    let mut thinking_parts = Vec::new();
    let mut text_parts = Vec::new();

    let Some(content) = body.get("content").and_then(|c| c.as_array()) else {
        return Extraction::empty();
    };

    for block in content {
        let Some(block_type) = block.get("type").and_then(|t| t.as_str()) else {
            continue;
        };
        match block_type {
            "thinking" => {
                if let Some(text) = block.get("thinking").and_then(|t| t.as_str()) {
                    thinking_parts.push(text.to_string());
                    blocks.push(ExtractedBlock::Thinking {
                        content: text.to_string(),
                    });
                }
            }
            "text" => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    text_parts.push(text.to_string());
                    blocks.push(ExtractedBlock::Text {
                        content: text.to_string(),
                    });
                }
            }
            "tool_use" => {
                let name = block
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or("")
                    .to_string();
                let arguments = block.get("input").cloned().unwrap_or(Value::Null);
                blocks.push(ExtractedBlock::ToolUse {
                    name: name.clone(),
                    arguments: arguments.clone(),
                });
            }
            _ => continue,
        }
    }

    let tool_calls = blocks
        .iter()
        .filter_map(|b| match b {
            ExtractedBlock::ToolUse { name, arguments } => Some(ToolCall {
                name: name.clone(),
                arguments: arguments.clone(),
            }),
            _ => None,
        })
        .collect();

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

/// Per-stream state used to accumulate an Anthropic SSE response into an
/// [`Extraction`] across `content_block_start` / `content_block_delta` /
/// `content_block_stop` events, indexed by the block's `index` field.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    blocks: HashMap<u64, BlockState>,
    order: Vec<u64>,
}

#[derive(Debug, Clone)]
struct BlockState {
    block_type: String,
    tool_name: Option<String>,
    buffer: String,
}

impl SseAccumulator {
    pub fn new() -> Self {
        SseAccumulator::default()
    }

    /// Feed one parsed SSE event (the JSON payload following `data: `).
    /// Malformed events are skipped rather than propagated as an error.
    pub fn feed(&mut self, event: &Value) {
        let Some(event_type) = event.get("type").and_then(|t| t.as_str()) else {
            return;
        };

        match event_type {
            "content_block_start" => {
                let Some(index) = event.get("index").and_then(|i| i.as_u64()) else {
                    return;
                };
                let content_block = event.get("content_block");
                let block_type = content_block
                    .and_then(|b| b.get("type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("text")
                    .to_string();
                let tool_name = content_block
                    .and_then(|b| b.get("name"))
                    .and_then(|n| n.as_str())
                    .map(|s| s.to_string());
                if !self.blocks.contains_key(&index) {
                    self.order.push(index);
                }
                self.blocks.insert(
                    index,
                    BlockState {
                        block_type,
                        tool_name,
                        buffer: String::new(),
                    },
                );
            }
            "content_block_delta" => {
                let Some(index) = event.get("index").and_then(|i| i.as_u64()) else {
                    return;
                };
                let Some(delta) = event.get("delta") else {
                    return;
                };
                let Some(delta_type) = delta.get("type").and_then(|t| t.as_str()) else {
                    return;
                };
                let Some(state) = self.blocks.get_mut(&index) else {
                    return;
                };
                match delta_type {
                    "thinking_delta" => {
                        if let Some(t) = delta.get("thinking").and_then(|t| t.as_str()) {
                            state.buffer.push_str(t);
                        }
                    }
                    "text_delta" => {
                        if let Some(t) = delta.get("text").and_then(|t| t.as_str()) {
                            state.buffer.push_str(t);
                        }
                    }
                    "input_json_delta" => {
                        if let Some(t) = delta.get("partial_json").and_then(|t| t.as_str()) {
                            state.buffer.push_str(t);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                // Finalization happens lazily in `finish()`; nothing to do here
                // beyond leaving the accumulated buffer in place.
            }
            _ => {}
        }
    }

    /// Fold all accumulated blocks into a final [`Extraction`]. Safe to call
    /// even if the stream ended early or no events were ever fed.
    pub fn finish(self) -> Extraction {
        let mut thinking_parts = Vec::new();
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        for index in self.order {
            let Some(state) = self.blocks.get(&index) else {
                continue;
            };
            match state.block_type.as_str() {
                "thinking" => thinking_parts.push(state.buffer.clone()),
                "text" => text_parts.push(state.buffer.clone()),
                "tool_use" => {
                    let arguments: Value =
                        serde_json::from_str(&state.buffer).unwrap_or(Value::Object(Default::default()));
                    tool_calls.push(ToolCall {
                        name: state.tool_name.clone().unwrap_or_default(),
                        arguments,
                    });
                }
                _ => {}
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
}
