//! Provider Adapters (C2): per-provider reasoning/text/tool-call extraction
//! from both buffered JSON and SSE streams (spec §4.2).

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod types;

pub use types::{ExtractedBlock, Extraction, Provider, ToolCall};

use serde_json::Value;

/// Dispatch a buffered (non-streaming) extraction to the right adapter.
pub fn extract_buffered(provider: Provider, body: &Value) -> Extraction {
    match provider {
        Provider::Anthropic => anthropic::extract_buffered(body),
        Provider::Openai => openai::extract_buffered(body),
        Provider::Gemini => gemini::extract_buffered(body),
    }
}

/// Split a raw `text/event-stream` body into its individual JSON data
/// payloads, in order. Tolerates the `data: [DONE]` sentinel OpenAI/some
/// Anthropic events emit, blank keep-alive lines, and any non-JSON line by
/// skipping it rather than failing the whole stream (resilient parsing,
/// spec §4.2).
pub fn parse_sse_events(raw: &str) -> Vec<Value> {
    raw.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|payload| payload.trim())
        .filter(|payload| !payload.is_empty() && *payload != "[DONE]")
        .filter_map(|payload| serde_json::from_str(payload).ok())
        .collect()
}

/// Parse a complete SSE transcript and run it through the matching
/// provider's incremental accumulator, as the gateway's stream-tee
/// background path does once the upstream body has fully drained.
pub fn extract_from_sse(provider: Provider, raw: &str) -> Extraction {
    let events = parse_sse_events(raw);
    match provider {
        Provider::Anthropic => {
            let mut acc = anthropic::SseAccumulator::new();
            for event in &events {
                acc.feed(event);
            }
            acc.finish()
        }
        Provider::Openai => {
            let mut acc = openai::SseAccumulator::new();
            for event in &events {
                acc.feed(event);
            }
            acc.finish()
        }
        Provider::Gemini => {
            let mut acc = gemini::SseAccumulator::new();
            for event in &events {
                acc.feed(event);
            }
            acc.finish()
        }
    }
}

/// Inject the provider-specific reasoning-configuration fields described in
/// spec §4.1 step 4 into an outbound request body. No-ops (returns the body
/// unmodified) for providers/models with no known thinking-config shape,
/// since injection must never fail the forward.
pub fn inject_reasoning_config(provider: Provider, mut body: Value, model: &str) -> Value {
    let Some(obj) = body.as_object_mut() else {
        return body;
    };
    match provider {
        Provider::Anthropic => {
            obj.insert(
                "thinking".to_string(),
                serde_json::json!({"type": "enabled", "budget_tokens": 10000}),
            );
        }
        Provider::Openai => {
            if model.starts_with("gpt-5") {
                obj.insert("reasoning_effort".to_string(), serde_json::json!("medium"));
            }
        }
        Provider::Gemini => {
            let thinking_config = if model.starts_with("gemini-3") {
                serde_json::json!({"thinkingLevel": "HIGH"})
            } else {
                serde_json::json!({"thinkingBudget": 16384, "includeThoughts": true})
            };
            let generation_config = obj
                .entry("generationConfig".to_string())
                .or_insert_with(|| serde_json::json!({}));
            if let Some(gc) = generation_config.as_object_mut() {
                gc.insert("thinkingConfig".to_string(), thinking_config);
            }
        }
    }
    body
}
