//! Request-body transformation before forwarding: reasoning injection plus
//! pending-nudge splicing (spec §4.1 step 4).

use serde_json::Value;

use crate::enforcement::nudge::{self, Nudge};
use crate::providers::{self, Provider};

/// Apply reasoning-config injection and nudge splicing to an outbound
/// request body, in the order spec §4.1 step 4 lists them. `now` selects
/// which of `nudges` are pending and unexpired.
pub fn prepare_outbound_body(
    provider: Provider,
    model: &str,
    mut body: Value,
    nudges: &[Nudge],
    now: chrono::DateTime<chrono::Utc>,
) -> Value {
    body = providers::inject_reasoning_config(provider, body, model);

    let selected = nudge::select_pending(nudges, now);
    if selected.is_empty() {
        return body;
    }
    let notices: Vec<String> = selected.iter().map(|n| n.notice_text()).collect();

    let Some(obj) = body.as_object_mut() else {
        return body;
    };

    match provider {
        Provider::Anthropic => {
            let existing = obj.get("system").and_then(|v| v.as_str()).map(|s| s.to_string());
            let spliced = nudge::splice_into_anthropic_system(existing.as_deref(), &notices);
            obj.insert("system".to_string(), serde_json::json!(spliced));
        }
        Provider::Openai => {
            if let Some(system_msg) = nudge::splice_into_openai_messages(&notices) {
                let messages = obj.entry("messages".to_string()).or_insert_with(|| serde_json::json!([]));
                if let Some(arr) = messages.as_array_mut() {
                    arr.insert(0, system_msg);
                }
            }
        }
        Provider::Gemini => {}
    }

    body
}
