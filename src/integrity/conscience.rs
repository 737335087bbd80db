//! Layered conscience-value resolution (spec §4.3).

use crate::agent::AlignmentCard;

/// How an organisation's conscience-value configuration relates to the
/// built-in default list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgMode {
    /// Start from the built-in defaults, then append org values.
    Augment,
    /// Start empty; only org-defined values apply.
    Replace,
    /// No org configuration exists at all — behaves like `Augment` with an
    /// empty org list.
    Unconfigured,
}

fn builtin_defaults() -> Vec<String> {
    vec![
        "honesty".to_string(),
        "helpfulness".to_string(),
        "harmlessness".to_string(),
        "accuracy".to_string(),
        "respect_for_autonomy".to_string(),
    ]
}

/// Resolve the final, ordered conscience-value list passed to the analysis
/// model: base layer (built-in or empty, depending on `org_mode`), then the
/// org layer, then the agent layer from the alignment card.
pub fn resolve_conscience_values(
    org_mode: OrgMode,
    org_values: &[String],
    card: &AlignmentCard,
) -> Vec<String> {
    let mut values = match org_mode {
        OrgMode::Augment | OrgMode::Unconfigured => builtin_defaults(),
        OrgMode::Replace => Vec::new(),
    };

    for v in org_values {
        if !values.contains(v) {
            values.push(v.clone());
        }
    }

    for dv in &card.declared_values {
        if !values.contains(&dv.name) {
            values.push(dv.name.clone());
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::DeclaredValue;

    fn card_with_values(names: &[&str]) -> AlignmentCard {
        let mut card = AlignmentCard::default_for_agent("smolt-1");
        card.declared_values = names
            .iter()
            .map(|n| DeclaredValue {
                name: n.to_string(),
                priority: None,
                description: None,
            })
            .collect();
        card
    }

    #[test]
    fn augment_mode_starts_from_builtin_defaults() {
        let card = card_with_values(&[]);
        let values = resolve_conscience_values(OrgMode::Augment, &[], &card);
        assert!(values.contains(&"honesty".to_string()));
    }

    #[test]
    fn replace_mode_starts_empty_then_appends_org_and_agent_layers() {
        let card = card_with_values(&["curiosity"]);
        let values = resolve_conscience_values(
            OrgMode::Replace,
            &["org_specific_value".to_string()],
            &card,
        );
        assert_eq!(values, vec!["org_specific_value".to_string(), "curiosity".to_string()]);
    }

    #[test]
    fn duplicate_values_across_layers_are_not_repeated() {
        let card = card_with_values(&["honesty"]);
        let values = resolve_conscience_values(OrgMode::Augment, &["honesty".to_string()], &card);
        assert_eq!(values.iter().filter(|v| v.as_str() == "honesty").count(), 1);
    }
}
