//! Matching parsed label names against the live taxonomy.
//!
//! Models routinely shift the case of a label, shorten it, or hand back an
//! array where a string was asked for. Resolution is therefore lenient:
//! case-insensitive exact match first, then substring containment in either
//! direction. Empty labels mean "no label for this item" and are skipped
//! without being an error; unresolvable non-empty labels are skipped too.

use std::collections::HashMap;

use serde_json::Value;

use crate::types::LabelInfo;

pub struct LabelResolver<'a> {
    labels: &'a [LabelInfo],
    by_name: HashMap<String, &'a LabelInfo>,
}

impl<'a> LabelResolver<'a> {
    /// Build the name map from the active taxonomy.
    pub fn new(labels: &'a [LabelInfo]) -> Self {
        let by_name = labels
            .iter()
            .map(|label| (label.name.to_lowercase(), label))
            .collect();
        Self { labels, by_name }
    }

    /// Normalize the parser's `label` field to a trimmed name.
    ///
    /// Accepts a string or, defensively, a single-element array of strings.
    /// Returns `None` for empty/whitespace names ("no label") and for shapes
    /// that cannot carry a name at all.
    pub fn normalize(value: &Value) -> Option<String> {
        let raw = match value {
            Value::String(s) => s.as_str(),
            Value::Array(items) => items.first()?.as_str()?,
            _ => return None,
        };
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Resolve a parsed label value against the taxonomy.
    pub fn resolve(&self, value: &Value) -> Option<&'a LabelInfo> {
        let name = Self::normalize(value)?;
        let needle = name.to_lowercase();

        if let Some(label) = self.by_name.get(&needle) {
            return Some(label);
        }

        // Fuzzy fallback: containment in either direction.
        let found = self
            .labels
            .iter()
            .find(|label| {
                let candidate = label.name.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            });

        if found.is_none() {
            tracing::debug!(label = %name, "label not in taxonomy, skipping");
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn taxonomy() -> Vec<LabelInfo> {
        ["Efficienza", "Collaborazione", "Qualità"]
            .iter()
            .enumerate()
            .map(|(i, name)| LabelInfo {
                id: i as i64 + 1,
                name: name.to_string(),
                description: None,
                category: Some("Temi".to_string()),
                usage_count: 0,
            })
            .collect()
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let labels = taxonomy();
        let resolver = LabelResolver::new(&labels);
        let found = resolver.resolve(&json!("EFFICIENZA")).unwrap();
        assert_eq!(found.name, "Efficienza");
    }

    #[test]
    fn substring_match_in_either_direction() {
        let labels = taxonomy();
        let resolver = LabelResolver::new(&labels);

        // Parsed name contained in a taxonomy name.
        assert_eq!(resolver.resolve(&json!("eff")).unwrap().name, "Efficienza");
        // Taxonomy name contained in the parsed name.
        assert_eq!(
            resolver
                .resolve(&json!("qualità del lavoro"))
                .unwrap()
                .name,
            "Qualità"
        );
    }

    #[test]
    fn empty_label_is_a_silent_skip() {
        let labels = taxonomy();
        let resolver = LabelResolver::new(&labels);
        assert!(resolver.resolve(&json!("")).is_none());
        assert!(resolver.resolve(&json!("   ")).is_none());
    }

    #[test]
    fn unknown_label_is_skipped_not_fatal() {
        let labels = taxonomy();
        let resolver = LabelResolver::new(&labels);
        assert!(resolver.resolve(&json!("Zanzara")).is_none());
    }

    #[test]
    fn single_element_array_is_accepted() {
        let labels = taxonomy();
        let resolver = LabelResolver::new(&labels);
        let found = resolver
            .resolve(&json!(["Collaborazione", "ignored"]))
            .unwrap();
        assert_eq!(found.name, "Collaborazione");
    }

    #[test]
    fn non_string_shapes_are_skipped() {
        let labels = taxonomy();
        let resolver = LabelResolver::new(&labels);
        assert!(resolver.resolve(&json!(42)).is_none());
        assert!(resolver.resolve(&json!([])).is_none());
        assert!(resolver.resolve(&json!({"name": "Efficienza"})).is_none());
    }
}
