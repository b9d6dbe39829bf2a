//! Annotation prompt construction.
//!
//! Pure functions of their inputs — no store or network access — so prompt
//! shape is fully unit-testable and `preview` needs no provider.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::LabelInfo;

/// Individual texts longer than this are truncated with a marker.
pub const MAX_TEXT_CHARS: usize = 800;

/// Section name for labels without a category.
const UNCATEGORIZED: &str = "Generale";

/// System message sent when the configuration carries none.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an assistant for labeling short texts against a fixed taxonomy.";

/// Instruction preamble used when the template store is empty.
pub const DEFAULT_TEMPLATE_BODY: &str = "\
You are an expert annotator for educational texts and survey answers. \
Read each numbered text and assign it the single most appropriate label \
from the taxonomy below.";

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Collapse whitespace runs and truncate to [`MAX_TEXT_CHARS`] characters,
/// appending a truncation marker when anything was cut.
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_RUNS.replace_all(text.trim(), " ");
    let mut out: String = collapsed.chars().take(MAX_TEXT_CHARS).collect();
    if collapsed.chars().count() > MAX_TEXT_CHARS {
        out.push('…');
    }
    out
}

fn usage_hint(count: i64) -> String {
    if count == 0 {
        "(never used)".to_string()
    } else if count == 1 {
        "(used 1 time)".to_string()
    } else {
        format!("(used {count} times)")
    }
}

/// Render the taxonomy section: labels grouped by category, categories and
/// labels in alphabetical order for deterministic prompts.
fn taxonomy_section(labels: &[LabelInfo]) -> String {
    let mut by_category: BTreeMap<&str, Vec<&LabelInfo>> = BTreeMap::new();
    for label in labels {
        by_category
            .entry(label.category.as_deref().unwrap_or(UNCATEGORIZED))
            .or_default()
            .push(label);
    }

    let mut section = String::from("AVAILABLE LABELS (live from the system):\n");
    for (category, mut cat_labels) in by_category {
        cat_labels.sort_by(|a, b| a.name.cmp(&b.name));
        section.push_str(&format!("\n=== {category} ===\n"));
        for label in cat_labels {
            let desc = label
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .map(|d| format!(" - {d}"))
                .unwrap_or_default();
            section.push_str(&format!(
                "• {}{} {}\n",
                label.name,
                desc,
                usage_hint(label.usage_count)
            ));
        }
    }
    section
}

/// Build the full annotation prompt for one batch of texts.
///
/// `instructions` is the selected template body; the output contract and the
/// numbered texts are appended after the taxonomy.
pub fn build_annotation_prompt(texts: &[String], labels: &[LabelInfo], instructions: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(instructions.trim());
    prompt.push_str("\n\n");
    prompt.push_str(&taxonomy_section(labels));

    prompt.push_str(
        "\nINSTRUCTIONS:\n\
         1. Analyze each numbered text below.\n\
         2. Assign ONLY labels from the list above, with their EXACT names.\n\
         3. Assign at most one label per text unless the instructions above say otherwise.\n\
         4. If no label fits a text, use the empty label: \"\".\n\
         5. Respond with ONLY a JSON array in this exact structure, no surrounding prose:\n\
         [\n  \
         {\"index\": 0, \"label\": \"ExactNameFromTheList\", \"confidence\": 0.95},\n  \
         {\"index\": 1, \"label\": \"\", \"confidence\": 1.0}\n\
         ]\n\
         \nTEXTS TO LABEL:\n",
    );

    for (i, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("{i}: {}\n", clean_text(text)));
    }

    prompt.push_str("\nRespond with the JSON array only. Use ONLY label names from the list above.");
    prompt
}
