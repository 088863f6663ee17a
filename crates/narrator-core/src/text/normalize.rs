//! Text normalization before synthesis.

use crate::settings::ReplaceRule;

/// Applies literal replace rules in configuration order, then collapses
/// whitespace.
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    rules: Vec<ReplaceRule>,
}

impl TextNormalizer {
    /// Build from replace rules. Rules with an empty source are skipped.
    pub fn new(rules: impl IntoIterator<Item = ReplaceRule>) -> Self {
        Self {
            rules: rules.into_iter().filter(|r| !r.from.is_empty()).collect(),
        }
    }

    pub fn rules(&self) -> &[ReplaceRule] {
        &self.rules
    }

    /// Normalize `text` for the speech engine.
    ///
    /// Each rule sees the output of the previous one.
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let replaced = self
            .rules
            .iter()
            .fold(text.to_string(), |acc, rule| acc.replace(&rule.from, &rule.to));
        collapse_whitespace(&replaced)
    }
}

/// Collapse runs of whitespace into a single space and trim both ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_space {
                result.push(' ');
                prev_space = true;
            }
        } else {
            result.push(c);
            prev_space = false;
        }
    }

    result.trim().to_string()
}
