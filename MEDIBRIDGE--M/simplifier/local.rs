use std::{ptr, sync::Arc};

use crate::{
    dictionary::{DictionaryEntry, TermDictionary},
    types::{ExplanationEntry, SimplificationResult},
};

/// Heading that introduces the explanation block.
pub const EXPLANATION_HEADING: &str = "What this means:";
/// Marker prefixed to every explanation line.
pub const BULLET: &str = "• ";

/// Text rewritten by the local path together with the explanations it appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRewrite {
    /// Rewritten text including the explanation block, if any.
    pub text: String,
    /// Explanations in first-match order.
    pub explanations: Vec<ExplanationEntry>,
}

/// Deterministic dictionary-driven simplifier. Total over every input string.
#[derive(Debug, Clone)]
pub struct LocalSimplifier {
    dictionary: Arc<TermDictionary>,
}

impl LocalSimplifier {
    /// Creates a simplifier over the given dictionary.
    #[must_use]
    pub fn new(dictionary: Arc<TermDictionary>) -> Self {
        Self { dictionary }
    }

    /// Dictionary in use.
    #[must_use]
    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }

    /// Rewrites `text` and wraps it as a local, medium-confidence result.
    #[must_use]
    pub fn simplify(&self, text: &str) -> SimplificationResult {
        let rewrite = self.rewrite(text);
        let matched = rewrite
            .explanations
            .iter()
            .map(|explanation| explanation.term.clone())
            .collect();
        SimplificationResult::local(rewrite.text, matched)
    }

    /// Substitutes every dictionary term and appends the explanation block.
    ///
    /// Text without dictionary terms is returned unchanged.
    #[must_use]
    pub fn rewrite(&self, text: &str) -> LocalRewrite {
        let (mut output, substituted) = self.substitute(text);
        if substituted.is_empty() {
            return LocalRewrite {
                text: text.to_string(),
                explanations: Vec::new(),
            };
        }
        // Terms shadowed by an overlapping match never appear, so they are not explained.
        let explanations: Vec<ExplanationEntry> = self
            .dictionary
            .lookup_all(text)
            .into_iter()
            .filter(|found| substituted.iter().any(|entry| ptr::eq(*entry, found.entry)))
            .map(|found| ExplanationEntry::from(found.entry))
            .collect();
        output.push_str(&render_explanations(&explanations));
        LocalRewrite {
            text: output,
            explanations,
        }
    }

    fn substitute<'d>(&'d self, text: &str) -> (String, Vec<&'d DictionaryEntry>) {
        let mut output = String::with_capacity(text.len() * 2);
        let mut substituted: Vec<&DictionaryEntry> = Vec::new();
        let mut cursor = 0;
        for (range, entry) in self.dictionary.occurrences(text) {
            // overlapping occurrence of a different term; the earlier one already won
            if range.start < cursor {
                continue;
            }
            output.push_str(&text[cursor..range.start]);
            output.push_str(&entry.plain_synonym);
            output.push_str(" (");
            output.push_str(&entry.term);
            output.push(')');
            cursor = range.end;
            if !substituted.iter().any(|seen| ptr::eq(*seen, entry)) {
                substituted.push(entry);
            }
        }
        output.push_str(&text[cursor..]);
        (output, substituted)
    }
}

impl Default for LocalSimplifier {
    fn default() -> Self {
        Self::new(TermDictionary::builtin())
    }
}

fn render_explanations(explanations: &[ExplanationEntry]) -> String {
    let mut block = format!("\n\n{EXPLANATION_HEADING}\n");
    for line in explanations
        .iter()
        .flat_map(|explanation| explanation.explanation_lines.iter())
    {
        block.push_str(BULLET);
        block.push_str(line);
        block.push('\n');
    }
    block
}
