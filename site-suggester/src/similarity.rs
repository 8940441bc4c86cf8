//! Lexical similarity between two text blobs.
//!
//! Texts are normalized (lowercased, punctuation dropped), split into words,
//! and every word of at least three characters contributes its overlapping
//! character trigrams. The score is the Jaccard index of the two trigram sets.
//! Trigrams let inflected forms of a word ("navigation", "navigational",
//! "навигация", "навигации") match without a language-specific stemmer.

use std::collections::HashSet;

const GRAM: usize = 3;

/// Lowercase and drop everything that is neither alphanumeric nor whitespace.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// The set of character trigrams of all words with length >= 3.
pub fn trigrams(text: &str) -> HashSet<String> {
    let normalized = normalize(text);
    let mut grams = HashSet::new();

    for word in normalized.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() < GRAM {
            continue;
        }
        for window in chars.windows(GRAM) {
            grams.insert(window.iter().collect::<String>());
        }
    }

    grams
}

/// Jaccard index of the trigram sets of `a` and `b`, in [0, 1].
///
/// Returns 0.0 when either side has no trigrams.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a_grams = trigrams(a);
    let b_grams = trigrams(b);
    jaccard(&a_grams, &b_grams)
}

pub(crate) fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
