use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Word runs or single punctuation characters
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").expect("static token pattern"));

static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static alnum pattern"));

/// Case-folded word and punctuation tokens
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Fraction of hypothesis tokens that occur anywhere in the reference.
///
/// A unigram-precision proxy; 0.0 for an empty hypothesis.
pub fn lexical_overlap(reference: &str, hypothesis: &str) -> f64 {
    let hyp = tokenize(hypothesis);
    if hyp.is_empty() {
        return 0.0;
    }

    let reference: HashSet<String> = tokenize(reference).into_iter().collect();
    let overlap = hyp.iter().filter(|t| reference.contains(*t)).count();
    overlap as f64 / hyp.len() as f64
}

/// Lowercased alphanumeric tokens, stemmed when longer than three characters
pub fn stemmed_tokens(text: &str) -> Vec<String> {
    let stemmer = Stemmer::create(Algorithm::English);
    let lowered = text.to_lowercase();

    NON_ALNUM_RE
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(|token| {
            if token.chars().count() > 3 {
                stemmer.stem(token).into_owned()
            } else {
                token.to_string()
            }
        })
        .collect()
}

/// Length of the longest common subsequence
pub fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// ROUGE-L style F-measure over stemmed tokens
pub fn lcs_fmeasure(reference: &str, hypothesis: &str) -> f64 {
    let reference = stemmed_tokens(reference);
    let hypothesis = stemmed_tokens(hypothesis);
    if reference.is_empty() || hypothesis.is_empty() {
        return 0.0;
    }

    let lcs = lcs_length(&reference, &hypothesis) as f64;
    let precision = lcs / hypothesis.len() as f64;
    let recall = lcs / reference.len() as f64;

    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}
