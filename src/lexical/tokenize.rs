//! Character 2-gram tokenisation for Japanese text.
//!
//! Text is NFKC-normalised (folding full-width ASCII and half-width kana)
//! and lowercased, then split into runs of letters and digits; whitespace
//! and punctuation are hard breaks, and no bigram crosses them. Each run
//! emits its character 2-grams; a single-character run emits itself, so a
//! one-kanji query still has a term to match.

use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Tokenise into 2-gram terms, in text order.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();

    let mut tokens = Vec::new();
    let mut run: Vec<char> = Vec::new();
    for ch in normalized.chars() {
        if ch.is_alphanumeric() {
            run.push(ch);
        } else {
            flush(&run, &mut tokens);
            run.clear();
        }
    }
    flush(&run, &mut tokens);
    tokens
}

fn flush(run: &[char], tokens: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => tokens.push(run[0].to_string()),
        _ => {
            for pair in run.windows(2) {
                tokens.push(pair.iter().collect());
            }
        }
    }
}

/// Term frequencies and total token count for one passage. The token count
/// is the BM25 document length.
pub fn term_frequencies(text: &str) -> (HashMap<String, u32>, u64) {
    let tokens = tokenize(text);
    let len = tokens.len() as u64;
    let mut tf: HashMap<String, u32> = HashMap::new();
    for token in tokens {
        *tf.entry(token).or_insert(0) += 1;
    }
    (tf, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigrams_within_a_run() {
        assert_eq!(tokenize("機械学習"), vec!["機械", "械学", "学習"]);
    }

    #[test]
    fn breaks_stop_bigrams() {
        // The ideographic full stop splits the runs.
        assert_eq!(
            tokenize("学習。統計"),
            vec!["学習", "統計"]
        );
    }

    #[test]
    fn whitespace_is_a_hard_break() {
        assert_eq!(tokenize("ab cd"), vec!["ab", "cd"]);
        assert_eq!(tokenize("abc de"), vec!["ab", "bc", "de"]);
    }

    #[test]
    fn single_char_run_emits_itself() {
        assert_eq!(tokenize("機"), vec!["機"]);
        assert_eq!(tokenize("a 機 b"), vec!["a", "機", "b"]);
    }

    #[test]
    fn empty_and_punctuation_only_yield_nothing() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("、。・！？ 　").is_empty());
    }

    #[test]
    fn nfkc_folds_width_variants() {
        // Full-width Latin folds to ASCII, half-width katakana to full.
        assert_eq!(tokenize("ＡＢＣ"), tokenize("abc"));
        assert_eq!(tokenize("ｶﾞｷﾞ"), tokenize("ガギ"));
    }

    #[test]
    fn lowercases_after_normalization() {
        assert_eq!(tokenize("Elixir"), tokenize("elixir"));
    }

    #[test]
    fn frequencies_count_repeats() {
        let (tf, len) = term_frequencies("ああああ");
        // Bigrams: ああ ×3.
        assert_eq!(len, 3);
        assert_eq!(tf.get("ああ"), Some(&3));
    }
}
