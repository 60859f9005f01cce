//! Snippet extraction.
//!
//! Each returned passage carries a fixed-width character window centred on
//! the best query-term match, or the text prefix when nothing matches.
//! Matching is positional over a per-character lowercased copy so window
//! offsets stay valid in the original text.

/// Build a snippet of at most `width` characters around the best match of
/// any `query_term` in `text`. Terms are matched case-insensitively;
/// longer terms are preferred, then earlier occurrences.
pub fn make_snippet(text: &str, query_terms: &[String], width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= width {
        return text.to_string();
    }

    let haystack: Vec<char> = chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();

    let mut best: Option<(usize, usize)> = None; // (term_len, position)
    for term in query_terms {
        let needle: Vec<char> = term
            .chars()
            .map(|c| c.to_lowercase().next().unwrap_or(c))
            .collect();
        if needle.is_empty() || needle.len() > haystack.len() {
            continue;
        }
        if let Some(pos) = find_chars(&haystack, &needle) {
            let candidate = (needle.len(), pos);
            best = match best {
                // Longer term wins; equal lengths keep the earliest hit.
                Some((len, at)) if len > candidate.0 || (len == candidate.0 && at <= pos) => {
                    Some((len, at))
                }
                _ => Some(candidate),
            };
        }
    }

    let window_start = match best {
        Some((term_len, pos)) => {
            let centre = pos + term_len / 2;
            centre
                .saturating_sub(width / 2)
                .min(chars.len() - width)
        }
        None => 0,
    };

    chars[window_start..window_start + width].iter().collect()
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn short_text_is_returned_whole() {
        let text = "機械学習の短い説明。";
        assert_eq!(make_snippet(text, &terms(&["機械"]), 160), text);
    }

    #[test]
    fn window_centres_on_the_match() {
        let mut text: String = "前".repeat(200);
        text.push_str("機械学習");
        text.push_str(&"後".repeat(200));

        let snippet = make_snippet(&text, &terms(&["機械"]), 40);
        assert_eq!(snippet.chars().count(), 40);
        assert!(snippet.contains("機械学習"));
    }

    #[test]
    fn no_match_falls_back_to_prefix() {
        let text = "あ".repeat(300);
        let snippet = make_snippet(&text, &terms(&["無関係"]), 50);
        assert_eq!(snippet, "あ".repeat(50));
    }

    #[test]
    fn match_near_the_end_clamps_the_window() {
        let mut text: String = "前".repeat(300);
        text.push_str("終端語");
        let snippet = make_snippet(&text, &terms(&["終端"]), 60);
        assert_eq!(snippet.chars().count(), 60);
        assert!(snippet.ends_with("終端語"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mut text: String = "x".repeat(200);
        text.push_str("Elixir");
        text.push_str(&"y".repeat(200));
        let snippet = make_snippet(&text, &terms(&["el"]), 30);
        assert!(snippet.to_lowercase().contains("el"));
    }
}
