//! Content-page filter.
//!
//! Rejects pages that carry no retrievable content: near-empty scan
//! artefacts, decorative pages, tables of contents, and figure/table
//! directories. The filter is a pure predicate over page text producing a
//! tagged verdict, so the driver can log why a page was dropped.

use crate::config::{
    FIGURE_DIRECTORY_LINES, MAX_FOREIGN_RATIO, MIN_PAGE_CHARS, TOC_LEADER_LINES,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Lines ending in a dotted leader followed by a page number, e.g.
/// `第1章 はじめに ......... 12`.
static DOTTED_LEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.{3,}\s*\d+\s*$").expect("dotted leader pattern"));

/// Line-initial figure/table labels, e.g. `図3` / `表12`.
static FIGURE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(図|表)\d+").expect("figure label pattern"));

/// Why a page was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Fewer than 50 non-whitespace characters.
    TooShort,
    /// More than 70% of characters are neither Japanese script nor ASCII
    /// letters.
    ForeignRatio,
    /// At least 5 dotted-leader lines: a table of contents.
    TableOfContents,
    /// At least 3 line-initial `図N`/`表N` lines: a figure or table
    /// directory.
    FigureDirectory,
}

/// Tagged filter verdict for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageVerdict {
    pub kept: bool,
    pub reason: Option<DropReason>,
}

impl PageVerdict {
    fn keep() -> Self {
        Self {
            kept: true,
            reason: None,
        }
    }

    fn drop(reason: DropReason) -> Self {
        Self {
            kept: false,
            reason: Some(reason),
        }
    }
}

/// Classify a character as retrieval-relevant: Japanese script (hiragana,
/// katakana, CJK ideographs), or an ASCII letter.
fn is_content_char(ch: char) -> bool {
    matches!(ch,
        '\u{3040}'..='\u{309f}'   // hiragana
        | '\u{30a0}'..='\u{30ff}' // katakana
        | '\u{4e00}'..='\u{9fff}' // CJK unified ideographs
    ) || ch.is_ascii_alphabetic()
}

/// Decide whether a page carries indexable content.
pub fn assess_page(text: &str) -> PageVerdict {
    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.len() < MIN_PAGE_CHARS {
        return PageVerdict::drop(DropReason::TooShort);
    }

    let foreign = visible.iter().filter(|c| !is_content_char(**c)).count();
    if foreign as f32 / visible.len() as f32 > MAX_FOREIGN_RATIO {
        return PageVerdict::drop(DropReason::ForeignRatio);
    }

    let mut leader_lines = 0usize;
    let mut figure_lines = 0usize;
    for line in text.lines() {
        let line = line.trim();
        if DOTTED_LEADER.is_match(line) {
            leader_lines += 1;
        }
        if FIGURE_LABEL.is_match(line) {
            figure_lines += 1;
        }
    }
    if leader_lines >= TOC_LEADER_LINES {
        return PageVerdict::drop(DropReason::TableOfContents);
    }
    if figure_lines >= FIGURE_DIRECTORY_LINES {
        return PageVerdict::drop(DropReason::FigureDirectory);
    }

    PageVerdict::keep()
}
