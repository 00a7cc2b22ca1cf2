//! Requirement number grammar
//!
//! Handbook requirement numbers come in several notations that coexist,
//! sometimes within one checklist:
//!
//! - standard: `"1"`, `"4b"`, `"7b8"`
//! - parenthetical: `"6(a)"`, `"6A(a)(1)"`
//! - anything else, parsed on a best-effort basis
//!
//! Every notation reduces to a canonical `(group, sub_parts)` pair. Parsing is
//! total: unrecognized input degrades to the fallback branch instead of failing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

lazy_static! {
    static ref STANDARD: Regex = Regex::new(r"^(\d+)([a-zA-Z])?(\d+)?$").unwrap();
    static ref PARENTHETICAL: Regex =
        Regex::new(r"^(\d+)([A-Z])?((?:\([^()]+\))+)$").unwrap();
    static ref PAREN_GROUP: Regex = Regex::new(r"\(([^()]+)\)").unwrap();
}

/// Which grammar rule produced a canonical form
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GrammarBranch {
    Standard,
    Parenthetical,
    /// Best-effort parse of a number no grammar rule recognized
    Fallback,
}

impl fmt::Display for GrammarBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarBranch::Standard => write!(f, "standard"),
            GrammarBranch::Parenthetical => write!(f, "parenthetical"),
            GrammarBranch::Fallback => write!(f, "fallback"),
        }
    }
}

/// Canonical identity of a raw requirement number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RequirementNumber {
    raw: String,
    group: u32,
    sub_parts: Vec<String>,
    branch: GrammarBranch,
}

impl RequirementNumber {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Top-level requirement group, e.g. `7` for `"7b8"`
    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn sub_parts(&self) -> &[String] {
        &self.sub_parts
    }

    pub fn branch(&self) -> GrammarBranch {
        self.branch
    }

    pub fn depth(&self) -> u32 {
        1 + self.sub_parts.len() as u32
    }

    pub fn is_parent(&self) -> bool {
        self.sub_parts.is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        self.branch == GrammarBranch::Fallback
    }

    pub fn joined_sub_parts(&self) -> String {
        self.sub_parts.concat()
    }

    /// Key used for ordering: group, then the case-folded joined sub-parts
    pub fn sort_key(&self) -> (u32, String) {
        (self.group, self.joined_sub_parts().to_lowercase())
    }
}

impl fmt::Display for RequirementNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Parses a raw requirement number. Never fails.
pub fn parse(raw: &str) -> RequirementNumber {
    let trimmed = raw.trim();

    if let Some(number) = parse_standard(trimmed) {
        return number;
    }
    if let Some(number) = parse_parenthetical(trimmed) {
        return number;
    }

    let number = parse_fallback(trimmed);
    log::debug!(
        "requirement number {:?} matched no grammar rule, using best-effort parse (group {}, {} sub-parts)",
        raw,
        number.group,
        number.sub_parts.len()
    );
    number
}

/// Orders two numbers by group, then case-insensitively by joined sub-parts
pub fn compare(a: &RequirementNumber, b: &RequirementNumber) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

fn parse_standard(s: &str) -> Option<RequirementNumber> {
    let caps = STANDARD.captures(s)?;
    let group = caps[1].parse().ok()?;

    let mut sub_parts = Vec::new();
    if let Some(letter) = caps.get(2) {
        sub_parts.push(letter.as_str().to_lowercase());
    }
    if let Some(digits) = caps.get(3) {
        sub_parts.push(digits.as_str().to_string());
    }

    Some(RequirementNumber {
        raw: s.to_string(),
        group,
        sub_parts,
        branch: GrammarBranch::Standard,
    })
}

fn parse_parenthetical(s: &str) -> Option<RequirementNumber> {
    let caps = PARENTHETICAL.captures(s)?;
    let group = caps[1].parse().ok()?;

    // Case is preserved here: "6A" and "6a" label different alternatives
    let mut sub_parts = Vec::new();
    if let Some(letter) = caps.get(2) {
        sub_parts.push(letter.as_str().to_string());
    }
    if let Some(groups) = caps.get(3) {
        sub_parts.extend(
            PAREN_GROUP
                .captures_iter(groups.as_str())
                .map(|c| c[1].to_string()),
        );
    }

    Some(RequirementNumber {
        raw: s.to_string(),
        group,
        sub_parts,
        branch: GrammarBranch::Parenthetical,
    })
}

fn parse_fallback(s: &str) -> RequirementNumber {
    let digit_len = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (digits, rest) = s.split_at(digit_len);

    RequirementNumber {
        raw: s.to_string(),
        group: digits.parse().unwrap_or(0),
        sub_parts: rest
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_string())
            .collect(),
        branch: GrammarBranch::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_notation() {
        let n = parse("7b8");
        assert_eq!(n.group(), 7);
        assert_eq!(n.sub_parts(), &["b".to_string(), "8".to_string()]);
        assert_eq!(n.depth(), 3);
        assert_eq!(n.branch(), GrammarBranch::Standard);
        assert!(!n.is_parent());

        let top = parse("12");
        assert_eq!(top.group(), 12);
        assert!(top.is_parent());
        assert_eq!(top.depth(), 1);
    }

    #[test]
    fn test_standard_lowercases_letter() {
        let upper = parse("1A");
        let lower = parse("1a");
        assert_eq!(upper.sub_parts(), lower.sub_parts());
        assert_eq!(compare(&upper, &lower), Ordering::Equal);
    }

    #[test]
    fn test_standard_digit_suffix_without_letter() {
        // "10" is a plain group, not group 1 with sub-part "0"
        let n = parse("10");
        assert_eq!(n.group(), 10);
        assert!(n.is_parent());
    }

    #[test]
    fn test_parenthetical_notation() {
        let n = parse("6A(a)(1)");
        assert_eq!(n.group(), 6);
        assert_eq!(
            n.sub_parts(),
            &["A".to_string(), "a".to_string(), "1".to_string()]
        );
        assert_eq!(n.depth(), 4);
        assert_eq!(n.branch(), GrammarBranch::Parenthetical);

        let no_letter = parse("3(b)");
        assert_eq!(no_letter.group(), 3);
        assert_eq!(no_letter.sub_parts(), &["b".to_string()]);
    }

    #[test]
    fn test_parenthetical_preserves_case() {
        assert_eq!(parse("6A(a)").sub_parts()[0], "A");
        assert_ne!(parse("6A(a)").sub_parts(), parse("6A(A)").sub_parts());
    }

    #[test]
    fn test_fallback_is_total() {
        let n = parse("5.c");
        assert_eq!(n.group(), 5);
        assert_eq!(n.sub_parts(), &[".".to_string(), "c".to_string()]);
        assert!(n.is_fallback());

        let no_digits = parse("abc");
        assert_eq!(no_digits.group(), 0);
        assert_eq!(no_digits.sub_parts().len(), 3);
        assert!(no_digits.is_fallback());

        let empty = parse("");
        assert_eq!(empty.group(), 0);
        assert!(empty.is_parent());
        assert!(empty.is_fallback());
    }

    #[test]
    fn test_input_is_trimmed() {
        let n = parse("  4b ");
        assert_eq!(n.raw(), "4b");
        assert_eq!(n.branch(), GrammarBranch::Standard);
    }

    #[test]
    fn test_parse_is_deterministic() {
        for raw in ["1", "7b8", "6A(a)(1)", "weird-3"] {
            assert_eq!(parse(raw), parse(raw));
        }
    }

    #[test]
    fn test_is_parent_iff_digits_only_for_standard_notation() {
        let cases = ["1", "2a", "10", "10c", "3b4", "99", "7Z12"];
        for raw in cases {
            let digits_only = raw.chars().all(|c| c.is_ascii_digit());
            assert_eq!(parse(raw).is_parent(), digits_only, "{}", raw);
        }
    }

    #[test]
    fn test_ordering() {
        let mut numbers: Vec<RequirementNumber> =
            ["2", "1b", "10", "1", "1A", "1c"].iter().map(|s| parse(s)).collect();
        numbers.sort_by(compare);
        let raws: Vec<&str> = numbers.iter().map(|n| n.raw()).collect();
        assert_eq!(raws, vec!["1", "1A", "1b", "1c", "2", "10"]);
    }
}
