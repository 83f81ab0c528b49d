//! Token-based template matching for type names and entity names.
//!
//! A template is a whitespace-separated list of tokens:
//! - plain tokens must appear as a whole (case-folded) word of the target
//! - `~PART~tok` matches `tok` anywhere inside the target
//! - `-NO-tok` rejects targets containing `tok` (combinable with `~PART~`)
//! - a template starting with `-RE-` is a regex that must match the whole target
//!
//! A target fully matches when every positive token is present and no negative
//! token is. It partially matches when at least one, but not every, positive
//! token is present and no negative token is.

use regex::Regex;

use crate::error::{EdbError, Result};

const NEG_PREFIX: &str = "-NO-";
const PART_PREFIX: &str = "~PART~";
const RE_PREFIX: &str = "-RE-";

/// How well a target satisfies a template set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    None,
    Partial,
    Full,
}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    partial: bool,
}

impl Token {
    fn parse(raw: &str, partial_default: bool) -> Self {
        match raw.strip_prefix(PART_PREFIX) {
            Some(rest) => Self {
                text: rest.to_lowercase(),
                partial: true,
            },
            None => Self {
                text: raw.to_lowercase(),
                partial: partial_default,
            },
        }
    }

    fn found_in(&self, lowered: &str, words: &[&str]) -> bool {
        if self.partial {
            lowered.contains(&self.text)
        } else {
            words.iter().any(|w| *w == self.text)
        }
    }
}

#[derive(Debug, Clone)]
enum Template {
    Tokens {
        positive: Vec<Token>,
        negative: Vec<Token>,
    },
    Regex(Regex),
}

impl Template {
    fn compile(template: &str, partial_tokens: bool) -> Result<Self> {
        let trimmed = template.trim();
        if let Some(pattern) = trimmed.strip_prefix(RE_PREFIX) {
            let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| EdbError::BadTemplate {
                template: template.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Self::Regex(re));
        }

        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for raw in trimmed.split_whitespace() {
            match raw.strip_prefix(NEG_PREFIX) {
                Some(rest) if !rest.is_empty() => negative.push(Token::parse(rest, partial_tokens)),
                Some(_) => {
                    return Err(EdbError::BadTemplate {
                        template: template.to_string(),
                        reason: "empty -NO- token".into(),
                    })
                }
                None => positive.push(Token::parse(raw, partial_tokens)),
            }
        }
        Ok(Self::Tokens { positive, negative })
    }

    fn classify(&self, target: &str) -> MatchKind {
        match self {
            Self::Regex(re) => {
                if re.is_match(target) {
                    MatchKind::Full
                } else {
                    MatchKind::None
                }
            }
            Self::Tokens { positive, negative } => {
                let lowered = target.to_lowercase();
                let words: Vec<&str> = lowered.split_whitespace().collect();
                if negative.iter().any(|t| t.found_in(&lowered, &words)) {
                    return MatchKind::None;
                }
                let hits = positive
                    .iter()
                    .filter(|t| t.found_in(&lowered, &words))
                    .count();
                if hits == positive.len() {
                    MatchKind::Full
                } else if hits > 0 {
                    MatchKind::Partial
                } else {
                    MatchKind::None
                }
            }
        }
    }
}

/// A compiled set of match templates.
///
/// An empty set matches everything fully.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    templates: Vec<Template>,
}

/// Items split by match quality.
#[derive(Debug, Clone, PartialEq)]
pub struct Matches<T> {
    pub full: Vec<T>,
    pub partial: Vec<T>,
}

impl<T> Default for Matches<T> {
    fn default() -> Self {
        Self {
            full: Vec::new(),
            partial: Vec::new(),
        }
    }
}

impl Matcher {
    pub fn new<S: AsRef<str>>(templates: &[S], partial_tokens: bool) -> Result<Self> {
        let templates = templates
            .iter()
            .map(|t| Template::compile(t.as_ref(), partial_tokens))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { templates })
    }

    /// Matcher accepting everything.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Best match kind of `target` over all templates.
    pub fn classify(&self, target: &str) -> MatchKind {
        if self.templates.is_empty() {
            return MatchKind::Full;
        }
        self.templates
            .iter()
            .map(|t| t.classify(target))
            .max()
            .unwrap_or(MatchKind::None)
    }

    pub fn is_full_match(&self, target: &str) -> bool {
        self.classify(target) == MatchKind::Full
    }

    /// Split `items` into full and partial matches of the text `key` yields.
    pub fn split<T, F>(&self, items: impl IntoIterator<Item = T>, key: F) -> Matches<T>
    where
        F: Fn(&T) -> &str,
    {
        let mut out = Matches::default();
        for item in items {
            match self.classify(key(&item)) {
                MatchKind::Full => out.full.push(item),
                MatchKind::Partial => out.partial.push(item),
                MatchKind::None => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(templates: &[&str]) -> Matcher {
        Matcher::new(templates, false).unwrap()
    }

    #[test]
    fn negative_token_excludes() {
        let matcher = m(&["open equity -NO-bonus"]);
        assert!(matcher.is_full_match("Open Equity Direct"));
        assert_eq!(matcher.classify("Open Equity Bonus Plan"), MatchKind::None);
    }

    #[test]
    fn regex_template_is_full_match() {
        let matcher = m(&["-RE-(?i).*regular plan.*"]);
        assert!(matcher.is_full_match("Any Regular Plan"));
        assert!(!matcher.is_full_match("Direct Plan"));
    }

    #[test]
    fn whole_word_versus_partial() {
        let matcher = m(&["equity"]);
        assert_eq!(matcher.classify("Open Equities"), MatchKind::None);

        let matcher = m(&["~PART~equit"]);
        assert!(matcher.is_full_match("Open Equities"));

        let matcher = Matcher::new(&["equit"], true).unwrap();
        assert!(matcher.is_full_match("Open Equities"));
    }

    #[test]
    fn partial_when_some_tokens_hit() {
        let matcher = m(&["open equity growth"]);
        assert_eq!(matcher.classify("Open Equity Direct"), MatchKind::Partial);
        assert_eq!(matcher.classify("Closed Debt"), MatchKind::None);
    }

    #[test]
    fn best_template_wins() {
        let matcher = m(&["debt", "open equity"]);
        assert_eq!(matcher.classify("Open Equity"), MatchKind::Full);
        assert_eq!(matcher.classify("Open Bonds"), MatchKind::Partial);
    }

    #[test]
    fn empty_set_matches_everything() {
        assert!(Matcher::any().is_full_match("whatever"));
    }

    #[test]
    fn split_sorts_items() {
        let matcher = m(&["open equity"]);
        let out = matcher.split(["Open Equity A", "Open Debt", "Closed Fund"], |s| *s);
        assert_eq!(out.full, vec!["Open Equity A"]);
        assert_eq!(out.partial, vec!["Open Debt"]);
    }

    #[test]
    fn bad_regex_is_reported() {
        assert!(matches!(
            Matcher::new(&["-RE-(unclosed"], false),
            Err(EdbError::BadTemplate { .. })
        ));
    }
}
