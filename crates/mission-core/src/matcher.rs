use regex::{Regex, RegexBuilder};
use regex_automata::dfa::{dense, Automaton, StartKind};
use regex_automata::util::{start, syntax};
use regex_automata::Anchored;
use serde::{Deserialize, Serialize};

use crate::error::PatternError;
use crate::event::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    Exact,
    Regex,
}

/// Completion matcher attached to a mission, in the authoring layer's wire
/// shape (`{"type": "regex", "target": "output", "match": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    #[serde(rename = "type")]
    pub kind: ListenerKind,
    pub target: EventKind,
    #[serde(rename = "match")]
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// The text satisfies the pattern; carries the matched text.
    Complete(String),
    /// No match yet, but the carried suffix of the text is a viable prefix
    /// of some match. Only produced by [`PartialMatcher`].
    Partial(String),
    NoMatch,
}

pub(crate) fn build_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).dot_matches_new_line(true).build()
}

/// A compiled listener pattern used by live session tracking.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Regex(Regex),
}

impl Matcher {
    pub fn compile(kind: ListenerKind, pattern: &str) -> Result<Self, regex::Error> {
        match kind {
            ListenerKind::Exact => Ok(Matcher::Exact(pattern.to_owned())),
            ListenerKind::Regex => build_regex(pattern).map(Matcher::Regex),
        }
    }

    pub fn is_match(&self, content: &str) -> bool {
        match self {
            Matcher::Exact(expected) => content.trim() == expected.as_str(),
            Matcher::Regex(regex) => regex.is_match(content),
        }
    }

    pub fn evaluate(&self, content: &str) -> MatchResult {
        match self {
            Matcher::Exact(expected) => {
                let trimmed = content.trim();
                if trimmed == expected.as_str() {
                    MatchResult::Complete(trimmed.to_owned())
                } else {
                    MatchResult::NoMatch
                }
            }
            Matcher::Regex(regex) => regex
                .find(content)
                .map(|found| MatchResult::Complete(found.as_str().to_owned()))
                .unwrap_or(MatchResult::NoMatch),
        }
    }
}

/// One-shot evaluation of a raw pattern against `content`.
pub fn evaluate(
    pattern: &str,
    kind: ListenerKind,
    content: &str,
) -> Result<MatchResult, regex::Error> {
    Ok(Matcher::compile(kind, pattern)?.evaluate(content))
}

/// Validation-mode matcher that also reports partial progress.
///
/// A regex partial match is the leftmost suffix of the candidate text that an
/// anchored DFA can consume without reaching a dead state, i.e. text that
/// could still grow into a full match if more input arrived.
pub struct PartialMatcher {
    inner: PartialInner,
}

enum PartialInner {
    Exact(String),
    Regex {
        regex: Regex,
        dfa: dense::DFA<Vec<u32>>,
    },
}

impl PartialMatcher {
    pub fn new(kind: ListenerKind, pattern: &str) -> Result<Self, PatternError> {
        let inner = match kind {
            ListenerKind::Exact => PartialInner::Exact(pattern.to_owned()),
            ListenerKind::Regex => {
                let regex = build_regex(pattern)?;
                let dfa = dense::Builder::new()
                    .configure(
                        dense::Config::new()
                            .start_kind(StartKind::Anchored)
                            .unicode_word_boundary(true),
                    )
                    .syntax(syntax::Config::new().dot_matches_new_line(true))
                    .build(pattern)?;
                PartialInner::Regex { regex, dfa }
            }
        };
        Ok(Self { inner })
    }

    pub fn evaluate(&self, text: &str) -> MatchResult {
        match &self.inner {
            PartialInner::Exact(expected) => {
                let trimmed = text.trim();
                let leading = text.trim_start();
                if trimmed == expected.as_str() {
                    MatchResult::Complete(trimmed.to_owned())
                } else if !trimmed.is_empty() && expected.starts_with(leading) {
                    MatchResult::Partial(leading.to_owned())
                } else {
                    MatchResult::NoMatch
                }
            }
            PartialInner::Regex { regex, dfa } => {
                if let Some(found) = regex.find(text) {
                    return MatchResult::Complete(found.as_str().to_owned());
                }
                match leftmost_viable_start(dfa, text) {
                    Some(at) => MatchResult::Partial(text[at..].to_owned()),
                    None => MatchResult::NoMatch,
                }
            }
        }
    }
}

fn leftmost_viable_start(dfa: &dense::DFA<Vec<u32>>, text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    text.char_indices().map(|(at, _)| at).find(|&at| {
        let look_behind = at.checked_sub(1).map(|prev| bytes[prev]);
        let config = start::Config::new()
            .anchored(Anchored::Yes)
            .look_behind(look_behind);
        let Ok(mut state) = dfa.start_state(&config) else {
            return false;
        };
        for &byte in &bytes[at..] {
            state = dfa.next_state(state, byte);
            if dfa.is_dead_state(state) || dfa.is_quit_state(state) {
                return false;
            }
        }
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_trims_content_but_not_pattern() {
        let matcher = Matcher::compile(ListenerKind::Exact, "DONE").unwrap();
        assert!(matcher.is_match("  DONE\n"));
        assert!(!matcher.is_match("DONE!"));
        assert!(!matcher.is_match("done"));

        let padded = Matcher::compile(ListenerKind::Exact, " DONE").unwrap();
        assert!(!padded.is_match(" DONE"));
    }

    #[test]
    fn regex_searches_anywhere_and_dot_spans_lines() {
        let matcher = Matcher::compile(ListenerKind::Regex, "start.*end").unwrap();
        assert!(matcher.is_match("noise start\nmiddle\nend noise"));
        assert_eq!(
            matcher.evaluate("xx start\nend yy"),
            MatchResult::Complete("start\nend".into())
        );
        assert_eq!(matcher.evaluate("end start"), MatchResult::NoMatch);
    }

    #[test]
    fn regex_anchors_apply_to_whole_content() {
        let matcher = Matcher::compile(ListenerKind::Regex, "^go$").unwrap();
        assert!(matcher.is_match("go"));
        assert!(!matcher.is_match("go home"));
    }

    #[test]
    fn evaluate_reports_compile_errors() {
        assert!(evaluate("(unclosed", ListenerKind::Regex, "x").is_err());
        assert_eq!(
            evaluate("(unclosed", ListenerKind::Exact, "(unclosed").unwrap(),
            MatchResult::Complete("(unclosed".into())
        );
    }

    #[test]
    fn partial_regex_reports_viable_suffix() {
        let matcher = PartialMatcher::new(ListenerKind::Regex, r"hello \d{3}").unwrap();
        assert_eq!(
            matcher.evaluate("say hello 12"),
            MatchResult::Partial("hello 12".into())
        );
        assert_eq!(
            matcher.evaluate("say hello 123!"),
            MatchResult::Complete("hello 123".into())
        );
        assert_eq!(matcher.evaluate("goodbye"), MatchResult::NoMatch);
    }

    #[test]
    fn partial_regex_respects_start_anchor() {
        let matcher = PartialMatcher::new(ListenerKind::Regex, "^go$").unwrap();
        assert_eq!(matcher.evaluate("g"), MatchResult::Partial("g".into()));
        assert_eq!(matcher.evaluate("xg"), MatchResult::NoMatch);
        assert_eq!(matcher.evaluate("gox"), MatchResult::NoMatch);
    }

    #[test]
    fn partial_regex_spans_newlines() {
        let matcher = PartialMatcher::new(ListenerKind::Regex, "total: .*ok").unwrap();
        assert_eq!(
            matcher.evaluate("total: 3\nstill running"),
            MatchResult::Partial("total: 3\nstill running".into())
        );
    }

    #[test]
    fn partial_exact_accepts_leading_prefix() {
        let matcher = PartialMatcher::new(ListenerKind::Exact, "make test").unwrap();
        assert_eq!(
            matcher.evaluate("  make t"),
            MatchResult::Partial("make t".into())
        );
        assert_eq!(
            matcher.evaluate("make test\n"),
            MatchResult::Complete("make test".into())
        );
        assert_eq!(matcher.evaluate("make x"), MatchResult::NoMatch);
        assert_eq!(matcher.evaluate("   "), MatchResult::NoMatch);
    }
}
