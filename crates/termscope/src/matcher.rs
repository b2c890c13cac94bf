//! Matcher primitives
//!
//! A [`Matcher`] is a predicate over one [`Observation`]: either the text
//! read so far by an expectation, or one of the two terminal conditions an
//! expectation can run into (the stream ending, or its deadline passing).
//! Matchers are plain values and live for a single matching call.

use std::fmt;

use regex::Regex;

use crate::error::Error;

/// What a matcher is asked to judge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation<'a> {
    /// Text accumulated so far, ANSI escapes already stripped
    Text(&'a str),

    /// Like `Text`, but grown by exactly one character since an earlier
    /// observation that no matcher hit. A new literal occurrence can only
    /// end at that character.
    Grown(&'a str),

    /// The stream closed
    EndOfStream,

    /// The deadline passed
    Timeout,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Substring search
    Literal(String),

    /// Regular expression search
    Pattern(Regex),

    /// First of the inner matchers to hit, in order
    AnyOf(Vec<Matcher>),

    /// Hits when the stream closes
    Eof,

    /// Never hits on content; hits when the deadline passes, turning a
    /// timeout into "drained everything that was there"
    Flush,
}

impl Matcher {
    pub fn literal(text: impl Into<String>) -> Self {
        Matcher::Literal(text.into())
    }

    /// Compile `pattern`, failing on malformed input
    pub fn pattern(pattern: &str) -> Result<Self, Error> {
        Regex::new(pattern)
            .map(Matcher::Pattern)
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn any_of(matchers: impl IntoIterator<Item = Matcher>) -> Self {
        Matcher::AnyOf(matchers.into_iter().collect())
    }

    /// The flush sentinel used before view checks
    pub fn flush() -> Self {
        Matcher::any_of([Matcher::Eof, Matcher::Flush])
    }

    pub fn matches(&self, observation: &Observation<'_>) -> bool {
        match (self, observation) {
            (Matcher::Literal(needle), Observation::Text(text)) => text.contains(needle.as_str()),
            (Matcher::Literal(needle), Observation::Grown(text)) => text.ends_with(needle.as_str()),
            (Matcher::Pattern(re), Observation::Text(text) | Observation::Grown(text)) => re.is_match(text),
            (Matcher::AnyOf(matchers), _) => matchers.iter().any(|m| m.matches(observation)),
            (Matcher::Eof, Observation::EndOfStream) => true,
            (Matcher::Flush, Observation::Timeout) => true,
            _ => false,
        }
    }

    /// Whether this matcher ever looks at text
    ///
    /// Lets the stream engine skip building text for drains that only wait
    /// on end-of-stream or the deadline.
    pub fn inspects_text(&self) -> bool {
        match self {
            Matcher::Literal(_) | Matcher::Pattern(_) => true,
            Matcher::AnyOf(matchers) => matchers.iter().any(Matcher::inspects_text),
            Matcher::Eof | Matcher::Flush => false,
        }
    }

    pub fn describe(&self) -> Criteria {
        match self {
            Matcher::Literal(text) => Criteria::Literal(text.clone()),
            Matcher::Pattern(re) => Criteria::Pattern(re.as_str().to_string()),
            Matcher::AnyOf(matchers) => Criteria::AnyOf(matchers.iter().map(Matcher::describe).collect()),
            Matcher::Eof => Criteria::Eof,
            Matcher::Flush => Criteria::Flush,
        }
    }
}

/// Index of the first matcher that hits
pub fn first_hit(matchers: &[Matcher], observation: &Observation<'_>) -> Option<usize> {
    matchers.iter().position(|m| m.matches(observation))
}

/// Description of what a matcher looks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criteria {
    Literal(String),
    Pattern(String),
    AnyOf(Vec<Criteria>),
    Eof,
    Flush,
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criteria::Literal(text) => write!(f, "{text:?}"),
            Criteria::Pattern(pattern) => write!(f, "/{pattern}/"),
            Criteria::AnyOf(inner) => {
                write!(f, "any of [")?;
                for (i, criteria) in inner.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{criteria}")?;
                }
                write!(f, "]")
            }
            Criteria::Eof => write!(f, "end of stream"),
            Criteria::Flush => write!(f, "flush"),
        }
    }
}

/// Describe a whole matcher set, as used in error messages
pub fn describe_all(matchers: &[Matcher]) -> String {
    match matchers {
        [single] => single.describe().to_string(),
        _ => Criteria::AnyOf(matchers.iter().map(Matcher::describe).collect()).to_string(),
    }
}

/// One input to a view check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Needle {
    Text(String),
    Pattern(String),
}

impl Needle {
    pub fn text(text: impl Into<String>) -> Self {
        Needle::Text(text.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Needle::Pattern(pattern.into())
    }

    /// The input as supplied by the caller
    pub fn as_str(&self) -> &str {
        match self {
            Needle::Text(text) | Needle::Pattern(text) => text,
        }
    }

    pub fn to_matcher(&self) -> Result<Matcher, Error> {
        match self {
            Needle::Text(text) => Ok(Matcher::literal(text.clone())),
            Needle::Pattern(pattern) => Matcher::pattern(pattern),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_substring() {
        let m = Matcher::literal("llo, Wo");
        assert!(m.matches(&Observation::Text("Hello, World!")));
        assert!(!m.matches(&Observation::Text("Hello")));
        assert!(!m.matches(&Observation::EndOfStream));
        assert!(!m.matches(&Observation::Timeout));
    }

    #[test]
    fn grown_literal_checks_the_new_end() {
        let m = Matcher::literal("Wor");
        assert!(m.matches(&Observation::Grown("Hello, Wor")));
        assert!(!m.matches(&Observation::Grown("Hello, Worl")));

        let re = Matcher::pattern("W.r").unwrap();
        assert!(re.matches(&Observation::Grown("Hello, World")));
    }

    #[test]
    fn pattern_matches_regex() {
        let m = Matcher::pattern(r"[hH]ello,\s[wW]orld!").unwrap();
        assert!(m.matches(&Observation::Text("Hello, World!")));
        assert!(!m.matches(&Observation::Text("Hello,World!")));
    }

    #[test]
    fn malformed_pattern_is_an_error() {
        let err = Matcher::pattern("(unclosed").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn eof_and_flush_only_match_their_conditions() {
        assert!(Matcher::Eof.matches(&Observation::EndOfStream));
        assert!(!Matcher::Eof.matches(&Observation::Timeout));
        assert!(!Matcher::Eof.matches(&Observation::Text("")));

        assert!(Matcher::Flush.matches(&Observation::Timeout));
        assert!(!Matcher::Flush.matches(&Observation::EndOfStream));
        assert!(!Matcher::Flush.matches(&Observation::Text("anything")));
    }

    #[test]
    fn flush_sentinel_matches_both_terminal_conditions() {
        let flush = Matcher::flush();
        assert!(flush.matches(&Observation::Timeout));
        assert!(flush.matches(&Observation::EndOfStream));
        assert!(!flush.matches(&Observation::Text("payload")));
        assert!(!flush.inspects_text());
    }

    #[test]
    fn first_hit_follows_evaluation_order() {
        let matchers = [
            Matcher::literal("World"),
            Matcher::literal("Hello"),
        ];
        assert_eq!(first_hit(&matchers, &Observation::Text("Hello, World")), Some(0));
        assert_eq!(first_hit(&matchers, &Observation::Text("Hello")), Some(1));
        assert_eq!(first_hit(&matchers, &Observation::Text("nope")), None);
    }

    #[test]
    fn describe_renders_criteria() {
        let m = Matcher::any_of([
            Matcher::literal("a"),
            Matcher::pattern("b+").unwrap(),
            Matcher::flush(),
        ]);
        assert_eq!(
            m.describe().to_string(),
            r#"any of ["a", /b+/, any of [end of stream, flush]]"#
        );
        assert_eq!(describe_all(&[Matcher::literal("x")]), r#""x""#);
    }

    #[test]
    fn needle_keeps_source_text() {
        let needle = Needle::pattern("^foo$");
        assert_eq!(needle.as_str(), "^foo$");
        assert!(needle.to_matcher().unwrap().matches(&Observation::Text("foo")));
        assert!(Needle::pattern("[").to_matcher().is_err());
        assert!(Needle::text("[").to_matcher().is_ok());
    }
}
