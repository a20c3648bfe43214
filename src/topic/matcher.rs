//! Wildcard pattern matcher
//!
//! A pattern is split into tokens: literal runs, `+` (one or more characters
//! other than `/`) and `*` (zero or more characters of any kind). Matching
//! walks the tokens while tracking the set of topic positions reachable so
//! far, so the cost is bounded by tokens x topic length and no backtracking
//! is needed. The whole pattern must consume the whole topic.

use smallvec::{smallvec, SmallVec};

/// Level separator
pub const SEPARATOR: char = '/';

/// Single-level wildcard token
pub const ONE_OR_MORE: char = '+';

/// Multi-level wildcard token
pub const ANY: char = '*';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    OneOrMore,
    Any,
}

/// Reachable positions in the topic, one flag per byte offset
type Reach = SmallVec<[bool; 64]>;

/// A subscription pattern compiled into tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    source: String,
    tokens: SmallVec<[Token; 8]>,
}

impl TopicPattern {
    pub fn compile(pattern: &str) -> Self {
        let mut tokens = SmallVec::new();
        let mut literal = String::new();

        for ch in pattern.chars() {
            let wildcard = match ch {
                ONE_OR_MORE => Token::OneOrMore,
                ANY => Token::Any,
                _ => {
                    literal.push(ch);
                    continue;
                }
            };
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(wildcard);
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Self {
            source: pattern.to_string(),
            tokens,
        }
    }

    /// The pattern as registered by the subscriber
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the pattern contains `+` or `*`
    pub fn has_wildcards(&self) -> bool {
        self.tokens.iter().any(|t| !matches!(t, Token::Literal(_)))
    }

    /// Check whether the topic matches this pattern, anchored at both ends
    pub fn matches(&self, topic: &str) -> bool {
        let len = topic.len();
        let mut reach: Reach = smallvec![false; len + 1];
        reach[0] = true;

        for token in &self.tokens {
            let mut next: Reach = smallvec![false; len + 1];
            let mut any_reached = false;

            match token {
                Token::Literal(lit) => {
                    for pos in 0..=len {
                        if reach[pos] && topic.as_bytes()[pos..].starts_with(lit.as_bytes()) {
                            next[pos + lit.len()] = true;
                            any_reached = true;
                        }
                    }
                }
                Token::OneOrMore => {
                    for pos in 0..len {
                        if !reach[pos] {
                            continue;
                        }
                        for (offset, ch) in topic[pos..].char_indices() {
                            if ch == SEPARATOR {
                                break;
                            }
                            next[pos + offset + ch.len_utf8()] = true;
                            any_reached = true;
                        }
                    }
                }
                Token::Any => {
                    if let Some(first) = reach.iter().position(|&r| r) {
                        for pos in first..=len {
                            if topic.is_char_boundary(pos) {
                                next[pos] = true;
                            }
                        }
                        any_reached = true;
                    }
                }
            }

            if !any_reached {
                return false;
            }
            reach = next;
        }

        reach[len]
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Check if a pattern matches a topic
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    TopicPattern::compile(pattern).matches(topic)
}

/// Returns true as soon as one pattern in the set matches the topic
pub fn find_any_match<'a, I>(patterns: I, topic: &str) -> bool
where
    I: IntoIterator<Item = &'a TopicPattern>,
{
    patterns.into_iter().any(|p| p.matches(topic))
}
