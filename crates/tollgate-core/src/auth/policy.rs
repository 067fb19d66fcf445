//! Route access policy.
//!
//! An ordered table of path patterns, first match wins. Patterns use
//! ant-style syntax:
//! - `**` matches zero or more whole segments
//! - `*` matches any run of characters inside one segment
//! - `{name}` matches exactly one segment

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::SecurityContext;

/// Policy errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Pattern could not be parsed.
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    AnyDepth,
    Variable,
    Glob(String),
    Literal(String),
}

impl Segment {
    fn matches(&self, segment: &str) -> bool {
        match self {
            Self::AnyDepth | Self::Variable => true,
            Self::Literal(lit) => lit == segment,
            Self::Glob(glob) => glob_matches(glob.as_bytes(), segment.as_bytes()),
        }
    }
}

fn glob_matches(glob: &[u8], text: &[u8]) -> bool {
    match glob.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|skip| glob_matches(rest, &text[skip..])),
        Some((c, rest)) => text.first() == Some(c) && glob_matches(rest, &text[1..]),
    }
}

fn segments_match(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=path.len()).any(|skip| segments_match(rest, &path[skip..]))
        }
        Some((segment, rest)) => path
            .split_first()
            .is_some_and(|(head, tail)| segment.matches(head) && segments_match(rest, tail)),
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// A parsed route pattern such as `/auth/refresh/**`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern.
    ///
    /// # Errors
    ///
    /// Returns error for patterns that do not start with `/`, misplaced `**`
    /// or malformed `{}` placeholders.
    pub fn parse(pattern: &str) -> Result<Self, PolicyError> {
        let invalid = |reason| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let segments = split_path(pattern)
            .into_iter()
            .map(|seg| {
                if seg == "**" {
                    Ok(Segment::AnyDepth)
                } else if seg.contains("**") {
                    Err(invalid("'**' must be a whole segment"))
                } else if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    if name.is_empty() || name.contains(['{', '}', '*']) {
                        Err(invalid("malformed placeholder"))
                    } else {
                        Ok(Segment::Variable)
                    }
                } else if seg.contains(['{', '}']) {
                    Err(invalid("placeholder must be a whole segment"))
                } else if seg.contains('*') {
                    Ok(Segment::Glob(seg.to_string()))
                } else {
                    Ok(Segment::Literal(seg.to_string()))
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Build a pattern made only of literal and `**` segments.
    fn builtin(pattern: &'static str) -> Self {
        let segments = split_path(pattern)
            .into_iter()
            .map(|seg| {
                if seg == "**" {
                    Segment::AnyDepth
                } else {
                    Segment::Literal(seg.to_string())
                }
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    /// Pattern source text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether a request path matches. Empty segments are ignored.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        segments_match(&self.segments, &split_path(path))
    }
}

impl FromStr for PathPattern {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.raw
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// What a route demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Requirement {
    /// Anyone.
    Open,
    /// Any authenticated principal.
    RequireAuthenticated,
    /// Nobody.
    DenyAll,
}

/// One row of the policy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Route pattern.
    pub pattern: PathPattern,
    /// Requirement for matching routes.
    pub requirement: Requirement,
}

impl AccessRule {
    /// Create a rule.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern does not parse.
    pub fn new(pattern: &str, requirement: Requirement) -> Result<Self, PolicyError> {
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
            requirement,
        })
    }

    /// Default table: sign-in, refresh, API docs and health are open, the
    /// API needs a token and user administration is disabled.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        [
            ("/auth/signin", Requirement::Open),
            ("/auth/refresh/**", Requirement::Open),
            ("/swagger-ui/**", Requirement::Open),
            ("/v3/api-docs/**", Requirement::Open),
            ("/health", Requirement::Open),
            ("/api/**", Requirement::RequireAuthenticated),
            ("/users/**", Requirement::DenyAll),
        ]
        .into_iter()
        .map(|(pattern, requirement)| Self {
            pattern: PathPattern::builtin(pattern),
            requirement,
        })
        .collect()
    }
}

/// Outcome of evaluating a request against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed to the handler.
    Allow,
    /// A principal is required but absent.
    Unauthenticated,
    /// Refused regardless of principal.
    Forbidden,
}

/// Ordered first-match route policy.
///
/// Unmatched paths require authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(AccessRule::defaults())
    }
}

impl AccessPolicy {
    /// Create a policy from an ordered rule list.
    #[must_use]
    pub const fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    /// Requirement of the first rule matching `path`.
    #[must_use]
    pub fn requirement_for(&self, path: &str) -> Requirement {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(path))
            .map_or(Requirement::RequireAuthenticated, |rule| rule.requirement)
    }

    /// Decide whether a request may proceed.
    #[must_use]
    pub fn evaluate(&self, path: &str, context: &SecurityContext) -> Decision {
        match self.requirement_for(path) {
            Requirement::Open => Decision::Allow,
            Requirement::RequireAuthenticated if context.is_authenticated() => Decision::Allow,
            Requirement::RequireAuthenticated => Decision::Unauthenticated,
            Requirement::DenyAll => Decision::Forbidden,
        }
    }
}
