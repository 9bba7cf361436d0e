//! Endpoint to team routing.
//!
//! A rule set is an ordered list of `(pattern, team)` pairs. Resolution
//! tries an exact match on the pattern text first, then walks the rules in
//! declaration order and returns the first match. Three pattern kinds are
//! supported:
//!
//! - `/…/` delimited regular expressions
//! - absolute `http://` / `https://` URLs, optionally with a `[tld]` marker
//!   in the hostname
//! - plain path prefixes
//!
//! Nothing in here returns an error: a pattern that cannot be compiled or
//! parsed simply never matches.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Hostname marker matching any top-level domain variant.
pub const TLD_MARKER: &str = "[tld]";

/// How a routing pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Prefix,
    Regex,
    Url,
}

impl PatternKind {
    /// Infer the kind from the pattern syntax.
    pub fn sniff(pattern: &str) -> Self {
        if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
            PatternKind::Regex
        } else if pattern.starts_with("http://") || pattern.starts_with("https://") {
            PatternKind::Url
        } else {
            PatternKind::Prefix
        }
    }
}

/// One `(pattern, team)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub pattern: String,
    pub team: String,
    pub kind: PatternKind,
}

impl RoutingRule {
    /// Create a rule whose kind is inferred from the pattern syntax.
    pub fn new(pattern: impl Into<String>, team: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let kind = PatternKind::sniff(&pattern);
        Self { pattern, team: team.into(), kind }
    }

    /// A path-prefix rule, even if the text looks like a regex or URL.
    pub fn prefix(pattern: impl Into<String>, team: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), team: team.into(), kind: PatternKind::Prefix }
    }

    /// A regex rule. `expression` is the bare expression; surrounding
    /// `/` delimiters are accepted and stripped.
    pub fn regex(expression: impl Into<String>, team: impl Into<String>) -> Self {
        Self { pattern: expression.into(), team: team.into(), kind: PatternKind::Regex }
    }

    /// An absolute URL rule, optionally containing [`TLD_MARKER`].
    pub fn url(pattern: impl Into<String>, team: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), team: team.into(), kind: PatternKind::Url }
    }
}

#[derive(Debug)]
enum Matcher {
    Prefix(String),
    /// `None` when the expression failed to compile.
    Regex(Option<Regex>),
    Url(UrlPattern),
}

#[derive(Debug)]
enum UrlPattern {
    Host { host: String, path: String },
    WildcardTld { base: Vec<String>, path: String },
    Invalid,
}

#[derive(Debug)]
struct CompiledRule {
    team: String,
    matcher: Matcher,
}

/// A compiled, immutable rule set.
#[derive(Debug)]
pub struct TeamRouter {
    rules: Vec<CompiledRule>,
    exact: HashMap<String, usize>,
    default_team: String,
    origin: Option<Url>,
}

impl TeamRouter {
    /// Compile `rules` once. Invalid regexes are logged here and skipped
    /// at match time.
    ///
    /// `origin` is used to resolve bare-path endpoints for URL patterns;
    /// without one, URL patterns never match a bare path.
    pub fn new(rules: &[RoutingRule], default_team: impl Into<String>, origin: Option<Url>) -> Self {
        let mut exact = HashMap::with_capacity(rules.len());
        let mut compiled = Vec::with_capacity(rules.len());

        for (index, rule) in rules.iter().enumerate() {
            exact.entry(rule.pattern.clone()).or_insert(index);
            compiled.push(CompiledRule {
                team: rule.team.clone(),
                matcher: compile(rule),
            });
        }

        Self {
            rules: compiled,
            exact,
            default_team: default_team.into(),
            origin,
        }
    }

    /// Resolve the owning team of `endpoint`, falling back to the default team.
    pub fn resolve(&self, endpoint: &str) -> &str {
        if let Some(&index) = self.exact.get(endpoint) {
            return &self.rules[index].team;
        }

        self.rules
            .iter()
            .find(|rule| self.matches(&rule.matcher, endpoint))
            .map(|rule| rule.team.as_str())
            .unwrap_or(&self.default_team)
    }

    pub fn default_team(&self) -> &str {
        &self.default_team
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn matches(&self, matcher: &Matcher, endpoint: &str) -> bool {
        match matcher {
            Matcher::Prefix(prefix) => endpoint.starts_with(prefix.as_str()),
            Matcher::Regex(Some(regex)) => regex.is_match(endpoint),
            Matcher::Regex(None) => false,
            Matcher::Url(pattern) => match resolve_endpoint(endpoint, self.origin.as_ref()) {
                Some(url) => pattern.matches(&url),
                None => false,
            },
        }
    }
}

/// One-shot resolution without keeping a compiled router around.
pub fn resolve_team(
    endpoint: &str,
    rules: &[RoutingRule],
    default_team: &str,
    origin: Option<&Url>,
) -> String {
    TeamRouter::new(rules, default_team, origin.cloned())
        .resolve(endpoint)
        .to_string()
}

fn compile(rule: &RoutingRule) -> Matcher {
    match rule.kind {
        PatternKind::Prefix => Matcher::Prefix(rule.pattern.clone()),
        PatternKind::Regex => {
            let expression = strip_delimiters(&rule.pattern);
            match Regex::new(expression) {
                Ok(regex) => Matcher::Regex(Some(regex)),
                Err(err) => {
                    tracing::warn!(
                        pattern = %rule.pattern,
                        team = %rule.team,
                        error = %err,
                        "invalid routing regex, rule skipped"
                    );
                    Matcher::Regex(None)
                }
            }
        }
        PatternKind::Url => Matcher::Url(UrlPattern::parse(&rule.pattern)),
    }
}

fn strip_delimiters(pattern: &str) -> &str {
    if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        &pattern[1..pattern.len() - 1]
    } else {
        pattern
    }
}

impl UrlPattern {
    fn parse(pattern: &str) -> Self {
        if pattern.contains(TLD_MARKER) {
            return Self::parse_wildcard(pattern);
        }

        match Url::parse(pattern) {
            Ok(url) => match url.host_str() {
                Some(host) => UrlPattern::Host {
                    host: host.to_ascii_lowercase(),
                    path: url.path().to_string(),
                },
                None => UrlPattern::Invalid,
            },
            Err(_) => UrlPattern::Invalid,
        }
    }

    fn parse_wildcard(pattern: &str) -> Self {
        let Some(rest) = pattern
            .strip_prefix("https://")
            .or_else(|| pattern.strip_prefix("http://"))
        else {
            return UrlPattern::Invalid;
        };

        let (host_part, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash..]),
            None => (rest, "/"),
        };

        let Some(marker) = host_part.find(TLD_MARKER) else {
            // Marker outside the hostname is not supported.
            return UrlPattern::Invalid;
        };

        let base = host_part[..marker].trim_end_matches('.').to_ascii_lowercase();
        let base = if base.is_empty() {
            Vec::new()
        } else {
            base.split('.').map(str::to_string).collect()
        };

        UrlPattern::WildcardTld { base, path: path.to_string() }
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        match self {
            UrlPattern::Host { host: expected, path } => {
                host.eq_ignore_ascii_case(expected) && url.path().starts_with(path.as_str())
            }
            UrlPattern::WildcardTld { base, path } => {
                let host = host.to_ascii_lowercase();
                let segments: Vec<&str> = host.split('.').collect();
                segments.len() > base.len()
                    && segments.iter().zip(base.iter()).all(|(a, b)| *a == b.as_str())
                    && url.path().starts_with(path.as_str())
            }
            UrlPattern::Invalid => false,
        }
    }
}

/// Resolve `endpoint` to an absolute URL, using `origin` as base for bare paths.
fn resolve_endpoint(endpoint: &str, origin: Option<&Url>) -> Option<Url> {
    if let Ok(url) = Url::parse(endpoint) {
        if url.has_host() {
            return Some(url);
        }
    }
    origin.and_then(|base| base.join(endpoint).ok())
}
