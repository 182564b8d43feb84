//! Version constraint expressions
//!
//! Constraints follow the common range grammar used by package installs:
//! comparators separated by whitespace or commas are AND-ed, alternatives
//! separated by `||` are OR-ed, a bare version is an exact match and
//! `a - b` is an inclusive range. `!=` excludes a single version.

use semver::{Version, VersionReq};

use crate::error::{CoreError, Result};
use crate::versions::parse_version;

const OPERATOR_CHARS: &[char] = &['=', '!', '<', '>', '~', '^'];

/// A parsed constraint expression
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    raw: String,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone)]
struct Alternative {
    req: VersionReq,
    excluded: Vec<Version>,
}

impl Alternative {
    fn matches(&self, version: &Version) -> bool {
        self.req.matches(version) && !self.excluded.contains(version)
    }
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidConstraint {
            constraint: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.trim().is_empty() {
            return Err(invalid("empty constraint"));
        }

        let alternatives = raw
            .split("||")
            .map(|alt| parse_alternative(alt).map_err(|reason| invalid(&reason)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for VersionConstraint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_alternative(alt: &str) -> std::result::Result<Alternative, String> {
    let tokens = comparator_tokens(alt)?;
    if tokens.is_empty() {
        return Err("empty alternative".to_string());
    }

    let mut comparators = Vec::new();
    let mut excluded = Vec::new();

    for token in tokens {
        let split = token
            .find(|c: char| !OPERATOR_CHARS.contains(&c))
            .ok_or_else(|| format!("operator '{}' without a version", token))?;
        let (op, version) = token.split_at(split);
        let version = version.strip_prefix('v').unwrap_or(version);

        match op {
            "!=" => {
                let v = parse_version("constraint", version).map_err(|e| e.to_string())?;
                excluded.push(v);
            }
            "" if is_wildcard(version) => comparators.push(version.to_string()),
            "" | "==" => comparators.push(format!("={}", version)),
            "~>" => comparators.push(format!("~{}", version)),
            "=" | ">" | ">=" | "<" | "<=" | "~" | "^" => {
                comparators.push(format!("{}{}", op, version))
            }
            other => return Err(format!("unknown operator '{}'", other)),
        }
    }

    if comparators.is_empty() {
        comparators.push("*".to_string());
    }

    let req = VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())?;
    Ok(Alternative { req, excluded })
}

/// Split one alternative into `op+version` tokens
///
/// Joins detached operators with their version (`>= 1.0` becomes `>=1.0`)
/// and expands hyphen ranges.
fn comparator_tokens(alt: &str) -> std::result::Result<Vec<String>, String> {
    let raw: Vec<&str> = alt
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    let mut tokens: Vec<String> = Vec::with_capacity(raw.len());
    let mut pending_op: Option<&str> = None;
    let mut iter = raw.iter().peekable();

    while let Some(token) = iter.next() {
        if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            if pending_op.is_some() {
                return Err(format!("unexpected operator '{}'", token));
            }
            pending_op = Some(token);
            continue;
        }

        if *token == "-" {
            let upper = iter
                .next()
                .ok_or_else(|| "hyphen range without an upper bound".to_string())?;
            let lower = tokens
                .pop()
                .ok_or_else(|| "hyphen range without a lower bound".to_string())?;
            if lower.starts_with(OPERATOR_CHARS) {
                return Err(format!("hyphen range bound '{}' has an operator", lower));
            }
            tokens.push(format!(">={}", lower));
            tokens.push(format!("<={}", upper));
            continue;
        }

        match pending_op.take() {
            Some(op) => tokens.push(format!("{}{}", op, token)),
            None => tokens.push((*token).to_string()),
        }
    }

    if let Some(op) = pending_op {
        return Err(format!("operator '{}' without a version", op));
    }
    Ok(tokens)
}

fn is_wildcard(version: &str) -> bool {
    version == "*"
        || version
            .split('.')
            .any(|part| matches!(part, "x" | "X" | "*"))
}
