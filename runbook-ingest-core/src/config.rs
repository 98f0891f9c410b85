//! # config: repository policy resolution
//!
//! The raw policy comes from a file committed to the repository being checked,
//! so it is untrusted. [`RunPolicy::resolve`] never fails: every field is
//! validated on its own and falls back to its default (with a warning) when
//! missing or malformed.
//!
//! ## Accepted keys
//! - `disabled`: truthy to switch the checks off.
//! - `failOn`: `any` | `all` | `none`.
//! - `updateOnMerge`: truthy to allow CMDB writes; then `updateBranch`
//!   (default `master`) and `excludeFromUpdate` apply.
//! - `exclude`: paths or patterns never treated as runbooks.
//! - `systemCodes`: map of system code to runbook path or pattern.
//!
//! Patterns prefixed with `rx:` are regular expressions; anything else is a
//! literal path. Matching is case-insensitive either way.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const DEFAULT_UPDATE_BRANCH: &str = "master";
const PATTERN_PREFIX: &str = "rx:";

/// How failed runbooks translate into the run conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    /// Fail the run if any runbook failed.
    #[default]
    Any,
    /// Fail the run only if no runbook passed.
    All,
    /// Never fail the run.
    None,
}

impl FailOn {
    pub fn parse(value: &str) -> Option<FailOn> {
        match value {
            "any" => Some(FailOn::Any),
            "all" => Some(FailOn::All),
            "none" => Some(FailOn::None),
            _ => None,
        }
    }
}

/// A compiled path matcher.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    source: String,
    regex: Regex,
}

impl PathMatcher {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let expression = match pattern.strip_prefix(PATTERN_PREFIX) {
            Some(rx) => rx.to_string(),
            None => format!("^{}$", regex::escape(pattern)),
        };
        let regex = RegexBuilder::new(&expression)
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// An ordered set of path matchers.
#[derive(Debug, Clone, Default)]
pub struct PathMatchers(Vec<PathMatcher>);

impl PathMatchers {
    pub fn matches_any(&self, path: &str) -> bool {
        self.0.iter().any(|matcher| matcher.is_match(path))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Compile a config array of non-empty strings. Anything else yields an empty set.
    fn from_config(key: &str, value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let Some(patterns) = string_array(value) else {
            warn!(key, value = %value, "[CONFIG] Expected an array of non-empty strings, ignoring");
            return Self::default();
        };
        Self(
            patterns
                .into_iter()
                .filter_map(|pattern| compile_or_warn(key, pattern))
                .collect(),
        )
    }
}

/// System codes keyed to the runbook path (or pattern) they own.
#[derive(Debug, Clone, Default)]
pub struct SystemCodeMap(Vec<(String, PathMatcher)>);

impl SystemCodeMap {
    /// First code whose path matcher accepts `path`.
    pub fn code_for(&self, path: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, matcher)| matcher.is_match(path))
            .map(|(code, _)| code.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_config(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let Some(entries) = value.as_object() else {
            warn!(value = %value, "[CONFIG] systemCodes must be a map of code to path, ignoring");
            return Self::default();
        };
        let mut codes = Vec::with_capacity(entries.len());
        for (code, path) in entries {
            let code = code.trim();
            match path.as_str() {
                Some(path) if !code.is_empty() && !path.is_empty() => {
                    if let Some(matcher) = compile_or_warn("systemCodes", path) {
                        codes.push((code.to_string(), matcher));
                    }
                }
                _ => warn!(code, path = %path, "[CONFIG] Ignoring malformed systemCodes entry"),
            }
        }
        Self(codes)
    }
}

/// Effective policy for one run.
#[derive(Debug, Clone, Default)]
pub struct RunPolicy {
    pub disabled: bool,
    pub fail_on: FailOn,
    /// Branch whose runbooks may be written to the CMDB. `None` disables writes.
    pub write_branch: Option<String>,
    pub exclude: PathMatchers,
    pub exclude_from_write: PathMatchers,
    pub system_codes: SystemCodeMap,
}

impl RunPolicy {
    /// Build the policy from raw config and the environment's default fail mode.
    pub fn resolve(raw: &Value, default_fail_on: FailOn) -> Self {
        let empty = Map::new();
        let fields = match raw {
            Value::Object(fields) => fields,
            Value::Null => &empty,
            other => {
                warn!(config = %other, "[CONFIG] Runbook config is not a map, using defaults");
                &empty
            }
        };

        let fail_on = match fields.get("failOn") {
            None => default_fail_on,
            Some(value) => match value.as_str().and_then(FailOn::parse) {
                Some(fail_on) => fail_on,
                None => {
                    warn!(value = %value, default = ?default_fail_on, "[CONFIG] Unknown failOn, using default");
                    default_fail_on
                }
            },
        };

        let update_on_merge = fields.get("updateOnMerge").is_some_and(truthy);
        let (write_branch, exclude_from_write) = if update_on_merge {
            let branch = match fields.get("updateBranch") {
                Some(Value::String(branch)) if !branch.is_empty() => branch.clone(),
                Some(other) => {
                    warn!(value = %other, "[CONFIG] Invalid updateBranch, using default");
                    DEFAULT_UPDATE_BRANCH.to_string()
                }
                None => DEFAULT_UPDATE_BRANCH.to_string(),
            };
            (
                Some(branch),
                PathMatchers::from_config("excludeFromUpdate", fields.get("excludeFromUpdate")),
            )
        } else {
            (None, PathMatchers::default())
        };

        let policy = Self {
            disabled: fields.get("disabled").is_some_and(truthy),
            fail_on,
            write_branch,
            exclude: PathMatchers::from_config("exclude", fields.get("exclude")),
            exclude_from_write,
            system_codes: SystemCodeMap::from_config(fields.get("systemCodes")),
        };
        debug!(
            disabled = policy.disabled,
            fail_on = ?policy.fail_on,
            write_branch = ?policy.write_branch,
            exclusions = policy.exclude.len(),
            system_codes = policy.system_codes.len(),
            "[CONFIG] Resolved run policy"
        );
        policy
    }

    pub fn is_path_excluded(&self, path: &str) -> bool {
        self.exclude.matches_any(path)
    }

    /// Whether a runbook at `path` on `branch` may be written to the CMDB.
    /// The caller still has to hold a system code for the write to happen.
    pub fn is_write_enabled(&self, branch: &str, path: &str) -> bool {
        match &self.write_branch {
            Some(write_branch) => {
                write_branch == branch && !self.exclude_from_write.matches_any(path)
            }
            None => false,
        }
    }

    pub fn mapped_system_code(&self, path: &str) -> Option<&str> {
        self.system_codes.code_for(path)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_array(value: &Value) -> Option<Vec<&str>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_str().filter(|text| !text.is_empty()))
        .collect()
}

fn compile_or_warn(key: &str, pattern: &str) -> Option<PathMatcher> {
    match PathMatcher::compile(pattern) {
        Ok(matcher) => Some(matcher),
        Err(e) => {
            warn!(key, pattern, error = %e, "[CONFIG] Dropping invalid pattern");
            None
        }
    }
}
