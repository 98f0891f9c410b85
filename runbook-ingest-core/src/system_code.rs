//! Runbook naming convention and system code detection.
//!
//! A system code is resolved in priority order:
//! 1. declared inside the runbook itself (applied by the ingestion transform,
//!    read back from `details.parseData.systemCode`),
//! 2. mapped to the runbook path in the repository policy,
//! 3. encoded in the file name as `<code>_runbook.md`,
//! 4. a fallback handed in by the caller.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::RunPolicy;

fn runbook_rx() -> &'static Regex {
    static RUNBOOK_RX: OnceLock<Regex> = OnceLock::new();
    RUNBOOK_RX.get_or_init(|| Regex::new(r"(?i)runbook\.md$").expect("static regex is valid"))
}

/// Whether `path` follows the runbook naming convention.
pub fn is_runbook_path(path: &str) -> bool {
    runbook_rx().is_match(path)
}

/// Code encoded in the file name, e.g. `my-system_runbook.md` → `my-system`.
/// The single separator character before `runbook.md` is dropped.
pub fn parse_system_code(path: &str) -> Option<String> {
    let basename = path.rsplit('/').next().unwrap_or(path);
    let mut code = runbook_rx().replace(basename, "").into_owned();
    code.pop();
    let code = code.trim();
    (!code.is_empty()).then(|| code.to_string())
}

/// Resolve the code from policy, file name, then `fallback`.
pub fn detect_system_code(policy: &RunPolicy, path: &str, fallback: Option<&str>) -> Option<String> {
    policy
        .mapped_system_code(path)
        .map(str::to_string)
        .or_else(|| parse_system_code(path))
        .or_else(|| fallback.map(str::to_string))
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
}

/// Code declared in the runbook content, as reported back by the transform.
pub fn embedded_system_code(details: Option<&Value>) -> Option<&str> {
    details?
        .get("parseData")?
        .get("systemCode")?
        .as_str()
        .filter(|code| !code.is_empty())
}
