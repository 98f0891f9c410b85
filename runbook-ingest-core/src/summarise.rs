//! # summarise: reduce outcomes to one verdict
//!
//! [`Summariser::summarise`] computes the [`RunResult`] on first call and
//! returns the same value on every later call, so the check report, the
//! stored aggregate and the caller all see one stable verdict.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FailOn;
use crate::contract::{AggregateSummary, CheckReport, Conclusion};
use crate::processor::{IngestOutcome, IngestState};

const SECTION_SEPARATOR: &str = "   \n***  \n";

/// Aggregate verdict for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub total: usize,
    pub pass_count: usize,
    pub failed_count: usize,
    pub conclusion: Conclusion,
    /// Mean of the valid weighted scores; `None` when no runbook had one.
    pub avg_score: Option<f64>,
    pub title: String,
    pub summary: String,
    pub text: String,
}

impl RunResult {
    /// Average score with the "no scores" case reported as zero.
    pub fn average_score(&self) -> f64 {
        self.avg_score.unwrap_or(0.0)
    }

    pub fn check_report(&self) -> CheckReport {
        CheckReport {
            conclusion: self.conclusion,
            title: self.title.clone(),
            summary: self.summary.clone(),
            text: self.text.clone(),
        }
    }

    pub fn aggregate(&self) -> AggregateSummary {
        AggregateSummary {
            total: self.total,
            pass_count: self.pass_count,
            failed_count: self.failed_count,
            avg_score: self.avg_score,
            conclusion: self.conclusion,
        }
    }
}

/// Where per-runbook report and re-ingest pages live.
#[derive(Debug, Clone, Default)]
pub struct ReportLinks {
    pub base_url: Option<String>,
    pub repository: String,
    pub commit_sha: String,
}

impl ReportLinks {
    fn page(&self, page: &str, blob_id: &str) -> Option<String> {
        let base = self.base_url.as_deref()?.trim_end_matches('/');
        Some(format!(
            "{base}/runbook.md/{page}/{}/{blob_id}?commitSha={}",
            self.repository, self.commit_sha
        ))
    }
}

pub struct Summariser<'a> {
    outcomes: &'a [IngestOutcome],
    fail_on: FailOn,
    links: ReportLinks,
    result: OnceLock<RunResult>,
}

impl<'a> Summariser<'a> {
    pub fn new(outcomes: &'a [IngestOutcome], fail_on: FailOn, links: ReportLinks) -> Self {
        Self {
            outcomes,
            fail_on,
            links,
            result: OnceLock::new(),
        }
    }

    /// The run result, computed once.
    pub fn summarise(&self) -> &RunResult {
        self.result.get_or_init(|| self.compute())
    }

    fn compute(&self) -> RunResult {
        let total = self.outcomes.len();
        let failed_count = self
            .outcomes
            .iter()
            .filter(|outcome| outcome.state == IngestState::Failure)
            .count();
        let pass_count = total - failed_count;

        let scores: Vec<f64> = self
            .outcomes
            .iter()
            .filter_map(IngestOutcome::weighted_score)
            .collect();
        let avg_score = (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

        let conclusion = conclude(self.fail_on, pass_count, failed_count);

        let mut title = if pass_count == 0 {
            format!("{} failed", plural(total, "runbook"))
        } else if total > 1 {
            format!("{pass_count}/{total} passed")
        } else {
            format!("{} passed", plural(total, "runbook"))
        };
        if let Some(avg) = avg_score {
            let mean = if total > 1 { "μ" } else { "" };
            title.push_str(&format!(", {mean}{avg}%"));
        }

        let (emoji, status) = state_descriptors(conclusion == Conclusion::Success);
        let mut summary = vec![
            format!("{emoji} **QUALITY CONTROL {status}**:"),
            format!("Evaluated {}.  \n", plural(total, "runbook")),
        ];
        if total > 1 {
            if pass_count > 0 {
                summary.push(format!("**{pass_count}** passed."));
            }
            if failed_count > 0 {
                summary.push(format!("**{failed_count}** failed."));
            }
            if let Some(avg) = avg_score {
                summary.push(format!(
                    "Average operability score **{avg}%** (based on {}).",
                    plural(scores.len(), "score")
                ));
            }
        }

        let text = self
            .outcomes
            .iter()
            .map(|outcome| self.describe(outcome))
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR);

        RunResult {
            total,
            pass_count,
            failed_count,
            conclusion,
            avg_score,
            title,
            summary: summary.join(" "),
            text,
        }
    }

    /// Markdown section for one runbook.
    fn describe(&self, outcome: &IngestOutcome) -> String {
        let details = outcome.details.as_ref();
        let errors = count_entries(details, "parseErrors");
        let parsed = count_entries(details, "parseData");
        let invalid = count_entries(details, "validationErrors");
        let updated = count_entries(details, "updatedFields");

        let (emoji, status) = state_descriptors(outcome.is_success());
        let mut header = format!("{emoji} **{status}** | [Go to file]({})", outcome.url);
        if let Some(status_url) = self.links.page("status", &outcome.blob_id) {
            header.push_str(&format!(" | [**View report »**]({status_url})"));
        }

        let mut lines = vec![format!("## {}  \n", outcome.path), header];
        if let Some(message) = outcome.message.as_deref().filter(|m| !m.is_empty()) {
            lines.push(format!("> {message}  \n"));
        }
        if let Some(score) = outcome.weighted_score() {
            lines.push(format!("* Runbook score: **{score:.1}%**"));
        }
        if errors > 0 {
            lines.push(format!("* **{errors}** parse errors"));
        }
        if parsed > 0 {
            lines.push(format!("* **{parsed}** facets parsed successfully"));
        }
        if invalid > 0 {
            lines.push(format!("* **{invalid}** invalid facets"));
        }
        if updated > 0 {
            lines.push(format!("* **{updated}** fields updated in the CMDB"));
        }
        if outcome.is_success() {
            let hint = match outcome.effective_system_code() {
                Some(code) => {
                    let trigger = match self.links.page("reingest", &outcome.blob_id) {
                        Some(url) => format!("[**Trigger ingest »**]({url})"),
                        None => "**Ingest available**".to_string(),
                    };
                    format!("{trigger} – :warning: this will update the system **{code}** in the CMDB")
                }
                None => "**Ingest trigger disabled** – no system code found. Please specify a valid system code in this runbook's contents, filename, or in the repository config for runbook checks.".to_string(),
            };
            lines.push(format!("\n -------------- \n{hint}"));
        }
        lines.join("  \n")
    }
}

/// Apply the fail policy to the counts.
pub fn conclude(fail_on: FailOn, pass_count: usize, failed_count: usize) -> Conclusion {
    let failed = match fail_on {
        FailOn::Any => failed_count > 0,
        FailOn::All => pass_count == 0,
        FailOn::None => false,
    };
    if failed {
        Conclusion::Failure
    } else {
        Conclusion::Success
    }
}

/// `1 runbook`, `2 runbooks`.
pub fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

fn state_descriptors(success: bool) -> (&'static str, &'static str) {
    if success {
        (":tada:", "PASSED")
    } else {
        (":rotating_light:", "FAILED")
    }
}

fn count_entries(details: Option<&Value>, key: &str) -> usize {
    match details.and_then(|details| details.get(key)) {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(fields)) => fields.len(),
        _ => 0,
    }
}
