//! Data types shared by the pipeline definition, step executor, and engine.

use crate::llm::LlmError;
use crate::tools::{ToolError, ToolKind};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    /// Confirm the upload is a financial report.
    Verification,
    /// Extract metrics and trends.
    Analysis,
    /// Identify market, credit, and operational risks.
    RiskAssessment,
    /// Produce the client-ready recommendation.
    Recommendation,
}

impl StepId {
    /// Stable snake_case name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::Analysis => "analyze_financial_document",
            Self::RiskAssessment => "risk_assessment",
            Self::Recommendation => "investment_analysis",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persona and permissions of the role executing a step.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    /// Role label, also used as the coworker name for delegation.
    pub role: String,
    /// What the role is trying to achieve.
    pub goal: String,
    /// Static priming text prepended to every invocation.
    pub backstory: String,
    /// Maximum backend round-trips that may request tools before a final answer is forced.
    pub max_iter: usize,
    /// External capabilities the role may call.
    pub tools: Vec<ToolKind>,
    /// Whether the role may hand sub-questions to coworkers.
    pub allow_delegation: bool,
}

/// One stage of the pipeline.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    /// Step identifier.
    pub id: StepId,
    /// Role executing the step.
    pub agent: AgentProfile,
    /// Instruction template; `{query}` and `{file_path}` are substituted per run.
    pub description: String,
    /// Contract the final answer must satisfy.
    pub expected_output: String,
    /// Upstream steps whose outputs this step reads, in order.
    pub context: Vec<StepId>,
    /// Whether the step's output carries a verification verdict the engine inspects.
    pub gates_pipeline: bool,
}

impl StepDefinition {
    /// Substitute request values into the instruction template.
    pub fn render_description(&self, request: &PipelineRequest) -> String {
        self.description
            .replace("{query}", &request.query)
            .replace("{file_path}", &request.file_path.to_string_lossy())
    }
}

/// Inputs of a single pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    /// User question, already trimmed.
    pub query: String,
    /// Location of the uploaded document.
    pub file_path: PathBuf,
}

/// Text produced by a completed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Step that produced the text.
    pub step: StepId,
    /// Role that executed it.
    pub role: String,
    /// Final answer.
    pub text: String,
}

/// Result of parsing the verification step's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Document accepted as a financial report.
    Valid,
    /// Document rejected, with the verifier's explanation.
    Invalid(String),
    /// Verifier did not follow the verdict contract.
    Missing,
}

impl Verdict {
    /// Parse the first `VERDICT:` line of a verification answer.
    ///
    /// Markdown emphasis, code, and heading markers around the line are ignored. The verdict word
    /// must stand alone, so `VALIDATION FAILED` is not read as `VALID`.
    pub fn parse(text: &str) -> Self {
        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            let cleaned = line.trim().trim_matches(is_markup).trim();
            let Some(rest) = strip_prefix_ignore_case(cleaned, "VERDICT:") else {
                continue;
            };
            let rest = rest.trim().trim_start_matches(is_markup).trim_start();
            if let Some(reason) = strip_verdict_word(rest, "INVALID") {
                let mut reason = reason
                    .trim_start_matches(|c: char| is_separator(c) || is_markup(c))
                    .trim_end_matches(is_markup)
                    .trim()
                    .to_string();
                if reason.is_empty() {
                    reason = lines.by_ref().collect::<Vec<_>>().join("\n").trim().to_string();
                }
                if reason.is_empty() {
                    reason = "document is not a valid financial report".to_string();
                }
                return Self::Invalid(reason);
            }
            if strip_verdict_word(rest, "VALID").is_some() {
                return Self::Valid;
            }
        }
        Self::Missing
    }
}

fn is_markup(c: char) -> bool {
    matches!(c, '*' | '#' | '_' | '`')
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | ':' | '.')
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Strip `word` when it is followed by end of line, whitespace, `-`, `:`, `.`, or markup.
fn strip_verdict_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let rest = strip_prefix_ignore_case(text, word)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if is_separator(c) || is_markup(c) => Some(rest),
        Some(_) => None,
    }
}

/// Lifecycle of a pipeline run.
///
/// A run starts `Pending`, becomes `Verified` once the gating step accepts the document (or the
/// gate is advisory), and ends `Completed`. Failed runs end `Rejected` or `Aborted`; see
/// [`PipelineError::terminal_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No gating step has finished yet.
    Pending,
    /// Verification accepted the document (or was advisory).
    Verified,
    /// Verification rejected the document and the run stopped.
    Rejected,
    /// A step failed and the run stopped.
    Aborted,
    /// Every step produced output.
    Completed,
}

/// Record of a completed pipeline run; its state is always [`RunState::Completed`].
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Unique run identifier used in logs.
    pub run_id: Uuid,
    /// Verdict reported by the gating step.
    pub verdict: Verdict,
    /// Step outputs in execution order.
    pub outputs: Vec<StepOutput>,
}

impl PipelineRun {
    /// Text of the last executed step.
    pub fn final_output(&self) -> Option<&str> {
        self.outputs.last().map(|output| output.text.as_str())
    }

    /// Output of a specific step, if it ran.
    pub fn output(&self, step: StepId) -> Option<&StepOutput> {
        self.outputs.iter().find(|output| output.step == step)
    }

    /// Steps in the order they executed.
    pub fn step_order(&self) -> Vec<StepId> {
        self.outputs.iter().map(|output| output.step).collect()
    }
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Step list violates ordering or uniqueness rules.
    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),
    /// Completion backend failed while executing a step.
    #[error("Step '{step}' failed: {source}")]
    Backend {
        /// Step being executed.
        step: StepId,
        /// Underlying backend error.
        #[source]
        source: LlmError,
    },
    /// A tool failed in a way the model cannot recover from.
    #[error("Step '{step}' failed while calling {tool}: {source}")]
    Tool {
        /// Step being executed.
        step: StepId,
        /// Tool name as advertised to the model.
        tool: String,
        /// Underlying tool error.
        #[source]
        source: ToolError,
    },
    /// The model kept requesting tools after the iteration budget was spent.
    #[error("Step '{step}' exceeded its iteration budget of {max_iter} without a final answer")]
    IterationBudget {
        /// Step being executed.
        step: StepId,
        /// Budget configured for the role.
        max_iter: usize,
    },
    /// The model returned an empty final answer.
    #[error("Step '{0}' produced an empty answer")]
    EmptyOutput(StepId),
    /// A declared dependency produced no output.
    #[error("Step '{step}' is missing context from '{dependency}'")]
    MissingContext {
        /// Step being executed.
        step: StepId,
        /// Dependency without output.
        dependency: StepId,
    },
    /// Verification judged the document not to be a financial report.
    #[error("Document rejected during verification: {0}")]
    VerificationRejected(String),
}

impl PipelineError {
    /// State a run ends in when it fails with this error.
    pub fn terminal_state(&self) -> RunState {
        match self {
            Self::VerificationRejected(_) => RunState::Rejected,
            _ => RunState::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_verdict_with_markdown() {
        let text = "**VERDICT: VALID**\nThe document contains an Income Statement.";
        assert_eq!(Verdict::parse(text), Verdict::Valid);
    }

    #[test]
    fn invalid_is_not_mistaken_for_valid() {
        let text = "VERDICT: INVALID - no Balance Sheet or Income Statement found";
        assert_eq!(
            Verdict::parse(text),
            Verdict::Invalid("no Balance Sheet or Income Statement found".into())
        );
    }

    #[test]
    fn invalid_reason_falls_back_to_following_lines() {
        let text = "## Verdict: invalid\nThis is a grocery list.";
        assert_eq!(
            Verdict::parse(text),
            Verdict::Invalid("This is a grocery list.".into())
        );
    }

    #[test]
    fn backticked_verdict_is_recognized() {
        let text = "`VERDICT: VALID`\nIncome Statement and Balance Sheet present.";
        assert_eq!(Verdict::parse(text), Verdict::Valid);
        assert_eq!(
            Verdict::parse("`VERDICT: INVALID - a recipe`"),
            Verdict::Invalid("a recipe".into())
        );
    }

    #[test]
    fn verdict_word_must_stand_alone() {
        assert_eq!(
            Verdict::parse("VERDICT: VALIDATION FAILED - not a report"),
            Verdict::Missing
        );
        assert_eq!(Verdict::parse("VERDICT: INVALIDATED"), Verdict::Missing);
        assert_eq!(Verdict::parse("VERDICT: VALID."), Verdict::Valid);
        assert_eq!(
            Verdict::parse("**VERDICT: INVALID** - shopping list"),
            Verdict::Invalid("shopping list".into())
        );
    }

    #[test]
    fn verdict_line_may_follow_preamble() {
        let text = "I reviewed the file.\nverdict: valid";
        assert_eq!(Verdict::parse(text), Verdict::Valid);
    }

    #[test]
    fn missing_verdict_is_reported() {
        assert_eq!(Verdict::parse("Looks fine to me."), Verdict::Missing);
        assert_eq!(Verdict::parse(""), Verdict::Missing);
    }

    #[test]
    fn failures_map_to_terminal_states() {
        let rejected = PipelineError::VerificationRejected("recipe".into());
        assert_eq!(rejected.terminal_state(), RunState::Rejected);
        let failed = PipelineError::EmptyOutput(StepId::Analysis);
        assert_eq!(failed.terminal_state(), RunState::Aborted);
    }

    #[test]
    fn renders_request_placeholders() {
        let step = StepDefinition {
            id: StepId::Analysis,
            agent: AgentProfile {
                role: "Analyst".into(),
                goal: String::new(),
                backstory: String::new(),
                max_iter: 1,
                tools: Vec::new(),
                allow_delegation: false,
            },
            description: "Read '{file_path}' and answer: {query}".into(),
            expected_output: String::new(),
            context: Vec::new(),
            gates_pipeline: false,
        };
        let request = PipelineRequest {
            query: "Should I invest?".into(),
            file_path: PathBuf::from("data/doc.pdf"),
        };
        assert_eq!(
            step.render_description(&request),
            "Read 'data/doc.pdf' and answer: Should I invest?"
        );
    }
}
