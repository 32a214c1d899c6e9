//! The fixed four-step financial analysis pipeline and the roles that execute it.

use crate::pipeline::types::{AgentProfile, PipelineError, StepDefinition, StepId};
use crate::tools::ToolKind;
use std::collections::HashSet;

/// Ordered, validated list of steps.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<StepDefinition>,
}

impl Pipeline {
    /// Validate and wrap a step list.
    ///
    /// Step ids must be unique, every context entry must name an earlier step, and at most one
    /// step may gate the run.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, PipelineError> {
        if steps.is_empty() {
            return Err(PipelineError::InvalidDefinition(
                "pipeline has no steps".into(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            for dependency in &step.context {
                if !seen.contains(dependency) {
                    return Err(PipelineError::InvalidDefinition(format!(
                        "step '{}' reads '{}' which does not run before it",
                        step.id, dependency
                    )));
                }
            }
            if !seen.insert(step.id) {
                return Err(PipelineError::InvalidDefinition(format!(
                    "duplicate step '{}'",
                    step.id
                )));
            }
            if step.agent.max_iter == 0 {
                return Err(PipelineError::InvalidDefinition(format!(
                    "role '{}' has a zero iteration budget",
                    step.agent.role
                )));
            }
        }

        if steps.iter().filter(|step| step.gates_pipeline).count() > 1 {
            return Err(PipelineError::InvalidDefinition(
                "only one step may gate the pipeline".into(),
            ));
        }

        Ok(Self { steps })
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Distinct roles participating in the pipeline, in first-appearance order.
    pub fn roster(&self) -> Vec<AgentProfile> {
        let mut roster: Vec<AgentProfile> = Vec::new();
        for step in &self.steps {
            if !roster.iter().any(|agent| agent.role == step.agent.role) {
                roster.push(step.agent.clone());
            }
        }
        roster
    }
}

/// Compliance officer confirming the upload is a genuine financial report.
pub fn verifier() -> AgentProfile {
    AgentProfile {
        role: "Financial Document Verifier".into(),
        goal: "Ensure the provided document is a valid and relevant financial report. \
               Verify the document's authenticity and check for any obvious inconsistencies \
               or missing data. Your decision is final."
            .into(),
        backstory: "You are a compliance officer with an eagle eye for detail. Your entire \
                    career has been dedicated to ensuring the integrity of financial documents. \
                    You cross-reference every piece of data and are trusted to flag any \
                    document that doesn't meet the highest standards of financial reporting. \
                    You are methodical and thorough."
            .into(),
        max_iter: 3,
        tools: vec![ToolKind::FileRead],
        allow_delegation: false,
    }
}

/// Analyst extracting metrics and trends from the document.
pub fn financial_analyst() -> AgentProfile {
    AgentProfile {
        role: "Senior Financial Analyst".into(),
        goal: "Provide a detailed and data-driven analysis of a given financial document. \
               Your analysis must be objective, meticulous, and based solely on the \
               information present in the document."
            .into(),
        backstory: "With a Ph.D. in Finance and over 15 years of experience at top-tier \
                    investment banks, you are a master of financial analysis. Your expertise \
                    lies in dissecting complex financial statements, identifying key \
                    performance indicators (KPIs), and uncovering underlying trends. You are \
                    known for your precision, objectivity, and a deep understanding of market \
                    dynamics. You do not make speculative claims; every insight is backed by \
                    hard data from the report."
            .into(),
        max_iter: 5,
        tools: vec![ToolKind::FileRead, ToolKind::WebSearch],
        allow_delegation: true,
    }
}

/// Risk specialist stress-testing the analysis against market conditions.
pub fn risk_assessor() -> AgentProfile {
    AgentProfile {
        role: "Financial Risk Assessment Specialist".into(),
        goal: "Identify, analyze, and quantify potential risks associated with the investment \
               opportunity. Provide a detailed report on market, credit, and operational \
               risks, along with potential mitigation strategies."
            .into(),
        backstory: "As a Chartered Financial Analyst (CFA) specializing in risk management, you \
                    see what others miss. You excel at stress-testing financial models and \
                    identifying potential vulnerabilities in an investment strategy. Your job \
                    is not to predict the future, but to prepare for it by providing a \
                    clear-eyed view of all potential risks. Your reports are critical for \
                    making informed, risk-aware investment decisions."
            .into(),
        max_iter: 5,
        tools: vec![ToolKind::WebSearch],
        allow_delegation: false,
    }
}

/// Planner turning analysis and risks into a recommendation.
pub fn investment_advisor() -> AgentProfile {
    AgentProfile {
        role: "Prudent Investment Advisor".into(),
        goal: "Based on the financial analysis, develop a balanced and strategic investment \
               recommendation. Your advice should consider the user's long-term goals, risk \
               tolerance, and the overall market conditions."
            .into(),
        backstory: "You are a seasoned Certified Financial Planner (CFP) with a reputation for \
                    creating sensible, diversified investment portfolios. You avoid hype and \
                    focus on sustainable, long-term growth. You translate complex financial \
                    data into clear, actionable advice, helping clients navigate the market \
                    with confidence. Your recommendations are always well-reasoned and clearly \
                    justified."
            .into(),
        max_iter: 5,
        tools: vec![ToolKind::WebSearch],
        allow_delegation: true,
    }
}

/// Build the verify → analyze → assess risk → recommend pipeline.
pub fn financial_pipeline() -> Pipeline {
    let steps = vec![
        StepDefinition {
            id: StepId::Verification,
            agent: verifier(),
            description: "Verify that the document at the given file path, '{file_path}', is a \
                          legitimate financial report. Check for standard financial sections \
                          like 'Income Statement', 'Balance Sheet', and 'Cash Flow Statement'. \
                          If the document is not a valid financial report, you MUST reject it \
                          and explain the issue."
                .into(),
            expected_output: "The first line must be exactly `VERDICT: VALID` or \
                              `VERDICT: INVALID - <reason>`. Follow it with a short \
                              confirmation of the sections found, or the reason the document \
                              was rejected."
                .into(),
            context: Vec::new(),
            gates_pipeline: true,
        },
        StepDefinition {
            id: StepId::Analysis,
            agent: financial_analyst(),
            description: "Analyze the financial document at '{file_path}' in detail. Extract \
                          key financial metrics, such as revenue, profit margins, and cash \
                          flow. Identify major trends, growth drivers, and potential areas of \
                          concern. Your analysis should be comprehensive and based exclusively \
                          on the data in the document. The user has the following query: \
                          {query}"
                .into(),
            expected_output: "A detailed, multi-paragraph financial analysis report formatted \
                              in markdown. The report should include sections for Key Metrics, \
                              Trends, and a Concluding Summary."
                .into(),
            context: vec![StepId::Verification],
            gates_pipeline: false,
        },
        StepDefinition {
            id: StepId::RiskAssessment,
            agent: risk_assessor(),
            description: "Based on the financial analysis, conduct a thorough risk assessment. \
                          Identify potential market, credit, and operational risks. Use the \
                          search tool to find current market conditions and assess how they \
                          might impact the company's financial health."
                .into(),
            expected_output: "A markdown report detailing potential risks, categorized by type \
                              (Market, Credit, Operational). For each risk, provide a brief \
                              explanation and a potential mitigation strategy."
                .into(),
            context: vec![StepId::Analysis],
            gates_pipeline: false,
        },
        StepDefinition {
            id: StepId::Recommendation,
            agent: investment_advisor(),
            description: "Synthesize the financial analysis and risk assessment to provide a \
                          comprehensive investment recommendation. Your recommendation should \
                          be balanced, considering both the potential upside and the \
                          identified risks. Address the original user query: {query}"
                .into(),
            expected_output: "A final, client-ready investment report in markdown format. It \
                              should include:\n1. A summary of the financial analysis.\n2. A \
                              summary of the key risks.\n3. A clear investment recommendation \
                              (e.g., Buy, Hold, Sell).\n4. Justification for the \
                              recommendation, citing specific data points from the analysis."
                .into(),
            context: vec![StepId::Analysis, StepId::RiskAssessment],
            gates_pipeline: false,
        },
    ];

    Pipeline::new(steps).expect("built-in pipeline definition is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn financial_pipeline_runs_in_declared_order() {
        let pipeline = financial_pipeline();
        let order: Vec<StepId> = pipeline.steps().iter().map(|step| step.id).collect();
        assert_eq!(
            order,
            vec![
                StepId::Verification,
                StepId::Analysis,
                StepId::RiskAssessment,
                StepId::Recommendation
            ]
        );
        assert!(pipeline.steps()[0].gates_pipeline);
        assert_eq!(
            pipeline.steps()[3].context,
            vec![StepId::Analysis, StepId::RiskAssessment]
        );
    }

    #[test]
    fn roles_carry_expected_permissions() {
        assert_eq!(verifier().tools, vec![ToolKind::FileRead]);
        assert!(!verifier().allow_delegation);
        assert_eq!(risk_assessor().tools, vec![ToolKind::WebSearch]);
        assert!(investment_advisor().allow_delegation);
        assert_eq!(financial_pipeline().roster().len(), 4);
    }

    #[test]
    fn rejects_forward_context_references() {
        let mut steps = financial_pipeline().steps().to_vec();
        steps.swap(1, 2);
        let error = Pipeline::new(steps).expect_err("forward reference");
        assert!(error.to_string().contains("does not run before it"));
    }

    #[test]
    fn rejects_duplicate_steps() {
        let mut steps = financial_pipeline().steps().to_vec();
        let mut copy = steps[1].clone();
        copy.context = vec![StepId::Verification];
        steps.push(copy);
        let error = Pipeline::new(steps).expect_err("duplicate");
        assert!(error.to_string().contains("duplicate step"));
    }

    #[test]
    fn rejects_empty_pipeline() {
        assert!(Pipeline::new(Vec::new()).is_err());
    }
}
