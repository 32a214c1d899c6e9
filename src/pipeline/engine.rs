//! Sequential pipeline engine.

use crate::config::GateMode;
use crate::llm::LlmClient;
use crate::pipeline::agent::StepAgent;
use crate::pipeline::definition::Pipeline;
use crate::pipeline::types::{
    AgentProfile, PipelineError, PipelineRequest, PipelineRun, RunState, StepDefinition,
    StepOutput, Verdict,
};
use crate::tools::ToolBox;
use std::sync::Arc;
use uuid::Uuid;

/// Runs a [`Pipeline`] step by step, threading declared context between steps.
///
/// The engine holds the long-lived backend and tool handles; construct it once at start-up and
/// share it through an `Arc`. Each call to [`PipelineEngine::run`] is independent.
pub struct PipelineEngine {
    pipeline: Pipeline,
    roster: Vec<AgentProfile>,
    agent: StepAgent,
    gate: GateMode,
}

impl PipelineEngine {
    /// Build an engine for `pipeline`.
    pub fn new(
        pipeline: Pipeline,
        llm: Arc<dyn LlmClient>,
        tools: ToolBox,
        gate: GateMode,
    ) -> Self {
        let roster = pipeline.roster();
        Self {
            pipeline,
            roster,
            agent: StepAgent::new(llm, tools),
            gate,
        }
    }

    /// Execute every step in order.
    ///
    /// Any step failure aborts the run. With [`GateMode::Enforce`], a rejected or missing
    /// verification verdict aborts it too, before any later step starts.
    /// [`PipelineError::terminal_state`] tells the two apart.
    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let mut state = RunState::Pending;
        let mut verdict = Verdict::Missing;
        let mut outputs: Vec<StepOutput> = Vec::with_capacity(self.pipeline.steps().len());
        tracing::info!(
            %run_id,
            steps = self.pipeline.steps().len(),
            file = %request.file_path.display(),
            gate = ?self.gate,
            "Pipeline run started"
        );

        for step in self.pipeline.steps() {
            tracing::info!(%run_id, step = %step.id, role = %step.agent.role, "Step started");
            let text = match self.execute_step(step, request, &outputs).await {
                Ok(text) => text,
                Err(error) => {
                    tracing::error!(
                        %run_id,
                        step = %step.id,
                        from = ?state,
                        to = ?error.terminal_state(),
                        error = %error,
                        "Pipeline run aborted"
                    );
                    return Err(error);
                }
            };
            tracing::info!(%run_id, step = %step.id, chars = text.len(), "Step completed");
            outputs.push(StepOutput {
                step: step.id,
                role: step.agent.role.clone(),
                text,
            });

            if step.gates_pipeline {
                let latest = &outputs[outputs.len() - 1];
                verdict = Verdict::parse(&latest.text);
                if let Err(error) = self.apply_gate(run_id, &verdict) {
                    tracing::warn!(
                        %run_id,
                        from = ?state,
                        to = ?error.terminal_state(),
                        "Pipeline run stopped by verification gate"
                    );
                    return Err(error);
                }
                state = RunState::Verified;
            }
        }

        tracing::info!(
            %run_id,
            from = ?state,
            to = ?RunState::Completed,
            ?verdict,
            "Pipeline run finished"
        );
        Ok(PipelineRun {
            run_id,
            verdict,
            outputs,
        })
    }

    async fn execute_step(
        &self,
        step: &StepDefinition,
        request: &PipelineRequest,
        completed: &[StepOutput],
    ) -> Result<String, PipelineError> {
        let mut context = Vec::with_capacity(step.context.len());
        for dependency in &step.context {
            let output = completed
                .iter()
                .find(|output| output.step == *dependency)
                .filter(|output| !output.text.trim().is_empty())
                .ok_or(PipelineError::MissingContext {
                    step: step.id,
                    dependency: *dependency,
                })?;
            context.push(output);
        }
        self.agent
            .execute(step, request, &context, &self.roster)
            .await
    }

    fn apply_gate(&self, run_id: Uuid, verdict: &Verdict) -> Result<(), PipelineError> {
        match (verdict, self.gate) {
            (Verdict::Valid, _) => {
                tracing::info!(%run_id, "Document verified");
                Ok(())
            }
            (Verdict::Invalid(reason), GateMode::Enforce) => {
                tracing::warn!(%run_id, reason = %reason, "Document rejected");
                Err(PipelineError::VerificationRejected(reason.clone()))
            }
            (Verdict::Missing, GateMode::Enforce) => {
                tracing::warn!(%run_id, "Verification returned no verdict");
                Err(PipelineError::VerificationRejected(
                    "verification step did not return a verdict".into(),
                ))
            }
            (verdict, GateMode::Advisory) => {
                tracing::warn!(
                    %run_id,
                    ?verdict,
                    "Verification not passed; continuing in advisory mode"
                );
                Ok(())
            }
        }
    }
}
