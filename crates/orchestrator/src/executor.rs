use std::collections::HashMap;
use std::sync::Arc;

use db::{AnalysisResultRepository, DbError, PhasePromptRepository, ReferenceDocumentRepository};
use events::{Event, EventBus};
use llm::{
    analyze_validated, ChatClient, ChatMessage, ChatRequest, OutputValidator, Retriever,
    RetryPolicy, DEFAULT_MODEL,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use vyve_core::{
    extract_key_findings, parse_verification_score, phase_catalog, sanitize_content,
    AnalysisMetadata, AnalysisResult, AnalysisStatus, PhaseCategory, PhasePrompt, PipelineStep,
    StepStatus, TokenUsage,
};

use crate::error::{OrchestratorError, Result};
use crate::locks::PhaseLocks;
use crate::prompts::PhasePrompts;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub default_model: String,
    pub retry_policy: RetryPolicy,
    pub validator: OutputValidator,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            retry_policy: RetryPolicy::default(),
            validator: OutputValidator::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_validator(mut self, validator: OutputValidator) -> Self {
        self.validator = validator;
        self
    }
}

/// Catalog entry joined with the stored status of that phase.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PhaseStatus {
    pub phase_number: i64,
    pub name: String,
    pub description: String,
    pub category: PhaseCategory,
    /// `None` when the phase has never been run
    pub status: Option<AnalysisStatus>,
    pub running: bool,
}

/// Runs the fixed eight-step analysis pipeline for a phase and owns the
/// phase's result row while doing so.
pub struct PhaseOrchestrator {
    chat: Arc<dyn ChatClient>,
    retriever: Arc<dyn Retriever>,
    prompts: PhasePromptRepository,
    documents: ReferenceDocumentRepository,
    results: AnalysisResultRepository,
    event_bus: Option<EventBus>,
    config: ExecutorConfig,
    locks: PhaseLocks,
}

impl PhaseOrchestrator {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        retriever: Arc<dyn Retriever>,
        prompts: PhasePromptRepository,
        documents: ReferenceDocumentRepository,
        results: AnalysisResultRepository,
    ) -> Self {
        Self {
            chat,
            retriever,
            prompts,
            documents,
            results,
            event_bus: None,
            config: ExecutorConfig::default(),
            locks: PhaseLocks::default(),
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares `locks` with other writers of result rows, such as
    /// [`crate::AnalysisAdjuster`].
    pub fn with_phase_locks(mut self, locks: PhaseLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn phase_locks(&self) -> PhaseLocks {
        self.locks.clone()
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }

    /// Runs every step for `phase_number` and returns the stored result.
    /// The phase's lock is held from the precondition check until the
    /// final write.
    ///
    /// Precondition failures return before anything is written. Any later
    /// failure is recorded on the row (status `error`, every step settled)
    /// before the error is returned.
    pub async fn run_phase(&self, phase_number: i64, model: &str) -> Result<AnalysisResult> {
        let _guard = self.locks.acquire(phase_number).await;
        let prompt = self.check_preconditions(phase_number).await?;

        info!(phase = phase_number, model = %model, "Starting phase analysis");
        let mut run = self.start_run(phase_number, model).await?;
        self.emit(Event::PhaseStarted {
            phase_number,
            model: model.to_string(),
        });

        match self.execute(&mut run, &prompt, model).await {
            Ok(()) => {
                let score = run.result.metadata.verification_score;
                info!(
                    phase = phase_number,
                    version = run.result.version,
                    verification_score = ?score,
                    "Phase analysis completed"
                );
                self.emit(Event::PhaseCompleted {
                    phase_number,
                    verification_score: score,
                });
                Ok(run.result)
            }
            Err(err) => {
                error!(phase = phase_number, error = %err, "Phase analysis failed");
                run.fail(&err.to_string()).await;
                self.emit(Event::PhaseFailed {
                    phase_number,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Checks that `phase_number` has a prompt and, past phase 0, a
    /// completed predecessor. Nothing is written.
    pub async fn check_preconditions(&self, phase_number: i64) -> Result<PhasePrompt> {
        if phase_number < 0 {
            return Err(OrchestratorError::UnknownPhase(phase_number));
        }

        let prompt = self
            .prompts
            .find(phase_number, 0)
            .await?
            .ok_or(OrchestratorError::PromptNotFound(phase_number))?;

        if phase_number > 0 {
            let previous = phase_number - 1;
            let completed = self
                .results
                .find_by_phase(previous)
                .await?
                .map(|result| result.is_completed())
                .unwrap_or(false);

            if !completed {
                return Err(OrchestratorError::PreconditionFailed {
                    phase: phase_number,
                    missing_phase: previous,
                });
            }
        }

        Ok(prompt)
    }

    async fn start_run(&self, phase_number: i64, model: &str) -> Result<StepRun<'_>> {
        let result = match self.results.find_by_phase(phase_number).await? {
            Some(mut existing) => {
                let expected = existing.version;
                existing.begin_run(model);
                self.results.save_progress(&existing, Some(expected)).await?
            }
            None => {
                self.results
                    .save_progress(&AnalysisResult::new(phase_number, model), None)
                    .await?
            }
        };

        let run = StepRun {
            results: &self.results,
            event_bus: self.event_bus.as_ref(),
            result,
            usage: TokenUsage::default(),
        };
        run.announce(PipelineStep::InitialSetup, StepStatus::InProgress);
        Ok(run)
    }

    async fn execute(&self, run: &mut StepRun<'_>, prompt: &PhasePrompt, model: &str) -> Result<()> {
        let phase_number = prompt.phase_number;

        run.complete(
            PipelineStep::InitialSetup,
            json!({
                "hasPrompt": true,
                "documentCount": prompt.document_ids.len(),
                "model": model,
            }),
        )
        .await?;

        run.begin(PipelineStep::DocumentRetrieval).await?;
        let lookup = self.documents.find_by_ids(&prompt.document_ids).await?;
        if !lookup.missing.is_empty() {
            warn!(
                phase = phase_number,
                missing = ?lookup.missing,
                "Reference documents not found"
            );
        }
        let previous_results = self.previous_results(phase_number).await?;
        run.complete(
            PipelineStep::DocumentRetrieval,
            json!({
                "documentCount": lookup.found.len(),
                "missingDocumentIds": lookup.missing,
                "hasPreviousResults": !previous_results.is_empty(),
            }),
        )
        .await?;

        run.begin(PipelineStep::VectorQuery).await?;
        let question = PhasePrompts::question(&prompt.prompt_text);
        let retrieval = self.retriever.retrieve(question, model).await;
        let details = match &retrieval.error {
            Some(error) => json!({ "documentCount": 0, "degraded": true, "error": error }),
            None => json!({ "documentCount": retrieval.citations.len() }),
        };
        run.complete(PipelineStep::VectorQuery, details).await?;

        run.begin(PipelineStep::FrameworkAnalysis).await?;
        let sections = PhasePrompts::citation_sections(&retrieval.citations);
        let frameworks = PhasePrompts::frameworks(&lookup.found);
        if sections.is_empty() && frameworks.is_empty() {
            return Err(OrchestratorError::NoContext);
        }
        let context = PhasePrompts::analysis_context(&sections, &frameworks);
        let system = PhasePrompts::phase_system(phase_number, &context, &previous_results);
        let framework = self
            .chat
            .chat_complete(ChatRequest::new(
                model,
                vec![ChatMessage::system(system), ChatMessage::user(question)],
            ))
            .await?;
        run.usage += framework.usage;
        let framework_output = non_empty(framework.content, PipelineStep::FrameworkAnalysis)?;
        run.complete(
            PipelineStep::FrameworkAnalysis,
            json!({
                "analysisLength": framework_output.chars().count(),
                "citationCount": retrieval.citations.len(),
                "hasFrameworks": !frameworks.is_empty(),
            }),
        )
        .await?;

        run.begin(PipelineStep::ModelAnalysis).await?;
        let validated = analyze_validated(
            self.chat.as_ref(),
            ChatRequest::new(
                model,
                vec![
                    ChatMessage::system(context),
                    ChatMessage::user(framework_output),
                ],
            ),
            &self.config.validator,
            &self.config.retry_policy,
        )
        .await?;
        run.usage += validated.usage;
        let attempts = validated.attempts();
        let valid = validated.is_valid();
        let analysis = non_empty(validated.response.content, PipelineStep::ModelAnalysis)?;
        run.complete(
            PipelineStep::ModelAnalysis,
            json!({
                "responseLength": analysis.chars().count(),
                "attempts": attempts,
                "valid": valid,
            }),
        )
        .await?;

        run.begin(PipelineStep::FormatVerification).await?;
        let formatted = self
            .chat
            .chat_complete(ChatRequest::new(
                model,
                vec![ChatMessage::user(PhasePrompts::format_verification(
                    &prompt.prompt_text,
                    &analysis,
                ))],
            ))
            .await?;
        run.usage += formatted.usage;
        let formatted = non_empty(formatted.content, PipelineStep::FormatVerification)?;
        run.complete(
            PipelineStep::FormatVerification,
            json!({ "verificationLength": formatted.chars().count() }),
        )
        .await?;

        run.begin(PipelineStep::FinalVerification).await?;
        let verification = self
            .chat
            .chat_complete(ChatRequest::new(
                model,
                vec![ChatMessage::user(PhasePrompts::final_verification(
                    &prompt.prompt_text,
                    &formatted,
                ))],
            ))
            .await?;
        run.usage += verification.usage;
        let score = parse_verification_score(&verification.content);
        run.complete(
            PipelineStep::FinalVerification,
            json!({ "verificationScore": score }),
        )
        .await?;

        run.begin(PipelineStep::SavingResults).await?;
        run.finish(sanitize_content(&formatted), score).await
    }

    /// Completed results of every earlier phase, oldest first.
    async fn previous_results(&self, phase_number: i64) -> Result<String> {
        let mut parts = Vec::new();
        for previous in 0..phase_number {
            match self.results.find_by_phase(previous).await? {
                Some(result) if result.is_completed() => {
                    parts.push(PhasePrompts::previous_result(previous, &result.content));
                }
                _ => debug!(phase = previous, "No completed result to include"),
            }
        }
        Ok(parts.join("\n\n"))
    }

    /// Deletes every stored result.
    pub async fn clear_results(&self) -> Result<u64> {
        let count = self.results.clear().await?;
        info!(count, "Cleared analysis results");
        self.emit(Event::ResultsCleared { count });
        Ok(count)
    }

    pub async fn phase_statuses(&self) -> Result<Vec<PhaseStatus>> {
        let stored: HashMap<i64, AnalysisStatus> =
            self.results.statuses().await?.into_iter().collect();

        let mut statuses = Vec::new();
        for info in phase_catalog() {
            statuses.push(PhaseStatus {
                phase_number: info.phase_number,
                name: info.name.to_string(),
                description: info.description.to_string(),
                category: info.category,
                status: stored.get(&info.phase_number).copied(),
                running: self.locks.is_held(info.phase_number).await,
            });
        }
        Ok(statuses)
    }
}

const FAILURE_WRITE_ATTEMPTS: usize = 3;

/// The step a failure is charged to: the one in progress, else the first
/// step not yet settled.
fn failed_step(metadata: &AnalysisMetadata) -> Option<PipelineStep> {
    metadata.current_step().or_else(|| {
        PipelineStep::ALL.into_iter().find(|step| {
            metadata
                .step(*step)
                .map(|log| !log.status.is_settled())
                .unwrap_or(true)
        })
    })
}

fn non_empty(content: String, step: PipelineStep) -> Result<String> {
    if content.trim().is_empty() {
        Err(OrchestratorError::empty_output(step.name()))
    } else {
        Ok(content)
    }
}

/// The row being written by one run, with the version it was last saved at.
struct StepRun<'a> {
    results: &'a AnalysisResultRepository,
    event_bus: Option<&'a EventBus>,
    result: AnalysisResult,
    usage: TokenUsage,
}

impl StepRun<'_> {
    fn announce(&self, step: PipelineStep, status: StepStatus) {
        debug!(
            phase = self.result.phase_number,
            step = %step,
            status = status.as_str(),
            "Step updated"
        );
        if let Some(bus) = self.event_bus {
            bus.emit(Event::StepUpdated {
                phase_number: self.result.phase_number,
                step: step.name().to_string(),
                status: status.as_str().to_string(),
            });
        }
    }

    async fn persist(&mut self) -> Result<()> {
        self.result = self
            .results
            .save_progress(&self.result, Some(self.result.version))
            .await?;
        Ok(())
    }

    async fn begin(&mut self, step: PipelineStep) -> Result<()> {
        self.result
            .metadata
            .update_step(step, StepStatus::InProgress, None);
        self.persist().await?;
        self.announce(step, StepStatus::InProgress);
        Ok(())
    }

    async fn complete(&mut self, step: PipelineStep, details: Value) -> Result<()> {
        self.result
            .metadata
            .update_step(step, StepStatus::Completed, Some(details));
        self.persist().await?;
        self.announce(step, StepStatus::Completed);
        Ok(())
    }

    async fn finish(&mut self, content: String, score: Option<u8>) -> Result<()> {
        self.result
            .metadata
            .status
            .validate_transition(AnalysisStatus::Completed)?;

        let key_findings = extract_key_findings(&content);
        let content_length = content.chars().count();
        let metadata = &mut self.result.metadata;
        metadata.usage = Some(self.usage);
        metadata.key_findings = Some(key_findings);
        metadata.verification_score = score;
        metadata.error = None;
        metadata.status = AnalysisStatus::Completed;
        metadata.update_step(
            PipelineStep::SavingResults,
            StepStatus::Completed,
            Some(json!({ "contentLength": content_length })),
        );
        self.result.content = content;

        self.result = self
            .results
            .save_final(&self.result, Some(self.result.version))
            .await?;
        self.announce(PipelineStep::SavingResults, StepStatus::Completed);
        Ok(())
    }

    /// Records the failure on the row. When another writer moved the row
    /// on, the failure is applied to the fresh copy and written again. A
    /// write failure that survives the retries is logged only; the caller
    /// returns the original error.
    async fn fail(&mut self, message: &str) {
        let phase_number = self.result.phase_number;
        let usage = self.usage;
        let mut failed = None;

        for attempt in 1..=FAILURE_WRITE_ATTEMPTS {
            failed = failed_step(&self.result.metadata);
            self.result.metadata.fail(failed, message);
            if usage.total_tokens > 0 {
                self.result.metadata.usage = Some(usage);
            }

            match self.persist().await {
                Ok(()) => break,
                Err(OrchestratorError::Database(DbError::VersionConflict { .. }))
                    if attempt < FAILURE_WRITE_ATTEMPTS =>
                {
                    warn!(
                        phase = phase_number,
                        attempt, "Result changed while recording failure, reloading"
                    );
                    match self.results.find_by_phase(phase_number).await {
                        Ok(Some(fresh)) => self.result = fresh,
                        Ok(None) => {
                            warn!(phase = phase_number, "Result removed before failure was recorded");
                            break;
                        }
                        Err(err) => {
                            error!(phase = phase_number, error = %err, "Failed to reload result");
                            break;
                        }
                    }
                }
                Err(err) => {
                    error!(
                        phase = phase_number,
                        error = %err,
                        "Failed to record phase failure"
                    );
                    break;
                }
            }
        }

        if let Some(step) = failed {
            self.announce(step, StepStatus::Error);
        }
    }
}
