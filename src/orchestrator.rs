//! Orchestrator - the primary entry points.
//!
//! `process` drives a single-model request through analysis, classification,
//! selection, admission, the timed adapter call, quality control, and
//! post-flight reconciliation. `process_collaborative` hands a coding
//! request to the collaborative pipeline. Every failure surfaces as a
//! synthetic response with an error code, zero usage, and measured latency.

use crate::agent::{AgentError, GenerateOptions};
use crate::analyzer::QueryAnalyzer;
use crate::api::{ErrorCode, Request, Response, TokenUsage, MAX_PROMPT_CHARS};
use crate::budget::BudgetLedger;
use crate::collab::{self, CodingSession, CollaborativeOrchestrator};
use crate::config::StrataConfig;
use crate::cost::CostCalculator;
use crate::pricing::PricingTable;
use crate::quality::QualityController;
use crate::registry::{Model, ProviderRegistry};
use crate::routing::Router;
use crate::store::{
    AnalysisRecord, ConversationStore, MemoryConversationStore, MemoryTraceSink, TraceSink,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Executes a prompt against a specific model and reconciles the outcome.
///
/// The quality controller and the collaborative pipeline both re-enter
/// execution through this seam.
#[async_trait]
pub trait ModelExecutor: Send + Sync {
    async fn execute(&self, model: &Model, prompt: &str, session_id: &str) -> Response;
}

/// The default executor: timed adapter call plus ledger reconciliation.
pub struct Executor {
    registry: Arc<ProviderRegistry>,
    ledger: Arc<BudgetLedger>,
    timeout: Duration,
}

impl Executor {
    /// Create an executor with the given adapter-call deadline.
    pub fn new(registry: Arc<ProviderRegistry>, ledger: Arc<BudgetLedger>, timeout: Duration) -> Self {
        Self {
            registry,
            ledger,
            timeout,
        }
    }
}

#[async_trait]
impl ModelExecutor for Executor {
    async fn execute(&self, model: &Model, prompt: &str, session_id: &str) -> Response {
        let started = Instant::now();

        let agent = match self.registry.get_agent(&model.id) {
            Some(agent) => agent,
            None => {
                return Response::failure(
                    ErrorCode::ModelUnavailable,
                    format!("no adapter registered for model '{}'", model.id),
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let options = GenerateOptions::default()
            .with_timeout(self.timeout)
            .with_max_tokens(model.max_tokens);

        let outcome = tokio::time::timeout(self.timeout, agent.generate(prompt, &options)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                self.registry.mark_healthy(&model.id);
                let cost = self.ledger.post_request_processing(
                    session_id,
                    &model.id,
                    model.tier,
                    &output.token_usage,
                    latency_ms,
                    true,
                );
                Response {
                    success: true,
                    model_used: model.id.clone(),
                    tier_used: model.tier,
                    text: output.text,
                    token_usage: output.token_usage,
                    cost,
                    latency_ms,
                    fallback_used: false,
                    tier_escalated: false,
                    error: None,
                }
            }
            Ok(Err(err)) => {
                if matches!(err, AgentError::Network(_)) {
                    self.registry.mark_unhealthy(&model.id);
                }
                self.ledger.post_request_processing(
                    session_id,
                    &model.id,
                    model.tier,
                    &TokenUsage::zero(),
                    latency_ms,
                    false,
                );
                tracing::warn!(model = %model.id, error = %err, "adapter call failed");
                let mut response =
                    Response::failure(err.error_code(), err.to_string(), latency_ms)
                        .with_cause(err.to_string());
                response.model_used = model.id.clone();
                response.tier_used = model.tier;
                response
            }
            Err(_) => {
                self.ledger.post_request_processing(
                    session_id,
                    &model.id,
                    model.tier,
                    &TokenUsage::zero(),
                    latency_ms,
                    false,
                );
                tracing::warn!(
                    model = %model.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "adapter call timed out"
                );
                let mut response = Response::failure(
                    ErrorCode::Timeout,
                    format!("adapter call exceeded {}ms", self.timeout.as_millis()),
                    latency_ms,
                );
                response.model_used = model.id.clone();
                response.tier_used = model.tier;
                response
            }
        }
    }
}

/// The orchestrator core.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    ledger: Arc<BudgetLedger>,
    analyzer: QueryAnalyzer,
    router: Router,
    quality: QualityController,
    collab: CollaborativeOrchestrator,
    executor: Arc<Executor>,
    conversations: Arc<dyn ConversationStore>,
    sink: Arc<dyn TraceSink>,
    /// Gate for prompt/response text in debug logs (off by default)
    log_content: bool,
}

impl Orchestrator {
    /// Assemble the core from configuration, a registry, and a pricing table,
    /// with explicit store implementations.
    pub fn new(
        config: StrataConfig,
        registry: Arc<ProviderRegistry>,
        pricing: Arc<PricingTable>,
        conversations: Arc<dyn ConversationStore>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        let calculator = CostCalculator::new(pricing);
        let ledger = Arc::new(BudgetLedger::new(config.budget.clone(), calculator));
        let analyzer = QueryAnalyzer::new(config.analyzer.clone());
        let router = Router::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            config.routing.clone(),
        );
        let quality = QualityController::new(Arc::clone(&registry), config.collaboration.clone());
        let collab =
            CollaborativeOrchestrator::new(Arc::clone(&registry), config.collaboration.clone());
        let executor = Arc::new(Executor::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Duration::from_millis(config.routing.timeout_ms),
        ));

        Self {
            registry,
            ledger,
            analyzer,
            router,
            quality,
            collab,
            executor,
            conversations,
            sink,
            log_content: config.logging.log_prompt_content,
        }
    }

    /// Assemble the core with in-memory stores.
    pub fn with_memory_stores(
        config: StrataConfig,
        registry: Arc<ProviderRegistry>,
        pricing: Arc<PricingTable>,
    ) -> Self {
        Self::new(
            config,
            registry,
            pricing,
            Arc::new(MemoryConversationStore::new()),
            Arc::new(MemoryTraceSink::new()),
        )
    }

    /// The budget ledger (utilization, sessions, alerts).
    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// The provider registry.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    fn validate_prompt(prompt: &str, started: Instant) -> Option<Response> {
        if prompt.is_empty() {
            return Some(Response::failure(
                ErrorCode::OrchestratorError,
                "prompt must not be empty",
                started.elapsed().as_millis() as u64,
            ));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Some(Response::failure(
                ErrorCode::OrchestratorError,
                format!("prompt exceeds {} characters", MAX_PROMPT_CHARS),
                started.elapsed().as_millis() as u64,
            ));
        }
        None
    }

    /// Process a single request end to end.
    pub async fn process(&self, request: &Request) -> Response {
        let started = Instant::now();

        if let Some(rejection) = Self::validate_prompt(&request.prompt, started) {
            return rejection;
        }

        let session_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.ledger
            .sessions()
            .open(&session_id, request.user_metadata.clone());

        if self.log_content {
            tracing::debug!(session = %session_id, prompt = %request.prompt, "request content");
        }

        let context = match &request.conversation_id {
            Some(conversation_id) => self.conversations.build_context(conversation_id).await,
            None => None,
        };

        let analysis = self.analyzer.analyze(&request.prompt, context.as_ref());
        let task_type = self.router.classify(request, &analysis);

        let selection = match self.router.select(request, task_type, &analysis, &session_id) {
            Ok(selection) => selection,
            Err(err) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(task = %task_type, error = %err, "routing failed");
                self.sink
                    .track_error(
                        "routing",
                        &err.to_string(),
                        HashMap::from([("task_type".to_string(), task_type.to_string())]),
                    )
                    .await;
                return Response::failure(err.error_code(), err.to_string(), latency_ms);
            }
        };

        for warning in &selection.admission.warnings {
            tracing::warn!(model = %selection.model.id, %warning, "budget warning");
        }

        let mut response = self
            .executor
            .execute(&selection.model, &request.prompt, &session_id)
            .await;
        response.fallback_used |= selection.fallback_used;

        if self.quality.should_cascade(&response, analysis.confidence) {
            response = self
                .quality
                .cascade(
                    self.executor.as_ref(),
                    request,
                    &selection.model,
                    response,
                    &session_id,
                )
                .await;
        } else if self.quality.should_refine(&response, &selection.model) {
            response = self
                .quality
                .refine(
                    self.executor.as_ref(),
                    request,
                    response,
                    &selection.model,
                    &session_id,
                )
                .await;
        }

        response.latency_ms = started.elapsed().as_millis() as u64;

        if self.log_content {
            tracing::debug!(
                session = %session_id,
                model = %response.model_used,
                text = %response.text,
                "response content"
            );
        }

        self.trace(&analysis, task_type, &selection.model, &response)
            .await;

        if let Some(conversation_id) = &request.conversation_id {
            self.conversations
                .add_turn(conversation_id, request, &response)
                .await;
        }

        response
    }

    /// Process a request, aborting best-effort when the token fires.
    pub async fn process_cancellable(
        &self,
        request: &Request,
        cancel: CancellationToken,
    ) -> Response {
        let started = Instant::now();
        tokio::select! {
            response = self.process(request) => response,
            _ = cancel.cancelled() => {
                tracing::info!("request cancelled by caller");
                Response::failure(
                    ErrorCode::Timeout,
                    "request cancelled",
                    started.elapsed().as_millis() as u64,
                )
            }
        }
    }

    /// Run a collaborative coding session for the request.
    pub async fn process_collaborative(&self, request: &Request) -> CodingSession {
        let started = Instant::now();

        if Self::validate_prompt(&request.prompt, started).is_some() {
            let mut session = CodingSession::new(
                request.prompt.clone(),
                collab::DecompositionResult {
                    subtasks: vec![],
                    total_estimated_loc: 0,
                    suggested_approach: String::new(),
                    external_dependencies: vec![],
                },
            );
            session.fail("prompt failed validation");
            return session;
        }

        let session_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.ledger
            .sessions()
            .open(&session_id, request.user_metadata.clone());

        if self.log_content {
            tracing::debug!(session = %session_id, prompt = %request.prompt, "request content");
        }

        self.collab
            .run(self.executor.as_ref(), request, &session_id)
            .await
    }

    async fn trace(
        &self,
        analysis: &crate::analyzer::QueryAnalysis,
        task_type: crate::routing::TaskType,
        model: &Model,
        response: &Response,
    ) {
        self.sink
            .log_analysis(AnalysisRecord {
                request_id: Uuid::new_v4().to_string(),
                analysis: analysis.clone(),
                task_type: task_type.to_string(),
                model_selected: model.id.clone(),
                recorded_at: Utc::now(),
            })
            .await;

        self.sink
            .update_model_metrics(
                &response.model_used,
                response.latency_ms,
                response.cost.total_cost,
                response.success,
            )
            .await;

        self.sink.update_daily_costs(response.cost.total_cost).await;

        if let Some(error) = &response.error {
            self.sink
                .track_error(
                    "request",
                    &error.message,
                    HashMap::from([("code".to_string(), error.code.to_string())]),
                )
                .await;
        }
    }
}
