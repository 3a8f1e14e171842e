//! Request coordinator.
//!
//! Sequences execution runs and feedback analyses for one learner session.
//! A single actor task owns all session state; callers talk to it through a
//! cloneable [`CoordinatorHandle`]. Backend calls run in their own tasks and
//! report back to the actor tagged with the [`RequestGeneration`] they were
//! dispatched under, so visible state only ever reflects the latest dispatch
//! of each lane:
//!
//! - a run started while another is in flight races it; the older result is
//!   dropped when it arrives;
//! - every accepted execution result, code edit after the first run, or
//!   explicit analysis request (re)arms a debounce timer, and only the last
//!   trigger in a quiet period dispatches an analysis;
//! - starting a run cancels a pending analysis, and the run's completion
//!   arms a new one.
//!
//! The actor stops when every handle has been dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{EduRunError, Result};
use crate::execution::{ExecutionBackend, ExecutionClient, ExecutionRequest, ExecutionResult};
use crate::feedback::{FeedbackPipeline, FeedbackReport, FeedbackSource};
use crate::gemini::GeminiClient;
use crate::lane::{ExecutionLane, FeedbackLane, RequestGeneration};
use crate::timer::{DebounceTimer, TimerHandle};
use crate::websocket::{CoordinatorEvent, EventBroadcaster};

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 64;

// ============================================================================
// Public Types
// ============================================================================

/// A request to run learner code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Learner source code. Also becomes the current code buffer.
    pub code: String,
    /// Editor language; the configured default when absent.
    #[serde(default)]
    pub language: Option<String>,
    /// Only check syntax.
    #[serde(default)]
    pub syntax_only: bool,
}

impl RunRequest {
    /// A full run in the given language.
    #[must_use]
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: Some(language.into()),
            syntax_only: false,
        }
    }

    /// Makes this a syntax-only check.
    #[must_use]
    pub const fn syntax_only(mut self) -> Self {
        self.syntax_only = true;
        self
    }
}

/// Point-in-time copy of the coordinator's visible state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorSnapshot {
    /// Execution lane.
    pub execution: ExecutionLane,
    /// Feedback lane.
    pub feedback: FeedbackLane,
    /// Whether any execution result has been accepted.
    pub has_executed: bool,
    /// Current code buffer.
    pub code: String,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
enum Command {
    Run {
        request: RunRequest,
        reply: oneshot::Sender<RequestGeneration>,
    },
    UpdateCode {
        code: String,
    },
    RequestAnalysis,
    Snapshot {
        reply: oneshot::Sender<CoordinatorSnapshot>,
    },
}

#[derive(Debug)]
enum Completion {
    Execution {
        generation: RequestGeneration,
        result: ExecutionResult,
    },
    DebounceElapsed(TimerHandle),
    Feedback {
        generation: RequestGeneration,
        report: FeedbackReport,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    events: EventBroadcaster,
}

impl CoordinatorHandle {
    /// Dispatches a run and returns its generation.
    ///
    /// # Errors
    ///
    /// Returns `EduRunError::CoordinatorClosed` if the actor has stopped.
    pub async fn run(&self, request: RunRequest) -> Result<RequestGeneration> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Run { request, reply }).await?;
        rx.await.map_err(|_| EduRunError::CoordinatorClosed)
    }

    /// Replaces the code buffer. Re-arms analysis once something has run.
    ///
    /// # Errors
    ///
    /// Returns `EduRunError::CoordinatorClosed` if the actor has stopped.
    pub async fn update_code(&self, code: impl Into<String>) -> Result<()> {
        self.send(Command::UpdateCode { code: code.into() }).await
    }

    /// Fires one debounced analysis trigger.
    ///
    /// Ignored until a run has completed and while the code buffer is blank.
    ///
    /// # Errors
    ///
    /// Returns `EduRunError::CoordinatorClosed` if the actor has stopped.
    pub async fn request_analysis(&self) -> Result<()> {
        self.send(Command::RequestAnalysis).await
    }

    /// Returns a copy of the visible state.
    ///
    /// # Errors
    ///
    /// Returns `EduRunError::CoordinatorClosed` if the actor has stopped.
    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| EduRunError::CoordinatorClosed)
    }

    /// Subscribes to state transition events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EduRunError::CoordinatorClosed)
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Timing and default settings for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Language used when a run does not name one.
    pub default_language: String,
    /// Timeout for full runs.
    pub run_timeout_seconds: u64,
    /// Timeout for syntax checks.
    pub syntax_timeout_seconds: u64,
    /// Quiet period before an analysis is dispatched.
    pub debounce: Duration,
    /// Event buffer per subscriber.
    pub event_capacity: usize,
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_language: config.default_language.clone(),
            run_timeout_seconds: config.execution.run_timeout_seconds,
            syntax_timeout_seconds: config.execution.syntax_timeout_seconds,
            debounce: config.coordinator.debounce(),
            event_capacity: config.coordinator.event_capacity,
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// The coordinator actor.
pub struct RequestCoordinator {
    settings: CoordinatorSettings,
    executor: Arc<dyn ExecutionBackend>,
    feedback_source: Arc<dyn FeedbackSource>,
    events: EventBroadcaster,
    completions: mpsc::UnboundedSender<Completion>,
    code: String,
    has_executed: bool,
    execution: ExecutionLane,
    feedback: FeedbackLane,
    debounce: DebounceTimer,
}

impl RequestCoordinator {
    /// Starts a coordinator over the given backends.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        settings: CoordinatorSettings,
        executor: Arc<dyn ExecutionBackend>,
        feedback_source: Arc<dyn FeedbackSource>,
    ) -> CoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let events = EventBroadcaster::new(settings.event_capacity);

        let actor = Self {
            settings,
            executor,
            feedback_source,
            events: events.clone(),
            completions: completion_tx,
            code: String::new(),
            has_executed: false,
            execution: ExecutionLane::default(),
            feedback: FeedbackLane::default(),
            debounce: DebounceTimer::new(),
        };
        tokio::spawn(actor.run(command_rx, completion_rx));

        CoordinatorHandle {
            commands: command_tx,
            events,
        }
    }

    /// Starts a coordinator over the HTTP backends named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn spawn_from_config(config: &Config) -> Result<CoordinatorHandle> {
        let executor = Arc::new(ExecutionClient::new(config)?);
        let generative = Arc::new(GeminiClient::new(&config.feedback)?);
        let pipeline = Arc::new(FeedbackPipeline::new(
            generative,
            config.default_language.clone(),
        ));
        Ok(Self::spawn(CoordinatorSettings::from(config), executor, pipeline))
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        debug!("Request coordinator started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
            }
        }
        debug!("Request coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Run { request, reply } => {
                let generation = self.dispatch_execution(request);
                let _ = reply.send(generation);
            }
            Command::UpdateCode { code } => {
                self.code = code;
                if self.has_executed {
                    self.arm_analysis();
                }
            }
            Command::RequestAnalysis => self.arm_analysis(),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Execution { generation, result } => {
                self.accept_execution(generation, result);
            }
            Completion::DebounceElapsed(handle) => {
                if self.debounce.take_if_current(handle) {
                    self.dispatch_analysis();
                } else {
                    debug!(token = handle.token(), "Ignoring superseded debounce timer");
                }
            }
            Completion::Feedback { generation, report } => {
                self.accept_feedback(generation, report);
            }
        }
    }

    fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            execution: self.execution.clone(),
            feedback: self.feedback.clone(),
            has_executed: self.has_executed,
            code: self.code.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Execution lane
    // ------------------------------------------------------------------------

    fn dispatch_execution(&mut self, request: RunRequest) -> RequestGeneration {
        if self.debounce.cancel_armed() {
            debug!("New run cancelled pending analysis");
        }
        self.feedback.pending = false;

        let language = request
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_language.clone());
        self.code = request.code;

        let exec_request = if request.syntax_only {
            ExecutionRequest::syntax_check(self.code.clone(), language.clone())
                .with_timeout(self.settings.syntax_timeout_seconds)
        } else {
            ExecutionRequest::run(self.code.clone(), language.clone())
                .with_timeout(self.settings.run_timeout_seconds)
        };

        let generation = self.execution.dispatch(language.clone());
        info!(
            generation = generation.value(),
            language = %language,
            syntax_only = exec_request.syntax_only,
            "Dispatching execution"
        );
        self.events.send(CoordinatorEvent::execution_started(
            generation,
            language,
            exec_request.syntax_only,
        ));

        let executor = Arc::clone(&self.executor);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = executor.submit(&exec_request).await;
            let _ = completions.send(Completion::Execution { generation, result });
        });

        generation
    }

    fn accept_execution(&mut self, generation: RequestGeneration, result: ExecutionResult) {
        if !self.execution.complete(generation, result) {
            debug!(
                generation = generation.value(),
                latest = self.execution.generation.value(),
                "Discarding stale execution result"
            );
            return;
        }
        self.has_executed = true;

        let status = self.execution.status;
        info!(generation = generation.value(), status = ?status, "Execution completed");
        if let Some(result) = &self.execution.result {
            self.events.send(CoordinatorEvent::execution_completed(
                generation,
                status,
                result.clone(),
            ));
        }

        self.arm_analysis();
    }

    // ------------------------------------------------------------------------
    // Feedback lane
    // ------------------------------------------------------------------------

    /// Analysis needs a completed run and something to look at.
    fn can_analyze(&self) -> bool {
        self.has_executed && !self.code.trim().is_empty()
    }

    fn arm_analysis(&mut self) {
        if !self.can_analyze() {
            if self.debounce.cancel_armed() {
                debug!("Cancelled pending analysis: nothing to analyze");
            }
            self.feedback.pending = false;
            return;
        }

        let completions = self.completions.clone();
        let handle = self.debounce.schedule(self.settings.debounce, move |handle| {
            let _ = completions.send(Completion::DebounceElapsed(handle));
        });
        self.feedback.pending = true;
        debug!(
            token = handle.token(),
            delay = ?self.settings.debounce,
            "Analysis armed"
        );
    }

    fn dispatch_analysis(&mut self) {
        if !self.can_analyze() {
            self.feedback.pending = false;
            return;
        }

        let generation = self.feedback.dispatch();
        let language = self
            .execution
            .language
            .clone()
            .unwrap_or_else(|| self.settings.default_language.clone());
        let code = self.code.clone();
        let errors = self.execution.last_errors().to_vec();

        info!(
            generation = generation.value(),
            language = %language,
            prior_errors = errors.len(),
            "Dispatching analysis"
        );
        self.events.send(CoordinatorEvent::analysis_started(generation));

        let source = Arc::clone(&self.feedback_source);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let report = source.analyze(&language, &code, &errors).await;
            let _ = completions.send(Completion::Feedback { generation, report });
        });
    }

    fn accept_feedback(&mut self, generation: RequestGeneration, report: FeedbackReport) {
        let FeedbackReport { tier, bundle } = report;
        if !self.feedback.complete(generation, tier, bundle.clone()) {
            debug!(
                generation = generation.value(),
                latest = self.feedback.generation.value(),
                "Discarding stale feedback"
            );
            return;
        }

        info!(
            generation = generation.value(),
            tier = tier.level(),
            suggestions = bundle.suggestions.len(),
            "Feedback accepted"
        );
        self.events
            .send(CoordinatorEvent::feedback_ready(generation, tier, bundle));
    }
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("settings", &self.settings)
            .field("has_executed", &self.has_executed)
            .field("execution", &self.execution)
            .field("feedback", &self.feedback)
            .finish_non_exhaustive()
    }
}
