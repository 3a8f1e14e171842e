//! EduRun Orchestrator
//!
//! Runs learner code on the execution backend, asks the generative backend
//! for hints, and keeps both lanes of a session ordered and resilient.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod feedback;
pub mod gemini;
pub mod lane;
pub mod language;
pub mod prompt;
pub mod source;
pub mod timer;
pub mod websocket;

pub use api::{create_router, AppState, ErrorResponse, RunResponse, UpdateCodeRequest};
pub use config::{Config, CoordinatorConfig, ExecutionConfig, FeedbackConfig};
pub use coordinator::{
    CoordinatorHandle, CoordinatorSettings, CoordinatorSnapshot, RequestCoordinator, RunRequest,
};
pub use error::{Backend, EduRunError, ErrorClass, Result};
pub use execution::{
    BackendLanguage, ExecutionBackend, ExecutionClient, ExecutionRequest, ExecutionResult,
    SYNTAX_OK_LINE,
};
pub use feedback::{
    extract_json_object, parse_feedback, FeedbackBundle, FeedbackPipeline, FeedbackReport,
    FeedbackSource, FeedbackTier, GenerativeBackend, Suggestion, SuggestionKind, MAX_SUGGESTIONS,
};
pub use gemini::GeminiClient;
pub use lane::{ExecutionLane, ExecutionStatus, FeedbackLane, FeedbackStatus, RequestGeneration};
pub use language::{LanguageDescriptor, LanguageRegistry};
pub use prompt::{GenerationRequest, SamplingParams};
pub use source::{SourceFile, MAX_SOURCE_SIZE};
pub use timer::{DebounceTimer, TimerHandle};
pub use websocket::{CoordinatorEvent, EventBroadcaster};
