//! Lane state for the request coordinator.
//!
//! The coordinator tracks two independent lanes:
//!
//! - execution: `Idle` -> `Running` -> `Succeeded` | `Failed` -> `Running` on the next run
//! - feedback: `Idle` -> `Analyzing` -> `Ready`
//!
//! Each dispatch takes a fresh [`RequestGeneration`] and a lane only accepts
//! a response carrying its latest generation. That check is the only
//! ordering mechanism: responses from superseded requests are dropped, not
//! cancelled.

use serde::{Deserialize, Serialize};

use crate::execution::ExecutionResult;
use crate::feedback::{FeedbackBundle, FeedbackTier};

// ============================================================================
// RequestGeneration
// ============================================================================

/// Monotonically increasing tag assigned to each dispatched request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestGeneration(u64);

impl RequestGeneration {
    /// Wraps a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The generation after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for RequestGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Execution Lane
// ============================================================================

/// Status of the execution lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Nothing has run yet.
    #[default]
    Idle,
    /// A run is in flight.
    Running,
    /// The last accepted run produced no error lines.
    Succeeded,
    /// The last accepted run produced error lines.
    Failed,
}

/// Visible state of the execution lane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLane {
    /// Current status.
    pub status: ExecutionStatus,
    /// Generation of the most recently dispatched run.
    pub generation: RequestGeneration,
    /// Language of the most recently dispatched run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Result of the most recently accepted run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

impl ExecutionLane {
    /// Records a new dispatch and returns its generation.
    ///
    /// Any run still in flight becomes stale.
    pub fn dispatch(&mut self, language: impl Into<String>) -> RequestGeneration {
        self.generation = self.generation.next();
        self.status = ExecutionStatus::Running;
        self.language = Some(language.into());
        self.generation
    }

    /// Accepts a result if it belongs to the latest dispatch.
    ///
    /// Returns `false`, leaving the lane untouched, for stale results.
    pub fn complete(&mut self, generation: RequestGeneration, result: ExecutionResult) -> bool {
        if generation != self.generation || self.status != ExecutionStatus::Running {
            return false;
        }
        self.status = if result.is_success() {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::Failed
        };
        self.result = Some(result);
        true
    }

    /// Error lines of the last accepted run.
    #[must_use]
    pub fn last_errors(&self) -> &[String] {
        self.result.as_ref().map_or(&[][..], |r| r.errors.as_slice())
    }
}

// ============================================================================
// Feedback Lane
// ============================================================================

/// Status of the feedback lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    /// No analysis has been dispatched.
    #[default]
    Idle,
    /// An analysis is in flight.
    Analyzing,
    /// The latest analysis has been accepted.
    Ready,
}

/// Visible state of the feedback lane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackLane {
    /// Current status.
    pub status: FeedbackStatus,
    /// Generation of the most recently dispatched analysis.
    pub generation: RequestGeneration,
    /// Whether a debounced analysis is waiting to be dispatched.
    pub pending: bool,
    /// Ladder tier of the accepted bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<FeedbackTier>,
    /// Most recently accepted bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<FeedbackBundle>,
}

impl FeedbackLane {
    /// Records a new dispatch and returns its generation.
    pub fn dispatch(&mut self) -> RequestGeneration {
        self.generation = self.generation.next();
        self.status = FeedbackStatus::Analyzing;
        self.pending = false;
        self.generation
    }

    /// Accepts a bundle if it belongs to the latest dispatch.
    pub fn complete(
        &mut self,
        generation: RequestGeneration,
        tier: FeedbackTier,
        bundle: FeedbackBundle,
    ) -> bool {
        if generation != self.generation || self.status != FeedbackStatus::Analyzing {
            return false;
        }
        self.status = FeedbackStatus::Ready;
        self.tier = Some(tier);
        self.bundle = Some(bundle);
        true
    }
}
