//! Lifecycle notifications for in-process observers.
//!
//! Every subscriber gets its own unbounded channel, so a slow observer never
//! loses events and never blocks the engine. Events do not feed back into
//! control flow. There is no persistence or replay: a subscriber only sees events
//! published after it subscribed.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::domain::{AnalyzerKind, Execution, ExecutionId, Pipeline, PipelineId, RemediationAction};

/// Event payloads, tagged with their wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventKind {
    #[serde(rename = "guardians:initialized")]
    AnalyzersInitialized { analyzers: Vec<AnalyzerKind> },

    #[serde(rename = "pipeline:created")]
    PipelineCreated { pipeline: Box<Pipeline> },

    #[serde(rename = "pipeline:paused")]
    PipelinePaused { pipeline_id: PipelineId },

    #[serde(rename = "pipeline:resumed")]
    PipelineResumed { pipeline_id: PipelineId },

    #[serde(rename = "pipeline:deleted")]
    PipelineDeleted { pipeline_id: PipelineId },

    #[serde(rename = "execution:queued")]
    ExecutionQueued {
        execution_id: ExecutionId,
        pipeline_id: PipelineId,
        queue_position: usize,
    },

    #[serde(rename = "execution:started")]
    ExecutionStarted { execution: Box<Execution> },

    #[serde(rename = "execution:completed")]
    ExecutionCompleted { execution: Box<Execution> },

    #[serde(rename = "execution:failed")]
    ExecutionFailed { execution: Box<Execution>, error: String },

    #[serde(rename = "autofix:applied")]
    AutofixApplied {
        execution_id: ExecutionId,
        rule_id: String,
        action: RemediationAction,
    },

    #[serde(rename = "autofix:failed")]
    AutofixFailed {
        execution_id: ExecutionId,
        rule_id: String,
        action: RemediationAction,
        error: String,
    },

    #[serde(rename = "config:updated")]
    ConfigUpdated { config: Box<EngineConfig> },
}

impl EventKind {
    /// Wire name, e.g. `execution:completed`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnalyzersInitialized { .. } => "guardians:initialized",
            Self::PipelineCreated { .. } => "pipeline:created",
            Self::PipelinePaused { .. } => "pipeline:paused",
            Self::PipelineResumed { .. } => "pipeline:resumed",
            Self::PipelineDeleted { .. } => "pipeline:deleted",
            Self::ExecutionQueued { .. } => "execution:queued",
            Self::ExecutionStarted { .. } => "execution:started",
            Self::ExecutionCompleted { .. } => "execution:completed",
            Self::ExecutionFailed { .. } => "execution:failed",
            Self::AutofixApplied { .. } => "autofix:applied",
            Self::AutofixFailed { .. } => "autofix:failed",
            Self::ConfigUpdated { .. } => "config:updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EngineEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl EventStream {
    /// Wait for the next event. `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    /// Every event already delivered, without waiting.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        EventStream { rx }
    }

    /// Deliver to every live subscriber, dropping the ones that went away.
    pub fn publish(&self, kind: EventKind) {
        let event = EngineEvent::now(kind);
        tracing::trace!(event = event.name(), "publishing engine event");
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
