//! Hand-off point to an external wall-clock scheduler.
//!
//! The engine does not interpret schedule expressions. Pipelines registered with
//! a schedule are passed to the configured [`PipelineScheduler`], which is
//! expected to call `Engine::request_execution` when they are due.

use crate::domain::{Pipeline, PipelineId};

pub trait PipelineScheduler: Send + Sync {
    fn schedule(&self, pipeline: &Pipeline, expression: &str);

    /// Called when a scheduled pipeline is deleted.
    fn unschedule(&self, _pipeline_id: PipelineId) {}
}
