//! Per-field timing in the Apollo tracing format.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::statement::SelectionTree;

/// Tracing format version.
pub const TRACE_VERSION: u32 = 1;

/// Tracing extension of a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub version: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Nanoseconds.
    pub duration: u64,
    pub execution: Execution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Execution {
    pub resolvers: Vec<Resolver>,
}

/// Timing of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolver {
    /// Field names from the root down to this field.
    pub path: Vec<String>,
    pub parent_type: String,
    pub field_name: String,
    pub return_type: String,
    /// Nanoseconds from the request start.
    pub start_offset: u64,
    /// Nanoseconds.
    pub duration: u64,
}

/// Accumulates field timings for a single request.
///
/// Nothing is allocated until the first field is recorded.
#[derive(Debug)]
pub struct Tracer {
    start_time: DateTime<Utc>,
    started: Instant,
    trace: Option<Trace>,
}

impl Tracer {
    /// Start timing now.
    pub fn start() -> Self {
        Self {
            start_time: Utc::now(),
            started: Instant::now(),
            trace: None,
        }
    }

    /// Record the timing of selection node `id`, measured from the start.
    pub fn record(&mut self, selection: &SelectionTree, id: i32) {
        let Some(node) = selection.get(id) else {
            return;
        };

        let elapsed = self.started.elapsed();
        let duration = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let end_time = self.start_time
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());

        let start_time = self.start_time;
        let trace = self.trace.get_or_insert_with(|| Trace {
            version: TRACE_VERSION,
            start_time,
            end_time,
            duration,
            execution: Execution::default(),
        });
        trace.end_time = end_time;
        trace.duration = duration;

        trace.execution.resolvers.push(Resolver {
            path: selection.path(id).into_iter().map(String::from).collect(),
            parent_type: "Query".to_string(),
            field_name: node.name.clone(),
            return_type: "object".to_string(),
            start_offset: 1,
            duration,
        });
    }

    /// Record every root of `selection`.
    pub fn record_roots(&mut self, selection: &SelectionTree) {
        let roots: Vec<i32> = selection.roots().map(|n| n.id).collect();
        for id in roots {
            self.record(selection, id);
        }
    }

    /// The accumulated trace, if any field was recorded.
    pub fn finish(self) -> Option<Trace> {
        self.trace
    }
}
