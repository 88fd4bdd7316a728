//! Events broadcast while phases run and documents arrive

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type")]
pub enum Event {
    /// A phase run passed its preconditions and began
    #[serde(rename = "phase.started")]
    PhaseStarted { phase_number: i64, model: String },

    /// A pipeline step changed status
    #[serde(rename = "phase.step_updated")]
    StepUpdated {
        phase_number: i64,
        step: String,
        status: String,
    },

    #[serde(rename = "phase.completed")]
    PhaseCompleted {
        phase_number: i64,
        verification_score: Option<u8>,
    },

    #[serde(rename = "phase.failed")]
    PhaseFailed { phase_number: i64, error: String },

    /// Every stored result was removed
    #[serde(rename = "results.cleared")]
    ResultsCleared { count: u64 },

    #[serde(rename = "analysis.adjusted")]
    AnalysisAdjusted {
        phase_number: Option<i64>,
        request_id: String,
    },

    #[serde(rename = "document.uploaded")]
    DocumentUploaded {
        document_id: Uuid,
        filename: String,
        company: String,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Wire name, identical to the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::PhaseStarted { .. } => "phase.started",
            Event::StepUpdated { .. } => "phase.step_updated",
            Event::PhaseCompleted { .. } => "phase.completed",
            Event::PhaseFailed { .. } => "phase.failed",
            Event::ResultsCleared { .. } => "results.cleared",
            Event::AnalysisAdjusted { .. } => "analysis.adjusted",
            Event::DocumentUploaded { .. } => "document.uploaded",
            Event::Error { .. } => "error",
        }
    }

    /// The phase an event concerns, for per-phase filtering.
    pub fn phase_number(&self) -> Option<i64> {
        match self {
            Event::PhaseStarted { phase_number, .. }
            | Event::StepUpdated { phase_number, .. }
            | Event::PhaseCompleted { phase_number, .. }
            | Event::PhaseFailed { phase_number, .. } => Some(*phase_number),
            Event::AnalysisAdjusted { phase_number, .. } => *phase_number,
            _ => None,
        }
    }
}
