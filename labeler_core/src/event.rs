//! Domain events: the FSM's only output channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Immutable event envelope with a generated id and creation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    BatchStarted {
        batch_id: String,
    },
    BatchCompleted {
        batch_id: String,
    },
    ProductChanged {
        batch_id: String,
        product_id: String,
    },
    WeightStabilized {
        batch_id: String,
        product_id: String,
        weight: f64,
        unit: String,
    },
    LabelPrinted {
        batch_id: String,
        product_id: String,
        epc_code: String,
        weight: f64,
    },
}

impl DomainEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            kind,
        }
    }

    /// Short type name for logs.
    pub fn name(&self) -> &'static str {
        match self.kind {
            EventKind::BatchStarted { .. } => "BatchStarted",
            EventKind::BatchCompleted { .. } => "BatchCompleted",
            EventKind::ProductChanged { .. } => "ProductChanged",
            EventKind::WeightStabilized { .. } => "WeightStabilized",
            EventKind::LabelPrinted { .. } => "LabelPrinted",
        }
    }

    pub fn batch_id(&self) -> &str {
        match &self.kind {
            EventKind::BatchStarted { batch_id }
            | EventKind::BatchCompleted { batch_id }
            | EventKind::ProductChanged { batch_id, .. }
            | EventKind::WeightStabilized { batch_id, .. }
            | EventKind::LabelPrinted { batch_id, .. } => batch_id,
        }
    }
}
