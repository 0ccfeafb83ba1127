//! Workflow states, pause reasons, and the read-only view published to hosts.

use serde::Serialize;

/// Batch processing workflow state. `Idle` is initial; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum BatchState {
    #[default]
    Idle,
    WaitEmpty,
    Loading,
    Settling,
    Locked,
    Printing,
    PostGuard,
    Paused,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::WaitEmpty => "WaitEmpty",
            Self::Loading => "Loading",
            Self::Settling => "Settling",
            Self::Locked => "Locked",
            Self::Printing => "Printing",
            Self::PostGuard => "PostGuard",
            Self::Paused => "Paused",
        }
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the FSM is paused. Only meaningful while the state is `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PauseReason {
    #[default]
    None,
    Manual,
    ReweighRequired,
    PrinterError,
    /// Label number or record could not be stored while a print was held.
    StorageError,
    BatchStopped,
}

impl PauseReason {
    /// Reasons that clear by themselves once the platform stays empty.
    pub fn auto_clears(&self) -> bool {
        matches!(self, Self::ReweighRequired | Self::BatchStopped)
    }
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::Manual => "Manual",
            Self::ReweighRequired => "ReweighRequired",
            Self::PrinterError => "PrinterError",
            Self::StorageError => "StorageError",
            Self::BatchStopped => "BatchStopped",
        };
        f.write_str(s)
    }
}

/// Read-only copy of the FSM's externally visible fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FsmSnapshot {
    pub state: BatchState,
    pub pause_reason: PauseReason,
    pub active_batch_id: Option<String>,
    pub active_product_id: Option<String>,
    pub locked_weight: Option<f64>,
}
