use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LabelerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("label identifier generation failed: {0}")]
    Epc(String),
    #[error("record persistence failed: {0}")]
    Persist(String),
    #[error("batch service is shut down")]
    Disconnected,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing epc source")]
    MissingEpcSource,
    #[error("missing record store")]
    MissingRecordStore,
    #[error("missing label printer")]
    MissingPrinter,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
