use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("printer device {path:?}: {source}")]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid load profile: {0}")]
    Profile(String),
    #[error("trace: {0}")]
    Trace(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
