use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid curve: {0}")]
    InvalidCurve(String),

    #[error("Curve config not found at {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Malformed curve config: {0}")]
    MalformedConfig(String),

    #[error("Track {track_id}: frame {frame_index} arrived after frame {last_frame}")]
    OutOfOrderFrame {
        track_id: u64,
        frame_index: u64,
        last_frame: u64,
    },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
