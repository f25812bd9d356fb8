use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },
    #[error("{filter} does not support {channels}-channel frames")]
    UnsupportedChannels { filter: &'static str, channels: u8 },
    #[error("no background model file given and none remembered")]
    NoModelFile,
    #[error("no background model to save")]
    NoModel,
    #[error("failed to access background model {0}: {1}")]
    ModelIo(PathBuf, std::io::Error),
    #[error("failed to (de)serialize background model: {0}")]
    ModelFormat(#[from] serde_json::Error),
    #[error("background model is corrupt: {0}")]
    ModelCorrupt(String),
    #[error(transparent)]
    Frame(#[from] pedtrack_common::FrameError),
}
