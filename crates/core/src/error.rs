use livetrack_transit::VehicleClass;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("feed unavailable for {class}: {reason}")]
    FeedUnavailable { class: VehicleClass, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("vehicle geometry: {0}")]
    Geometry(String),

    #[error("tracker task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
