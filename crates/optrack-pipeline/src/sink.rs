use optrack_core::RigidTransform;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolStatus {
    Ok,
    /// The tool's marker was not detected; the transform is identity.
    OutOfView,
}

/// One timestamped tool pose handed to the transform history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUpdate {
    pub source_id: String,
    pub transform: RigidTransform,
    pub status: ToolStatus,
    pub frame_number: u64,
    pub timestamp: f64,
}

/// Receiver of per-frame tool poses.
pub trait TransformSink {
    fn tool_time_stamped_update(&mut self, update: ToolUpdate);
}

impl TransformSink for Vec<ToolUpdate> {
    fn tool_time_stamped_update(&mut self, update: ToolUpdate) {
        self.push(update);
    }
}
