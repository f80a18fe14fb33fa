//! JSON tracker configuration.
//!
//! Every tunable has a default, so a minimal file only names the camera
//! calibration, the marker dictionary and the tool data sources.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use optrack_core::Real;
use optrack_linear::{DepthRange, FrameOptions, PlaneFitOptions, PoseOptions};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::fusion::FusionMethod;
use crate::tool::{ToolSpec, TrackingMode};

/// Which sensor streams the device consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    #[default]
    #[serde(rename = "RGB_ONLY")]
    RgbOnly,
    #[serde(rename = "RGB_AND_DEPTH")]
    RgbAndDepth,
}

impl InputType {
    /// Number of input channels the mode expects.
    pub fn channel_count(self) -> usize {
        match self {
            InputType::RgbOnly => 1,
            InputType::RgbAndDepth => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputType::RgbOnly => "RGB_ONLY",
            InputType::RgbAndDepth => "RGB_AND_DEPTH",
        }
    }
}

/// What to do with the rest of a frame when a tool's plane fit fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneFitFailurePolicy {
    /// Drop this tool's update and continue with the next tool.
    #[default]
    SkipTool,
    /// Stop processing the frame; updates already emitted stand.
    AbortFrame,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceKind {
    #[default]
    Tool,
    Video,
}

/// One `data_sources` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSourceConfig {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: DataSourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_size_mm: Option<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_map_file: Option<PathBuf>,
    #[serde(default)]
    pub data_fusion_method: FusionMethod,
}

impl ToolSourceConfig {
    pub fn single_marker(id: &str, marker_id: i32, marker_size_mm: Real) -> Self {
        Self {
            id: id.to_owned(),
            kind: DataSourceKind::Tool,
            marker_id: Some(marker_id),
            marker_size_mm: Some(marker_size_mm),
            marker_map_file: None,
            data_fusion_method: FusionMethod::RgbOnly,
        }
    }

    pub fn with_fusion(mut self, method: FusionMethod) -> Self {
        self.data_fusion_method = method;
        self
    }

    fn tracking_mode(&self) -> Result<TrackingMode, TrackerError> {
        let malformed = |reason: &str| TrackerError::MalformedToolSource {
            id: self.id.clone(),
            reason: reason.to_owned(),
        };
        match (self.marker_id, self.marker_size_mm, &self.marker_map_file) {
            (Some(_), _, Some(_)) => Err(malformed("set either marker_id or marker_map_file, not both")),
            (Some(marker_id), Some(size), None) => {
                if size.is_finite() && size > 0.0 {
                    Ok(TrackingMode::SingleMarker {
                        marker_id,
                        marker_size_mm: size,
                    })
                } else {
                    Err(malformed("marker_size_mm must be positive"))
                }
            }
            (Some(_), None, None) => Err(malformed("marker_size_mm is required with marker_id")),
            (None, _, Some(file)) => Ok(TrackingMode::MarkerMap { file: file.clone() }),
            (None, _, None) => Err(malformed("needs marker_id and marker_size_mm, or marker_map_file")),
        }
    }
}

fn default_reference_frame() -> String {
    "Tracker".to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Camera calibration JSON, relative to the configuration file directory.
    pub camera_calibration_file: PathBuf,
    #[serde(default)]
    pub input_type: InputType,
    pub marker_dictionary: String,
    #[serde(default = "default_reference_frame")]
    pub tool_reference_frame: String,
    pub data_sources: Vec<ToolSourceConfig>,
    #[serde(default)]
    pub depth_range: DepthRange,
    #[serde(default)]
    pub plane_fit: PlaneFitOptions,
    #[serde(default)]
    pub frame: FrameOptions,
    #[serde(default)]
    pub pose: PoseOptions,
    #[serde(default)]
    pub plane_fit_failure: PlaneFitFailurePolicy,
}

impl TrackerConfig {
    pub fn new(
        camera_calibration_file: impl Into<PathBuf>,
        input_type: InputType,
        marker_dictionary: &str,
        data_sources: Vec<ToolSourceConfig>,
    ) -> Self {
        Self {
            camera_calibration_file: camera_calibration_file.into(),
            input_type,
            marker_dictionary: marker_dictionary.to_owned(),
            tool_reference_frame: default_reference_frame(),
            data_sources,
            depth_range: DepthRange::default(),
            plane_fit: PlaneFitOptions::default(),
            frame: FrameOptions::default(),
            pose: PoseOptions::default(),
            plane_fit_failure: PlaneFitFailurePolicy::default(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading tracker config {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing tracker config {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing tracker config")
    }

    /// Source id reported for a tool: `"<id>To<reference frame>"`.
    pub fn source_id(&self, tool_id: &str) -> String {
        format!("{tool_id}To{}", self.tool_reference_frame)
    }

    /// Validate the configuration and resolve the tool list, in source order.
    pub fn tool_specs(&self) -> Result<Vec<ToolSpec>, TrackerError> {
        if self.marker_dictionary.trim().is_empty() {
            return Err(TrackerError::EmptyDictionary);
        }

        let mut seen = HashSet::new();
        let mut tools = Vec::new();
        for (index, source) in self.data_sources.iter().enumerate() {
            if source.kind != DataSourceKind::Tool {
                continue;
            }
            if source.id.trim().is_empty() {
                return Err(TrackerError::MissingToolId { index });
            }
            let mode = source.tracking_mode()?;
            let method = source.data_fusion_method;
            if self.input_type == InputType::RgbOnly && method.requires_depth() {
                return Err(TrackerError::DepthRequired {
                    tool: source.id.clone(),
                    method,
                });
            }

            let source_id = self.source_id(&source.id);
            if !seen.insert(source_id.clone()) {
                return Err(TrackerError::DuplicateSourceId(source_id));
            }
            if method == FusionMethod::Kalman {
                warn!("tool {}: KALMAN fusion has no estimator; the tool will never report a pose", source.id);
            }
            if let TrackingMode::MarkerMap { file } = &mode {
                warn!(
                    "tool {}: marker map tracking ({}) is not supported; the tool will never report a pose",
                    source.id,
                    file.display()
                );
            }

            tools.push(ToolSpec {
                source_id,
                name: source.id.clone(),
                mode,
                fusion: method,
            });
        }
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrackerConfig {
        TrackerConfig::new(
            "calib.json",
            InputType::RgbAndDepth,
            "ARUCO_MIP_36h12",
            vec![
                ToolSourceConfig::single_marker("Stylus", 3, 50.0),
                ToolSourceConfig::single_marker("Pointer", 7, 40.0).with_fusion(FusionMethod::Component),
            ],
        )
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let json = r#"{
            "camera_calibration_file": "calib.json",
            "marker_dictionary": "ARUCO_MIP_36h12",
            "data_sources": [
                { "id": "Stylus", "marker_id": 3, "marker_size_mm": 50.0 },
                { "id": "Video", "type": "Video" }
            ]
        }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.input_type, InputType::RgbOnly);
        assert_eq!(config.tool_reference_frame, "Tracker");
        assert_eq!(config.depth_range, DepthRange::default());
        assert_eq!(config.plane_fit_failure, PlaneFitFailurePolicy::SkipTool);

        let tools = config.tool_specs().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].source_id, "StylusToTracker");
        assert_eq!(tools[0].fusion, FusionMethod::RgbOnly);
        assert_eq!(
            tools[0].mode,
            TrackingMode::SingleMarker {
                marker_id: 3,
                marker_size_mm: 50.0
            }
        );
    }

    #[test]
    fn json_roundtrip() {
        let config = sample();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"RGB_AND_DEPTH\""));
        assert!(json.contains("\"COMPONENT\""));
        let back: TrackerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn depth_fusion_needs_depth_input() {
        let mut config = sample();
        config.input_type = InputType::RgbOnly;
        assert_eq!(
            config.tool_specs(),
            Err(TrackerError::DepthRequired {
                tool: "Pointer".into(),
                method: FusionMethod::Component
            })
        );
    }

    #[test]
    fn rejects_malformed_sources() {
        let mut config = sample();
        config.data_sources[0].id.clear();
        assert_eq!(config.tool_specs(), Err(TrackerError::MissingToolId { index: 0 }));

        let mut config = sample();
        config.data_sources[0].marker_size_mm = None;
        assert!(matches!(
            config.tool_specs(),
            Err(TrackerError::MalformedToolSource { ref id, .. }) if id == "Stylus"
        ));

        let mut config = sample();
        config.data_sources[1].marker_size_mm = Some(-4.0);
        assert!(matches!(
            config.tool_specs(),
            Err(TrackerError::MalformedToolSource { .. })
        ));

        let mut config = sample();
        config.data_sources[1].id = "Stylus".into();
        assert_eq!(
            config.tool_specs(),
            Err(TrackerError::DuplicateSourceId("StylusToTracker".into()))
        );

        let mut config = sample();
        config.marker_dictionary = " ".into();
        assert_eq!(config.tool_specs(), Err(TrackerError::EmptyDictionary));
    }

    #[test]
    fn marker_map_tools_are_kept() {
        let mut config = sample();
        config.data_sources.push(ToolSourceConfig {
            id: "Board".into(),
            kind: DataSourceKind::Tool,
            marker_id: None,
            marker_size_mm: None,
            marker_map_file: Some("board_map.yml".into()),
            data_fusion_method: FusionMethod::RgbOnly,
        });
        let tools = config.tool_specs().unwrap();
        assert_eq!(tools.len(), 3);
        assert!(matches!(tools[2].mode, TrackingMode::MarkerMap { .. }));
    }
}
