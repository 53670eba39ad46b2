use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Error};

#[derive(Debug, Clone)]
pub struct FaceLocalizerConfig {
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub center_variance: f32,
    pub size_variance: f32,
}

impl FaceLocalizerConfig {
    pub fn new() -> Self {
        FaceLocalizerConfig {
            input_size: (320, 240),
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            center_variance: 0.1,
            size_variance: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LesionClassifierConfig {
    pub image_size: u32,
    pub pixel_scale: f32,
    pub output_name: &'static str,
}

impl LesionClassifierConfig {
    pub fn new() -> Self {
        LesionClassifierConfig {
            image_size: 224,
            pixel_scale: 1.0 / 255.0,
            output_name: "predictions",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotDetectorConfig {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub output_name: &'static str,
    /// Category names by class index. Empty when the detector was trained
    /// without categories; spots then carry no category and the report
    /// breakdown stays empty.
    pub class_names: Vec<String>,
}

impl SpotDetectorConfig {
    pub fn new() -> Self {
        SpotDetectorConfig {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            output_name: "output0",
            class_names: Vec::new(),
        }
    }
}

/// Diagnosis label set, keyed by classifier output index. Loaded once at
/// process start from a JSON object with stringified integer keys, and
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct LabelTable {
    labels: HashMap<String, String>,
}

impl LabelTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read label table {:?}", path.as_ref()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let labels: HashMap<String, String> =
            serde_json::from_str(raw).context("label table is not a string-to-string map")?;
        Ok(LabelTable { labels })
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.labels.get(&index.to_string()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Opaque recommendation identifiers keyed by diagnosis label. The pipeline
/// never interprets these; the service layer attaches them to the report
/// after aggregation.
#[derive(Debug, Clone)]
pub struct RecommendationTable {
    entries: HashMap<String, Vec<String>>,
}

impl RecommendationTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read recommendation table {:?}", path.as_ref()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let entries: HashMap<String, Vec<String>> = serde_json::from_str(raw)
            .context("recommendation table is not a label-to-list map")?;
        Ok(RecommendationTable { entries })
    }

    pub fn for_label(&self, label: &str) -> Vec<String> {
        self.entries.get(label).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_table_lookup() {
        let table = LabelTable::from_json(r#"{"0": "Clear Skin", "1": "Blackheads", "2": "Papules"}"#).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.name(1), Some("Blackheads"));
        assert_eq!(table.name(7), None);
    }

    #[test]
    fn test_label_table_rejects_non_map() {
        assert!(LabelTable::from_json(r#"["Clear Skin"]"#).is_err());
    }

    #[test]
    fn test_recommendation_lookup() {
        let table = RecommendationTable::from_json(
            r#"{"Blackheads": ["salicylic-acid-cleanser", "retinoid-adapalene"]}"#,
        )
        .unwrap();
        assert_eq!(
            table.for_label("Blackheads"),
            vec!["salicylic-acid-cleanser".to_string(), "retinoid-adapalene".to_string()]
        );
        assert!(table.for_label("Nodules").is_empty());
    }
}
