use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::error::AppError;

const PERSON_LABEL: &str = "person";

/// Normalized bounding box, each value relative to the image size (0.0..1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Instance {
    #[serde(rename = "BoundingBox", skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelEntry {
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Confidence")]
    pub confidence: f64,
    #[serde(rename = "Instances", skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<Instance>>,
}

impl LabelEntry {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            instances: None,
        }
    }

    pub fn with_instances(mut self, instances: Vec<Instance>) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Number of detected instances, when the service reported an instance list.
    pub fn instance_count(&self) -> Option<u32> {
        self.instances
            .as_ref()
            .map(|instances| u32::try_from(instances.len()).unwrap_or(u32::MAX))
    }

    pub fn is_person(&self) -> bool {
        self.label.eq_ignore_ascii_case(PERSON_LABEL)
    }
}

/// Labels in the order the service returned them. Empty is a valid result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DetectionResult {
    labels: Vec<LabelEntry>,
}

impl DetectionResult {
    pub fn new(labels: Vec<LabelEntry>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &[LabelEntry] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabelEntry> {
        self.labels.iter()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PersonInference {
    #[serde(rename = "personPresent")]
    pub present: bool,
    #[serde(rename = "personConfidence")]
    pub confidence: Option<f64>,
    #[serde(rename = "personCount")]
    pub count: Option<u32>,
}

impl PersonInference {
    /// Derives presence from the first label equal to "person", ignoring case.
    /// Later duplicates are ignored even when they score higher.
    pub fn derive(result: &DetectionResult) -> Self {
        match result.iter().find(|entry| entry.is_person()) {
            Some(entry) => Self {
                present: true,
                confidence: Some(entry.confidence),
                count: entry.instance_count(),
            },
            None => Self::default(),
        }
    }
}

/// Person-removal metadata returned by services that support `removePeople`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Retouch {
    pub remove_people_requested: bool,
    pub people_removed: bool,
    #[serde(rename = "regeneratedImageBase64")]
    pub regenerated_image: Option<String>,
}

impl Retouch {
    pub fn decode_regenerated_image(&self) -> Result<Option<Vec<u8>>, AppError> {
        self.regenerated_image
            .as_deref()
            .map(|encoded| {
                STANDARD.decode(encoded).map_err(|e| AppError::UnrecognizedResponseShape {
                    reason: format!("regeneratedImageBase64 is not valid base64: {}", e),
                    value: serde_json::Value::String(encoded.chars().take(64).collect()),
                })
            })
            .transpose()
    }
}

/// One normalization pass: the label list and the person inference always
/// travel together.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub result: DetectionResult,
    pub person: PersonInference,
    pub retouch: Option<Retouch>,
}

impl Detection {
    pub fn derived(result: DetectionResult) -> Self {
        let person = PersonInference::derive(&result);
        Self {
            result,
            person,
            retouch: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        Instance { bounding_box: None }
    }

    #[test]
    fn test_first_person_match_wins() {
        let result = DetectionResult::new(vec![
            LabelEntry::new("Tree", 97.0),
            LabelEntry::new("PERSON", 80.5).with_instances(vec![instance()]),
            LabelEntry::new("person", 99.9).with_instances(vec![instance(), instance()]),
        ]);
        let person = PersonInference::derive(&result);
        assert!(person.present);
        assert_eq!(person.confidence, Some(80.5));
        assert_eq!(person.count, Some(1));
    }

    #[test]
    fn test_person_without_instance_list_has_no_count() {
        let result = DetectionResult::new(vec![LabelEntry::new("Person", 91.0)]);
        let person = PersonInference::derive(&result);
        assert!(person.present);
        assert_eq!(person.count, None);
    }

    #[test]
    fn test_no_person() {
        let result = DetectionResult::new(vec![LabelEntry::new("Personal Computer", 91.0)]);
        assert_eq!(PersonInference::derive(&result), PersonInference::default());
    }

    #[test]
    fn test_decode_regenerated_image() {
        let retouch = Retouch {
            remove_people_requested: true,
            people_removed: true,
            regenerated_image: Some("aGVsbG8=".to_string()),
        };
        assert_eq!(
            retouch.decode_regenerated_image().unwrap(),
            Some(b"hello".to_vec())
        );

        let broken = Retouch {
            regenerated_image: Some("***".to_string()),
            ..retouch
        };
        assert!(matches!(
            broken.decode_regenerated_image(),
            Err(AppError::UnrecognizedResponseShape { .. })
        ));
    }
}
