//! Reconciles the response envelopes produced by different deployment stages
//! of the detection service into one [`Detection`].
//!
//! Shapes are tried in a fixed order, first structural match wins:
//!
//! 1. a bare array of label objects,
//! 2. an object whose `body` is a JSON-encoded string,
//! 3. an object whose `body` is any other value,
//! 4. a flat object carrying `labels` and optional person fields.
//!
//! Anything else is [`AppError::UnrecognizedResponseShape`].

use std::ops::RangeInclusive;

use serde_json::{Map, Value};
use tracing::debug;

use crate::detection::{
    BoundingBox, Detection, DetectionResult, Instance, LabelEntry, PersonInference, Retouch,
};
use crate::error::AppError;

const CONFIDENCE_BOUNDS: RangeInclusive<f64> = 0.0..=100.0;

#[derive(Debug, Clone, Copy)]
enum Envelope<'a> {
    DirectArray(&'a [Value]),
    StringWrapped(&'a str),
    ObjectWrapped(&'a Value),
    Flat(&'a Map<String, Value>),
}

impl<'a> Envelope<'a> {
    fn classify(body: &'a Value) -> Option<Self> {
        match body {
            Value::Array(items) => Some(Envelope::DirectArray(items)),
            Value::Object(map) => match map.get("body") {
                Some(Value::String(inner)) => Some(Envelope::StringWrapped(inner)),
                Some(inner) => Some(Envelope::ObjectWrapped(inner)),
                None if map.contains_key("labels") => Some(Envelope::Flat(map)),
                None => None,
            },
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Envelope::DirectArray(_) => "direct-array",
            Envelope::StringWrapped(_) => "string-wrapped",
            Envelope::ObjectWrapped(_) => "object-wrapped",
            Envelope::Flat(_) => "flat",
        }
    }
}

pub fn normalize(body: &Value) -> Result<Detection, AppError> {
    let envelope = Envelope::classify(body).ok_or_else(|| {
        AppError::unrecognized("expected a label array, a `body` field or a `labels` field", body)
    })?;
    debug!("Normalizing {} response envelope", envelope.name());

    let detection = match envelope {
        Envelope::DirectArray(items) => Detection::derived(parse_labels(items)?),
        Envelope::StringWrapped(raw) => {
            let inner: Value = serde_json::from_str(raw).map_err(|e| {
                AppError::unrecognized(format!("`body` string is not valid JSON: {}", e), body)
            })?;
            normalize_nested(&inner)?
        }
        Envelope::ObjectWrapped(inner) => normalize_nested(inner)?,
        Envelope::Flat(map) => from_flat(map)?,
    };

    debug!(
        "Normalized {} labels (person present: {})",
        detection.result.len(),
        detection.person.present
    );
    Ok(detection)
}

fn normalize_nested(inner: &Value) -> Result<Detection, AppError> {
    match inner {
        Value::Array(items) => Ok(Detection::derived(parse_labels(items)?)),
        Value::Object(map) => from_flat(map),
        other => Err(AppError::unrecognized(
            "nested `body` is neither a label array nor an object",
            other,
        )),
    }
}

fn from_flat(map: &Map<String, Value>) -> Result<Detection, AppError> {
    let result = match map.get("labels") {
        Some(Value::Array(items)) => parse_labels(items)?,
        _ => DetectionResult::default(),
    };

    let person = match map.get("personPresent").and_then(Value::as_bool) {
        Some(present) => PersonInference {
            present,
            confidence: person_confidence(map)?,
            count: person_count(map)?,
        },
        None => PersonInference::derive(&result),
    };

    let retouch = ["removePeopleRequested", "peopleRemoved", "regeneratedImageBase64"]
        .iter()
        .any(|key| map.contains_key(*key))
        .then(|| Retouch {
            remove_people_requested: flag(map, "removePeopleRequested"),
            people_removed: flag(map, "peopleRemoved"),
            regenerated_image: map
                .get("regeneratedImageBase64")
                .and_then(Value::as_str)
                .map(str::to_string),
        });

    Ok(Detection {
        result,
        person,
        retouch,
    })
}

fn parse_labels(items: &[Value]) -> Result<DetectionResult, AppError> {
    items
        .iter()
        .map(parse_label)
        .collect::<Result<Vec<_>, _>>()
        .map(DetectionResult::new)
}

fn parse_label(item: &Value) -> Result<LabelEntry, AppError> {
    let label = item
        .get("Label")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::unrecognized("label entry without a string `Label`", item))?;
    let confidence = item
        .get("Confidence")
        .and_then(finite_f64)
        .ok_or_else(|| AppError::unrecognized("label entry without a numeric `Confidence`", item))?;
    if !CONFIDENCE_BOUNDS.contains(&confidence) {
        return Err(AppError::unrecognized("label `Confidence` outside 0..=100", item));
    }

    let entry = LabelEntry::new(label, confidence);
    Ok(match item.get("Instances").and_then(Value::as_array) {
        Some(instances) => entry.with_instances(instances.iter().map(parse_instance).collect()),
        None => entry,
    })
}

fn parse_instance(item: &Value) -> Instance {
    let bounding_box = item
        .get("BoundingBox")
        .and_then(Value::as_object)
        .map(|bbox| {
            let field = |key: &str| bbox.get(key).and_then(finite_f64).unwrap_or(0.0);
            BoundingBox {
                left: field("Left"),
                top: field("Top"),
                width: field("Width"),
                height: field("Height"),
            }
        });
    Instance { bounding_box }
}

// Absent or null person fields stay unknown; anything else must be well formed.
fn person_confidence(map: &Map<String, Value>) -> Result<Option<f64>, AppError> {
    match map.get("personConfidence") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match finite_f64(value) {
            Some(confidence) if CONFIDENCE_BOUNDS.contains(&confidence) => Ok(Some(confidence)),
            _ => Err(AppError::unrecognized(
                "`personConfidence` is not a number in 0..=100",
                value,
            )),
        },
    }
}

fn person_count(map: &Map<String, Value>) -> Result<Option<u32>, AppError> {
    match map.get("personCount") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|count| u32::try_from(count).ok())
            .map(Some)
            .ok_or_else(|| {
                AppError::unrecognized("`personCount` is not a non-negative integer", value)
            }),
    }
}

fn finite_f64(value: &Value) -> Option<f64> {
    value.as_f64().filter(|number| number.is_finite())
}

fn flag(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}
