use std::ops::RangeInclusive;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::error::AppError;
use crate::pipeline::encoder::EncodedImage;

pub const MAX_LABELS_RANGE: RangeInclusive<u8> = 1..=100;
pub const CONFIDENCE_RANGE: RangeInclusive<u8> = 0..=100;

/// A raw, user-entered value. Text comes straight from an input field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Parameter {
    #[default]
    Absent,
    Text(String),
    Number(f64),
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Parameter::Text(value.to_string())
    }
}

impl From<String> for Parameter {
    fn from(value: String) -> Self {
        Parameter::Text(value)
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Parameter::Number(value)
    }
}

impl From<i64> for Parameter {
    fn from(value: i64) -> Self {
        Parameter::Number(value as f64)
    }
}

impl From<u32> for Parameter {
    fn from(value: u32) -> Self {
        Parameter::Number(f64::from(value))
    }
}

impl<T: Into<Parameter>> From<Option<T>> for Parameter {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionParameters {
    pub max_labels: Parameter,
    pub confidence: Parameter,
    pub remove_people: Option<bool>,
}

impl DetectionParameters {
    pub fn new(max_labels: impl Into<Parameter>, confidence: impl Into<Parameter>) -> Self {
        Self {
            max_labels: max_labels.into(),
            confidence: confidence.into(),
            remove_people: None,
        }
    }

    pub fn remove_people(mut self, remove_people: bool) -> Self {
        self.remove_people = Some(remove_people);
        self
    }
}

/// Wire request. Built fresh per submission and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRequest {
    body: String,
    max_labels: u8,
    confidence: u8,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    remove_people: bool,
}

impl DetectionRequest {
    pub fn payload(&self) -> &str {
        &self.body
    }

    pub fn max_labels(&self) -> u8 {
        self.max_labels
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn remove_people(&self) -> bool {
        self.remove_people
    }
}

/// Coerces user input into a [`DetectionRequest`].
///
/// Out-of-range values are clamped into [`MAX_LABELS_RANGE`] and
/// [`CONFIDENCE_RANGE`], fractions truncate toward zero, and absent or
/// unparseable text falls back to the configured defaults. Only non-finite
/// numbers are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBuilder {
    default_max_labels: u8,
    default_confidence: u8,
    default_remove_people: bool,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            default_max_labels: 5,
            default_confidence: 90,
            default_remove_people: false,
        }
    }
}

impl RequestBuilder {
    pub fn new(default_max_labels: u32, default_confidence: u32) -> Result<Self, AppError> {
        Ok(Self {
            default_max_labels: checked_default("max_labels", default_max_labels, MAX_LABELS_RANGE)?,
            default_confidence: checked_default("confidence", default_confidence, CONFIDENCE_RANGE)?,
            default_remove_people: false,
        })
    }

    pub fn from_configuration(configuration: &Configuration) -> Result<Self, AppError> {
        Ok(Self::new(configuration.max_labels, configuration.confidence)?
            .with_remove_people(configuration.remove_people))
    }

    pub fn with_remove_people(mut self, remove_people: bool) -> Self {
        self.default_remove_people = remove_people;
        self
    }

    pub fn build(
        &self,
        encoded: EncodedImage,
        parameters: &DetectionParameters,
    ) -> Result<DetectionRequest, AppError> {
        let max_labels = coerce(
            "max_labels",
            &parameters.max_labels,
            self.default_max_labels,
            MAX_LABELS_RANGE,
        )?;
        let confidence = coerce(
            "confidence",
            &parameters.confidence,
            self.default_confidence,
            CONFIDENCE_RANGE,
        )?;
        let remove_people = parameters
            .remove_people
            .unwrap_or(self.default_remove_people);

        debug!(
            "Built detection request: max_labels={}, confidence={}, remove_people={}",
            max_labels, confidence, remove_people
        );
        Ok(DetectionRequest {
            body: encoded.into_payload(),
            max_labels,
            confidence,
            remove_people,
        })
    }
}

fn checked_default(
    name: &'static str,
    value: u32,
    range: RangeInclusive<u8>,
) -> Result<u8, AppError> {
    u8::try_from(value)
        .ok()
        .filter(|value| range.contains(value))
        .ok_or_else(|| AppError::InvalidParameter {
            name,
            reason: format!(
                "default {} is outside {}..={}",
                value,
                range.start(),
                range.end()
            ),
        })
}

fn coerce(
    name: &'static str,
    parameter: &Parameter,
    default: u8,
    range: RangeInclusive<u8>,
) -> Result<u8, AppError> {
    let raw = match parameter {
        Parameter::Absent => return Ok(default),
        Parameter::Text(text) => match parse_text(text) {
            Some(value) => value,
            None => {
                if !text.trim().is_empty() {
                    warn!("Unparseable {} {:?}, using default {}", name, text, default);
                }
                return Ok(default);
            }
        },
        Parameter::Number(value) if value.is_finite() => *value,
        Parameter::Number(value) => {
            return Err(AppError::InvalidParameter {
                name,
                reason: format!("{} is not a finite number", value),
            });
        }
    };

    let (low, high) = (f64::from(*range.start()), f64::from(*range.end()));
    let truncated = raw.trunc();
    let clamped = truncated.clamp(low, high);
    if clamped != truncated {
        debug!("Clamped {} from {} to {}", name, raw, clamped);
    }
    Ok(clamped as u8)
}

fn parse_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Some(value as f64);
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}
