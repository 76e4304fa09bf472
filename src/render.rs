//! Text and JSON views of [`SessionState`]. Confidence rounding happens here
//! and nowhere else.

use serde_json::{Value, json};

use crate::detection::Detection;
use crate::session::SessionState;

pub fn format_confidence(confidence: f64) -> String {
    format!("{:.2}%", confidence)
}

pub fn render_text(state: &SessionState) -> String {
    match state {
        SessionState::Idle => "Select an image to detect labels.".to_string(),
        SessionState::Loading(asset) => format!("Detecting labels in {}...", asset.name()),
        SessionState::Success(detection) => render_detection(detection),
        SessionState::Failed(error) => format!("Error: {}", error.message),
    }
}

fn render_detection(detection: &Detection) -> String {
    let mut lines = vec![person_banner(detection)];

    if detection.result.is_empty() {
        lines.push("No labels detected.".to_string());
    } else {
        let width = detection
            .result
            .iter()
            .map(|entry| entry.label.chars().count())
            .max()
            .unwrap_or(0);
        lines.push("Labels:".to_string());
        for entry in detection.result.iter() {
            let mut line = format!(
                "  {:<width$}  {:>7}",
                entry.label,
                format_confidence(entry.confidence),
                width = width
            );
            if let Some(count) = entry.instance_count() {
                line.push_str(&format!("  x{}", count));
            }
            lines.push(line);
        }
    }

    if let Some(retouch) = &detection.retouch {
        if retouch.people_removed {
            lines.push("People were removed from a regenerated copy of the image.".to_string());
        } else if retouch.remove_people_requested {
            lines.push("Person removal was requested but nothing was removed.".to_string());
        }
    }

    lines.join("\n")
}

fn person_banner(detection: &Detection) -> String {
    let person = &detection.person;
    if !person.present {
        return "No person detected.".to_string();
    }
    let mut banner = "Person detected".to_string();
    let details: Vec<String> = [
        person
            .confidence
            .map(|confidence| format!("{} confidence", format_confidence(confidence))),
        person.count.map(|count| match count {
            1 => "1 instance".to_string(),
            n => format!("{} instances", n),
        }),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !details.is_empty() {
        banner.push_str(&format!(" ({})", details.join(", ")));
    }
    banner.push('.');
    banner
}

/// The flat envelope recommended for new service implementations. Feeding
/// it back through the normalizer yields the same detection.
pub fn canonical_json(detection: &Detection) -> Value {
    let mut envelope = json!({
        "labels": detection.result,
        "personPresent": detection.person.present,
        "personConfidence": detection.person.confidence,
        "personCount": detection.person.count,
    });
    if let (Some(retouch), Value::Object(map)) = (&detection.retouch, &mut envelope) {
        map.insert("removePeopleRequested".into(), json!(retouch.remove_people_requested));
        map.insert("peopleRemoved".into(), json!(retouch.people_removed));
        map.insert("regeneratedImageBase64".into(), json!(retouch.regenerated_image));
    }
    envelope
}
