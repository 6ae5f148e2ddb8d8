// status.rs
//! Tolerant extraction of [`DeviceStatus`] from whatever a backend returned.
//!
//! The text form is `key: value` lines as printed by `catt info`; the
//! structured form is a JSON object (optionally wrapped in `{"status": {...}}`).
//! Unknown keys are ignored and a value that does not parse leaves its field
//! unset; nothing here fails the whole parse.

use serde_json::Value;

use crate::models::{DeviceStatus, RawOutput};

pub fn parse(raw: &RawOutput) -> DeviceStatus {
    match raw {
        RawOutput::Text(text) => parse_text(text),
        RawOutput::Structured(value) => parse_value(value),
    }
}

pub fn parse_text(text: &str) -> DeviceStatus {
    let mut status = DeviceStatus::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        apply(&mut status, &normalize_key(key), Field::Text(value.trim()));
    }
    status
}

pub fn parse_value(value: &Value) -> DeviceStatus {
    let mut status = DeviceStatus::default();
    let object = match value.get("status") {
        Some(inner @ Value::Object(_)) => inner,
        _ => value,
    };
    let Some(object) = object.as_object() else {
        return status;
    };
    for (key, value) in object {
        let field = match value {
            Value::String(s) => Field::Text(s.trim()),
            Value::Number(n) => match n.as_f64() {
                Some(n) => Field::Number(n),
                None => continue,
            },
            _ => continue,
        };
        apply(&mut status, &normalize_key(key), field);
    }
    status
}

enum Field<'a> {
    Text(&'a str),
    Number(f64),
}

impl Field<'_> {
    fn text(&self) -> Option<String> {
        match self {
            Field::Text(s) if !s.is_empty() => Some(s.to_string()),
            Field::Text(_) => None,
            Field::Number(n) => Some(n.to_string()),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Field::Text(s) => s.parse::<f64>().ok(),
            Field::Number(n) => Some(*n),
        }
        .filter(|n| n.is_finite())
    }
}

/// The first occurrence of a key wins.
fn apply(status: &mut DeviceStatus, key: &str, field: Field<'_>) {
    fn set<T>(slot: &mut Option<T>, value: Option<T>) {
        if slot.is_none() {
            *slot = value;
        }
    }

    match key {
        "state" | "player_state" => set(&mut status.state, field.text()),
        "display_name" => set(&mut status.display_name, field.text()),
        "title" => set(&mut status.title, field.text()),
        "content_id" => set(&mut status.content_id, field.text()),
        "cast_mode" => set(&mut status.cast_mode, field.text()),
        "current_time" => set(&mut status.current_time, field.number()),
        "volume_level" => set(&mut status.volume_level, field.number()),
        "duration" => set(&mut status.duration, field.number()),
        _ => {}
    }
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}
