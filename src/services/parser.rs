use serde_json::{Map, Value};

use crate::models::Estimate;

const FENCE: &str = "```";

/// Decodes a model reply into an [`Estimate`]. Never fails.
///
/// Markdown fences and any prose around the outermost `{...}` are ignored.
/// Replies that do not decode to a JSON object yield
/// [`Estimate::unidentified`]; missing or mistyped fields fall back to
/// per-field defaults.
pub fn parse_response(text: &str) -> Estimate {
    let cleaned = strip_fences(text);
    let candidate = extract_object(cleaned.trim());

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(fields)) => from_fields(&fields),
        Ok(other) => {
            log::warn!("Model reply is JSON but not an object: {}", other);
            Estimate::unidentified()
        }
        Err(e) => {
            log::warn!("Could not parse model reply ({}): {}", e, text);
            Estimate::unidentified()
        }
    }
}

/// Removes fence markers, including the language tag after an opening one.
fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(FENCE) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + FENCE.len()..];
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        rest = &rest[tag_len..];
    }

    out.push_str(rest);
    out
}

fn extract_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

fn from_fields(fields: &Map<String, Value>) -> Estimate {
    let food_name = fields
        .get("food")
        .and_then(Value::as_str)
        .unwrap_or("Unknown food")
        .to_string();

    Estimate {
        food_name,
        calories: number(fields, "calories") as u32,
        protein_g: number(fields, "protein_g") as f32,
        carbs_g: number(fields, "carbs_g") as f32,
        fat_g: number(fields, "fat_g") as f32,
    }
}

/// Reads a non-negative number, accepting integer or float encodings.
fn number(fields: &Map<String, Value>, key: &str) -> f64 {
    fields
        .get(key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .map(|n| n.max(0.0))
        .unwrap_or(0.0)
}
