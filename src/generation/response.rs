//! Turning raw model output into validated [`Item`]s.

use serde_json::Value;

use crate::cache::item::{resolve_answer, AnswerField, Category, Item, Key};
use crate::generation::client::GenerationError;

const REQUIRED_FIELDS: [&str; 4] = ["question", "options", "correct_answer", "explanation"];

/// Answers that contradict the definition of P.
const P_MISCONCEPTIONS: [&str; 3] = [
    "no known efficient algorithm",
    "exponential time",
    "subset of np-complete",
];

/// Extract the JSON payload from model output.
///
/// Strips Markdown code fences, removes control characters and collapses
/// whitespace runs. If no fence is present, falls back to the outermost
/// `{ ... }` span.
pub fn clean_json_response(text: &str) -> String {
    let mut body = text.trim();

    if let Some(start) = body.find("```json") {
        let rest = &body[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            body = rest[..end].trim();
        }
    } else if let Some(start) = body.find("```") {
        let rest = &body[start + 3..];
        if let Some(end) = rest.find("```") {
            body = rest[..end].trim();
        }
    } else if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            body = &body[start..=end];
        }
    }

    let mut out = String::with_capacity(body.len());
    let mut last_space = false;
    for c in body.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else if c.is_control() {
            continue;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim().to_string()
}

/// Parse and validate a generated question for `key`.
pub fn parse_question(text: &str, key: &Key) -> Result<Item, GenerationError> {
    let cleaned = clean_json_response(text);
    let value: Value = serde_json::from_str(&cleaned)?;
    let object = value
        .as_object()
        .ok_or_else(|| GenerationError::MalformedResponse("expected a JSON object".into()))?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(GenerationError::Validation(format!("missing field `{field}`")));
        }
    }

    let question = string_field(object, "question")?;
    let explanation = string_field(object, "explanation")?;
    let options: Vec<String> = serde_json::from_value(object["options"].clone())
        .map_err(|_| GenerationError::Validation("`options` must be a list of strings".into()))?;
    let correct_answer: AnswerField = serde_json::from_value(object["correct_answer"].clone())
        .map_err(|_| {
            GenerationError::Validation("`correct_answer` must be a string or number".into())
        })?;
    let correct_answer = correct_answer.into_string();

    let resolved = resolve_answer(&options, &correct_answer)
        .ok_or_else(|| GenerationError::Validation("correct answer not among options".into()))?;
    if key.category() == Category::P {
        check_p_answer(&options[resolved])?;
    }

    Ok(Item::new(
        question,
        options,
        correct_answer,
        explanation,
        key.category(),
        key.difficulty(),
    )?)
}

fn string_field(
    object: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, GenerationError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GenerationError::Validation(format!("`{field}` must be a string")))
}

fn check_p_answer(answer: &str) -> Result<(), GenerationError> {
    let lower = answer.to_lowercase();
    match P_MISCONCEPTIONS.iter().find(|m| lower.contains(*m)) {
        Some(m) => Err(GenerationError::Validation(format!(
            "answer for a P question claims {m:?}"
        ))),
        None => Ok(()),
    }
}
