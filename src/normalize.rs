//! Canonical display text for each pipeline stage.
//!
//! Upstream stages have emitted several payload shapes over time (bare
//! strings, one-element arrays, fenced JSON inside a string, structured
//! objects, `content=...` wrappers from the LLM client). Every function here
//! is total: the worst case is a plain string coercion of the raw value.

use crate::types::{AgentOutput, OutputKind, Stage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").expect("valid fenced json regex"));

static CONTENT_WRAPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*content=(.*)$").expect("valid content wrapper regex"));

// Metadata the LLM client appends after the message body when it is printed.
static METADATA_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?:additional_kwargs=|response_metadata=|id=')").expect("valid metadata regex")
});

const SECTION_FIELDS: &[(&str, &str)] = &[
    ("key_insights", "Key Insights"),
    ("comparative_analysis", "Comparative Analysis"),
    ("narrative", "Narrative"),
    ("conclusion", "Conclusion"),
];

/// The field a stage's data object carries, tried in priority order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StagePayload<'a> {
    ResearchData(&'a Value),
    Analysis(&'a Value),
    Report(&'a Value),
    Unrecognized(&'a Value),
}

impl<'a> StagePayload<'a> {
    pub fn classify(data: &'a Value) -> Self {
        if let Some(map) = data.as_object() {
            if let Some(value) = map.get("research_data") {
                return StagePayload::ResearchData(value);
            }
            if let Some(value) = map.get("analysis") {
                return StagePayload::Analysis(value);
            }
            if let Some(value) = map.get("report") {
                return StagePayload::Report(value);
            }
        }
        StagePayload::Unrecognized(data)
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            StagePayload::ResearchData(_) => OutputKind::ResearchData,
            StagePayload::Analysis(_) => OutputKind::Analysis,
            StagePayload::Report(_) => OutputKind::Report,
            StagePayload::Unrecognized(_) => OutputKind::Raw,
        }
    }

    pub fn render(&self) -> String {
        match self {
            StagePayload::ResearchData(value) => normalize_research(value),
            StagePayload::Analysis(value) => normalize_analysis(value),
            StagePayload::Report(value) => normalize_report(value),
            StagePayload::Unrecognized(value) => stringify(value),
        }
    }
}

/// Normalize one stage entry of an `update` payload.
pub fn normalize_stage(stage: Stage, data: &Value) -> AgentOutput {
    let payload = StagePayload::classify(data);
    AgentOutput::new(stage, payload.kind(), payload.render())
}

/// Normalize an `update` payload. One output per top-level entry; a payload
/// that is not an object yields nothing.
pub fn normalize_update(payload: &Value) -> Vec<AgentOutput> {
    let Some(entries) = payload.as_object() else {
        tracing::debug!(payload = %payload, "update payload is not an object");
        return Vec::new();
    };
    entries
        .iter()
        .map(|(name, data)| normalize_stage(Stage::from_name(name), data))
        .collect()
}

/// Normalize the pipeline's `end` event, which carries the final report.
pub fn normalize_final_report(payload: &Value) -> Option<AgentOutput> {
    let report = payload.get("report")?;
    Some(AgentOutput::new(
        Stage::ReportWriter,
        OutputKind::Report,
        normalize_report(report),
    ))
}

/// Human-readable message of an `error` event.
pub fn error_message(payload: &Value) -> String {
    match payload.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(other) => stringify(other),
        None => stringify(payload),
    }
}

pub fn normalize_research(value: &Value) -> String {
    if let Value::Array(items) = value {
        let texts: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
        if let Some(texts) = texts {
            return texts.join("\n\n");
        }
    }
    stringify(value)
}

pub fn normalize_analysis(value: &Value) -> String {
    match first_element(value) {
        None => String::new(),
        Some(Value::String(text)) => analysis_text(text),
        Some(Value::Object(map)) => render_structured(map),
        Some(other) => stringify(other),
    }
}

pub fn normalize_report(value: &Value) -> String {
    let text = match first_element(value) {
        None => String::new(),
        Some(Value::String(text)) => strip_content_wrapper(text).unwrap_or_else(|| text.clone()),
        Some(Value::Object(map)) => match map.get("error") {
            Some(error) if !error.is_null() => render_error(error, map.get("raw_output")),
            _ => render_structured(map),
        },
        Some(other) => stringify(other),
    };
    // The renderer owns the heading hierarchy around this text.
    downgrade_level_two_headings(&text)
}

fn analysis_text(text: &str) -> String {
    if let Some(fenced) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return match parse_fenced_object(fenced.as_str()) {
            Some(map) => render_structured(&map),
            None => text.to_string(),
        };
    }
    unescape_newlines(text)
}

/// Parse a fenced block body as a JSON object. A printed message object
/// carries its newlines as literal `\n` escapes: first those around the
/// body are trimmed, then the ones between tokens are unescaped.
fn parse_fenced_object(body: &str) -> Option<Map<String, Value>> {
    let trimmed = trim_escaped_newlines(body);
    let parsed = serde_json::from_str::<Value>(trimmed)
        .or_else(|_| serde_json::from_str::<Value>(&unescape_newlines(trimmed)));
    match parsed {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(error = %err, "fenced analysis JSON did not parse");
            None
        }
    }
}

fn trim_escaped_newlines(text: &str) -> &str {
    let mut text = text.trim();
    loop {
        let trimmed = text
            .trim_start_matches("\\r\\n")
            .trim_start_matches("\\n")
            .trim_end_matches("\\r\\n")
            .trim_end_matches("\\n")
            .trim();
        if trimmed.len() == text.len() {
            return trimmed;
        }
        text = trimmed;
    }
}

/// `content='...'` / `content="..."` / `content=...` as printed by the LLM
/// client, with its metadata tail removed.
fn strip_content_wrapper(text: &str) -> Option<String> {
    let inner = CONTENT_WRAPPER.captures(text)?.get(1)?.as_str();
    let inner = match METADATA_TAIL.find(inner) {
        Some(tail) => &inner[..tail.start()],
        None => inner,
    };
    Some(unescape_newlines(strip_quotes(inner.trim())))
}

fn strip_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(rest) = text.strip_prefix(quote) {
            return rest.strip_suffix(quote).unwrap_or(rest);
        }
    }
    text
}

fn unescape_newlines(text: &str) -> String {
    text.replace("\\r\\n", "\n").replace("\\n", "\n")
}

fn render_structured(map: &Map<String, Value>) -> String {
    let sections: Vec<String> = SECTION_FIELDS
        .iter()
        .filter_map(|(key, label)| {
            let value = map.get(*key).filter(|v| !v.is_null())?;
            Some(format!("**{}**\n\n{}", label, render_field(value)))
        })
        .collect();

    if sections.is_empty() {
        pretty_json(&Value::Object(map.clone()))
    } else {
        sections.join("\n\n")
    }
}

fn render_error(error: &Value, raw_output: Option<&Value>) -> String {
    let mut out = format!("**Error**\n\n{}", stringify(error));
    if let Some(raw) = raw_output.filter(|v| !v.is_null()) {
        out.push_str("\n\n**Raw Output**\n\n");
        out.push_str(&stringify(raw));
    }
    out
}

fn render_field(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| format!("- {}", item.trim()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => pretty_json(other),
    }
}

fn downgrade_level_two_headings(text: &str) -> String {
    text.split('\n')
        .map(|line| match line.trim_start().strip_prefix("## ") {
            Some(title) => {
                let title = title.trim().trim_end_matches('#').trim_end();
                if title.is_empty() {
                    String::new()
                } else {
                    format!("**{}**", title)
                }
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_element(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
