use crate::error::FrameError;
use crate::types::{EventKind, StreamEvent};
use serde_json::Value;

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

/// Split a complete frame into its event name and raw data string.
///
/// The data string is everything after the first `data:` line's prefix;
/// any following lines belong to it, with repeated `data:` prefixes stripped.
pub fn split_frame(frame: &str) -> Result<(String, String), FrameError> {
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.split('\n') {
        if !data_lines.is_empty() {
            data_lines.push(strip_field(line, DATA_PREFIX).unwrap_or(line));
            continue;
        }
        if event.is_none() {
            if let Some(name) = strip_field(line, EVENT_PREFIX) {
                event = Some(name.trim().to_string());
            }
            continue;
        }
        if let Some(data) = strip_field(line, DATA_PREFIX) {
            data_lines.push(data);
        }
    }

    let event = match event {
        Some(name) if !name.is_empty() => name,
        _ => return Err(FrameError::MissingEvent),
    };
    if data_lines.is_empty() {
        return Err(FrameError::MissingData { event });
    }
    Ok((event, data_lines.join("\n")))
}

/// Parse a complete frame into a typed event.
pub fn parse_frame(frame: &str) -> Result<StreamEvent, FrameError> {
    let (event, data) = split_frame(frame)?;
    let payload: Value = serde_json::from_str(data.trim())
        .map_err(|source| FrameError::InvalidJson {
            event: event.clone(),
            source,
        })?;
    Ok(StreamEvent {
        kind: EventKind::from_name(&event),
        payload,
    })
}

fn strip_field<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let value = line.strip_prefix(prefix)?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_update_frame() {
        let event = parse_frame(
            "event: update\ndata: {\"analyst\": {\"analysis\": [\"text\"]}}",
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::Update);
        assert_eq!(event.payload, json!({"analyst": {"analysis": ["text"]}}));
    }

    #[test]
    fn unknown_event_names_are_preserved() {
        let event = parse_frame("event: heartbeat\ndata: {}").unwrap();
        assert_eq!(event.kind, EventKind::Unknown("heartbeat".to_string()));
    }

    #[test]
    fn data_continues_across_lines() {
        let (event, data) = split_frame("event: update\ndata: {\"a\":\n1}").unwrap();
        assert_eq!(event, "update");
        assert_eq!(data, "{\"a\":\n1}");

        let (_, data) = split_frame("event: update\ndata: [1,\ndata: 2]").unwrap();
        assert_eq!(data, "[1,\n2]");
        let event = parse_frame("event: update\ndata: [1,\ndata: 2]").unwrap();
        assert_eq!(event.payload, json!([1, 2]));
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = parse_frame("event: update\ndata: {not json").unwrap_err();
        assert!(matches!(err, FrameError::InvalidJson { ref event, .. } if event == "update"));
    }

    #[test]
    fn missing_lines_are_reported() {
        assert!(matches!(
            parse_frame("data: {}"),
            Err(FrameError::MissingEvent)
        ));
        assert!(matches!(
            parse_frame("event: update"),
            Err(FrameError::MissingData { .. })
        ));
    }
}
