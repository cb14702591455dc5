//! Reading and writing recorded sequences as JSON files.

use crate::error::{KsrError, Result};
use crate::event::KeyEvent;
use crate::keymap::UNKNOWN_KEY;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

/// Parse a sequence document.
///
/// The whole document is validated before anything is returned, so a
/// caller replacing its sequence with the result never sees partial data.
pub fn parse_sequence(content: &str) -> Result<Vec<KeyEvent>> {
    let document: Value =
        serde_json::from_str(content).map_err(|e| KsrError::format(e.to_string()))?;

    let items = match document {
        Value::Array(items) => items,
        _ => return Err(KsrError::format("expected an array of key events")),
    };

    let mut events = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            return Err(KsrError::format(format!(
                "event {} is not an object",
                index
            )));
        }

        let event: KeyEvent = serde_json::from_value(item)
            .map_err(|e| KsrError::format(format!("event {}: {}", index, e)))?;

        if event.key.trim().is_empty() || event.key == UNKNOWN_KEY {
            return Err(KsrError::format(format!(
                "event {} has no usable key name",
                index
            )));
        }
        events.push(event);
    }

    Ok(events)
}

/// Serialize a sequence as pretty-printed JSON.
pub fn to_json(events: &[KeyEvent]) -> Result<String> {
    Ok(serde_json::to_string_pretty(events)?)
}

pub fn load_sequence(path: impl AsRef<Path>) -> Result<Vec<KeyEvent>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let events = parse_sequence(&content)?;
    info!("Loaded {} events from {}", events.len(), path.display());
    Ok(events)
}

/// Write `events` to `path`. Saving an empty sequence is refused.
pub fn save_sequence(path: impl AsRef<Path>, events: &[KeyEvent]) -> Result<()> {
    if events.is_empty() {
        return Err(KsrError::empty_sequence("save"));
    }
    let path = path.as_ref();
    fs::write(path, to_json(events)?)?;
    info!("Saved {} events to {}", events.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeyState, NATIVE_CODE_FIELD};

    #[test]
    fn test_parse_valid_document() {
        let events = parse_sequence(
            r#"[
                {"key": "A", "state": "down", "delay": 0},
                {"key": "A", "state": "up", "delay": 85}
            ]"#,
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].state, KeyState::Up);
        assert_eq!(events[1].delay, 85);
        assert_eq!(events[0].native_code, None);
    }

    #[test]
    fn test_native_field_read_back() {
        let doc = format!(
            r#"[{{"key": "Enter", "state": "down", "delay": 3, "{}": 28}}]"#,
            NATIVE_CODE_FIELD
        );
        let events = parse_sequence(&doc).unwrap();
        assert_eq!(events[0].native_code, Some(28));
    }

    #[test]
    fn test_foreign_native_field_ignored() {
        let events = parse_sequence(
            r#"[{"key": "A", "state": "down", "delay": 0, "someOtherKeyCode": 4}]"#,
        )
        .unwrap();
        assert_eq!(events[0].key, "A");
    }

    #[test]
    fn test_rejects_malformed_documents() {
        for doc in [
            "not json",
            r#"{"key": "A", "state": "down", "delay": 0}"#,
            r#"[1, 2]"#,
            r#"[{"key": "A", "state": "sideways", "delay": 0}]"#,
            r#"[{"key": "A", "state": "down", "delay": -5}]"#,
            r#"[{"key": "A", "state": "down"}]"#,
            r#"[{"key": "", "state": "down", "delay": 0}]"#,
            r#"[{"key": "Unknown", "state": "down", "delay": 0}]"#,
        ] {
            assert!(
                matches!(parse_sequence(doc), Err(KsrError::Format(_))),
                "accepted: {}",
                doc
            );
        }
    }

    #[test]
    fn test_save_empty_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        assert!(matches!(
            save_sequence(&path, &[]),
            Err(KsrError::EmptySequence { .. })
        ));
        assert!(!path.exists());
    }
}
