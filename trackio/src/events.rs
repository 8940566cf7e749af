use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::de::DeserializeOwned;

use trackcore::data::event::Event;

/// Parses one JSON document per line; blank lines are skipped.
///
/// # Arguments
///
/// * `reader` - Source of the lines.
/// * `source` - Name used in error messages.
///
pub fn parse_json_lines<T: DeserializeOwned, R: BufRead>(reader: R, source: &str) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("cannot read {} at line {}", source, i + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record =
            serde_json::from_str(&line).with_context(|| format!("malformed record in {} at line {}", source, i + 1))?;
        records.push(record);
    }
    Ok(records)
}

pub fn parse_events<R: BufRead>(reader: R, source: &str) -> Result<Vec<Event>> {
    parse_json_lines(reader, source)
}

pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let file = File::open(path).with_context(|| format!("cannot open event file {}", path.display()))?;
    let events = parse_events(BufReader::new(file), &path.display().to_string())?;
    info!("{} events read from {}", events.len(), path.display());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackcore::data::detector::DetectorId;

    #[test]
    fn test_parse_events_skips_blank_lines() {
        let input = concat!(
            r#"{"event_id": 1, "hits": {"y_fiber": [{"u": 1.0, "energy": 3.0, "time": 13470.0}]}}"#,
            "\n\n",
            r#"{"event_id": 2, "trigger_pattern": 1, "pid": {"beta": 0.7}}"#,
            "\n",
        );
        let events = parse_events(input.as_bytes(), "test").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].hits(DetectorId::YFiber)[0].time, Some(13470.0));
        assert_eq!(events[1].pid.unwrap().beta, 0.7);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let input = "{\"event_id\": 1}\n{\"event_id\": \"x\"}\n";
        let err = parse_events(input.as_bytes(), "run.jsonl").unwrap_err();
        assert!(format!("{:#}", err).contains("run.jsonl at line 2"));
    }
}
