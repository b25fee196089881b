//! Console rendering of outputs and status snapshots.

use std::collections::BTreeMap;
use std::fmt::Write;

use flowwatch_types::{current_timestamp_ms, MonitoringStatus, OutputRecord, TopicStatistics};

/// Characters of payload shown per output line.
pub const PREVIEW_CHARS: usize = 120;

/// How outputs are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One human-readable line per output.
    #[default]
    Text,
    /// One JSON object per output.
    Json,
}

/// Render one output.
pub fn output_line(record: &OutputRecord, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let key = record
                .key
                .as_deref()
                .map(|k| format!(" key={}", k))
                .unwrap_or_default();
            format!(
                "[{}] {} ({}#{}@{}){} {}",
                record.sequence,
                record.flow_id,
                record.topic,
                record.partition,
                record.offset,
                key,
                record.payload.preview(PREVIEW_CHARS)
            )
        }
        OutputFormat::Json => serde_json::to_string(record)
            .unwrap_or_else(|e| format!(r#"{{"error":"unserializable record: {}"}}"#, e)),
    }
}

/// Render a periodic status report.
pub fn status_report(
    status: &MonitoringStatus,
    statistics: &BTreeMap<String, TopicStatistics>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Monitoring status");
    let _ = writeln!(out, "  State:          {}", status.state);
    let _ = writeln!(out, "  Active:         {}", status.is_monitoring);
    let _ = writeln!(out, "  Total outputs:  {}", status.total_outputs);
    let _ = writeln!(out, "  Topics:         {}", status.topic_count);
    let _ = writeln!(
        out,
        "  Cached:         {}/{}",
        status.cached_outputs, status.capacity
    );

    if !statistics.is_empty() {
        let _ = writeln!(out, "Topic statistics");
        let now = current_timestamp_ms();
        for stats in statistics.values() {
            let _ = write!(out, "  {}: {} messages", stats.topic, stats.message_count);
            if let Some(last) = stats.last_message_ms {
                let _ = write!(out, ", last {} ago", format_age(now.saturating_sub(last)));
            }
            let _ = writeln!(out);
        }
    }
    out
}

/// Render the summary printed on shutdown.
pub fn final_report(
    status: &MonitoringStatus,
    statistics: &BTreeMap<String, TopicStatistics>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Final statistics");
    let _ = writeln!(out, "  Total outputs processed: {}", status.total_outputs);
    for stats in statistics.values() {
        let _ = writeln!(out, "  {}: {} messages", stats.topic, stats.message_count);
    }
    out
}

/// Compact age such as `850ms`, `12s`, `3m04s` or `2h15m`.
pub fn format_age(ms: u64) -> String {
    let secs = ms / 1000;
    if secs == 0 {
        format!("{}ms", ms)
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowwatch_types::{FlowId, MonitorState, Payload};

    fn record() -> OutputRecord {
        let flow = FlowId::parse("acme-alice-ingest").unwrap();
        let mut record = OutputRecord::new(
            flow,
            "acme-alice-ingest-topic",
            Payload::from_bytes(br#"{"ok":true}"#),
        )
        .with_key("k1")
        .with_position(0, 41);
        record.sequence = 7;
        record
    }

    #[test]
    fn text_line_shows_flow_and_payload() {
        let line = output_line(&record(), OutputFormat::Text);
        assert_eq!(
            line,
            r#"[7] acme-alice-ingest (acme-alice-ingest-topic#0@41) key=k1 {"ok":true}"#
        );
    }

    #[test]
    fn json_line_is_parseable() {
        let line = output_line(&record(), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["flow_id"], "acme-alice-ingest");
        assert_eq!(value["offset"], 41);
    }

    #[test]
    fn status_report_lists_topics() {
        let status = MonitoringStatus {
            is_monitoring: true,
            state: MonitorState::Active,
            total_outputs: 12,
            topic_count: 1,
            topics: vec!["a-b-c-topic".into()],
            cached_outputs: 12,
            capacity: 500,
        };
        let mut stats = TopicStatistics::new("a-b-c-topic");
        stats.message_count = 12;
        let statistics = BTreeMap::from([("a-b-c-topic".to_string(), stats)]);

        let report = status_report(&status, &statistics);

        assert!(report.contains("State:          active"));
        assert!(report.contains("Cached:         12/500"));
        assert!(report.contains("a-b-c-topic: 12 messages"));
        assert!(!report.contains("ago"));
    }

    #[test]
    fn final_report_totals() {
        let status = MonitoringStatus {
            total_outputs: 3,
            ..MonitoringStatus::default()
        };
        let report = final_report(&status, &BTreeMap::new());
        assert!(report.contains("Total outputs processed: 3"));
    }

    #[test]
    fn ages_are_compact() {
        assert_eq!(format_age(850), "850ms");
        assert_eq!(format_age(12_000), "12s");
        assert_eq!(format_age(184_000), "3m04s");
        assert_eq!(format_age(8_100_000), "2h15m");
    }
}
