//! Parsing of `podman events` output lines.
//!
//! The line format is an external contract owned by podman: a
//! whitespace-separated preamble (date, time, zone abbreviation, zone
//! offset, resource kind, event kind, resource id) followed by a
//! parenthesized, comma-separated `key=value` attribute list, e.g.
//!
//! ```text
//! 2024-01-01 10:00:00.000000000 -0500 -05:00 container start abc123 (image=nginx:latest, name=web1)
//! ```
//!
//! Anything that does not match (unknown resource kinds, event kinds
//! outside the start/died whitelist, malformed timestamps or attributes)
//! is discarded rather than treated as an error, so a format drift in a
//! future podman release degrades to "ignored" instead of a crash.

use chrono::{DateTime, FixedOffset};

/// Container state transitions the reconciler reacts to. Every other
/// event kind podman emits is discarded at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Died,
}

/// One observed container lifecycle transition.
///
/// Only constructible through [`parse_event`], so an instance always
/// represents a well-formed `container` line with a whitelisted kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub timestamp: DateTime<FixedOffset>,
    pub kind: EventKind,
    pub container_id: String,
    pub container_name: String,
    pub container_image: String,
    pub container_app: Option<String>,
}

/// Parse one raw event line. Returns `None` for every line the reconciler
/// should ignore; this function never panics on malformed input.
pub fn parse_event(line: &str) -> Option<LifecycleEvent> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open {
        return None;
    }

    let preamble = line[..open].trim_end();
    let attributes = &line[open + 1..close];

    let tokens: Vec<&str> = preamble.split_whitespace().collect();
    if tokens.len() < 7 {
        return None;
    }

    if tokens[4] != "container" {
        return None;
    }

    let kind = match tokens[5] {
        "start" => EventKind::Start,
        "died" => EventKind::Died,
        _ => return None,
    };

    let timestamp = parse_timestamp(tokens[0], tokens[1], tokens[3])?;
    let container_id = tokens[6];

    let mut image = None;
    let mut name = None;
    let mut app = None;
    for item in attributes.split(", ") {
        let (key, value) = item.split_once('=')?;
        match key {
            "image" => image = Some(value),
            "name" => name = Some(value),
            "app" => app = Some(value),
            _ => {}
        }
    }

    Some(LifecycleEvent {
        timestamp,
        kind,
        container_id: container_id.to_string(),
        container_name: name?.to_string(),
        container_image: image?.to_string(),
        container_app: app.map(str::to_string),
    })
}

/// Rebuild an offset-aware timestamp from the date token, the time token
/// truncated to millisecond precision, and the zone-offset token. The
/// offset gains a literal `:00` seconds field so it parses as a full
/// ISO-8601 seconds-precision offset.
fn parse_timestamp(date: &str, time: &str, offset: &str) -> Option<DateTime<FixedOffset>> {
    let time = time.get(..12).unwrap_or(time);
    let stamp = format!("{date} {time}{offset}:00");
    DateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S%.f%::z").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const START_LINE: &str = "2024-01-01 10:00:00.000000000 -0500 -05:00 container start abc123 (image=nginx:latest, name=web1)";

    fn line_for(event: &LifecycleEvent) -> String {
        let kind = match event.kind {
            EventKind::Start => "start",
            EventKind::Died => "died",
        };
        let mut attributes = format!(
            "image={}, name={}",
            event.container_image, event.container_name
        );
        if let Some(app) = &event.container_app {
            attributes.push_str(&format!(", app={app}"));
        }
        format!(
            "{} {} container {} {} ({})",
            event.timestamp.format("%Y-%m-%d %H:%M:%S%.9f %z"),
            event.timestamp.format("%:z"),
            kind,
            event.container_id,
            attributes
        )
    }

    #[test]
    fn test_parse_start_event() {
        let event = parse_event(START_LINE).expect("line should parse");

        assert_eq!(event.kind, EventKind::Start);
        assert_eq!(event.container_id, "abc123");
        assert_eq!(event.container_name, "web1");
        assert_eq!(event.container_image, "nginx:latest");
        assert_eq!(event.container_app, None);

        let expected = FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
            .unwrap();
        assert_eq!(event.timestamp, expected);
    }

    #[test]
    fn test_parse_died_event_with_app_label() {
        let line = "2024-01-01 10:05:12.345678901 +0200 +02:00 container died def456 (image=docker.io/library/redis:7, name=cache-1, app=storefront)";
        let event = parse_event(line).expect("line should parse");

        assert_eq!(event.kind, EventKind::Died);
        assert_eq!(event.container_id, "def456");
        assert_eq!(event.container_name, "cache-1");
        assert_eq!(event.container_image, "docker.io/library/redis:7");
        assert_eq!(event.container_app.as_deref(), Some("storefront"));
    }

    #[test]
    fn test_non_container_resource_discarded() {
        let line = "2024-01-01 10:00:00.000000000 -0500 -05:00 volume create vol1 (image=, name=vol1)";
        assert_eq!(parse_event(line), None);
    }

    #[test]
    fn test_unlisted_event_kinds_discarded() {
        for kind in ["health_status", "create", "remove", "pause"] {
            let line = format!(
                "2024-01-01 10:00:00.000000000 -0500 -05:00 container {kind} abc123 (image=nginx:latest, name=web1)"
            );
            assert_eq!(parse_event(&line), None, "kind {kind} should be discarded");
        }
    }

    #[test]
    fn test_missing_parenthesis_discarded() {
        let line = "2024-01-01 10:00:00.000000000 -0500 -05:00 container start abc123 image=nginx, name=web1";
        assert_eq!(parse_event(line), None);
    }

    #[test]
    fn test_short_preamble_discarded() {
        assert_eq!(parse_event("container start abc123 (image=a, name=b)"), None);
    }

    #[test]
    fn test_bad_timestamp_discarded() {
        let line = "yesterday morning tz CEST container start abc123 (image=nginx, name=web1)";
        assert_eq!(parse_event(line), None);
    }

    #[test]
    fn test_attribute_without_equals_discarded() {
        let line =
            "2024-01-01 10:00:00.000000000 -0500 -05:00 container start abc123 (image=nginx, name)";
        assert_eq!(parse_event(line), None);
    }

    #[test]
    fn test_missing_name_attribute_discarded() {
        let line =
            "2024-01-01 10:00:00.000000000 -0500 -05:00 container start abc123 (image=nginx)";
        assert_eq!(parse_event(line), None);
    }

    #[test]
    fn test_missing_image_attribute_discarded() {
        let line =
            "2024-01-01 10:00:00.000000000 -0500 -05:00 container start abc123 (name=web1)";
        assert_eq!(parse_event(line), None);
    }

    #[test]
    fn test_value_containing_equals_kept_whole() {
        let line = "2024-01-01 10:00:00.000000000 -0500 -05:00 container start abc123 (image=reg.local/app:v=2, name=web1)";
        let event = parse_event(line).expect("line should parse");
        assert_eq!(event.container_image, "reg.local/app:v=2");
    }

    #[test]
    fn test_round_trip() {
        let event = parse_event(START_LINE).expect("line should parse");
        let rebuilt = line_for(&event);
        assert_eq!(parse_event(&rebuilt), Some(event));
    }

    #[test]
    fn test_round_trip_with_app() {
        let line = "2024-03-15 23:59:59.999999999 +0100 +01:00 container died 0f3c (image=img:1, name=api-2, app=billing)";
        let event = parse_event(line).expect("line should parse");
        let rebuilt = line_for(&event);
        assert_eq!(parse_event(&rebuilt), Some(event));
    }
}
