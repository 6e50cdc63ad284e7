//! Parser for the audio server's route listing.
//!
//! The listing is line oriented:
//!
//! ```text
//! Sink Input #83
//!     Driver: protocol-native.c
//!     Client: 81
//!     Volume: front-left: 65536 / 100% / 0.00 dB,   front-right: 65536 / 100% / 0.00 dB
//!             balance 0.00
//!     Buffer Latency: 0 usec
//!     Properties:
//!         application.name = "Firefox"
//! ```
//!
//! A header starts a record. `key: value` lines fill top-level fields; the
//! `Volume` and `Properties` keys open nested sections whose continuation
//! lines follow their own grammar. Numbers that fail to parse become zero.

use std::collections::{BTreeMap, HashSet};

use super::route::{Route, ROUTE_HEADER};
use crate::SnapshotError;

/// Accepted record headers. The second form is the audio-server-neutral spelling.
const HEADER_PREFIXES: [&str; 2] = [ROUTE_HEADER, "Route #"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Top,
    Volume,
    Properties,
}

/// Parses one listing into route records, in listing order.
///
/// # Errors
///
/// Returns [`SnapshotError::Malformed`] with the 1-based line number when a
/// header carries an id that is not an unsigned integer, or repeats an id
/// already seen in this listing.
///
/// # Example
///
/// ```
/// use stream_app_audio::parse_snapshot;
///
/// let routes = parse_snapshot(
///     "Sink Input #5\n\tClient: 3\n\tProperties:\n\t\tapplication.name = \"firefox\"\n",
/// )
/// .unwrap();
/// assert_eq!(routes[0].id, 5);
/// assert!(routes[0].belongs_to("Firefox"));
/// ```
pub fn parse_snapshot(text: &str) -> Result<Vec<Route>, SnapshotError> {
    let mut routes = Vec::new();
    let mut seen = HashSet::new();
    let mut current: Option<Route> = None;
    let mut section = Section::Top;

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(id_text) = header_id(line) {
            let id = id_text.trim().parse::<u32>().map_err(|e| {
                SnapshotError::malformed(line_number, format!("invalid route id '{id_text}': {e}"))
            })?;
            if !seen.insert(id) {
                return Err(SnapshotError::malformed(
                    line_number,
                    format!("duplicate route id {id}"),
                ));
            }
            routes.extend(current.replace(Route::new(id)));
            section = Section::Top;
            continue;
        }

        // Anything before the first header is not part of a record.
        let Some(route) = current.as_mut() else {
            continue;
        };
        section = apply_line(route, section, line);
    }

    routes.extend(current);
    Ok(routes)
}

fn header_id(line: &str) -> Option<&str> {
    HEADER_PREFIXES
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))
}

/// Applies one trimmed line to the current record, returning the section the
/// next line belongs to.
fn apply_line(route: &mut Route, section: Section, line: &str) -> Section {
    // Property values may contain ':' so they are matched first.
    if section == Section::Properties {
        if let Some((key, value)) = property_pair(line) {
            route.properties.set(key, unquote(value));
            return section;
        }
    }

    let pair = line
        .split_once(':')
        .map(|(key, value)| (key.trim(), value.trim()));

    if let Some((key, value)) = pair {
        if let Some(next) = apply_field(route, key, value) {
            return next;
        }
    }

    // Volume continuations are either `balance ..` or `channel: raw / pct%`.
    if section == Section::Volume && pair.map_or(true, |(_, value)| value.contains('/')) {
        apply_volume_line(route, line);
        return section;
    }

    if let Some((key, value)) = pair {
        route.unknown.insert(key.to_string(), value.to_string());
    }
    match section {
        Section::Volume => Section::Top,
        other => other,
    }
}

/// Sets a well-known top-level field. Returns `None` for keys outside the table.
fn apply_field(route: &mut Route, key: &str, value: &str) -> Option<Section> {
    match key {
        "Driver" => route.driver = value.to_string(),
        "Owner Module" => route.owner_module = value.to_string(),
        "Client" => route.client = leading_number(value),
        "Sink" => route.sink = leading_number(value),
        "Sample Specification" => route.sample_spec = value.to_string(),
        "Channel Map" => route.channel_map = value.to_string(),
        "Format" => route.format = value.to_string(),
        "Corked" => route.corked = value == "yes",
        "Mute" => route.muted = value == "yes",
        "Buffer Latency" => route.buffer_latency_usec = leading_number(value),
        "Sink Latency" => route.sink_latency_usec = leading_number(value),
        "Resample method" => route.resample_method = value.to_string(),
        "Volume" => {
            parse_volume_entries(value, &mut route.volume);
            return Some(Section::Volume);
        }
        "Properties" => return Some(Section::Properties),
        _ => return None,
    }
    Some(Section::Top)
}

fn apply_volume_line(route: &mut Route, line: &str) {
    if let Some(rest) = line.strip_prefix("balance") {
        route.balance = rest.trim().parse().unwrap_or(0.0);
    } else {
        parse_volume_entries(line, &mut route.volume);
    }
}

/// Parses `channel: raw / pct% [/ dB]` entries separated by commas.
fn parse_volume_entries(text: &str, volume: &mut BTreeMap<String, f64>) {
    for entry in text.split(',') {
        let Some((channel, levels)) = entry.split_once(':') else {
            continue;
        };
        let channel = channel.trim();
        if channel.is_empty() {
            continue;
        }
        let percent = levels
            .split('/')
            .nth(1)
            .and_then(|pct| pct.trim().trim_end_matches('%').trim().parse().ok())
            .unwrap_or(0.0);
        volume.insert(channel.to_string(), percent);
    }
}

/// Splits a `key = value` property line. Keys never contain whitespace.
fn property_pair(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, value.trim()))
}

/// Removes one pair of surrounding double quotes.
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parses the first whitespace-separated token, defaulting to zero.
fn leading_number<T: std::str::FromStr + Default>(value: &str) -> T {
    value
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_snapshot;

    const FIREFOX_AND_MPV: &str = "\
Sink Input #83
\tDriver: protocol-native.c
\tOwner Module: 9
\tClient: 81
\tSink: 0
\tSample Specification: float32le 2ch 48000Hz
\tChannel Map: front-left,front-right
\tFormat: pcm, format.sample_format = \"\\\"float32le\\\"\"  format.rate = \"48000\"
\tCorked: no
\tMute: no
\tVolume: front-left: 65536 / 100% / 0.00 dB,   front-right: 32768 /  50% / -18.06 dB
\t        balance -0.50
\tBuffer Latency: 12000 usec
\tSink Latency: 23219 usec
\tResample method: speex-float-1
\tProperties:
\t\tclient.api = \"pipewire-pulse\"
\t\tapplication.name = \"Firefox\"
\t\tapplication.process.id = \"4242\"
\t\twindow.x11.display = \":0\"
\t\tmedia.name = \"Video: Cats\"
\t\tX-Vendor.Tag = \"Mixed Case\"

Sink Input #91
\tDriver: PipeWire
\tClient: 90
\tCorked: yes
\tMute: yes
\tProperties:
\t\tapplication.name = \"mpv\"
";

    #[test]
    fn test_parses_records_in_order() {
        let routes = parse_snapshot(FIREFOX_AND_MPV).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].id, 83);
        assert_eq!(routes[1].id, 91);
    }

    #[test]
    fn test_parses_top_level_fields() {
        let routes = parse_snapshot(FIREFOX_AND_MPV).unwrap();
        let route = &routes[0];

        assert_eq!(route.driver, "protocol-native.c");
        assert_eq!(route.owner_module, "9");
        assert_eq!(route.client, 81);
        assert_eq!(route.sink, 0);
        assert_eq!(route.sample_spec, "float32le 2ch 48000Hz");
        assert_eq!(route.channel_map, "front-left,front-right");
        assert!(route.format.starts_with("pcm, format.sample_format"));
        assert!(!route.corked);
        assert!(!route.muted);
        assert_eq!(route.buffer_latency_usec, 12000);
        assert_eq!(route.sink_latency_usec, 23219);
        assert_eq!(route.resample_method, "speex-float-1");
        assert!(route.unknown.is_empty());
    }

    #[test]
    fn test_parses_volume_section() {
        let routes = parse_snapshot(FIREFOX_AND_MPV).unwrap();
        let route = &routes[0];

        assert_eq!(route.volume.get("front-left"), Some(&100.0));
        assert_eq!(route.volume.get("front-right"), Some(&50.0));
        assert!((route.balance - -0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_volume_continuation_lines() {
        let text = "Route #1\n\tVolume:\n\t\tmono: 65536 / 75%\n\t\tbalance 0.25\n";
        let routes = parse_snapshot(text).unwrap();
        assert_eq!(routes[0].volume.get("mono"), Some(&75.0));
        assert!((routes[0].balance - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parses_properties() {
        let routes = parse_snapshot(FIREFOX_AND_MPV).unwrap();
        let props = &routes[0].properties;

        assert_eq!(props.client_api, "pipewire-pulse");
        assert_eq!(props.application_name, "Firefox");
        assert_eq!(props.application_process_id, "4242");
        assert_eq!(props.window_x11_display, ":0");
        assert_eq!(props.media_name, "Video: Cats");
        assert_eq!(
            props.unknown.get("X-Vendor.Tag").map(String::as_str),
            Some("Mixed Case")
        );
        assert_eq!(routes[1].properties.application_name, "mpv");
    }

    #[test]
    fn test_flags() {
        let routes = parse_snapshot(FIREFOX_AND_MPV).unwrap();
        assert!(routes[1].corked);
        assert!(routes[1].muted);
    }

    #[test]
    fn test_last_record_included_without_trailing_header() {
        let routes = parse_snapshot("Sink Input #7\n\tDriver: x").unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].driver, "x");
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_snapshot("").unwrap().is_empty());
        assert!(parse_snapshot("\n\n  \n").unwrap().is_empty());
    }

    #[test]
    fn test_lines_before_first_header_are_ignored() {
        let routes = parse_snapshot("Driver: stray\nSink Input #1\n").unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].driver, "");
    }

    #[test]
    fn test_malformed_id_reports_line_number() {
        let text = "Sink Input #1\n\tDriver: a\n\nSink Input #abc\n";
        let err = parse_snapshot(text).unwrap_err();
        match err {
            SnapshotError::Malformed { line, reason } => {
                assert_eq!(line, 4);
                assert!(reason.contains("abc"));
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id_is_malformed() {
        let err = parse_snapshot("Route #3\nRoute #3\n").unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_lenient_numbers_default_to_zero() {
        let text = "\
Route #2
\tClient: n/a
\tSink: ???
\tBuffer Latency: lots usec
\tVolume: front-left: 65536 / loud% / 0 dB
\t        balance wobbly
";
        let routes = parse_snapshot(text).unwrap();
        let route = &routes[0];
        assert_eq!(route.client, 0);
        assert_eq!(route.sink, 0);
        assert_eq!(route.buffer_latency_usec, 0);
        assert_eq!(route.volume.get("front-left"), Some(&0.0));
        assert!(route.balance.abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_top_level_keys_are_kept() {
        let text = "Route #4\n\tPriority: high\n\tDriver: d\n";
        let routes = parse_snapshot(text).unwrap();
        assert_eq!(
            routes[0].unknown.get("Priority").map(String::as_str),
            Some("high")
        );
        assert_eq!(routes[0].driver, "d");
    }

    #[test]
    fn test_unknown_key_after_volume_block_is_kept() {
        let text = "\
Route #1
\tVolume: front-left: 65536 / 100% / 0.00 dB
\t        balance 0.25
\tPriority: high
\tDriver: d
";
        let route = &parse_snapshot(text).unwrap()[0];
        assert_eq!(route.unknown.get("Priority").map(String::as_str), Some("high"));
        assert_eq!(route.volume.len(), 1);
        assert_eq!(route.volume.get("front-left"), Some(&100.0));
        assert!((route.balance - 0.25).abs() < f64::EPSILON);
        assert_eq!(route.driver, "d");
    }

    #[test]
    fn test_unquote_strips_one_pair() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("\"\"abc\"\""), "\"abc\"");
        assert_eq!(unquote("bare"), "bare");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn test_round_trip_of_parsed_listing() {
        let routes = parse_snapshot(FIREFOX_AND_MPV).unwrap();
        let rendered = render_snapshot(&routes);
        let reparsed = parse_snapshot(&rendered).unwrap();
        assert_eq!(routes, reparsed);
    }

    #[test]
    fn test_unknown_properties_survive_any_position() {
        let orders = [
            "\t\tZZ.Odd = \"v 1\"\n\t\tapplication.name = \"App\"\n\t\taa.lower = \"x=y\"\n",
            "\t\tapplication.name = \"App\"\n\t\taa.lower = \"x=y\"\n\t\tZZ.Odd = \"v 1\"\n",
        ];
        for props in orders {
            let text = format!("Route #1\n\tDriver: d\n\tProperties:\n{props}");
            let routes = parse_snapshot(&text).unwrap();
            let unknown = &routes[0].properties.unknown;
            assert_eq!(unknown.get("ZZ.Odd").map(String::as_str), Some("v 1"));
            assert_eq!(unknown.get("aa.lower").map(String::as_str), Some("x=y"));
            assert_eq!(routes[0].application_name(), "App");

            let reparsed = parse_snapshot(&routes[0].to_string()).unwrap();
            assert_eq!(reparsed[0], routes[0]);
        }
    }
}
