//! Request-content matching strategies: exact, pattern, fuzzy, fuzzy-unordered.
//!
//! See the summary table in the module-level docs of [`crate`] for the
//! method/path, header, and body comparison rules each strategy applies.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::redact::Redactor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    Pattern,
    Fuzzy,
    FuzzyUnordered,
}

/// The shape of a live or recorded request needed to evaluate a match.
pub struct MatchCandidate<'a> {
    pub method: &'a str,
    pub endpoint: &'a str,
    pub headers: &'a HashMap<String, String>,
    pub body: &'a [u8],
}

/// Headers that vary call-to-call regardless of whether the underlying
/// request is "the same". Always excluded under fuzzy modes, in addition
/// to any caller-configured `ignore_fields`.
pub const DEFAULT_FUZZY_IGNORED_HEADERS: &[&str] =
    &["content-length", "content-md5", "date", "if-none-match", "if-modified-since"];

/// `true` if `candidate` (a stored recording) matches `live` (the incoming
/// request) under `strategy`. `ignore_fields` names header/JSON keys that
/// fuzzy modes exclude entirely from comparison (present on either side),
/// in addition to [`DEFAULT_FUZZY_IGNORED_HEADERS`].
pub fn matches(
    strategy: MatchStrategy,
    recorded: &MatchCandidate,
    live: &MatchCandidate,
    redactor: &Redactor,
    ignore_fields: &[String],
) -> bool {
    if recorded.method != live.method {
        return false;
    }

    match strategy {
        MatchStrategy::Exact => {
            recorded.endpoint == live.endpoint
                && headers_equal(recorded.headers, live.headers, redactor, &[])
                && recorded.body == live.body
        }
        MatchStrategy::Pattern => {
            path_matches_pattern(recorded.endpoint, live.endpoint)
                && headers_equal(recorded.headers, live.headers, redactor, &[])
                && recorded.body == live.body
        }
        MatchStrategy::Fuzzy => {
            let ignored = fuzzy_ignored_fields(ignore_fields);
            segments_match_fuzzy(recorded.endpoint, live.endpoint)
                && headers_equal(recorded.headers, live.headers, redactor, &ignored)
                && bodies_match_fuzzy(recorded.body, live.body, ignore_fields, false)
        }
        MatchStrategy::FuzzyUnordered => {
            let ignored = fuzzy_ignored_fields(ignore_fields);
            segments_match_fuzzy(recorded.endpoint, live.endpoint)
                && headers_equal(recorded.headers, live.headers, redactor, &ignored)
                && bodies_match_fuzzy(recorded.body, live.body, ignore_fields, true)
        }
    }
}

fn fuzzy_ignored_fields(caller_configured: &[String]) -> Vec<String> {
    DEFAULT_FUZZY_IGNORED_HEADERS
        .iter()
        .map(|s| s.to_string())
        .chain(caller_configured.iter().cloned())
        .collect()
}

fn path_matches_pattern(recorded_pattern: &str, live_path: &str) -> bool {
    match Regex::new(recorded_pattern) {
        Ok(re) => re.is_match(live_path),
        Err(_) => false,
    }
}

fn headers_equal(
    recorded: &HashMap<String, String>,
    live: &HashMap<String, String>,
    redactor: &Redactor,
    ignore_fields: &[String],
) -> bool {
    let recorded = redactor.redact_headers(recorded);
    let live = redactor.redact_headers(live);

    let relevant = |headers: &HashMap<String, String>| -> HashMap<String, String> {
        headers
            .iter()
            .filter(|(k, _)| !ignore_fields.iter().any(|f| f.eq_ignore_ascii_case(k)))
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect()
    };

    relevant(&recorded) == relevant(&live)
}

/// `true` if a path segment looks like a decimal integer or a canonical
/// 36-character, 4-dash UUID: the two "wildcard-equivalent" shapes fuzzy
/// matching treats as interchangeable.
fn is_numeric_or_uuid(segment: &str) -> bool {
    if segment.parse::<i64>().is_ok() {
        return true;
    }
    is_uuid_shape(segment)
}

fn is_uuid_shape(segment: &str) -> bool {
    if segment.len() != 36 {
        return false;
    }
    let bytes = segment.as_bytes();
    let dash_positions = [8, 13, 18, 23];
    for (i, &b) in bytes.iter().enumerate() {
        if dash_positions.contains(&i) {
            if b != b'-' {
                return false;
            }
        } else if !b.is_ascii_hexdigit() {
            return false;
        }
    }
    true
}

fn segments_match_fuzzy(recorded_path: &str, live_path: &str) -> bool {
    let recorded: Vec<&str> = recorded_path.split('/').collect();
    let live: Vec<&str> = live_path.split('/').collect();

    if recorded.len() != live.len() {
        return false;
    }

    recorded
        .iter()
        .zip(live.iter())
        .all(|(r, l)| r == l || (is_numeric_or_uuid(r) && is_numeric_or_uuid(l)))
}

fn bodies_match_fuzzy(recorded: &[u8], live: &[u8], ignore_fields: &[String], unordered_arrays: bool) -> bool {
    let recorded_json = serde_json::from_slice::<Value>(recorded);
    let live_json = serde_json::from_slice::<Value>(live);

    match (recorded_json, live_json) {
        (Ok(r), Ok(l)) => json_structurally_equal(&r, &l, ignore_fields, unordered_arrays),
        _ => recorded == live,
    }
}

/// Structural JSON equality that normalizes UUID-shaped string leaves (any
/// UUID compares equal to any other UUID) and optionally ignores array
/// ordering via bipartite matching.
fn json_structurally_equal(a: &Value, b: &Value, ignore_fields: &[String], unordered_arrays: bool) -> bool {
    match (a, b) {
        (Value::Object(map_a), Value::Object(map_b)) => {
            let keys_a: Vec<&String> = map_a
                .keys()
                .filter(|k| !ignore_fields.iter().any(|f| f == k.as_str()))
                .collect();
            let keys_b: Vec<&String> = map_b
                .keys()
                .filter(|k| !ignore_fields.iter().any(|f| f == k.as_str()))
                .collect();

            if keys_a.len() != keys_b.len() {
                return false;
            }
            keys_a.iter().all(|k| {
                map_b.contains_key(k.as_str())
                    && json_structurally_equal(&map_a[k.as_str()], &map_b[k.as_str()], ignore_fields, unordered_arrays)
            })
        }
        (Value::Array(arr_a), Value::Array(arr_b)) => {
            if arr_a.len() != arr_b.len() {
                return false;
            }
            if unordered_arrays {
                arrays_match_unordered(arr_a, arr_b, ignore_fields)
            } else {
                arr_a
                    .iter()
                    .zip(arr_b.iter())
                    .all(|(x, y)| json_structurally_equal(x, y, ignore_fields, unordered_arrays))
            }
        }
        (Value::String(s_a), Value::String(s_b)) => s_a == s_b || (is_uuid_shape(s_a) && is_uuid_shape(s_b)),
        _ => a == b,
    }
}

/// Bipartite match: every element of `a` has some not-yet-used element of
/// `b` it's structurally equal to. O(n^2) greedy matching is sufficient;
/// recorded request bodies are small.
fn arrays_match_unordered(a: &[Value], b: &[Value], ignore_fields: &[String]) -> bool {
    let mut used = vec![false; b.len()];
    for item_a in a {
        let found = b.iter().enumerate().position(|(i, item_b)| {
            !used[i] && json_structurally_equal(item_a, item_b, ignore_fields, true)
        });
        match found {
            Some(i) => used[i] = true,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(method: &'a str, endpoint: &'a str, headers: &'a HashMap<String, String>, body: &'a [u8]) -> MatchCandidate<'a> {
        MatchCandidate { method, endpoint, headers, body }
    }

    #[test]
    fn exact_requires_identical_path_and_body() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded = candidate("GET", "/v1/items/1", &headers, b"{}");
        let live_match = candidate("GET", "/v1/items/1", &headers, b"{}");
        let live_mismatch = candidate("GET", "/v1/items/2", &headers, b"{}");

        assert!(matches(MatchStrategy::Exact, &recorded, &live_match, &redactor, &[]));
        assert!(!matches(MatchStrategy::Exact, &recorded, &live_mismatch, &redactor, &[]));
    }

    #[test]
    fn pattern_treats_recorded_endpoint_as_regex() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded = candidate("GET", r"^/v1/items/\d+$", &headers, b"{}");
        let live = candidate("GET", "/v1/items/42", &headers, b"{}");
        assert!(matches(MatchStrategy::Pattern, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn fuzzy_allows_numeric_segment_substitution() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded = candidate("GET", "/v1/items/1", &headers, b"{}");
        let live = candidate("GET", "/v1/items/999", &headers, b"{}");
        assert!(matches(MatchStrategy::Fuzzy, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn fuzzy_rejects_non_numeric_segment_difference() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded = candidate("GET", "/v1/items/active", &headers, b"{}");
        let live = candidate("GET", "/v1/items/inactive", &headers, b"{}");
        assert!(!matches(MatchStrategy::Fuzzy, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn fuzzy_uuid_segments_are_interchangeable() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded = candidate("GET", "/v1/users/550e8400-e29b-41d4-a716-446655440000", &headers, b"{}");
        let live = candidate("GET", "/v1/users/6ba7b810-9dad-11d1-80b4-00c04fd430c8", &headers, b"{}");
        assert!(matches(MatchStrategy::Fuzzy, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn fuzzy_body_normalizes_uuid_leaves() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded_body = br#"{"id":"550e8400-e29b-41d4-a716-446655440000","name":"x"}"#;
        let live_body = br#"{"id":"6ba7b810-9dad-11d1-80b4-00c04fd430c8","name":"x"}"#;
        let recorded = candidate("POST", "/v1/items", &headers, recorded_body);
        let live = candidate("POST", "/v1/items", &headers, live_body);
        assert!(matches(MatchStrategy::Fuzzy, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn fuzzy_body_rejects_non_uuid_string_difference() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded_body = br#"{"name":"alice"}"#;
        let live_body = br#"{"name":"bob"}"#;
        let recorded = candidate("POST", "/v1/items", &headers, recorded_body);
        let live = candidate("POST", "/v1/items", &headers, live_body);
        assert!(!matches(MatchStrategy::Fuzzy, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn fuzzy_ordered_array_rejects_reordering() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded = candidate("POST", "/v1/items", &headers, br#"{"tags":["a","b"]}"#);
        let live = candidate("POST", "/v1/items", &headers, br#"{"tags":["b","a"]}"#);
        assert!(!matches(MatchStrategy::Fuzzy, &recorded, &live, &redactor, &[]));
        assert!(matches(MatchStrategy::FuzzyUnordered, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn fuzzy_unordered_requires_equal_length_arrays() {
        let headers = HashMap::new();
        let redactor = Redactor::empty();
        let recorded = candidate("POST", "/v1/items", &headers, br#"{"tags":["a","b"]}"#);
        let live = candidate("POST", "/v1/items", &headers, br#"{"tags":["a","b","c"]}"#);
        assert!(!matches(MatchStrategy::FuzzyUnordered, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn fuzzy_always_ignores_date_header() {
        let mut recorded_headers = HashMap::new();
        recorded_headers.insert("date".to_string(), "Mon, 01 Jan 2024 00:00:00 GMT".to_string());
        let mut live_headers = HashMap::new();
        live_headers.insert("date".to_string(), "Tue, 02 Jan 2024 00:00:00 GMT".to_string());
        let redactor = Redactor::empty();

        let recorded = candidate("GET", "/v1/items/1", &recorded_headers, b"{}");
        let live = candidate("GET", "/v1/items/1", &live_headers, b"{}");
        assert!(matches(MatchStrategy::Fuzzy, &recorded, &live, &redactor, &[]));
    }

    #[test]
    fn ignore_fields_excludes_named_header_and_json_key() {
        let mut recorded_headers = HashMap::new();
        recorded_headers.insert("x-trace-id".to_string(), "abc".to_string());
        let mut live_headers = HashMap::new();
        live_headers.insert("x-trace-id".to_string(), "xyz".to_string());
        let redactor = Redactor::empty();
        let ignore = vec!["x-trace-id".to_string()];

        let recorded = candidate("GET", "/v1/items/1", &recorded_headers, b"{}");
        let live = candidate("GET", "/v1/items/1", &live_headers, b"{}");
        assert!(matches(MatchStrategy::Fuzzy, &recorded, &live, &redactor, &ignore));
    }
}
