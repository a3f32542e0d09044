//! Turns raw counter payloads into metric points.
//!
//! Every function here is pure. A failure only ever discards the payload it
//! was given.

use crate::domain::conventions::SemanticConventions;
use crate::domain::errors::DecodeError;
use crate::domain::metric_point::{MetricPoint, Tags};
use crate::domain::payload::DiagnosticPayload;
use crate::domain::ports::FlushRound;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Fixed inputs shared by every payload decoded in a round.
pub struct DecodeContext<'a> {
    pub measurement: &'a str,
    pub application: &'a str,
    pub application_version: &'a str,
    pub tracked_sources: &'a [String],
    pub conventions: &'a dyn SemanticConventions,
}

impl DecodeContext<'_> {
    fn is_tracked(&self, source_name: &str) -> bool {
        self.tracked_sources.iter().any(|s| s == source_name)
    }
}

/// Result of decoding one flush round.
#[derive(Debug, Default)]
pub struct DecodedRound {
    pub points: Vec<MetricPoint>,
    pub failures: Vec<DecodeError>,
}

/// Parse `key:value,key:value` metadata.
///
/// Blank segments are skipped. A segment without `:` or with an empty key
/// makes the whole string malformed.
pub fn parse_metadata(metadata: &str) -> Result<HashMap<String, String>, DecodeError> {
    let mut tags = HashMap::new();
    for segment in metadata.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let malformed = || DecodeError::MalformedMetadata {
            metadata: metadata.to_string(),
            segment: segment.to_string(),
        };
        let (key, value) = segment.split_once(':').ok_or_else(malformed)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed());
        }
        tags.insert(key.to_string(), value.trim().to_string());
    }
    Ok(tags)
}

/// Decode one payload emitted by `source_name`.
pub fn decode_payload(
    source_name: &str,
    raw: &Value,
    ctx: &DecodeContext<'_>,
    now: DateTime<Utc>,
) -> Result<MetricPoint, DecodeError> {
    if !ctx.is_tracked(source_name) {
        return Err(DecodeError::UntrackedSource {
            source_name: source_name.to_string(),
        });
    }

    let payload: DiagnosticPayload =
        serde_json::from_value(raw.clone()).map_err(|e| DecodeError::Malformed {
            reason: e.to_string(),
        })?;
    if payload.name.is_empty() {
        return Err(DecodeError::Malformed {
            reason: "empty counter name".to_string(),
        });
    }

    let cache_name_tag = ctx.conventions.cache_name_tag();
    let metadata = parse_metadata(&payload.metadata)?;
    let cache_name = metadata
        .get(cache_name_tag)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DecodeError::MissingTag {
            metadata: payload.metadata.clone(),
            key: cache_name_tag.to_string(),
        })?;

    let value = payload.value().ok_or_else(|| DecodeError::MissingValue {
        counter: payload.name.clone(),
    })?;
    if !value.is_finite() {
        return Err(DecodeError::NonFiniteValue {
            counter: payload.name.clone(),
        });
    }

    let mut tags = Tags::new();
    tags.insert(
        ctx.conventions.application_tag().to_string(),
        ctx.application.to_string(),
    );
    tags.insert(
        ctx.conventions.application_version_tag().to_string(),
        ctx.application_version.to_string(),
    );
    tags.insert(cache_name_tag.to_string(), cache_name.clone());
    tags.insert(
        ctx.conventions.cache_event_tag().to_string(),
        payload.name.clone(),
    );

    Ok(MetricPoint::new(
        ctx.measurement,
        value.round() as i64,
        tags,
        now,
    ))
}

/// Decode every payload of a round into one batch.
pub fn decode_round(round: &FlushRound, ctx: &DecodeContext<'_>, now: DateTime<Utc>) -> DecodedRound {
    let mut decoded = DecodedRound::default();
    if !ctx.is_tracked(&round.source_name) {
        debug!(
            "MetricsBridge: Ignoring {} payloads from untracked source {}",
            round.payloads.len(),
            round.source_name
        );
        return decoded;
    }

    for raw in &round.payloads {
        match decode_payload(&round.source_name, raw, ctx, now) {
            Ok(point) => decoded.points.push(point),
            Err(e) => {
                debug!("MetricsBridge: Dropping payload from {}: {}", round.source_name, e);
                decoded.failures.push(e);
            }
        }
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conventions::DefaultConventions;
    use chrono::TimeZone;
    use serde_json::json;

    fn tracked() -> Vec<String> {
        vec!["email".to_string(), "domain".to_string(), "inbox".to_string()]
    }

    fn ctx<'a>(tracked: &'a [String]) -> DecodeContext<'a> {
        DecodeContext {
            measurement: "dev_mailer_cache_events",
            application: "mailer",
            application_version: "2.0.0",
            tracked_sources: tracked,
            conventions: &DefaultConventions,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_123, 456_000_000).unwrap()
    }

    #[test]
    fn test_parse_metadata_pairs() {
        let tags = parse_metadata("cacheName:email, application:mailer").unwrap();
        assert_eq!(tags.get("cacheName").map(String::as_str), Some("email"));
        assert_eq!(tags.get("application").map(String::as_str), Some("mailer"));
    }

    #[test]
    fn test_parse_metadata_keeps_colons_in_value() {
        let tags = parse_metadata("cacheName:a:b").unwrap();
        assert_eq!(tags.get("cacheName").map(String::as_str), Some("a:b"));
    }

    #[test]
    fn test_parse_metadata_rejects_bare_segment() {
        let err = parse_metadata("cacheName:email,garbage").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedMetadata { segment, .. } if segment == "garbage"));
        assert!(parse_metadata(":value").is_err());
    }

    #[test]
    fn test_parse_metadata_empty_is_empty_map() {
        assert!(parse_metadata("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_incrementing_payload() {
        let tracked = tracked();
        let raw = json!({"Name": "HIT", "Metadata": "cacheName:inbox", "Increment": 7.0});
        let point = decode_payload("inbox", &raw, &ctx(&tracked), now()).unwrap();

        assert_eq!(point.measurement(), "dev_mailer_cache_events");
        assert_eq!(point.value(), 7);
        assert_eq!(point.tag("cacheName"), Some("inbox"));
        assert_eq!(point.tag("cacheEvent"), Some("HIT"));
        assert_eq!(point.tag("application"), Some("mailer"));
        assert_eq!(point.tag("applicationVersion"), Some("2.0.0"));
        assert_eq!(point.timestamp().timestamp(), 1_700_000_123);
        assert_eq!(point.timestamp().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_decode_falls_back_to_mean_and_rounds() {
        let tracked = tracked();
        let raw = json!({"Name": "item_count", "Metadata": "cacheName:email", "Mean": 41.6});
        let point = decode_payload("email", &raw, &ctx(&tracked), now()).unwrap();
        assert_eq!(point.value(), 42);
    }

    #[test]
    fn test_decode_errors() {
        let tracked = tracked();
        let ctx = ctx(&tracked);

        let missing_value = json!({"Name": "hit", "Metadata": "cacheName:email"});
        assert!(matches!(
            decode_payload("email", &missing_value, &ctx, now()),
            Err(DecodeError::MissingValue { .. })
        ));

        let missing_tag = json!({"Name": "hit", "Metadata": "other:x", "Increment": 1.0});
        assert!(matches!(
            decode_payload("email", &missing_tag, &ctx, now()),
            Err(DecodeError::MissingTag { .. })
        ));

        let not_a_record = json!(["hit", 1]);
        assert!(matches!(
            decode_payload("email", &not_a_record, &ctx, now()),
            Err(DecodeError::Malformed { .. })
        ));

        let untracked = json!({"Name": "hit", "Metadata": "cacheName:x", "Increment": 1.0});
        assert!(matches!(
            decode_payload("sessions", &untracked, &ctx, now()),
            Err(DecodeError::UntrackedSource { .. })
        ));
    }

    #[test]
    fn test_malformed_payload_does_not_poison_round() {
        let tracked = tracked();
        let mut payloads: Vec<Value> = (0..9)
            .map(|i| json!({"Name": format!("counter_{i}"), "Metadata": "cacheName:email", "Increment": i as f64}))
            .collect();
        payloads.insert(4, json!({"Name": "broken", "Metadata": "cacheName=email", "Increment": 1.0}));
        let round = FlushRound {
            source_name: "email".to_string(),
            payloads,
        };

        let decoded = decode_round(&round, &ctx(&tracked), now());
        assert_eq!(decoded.points.len(), 9);
        assert_eq!(decoded.failures.len(), 1);
    }

    #[test]
    fn test_untracked_round_yields_nothing() {
        let tracked = tracked();
        let round = FlushRound {
            source_name: "sessions".to_string(),
            payloads: vec![json!({"Name": "hit", "Metadata": "cacheName:sessions", "Increment": 1.0})],
        };
        let decoded = decode_round(&round, &ctx(&tracked), now());
        assert!(decoded.points.is_empty());
    }
}
