//! Ingestion: 200 body -> `RawAdRow`s.
//!
//! This is the only place wire shapes are interpreted. Everything downstream
//! works on normalized rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use super::types::{AdMetadata, DatasetMetadata, RawAdRow};
use crate::error::InsightsError;

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPeriod {
    pub rows: Vec<RawAdRow>,
    pub metadata: DatasetMetadata,
}

pub fn normalize_period_body(body: &str) -> Result<NormalizedPeriod, InsightsError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| InsightsError::Decode(format!("period body is not JSON: {}", e)))?;
    let root = value
        .as_object()
        .ok_or_else(|| InsightsError::Decode("period body is not an object".to_string()))?;

    let empty = Map::new();
    let meta_ads = root
        .get("meta_v1")
        .and_then(|meta| meta.get("ads"))
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let raw_rows = match root.get("agg_v1").and_then(|agg| agg.get("rows")) {
        Some(Value::Array(rows)) => rows.as_slice(),
        Some(_) => {
            return Err(InsightsError::Decode("agg_v1.rows is not an array".to_string()));
        }
        None => &[],
    };

    let mut rows = Vec::with_capacity(raw_rows.len());
    let mut rejected = 0usize;
    for raw in raw_rows {
        match normalize_row(raw, meta_ads) {
            Some(row) => rows.push(row),
            None => rejected += 1,
        }
    }
    if rejected > 0 {
        warn!("Dropped {} period rows without ad_id or date", rejected);
    }

    let mut metadata = root
        .get("metadata")
        .map(parse_dataset_metadata)
        .unwrap_or_default();
    metadata.row_count = rows.len();
    metadata.rejected_rows = rejected;

    Ok(NormalizedPeriod { rows, metadata })
}

fn normalize_row(raw: &Value, meta_ads: &Map<String, Value>) -> Option<RawAdRow> {
    let row = raw.as_object()?;
    let ad_id = text(row.get("ad_id")?)?;
    let date = parse_date(row.get("date")?)?;

    let mut metadata = meta_ads
        .get(&ad_id)
        .map(parse_ad_metadata)
        .unwrap_or_default();
    overlay_metadata(&mut metadata, row);

    Some(RawAdRow {
        ad_id,
        date,
        spend: float(row.get("spend")),
        impressions: count(row.get("impressions")),
        clicks: count(row.get("clicks")),
        purchases: count(row.get("purchases")),
        purchase_value: float(row.get("purchase_value")),
        metadata,
    })
}

fn parse_ad_metadata(value: &Value) -> AdMetadata {
    let mut metadata = AdMetadata::default();
    if let Some(fields) = value.as_object() {
        overlay_metadata(&mut metadata, fields);
    }
    metadata
}

/// Inline values win over whatever is already set.
fn overlay_metadata(metadata: &mut AdMetadata, fields: &Map<String, Value>) {
    let set = |slot: &mut String, key: &str| {
        if let Some(value) = fields.get(key).and_then(text) {
            *slot = value;
        }
    };
    set(&mut metadata.name, "name");
    set(&mut metadata.format, "format");
    set(&mut metadata.account_id, "account_id");
    set(&mut metadata.account_name, "account_name");
    set(&mut metadata.status, "status");

    if let Some(created) = fields.get("created_time").and_then(parse_timestamp) {
        metadata.created_time = Some(created);
    }
}

fn parse_dataset_metadata(value: &Value) -> DatasetMetadata {
    let get_u32 = |key: &str| {
        value
            .get(key)
            .and_then(number)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
    };
    DatasetMetadata {
        tenant_id: value.get("tenant_id").and_then(text),
        accounts_total: get_u32("accounts_total"),
        accounts_loaded: get_u32("accounts_loaded"),
        accounts_failed: get_u32("accounts_failed"),
        reference_date: value.get("reference_date").and_then(parse_date),
        row_count: 0,
        rejected_rows: 0,
    }
}

/// Non-empty string, or a number rendered as one (ids sometimes arrive numeric).
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn float(value: Option<&Value>) -> f64 {
    value.and_then(number).unwrap_or(0.0)
}

fn count(value: Option<&Value>) -> u64 {
    value
        .and_then(number)
        .filter(|n| *n > 0.0)
        .map(|n| n.round() as u64)
        .unwrap_or(0)
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    // Timestamps are accepted; only the calendar day is kept.
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Graph API style offsets without a colon, e.g. 2024-01-05T10:00:00+0000.
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn body(value: Value) -> String {
        value.to_string()
    }

    #[test]
    fn test_meta_and_rows_are_joined() {
        let parsed = normalize_period_body(&body(json!({
            "meta_v1": {"ads": {"a1": {
                "name": "Spring hook",
                "format": "video",
                "created_time": "2024-03-01T09:30:00+0000",
                "account_id": "act_1",
                "account_name": "Main",
                "status": "ACTIVE"
            }}},
            "agg_v1": {"rows": [
                {"ad_id": "a1", "date": "2024-03-02", "spend": 10.5, "impressions": 1000,
                 "clicks": 20, "purchases": 1, "purchase_value": 30.0}
            ]}
        })))
        .unwrap();

        assert_eq!(parsed.rows.len(), 1);
        let row = &parsed.rows[0];
        assert_eq!(row.metadata.name, "Spring hook");
        assert_eq!(row.metadata.account_id, "act_1");
        assert_eq!(
            row.metadata.created_time.unwrap().to_rfc3339(),
            "2024-03-01T09:30:00+00:00"
        );
        assert_eq!(row.impressions, 1000);
        assert_eq!(parsed.metadata.row_count, 1);
    }

    #[test]
    fn test_numeric_strings_and_missing_metrics() {
        let parsed = normalize_period_body(&body(json!({
            "agg_v1": {"rows": [
                {"ad_id": "a1", "date": "2024-03-02", "spend": "12.25", "clicks": "7"}
            ]}
        })))
        .unwrap();

        let row = &parsed.rows[0];
        assert_eq!(row.spend, 12.25);
        assert_eq!(row.clicks, 7);
        assert_eq!(row.impressions, 0);
        assert_eq!(row.purchase_value, 0.0);
    }

    #[test]
    fn test_inline_metadata_wins_over_meta() {
        let parsed = normalize_period_body(&body(json!({
            "meta_v1": {"ads": {"a1": {"name": "Old name", "format": "image"}}},
            "agg_v1": {"rows": [
                {"ad_id": "a1", "date": "2024-03-02", "name": "New name"}
            ]}
        })))
        .unwrap();

        let metadata = &parsed.rows[0].metadata;
        assert_eq!(metadata.name, "New name");
        assert_eq!(metadata.format, "image");
    }

    #[test]
    fn test_rows_without_id_or_date_are_rejected() {
        let parsed = normalize_period_body(&body(json!({
            "agg_v1": {"rows": [
                {"ad_id": "a1", "date": "2024-03-02"},
                {"date": "2024-03-02", "spend": 5},
                {"ad_id": "a2", "date": "yesterday"},
                "garbage"
            ]}
        })))
        .unwrap();

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.metadata.rejected_rows, 3);
    }

    #[test]
    fn test_dataset_metadata() {
        let parsed = normalize_period_body(&body(json!({
            "agg_v1": {"rows": []},
            "metadata": {"tenant_id": "t-1", "accounts_total": 3, "accounts_loaded": 2,
                         "accounts_failed": 1, "reference_date": "2024-03-31"}
        })))
        .unwrap();

        assert_eq!(parsed.metadata.tenant_id.as_deref(), Some("t-1"));
        assert_eq!(parsed.metadata.accounts_failed, Some(1));
        assert_eq!(
            parsed.metadata.reference_date,
            NaiveDate::from_ymd_opt(2024, 3, 31)
        );
    }

    #[test]
    fn test_missing_rows_is_empty_dataset() {
        let parsed = normalize_period_body("{}").unwrap();
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(normalize_period_body("<html>"), Err(InsightsError::Decode(_))));
        assert!(matches!(normalize_period_body("[]"), Err(InsightsError::Decode(_))));
        assert!(matches!(
            normalize_period_body(r#"{"agg_v1": {"rows": 5}}"#),
            Err(InsightsError::Decode(_))
        ));
    }

    #[test]
    fn test_timestamp_date_keeps_day() {
        let parsed = normalize_period_body(&body(json!({
            "agg_v1": {"rows": [{"ad_id": 42, "date": "2024-03-02T00:00:00Z"}]}
        })))
        .unwrap();
        assert_eq!(parsed.rows[0].ad_id, "42");
        assert_eq!(parsed.rows[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }
}
