use crate::market::types::{Candle, ColoredCandle, MarketUpdate, DIGEST_MAX_ENTRIES};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::fmt::Write as _;

const TIME_SERIES_KEYS: &[&str] = &["Time Series (15min)", "timeSeries", "Time Series"];
const OPEN_KEYS: &[&str] = &["1. open", "open"];
const HIGH_KEYS: &[&str] = &["2. high", "high"];
const LOW_KEYS: &[&str] = &["3. low", "low"];
const CLOSE_KEYS: &[&str] = &["4. close", "close"];
const VOLUME_KEYS: &[&str] = &["5. volume", "volume"];

/// Normalizes one upstream market-data document into chart-ready points and a
/// digest. Pure and total: no I/O, no errors. Returns `None` when no candle
/// container resolves, in which case the caller keeps the previous chart
/// state (stale-but-valid beats blank).
pub fn normalize(document: &Value) -> Option<MarketUpdate> {
    let container = resolve_candle_container(document)?;
    let series = resolve_time_series(container)?;
    let symbol = resolve_symbol(document, container);

    let mut digest_text = String::new();
    let mut digest_count = 0_usize;
    let mut points = Vec::new();

    for (timestamp_raw, entry) in series {
        let Some(fields) = entry.as_object() else {
            continue;
        };

        let open = numeric_field(fields, OPEN_KEYS);
        let high = numeric_field(fields, HIGH_KEYS);
        let low = numeric_field(fields, LOW_KEYS);
        let close = numeric_field(fields, CLOSE_KEYS);
        let volume = integer_field(fields, VOLUME_KEYS).unwrap_or(0);

        // The digest is bounded; invalid fields still get a best-effort line.
        if digest_count < DIGEST_MAX_ENTRIES {
            let _ = writeln!(
                digest_text,
                "Timestamp: {timestamp_raw}, Open: {}, High: {}, Low: {}, Close: {}, Volume: {volume}",
                open.unwrap_or(f64::NAN),
                high.unwrap_or(f64::NAN),
                low.unwrap_or(f64::NAN),
                close.unwrap_or(f64::NAN),
            );
            digest_count += 1;
        }

        let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
            continue;
        };
        let Some(timestamp) = parse_candle_timestamp(timestamp_raw) else {
            continue;
        };

        points.push(ColoredCandle::from_candle(Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }));
    }

    // Upstream key order is not guaranteed.
    points.sort_by_key(|point| point.candle.timestamp);

    Some(MarketUpdate {
        points,
        digest_text,
        symbol,
    })
}

/// Walks the nesting paths observed across backend versions, newest first.
fn resolve_candle_container(document: &Value) -> Option<&Map<String, Value>> {
    let candlestick = document.get("Candlestick")?;
    let all_candles = candlestick.get("allCandles").and_then(|value| value.get(0));

    if let Some(candles) = all_candles
        .and_then(|value| value.get("candles"))
        .and_then(Value::as_object)
    {
        return Some(candles);
    }
    if let Some(container) = all_candles.and_then(Value::as_object) {
        return Some(container);
    }
    candlestick.get("candles").and_then(Value::as_object)
}

fn resolve_time_series(container: &Map<String, Value>) -> Option<&Map<String, Value>> {
    // A named series key wins even when empty; falling through to the
    // container would misread metadata keys as candle entries.
    for key in TIME_SERIES_KEYS {
        if let Some(series) = container.get(*key).and_then(Value::as_object) {
            return if series.is_empty() { None } else { Some(series) };
        }
    }

    // Some responses key the candles directly on the container.
    if container.is_empty() {
        None
    } else {
        Some(container)
    }
}

fn resolve_symbol(document: &Value, container: &Map<String, Value>) -> Option<String> {
    let candlestick = document.get("Candlestick");
    let all_candles = candlestick
        .and_then(|value| value.get("allCandles"))
        .and_then(|value| value.get(0));

    let meta = container
        .get("Meta Data")
        .or_else(|| all_candles.and_then(|value| value.get("Meta Data")))
        .or_else(|| all_candles.and_then(|value| value.get("meta")))
        .or_else(|| candlestick.and_then(|value| value.get("meta")));

    meta.and_then(|meta| meta.get("2. Symbol"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            candlestick
                .and_then(|value| value.get("symbol"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

fn numeric_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(parsed) = fields.get(*key).and_then(parse_f64) {
            return Some(parsed);
        }
    }
    None
}

fn integer_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(parsed) = fields.get(*key).and_then(parse_i64) {
            return Some(parsed);
        }
    }
    None
}

fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|parsed| parsed.is_finite()),
        Value::String(raw) => raw.trim().parse::<f64>().ok().filter(|parsed| parsed.is_finite()),
        _ => None,
    }
}

fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|parsed| parsed.is_finite()).map(|parsed| parsed as i64)),
        Value::String(raw) => {
            let trimmed = raw.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().filter(|parsed| parsed.is_finite()).map(|parsed| parsed as i64))
        }
        _ => None,
    }
}

fn parse_candle_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_utc());
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::CandleTrend;
    use serde_json::json;

    fn wrap_series(series: Value) -> Value {
        json!({
            "Candlestick": {
                "allCandles": [
                    {
                        "candles": {
                            "Meta Data": {"2. Symbol": "IBM"},
                            "Time Series (15min)": series
                        }
                    }
                ]
            }
        })
    }

    #[test]
    fn parses_worked_example_as_single_bullish_point() {
        let document = wrap_series(json!({
            "2024-01-01T00:00": {
                "1. open": "10",
                "2. high": "12",
                "3. low": "9",
                "4. close": "11",
                "5. volume": "100"
            }
        }));

        let update = normalize(&document).expect("series should resolve");
        assert_eq!(update.points.len(), 1);
        assert_eq!(update.symbol.as_deref(), Some("IBM"));

        let point = &update.points[0];
        assert_eq!(point.candle.open, 10.0);
        assert_eq!(point.candle.high, 12.0);
        assert_eq!(point.candle.low, 9.0);
        assert_eq!(point.candle.close, 11.0);
        assert_eq!(point.candle.volume, 100);
        assert_eq!(point.trend, CandleTrend::Bullish);
        assert_eq!(
            point.candle.timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .expect("valid timestamp")
        );
    }

    #[test]
    fn digest_truncates_at_thirty_entries_points_do_not() {
        let mut series = Map::new();
        for minute in 0..45 {
            series.insert(
                format!("2024-01-01 10:{minute:02}:00"),
                json!({
                    "1. open": "10",
                    "2. high": "12",
                    "3. low": "9",
                    "4. close": "11",
                    "5. volume": "5"
                }),
            );
        }

        let update = normalize(&wrap_series(Value::Object(series))).expect("series resolves");
        assert_eq!(update.digest_text.lines().count(), DIGEST_MAX_ENTRIES);
        assert_eq!(update.points.len(), 45);
    }

    #[test]
    fn points_sort_ascending_regardless_of_source_order() {
        let document = wrap_series(json!({
            "2024-01-02 00:00:00": {"1. open": 1, "2. high": 2, "3. low": 1, "4. close": 2, "5. volume": 1},
            "2024-01-01 00:00:00": {"1. open": 1, "2. high": 2, "3. low": 1, "4. close": 2, "5. volume": 1},
            "2024-01-03 00:00:00": {"1. open": 1, "2. high": 2, "3. low": 1, "4. close": 2, "5. volume": 1}
        }));

        let update = normalize(&document).expect("series resolves");
        let timestamps: Vec<NaiveDateTime> = update
            .points
            .iter()
            .map(|point| point.candle.timestamp)
            .collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
        assert_eq!(timestamps.len(), 3);
    }

    #[test]
    fn non_numeric_price_excludes_point_but_keeps_digest_line() {
        let document = wrap_series(json!({
            "2024-01-01 00:00:00": {
                "1. open": "garbage",
                "2. high": "12",
                "3. low": "9",
                "4. close": "11",
                "5. volume": "100"
            }
        }));

        let update = normalize(&document).expect("series resolves");
        assert!(update.points.is_empty());
        assert_eq!(update.digest_text.lines().count(), 1);
        assert!(update.digest_text.contains("Open: NaN"));
    }

    #[test]
    fn non_numeric_volume_defaults_to_zero_without_excluding_point() {
        let document = wrap_series(json!({
            "2024-01-01 00:00:00": {
                "1. open": "10",
                "2. high": "12",
                "3. low": "9",
                "4. close": "11",
                "5. volume": "n/a"
            }
        }));

        let update = normalize(&document).expect("series resolves");
        assert_eq!(update.points.len(), 1);
        assert_eq!(update.points[0].candle.volume, 0);
        assert!(update.digest_text.contains("Volume: 0"));
    }

    #[test]
    fn unparseable_timestamp_drops_point_not_digest() {
        let document = wrap_series(json!({
            "not a timestamp": {
                "1. open": "10",
                "2. high": "12",
                "3. low": "9",
                "4. close": "11",
                "5. volume": "100"
            }
        }));

        let update = normalize(&document).expect("series resolves");
        assert!(update.points.is_empty());
        assert_eq!(update.digest_text.lines().count(), 1);
    }

    #[test]
    fn resolves_container_without_inner_candles_nesting() {
        let document = json!({
            "Candlestick": {
                "allCandles": [
                    {
                        "Time Series": {
                            "2024-01-01 00:00:00": {
                                "1. open": 10, "2. high": 12, "3. low": 9, "4. close": 8, "5. volume": 1
                            }
                        }
                    }
                ]
            }
        });

        let update = normalize(&document).expect("series resolves");
        assert_eq!(update.points.len(), 1);
        assert_eq!(update.points[0].trend, CandleTrend::Bearish);
    }

    #[test]
    fn resolves_series_keyed_directly_on_container() {
        let document = json!({
            "Candlestick": {
                "symbol": "AAPL",
                "allCandles": [
                    {
                        "candles": {
                            "2024-01-01 00:00:00": {
                                "open": "10", "high": "12", "low": "9", "close": "11", "volume": 3
                            }
                        }
                    }
                ]
            }
        });

        let update = normalize(&document).expect("series resolves");
        assert_eq!(update.points.len(), 1);
        assert_eq!(update.symbol.as_deref(), Some("AAPL"));
    }

    #[test]
    fn missing_container_aborts_the_update() {
        assert!(normalize(&json!({"Body": "all good"})).is_none());
        assert!(normalize(&json!({"Candlestick": {"allCandles": []}})).is_none());
        assert!(normalize(&json!({"Candlestick": {"allCandles": [{"candles": {}}]}})).is_none());
        assert!(normalize(&json!(null)).is_none());
        assert!(normalize(&json!("text")).is_none());
    }

    #[test]
    fn empty_named_series_aborts_instead_of_digesting_metadata() {
        let document = wrap_series(json!({}));

        // The container still holds "Meta Data"; treating it as candle
        // entries would fabricate a junk digest.
        assert!(normalize(&document).is_none());
    }

    #[test]
    fn missing_symbol_is_not_an_error() {
        let document = json!({
            "Candlestick": {
                "allCandles": [
                    {
                        "candles": {
                            "2024-01-01 00:00:00": {
                                "1. open": 1, "2. high": 2, "3. low": 1, "4. close": 2, "5. volume": 1
                            }
                        }
                    }
                ]
            }
        });

        let update = normalize(&document).expect("series resolves");
        assert!(update.symbol.is_none());
        assert_eq!(update.points.len(), 1);
    }

    #[test]
    fn normalization_is_deterministic() {
        let document = wrap_series(json!({
            "2024-01-01 00:00:00": {
                "1. open": "10", "2. high": "12", "3. low": "9", "4. close": "11", "5. volume": "100"
            }
        }));

        assert_eq!(normalize(&document), normalize(&document));
    }

    #[test]
    fn timestamp_format_ladder_accepts_common_shapes() {
        for raw in [
            "2024-01-01 19:45:00",
            "2024-01-01T19:45:00",
            "2024-01-01 19:45",
            "2024-01-01T19:45",
            "2024-01-01",
            "2024-01-01T19:45:00Z",
            "2024-01-01T19:45:00+02:00",
        ] {
            assert!(parse_candle_timestamp(raw).is_some(), "failed to parse {raw}");
        }
        assert!(parse_candle_timestamp("yesterday").is_none());
    }
}
