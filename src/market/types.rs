use crate::error::AppError;
use crate::session::Settings;
use chrono::NaiveDateTime;
use serde::Serialize;

pub const DIGEST_MAX_ENTRIES: usize = 30;
pub const MAX_FETCH_ATTEMPTS: u32 = 3;
pub const BULLISH_COLOR: &str = "#16a34a";
pub const BEARISH_COLOR: &str = "#ef4444";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CandleTrend {
    Bullish,
    Bearish,
}

impl CandleTrend {
    pub fn classify(open: f64, close: f64) -> Self {
        if close >= open {
            Self::Bullish
        } else {
            Self::Bearish
        }
    }

    /// Color tag consumed by the chart rendering collaborator.
    pub fn color(self) -> &'static str {
        match self {
            Self::Bullish => BULLISH_COLOR,
            Self::Bearish => BEARISH_COLOR,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColoredCandle {
    #[serde(flatten)]
    pub candle: Candle,
    pub trend: CandleTrend,
    pub color: &'static str,
}

impl ColoredCandle {
    pub fn from_candle(candle: Candle) -> Self {
        let trend = CandleTrend::classify(candle.open, candle.close);
        Self {
            candle,
            trend,
            color: trend.color(),
        }
    }
}

/// Output of one normalization pass: chart-ready points (all parseable
/// entries, ascending by timestamp), the truncated human-readable digest and
/// the resolved ticker symbol, if any.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketUpdate {
    pub points: Vec<ColoredCandle>,
    pub digest_text: String,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub url: String,
    pub interval_ms: u64,
}

impl PollConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let url = settings.poll_url.trim().to_string();
        if url.is_empty() {
            return Err(AppError::InvalidArgument(
                "poll URL must be configured before starting the market poll".to_string(),
            ));
        }

        Ok(Self {
            url,
            interval_ms: settings
                .poll_interval_ms
                .max(crate::session::MIN_POLL_INTERVAL_MS),
        })
    }
}
