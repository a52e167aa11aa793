pub mod normalizer;
pub mod poll;
pub mod types;

pub use normalizer::normalize;
pub use poll::{
    run_market_poll, start_market_poll, stop_market_poll, HttpMarketFetcher, MarketFetcher,
    POLL_ERROR_STATUS,
};
pub use types::{
    Candle, CandleTrend, ColoredCandle, MarketUpdate, PollConfig, BEARISH_COLOR, BULLISH_COLOR,
    DIGEST_MAX_ENTRIES, MAX_FETCH_ATTEMPTS,
};
