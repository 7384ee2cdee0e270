//! # Domain Models
//!
//! Validated payload types for every feed.
//!
//! | Type | Feed | Identity |
//! |------|------|----------|
//! | [`FxQuote`] | fx | `pair` |
//! | [`CryptoQuote`] | crypto | `symbol` |
//! | [`CommodityQuote`] | commodities | `symbol` |
//! | [`IndexQuote`] | indices | `symbol` |
//! | [`WeatherDatum`] | weather | `location` |
//!
//! All feeds share the [`QuoteSet`] payload shape (`{ "quotes": [...] }`).
//! Upstream JSON only becomes a `QuoteSet` through [`QuoteSet::from_value`], which
//! rejects malformed or implausible items so they never reach the cache.

mod quotes;
mod timestamp;

pub use quotes::{
    CommodityQuote, CryptoQuote, FeedItem, FxQuote, IndexQuote, QuoteSet, WeatherDatum,
};
pub use timestamp::UtcDateTime;
