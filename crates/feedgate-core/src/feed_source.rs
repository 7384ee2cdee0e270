//! Upstream adapter contract.
//!
//! Provider-specific HTTP parsing lives outside the core. The handler only needs
//! a [`FeedSource`]: something that, given a [`FeedKey`], returns loosely typed
//! JSON that is validated into a [`QuoteSet`](crate::QuoteSet) before caching.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FeedError, FeedKind, ProviderId};

/// Feed plus an optional symbol subset. An empty subset means the whole feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedKey {
    pub feed: FeedKind,
    pub symbols: Vec<String>,
}

impl FeedKey {
    pub fn whole(feed: FeedKind) -> Self {
        Self {
            feed,
            symbols: Vec::new(),
        }
    }

    /// Symbols are trimmed, upper-cased, sorted and de-duplicated.
    pub fn symbols<I, S>(feed: FeedKind, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols: Vec<String> = symbols
            .into_iter()
            .map(|symbol| symbol.as_ref().trim().to_ascii_uppercase())
            .filter(|symbol| !symbol.is_empty())
            .collect();
        symbols.sort();
        symbols.dedup();
        Self { feed, symbols }
    }

    pub fn is_whole_feed(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Normalized key shared by every caller asking for the same upstream data.
    pub fn dedup_key(&self) -> String {
        if self.symbols.is_empty() {
            return self.feed.as_str().to_owned();
        }
        format!("{}:{}", self.feed, self.symbols.join(","))
    }
}

impl Display for FeedKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dedup_key())
    }
}

/// Unvalidated upstream payload: a quotes array or an object with a `quotes` array.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload(Value);

impl RawPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for RawPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Injected upstream capability for one feed.
pub trait FeedSource: Send + Sync {
    fn provider(&self) -> &ProviderId;

    fn fetch<'a>(
        &'a self,
        key: &'a FeedKey,
    ) -> Pin<Box<dyn Future<Output = Result<RawPayload, FeedError>> + Send + 'a>>;

    /// Budget units charged per upstream call.
    fn cost(&self, key: &FeedKey) -> u32 {
        let _ = key;
        1
    }
}
