use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FeedKind, UtcDateTime, ValidationError};

/// Item contract shared by every feed payload.
///
/// Implementations are the only shapes allowed into the cache: upstream JSON is
/// deserialized into `Self` and checked with [`FeedItem::validate`] before it is
/// accepted.
pub trait FeedItem:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: FeedKind;

    /// Identity used to merge partial refreshes (pair, symbol or location).
    fn item_key(&self) -> &str;

    fn validate(&self) -> Result<(), ValidationError>;
}

/// Spot FX rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxQuote {
    pub pair: String,
    pub rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<UtcDateTime>,
}

impl FeedItem for FxQuote {
    const KIND: FeedKind = FeedKind::Fx;

    fn item_key(&self) -> &str {
        &self.pair
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("pair", &self.pair)?;
        validate_positive("rate", self.rate)?;
        validate_optional_finite("changePct", self.change_pct)
    }
}

/// Crypto spot price. `price` stays `null` when the upstream has no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoQuote {
    pub symbol: String,
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_24h_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
}

impl FeedItem for CryptoQuote {
    const KIND: FeedKind = FeedKind::Crypto;

    fn item_key(&self) -> &str {
        &self.symbol
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("symbol", &self.symbol)?;
        if let Some(price) = self.price {
            validate_non_negative("price", price)?;
        }
        validate_optional_finite("change24hPct", self.change_24h_pct)?;
        if let Some(market_cap) = self.market_cap {
            validate_non_negative("marketCap", market_cap)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommodityQuote {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
}

impl FeedItem for CommodityQuote {
    const KIND: FeedKind = FeedKind::Commodities;

    fn item_key(&self) -> &str {
        &self.symbol
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("symbol", &self.symbol)?;
        validate_positive("price", self.price)?;
        validate_optional_finite("changePct", self.change_pct)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuote {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
}

impl FeedItem for IndexQuote {
    const KIND: FeedKind = FeedKind::Indices;

    fn item_key(&self) -> &str {
        &self.symbol
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("symbol", &self.symbol)?;
        validate_positive("value", self.value)?;
        validate_optional_finite("changePct", self.change_pct)
    }
}

/// Current conditions for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherDatum {
    pub location: String,
    pub temperature_c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_kph: Option<f64>,
}

impl FeedItem for WeatherDatum {
    const KIND: FeedKind = FeedKind::Weather;

    fn item_key(&self) -> &str {
        &self.location
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_identifier("location", &self.location)?;
        validate_finite("temperatureC", self.temperature_c)?;
        if !(-100.0..=70.0).contains(&self.temperature_c) {
            return Err(ValidationError::OutOfRange {
                field: "temperatureC",
                range: "-100..=70",
            });
        }
        if let Some(humidity) = self.humidity_pct {
            validate_finite("humidityPct", humidity)?;
            if !(0.0..=100.0).contains(&humidity) {
                return Err(ValidationError::OutOfRange {
                    field: "humidityPct",
                    range: "0..=100",
                });
            }
        }
        if let Some(wind) = self.wind_kph {
            validate_non_negative("windKph", wind)?;
        }
        Ok(())
    }
}

/// Payload shape shared by every feed: `{ "quotes": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "Q: DeserializeOwned"))]
pub struct QuoteSet<Q> {
    pub quotes: Vec<Q>,
}

impl<Q> QuoteSet<Q> {
    pub fn empty() -> Self {
        Self { quotes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl<Q: FeedItem> QuoteSet<Q> {
    /// Validates a loosely typed upstream value. Accepts either a bare array or an
    /// object carrying a `quotes` array; anything else is rejected.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let items = match value {
            Value::Array(_) => value,
            Value::Object(map) => map.get("quotes").ok_or_else(|| {
                ValidationError::MalformedPayload {
                    message: String::from("object payload has no 'quotes' field"),
                }
            })?,
            other => {
                return Err(ValidationError::MalformedPayload {
                    message: format!("expected array or object, found {}", json_type(other)),
                })
            }
        };

        let quotes: Vec<Q> = serde_json::from_value(items.clone()).map_err(|error| {
            ValidationError::MalformedPayload {
                message: format!("{} quotes: {error}", Q::KIND),
            }
        })?;

        if quotes.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }
        for quote in &quotes {
            quote.validate()?;
        }

        Ok(Self { quotes })
    }

    /// Merges a partial refresh: items with the same key are replaced in place,
    /// new items are appended.
    pub fn merge(&mut self, update: Self) {
        for item in update.quotes {
            match self
                .quotes
                .iter_mut()
                .find(|existing| existing.item_key() == item.item_key())
            {
                Some(existing) => *existing = item,
                None => self.quotes.push(item),
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyIdentifier { field });
    }
    Ok(())
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

fn validate_optional_finite(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |value| validate_finite(field, value))
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
