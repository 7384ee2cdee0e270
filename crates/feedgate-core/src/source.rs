use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Logical feed categories served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Fx,
    Crypto,
    Commodities,
    Indices,
    Weather,
}

impl FeedKind {
    pub const ALL: [Self; 5] = [
        Self::Fx,
        Self::Crypto,
        Self::Commodities,
        Self::Indices,
        Self::Weather,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fx => "fx",
            Self::Crypto => "crypto",
            Self::Commodities => "commodities",
            Self::Indices => "indices",
            Self::Weather => "weather",
        }
    }

    /// Upper-case token used in `FEEDGATE_<FEED>_*` variables.
    pub const fn env_token(self) -> &'static str {
        match self {
            Self::Fx => "FX",
            Self::Crypto => "CRYPTO",
            Self::Commodities => "COMMODITIES",
            Self::Indices => "INDICES",
            Self::Weather => "WEATHER",
        }
    }
}

impl Display for FeedKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fx" | "forex" => Ok(Self::Fx),
            "crypto" => Ok(Self::Crypto),
            "commodities" | "commodity" => Ok(Self::Commodities),
            "indices" | "index" => Ok(Self::Indices),
            "weather" => Ok(Self::Weather),
            other => Err(ValidationError::InvalidFeed {
                value: other.to_owned(),
            }),
        }
    }
}

/// Upstream provider (or account) identifier used in logs, metadata and budgets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let value = input.trim().to_ascii_lowercase();
        let valid = !value.is_empty()
            && value.len() <= 64
            && value
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');

        if !valid {
            return Err(ValidationError::InvalidProvider {
                value: input.to_owned(),
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Upper-case token used in `FEEDGATE_<PROVIDER>_*` variables.
    pub fn env_token(&self) -> String {
        self.0.replace('-', "_").to_ascii_uppercase()
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProviderId> for String {
    fn from(value: ProviderId) -> Self {
        value.0
    }
}
