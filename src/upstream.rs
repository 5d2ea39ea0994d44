//! Client for the GoGriddy pricing API.

use log::debug;
use reqwest::{
    blocking::Client,
    StatusCode,
    Url,
};
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

/// Number of forecast entries the exporter publishes.
pub const FORECAST_LEN: usize = 7;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Errors that fail a whole collection. No gauge of a failed collection is
/// exported.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The upstream call failed.
    #[error("upstream transport error: {0}")]
    Transport(#[from] TransportError),

    /// The upstream answered with something unusable.
    #[error("upstream format error: {0}")]
    Format(#[from] FormatError),
}

/// The upstream could not be reached or refused the request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS or protocol failure.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Requested url.
        url: Url,
        /// Underlying http client error.
        #[source]
        source: reqwest::Error,
    },

    /// Response carried a non success status.
    #[error("request to {url} answered with status {status}")]
    Status {
        /// Requested url.
        url: Url,
        /// Status of the response.
        status: StatusCode,
    },
}

/// The upstream answered but the response is not a usable price snapshot.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Body could not be read.
    #[error("can not read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// Body is not json or misses required fields.
    #[error("response is not a price snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// Fewer forecast entries than published.
    #[error("forecast has {len} entries but at least {FORECAST_LEN} are required")]
    ForecastTooShort {
        /// Number of entries received.
        len: usize,
    },

    /// A derived value does not fit into a decimal.
    #[error("value derived from {field} overflows")]
    Overflow {
        /// Path of the field the value is derived from.
        field: &'static str,
    },

    /// A numeric field holds something that is not a number.
    #[error("field {field} is not numeric: {value:?}")]
    NotNumeric {
        /// Path of the field in the response.
        field: String,
        /// Raw value received.
        value: String,
    },
}

/// Body of the pricing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceRequest {
    /// Meter identifier.
    #[serde(rename = "meterID")]
    pub meter_id: String,
    /// Member identifier.
    #[serde(rename = "memberID")]
    pub member_id: String,
    /// Grid node used for pricing.
    pub settlement_point: String,
}

/// Parsed pricing response. Only the fields the exporter publishes are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PriceSnapshot {
    /// Current price and statistics.
    pub now: CurrentPrice,
    /// Upcoming prices, nearest first.
    pub forecast: Vec<ForecastEntry>,
}

/// Current price section of the response. All values are numeric strings.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentPrice {
    pub min_num: String,
    pub price_ckwh: String,
    pub value_score: String,
    pub mean_price_ckwh: String,
    pub diff_mean_ckwh: String,
    pub high_ckwh: String,
    pub low_ckwh: String,
    pub std_dev_ckwh: String,
    pub price_display: String,
}

/// One forecast entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForecastEntry {
    /// Forecast price as numeric string.
    pub price_display: String,
}

impl PriceSnapshot {
    /// Parse a response body.
    pub fn from_json(body: &str) -> Result<Self, FormatError> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Blocking pricing API client. Safe to share between threads.
#[derive(Debug, Clone)]
pub struct PriceClient {
    http: Client,
    url: Url,
}

impl PriceClient {
    /// Create a client posting to `url`.
    pub fn new(url: Url) -> Result<Self, reqwest::Error> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self { http, url })
    }

    /// Post `request` once and parse the answer. There are no retries.
    pub fn fetch(&self, request: &PriceRequest) -> Result<PriceSnapshot, CollectError> {
        debug!("requesting prices from {}: {:?}", self.url, request);

        let response = self
            .http
            .post(self.url.clone())
            .json(request)
            .send()
            .map_err(|source| TransportError::Request {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: self.url.clone(),
                status,
            }
            .into());
        }

        let body = response.text().map_err(FormatError::Body)?;
        debug!("response from {}: {}", self.url, body);

        Ok(PriceSnapshot::from_json(&body)?)
    }
}
