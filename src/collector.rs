//! Turns one upstream price snapshot into the fixed set of exported gauges.
//!
//! The gauges and their order are described by [`GAUGES`]. Every entry reads
//! one numeric string from the snapshot, except `g_total_price_ckwh` which is
//! the current price plus the configured delivery surcharge.

use std::str::FromStr;

use log::info;
use rust_decimal::{
    prelude::ToPrimitive,
    Decimal,
};
use crate::{
    config::Config,
    exporter::Collect,
    upstream::{
        CollectError,
        CurrentPrice,
        FormatError,
        PriceClient,
        PriceRequest,
        PriceSnapshot,
        FORECAST_LEN,
    },
};

/// Where the value of a gauge comes from.
#[derive(Clone, Copy)]
enum Source {
    Now(&'static str, fn(&CurrentPrice) -> &str),
    TotalPrice,
    Forecast(usize),
}

/// A gauge the exporter publishes.
#[derive(Clone, Copy)]
pub struct GaugeSpec {
    name: &'static str,
    source: Source,
}

impl GaugeSpec {
    /// Metric name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

macro_rules! now {
    ($field:ident) => {
        GaugeSpec {
            name: concat!("g_", stringify!($field)),
            source: Source::Now(stringify!($field), |now| now.$field.as_str()),
        }
    };
}

macro_rules! forecast {
    ($index:literal) => {
        GaugeSpec {
            name: concat!("g_price_forecast_", $index),
            source: Source::Forecast($index),
        }
    };
}

/// Every published gauge in exposition order.
pub const GAUGES: [GaugeSpec; 17] = [
    now!(min_num),
    now!(price_ckwh),
    GaugeSpec {
        name: "g_total_price_ckwh",
        source: Source::TotalPrice,
    },
    now!(value_score),
    now!(mean_price_ckwh),
    now!(diff_mean_ckwh),
    now!(high_ckwh),
    now!(low_ckwh),
    now!(std_dev_ckwh),
    now!(price_display),
    forecast!(0),
    forecast!(1),
    forecast!(2),
    forecast!(3),
    forecast!(4),
    forecast!(5),
    forecast!(6),
];

/// One gauge value of a single collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeObservation {
    name: &'static str,
    value: Decimal,
}

impl GaugeObservation {
    /// Metric name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Help text, the metric name itself.
    pub fn help(&self) -> &'static str {
        self.name
    }

    /// Exact value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Value as set on the gauge.
    pub fn as_f64(&self) -> f64 {
        // Decimal is at most 96 bits of mantissa, always in f64 range.
        self.value.to_f64().unwrap_or(f64::NAN)
    }
}

/// Compute all gauges of `snapshot`.
///
/// Fails without returning anything if the forecast is too short, any
/// field is not numeric or the total price overflows.
pub fn observe(
    snapshot: &PriceSnapshot,
    tdu_charge: Decimal,
) -> Result<Vec<GaugeObservation>, FormatError> {
    if snapshot.forecast.len() < FORECAST_LEN {
        return Err(FormatError::ForecastTooShort {
            len: snapshot.forecast.len(),
        });
    }

    GAUGES
        .iter()
        .map(|spec| -> Result<GaugeObservation, FormatError> {
            let value = match spec.source {
                Source::Now(field, get) => numeric(&format!("now.{field}"), get(&snapshot.now))?,
                Source::TotalPrice => numeric("now.price_ckwh", &snapshot.now.price_ckwh)?
                    .checked_add(tdu_charge)
                    .ok_or(FormatError::Overflow {
                        field: "now.price_ckwh",
                    })?,
                Source::Forecast(index) => numeric(
                    &format!("forecast[{index}].price_display"),
                    &snapshot.forecast[index].price_display,
                )?,
            };

            Ok(GaugeObservation {
                name: spec.name,
                value,
            })
        })
        .collect()
}

fn numeric(field: &str, raw: &str) -> Result<Decimal, FormatError> {
    Decimal::from_str(raw.trim()).map_err(|_| FormatError::NotNumeric {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Collector fetching a fresh snapshot on every call.
///
/// Holds no state between calls, so concurrent scrapes are independent.
#[derive(Debug)]
pub struct PriceCollector {
    request: PriceRequest,
    tdu_charge: Decimal,
    client: PriceClient,
}

impl PriceCollector {
    /// Build a collector for the meter in `config`.
    pub fn new(config: &Config) -> Result<Self, crate::Error> {
        let client = PriceClient::new(config.api_url.clone()).map_err(crate::Error::HttpClient)?;

        Ok(Self {
            request: PriceRequest {
                meter_id: config.meter_id.clone(),
                member_id: config.member_id.clone(),
                settlement_point: config.settlement_point.clone(),
            },
            tdu_charge: config.tdu_charge,
            client,
        })
    }

    /// Fetch prices once and return every gauge, or fail without any.
    pub fn collect(&self) -> Result<Vec<GaugeObservation>, CollectError> {
        let snapshot = self.client.fetch(&self.request)?;
        let observations = observe(&snapshot, self.tdu_charge)?;

        for observation in &observations {
            info!("Griddy {}: {}", observation.name, observation.value);
        }

        Ok(observations)
    }
}

impl Collect for PriceCollector {
    fn collect(&self) -> Result<Vec<GaugeObservation>, CollectError> {
        PriceCollector::collect(self)
    }
}
