//! Export GoGriddy retail electricity prices as prometheus metrics.
//!
//! Every scrape of the metrics endpoint posts one request to the pricing API
//! and publishes the answer as gauges:
//!
//! * `g_min_num`, `g_price_ckwh`, `g_value_score`, `g_mean_price_ckwh`,
//!   `g_diff_mean_ckwh`, `g_high_ckwh`, `g_low_ckwh`, `g_std_dev_ckwh`,
//!   `g_price_display` - the current price section of the answer.
//! * `g_total_price_ckwh` - current price plus the configured delivery
//!   surcharge.
//! * `g_price_forecast_0` to `g_price_forecast_6` - the next seven forecast
//!   prices.
//!
//! Nothing is cached. If the upstream fails the scrape is answered with
//! status 500 and no price gauge at all.
//!
//! # Example
//!
//! ```no_run
//! use griddy_exporter::{
//!     Config,
//!     PriceCollector,
//! };
//!
//! let config = Config::from_env().expect("can not load config");
//! let collector = PriceCollector::new(&config).expect("can not create collector");
//!
//! griddy_exporter::start(config.listen_addr(), collector).expect("can not start exporter");
//! ```

#![deny(missing_docs)]

use std::net::SocketAddr;

use thiserror::Error;

pub use prometheus;

pub mod collector;
pub mod config;
pub mod exporter;
pub mod upstream;


pub use crate::{
    collector::{
        GaugeObservation,
        PriceCollector,
    },
    config::{
        Config,
        ConfigError,
    },
    exporter::{
        Builder,
        Collect,
        Exporter,
    },
    upstream::CollectError,
};

/// Errors that can happen when the exporter gets set up or serves requests.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The upstream http client could not be created.
    #[error("can not build upstream http client: {0}")]
    HttpClient(reqwest::Error),

    /// Supplied endpoint is not valid ascii.
    #[error("supplied endpoint is not valid ascii: {0}")]
    EndpointNotAscii(String),

    /// Failed to create an http header.
    #[error("can not create http header {0}")]
    InvalidHeader(&'static str),

    /// The http server could not be started.
    #[error("can not start http server: {0}")]
    ServerStart(Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The server thread could not be spawned.
    #[error("can not spawn server thread: {0}")]
    SpawnThread(std::io::Error),

    /// The server thread stopped.
    #[error("http server stopped")]
    ServerStopped,

    /// Failed to send a response to a client.
    #[error("can not send response: {0}")]
    SendResponse(std::io::Error),

    /// Failed to encode metrics.
    #[error("can not encode metrics: {0}")]
    EncodeMetrics(prometheus::Error),

    /// Failed to create or register the status gauge.
    #[error("can not create status metric: {0}")]
    CreateStatusMetric(prometheus::Error),

    /// Failed to create or register the internal metrics.
    #[cfg(feature = "internal_metrics")]
    #[error("can not create internal metrics: {0}")]
    CreateInternalMetrics(prometheus::Error),
}

/// Start an exporter on `binding` with the default endpoint and status name.
pub fn start(binding: SocketAddr, collector: impl Collect) -> Result<Exporter, Error> {
    Builder::new(binding, collector).start()
}
