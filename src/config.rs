//! Settings the exporter reads once from the process environment at startup.

use std::{
    net::{
        Ipv4Addr,
        SocketAddr,
    },
    str::FromStr,
    time::Duration,
};

use log::info;
use reqwest::Url;
use rust_decimal::Decimal;
use thiserror::Error;

/// Environment variable holding the meter identifier.
pub const METER_ID: &str = "METERID";
/// Environment variable holding the member identifier.
pub const MEMBER_ID: &str = "MEMBERID";
/// Environment variable holding the settlement point.
pub const SETTLEMENT_POINT: &str = "SETTLEMENT_POINT";
/// Environment variable holding the delivery surcharge in cents per kWh.
pub const TDU_CHARGE: &str = "TDU_CHARGE";
/// Environment variable holding the collection interval in seconds.
pub const COLLECTION_INTERVAL: &str = "COLLECTION_INTERVAL";
/// Environment variable holding the upstream pricing endpoint.
pub const API_URL: &str = "API_URL";
/// Environment variable holding the port the metrics endpoint listens on.
pub const HTTP_PORT: &str = "HTTP_PORT";

/// Errors that can happen while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Variable is not set at all.
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    /// Variable is set but only contains whitespace.
    #[error("environment variable {0} is empty")]
    Empty(&'static str),

    /// Variable is set but can not be converted into the expected type.
    #[error("environment variable {var} has invalid value {value:?}: {reason}")]
    Invalid {
        /// Name of the variable.
        var: &'static str,
        /// Raw value as found in the environment.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Immutable exporter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Meter the prices are requested for.
    pub meter_id: String,
    /// Member account owning the meter.
    pub member_id: String,
    /// Grid node used for pricing.
    pub settlement_point: String,
    /// Per kWh surcharge added to the current price for the total price.
    pub tdu_charge: Decimal,
    /// Idle period of the main loop. Collection itself is driven by scrapes.
    pub collection_interval: Duration,
    /// Upstream pricing endpoint.
    pub api_url: Url,
    /// Port of the metrics endpoint.
    pub http_port: u16,
}

impl Config {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration using `lookup` to resolve variable names.
    ///
    /// Every loaded setting is logged at info level. The first missing or
    /// malformed variable aborts loading.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let meter_id = required(&lookup, METER_ID)?;
        info!("{METER_ID}: {meter_id}");

        let member_id = required(&lookup, MEMBER_ID)?;
        info!("{MEMBER_ID}: {member_id}");

        let settlement_point = required(&lookup, SETTLEMENT_POINT)?;
        info!("{SETTLEMENT_POINT}: {settlement_point}");

        let tdu_charge: Decimal = parsed(&lookup, TDU_CHARGE)?;
        if tdu_charge.is_zero() {
            return Err(invalid(TDU_CHARGE, tdu_charge.to_string(), "must not be zero"));
        }
        info!("{TDU_CHARGE}: {tdu_charge}");

        let collection_interval: u64 = parsed(&lookup, COLLECTION_INTERVAL)?;
        if collection_interval == 0 {
            return Err(invalid(COLLECTION_INTERVAL, "0", "must be positive"));
        }
        info!("{COLLECTION_INTERVAL}: {collection_interval}");

        let api_url: Url = parsed(&lookup, API_URL)?;
        info!("{API_URL}: {api_url}");

        let http_port: u16 = parsed(&lookup, HTTP_PORT)?;
        if http_port == 0 {
            return Err(invalid(HTTP_PORT, "0", "must be a port between 1 and 65535"));
        }
        info!("{HTTP_PORT}: {http_port}");

        Ok(Self {
            meter_id,
            member_id,
            settlement_point,
            tdu_charge,
            collection_interval: Duration::from_secs(collection_interval),
            api_url,
            http_port,
        })
    }

    /// Address the metrics endpoint binds to, on all interfaces.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.http_port))
    }
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(var).ok_or(ConfigError::Missing(var))?;
    let value = value.trim();

    if value.is_empty() {
        return Err(ConfigError::Empty(var));
    }

    Ok(value.to_string())
}

fn parsed<F, T>(lookup: &F, var: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(lookup, var)?;

    raw.parse()
        .map_err(|err: T::Err| invalid(var, raw.clone(), err.to_string()))
}

fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal_macros::dec;

    use super::*;

    fn environment() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (METER_ID, "1234567890"),
            (MEMBER_ID, "42"),
            (SETTLEMENT_POINT, "LZ_HOUSTON"),
            (TDU_CHARGE, "3.0"),
            (COLLECTION_INTERVAL, "60"),
            (API_URL, "https://app.gogriddy.com/api/v1/insights/getnow"),
            (HTTP_PORT, "9110"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|name| env.get(name).map(|value| value.to_string()))
    }

    #[test]
    fn loads_all_settings() {
        let config = load(&environment()).expect("can not load config");

        assert_eq!(config.meter_id, "1234567890");
        assert_eq!(config.member_id, "42");
        assert_eq!(config.settlement_point, "LZ_HOUSTON");
        assert_eq!(config.tdu_charge, dec!(3.0));
        assert_eq!(config.collection_interval, Duration::from_secs(60));
        assert_eq!(
            config.api_url.as_str(),
            "https://app.gogriddy.com/api/v1/insights/getnow"
        );
        assert_eq!(config.http_port, 9110);
        assert_eq!(
            config.listen_addr(),
            "0.0.0.0:9110".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn every_variable_is_required() {
        for var in environment().keys() {
            let mut env = environment();
            env.remove(var);

            match load(&env) {
                Err(ConfigError::Missing(missing)) => assert_eq!(missing, *var),
                other => panic!("expected {var} to be missing, got {other:?}"),
            }
        }
    }

    #[test]
    fn blank_value_is_empty() {
        let mut env = environment();
        env.insert(SETTLEMENT_POINT, "   ");

        assert!(matches!(
            load(&env),
            Err(ConfigError::Empty(SETTLEMENT_POINT))
        ));
    }

    #[test]
    fn rejects_malformed_numbers() {
        let cases = [
            (TDU_CHARGE, "three"),
            (TDU_CHARGE, "0"),
            (COLLECTION_INTERVAL, "-5"),
            (COLLECTION_INTERVAL, "0"),
            (COLLECTION_INTERVAL, "1.5"),
            (HTTP_PORT, "70000"),
            (HTTP_PORT, "0"),
            (API_URL, "not a url"),
        ];

        for (var, value) in cases {
            let mut env = environment();
            env.insert(var, value);

            match load(&env) {
                Err(ConfigError::Invalid { var: invalid, .. }) => assert_eq!(invalid, var),
                other => panic!("expected {var}={value} to be invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn error_names_variable() {
        let mut env = environment();
        env.insert(HTTP_PORT, "http");

        let err = load(&env).unwrap_err().to_string();

        assert!(err.contains(HTTP_PORT), "{err}");
        assert!(err.contains("\"http\""), "{err}");
    }
}
