//! Process configuration, read once at startup.
//!
//! Every setting comes from an environment variable (a `.env` file is loaded
//! by the binary before this runs). Secrets have no defaults; if any is
//! missing, startup fails with a [`ConfigError`] naming all of them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::ConfigError;

pub const DEFAULT_BUS_API_URL: &str = "http://www.ctabustracker.com/bustime/api/v2";
pub const DEFAULT_RAIL_API_URL: &str = "http://lapi.transitchicago.com/api/1.0";

/// MQTT session settings.
#[derive(Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Pause after a failed reconnect before the event loop tries again.
    pub reconnect_delay: Duration,
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

impl BrokerConfig {
    /// Local broker settings for tests.
    pub fn for_testing(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            username: "mqtt".to_string(),
            password: "test".to_string(),
            client_id: "cta-mqtt-test".to_string(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(2),
            reconnect_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub bus_api_key: String,
    pub rail_api_key: String,
    pub bus_api_url: String,
    pub rail_api_url: String,
    pub update_interval: Duration,
    pub http_timeout: Duration,
    /// Zone the prediction APIs report local times in.
    pub timezone: Tz,
    pub stops_file: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("broker", &self.broker)
            .field("bus_api_url", &self.bus_api_url)
            .field("rail_api_url", &self.rail_api_url)
            .field("update_interval", &self.update_interval)
            .field("http_timeout", &self.http_timeout)
            .field("timezone", &self.timezone)
            .field("stops_file", &self.stops_file)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let mut missing = Vec::new();
        let mut required = |key: &str| {
            get(key).unwrap_or_else(|| {
                missing.push(key.to_string());
                String::new()
            })
        };
        let password = required("MQTT_PASSWORD");
        let bus_api_key = required("CTA_API_KEY_BUS");
        let rail_api_key = required("CTA_API_KEY_RAIL");
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let update_interval = Duration::from_secs(parse_positive(
            "UPDATE_INTERVAL_SECS",
            get("UPDATE_INTERVAL_SECS"),
            20,
        )?);
        let http_timeout =
            Duration::from_secs(parse_positive("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"), 10)?);

        let broker = BrokerConfig {
            host: or("MQTT_BROKER", "localhost"),
            port: parse_or("MQTT_PORT", get("MQTT_PORT"), 1883)?,
            username: or("MQTT_USER", "mqtt"),
            password,
            client_id: or("MQTT_CLIENT_ID", "cta-mqtt"),
            keep_alive: Duration::from_secs(parse_positive(
                "MQTT_KEEP_ALIVE_SECS",
                get("MQTT_KEEP_ALIVE_SECS"),
                30,
            )?),
            connect_timeout: Duration::from_secs(parse_positive(
                "MQTT_CONNECT_TIMEOUT_SECS",
                get("MQTT_CONNECT_TIMEOUT_SECS"),
                10,
            )?),
            reconnect_delay: Duration::from_secs(parse_positive(
                "MQTT_RECONNECT_DELAY_SECS",
                get("MQTT_RECONNECT_DELAY_SECS"),
                5,
            )?),
        };

        let timezone = parse_or("CTA_TIMEZONE", get("CTA_TIMEZONE"), chrono_tz::America::Chicago)?;

        Ok(Self {
            broker,
            bus_api_key,
            rail_api_key,
            bus_api_url: or("BUS_API_URL", DEFAULT_BUS_API_URL),
            rail_api_url: or("RAIL_API_URL", DEFAULT_RAIL_API_URL),
            update_interval,
            http_timeout,
            timezone,
            stops_file: get("STOPS_FILE"),
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_positive(key: &str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let value = parse_or(key, raw, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("MQTT_PASSWORD", "secret"),
        ("CTA_API_KEY_BUS", "bus-key"),
        ("CTA_API_KEY_RAIL", "rail-key"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.username, "mqtt");
        assert_eq!(config.update_interval, Duration::from_secs(20));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.timezone, chrono_tz::America::Chicago);
        assert_eq!(config.bus_api_url, DEFAULT_BUS_API_URL);
        assert!(config.stops_file.is_none());
    }

    #[test]
    fn test_missing_lists_all_required() {
        let err = AppConfig::from_lookup(lookup(&[("CTA_API_KEY_BUS", "k")])).unwrap_err();
        match err {
            ConfigError::Missing(keys) => {
                assert_eq!(keys, vec!["MQTT_PASSWORD", "CTA_API_KEY_RAIL"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("MQTT_PASSWORD", "  ");
        assert!(matches!(
            AppConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("MQTT_BROKER", "192.168.1.101"),
            ("MQTT_PORT", "8883"),
            ("UPDATE_INTERVAL_SECS", "60"),
            ("CTA_TIMEZONE", "America/New_York"),
            ("STOPS_FILE", "stops.json"),
        ]);
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.broker.host, "192.168.1.101");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.update_interval, Duration::from_secs(60));
        assert_eq!(config.timezone, chrono_tz::America::New_York);
        assert_eq!(config.stops_file.as_deref(), Some("stops.json"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("UPDATE_INTERVAL_SECS", "0"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("UPDATE_INTERVAL_SECS"));
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MQTT_PORT", "not-a-port"));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_bad_timezone_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CTA_TIMEZONE", "Mars/Olympus_Mons"));
        assert!(matches!(
            AppConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AppConfig::from_lookup(lookup(REQUIRED)).unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("secret"));
        assert!(!shown.contains("bus-key"));
    }
}
