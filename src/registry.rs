//! The static set of monitored stops and aggregate groups.
//!
//! The registry is built once at startup, either from the built-in defaults or
//! from a JSON file, and is never mutated afterwards. Stops are kept in the
//! order they were declared; the update cycle publishes in that order.
//!
//! Stored as a JSON object on disk:
//! ```json
//! {
//!   "stops": [
//!     { "mode": "bus", "stop_id": "1151", "route": "77" },
//!     { "mode": "rail", "stop_id": "30231" }
//!   ],
//!   "aggregates": [
//!     {
//!       "name": "downtown-express",
//!       "topic": "CTApredictions/BUS/dwtnEXP",
//!       "members": [{ "mode": "bus", "stop_id": "1056", "route": "X9" }]
//!     }
//!   ]
//! }
//! ```

use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root of every derived topic.
pub const TOPIC_PREFIX: &str = "CTApredictions";

/// Which prediction API serves a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Bus,
    Rail,
}

impl Mode {
    /// Topic segment for this mode.
    pub fn segment(self) -> &'static str {
        match self {
            Mode::Bus => "BUS",
            Mode::Rail => "RAIL",
        }
    }

    /// `chrono` format of the arrival timestamps this mode's API returns.
    ///
    /// Bus Tracker reports minute resolution, Train Tracker second resolution.
    pub fn timestamp_format(self) -> &'static str {
        match self {
            Mode::Bus => "%Y%m%d %H:%M",
            Mode::Rail => "%Y%m%d %H:%M:%S",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// One monitored (mode, stop, optional route) entry and the topic it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopSpec {
    pub mode: Mode,
    pub stop_id: String,
    pub route: Option<String>,
    pub topic: String,
}

impl StopSpec {
    /// Creates an entry whose topic is derived from mode, stop and route.
    pub fn new(mode: Mode, stop_id: impl Into<String>, route: Option<&str>) -> Self {
        let stop_id = stop_id.into();
        let route = route.map(str::to_string);
        let topic = derive_topic(mode, &stop_id, route.as_deref());
        Self {
            mode,
            stop_id,
            route,
            topic,
        }
    }

    pub fn bus(stop_id: &str, route: &str) -> Self {
        Self::new(Mode::Bus, stop_id, Some(route))
    }

    pub fn rail(stop_id: &str) -> Self {
        Self::new(Mode::Rail, stop_id, None)
    }

    /// Replaces the derived topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }
}

/// `CTApredictions/{MODE}/{stop_id}[/{route}]`
pub fn derive_topic(mode: Mode, stop_id: &str, route: Option<&str>) -> String {
    match route {
        Some(route) => format!("{TOPIC_PREFIX}/{mode}/{stop_id}/{route}"),
        None => format!("{TOPIC_PREFIX}/{mode}/{stop_id}"),
    }
}

/// Several stops reduced to one value: the soonest arrival among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateGroup {
    pub name: String,
    pub topic: String,
    pub members: Vec<StopSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    stops: Vec<StopEntry>,
    #[serde(default)]
    aggregates: Vec<AggregateEntry>,
}

#[derive(Debug, Deserialize)]
struct StopEntry {
    mode: Mode,
    stop_id: String,
    route: Option<String>,
    topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateEntry {
    name: String,
    topic: String,
    members: Vec<StopEntry>,
}

impl StopEntry {
    fn into_spec(self) -> Result<StopSpec, ConfigError> {
        if self.stop_id.trim().is_empty() {
            return Err(ConfigError::Registry("stop_id must not be empty".to_string()));
        }
        let route = self.route.filter(|r| !r.trim().is_empty());
        let spec = StopSpec::new(self.mode, self.stop_id, route.as_deref());
        Ok(match self.topic {
            Some(topic) if !topic.trim().is_empty() => spec.with_topic(topic),
            _ => spec,
        })
    }
}

/// All monitored stops and aggregate groups, in declaration order.
#[derive(Debug, Clone)]
pub struct StopRegistry {
    stops: Vec<StopSpec>,
    aggregates: Vec<AggregateGroup>,
}

impl StopRegistry {
    pub fn new(stops: Vec<StopSpec>, aggregates: Vec<AggregateGroup>) -> Self {
        Self { stops, aggregates }
    }

    /// Loads the registry from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile =
            serde_json::from_str(content).map_err(|e| ConfigError::Registry(e.to_string()))?;

        let stops = file
            .stops
            .into_iter()
            .map(StopEntry::into_spec)
            .collect::<Result<Vec<_>, _>>()?;

        let mut aggregates = Vec::with_capacity(file.aggregates.len());
        for entry in file.aggregates {
            if entry.topic.trim().is_empty() {
                return Err(ConfigError::Registry(format!(
                    "aggregate {:?} has no topic",
                    entry.name
                )));
            }
            if entry.members.is_empty() {
                return Err(ConfigError::Registry(format!(
                    "aggregate {:?} has no members",
                    entry.name
                )));
            }
            let members = entry
                .members
                .into_iter()
                .map(StopEntry::into_spec)
                .collect::<Result<Vec<_>, _>>()?;
            aggregates.push(AggregateGroup {
                name: entry.name,
                topic: entry.topic,
                members,
            });
        }

        Ok(Self { stops, aggregates })
    }

    pub fn bus_stops(&self) -> impl Iterator<Item = &StopSpec> {
        self.stops.iter().filter(|s| s.mode == Mode::Bus)
    }

    pub fn rail_stops(&self) -> impl Iterator<Item = &StopSpec> {
        self.stops.iter().filter(|s| s.mode == Mode::Rail)
    }

    pub fn aggregates(&self) -> &[AggregateGroup] {
        &self.aggregates
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty() && self.aggregates.is_empty()
    }
}

impl Default for StopRegistry {
    /// Stops around Sheridan Rd / Broadway and the Red Line platforms at Loyola.
    fn default() -> Self {
        let stops = vec![
            StopSpec::bus("5670", "80"),
            StopSpec::bus("5676", "X9"),
            StopSpec::bus("5676", "80"),
            StopSpec::bus("1056", "X9"),
            StopSpec::bus("1056", "151"),
            StopSpec::bus("1169", "151"),
            StopSpec::rail("30016"),
            StopSpec::rail("30017"),
        ];
        let aggregates = vec![AggregateGroup {
            name: "downtown-express".to_string(),
            topic: format!("{TOPIC_PREFIX}/BUS/dwtnEXP"),
            members: vec![
                StopSpec::bus("5676", "X9"),
                StopSpec::bus("1056", "X9"),
                StopSpec::bus("1056", "151"),
            ],
        }];
        Self { stops, aggregates }
    }
}
