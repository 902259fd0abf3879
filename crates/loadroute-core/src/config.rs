//! This module defines the controller [`Config`]: the active policy and the constants of the
//! path-cost model.

use std::str::FromStr;
use std::time::Duration;

/// The routing policy the controller runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Policy {
    /// Static shortest-path fallback rules only.
    #[default]
    #[serde(rename = "ospf")]
    Ospf,
    /// Static weighted multi-path groups installed at connect time.
    #[serde(rename = "ecmp")]
    Ecmp,
    /// Greedy single-path rerouting by load and distance.
    #[serde(rename = "ldr-single")]
    LdrSingle,
    /// Greedy single-path rerouting minimizing the bottleneck.
    #[serde(rename = "minmax-single")]
    MinMaxSingle,
    /// LP-optimal multi-path splitting.
    #[serde(rename = "ldr")]
    Ldr,
}

impl Policy {
    pub const ALL: [Policy; 5] = [
        Policy::Ospf,
        Policy::Ecmp,
        Policy::LdrSingle,
        Policy::MinMaxSingle,
        Policy::Ldr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Policy::Ospf => "ospf",
            Policy::Ecmp => "ecmp",
            Policy::LdrSingle => "ldr-single",
            Policy::MinMaxSingle => "minmax-single",
            Policy::Ldr => "ldr",
        }
    }

    /// Returns true if the policy reroutes pairs at runtime.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Policy::LdrSingle | Policy::MinMaxSingle | Policy::Ldr)
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Policy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Policy::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownPolicy(s.to_owned()))
    }
}

/// Weights of the path-cost combination.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
#[serde(default)]
pub struct CostWeights {
    /// Weight of the delay relative to the shortest path.
    #[builder(default = 1.0)]
    pub m1: f64,
    /// Penalty on the most utilized link of a path.
    #[builder(default = 1.0)]
    pub m2: f64,
    /// Fixed delay estimate added per hop.
    #[builder(default = 1.0)]
    pub hop_delay: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Alternate-path options.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
#[serde(default)]
pub struct ApaOpts {
    /// Largest allowed ratio of a candidate's delay to the shortest path's delay.
    #[builder(default = 2.0)]
    pub path_stretch: f64,
}

impl Default for ApaOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
#[serde(default)]
pub struct MonitoringOpts {
    /// Seconds between stats rounds.
    #[builder(default = 5.0)]
    pub interval: f64,
    /// How many extra times each switch appends itself to the readiness marker.
    #[builder(default = 5)]
    pub marker_retries: u32,
}

impl MonitoringOpts {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval)
    }
}

impl Default for MonitoringOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Parameters of the hedged load prediction.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
#[serde(default)]
pub struct PredictionOpts {
    #[builder(default = 1.1)]
    pub hedge: f64,
    #[builder(default = 0.98)]
    pub decay: f64,
}

impl Default for PredictionOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Controller configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize, typed_builder::TypedBuilder)]
#[serde(default)]
pub struct Config {
    #[builder(default)]
    pub policy: Policy,
    #[builder(default)]
    pub cost: CostWeights,
    #[builder(default)]
    pub apa: ApaOpts,
    #[builder(default)]
    pub monitoring: MonitoringOpts,
    #[builder(default)]
    pub prediction: PredictionOpts,
}

impl Config {
    /// Rejects values the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let MonitoringOpts { interval, .. } = self.monitoring;
        if !(interval > 0.0) || !interval.is_finite() {
            return Err(ConfigError::Invalid {
                field: "monitoring.interval",
                value: interval,
            });
        }
        if !(self.apa.path_stretch >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "apa.path_stretch",
                value: self.apa.path_stretch,
            });
        }
        if !(self.prediction.hedge > 0.0) {
            return Err(ConfigError::Invalid {
                field: "prediction.hedge",
                value: self.prediction.hedge,
            });
        }
        let decay = self.prediction.decay;
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "prediction.decay",
                value: decay,
            });
        }
        for (field, value) in [
            ("cost.m1", self.cost.m1),
            ("cost.m2", self.cost.m2),
            ("cost.hop_delay", self.cost.hop_delay),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::Invalid { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown routing policy {0:?}")]
    UnknownPolicy(String),

    #[error("Invalid value {value} for {field}")]
    Invalid { field: &'static str, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() -> anyhow::Result<()> {
        let config: Config =
            serde_json::from_str(r#"{"policy": "minmax-single", "cost": {"m2": 4.0}}"#)?;
        assert_eq!(config.policy, Policy::MinMaxSingle);
        assert_eq!(config.cost.m2, 4.0);
        assert_eq!(config.cost.m1, 1.0);
        assert_eq!(config.prediction, PredictionOpts::default());
        Ok(())
    }

    #[test]
    fn unknown_policy_fails() {
        assert!(serde_json::from_str::<Config>(r#"{"policy": "rip"}"#).is_err());
        assert!(matches!(
            "rip".parse::<Policy>(),
            Err(ConfigError::UnknownPolicy(..))
        ));
    }

    #[test]
    fn policy_names_round_trip() -> anyhow::Result<()> {
        for policy in Policy::ALL {
            assert_eq!(policy.name().parse::<Policy>()?, policy);
            assert_eq!(serde_json::to_string(&policy)?, format!("\"{policy}\""));
        }
        Ok(())
    }

    #[test]
    fn bad_values_are_rejected() {
        let config = Config::builder()
            .monitoring(MonitoringOpts::builder().interval(0.0).build())
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "monitoring.interval", .. })
        ));
        let config = Config::builder()
            .apa(ApaOpts::builder().path_stretch(0.5).build())
            .build();
        assert!(config.validate().is_err());
        let config = Config::builder()
            .prediction(PredictionOpts::builder().decay(1.5).build())
            .build();
        assert!(config.validate().is_err());
    }
}
