// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::congestion_control::FilterType;
use crate::congestion_control::WestwoodVariant;
use crate::Error;
use crate::Result;
use crate::DEFAULT_T_INTERVAL;

/// Westwood configuration.
///
/// The configuration is validated once when the estimator is created and
/// can not be changed afterwards.
///
/// ## Examples:
///
/// ```
/// use std::time::Duration;
/// use westwood::{FilterType, WestwoodConfig, WestwoodVariant};
///
/// let mut conf = WestwoodConfig::default();
/// conf.set_variant(WestwoodVariant::WestwoodCrb)
///     .set_filter(FilterType::Tustin)
///     .set_t_interval(Duration::from_millis(500));
/// conf.validate()?;
///
/// let conf = WestwoodConfig::from_json(r#"{"variant": "westwood-plus", "filter": "none"}"#)?;
/// assert_eq!(conf.variant(), WestwoodVariant::WestwoodPlus);
/// # Ok::<(), westwood::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WestwoodConfig {
    /// Sampling variant, default to Westwood.
    variant: WestwoodVariant,

    /// Filter applied to raw samples, default to Tustin.
    filter: FilterType,

    /// Rate estimation period of Westwood CRB, default to 400ms.
    #[serde(rename = "t_interval_ms", with = "duration_ms")]
    t_interval: Duration,

    /// Prefix of log lines, usually the connection trace id.
    trace_id: String,
}

impl WestwoodConfig {
    /// Parse a JSON configuration and validate it.
    pub fn from_json(s: &str) -> Result<Self> {
        let conf: WestwoodConfig =
            serde_json::from_str(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        conf.validate()?;
        Ok(conf)
    }

    /// Check the configuration.
    ///
    /// `t_interval` must be a positive whole number of milliseconds, the unit
    /// it is serialized in.
    pub fn validate(&self) -> Result<()> {
        if self.t_interval.is_zero() {
            return Err(Error::InvalidConfig("zero t_interval".into()));
        }
        if self.t_interval.subsec_nanos() % 1_000_000 != 0 {
            return Err(Error::InvalidConfig(format!(
                "t_interval {:?} not in whole milliseconds",
                self.t_interval
            )));
        }
        Ok(())
    }

    /// Update the sampling variant.
    pub fn set_variant(&mut self, variant: WestwoodVariant) -> &mut Self {
        self.variant = variant;
        self
    }

    /// Update the filter type.
    pub fn set_filter(&mut self, filter: FilterType) -> &mut Self {
        self.filter = filter;
        self
    }

    /// Update the rate estimation period.
    pub fn set_t_interval(&mut self, t_interval: Duration) -> &mut Self {
        self.t_interval = t_interval;
        self
    }

    /// Update the log prefix.
    pub fn set_trace_id(&mut self, trace_id: &str) -> &mut Self {
        self.trace_id = trace_id.to_string();
        self
    }

    pub fn variant(&self) -> WestwoodVariant {
        self.variant
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    pub fn t_interval(&self) -> Duration {
        self.t_interval
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }
}

impl Default for WestwoodConfig {
    fn default() -> Self {
        Self {
            variant: WestwoodVariant::default(),
            filter: FilterType::default(),
            t_interval: DEFAULT_T_INTERVAL,
            trace_id: String::new(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
