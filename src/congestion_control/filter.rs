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

//! Low-pass filtering of raw bandwidth and rate samples.
//!
//! The Tustin filter is a one-pole IIR filter derived with the bilinear
//! transform. It runs on the average of the two most recent raw samples:
//!
//! ```text
//! filtered = alpha * last_filtered + (1 - alpha) * (raw + last_raw) / 2
//! ```
//!
//! so a single outlier (e.g. caused by ACK compression) moves the estimate
//! by at most `(1 - alpha) / 2` of its size.

use core::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumIter;

use crate::Error;
use crate::Result;
use crate::TUSTIN_ALPHA;

/// Filter applied to raw samples before they become the estimate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FilterType {
    /// The raw sample is used as is.
    None,

    /// Tustin's approximation of a first order low-pass filter.
    #[default]
    Tustin,
}

impl FromStr for FilterType {
    type Err = Error;

    fn from_str(name: &str) -> Result<FilterType> {
        if name.eq_ignore_ascii_case("none") {
            Ok(FilterType::None)
        } else if name.eq_ignore_ascii_case("tustin") {
            Ok(FilterType::Tustin)
        } else {
            Err(Error::InvalidConfig(format!("unknown filter {}", name)))
        }
    }
}

/// Smoothing state of one sample channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleFilter {
    /// Filter type.
    kind: FilterType,

    /// Previous raw sample.
    last_sample: f64,

    /// Previous filtered sample.
    last_filtered: f64,

    /// Current estimate.
    estimate: f64,
}

impl SampleFilter {
    pub fn new(kind: FilterType) -> Self {
        Self {
            kind,
            last_sample: 0.0,
            last_filtered: 0.0,
            estimate: 0.0,
        }
    }

    /// Feed a raw sample and return the new estimate.
    pub fn apply(&mut self, sample: f64) -> f64 {
        match self.kind {
            FilterType::None => {
                self.last_sample = sample;
                self.estimate = sample;
            }
            FilterType::Tustin => {
                let filtered = TUSTIN_ALPHA * self.last_filtered
                    + (1.0 - TUSTIN_ALPHA) * ((sample + self.last_sample) / 2.0);
                self.last_sample = sample;
                self.last_filtered = filtered;
                self.estimate = filtered;
            }
        }
        self.estimate
    }

    pub fn kind(&self) -> FilterType {
        self.kind
    }

    /// Current estimate.
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn last_sample(&self) -> f64 {
        self.last_sample
    }

    pub fn last_filtered(&self) -> f64 {
        self.last_filtered
    }
}
