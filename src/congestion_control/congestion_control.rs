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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::time::Duration;

use strum_macros::Display;
use strum_macros::EnumIter;

use crate::scheduler::SampleTimer;
use crate::scheduler::Scheduler;
use crate::scheduler::TimerHandle;
use crate::Error;
use crate::Result;
use crate::WestwoodConfig;
pub use filter::FilterType;
pub use filter::SampleFilter;
pub use new_reno::NewReno;
pub use observer::EstimateHistory;
pub use observer::EstimateObserver;
pub use observer::EstimateRecorder;
pub use westwood::Westwood;
pub use westwood::WestwoodVariant;

/// Available congestion control algorithm
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Display, EnumIter)]
pub enum CongestionControlAlgorithm {
    /// NewReno halves the data in flight when congestion is detected.
    NewReno,

    /// Westwood sets the slow start threshold to the estimated
    /// bandwidth-delay product, sampling the bandwidth on every ACK.
    #[default]
    Westwood,

    /// Westwood+ samples the bandwidth once per RTT, which filters out the
    /// effect of ACK compression.
    WestwoodPlus,

    /// Westwood CRB combines the per-ACK bandwidth estimate with a rate
    /// estimate sampled over a fixed period, and picks the rate estimate when
    /// the window is close to the rate-delay product.
    WestwoodCrb,
}

impl CongestionControlAlgorithm {
    /// The Westwood variant of the algorithm, if any.
    pub fn westwood_variant(&self) -> Option<WestwoodVariant> {
        match self {
            CongestionControlAlgorithm::NewReno => None,
            CongestionControlAlgorithm::Westwood => Some(WestwoodVariant::Westwood),
            CongestionControlAlgorithm::WestwoodPlus => Some(WestwoodVariant::WestwoodPlus),
            CongestionControlAlgorithm::WestwoodCrb => Some(WestwoodVariant::WestwoodCrb),
        }
    }
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("newreno") || algor.eq_ignore_ascii_case("new-reno") {
            return Ok(CongestionControlAlgorithm::NewReno);
        }

        match WestwoodVariant::from_str(algor) {
            Ok(WestwoodVariant::Westwood) => Ok(CongestionControlAlgorithm::Westwood),
            Ok(WestwoodVariant::WestwoodPlus) => Ok(CongestionControlAlgorithm::WestwoodPlus),
            Ok(WestwoodVariant::WestwoodCrb) => Ok(CongestionControlAlgorithm::WestwoodCrb),
            Err(_) => Err(Error::InvalidConfig("unknown".into())),
        }
    }
}

/// Transport state read by the strategies at call time.
pub trait TransportState {
    /// Sender maximum segment size in bytes.
    fn segment_size(&self) -> u32;

    /// Congestion window in bytes.
    fn congestion_window(&self) -> u32;
}

/// Snapshot of the TCP socket variables used by congestion control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSocketState {
    /// Congestion window in bytes.
    pub cwnd: u32,

    /// Slow start threshold in bytes.
    pub ssthresh: u32,

    /// Segment size in bytes.
    pub segment_size: u32,
}

impl TcpSocketState {
    pub fn new(cwnd: u32, ssthresh: u32, segment_size: u32) -> Self {
        Self {
            cwnd,
            ssthresh,
            segment_size,
        }
    }
}

impl TransportState for TcpSocketState {
    fn segment_size(&self) -> u32 {
        self.segment_size
    }

    fn congestion_window(&self) -> u32 {
        self.cwnd
    }
}

/// Congestion control interfaces shared by different algorithms.
pub trait CongestionControlStrategy {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback for each acknowledgment of `acked` segments. A zero `rtt`
    /// means the acknowledgment carries no usable RTT sample.
    fn on_ack(
        &mut self,
        tcb: &dyn TransportState,
        acked: u32,
        rtt: Duration,
        scheduler: &mut dyn Scheduler,
    );

    /// Callback for a fired timer scheduled by this strategy. Return true if
    /// the timer was still owned by the strategy and has been processed.
    fn on_timeout(
        &mut self,
        handle: TimerHandle,
        timer: SampleTimer,
        tcb: &dyn TransportState,
    ) -> bool;

    /// Slow start threshold in bytes after a congestion event.
    fn ssthresh(&self, tcb: &dyn TransportState, bytes_in_flight: u32) -> u32;

    /// Independent copy for a duplicated connection.
    fn fork(&self) -> Box<dyn CongestionControlStrategy>;

    /// Callback when the connection is closed. Pending timers are cancelled.
    fn on_close(&mut self, scheduler: &mut dyn Scheduler);

    /// Current bandwidth estimate in bytes per second, if the algorithm
    /// estimates it.
    fn bandwidth_estimate(&self) -> Option<f64> {
        None
    }

    /// Current rate estimate in bytes per second, if the algorithm estimates
    /// it.
    fn rate_estimate(&self) -> Option<f64> {
        None
    }
}

impl fmt::Debug for dyn CongestionControlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion control strategy {}.", self.name())
    }
}

/// Build a congestion control strategy.
///
/// For the Westwood family, the variant of `conf` is overridden by the
/// variant of `algor`.
pub fn build_congestion_strategy(
    algor: CongestionControlAlgorithm,
    conf: &WestwoodConfig,
) -> Result<Box<dyn CongestionControlStrategy>> {
    match algor.westwood_variant() {
        None => Ok(Box::new(NewReno::new())),
        Some(variant) => {
            let mut conf = conf.clone();
            conf.set_variant(variant);
            Ok(Box::new(Westwood::new(conf)?))
        }
    }
}


mod filter;
mod new_reno;
mod observer;
mod westwood;
