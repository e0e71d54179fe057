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

//! TCP Westwood bandwidth estimation.
//!
//! Westwood estimates the bandwidth available to the connection from the
//! rate of returning acknowledgments and, after a congestion event, sets the
//! slow start threshold to the estimated bandwidth-delay product instead of
//! halving the window.
//!
//! Three sampling variants are supported:
//!  * Westwood: a bandwidth sample on every ACK, over the RTT of that ACK.
//!  * Westwood+: at most one bandwidth sample per RTT, taken by a timer.
//!  * Westwood CRB: a bandwidth sample on every ACK, plus a rate estimate
//!    sampled by a timer every `t_interval`. The rate estimate is preferred
//!    for the threshold when the window is close to the rate-delay product.
//!
//! See <https://doi.org/10.1145/381677.381704> and
//! <https://doi.org/10.1007/s11235-004-5576-9>.

#![allow(unused_variables)]

use core::str::FromStr;
use std::cmp;
use std::time::Duration;

use log::*;
use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumIter;

use super::CongestionControlStrategy;
use super::EstimateObserver;
use super::FilterType;
use super::SampleFilter;
use super::TransportState;
use crate::scheduler::SampleTimer;
use crate::scheduler::Scheduler;
use crate::scheduler::TimerHandle;
use crate::scheduler::TimerOwner;
use crate::Error;
use crate::Result;
use crate::WestwoodConfig;
use crate::CRB_THETA;

/// Westwood sampling variant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum WestwoodVariant {
    /// Bandwidth is sampled on every ACK.
    #[default]
    Westwood,

    /// Bandwidth is sampled once per RTT.
    WestwoodPlus,

    /// Bandwidth is sampled on every ACK and the rate estimate once per
    /// `t_interval`.
    WestwoodCrb,
}

impl FromStr for WestwoodVariant {
    type Err = Error;

    fn from_str(name: &str) -> Result<WestwoodVariant> {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "westwood" => Ok(WestwoodVariant::Westwood),
            "westwood+" | "westwoodplus" | "westwood-plus" => Ok(WestwoodVariant::WestwoodPlus),
            "westwoodcrb" | "westwood-crb" => Ok(WestwoodVariant::WestwoodCrb),
            _ => Err(Error::InvalidConfig(format!("unknown variant {}", name))),
        }
    }
}

/// Westwood bandwidth estimator.
#[derive(Debug)]
pub struct Westwood {
    /// Configuration.
    config: WestwoodConfig,

    /// Bandwidth channel.
    bw: SampleFilter,

    /// Rate estimate channel, only fed by Westwood CRB.
    re: SampleFilter,

    /// Minimum RTT seen on this connection.
    min_rtt: Option<Duration>,

    /// Segments acked since the last bandwidth sample.
    acked_since_bw_sample: u64,

    /// Segments acked since the last rate sample.
    acked_since_re_sample: u64,

    /// A Westwood+ bandwidth sample has been scheduled and not taken yet.
    bw_sampling: bool,

    /// A Westwood CRB rate sample has been scheduled and not taken yet.
    re_sampling: bool,

    /// Pending bandwidth sample timer.
    bw_timer: Option<TimerHandle>,

    /// Pending rate sample timer.
    re_timer: Option<TimerHandle>,

    /// Liveness token of the scheduled timers. Dropping it releases them.
    owner: TimerOwner,

    /// Set once the connection is torn down.
    closed: bool,

    /// Estimate change observer.
    observer: Option<Box<dyn EstimateObserver>>,
}

impl Westwood {
    pub fn new(config: WestwoodConfig) -> Result<Self> {
        config.validate()?;
        let filter = config.filter();

        Ok(Self {
            config,
            bw: SampleFilter::new(filter),
            re: SampleFilter::new(filter),
            min_rtt: None,
            acked_since_bw_sample: 0,
            acked_since_re_sample: 0,
            bw_sampling: false,
            re_sampling: false,
            bw_timer: None,
            re_timer: None,
            owner: TimerOwner::new(),
            closed: false,
            observer: None,
        })
    }

    /// Register the observer of estimate changes, replacing the previous one.
    pub fn set_observer(&mut self, observer: Box<dyn EstimateObserver>) {
        self.observer = Some(observer);
    }

    pub fn config(&self) -> &WestwoodConfig {
        &self.config
    }

    pub fn variant(&self) -> WestwoodVariant {
        self.config.variant()
    }

    /// Smoothed bandwidth estimate in bytes per second.
    pub fn bandwidth(&self) -> f64 {
        self.bw.estimate()
    }

    /// Smoothed rate estimate in bytes per second.
    pub fn rate(&self) -> f64 {
        self.re.estimate()
    }

    /// Minimum RTT observed so far.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    pub fn acked_since_bw_sample(&self) -> u64 {
        self.acked_since_bw_sample
    }

    pub fn acked_since_re_sample(&self) -> u64 {
        self.acked_since_re_sample
    }

    /// Pending bandwidth sample timer.
    pub fn bw_timer(&self) -> Option<TimerHandle> {
        self.bw_timer
    }

    /// Pending rate sample timer.
    pub fn re_timer(&self) -> Option<TimerHandle> {
        self.re_timer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process an acknowledgment of `acked` segments carrying an RTT sample.
    ///
    /// A zero `rtt` means no usable sample and leaves the state untouched.
    pub fn on_ack(
        &mut self,
        tcb: &dyn TransportState,
        acked: u32,
        rtt: Duration,
        scheduler: &mut dyn Scheduler,
    ) {
        if self.closed {
            warn!("{} westwood ack after close ignored", self.config.trace_id());
            return;
        }

        if rtt.is_zero() {
            warn!("{} westwood rtt measured is zero", self.config.trace_id());
            return;
        }

        self.acked_since_bw_sample = self.acked_since_bw_sample.saturating_add(acked as u64);
        self.acked_since_re_sample = self.acked_since_re_sample.saturating_add(acked as u64);

        self.min_rtt = Some(match self.min_rtt {
            Some(min_rtt) => cmp::min(min_rtt, rtt),
            None => rtt,
        });

        trace!(
            "{} westwood acked={} rtt={}us min_rtt={:?}",
            self.config.trace_id(),
            acked,
            rtt.as_micros(),
            self.min_rtt
        );

        match self.config.variant() {
            WestwoodVariant::Westwood => {
                self.sample_bw(rtt, tcb.segment_size());
            }

            WestwoodVariant::WestwoodPlus => {
                if !self.bw_sampling {
                    self.bw_sampling = true;
                    if let Some(timer) = self.bw_timer.take() {
                        scheduler.cancel(timer);
                    }
                    self.bw_timer = Some(scheduler.schedule(
                        rtt,
                        SampleTimer::Bandwidth { interval: rtt },
                        &self.owner,
                    ));
                }
            }

            WestwoodVariant::WestwoodCrb => {
                if !self.re_sampling {
                    self.re_sampling = true;
                    if let Some(timer) = self.re_timer.take() {
                        scheduler.cancel(timer);
                    }
                    let interval = self.config.t_interval();
                    self.re_timer = Some(scheduler.schedule(
                        interval,
                        SampleTimer::Rate { interval },
                        &self.owner,
                    ));
                }
                self.sample_bw(rtt, tcb.segment_size());
            }
        }
    }

    /// Process a fired sample timer.
    ///
    /// Return false if the timer is not the one currently pending, in which
    /// case nothing is sampled.
    pub fn on_timeout(
        &mut self,
        handle: TimerHandle,
        timer: SampleTimer,
        tcb: &dyn TransportState,
    ) -> bool {
        if self.closed {
            debug!("{} westwood {:?} fired after close", self.config.trace_id(), handle);
            return false;
        }

        match timer {
            SampleTimer::Bandwidth { interval } if self.bw_timer == Some(handle) => {
                self.bw_timer = None;
                self.sample_bw(interval, tcb.segment_size());
                true
            }
            SampleTimer::Rate { interval } if self.re_timer == Some(handle) => {
                self.re_timer = None;
                self.sample_re(interval, tcb.segment_size());
                true
            }
            _ => {
                debug!(
                    "{} westwood stale {:?} {:?}",
                    self.config.trace_id(),
                    handle,
                    timer
                );
                false
            }
        }
    }

    /// Take a bandwidth sample over `interval`.
    ///
    /// Panics if `interval` is zero.
    pub fn sample_bw(&mut self, interval: Duration, segment_size: u32) {
        assert!(!interval.is_zero(), "bandwidth sample over zero interval");

        let sample =
            self.acked_since_bw_sample as f64 * segment_size as f64 / interval.as_secs_f64();
        self.acked_since_bw_sample = 0;

        if self.config.variant() == WestwoodVariant::WestwoodPlus {
            self.bw_sampling = false;
        }

        let old = self.bw.estimate();
        let new = self.bw.apply(sample);

        trace!(
            "{} westwood bw sample={} filtered={}",
            self.config.trace_id(),
            sample,
            new
        );

        if old != new {
            if let Some(observer) = self.observer.as_mut() {
                observer.on_bandwidth_changed(old, new);
            }
        }
    }

    /// Take a rate estimate sample over `interval`.
    ///
    /// Panics if `interval` is zero.
    pub fn sample_re(&mut self, interval: Duration, segment_size: u32) {
        assert!(!interval.is_zero(), "rate sample over zero interval");

        let sample =
            self.acked_since_re_sample as f64 * segment_size as f64 / interval.as_secs_f64();
        self.acked_since_re_sample = 0;

        if self.config.variant() == WestwoodVariant::WestwoodCrb {
            self.re_sampling = false;
        }

        let old = self.re.estimate();
        let new = self.re.apply(sample);

        trace!(
            "{} westwood re sample={} filtered={}",
            self.config.trace_id(),
            sample,
            new
        );

        if old != new {
            if let Some(observer) = self.observer.as_mut() {
                observer.on_rate_changed(old, new);
            }
        }
    }

    /// Slow start threshold in bytes for a window of `cwnd` bytes.
    ///
    /// The result is never below two segments.
    pub fn get_threshold(&self, cwnd: u32, segment_size: u32) -> u32 {
        let floor = segment_size.saturating_mul(2);
        let min_rtt = self.min_rtt.unwrap_or(Duration::ZERO).as_secs_f64();

        if self.config.variant() == WestwoodVariant::WestwoodCrb
            && min_rtt != 0.0
            && self.re.estimate() != 0.0
        {
            // Both sides are truncated before the ratio is compared.
            let re_window = (self.re.estimate() * min_rtt) as u32;
            if re_window != 0 && ((cwnd / re_window) as f64) < CRB_THETA {
                trace!(
                    "{} westwood ssthresh from re={} min_rtt={}",
                    self.config.trace_id(),
                    self.re.estimate(),
                    min_rtt
                );
                return cmp::max(floor, re_window);
            }
        }

        trace!(
            "{} westwood ssthresh from bw={} min_rtt={}",
            self.config.trace_id(),
            self.bw.estimate(),
            min_rtt
        );
        cmp::max(floor, (self.bw.estimate() * min_rtt) as u32)
    }

    /// Copy for a duplicated connection.
    ///
    /// Estimates, filter memory and configuration are copied. The minimum
    /// RTT, ack counters, sampling guards, timers and observer are not. The
    /// copy gets its own timer owner, so dropping either side never
    /// releases the timers of the other.
    pub fn fork(&self) -> Westwood {
        Westwood {
            config: self.config.clone(),
            bw: self.bw,
            re: self.re,
            min_rtt: None,
            acked_since_bw_sample: 0,
            acked_since_re_sample: 0,
            bw_sampling: false,
            re_sampling: false,
            bw_timer: None,
            re_timer: None,
            owner: TimerOwner::new(),
            closed: false,
            observer: None,
        }
    }

    /// Cancel all pending timers. Later ACKs and timers are ignored.
    pub fn close(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(timer) = self.bw_timer.take() {
            scheduler.cancel(timer);
        }
        if let Some(timer) = self.re_timer.take() {
            scheduler.cancel(timer);
        }
        self.bw_sampling = false;
        self.re_sampling = false;
        self.closed = true;
    }
}

impl Drop for Westwood {
    fn drop(&mut self) {
        if self.bw_timer.is_some() || self.re_timer.is_some() {
            debug!(
                "{} westwood dropped, release pending timers {:?} {:?}",
                self.config.trace_id(),
                self.bw_timer,
                self.re_timer
            );
        }
    }
}

impl CongestionControlStrategy for Westwood {
    fn name(&self) -> &str {
        match self.config.variant() {
            WestwoodVariant::Westwood => "WESTWOOD",
            WestwoodVariant::WestwoodPlus => "WESTWOOD_PLUS",
            WestwoodVariant::WestwoodCrb => "WESTWOOD_CRB",
        }
    }

    fn on_ack(
        &mut self,
        tcb: &dyn TransportState,
        acked: u32,
        rtt: Duration,
        scheduler: &mut dyn Scheduler,
    ) {
        Westwood::on_ack(self, tcb, acked, rtt, scheduler)
    }

    fn on_timeout(
        &mut self,
        handle: TimerHandle,
        timer: SampleTimer,
        tcb: &dyn TransportState,
    ) -> bool {
        Westwood::on_timeout(self, handle, timer, tcb)
    }

    fn ssthresh(&self, tcb: &dyn TransportState, bytes_in_flight: u32) -> u32 {
        self.get_threshold(tcb.congestion_window(), tcb.segment_size())
    }

    fn fork(&self) -> Box<dyn CongestionControlStrategy> {
        Box::new(Westwood::fork(self))
    }

    fn on_close(&mut self, scheduler: &mut dyn Scheduler) {
        self.close(scheduler)
    }

    fn bandwidth_estimate(&self) -> Option<f64> {
        Some(self.bandwidth())
    }

    fn rate_estimate(&self) -> Option<f64> {
        Some(self.rate())
    }
}
