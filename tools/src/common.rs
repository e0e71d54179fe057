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

use std::io::BufRead;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use serde::Serialize;
use statrs::statistics::Data;
use statrs::statistics::Distribution;
use statrs::statistics::Max;
use statrs::statistics::Min;

use westwood::build_congestion_strategy;
use westwood::congestion_control::TcpSocketState;
use westwood::scheduler::EventQueue;
use westwood::scheduler::SampleTimer;
use westwood::CongestionControlAlgorithm;
use westwood::CongestionControlStrategy;
use westwood::WestwoodConfig;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Largest RTT or gap accepted in an ACK trace, in milliseconds.
pub const MAX_TRACE_MS: u64 = 3600 * 1000;

/// One acknowledgment of an ACK trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEvent {
    /// Segments acknowledged.
    pub acked: u32,

    /// RTT sample carried by the acknowledgment. Zero means none.
    pub rtt: Duration,

    /// Time elapsed since the previous acknowledgment.
    pub gap: Duration,
}

/// Parse an ACK trace.
///
/// Each line is `ACKED RTT_MS [GAP_MS]`. Blank lines and lines starting
/// with `#` are skipped. RTT and gap are at most `MAX_TRACE_MS`.
pub fn parse_trace<R: BufRead>(reader: R) -> Result<Vec<AckEvent>> {
    let mut events = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 || fields.len() > 3 {
            return Err(format!("line {}: expect 2 or 3 fields, got {:?}", lineno + 1, line).into());
        }

        let acked = fields[0]
            .parse::<u32>()
            .map_err(|e| format!("line {}: invalid acked {:?}: {}", lineno + 1, fields[0], e))?;
        let rtt = parse_ms(fields[1], "rtt", lineno + 1)?;
        let gap = match fields.get(2) {
            Some(v) => parse_ms(v, "gap", lineno + 1)?,
            None => 0,
        };

        events.push(AckEvent {
            acked,
            rtt: Duration::from_millis(rtt),
            gap: Duration::from_millis(gap),
        });
    }

    Ok(events)
}

fn parse_ms(v: &str, name: &str, lineno: usize) -> Result<u64> {
    let ms = v
        .parse::<u64>()
        .map_err(|e| format!("line {}: invalid {} {:?}: {}", lineno, name, v, e))?;
    if ms > MAX_TRACE_MS {
        return Err(format!("line {}: {} {}ms exceeds {}ms", lineno, name, ms, MAX_TRACE_MS).into());
    }
    Ok(ms)
}

/// State after one acknowledgment was processed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepReport {
    /// Index of the acknowledgment in the trace.
    pub index: usize,

    /// Simulated time in milliseconds.
    pub time_ms: u128,

    pub acked: u32,

    pub rtt_ms: u128,

    /// Sample timers delivered before this acknowledgment.
    pub timers_fired: usize,

    /// Bandwidth estimate in bytes per second.
    pub bandwidth: Option<f64>,

    /// Rate estimate in bytes per second.
    pub rate: Option<f64>,

    /// Slow start threshold in bytes.
    pub ssthresh: u32,
}

/// Summary of a simulation run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
    pub steps: usize,
    pub final_ssthresh: u32,
    pub min_ssthresh: f64,
    pub max_ssthresh: f64,
    pub mean_ssthresh: f64,
}

/// Replays an ACK trace through a strategy on a virtual clock.
///
/// After each acknowledgment the threshold is queried and stored as the new
/// slow start threshold of the socket.
pub struct Simulator {
    cc: Box<dyn CongestionControlStrategy>,
    queue: EventQueue<SampleTimer>,
    tcb: TcpSocketState,
    start: Instant,
    steps: usize,
    thresholds: Vec<f64>,
}

impl Simulator {
    pub fn new(
        algor: CongestionControlAlgorithm,
        conf: &WestwoodConfig,
        tcb: TcpSocketState,
    ) -> Result<Self> {
        let start = Instant::now();
        Ok(Self {
            cc: build_congestion_strategy(algor, conf)?,
            queue: EventQueue::new(start),
            tcb,
            start,
            steps: 0,
            thresholds: Vec::new(),
        })
    }

    pub fn tcb(&self) -> &TcpSocketState {
        &self.tcb
    }

    /// Process one acknowledgment.
    pub fn on_ack(&mut self, ev: &AckEvent) -> Result<StepReport> {
        let now = self.queue.now() + ev.gap;
        let timers_fired = self.fire_until(now);
        self.queue.advance_to(now)?;

        self.cc
            .on_ack(&self.tcb, ev.acked, ev.rtt, &mut self.queue);
        self.tcb.ssthresh = self.cc.ssthresh(&self.tcb, self.tcb.cwnd);
        self.thresholds.push(self.tcb.ssthresh as f64);

        let report = StepReport {
            index: self.steps,
            time_ms: now.duration_since(self.start).as_millis(),
            acked: ev.acked,
            rtt_ms: ev.rtt.as_millis(),
            timers_fired,
            bandwidth: self.cc.bandwidth_estimate(),
            rate: self.cc.rate_estimate(),
            ssthresh: self.tcb.ssthresh,
        };
        self.steps += 1;

        debug!("{} step {:?}", self.cc.name(), report);
        Ok(report)
    }

    /// Deliver every pending timer, then cancel whatever the strategy
    /// rescheduled and close it.
    pub fn finish(&mut self, drain: bool) -> Summary {
        if drain {
            while let Some((handle, timer)) = self.queue.pop_next() {
                self.cc.on_timeout(handle, timer, &self.tcb);
            }
        }
        self.cc.on_close(&mut self.queue);

        let data = Data::new(self.thresholds.clone());
        let (min, max, mean) = if self.thresholds.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (data.min(), data.max(), data.mean().unwrap_or(0.0))
        };

        Summary {
            steps: self.steps,
            final_ssthresh: self.tcb.ssthresh,
            min_ssthresh: min,
            max_ssthresh: max,
            mean_ssthresh: mean,
        }
    }

    fn fire_until(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while self.queue.next_deadline().map_or(false, |d| d <= now) {
            if let Some((handle, timer)) = self.queue.pop_next() {
                if self.cc.on_timeout(handle, timer, &self.tcb) {
                    fired += 1;
                }
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_TRACE: &str = "\
# acked rtt_ms
4 100
5 105
6 80
7 100
8 110
9 140
10 150
11 190
";

    fn reference_tcb() -> TcpSocketState {
        TcpSocketState::new(2 * 1446, 4 * 1446, 1446)
    }

    #[test]
    fn parse() -> Result<()> {
        let events = parse_trace("4 100\n\n# comment\n5 0 20\n".as_bytes())?;
        assert_eq!(
            events,
            vec![
                AckEvent {
                    acked: 4,
                    rtt: Duration::from_millis(100),
                    gap: Duration::ZERO,
                },
                AckEvent {
                    acked: 5,
                    rtt: Duration::ZERO,
                    gap: Duration::from_millis(20),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn parse_error() {
        assert!(parse_trace("4".as_bytes()).is_err());
        assert!(parse_trace("4 100 1 2".as_bytes()).is_err());
        assert!(parse_trace("x 100".as_bytes()).is_err());
        assert!(parse_trace("4 -1".as_bytes()).is_err());
    }

    #[test]
    fn parse_out_of_range() -> Result<()> {
        let events = parse_trace("4 3600000 3600000\n".as_bytes())?;
        assert_eq!(events[0].rtt, Duration::from_secs(3600));

        let err = parse_trace("4 100\n4 3600001\n".as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("line 2: rtt"));

        let err = parse_trace("4 100 18446744073709551615\n".as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("line 1: gap"));
        Ok(())
    }

    #[test]
    fn reference_scenario() -> Result<()> {
        let events = parse_trace(REFERENCE_TRACE.as_bytes())?;
        let mut sim = Simulator::new(
            CongestionControlAlgorithm::Westwood,
            &WestwoodConfig::default(),
            reference_tcb(),
        )?;

        let mut last = None;
        for ev in &events {
            last = Some(sim.on_ack(ev)?);
        }
        let last = last.unwrap();
        assert_eq!(last.index, 7);
        assert_eq!(last.ssthresh, 3994);
        assert_eq!(last.rate, Some(0.0));

        let summary = sim.finish(true);
        assert_eq!(summary.steps, 8);
        assert_eq!(summary.final_ssthresh, 3994);
        assert_eq!(summary.min_ssthresh, 2892.0);
        assert_eq!(summary.max_ssthresh, 3994.0);
        Ok(())
    }

    #[test]
    fn westwood_plus_fires_timers_between_acks() -> Result<()> {
        let events = parse_trace("4 100 0\n4 100 50\n4 100 60\n".as_bytes())?;
        let mut sim = Simulator::new(
            CongestionControlAlgorithm::WestwoodPlus,
            &WestwoodConfig::default(),
            reference_tcb(),
        )?;

        assert_eq!(sim.on_ack(&events[0])?.timers_fired, 0);
        assert_eq!(sim.on_ack(&events[1])?.timers_fired, 0);

        // The sample scheduled by the first ACK is due at 100ms.
        let report = sim.on_ack(&events[2])?;
        assert_eq!(report.time_ms, 110);
        assert_eq!(report.timers_fired, 1);
        assert!(report.bandwidth.unwrap() > 0.0);

        let summary = sim.finish(false);
        assert_eq!(summary.steps, 3);
        Ok(())
    }

    #[test]
    fn new_reno_halves() -> Result<()> {
        let mut sim = Simulator::new(
            CongestionControlAlgorithm::NewReno,
            &WestwoodConfig::default(),
            TcpSocketState::new(20 * 1446, u32::MAX, 1446),
        )?;
        let report = sim.on_ack(&AckEvent {
            acked: 1,
            rtt: Duration::from_millis(10),
            gap: Duration::ZERO,
        })?;
        assert_eq!(report.ssthresh, 10 * 1446);
        assert_eq!(report.bandwidth, None);
        assert_eq!(sim.tcb().ssthresh, 10 * 1446);
        Ok(())
    }

    #[test]
    fn empty_summary() -> Result<()> {
        let mut sim = Simulator::new(
            CongestionControlAlgorithm::WestwoodCrb,
            &WestwoodConfig::default(),
            reference_tcb(),
        )?;
        let summary = sim.finish(true);
        assert_eq!(summary.steps, 0);
        assert_eq!(summary.final_ssthresh, 4 * 1446);
        assert_eq!(summary.mean_ssthresh, 0.0);
        Ok(())
    }
}
