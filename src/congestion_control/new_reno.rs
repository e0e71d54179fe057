// Copyright (c) 2024 The TQUIC Authors.
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

use std::cmp;
use std::time::Duration;

use super::CongestionControlStrategy;
use super::TransportState;
use crate::scheduler::SampleTimer;
use crate::scheduler::Scheduler;
use crate::scheduler::TimerHandle;

/// NewReno halves the data in flight on a congestion event.
///
/// It keeps no estimate and is the baseline the Westwood family improves on.
/// See RFC 5681 Section 3.1.
#[derive(Debug, Default, Clone)]
pub struct NewReno;

impl NewReno {
    pub fn new() -> Self {
        Self
    }
}

impl CongestionControlStrategy for NewReno {
    fn name(&self) -> &str {
        "NEW_RENO"
    }

    fn on_ack(
        &mut self,
        tcb: &dyn TransportState,
        acked: u32,
        rtt: Duration,
        scheduler: &mut dyn Scheduler,
    ) {
        // Do nothing.
    }

    fn on_timeout(
        &mut self,
        handle: TimerHandle,
        timer: SampleTimer,
        tcb: &dyn TransportState,
    ) -> bool {
        false
    }

    fn ssthresh(&self, tcb: &dyn TransportState, bytes_in_flight: u32) -> u32 {
        cmp::max(tcb.segment_size().saturating_mul(2), bytes_in_flight / 2)
    }

    fn fork(&self) -> Box<dyn CongestionControlStrategy> {
        Box::new(self.clone())
    }

    fn on_close(&mut self, scheduler: &mut dyn Scheduler) {
        // Do nothing.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion_control::TcpSocketState;
    use crate::scheduler::EventQueue;
    use std::time::Instant;

    #[test]
    fn new_reno_init() {
        let r = NewReno::new();
        assert_eq!(r.name(), "NEW_RENO");
        assert_eq!(r.bandwidth_estimate(), None);
        assert_eq!(r.rate_estimate(), None);
    }

    #[test]
    fn new_reno_ssthresh() {
        let mut r = NewReno::new();
        let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
        let tcb = TcpSocketState::new(10 * 1446, u32::MAX, 1446);

        r.on_ack(&tcb, 10, Duration::from_millis(100), &mut q);
        assert!(q.is_empty());

        assert_eq!(r.ssthresh(&tcb, 10 * 1446), 5 * 1446);
        assert_eq!(r.ssthresh(&tcb, 1446), 2 * 1446);
        assert_eq!(r.ssthresh(&tcb, 0), 2 * 1446);

        let f = r.fork();
        assert_eq!(f.name(), "NEW_RENO");
        assert_eq!(f.ssthresh(&tcb, 10 * 1446), 5 * 1446);
    }
}
