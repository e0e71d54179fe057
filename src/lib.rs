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

//! Westwood is a bandwidth estimation engine for TCP congestion control.
//!
//! It consumes the acknowledgment stream of a connection (segments acked and
//! the RTT sample of each acknowledgment), keeps a smoothed estimate of the
//! available bandwidth, and uses it to pick the slow start threshold when
//! the transport reacts to congestion.
//!
//! ## Algorithms
//!
//! * **Westwood**: a bandwidth sample on every acknowledgment.
//! * **Westwood+**: one bandwidth sample per RTT, driven by a timer.
//! * **Westwood CRB**: per-ACK bandwidth samples plus a rate estimate sampled
//!   over a fixed period.
//! * **NewReno**: the halving baseline, for comparison.
//!
//! Raw samples may be smoothed by a Tustin low-pass filter.
//!
//! ## Get started
//!
//! ```
//! use std::time::{Duration, Instant};
//! use westwood::congestion_control::TcpSocketState;
//! use westwood::scheduler::{EventQueue, SampleTimer};
//! use westwood::{Westwood, WestwoodConfig};
//!
//! let mut cc = Westwood::new(WestwoodConfig::default())?;
//! let mut scheduler: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
//! let mut tcb = TcpSocketState::new(2 * 1446, 4 * 1446, 1446);
//!
//! cc.on_ack(&tcb, 4, Duration::from_millis(100), &mut scheduler);
//! tcb.ssthresh = cc.get_threshold(tcb.cwnd, tcb.segment_size);
//! assert!(tcb.ssthresh >= 2 * 1446);
//!
//! cc.close(&mut scheduler);
//! # Ok::<(), westwood::Error>(())
//! ```
//!
//! Strategies scheduling timers (Westwood+ and Westwood CRB) expect the
//! caller to deliver fired timers back through `on_timeout`. Timers still
//! pending are cancelled by `close` (or `on_close`), and are never delivered
//! once the strategy is dropped.

use std::time::Duration;

/// Default rate estimation period of Westwood CRB.
pub const DEFAULT_T_INTERVAL: Duration = Duration::from_millis(400);

/// Smoothing coefficient of the Tustin filter.
pub const TUSTIN_ALPHA: f64 = 0.9;

/// Westwood CRB prefers the rate estimate while cwnd is less than
/// `CRB_THETA` times the rate-delay product.
pub const CRB_THETA: f64 = 1.4;

/// A specialized [`Result`] type for westwood operations.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .format_timestamp_millis()
            .is_test(true)
            .init();
    }

    #[test]
    fn constants() {
        assert_eq!(DEFAULT_T_INTERVAL, Duration::from_millis(400));
        assert!(TUSTIN_ALPHA > 0.0 && TUSTIN_ALPHA < 1.0);
        assert!(CRB_THETA > 1.0);
    }
}

pub use crate::config::WestwoodConfig;
pub use crate::congestion_control::build_congestion_strategy;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::congestion_control::CongestionControlStrategy;
pub use crate::congestion_control::FilterType;
pub use crate::congestion_control::Westwood;
pub use crate::congestion_control::WestwoodVariant;
pub use crate::error::Error;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

pub mod config;
pub mod error;
pub mod scheduler;
