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

use std::fs::File;
use std::io;
use std::io::BufReader;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use log::info;

use westwood::congestion_control::TcpSocketState;
use westwood::CongestionControlAlgorithm;
use westwood::FilterType;
use westwood::WestwoodConfig;
use westwood_tools::parse_trace;
use westwood_tools::Result;
use westwood_tools::Simulator;

#[derive(Parser, Debug, Clone)]
#[clap(name = "westwood_sim")]
pub struct SimOpt {
    /// ACK trace file, one `ACKED RTT_MS [GAP_MS]` per line. Read from stdin
    /// if not specified.
    #[clap(value_name = "FILE")]
    pub trace: Option<String>,

    /// Congestion control algorithm, support NewReno/Westwood/Westwood+/WestwoodCRB.
    #[clap(short, long, default_value = "Westwood")]
    pub congestion_control_algorithm: CongestionControlAlgorithm,

    /// Filter applied to raw samples, support None/Tustin.
    #[clap(short, long, default_value = "Tustin")]
    pub filter: FilterType,

    /// Rate estimation period of Westwood CRB.
    #[clap(long, default_value = "400", value_name = "TIME")]
    pub t_interval: u64,

    /// Segment size in bytes.
    #[clap(long, default_value = "1446", value_name = "NUM")]
    pub segment_size: u32,

    /// Initial congestion window in segments.
    #[clap(long, default_value = "2", value_name = "NUM")]
    pub initial_cwnd: u32,

    /// Initial slow start threshold in segments.
    #[clap(long, default_value = "4", value_name = "NUM")]
    pub initial_ssthresh: u32,

    /// Deliver the timers still pending at the end of the trace.
    #[clap(long)]
    pub drain: bool,

    /// Print one JSON object per line instead of text.
    #[clap(long)]
    pub json: bool,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "WARN", value_name = "STR")]
    pub log_level: log::LevelFilter,
}

fn parse_option() -> std::result::Result<SimOpt, clap::error::Error> {
    let option = SimOpt::parse();

    if option.segment_size == 0 {
        return Err(SimOpt::command().error(
            ErrorKind::InvalidValue,
            "Segment size must be positive",
        ));
    }

    if option.t_interval == 0 {
        return Err(SimOpt::command().error(
            ErrorKind::InvalidValue,
            "T interval must be positive",
        ));
    }

    Ok(option)
}

fn main() -> Result<()> {
    let option = match parse_option() {
        Ok(option) => option,
        Err(e) => e.exit(),
    };

    env_logger::builder()
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    let events = match &option.trace {
        Some(path) => parse_trace(BufReader::new(File::open(path)?))?,
        None => parse_trace(io::stdin().lock())?,
    };
    info!("loaded {} acknowledgments", events.len());

    let mut conf = WestwoodConfig::default();
    conf.set_filter(option.filter)
        .set_t_interval(Duration::from_millis(option.t_interval))
        .set_trace_id("sim");

    let tcb = TcpSocketState::new(
        option.initial_cwnd.saturating_mul(option.segment_size),
        option.initial_ssthresh.saturating_mul(option.segment_size),
        option.segment_size,
    );
    let mut sim = Simulator::new(option.congestion_control_algorithm, &conf, tcb)?;

    for ev in &events {
        let report = sim.on_ack(ev)?;
        if option.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "#{} t={}ms acked={} rtt={}ms timers={} bw={:.1} re={:.1} ssthresh={}",
                report.index,
                report.time_ms,
                report.acked,
                report.rtt_ms,
                report.timers_fired,
                report.bandwidth.unwrap_or(0.0),
                report.rate.unwrap_or(0.0),
                report.ssthresh
            );
        }
    }

    let summary = sim.finish(option.drain);
    if option.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "steps={} ssthresh final={} min={} max={} mean={:.1}",
            summary.steps,
            summary.final_ssthresh,
            summary.min_ssthresh,
            summary.max_ssthresh,
            summary.mean_ssthresh
        );
    }

    Ok(())
}
