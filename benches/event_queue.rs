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
use std::time::Instant;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use westwood::congestion_control::TcpSocketState;
use westwood::scheduler::EventQueue;
use westwood::scheduler::SampleTimer;
use westwood::scheduler::Scheduler;
use westwood::scheduler::TimerOwner;
use westwood::Westwood;
use westwood::WestwoodConfig;
use westwood::WestwoodVariant;

const RANGE: u64 = 10_000;

pub fn time_remaining_benchmark(c: &mut Criterion) {
    let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
    let owner = TimerOwner::new();
    for i in 0..RANGE {
        q.schedule(
            Duration::from_millis(i),
            SampleTimer::Bandwidth {
                interval: Duration::from_millis(i + 1),
            },
            &owner,
        );
    }
    c.bench_function("event queue remaining", |b| b.iter(|| q.time_remaining()));
}

pub fn reschedule_benchmark(c: &mut Criterion) {
    let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
    let timer = SampleTimer::Rate {
        interval: Duration::from_millis(400),
    };
    let owner = TimerOwner::new();
    let mut handle = q.schedule(Duration::from_millis(400), timer, &owner);
    c.bench_function("event queue cancel and reschedule", |b| {
        b.iter(|| {
            q.cancel(handle);
            handle = q.schedule(Duration::from_millis(400), timer, &owner);
        })
    });
}

pub fn westwood_plus_ack_benchmark(c: &mut Criterion) {
    let mut conf = WestwoodConfig::default();
    conf.set_variant(WestwoodVariant::WestwoodPlus);
    let mut cc = Westwood::new(conf).unwrap();
    let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
    let tcb = TcpSocketState::new(10 * 1446, u32::MAX, 1446);

    c.bench_function("westwood+ ack and timer", |b| {
        b.iter(|| {
            cc.on_ack(&tcb, 2, Duration::from_millis(50), &mut q);
            q.advance(Duration::from_millis(10));
            while let Some((handle, timer)) = q.next_expired() {
                cc.on_timeout(handle, timer, &tcb);
            }
        })
    });
    cc.close(&mut q);
}

criterion_group!(
    benches,
    time_remaining_benchmark,
    reschedule_benchmark,
    westwood_plus_ack_benchmark,
);
criterion_main!(benches);
