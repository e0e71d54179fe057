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

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Receives changes of the smoothed estimates, in bytes per second.
pub trait EstimateObserver {
    /// Called when the bandwidth estimate changed.
    fn on_bandwidth_changed(&mut self, old: f64, new: f64);

    /// Called when the rate estimate changed.
    fn on_rate_changed(&mut self, old: f64, new: f64) {}
}

impl fmt::Debug for dyn EstimateObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "estimate observer.")
    }
}

/// Estimate changes recorded by an [`EstimateRecorder`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EstimateHistory {
    /// (old, new) pairs of bandwidth estimate changes.
    pub bandwidth: Vec<(f64, f64)>,

    /// (old, new) pairs of rate estimate changes.
    pub rate: Vec<(f64, f64)>,
}

/// An observer keeping every change it has seen.
///
/// Clones share the same history, so a clone can be handed to the strategy
/// while the caller keeps reading from the original.
#[derive(Debug, Default, Clone)]
pub struct EstimateRecorder {
    history: Rc<RefCell<EstimateHistory>>,
}

impl EstimateRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded changes.
    pub fn history(&self) -> EstimateHistory {
        self.history.borrow().clone()
    }

    /// Latest bandwidth estimate seen, if any.
    pub fn last_bandwidth(&self) -> Option<f64> {
        self.history.borrow().bandwidth.last().map(|(_, new)| *new)
    }

    /// Latest rate estimate seen, if any.
    pub fn last_rate(&self) -> Option<f64> {
        self.history.borrow().rate.last().map(|(_, new)| *new)
    }
}

impl EstimateObserver for EstimateRecorder {
    fn on_bandwidth_changed(&mut self, old: f64, new: f64) {
        self.history.borrow_mut().bandwidth.push((old, new));
    }

    fn on_rate_changed(&mut self, old: f64, new: f64) {
        self.history.borrow_mut().rate.push((old, new));
    }
}
