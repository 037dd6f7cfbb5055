// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Optional scratch-allocation instrumentation. Callers that want
//! visibility into batch and LZ77 scratch usage attach a tracker; nothing
//! is recorded otherwise.

use std::cell::Cell;
use std::rc::Rc;

/// Reference counted pointer for [`MemTracker`].
pub type MemTrackerPtr = Rc<MemTracker>;

/// Tracks current and peak scratch bytes reported by the codec.
pub struct MemTracker {
  current: Cell<i64>,
  max: Cell<i64>
}

impl MemTracker {
  pub fn new() -> Self {
    MemTracker {
      current: Cell::new(0),
      max: Cell::new(0)
    }
  }

  /// Records an allocation (positive) or release (negative).
  pub fn alloc(&self, bytes: i64) {
    let new = self.current.get() + bytes;
    self.current.set(new);
    if new > self.max.get() {
      self.max.set(new);
    }
  }

  /// Current outstanding scratch bytes.
  pub fn memory_usage(&self) -> i64 {
    self.current.get()
  }

  /// Peak outstanding scratch bytes.
  pub fn max_memory_usage(&self) -> i64 {
    self.max.get()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tracker() {
    let tracker = MemTracker::new();
    tracker.alloc(100);
    tracker.alloc(400);
    assert_eq!(tracker.memory_usage(), 500);
    tracker.alloc(-400);
    assert_eq!(tracker.memory_usage(), 100);
    assert_eq!(tracker.max_memory_usage(), 500);
  }
}
