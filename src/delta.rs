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

//! Per-field delta memory and the size-tiered delta token ladder.
//!
//! For every field dictionary slot both sides remember the last numeric
//! value and its kind. Values are stored reconstructed — exactly what the
//! decoder holds — so repeated deltas never drift.

use basic::{token, DICT_SIZE};
use util::bit_util::{encode_varint, zigzag_encode};

/// Kind tag of the last value recorded for a field slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastKind {
  None,
  Int,
  Float
}

/// Last numeric value per field slot. Reset on frame start; a slot is also
/// reset when its field dictionary entry is evicted.
pub struct DeltaMemory {
  values: [f64; DICT_SIZE],
  kinds: [LastKind; DICT_SIZE]
}

impl DeltaMemory {
  pub fn new() -> Self {
    DeltaMemory {
      values: [0.0; DICT_SIZE],
      kinds: [LastKind::None; DICT_SIZE]
    }
  }

  pub fn reset_slot(&mut self, slot: u8) {
    self.values[slot as usize] = 0.0;
    self.kinds[slot as usize] = LastKind::None;
  }

  pub fn kind(&self, slot: u8) -> LastKind {
    self.kinds[slot as usize]
  }

  pub fn int_value(&self, slot: u8) -> i32 {
    self.values[slot as usize] as i32
  }

  pub fn float_value(&self, slot: u8) -> f64 {
    self.values[slot as usize]
  }

  pub fn record_int(&mut self, slot: u8, value: i32) {
    self.values[slot as usize] = value as f64;
    self.kinds[slot as usize] = LastKind::Int;
  }

  pub fn record_float(&mut self, slot: u8, value: f64) {
    self.values[slot as usize] = value;
    self.kinds[slot as usize] = LastKind::Float;
  }
}

// ----------------------------------------------------------------------
// Delta token ladder

/// Appends the smallest delta encoding for `delta`: a dedicated token for
/// 0/±1, an inline token for -8..=7, a two-byte medium form for -64..=63,
/// and a zig-zag varint otherwise.
pub fn write_delta(out: &mut Vec<u8>, delta: i32) {
  match delta {
    0 => out.push(token::DELTA_ZERO),
    1 => out.push(token::DELTA_ONE),
    -1 => out.push(token::DELTA_NEG_ONE),
    -8...7 => out.push(token::DELTA_BASE + (delta + 8) as u8),
    -64...63 => {
      out.push(token::DELTA_MEDIUM);
      out.push((delta + 64) as u8);
    },
    _ => {
      out.push(token::DELTA_LARGE);
      encode_varint(out, zigzag_encode(delta));
    }
  }
}

/// Wire cost in bytes of the ladder encoding for `delta`.
pub fn delta_cost(delta: i32) -> usize {
  match delta {
    -8...7 => 1,
    -64...63 => 2,
    _ => {
      let zz = zigzag_encode(delta);
      let mut len = 2;
      let mut v = zz >> 7;
      while v > 0 {
        len += 1;
        v >>= 7;
      }
      len
    }
  }
}
