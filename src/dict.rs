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

//! Fixed-capacity LRU dictionaries for field names, string values and MAC
//! addresses.
//!
//! The encoder and the decoder each hold an instance per role and drive it
//! from the token stream alone, so both sides evolve in lockstep: a
//! reference bumps the slot's stamp, a new entry claims the first empty
//! slot or evicts the lowest stamp (lowest index on ties).

use basic::DICT_SIZE;

struct Entry {
  key: Vec<u8>,
  stamp: u64
}

/// A 64-slot byte-string dictionary with monotonic last-used stamps.
pub struct Dictionary {
  slots: Vec<Option<Entry>>,
  counter: u64
}

impl Dictionary {
  pub fn new() -> Self {
    let mut slots = Vec::with_capacity(DICT_SIZE);
    for _ in 0..DICT_SIZE {
      slots.push(None);
    }
    Dictionary {
      slots: slots,
      counter: 0
    }
  }

  /// Returns the slot holding `key` and bumps its stamp, or `None`.
  pub fn lookup(&mut self, key: &[u8]) -> Option<u8> {
    for i in 0..DICT_SIZE {
      let hit = match self.slots[i] {
        Some(ref entry) => entry.key == key,
        None => false
      };
      if hit {
        self.touch(i);
        return Some(i as u8);
      }
    }
    None
  }

  /// Claims a slot for a new key: the first empty slot, otherwise the slot
  /// with the smallest stamp. The stamp is assigned after eviction.
  pub fn insert(&mut self, key: &[u8]) -> u8 {
    let mut index = None;
    let mut min_stamp = u64::max_value();
    let mut min_index = 0;
    for i in 0..DICT_SIZE {
      match self.slots[i] {
        None => {
          index = Some(i);
          break;
        },
        Some(ref entry) => {
          if entry.stamp < min_stamp {
            min_stamp = entry.stamp;
            min_index = i;
          }
        }
      }
    }
    let index = index.unwrap_or(min_index);
    self.slots[index] = Some(Entry {
      key: key.to_vec(),
      stamp: 0
    });
    self.touch(index);
    index as u8
  }

  /// Looks up `key`, installing it if absent. Returns the slot index and
  /// whether the key is new.
  pub fn lookup_or_add(&mut self, key: &[u8]) -> (u8, bool) {
    match self.lookup(key) {
      Some(index) => (index, false),
      None => (self.insert(key), true)
    }
  }

  /// Key bytes stored at `index`, if the slot is occupied.
  pub fn get(&self, index: u8) -> Option<&[u8]> {
    match self.slots.get(index as usize) {
      Some(&Some(ref entry)) => Some(&entry.key),
      _ => None
    }
  }

  /// Bumps the stamp for a decoder-side reference. Returns false for an
  /// empty slot.
  pub fn bump(&mut self, index: u8) -> bool {
    if (index as usize) < DICT_SIZE && self.slots[index as usize].is_some() {
      self.touch(index as usize);
      true
    } else {
      false
    }
  }

  /// Number of occupied slots.
  pub fn len(&self) -> usize {
    self.slots.iter().filter(|slot| slot.is_some()).count()
  }

  fn touch(&mut self, index: usize) {
    self.counter += 1;
    let counter = self.counter;
    if let Some(ref mut entry) = self.slots[index] {
      entry.stamp = counter;
    }
  }
}
