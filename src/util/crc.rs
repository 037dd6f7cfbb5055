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

//! CRC-32/IEEE (reflected polynomial `0xEDB88320`), table-driven.

const POLYNOMIAL: u32 = 0xEDB88320;

lazy_static! {
  static ref CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    for i in 0..256 {
      let mut crc = i as u32;
      for _ in 0..8 {
        crc = if crc & 1 != 0 { (crc >> 1) ^ POLYNOMIAL } else { crc >> 1 };
      }
      table[i] = crc;
    }
    table
  };
}

/// One-shot CRC of a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
  let mut crc = Crc32::new();
  crc.update(data);
  crc.finish()
}

/// Incremental CRC state for the streaming frame writer.
pub struct Crc32 {
  state: u32
}

impl Crc32 {
  pub fn new() -> Self {
    Crc32 { state: 0xFFFFFFFF }
  }

  pub fn update(&mut self, data: &[u8]) {
    let mut crc = self.state;
    for &byte in data {
      crc = (crc >> 8) ^ CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize];
    }
    self.state = crc;
  }

  pub fn finish(&self) -> u32 {
    self.state ^ 0xFFFFFFFF
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_check_value() {
    // Standard CRC-32/IEEE check value.
    assert_eq!(crc32(b"123456789"), 0xCBF43926);
  }

  #[test]
  fn test_empty() {
    assert_eq!(crc32(b""), 0);
  }

  #[test]
  fn test_incremental_matches_one_shot() {
    let data = b"structure-first streaming compression";
    let mut crc = Crc32::new();
    crc.update(&data[..10]);
    crc.update(&data[10..]);
    assert_eq!(crc.finish(), crc32(data));
  }

  #[test]
  fn test_sensitivity() {
    assert_ne!(crc32(b"PKR1\x01\x00"), crc32(b"PKR1\x01\x01"));
  }
}
