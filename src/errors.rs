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

//! Common error and result types for PACKR encoding and decoding.

use std::result;

quick_error! {
  /// Errors surfaced by the codec. Frame-level rejects (`InvalidMagic`,
  /// `VersionMismatch`, `CrcMismatch`) are raised before any event is
  /// produced; the decoder is not reentered after a scalar decode error.
  #[derive(Debug)]
  pub enum PackrError {
    BufferFull {
      display("Destination buffer is full")
    }
    InvalidMagic {
      display("Not a PACKR frame: bad magic bytes")
    }
    VersionMismatch(version: u8) {
      display("Unsupported PACKR frame version {}", version)
    }
    CrcMismatch(expected: u32, actual: u32) {
      display("Frame CRC mismatch: expected {:#010x}, computed {:#010x}", expected, actual)
    }
    InvalidToken(token: u8) {
      display("Invalid token byte {:#04x}", token)
    }
    TruncatedInput(what: &'static str) {
      display("Truncated input while reading {}", what)
    }
    InvalidDelta(slot: u8) {
      display("Delta token without numeric history for field slot {}", slot)
    }
    SinkError(code: i32) {
      display("Sink callback failed with code {}", code)
    }
    InvalidNesting(what: &'static str) {
      display("Invalid nesting: {}", what)
    }
    Json(err: ::serde_json::Error) {
      from()
      cause(err)
      display("JSON error: {}", err)
    }
  }
}

/// A `Result` alias used throughout the crate.
pub type Result<T> = result::Result<T, PackrError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display() {
    assert_eq!(
      format!("{}", PackrError::InvalidToken(0xE0)),
      "Invalid token byte 0xe0"
    );
    assert_eq!(
      format!("{}", PackrError::VersionMismatch(2)),
      "Unsupported PACKR frame version 2"
    );
    assert_eq!(
      format!("{}", PackrError::SinkError(-5)),
      "Sink callback failed with code -5"
    );
  }
}
