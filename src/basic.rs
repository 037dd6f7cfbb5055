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

//! Wire-level constants: the token alphabet, column flags and frame header
//! values shared by the encoder and the decoder.

use std::fmt;

/// Frame magic bytes, "PKR1".
pub const MAGIC: [u8; 4] = [0x50, 0x4B, 0x52, 0x31];

/// Frame format version.
pub const VERSION: u8 = 0x01;

/// Two-byte prefix of an LZ77-wrapped frame.
pub const ENVELOPE: [u8; 2] = [0xFE, 0x03];

/// Capacity of each of the three LRU dictionaries. Indices fit in the 6-bit
/// reference ranges of the token alphabet.
pub const DICT_SIZE: usize = 64;

/// The token alphabet. The first byte of every body item falls into one of
/// these ranges; payload layout is fixed per token.
pub mod token {
  /// `0x00..0x3F`: field dictionary reference, index = byte.
  pub const FIELD_BASE: u8 = 0x00;
  /// `0x40..0x7F`: string dictionary reference, index = byte - 0x40.
  pub const STRING_BASE: u8 = 0x40;
  /// `0x80..0xBF`: MAC dictionary reference, index = byte - 0x80.
  pub const MAC_BASE: u8 = 0x80;

  /// Signed zig-zag varint follows.
  pub const INT: u8 = 0xC0;
  /// Fixed-point value scaled by 256, i16 little-endian.
  pub const FLOAT16: u8 = 0xC1;
  /// Fixed-point value scaled by 65536, i32 little-endian.
  pub const FLOAT32: u8 = 0xC2;

  /// `0xC3..0xD2`: inline delta in -8..=7, value = byte - 0xC3 - 8.
  pub const DELTA_BASE: u8 = 0xC3;
  /// Signed zig-zag varint delta follows.
  pub const DELTA_LARGE: u8 = 0xD3;

  /// Varint length and bytes follow; installs into the string dictionary.
  pub const NEW_STRING: u8 = 0xD4;
  /// Varint length and bytes follow; installs into the field dictionary.
  pub const NEW_FIELD: u8 = 0xD5;
  /// Six raw bytes follow; installs into the MAC dictionary.
  pub const NEW_MAC: u8 = 0xD6;

  pub const BOOL_TRUE: u8 = 0xD7;
  pub const BOOL_FALSE: u8 = 0xD8;
  pub const NULL: u8 = 0xD9;

  /// Varint element count follows.
  pub const ARRAY_START: u8 = 0xDA;
  pub const ARRAY_END: u8 = 0xDB;
  pub const OBJECT_START: u8 = 0xDC;
  pub const OBJECT_END: u8 = 0xDD;

  /// IEEE-754 binary64 little-endian, lossless.
  pub const DOUBLE: u8 = 0xDE;
  /// Varint length and raw bytes follow.
  pub const BINARY: u8 = 0xDF;

  /// Varint run length follows.
  pub const RLE_REPEAT: u8 = 0xE5;
  pub const DELTA_ZERO: u8 = 0xE6;
  pub const DELTA_ONE: u8 = 0xE7;
  pub const DELTA_NEG_ONE: u8 = 0xE8;

  /// Self-contained record batch; layout described in `encodings::batch`.
  pub const ULTRA_BATCH: u8 = 0xE9;
  /// Varint count, then packed nibble deltas (two per byte).
  pub const BITPACK_COL: u8 = 0xEB;
  /// One payload byte, delta = byte - 64.
  pub const DELTA_MEDIUM: u8 = 0xEC;
  /// Varint count, parameter byte `k`, then the Rice-coded bit stream.
  pub const RICE_COLUMN: u8 = 0xED;
  /// Most-frequent-value column: mode value, exception bitmap, exceptions.
  pub const MFV_COLUMN: u8 = 0xEE;
  /// Opens an unbounded top-level array.
  pub const ARRAY_STREAM: u8 = 0xEF;
  /// Like `ULTRA_BATCH`, but appends to the open array stream.
  pub const BATCH_PARTIAL: u8 = 0xF0;
}

/// Per-column flag bits inside a batch header.
pub const COL_CONSTANT: u8 = 0x01;
pub const COL_DELTA: u8 = 0x02;
pub const COL_RLE: u8 = 0x04;
pub const COL_HAS_NULLS: u8 = 0x08;

// ----------------------------------------------------------------------
// Column kinds

/// Value kinds a batch column can hold after schema widening. `INT` widens
/// to `FLOAT` on conflict; any other mix forces the recursive fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  INT,
  FLOAT,
  STRING,
  BOOL
}

impl fmt::Display for ColumnKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{:?}", self)
  }
}

// ----------------------------------------------------------------------
// MAC addresses

/// Parses a canonical MAC address string: lowercase hex, colon-separated,
/// exactly 17 characters. Only this spelling is routed to the MAC
/// dictionary so that decoding reproduces the source text exactly.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
  let bytes = s.as_bytes();
  if bytes.len() != 17 {
    return None;
  }
  let mut mac = [0u8; 6];
  for i in 0..6 {
    let hi = match hex_val(bytes[i * 3]) {
      Some(v) => v,
      None => return None
    };
    let lo = match hex_val(bytes[i * 3 + 1]) {
      Some(v) => v,
      None => return None
    };
    if i < 5 && bytes[i * 3 + 2] != b':' {
      return None;
    }
    mac[i] = (hi << 4) | lo;
  }
  Some(mac)
}

/// Formats six raw bytes back into the canonical MAC spelling.
pub fn format_mac(mac: &[u8]) -> String {
  format!(
    "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
    mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
  )
}

fn hex_val(c: u8) -> Option<u8> {
  match c {
    b'0'...b'9' => Some(c - b'0'),
    b'a'...b'f' => Some(c - b'a' + 10),
    _ => None
  }
}
