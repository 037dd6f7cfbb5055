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

//! The PACKR encoder: value events in, frame bytes out.
//!
//! `Encoder` exposes the value-event interface (`encode_int`,
//! `encode_field`, `encode_object_start`, ...) plus `encode_document` for a
//! whole value tree. Dictionary state, delta memory and the nesting stack
//! evolve purely from the emitted token stream, so a decoder replaying the
//! body reconstructs the exact same state.

use std::mem;

use byteorder::{ByteOrder, LittleEndian};

use basic::{self, token};
use data_type::Value;
use delta::{self, DeltaMemory, LastKind};
use dict::Dictionary;
use encodings::batch;
use errors::{PackrError, Result};
use lz77;
use util::bit_util::{encode_varint, zigzag_encode};
use util::crc::crc32;
use util::memory::MemTrackerPtr;

/// Maximum container nesting accepted on either side.
pub const MAX_DEPTH: usize = 128;

/// Frames at or below this size are never worth the LZ77 envelope.
const MIN_COMPRESS_LEN: usize = 20;

/// Knobs for `finish`.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
  /// Wrap the frame in the LZ77 envelope when that saves space.
  pub compress: bool
}

impl Default for EncodeOptions {
  fn default() -> Self {
    EncodeOptions { compress: true }
  }
}

enum Scope {
  Object { field: Option<u8>, awaiting: bool },
  Array
}

/// Single-use frame encoder. Create, feed events or a document, `finish`.
pub struct Encoder {
  body: Vec<u8>,
  fields: Dictionary,
  strings: Dictionary,
  macs: Dictionary,
  deltas: DeltaMemory,
  symbols: u32,
  scopes: Vec<Scope>,
  mem: Option<MemTrackerPtr>
}

impl Encoder {
  pub fn new() -> Self {
    Encoder {
      body: Vec::new(),
      fields: Dictionary::new(),
      strings: Dictionary::new(),
      macs: Dictionary::new(),
      deltas: DeltaMemory::new(),
      symbols: 0,
      scopes: Vec::new(),
      mem: None
    }
  }

  /// Like `new`, with scratch allocations reported to `tracker`.
  pub fn with_mem_tracker(tracker: MemTrackerPtr) -> Self {
    let mut encoder = Encoder::new();
    encoder.mem = Some(tracker);
    encoder
  }

  /// Tokens emitted so far.
  pub fn symbol_count(&self) -> u32 {
    self.symbols
  }

  // ----------------------------------------------------------------------
  // Value events

  pub fn encode_null(&mut self) -> Result<()> {
    self.check_value()?;
    self.write_null_value();
    self.value_done();
    Ok(())
  }

  pub fn encode_bool(&mut self, value: bool) -> Result<()> {
    self.check_value()?;
    self.write_bool_value(value);
    self.value_done();
    Ok(())
  }

  /// Encodes an integer, as a delta against the active field's previous
  /// integer when one is remembered.
  pub fn encode_int(&mut self, value: i32) -> Result<()> {
    self.check_value()?;
    let slot = self.delta_slot();
    match slot {
      Some(s) if self.deltas.kind(s) == LastKind::Int => {
        let d = value.wrapping_sub(self.deltas.int_value(s));
        self.emit_delta(d);
        self.deltas.record_int(s, value);
      },
      _ => {
        self.write_int_value(value);
        if let Some(s) = slot {
          self.deltas.record_int(s, value);
        }
      }
    }
    self.value_done();
    Ok(())
  }

  /// Encodes a double losslessly.
  pub fn encode_double(&mut self, value: f64) -> Result<()> {
    self.check_value()?;
    self.write_double_value(value);
    if let Some(s) = self.delta_slot() {
      self.deltas.record_float(s, value);
    }
    self.value_done();
    Ok(())
  }

  /// Low-precision path: fixed-point scaled by 65536. Quantizes to
  /// multiples of 2^-16.
  pub fn encode_float32(&mut self, value: f64) -> Result<()> {
    self.check_value()?;
    let reconstructed = self.write_float32_value(value);
    if let Some(s) = self.delta_slot() {
      self.deltas.record_float(s, reconstructed);
    }
    self.value_done();
    Ok(())
  }

  /// Low-precision path: fixed-point scaled by 256.
  pub fn encode_float16(&mut self, value: f64) -> Result<()> {
    self.check_value()?;
    self.emit_token(token::FLOAT16);
    let scaled = fixed16(value);
    let mut buf = [0u8; 2];
    LittleEndian::write_i16(&mut buf, scaled);
    self.put_bytes(&buf);
    self.value_done();
    Ok(())
  }

  pub fn encode_binary(&mut self, data: &[u8]) -> Result<()> {
    self.check_value()?;
    self.emit_token(token::BINARY);
    self.put_varint(data.len() as u32);
    self.put_bytes(data);
    self.value_done();
    Ok(())
  }

  /// Encodes a string through the string dictionary, or through the MAC
  /// dictionary when it is a canonical MAC address.
  pub fn encode_string(&mut self, value: &str) -> Result<()> {
    self.check_value()?;
    self.write_string_value(value);
    self.value_done();
    Ok(())
  }

  /// Announces the field for the next value of the current record.
  pub fn encode_field(&mut self, name: &str) -> Result<()> {
    match self.scopes.last() {
      Some(&Scope::Object { awaiting: false, .. }) => {},
      Some(&Scope::Object { .. }) => {
        return Err(PackrError::InvalidNesting("field follows an unvalued field"));
      },
      _ => return Err(PackrError::InvalidNesting("field event outside a record"))
    }
    let slot = self.write_field_name(name);
    if let Some(&mut Scope::Object { ref mut field, ref mut awaiting }) = self.scopes.last_mut() {
      *field = Some(slot);
      *awaiting = true;
    }
    Ok(())
  }

  pub fn encode_object_start(&mut self) -> Result<()> {
    self.check_value()?;
    if self.scopes.len() >= MAX_DEPTH {
      return Err(PackrError::InvalidNesting("nesting too deep"));
    }
    self.scopes.push(Scope::Object { field: None, awaiting: false });
    self.emit_token(token::OBJECT_START);
    Ok(())
  }

  pub fn encode_object_end(&mut self) -> Result<()> {
    match self.scopes.last() {
      Some(&Scope::Object { awaiting: false, .. }) => {},
      Some(&Scope::Object { .. }) => {
        return Err(PackrError::InvalidNesting("record closed after an unvalued field"));
      },
      _ => return Err(PackrError::InvalidNesting("object end without matching start"))
    }
    self.scopes.pop();
    self.emit_token(token::OBJECT_END);
    self.value_done();
    Ok(())
  }

  pub fn encode_array_start(&mut self, count: u32) -> Result<()> {
    self.check_value()?;
    if self.scopes.len() >= MAX_DEPTH {
      return Err(PackrError::InvalidNesting("nesting too deep"));
    }
    self.scopes.push(Scope::Array);
    self.emit_token(token::ARRAY_START);
    self.put_varint(count);
    Ok(())
  }

  pub fn encode_array_end(&mut self) -> Result<()> {
    match self.scopes.last() {
      Some(&Scope::Array) => {},
      _ => return Err(PackrError::InvalidNesting("array end without matching start"))
    }
    self.scopes.pop();
    self.emit_token(token::ARRAY_END);
    self.value_done();
    Ok(())
  }

  // ----------------------------------------------------------------------
  // Document encoding

  /// Encodes a whole value tree. Arrays of flat records are routed through
  /// the column analyzer; everything else is encoded recursively.
  pub fn encode_document(&mut self, value: &Value) -> Result<()> {
    self.encode_value(value, 0)
  }

  fn encode_value(&mut self, value: &Value, depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
      return Err(PackrError::InvalidNesting("nesting too deep"));
    }
    match *value {
      Value::Null => self.encode_null(),
      Value::Bool(v) => self.encode_bool(v),
      Value::Int(v) => self.encode_int(v),
      Value::Double(v) => self.encode_double(v),
      Value::Binary(ref data) => self.encode_binary(data),
      Value::Str(ref s) => self.encode_string(s),
      Value::Object(ref pairs) => {
        self.encode_object_start()?;
        for &(ref name, ref v) in pairs.iter() {
          self.encode_field(name)?;
          self.encode_value(v, depth + 1)?;
        }
        self.encode_object_end()
      },
      Value::Array(ref items) => self.encode_array(items, depth)
    }
  }

  fn encode_array(&mut self, items: &[Value], depth: usize) -> Result<()> {
    if batch::is_batchable_array(items) {
      self.check_value()?;
      if items.len() <= batch::MAX_DOC_BATCH_ROWS {
        batch::encode_batch(self, items, token::ULTRA_BATCH)?;
      } else {
        debug!("chunking {} buffered rows into partial batches", items.len());
        self.emit_token(token::ARRAY_STREAM);
        for chunk in items.chunks(batch::MAX_BATCH_ROWS) {
          batch::encode_batch(self, chunk, token::BATCH_PARTIAL)?;
        }
        self.emit_token(token::ARRAY_END);
      }
      self.value_done();
      Ok(())
    } else {
      self.encode_array_start(items.len() as u32)?;
      for item in items.iter() {
        self.encode_value(item, depth + 1)?;
      }
      self.encode_array_end()
    }
  }

  // ----------------------------------------------------------------------
  // Framing

  /// Builds the final frame: header with the symbol count, body, CRC over
  /// header and body, optionally LZ77-wrapped when that saves space.
  pub fn finish(self, options: &EncodeOptions) -> Result<Vec<u8>> {
    if !self.scopes.is_empty() {
      return Err(PackrError::InvalidNesting("unclosed container at end of frame"));
    }
    let mut frame = Vec::with_capacity(self.body.len() + 16);
    frame.extend_from_slice(&basic::MAGIC);
    frame.push(basic::VERSION);
    frame.push(0);
    encode_varint(&mut frame, self.symbols);
    frame.extend_from_slice(&self.body);

    let crc = crc32(&frame);
    let mut trailer = [0u8; 4];
    LittleEndian::write_u32(&mut trailer, crc);
    frame.extend_from_slice(&trailer);

    if options.compress && frame.len() > MIN_COMPRESS_LEN {
      let packed = lz77::compress(&frame);
      if packed.len() + basic::ENVELOPE.len() < frame.len() {
        let mut wrapped = Vec::with_capacity(packed.len() + basic::ENVELOPE.len());
        wrapped.extend_from_slice(&basic::ENVELOPE);
        wrapped.extend_from_slice(&packed);
        return Ok(wrapped);
      }
    }
    Ok(frame)
  }

  // ----------------------------------------------------------------------
  // Raw token plumbing, shared with the batch and stream encoders

  pub(crate) fn emit_token(&mut self, t: u8) {
    self.body.push(t);
    self.symbols += 1;
  }

  pub(crate) fn emit_delta(&mut self, d: i32) {
    delta::write_delta(&mut self.body, d);
    self.symbols += 1;
  }

  pub(crate) fn put_u8(&mut self, b: u8) {
    self.body.push(b);
  }

  pub(crate) fn put_varint(&mut self, v: u32) {
    encode_varint(&mut self.body, v);
  }

  pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
    self.body.extend_from_slice(bytes);
  }

  pub(crate) fn mem_tracker(&self) -> Option<MemTrackerPtr> {
    self.mem.clone()
  }

  /// Drains the accumulated body bytes (streaming pipeline support).
  pub(crate) fn take_body(&mut self) -> Vec<u8> {
    mem::replace(&mut self.body, Vec::new())
  }

  pub(crate) fn write_int_value(&mut self, value: i32) {
    self.emit_token(token::INT);
    let zz = zigzag_encode(value);
    self.put_varint(zz);
  }

  /// Writes a FLOAT32 token and returns the value the decoder will see.
  pub(crate) fn write_float32_value(&mut self, value: f64) -> f64 {
    let scaled = fixed32(value);
    self.emit_token(token::FLOAT32);
    let mut buf = [0u8; 4];
    LittleEndian::write_i32(&mut buf, scaled);
    self.put_bytes(&buf);
    scaled as f64 / 65536.0
  }

  pub(crate) fn write_double_value(&mut self, value: f64) {
    self.emit_token(token::DOUBLE);
    let mut buf = [0u8; 8];
    LittleEndian::write_f64(&mut buf, value);
    self.put_bytes(&buf);
  }

  pub(crate) fn write_bool_value(&mut self, value: bool) {
    self.emit_token(if value { token::BOOL_TRUE } else { token::BOOL_FALSE });
  }

  pub(crate) fn write_null_value(&mut self) {
    self.emit_token(token::NULL);
  }

  pub(crate) fn write_string_value(&mut self, value: &str) {
    if let Some(mac) = basic::parse_mac(value) {
      match self.macs.lookup(&mac) {
        Some(index) => self.emit_token(token::MAC_BASE + index),
        None => {
          self.macs.insert(&mac);
          self.emit_token(token::NEW_MAC);
          self.put_bytes(&mac);
        }
      }
    } else {
      let bytes = value.as_bytes();
      match self.strings.lookup(bytes) {
        Some(index) => self.emit_token(token::STRING_BASE + index),
        None => {
          self.strings.insert(bytes);
          self.emit_token(token::NEW_STRING);
          self.put_varint(bytes.len() as u32);
          self.put_bytes(bytes);
        }
      }
    }
  }

  /// Emits a field-name token and returns the field's dictionary slot. A
  /// fresh install resets the slot's delta memory.
  pub(crate) fn write_field_name(&mut self, name: &str) -> u8 {
    let bytes = name.as_bytes();
    match self.fields.lookup(bytes) {
      Some(index) => {
        self.emit_token(token::FIELD_BASE + index);
        index
      },
      None => {
        self.emit_token(token::NEW_FIELD);
        self.put_varint(bytes.len() as u32);
        self.put_bytes(bytes);
        let index = self.fields.insert(bytes);
        self.deltas.reset_slot(index);
        index
      }
    }
  }

  // ----------------------------------------------------------------------
  // Nesting bookkeeping

  fn check_value(&self) -> Result<()> {
    if let Some(&Scope::Object { awaiting, .. }) = self.scopes.last() {
      if !awaiting {
        return Err(PackrError::InvalidNesting("record value requires a preceding field"));
      }
    }
    Ok(())
  }

  // Inline deltas apply only when the innermost open container is the
  // record that activated the field.
  fn delta_slot(&self) -> Option<u8> {
    match self.scopes.last() {
      Some(&Scope::Object { field: Some(slot), awaiting: true }) => Some(slot),
      _ => None
    }
  }

  fn value_done(&mut self) {
    if let Some(&mut Scope::Object { ref mut awaiting, .. }) = self.scopes.last_mut() {
      *awaiting = false;
    }
  }
}

// ----------------------------------------------------------------------
// Fixed-point helpers

/// Round to nearest, ties to even.
pub(crate) fn round_half_even(v: f64) -> f64 {
  let floor = v.floor();
  let diff = v - floor;
  if diff > 0.5 {
    floor + 1.0
  } else if diff < 0.5 {
    floor
  } else if (floor as i64) % 2 == 0 {
    floor
  } else {
    floor + 1.0
  }
}

/// Fixed-point scale by 65536, clamped to the i32 range.
pub(crate) fn fixed32(v: f64) -> i32 {
  let scaled = round_half_even(v * 65536.0);
  if scaled >= i32::max_value() as f64 {
    i32::max_value()
  } else if scaled <= i32::min_value() as f64 {
    i32::min_value()
  } else {
    scaled as i32
  }
}

/// Fixed-point scale by 256, clamped to the i16 range.
fn fixed16(v: f64) -> i16 {
  let scaled = round_half_even(v * 256.0);
  if scaled >= i16::max_value() as f64 {
    i16::max_value()
  } else if scaled <= i16::min_value() as f64 {
    i16::min_value()
  } else {
    scaled as i16
  }
}

/// Encodes a document into one PACKR frame.
pub fn encode(value: &Value, options: &EncodeOptions) -> Result<Vec<u8>> {
  let mut encoder = Encoder::new();
  encoder.encode_document(value)?;
  encoder.finish(options)
}

#[cfg(test)]
mod tests {
  use super::*;

  const NO_COMPRESS: EncodeOptions = EncodeOptions { compress: false };

  fn body_of(frame: &[u8]) -> &[u8] {
    // magic(4) + version + flags, then a varint symbol count.
    let mut pos = 6;
    while frame[pos] & 0x80 != 0 {
      pos += 1;
    }
    &frame[pos + 1..frame.len() - 4]
  }

  #[test]
  fn test_empty_object() {
    let mut encoder = Encoder::new();
    encoder.encode_document(&Value::Object(vec![])).unwrap();
    assert_eq!(encoder.symbol_count(), 2);
    let frame = encoder.finish(&NO_COMPRESS).unwrap();
    assert_eq!(&frame[..4], b"PKR1");
    assert_eq!(frame[4], 0x01);
    assert_eq!(frame[5], 0x00);
    assert_eq!(frame[6], 2); // symbol count
    assert_eq!(body_of(&frame), &[token::OBJECT_START, token::OBJECT_END]);
  }

  #[test]
  fn test_small_record_and_field_reuse() {
    let mut encoder = Encoder::new();
    encoder
      .encode_document(&Value::object(vec![
        ("id", Value::Int(42)),
        ("ok", Value::Bool(true)),
      ]))
      .unwrap();
    encoder
      .encode_document(&Value::object(vec![("id", Value::Int(43))]))
      .unwrap();
    let frame = encoder.finish(&NO_COMPRESS).unwrap();
    let expected = [
      token::OBJECT_START,
      token::NEW_FIELD, 2, b'i', b'd',
      token::INT, 84, // zigzag(42)
      token::NEW_FIELD, 2, b'o', b'k',
      token::BOOL_TRUE,
      token::OBJECT_END,
      // second record: field reference + delta of +1
      token::OBJECT_START,
      0x00,
      token::DELTA_ONE,
      token::OBJECT_END,
    ];
    assert_eq!(body_of(&frame), &expected[..]);
  }

  #[test]
  fn test_string_dictionary_reference() {
    let mut encoder = Encoder::new();
    encoder.encode_string("adsb").unwrap();
    encoder.encode_string("adsb").unwrap();
    let frame = encoder.finish(&NO_COMPRESS).unwrap();
    let expected = [
      token::NEW_STRING, 4, b'a', b'd', b's', b'b',
      token::STRING_BASE, // index 0
    ];
    assert_eq!(body_of(&frame), &expected[..]);
  }

  #[test]
  fn test_mac_routing() {
    let mut encoder = Encoder::new();
    encoder.encode_string("aa:bb:cc:dd:ee:ff").unwrap();
    encoder.encode_string("aa:bb:cc:dd:ee:ff").unwrap();
    // Non-canonical spelling stays in the string dictionary.
    encoder.encode_string("AA:BB:CC:DD:EE:FF").unwrap();
    let frame = encoder.finish(&NO_COMPRESS).unwrap();
    let body = body_of(&frame);
    assert_eq!(body[0], token::NEW_MAC);
    assert_eq!(&body[1..7], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    assert_eq!(body[7], token::MAC_BASE);
    assert_eq!(body[8], token::NEW_STRING);
  }

  #[test]
  fn test_delta_ladder_between_records() {
    let mut encoder = Encoder::new();
    for v in [100, 100, 101, 95, 150, 1000].iter() {
      encoder
        .encode_document(&Value::object(vec![("t", Value::Int(*v))]))
        .unwrap();
    }
    let frame = encoder.finish(&NO_COMPRESS).unwrap();
    let body = body_of(&frame);
    // First record installs the field and the base value.
    assert_eq!(&body[..7], &[
      token::OBJECT_START,
      token::NEW_FIELD, 1, b't',
      token::INT, 0xC8, 0x01,
    ]);
    let rest = &body[8..];
    assert_eq!(rest[..3], [token::OBJECT_START, 0x00, token::DELTA_ZERO]);
    assert_eq!(rest[4..7], [token::OBJECT_START, 0x00, token::DELTA_ONE]);
    assert_eq!(rest[8..11], [token::OBJECT_START, 0x00, 0xC3 + 2]); // -6
    assert_eq!(rest[12..16], [token::OBJECT_START, 0x00, token::DELTA_MEDIUM, 55 + 64]);
    assert_eq!(rest[17..20], [token::OBJECT_START, 0x00, token::DELTA_LARGE]);
  }

  #[test]
  fn test_no_delta_across_container_boundary() {
    // Array elements under a field are not delta-coded against the field.
    let mut encoder = Encoder::new();
    encoder
      .encode_document(&Value::object(vec![(
        "xs",
        Value::Array(vec![Value::Int(5), Value::Int(6), Value::Binary(vec![1])]),
      )]))
      .unwrap();
    let frame = encoder.finish(&NO_COMPRESS).unwrap();
    let body = body_of(&frame);
    let ints: Vec<u8> = body.iter().cloned().filter(|&b| b == token::INT).collect();
    assert_eq!(ints.len(), 2);
  }

  #[test]
  fn test_nesting_errors() {
    let mut encoder = Encoder::new();
    assert!(encoder.encode_object_end().is_err());
    assert!(encoder.encode_array_end().is_err());
    assert!(encoder.encode_field("x").is_err());

    let mut encoder = Encoder::new();
    encoder.encode_object_start().unwrap();
    // A record value without a preceding field is rejected.
    assert!(encoder.encode_int(1).is_err());
    encoder.encode_field("a").unwrap();
    assert!(encoder.encode_field("b").is_err());
    encoder.encode_int(1).unwrap();
    encoder.encode_object_end().unwrap();

    let mut encoder = Encoder::new();
    encoder.encode_object_start().unwrap();
    assert!(encoder.finish(&NO_COMPRESS).is_err());
  }

  #[test]
  fn test_deterministic_encoding() {
    let doc = Value::object(vec![
      ("name", Value::Str("node-7".to_owned())),
      ("up", Value::Bool(true)),
      ("load", Value::Double(0.25)),
    ]);
    let a = encode(&doc, &EncodeOptions::default()).unwrap();
    let b = encode(&doc, &EncodeOptions::default()).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn test_compression_envelope() {
    let rows: Vec<Value> = (0..64)
      .map(|i| {
        Value::object(vec![(
          "msg",
          Value::Str(format!("device {} reports nominal operation", i % 4)),
        )])
      })
      .collect();
    let doc = Value::Array(rows);
    let plain = encode(&doc, &NO_COMPRESS).unwrap();
    let packed = encode(&doc, &EncodeOptions::default()).unwrap();
    assert_eq!(&packed[..2], &basic::ENVELOPE);
    assert!(packed.len() < plain.len());
  }

  #[test]
  fn test_round_half_even() {
    assert_eq!(round_half_even(0.5), 0.0);
    assert_eq!(round_half_even(1.5), 2.0);
    assert_eq!(round_half_even(2.5), 2.0);
    assert_eq!(round_half_even(-0.5), 0.0);
    assert_eq!(round_half_even(-1.5), -2.0);
    assert_eq!(round_half_even(1.2), 1.0);
    assert_eq!(round_half_even(1.8), 2.0);
  }

  #[test]
  fn test_fixed_point_clamps() {
    assert_eq!(fixed32(1.0), 65536);
    assert_eq!(fixed32(-0.5), -32768);
    assert_eq!(fixed32(1.0e9), i32::max_value());
    assert_eq!(fixed32(-1.0e9), i32::min_value());
    assert_eq!(fixed16(1.0), 256);
    assert_eq!(fixed16(1000.0), i16::max_value());
  }
}
