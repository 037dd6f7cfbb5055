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

//! The column analyzer and batch encoder.
//!
//! A homogeneous-ish array of flat records becomes one `ULTRA_BATCH` (or a
//! `BATCH_PARTIAL` inside an array stream): a header declaring rows,
//! columns, per-column field names and strategy flags, then per-column
//! bodies. Numeric columns carry a base value and a delta stream chosen
//! among nibble bit-packing, Rice coding and the per-token ladder; string
//! and bool columns use run-length encoding; any column may instead use the
//! most-frequent-value form when one value dominates. Missing fields are
//! recorded in a validity bitmap and column bodies hold present values
//! only.

use std::cmp;

use basic::{token, ColumnKind, COL_CONSTANT, COL_DELTA, COL_HAS_NULLS, COL_RLE};
use data_type::Value;
use delta::delta_cost;
use encoder::{round_half_even, Encoder};
use errors::Result;
use util::bit_util::{num_required_bits, zigzag_encode, BitWriter};

/// Rows per partial batch in streaming mode.
pub const MAX_BATCH_ROWS: usize = 128;
/// String payload bytes that force a partial-batch flush in streaming mode.
pub const MAX_BATCH_BYTES: usize = 4096;
/// Largest array the buffered document path emits as a single batch.
pub const MAX_DOC_BATCH_ROWS: usize = 2048;
/// Column cap per batch.
pub const MAX_BATCH_COLS: usize = 32;

const MIN_RICE_ITEMS: usize = 10;
const RICE_MAX_DELTA: i64 = 1024;
const MIN_MFV_ROWS: usize = 8;
const MFV_THRESHOLD_PERCENT: usize = 60;

/// Largest float magnitude the fixed-point column path accepts; keeps both
/// scaled values and scaled pairwise deltas inside i32.
pub const FLOAT_RANGE_LIMIT: f64 = 16000.0;

// ----------------------------------------------------------------------
// Batchability

fn value_kind(value: &Value) -> Option<ColumnKind> {
  match *value {
    Value::Int(_) => Some(ColumnKind::INT),
    Value::Double(v) => {
      if v.is_finite() && v.abs() <= FLOAT_RANGE_LIMIT {
        Some(ColumnKind::FLOAT)
      } else {
        None
      }
    },
    Value::Str(_) => Some(ColumnKind::STRING),
    Value::Bool(_) => Some(ColumnKind::BOOL),
    _ => None
  }
}

fn widen(a: ColumnKind, b: ColumnKind) -> Option<ColumnKind> {
  if a == b {
    return Some(a);
  }
  match (a, b) {
    (ColumnKind::INT, ColumnKind::FLOAT) | (ColumnKind::FLOAT, ColumnKind::INT) => {
      Some(ColumnKind::FLOAT)
    },
    _ => None
  }
}

/// True when the record can live in a batch: a flat object of distinct
/// fields whose values are non-null scalars within fixed-point range.
pub fn is_batchable_record(value: &Value) -> bool {
  let pairs = match value.as_object() {
    Some(pairs) => pairs,
    None => return false
  };
  if pairs.len() > MAX_BATCH_COLS {
    return false;
  }
  for (i, &(ref name, ref v)) in pairs.iter().enumerate() {
    if value_kind(v).is_none() {
      return false;
    }
    if pairs[..i].iter().any(|&(ref other, _)| other == name) {
      return false;
    }
  }
  true
}

/// True when the whole array can be encoded as batches: every element is a
/// batchable record, the key union stays within the column cap and no
/// column mixes non-numeric kinds.
pub fn is_batchable_array(items: &[Value]) -> bool {
  if items.is_empty() {
    return false;
  }
  let mut schema: Vec<(&str, ColumnKind)> = Vec::new();
  for item in items.iter() {
    if !is_batchable_record(item) {
      return false;
    }
    for &(ref name, ref v) in item.as_object().unwrap().iter() {
      let kind = value_kind(v).unwrap();
      match schema.iter().position(|&(n, _)| n == name.as_str()) {
        Some(at) => {
          match widen(schema[at].1, kind) {
            Some(merged) => schema[at].1 = merged,
            None => return false
          }
        },
        None => {
          if schema.len() == MAX_BATCH_COLS {
            return false;
          }
          schema.push((name.as_str(), kind));
        }
      }
    }
  }
  true
}

// Incremental schema tracking for the streaming scheduler: a row is
// admitted when its fields merge into the running key union within the
// column cap.
pub(crate) fn schema_admits(schema: &[(String, ColumnKind)], row: &Value) -> bool {
  let pairs = match row.as_object() {
    Some(pairs) => pairs,
    None => return false
  };
  let mut new_keys = 0;
  for &(ref name, ref v) in pairs.iter() {
    let kind = match value_kind(v) {
      Some(kind) => kind,
      None => return false
    };
    match schema.iter().position(|&(ref n, _)| n == name) {
      Some(at) => {
        if widen(schema[at].1, kind).is_none() {
          return false;
        }
      },
      None => new_keys += 1
    }
  }
  schema.len() + new_keys <= MAX_BATCH_COLS
}

pub(crate) fn admit_row(schema: &mut Vec<(String, ColumnKind)>, row: &Value) {
  for &(ref name, ref v) in row.as_object().unwrap().iter() {
    let kind = value_kind(v).unwrap();
    match schema.iter().position(|&(ref n, _)| n == name) {
      Some(at) => {
        let merged = widen(schema[at].1, kind).unwrap();
        schema[at].1 = merged;
      },
      None => schema.push((name.clone(), kind))
    }
  }
}

// ----------------------------------------------------------------------
// Column buffers (encoder-only scratch, released at batch end)

enum ColumnData {
  Ints(Vec<i32>),
  Floats(Vec<f64>),
  Strs(Vec<String>),
  Bools(Vec<bool>)
}

struct Column {
  name: String,
  data: ColumnData,
  validity: Vec<bool>,
  has_nulls: bool
}

impl Column {
  fn scratch_bytes(&self) -> i64 {
    let data = match self.data {
      ColumnData::Ints(ref v) => v.len() * 4,
      ColumnData::Floats(ref v) => v.len() * 8,
      ColumnData::Strs(ref v) => v.iter().map(|s| s.len()).sum(),
      ColumnData::Bools(ref v) => v.len()
    };
    (data + self.validity.len()) as i64
  }

  fn is_constant(&self) -> bool {
    match self.data {
      ColumnData::Ints(ref v) => v.iter().all(|x| *x == v[0]),
      ColumnData::Floats(ref v) => v.iter().all(|x| *x == v[0]),
      ColumnData::Strs(ref v) => v.iter().all(|x| *x == v[0]),
      ColumnData::Bools(ref v) => v.iter().all(|x| *x == v[0])
    }
  }

  fn kind(&self) -> ColumnKind {
    match self.data {
      ColumnData::Ints(_) => ColumnKind::INT,
      ColumnData::Floats(_) => ColumnKind::FLOAT,
      ColumnData::Strs(_) => ColumnKind::STRING,
      ColumnData::Bools(_) => ColumnKind::BOOL
    }
  }
}

fn build_columns(rows: &[Value]) -> Vec<Column> {
  // Schema discovery: union of keys in first-appearance order, INT widened
  // to FLOAT on conflict.
  let mut schema: Vec<(String, ColumnKind)> = Vec::new();
  for row in rows.iter() {
    for &(ref name, ref v) in row.as_object().unwrap().iter() {
      let kind = value_kind(v).unwrap();
      match schema.iter().position(|&(ref n, _)| n == name) {
        Some(at) => {
          let merged = widen(schema[at].1, kind).unwrap();
          schema[at].1 = merged;
        },
        None => schema.push((name.clone(), kind))
      }
    }
  }

  let mut columns = Vec::with_capacity(schema.len());
  for &(ref name, kind) in schema.iter() {
    let mut data = match kind {
      ColumnKind::INT => ColumnData::Ints(Vec::with_capacity(rows.len())),
      ColumnKind::FLOAT => ColumnData::Floats(Vec::with_capacity(rows.len())),
      ColumnKind::STRING => ColumnData::Strs(Vec::with_capacity(rows.len())),
      ColumnKind::BOOL => ColumnData::Bools(Vec::with_capacity(rows.len()))
    };
    let mut validity = Vec::with_capacity(rows.len());
    let mut has_nulls = false;
    for row in rows.iter() {
      match row.get(name) {
        Some(v) => {
          validity.push(true);
          match data {
            ColumnData::Ints(ref mut out) => match *v {
              Value::Int(x) => out.push(x),
              _ => unreachable!()
            },
            ColumnData::Floats(ref mut out) => match *v {
              Value::Int(x) => out.push(x as f64),
              Value::Double(x) => out.push(x),
              _ => unreachable!()
            },
            ColumnData::Strs(ref mut out) => match *v {
              Value::Str(ref s) => out.push(s.clone()),
              _ => unreachable!()
            },
            ColumnData::Bools(ref mut out) => match *v {
              Value::Bool(b) => out.push(b),
              _ => unreachable!()
            }
          }
        },
        None => {
          validity.push(false);
          has_nulls = true;
        }
      }
    }
    columns.push(Column {
      name: name.clone(),
      data: data,
      validity: validity,
      has_nulls: has_nulls
    });
  }
  columns
}

// ----------------------------------------------------------------------
// Emission

/// Encodes `rows` as one batch under `batch_token` (`ULTRA_BATCH` or
/// `BATCH_PARTIAL`). Callers must have checked `is_batchable_array`.
pub fn encode_batch(enc: &mut Encoder, rows: &[Value], batch_token: u8) -> Result<()> {
  let columns = build_columns(rows);
  let scratch: i64 = columns.iter().map(|c| c.scratch_bytes()).sum();
  if let Some(tracker) = enc.mem_tracker() {
    tracker.alloc(scratch);
  }

  enc.emit_token(batch_token);
  enc.put_varint(rows.len() as u32);
  enc.put_varint(columns.len() as u32);

  for col in columns.iter() {
    enc.write_field_name(&col.name);
    let mut flags = if col.is_constant() {
      COL_CONSTANT
    } else {
      match col.kind() {
        ColumnKind::INT | ColumnKind::FLOAT => COL_DELTA,
        ColumnKind::STRING | ColumnKind::BOOL => COL_RLE
      }
    };
    if col.has_nulls {
      flags |= COL_HAS_NULLS;
    }
    enc.put_u8(flags);
  }

  for col in columns.iter() {
    if col.has_nulls {
      write_bitmap(enc, &col.validity, |present| *present);
    }
    write_column_body(enc, col);
  }

  if let Some(tracker) = enc.mem_tracker() {
    tracker.alloc(-scratch);
  }
  Ok(())
}

// LSB-first bitmap, one bit per element.
fn write_bitmap<T, F>(enc: &mut Encoder, items: &[T], bit: F)
    where F: Fn(&T) -> bool {
  for chunk in items.chunks(8) {
    let mut byte = 0u8;
    for (j, item) in chunk.iter().enumerate() {
      if bit(item) {
        byte |= 1 << j;
      }
    }
    enc.put_u8(byte);
  }
}

fn write_column_body(enc: &mut Encoder, col: &Column) {
  match col.data {
    ColumnData::Ints(ref vals) => {
      if col.is_constant() {
        enc.write_int_value(vals[0]);
      } else if !try_mfv(enc, vals, |e, v| e.write_int_value(*v)) {
        encode_int_column(enc, vals);
      }
    },
    ColumnData::Floats(ref vals) => {
      if col.is_constant() {
        enc.write_float32_value(vals[0]);
      } else if !try_mfv(enc, vals, |e, v| {
        e.write_float32_value(*v);
      }) {
        encode_float_column(enc, vals);
      }
    },
    ColumnData::Strs(ref vals) => {
      if col.is_constant() {
        enc.write_string_value(&vals[0]);
      } else if !try_mfv(enc, vals, |e, v| e.write_string_value(v)) {
        encode_rle_strings(enc, vals);
      }
    },
    ColumnData::Bools(ref vals) => {
      if col.is_constant() {
        enc.write_bool_value(vals[0]);
      } else if !try_mfv(enc, vals, |e, v| e.write_bool_value(*v)) {
        encode_rle_bools(enc, vals);
      }
    }
  }
}

// ----------------------------------------------------------------------
// Most-frequent-value

fn mfv_candidate<T: PartialEq + Clone>(vals: &[T]) -> T {
  // Boyer-Moore majority vote; the winner still needs verification.
  let mut candidate = vals[0].clone();
  let mut count = 0usize;
  for v in vals.iter() {
    if count == 0 {
      candidate = v.clone();
      count = 1;
    } else if *v == candidate {
      count += 1;
    } else {
      count -= 1;
    }
  }
  candidate
}

fn try_mfv<T, F>(enc: &mut Encoder, vals: &[T], emit: F) -> bool
    where T: PartialEq + Clone, F: Fn(&mut Encoder, &T) {
  if vals.len() < MIN_MFV_ROWS {
    return false;
  }
  let candidate = mfv_candidate(vals);
  let occurrences = vals.iter().filter(|v| **v == candidate).count();
  if occurrences * 100 < vals.len() * MFV_THRESHOLD_PERCENT {
    return false;
  }

  enc.emit_token(token::MFV_COLUMN);
  enc.put_varint(vals.len() as u32);
  emit(enc, &candidate);
  write_bitmap(enc, vals, |v| *v != candidate);
  for v in vals.iter() {
    if *v != candidate {
      emit(enc, v);
    }
  }
  true
}

// ----------------------------------------------------------------------
// Numeric delta streams

fn encode_int_column(enc: &mut Encoder, vals: &[i32]) {
  enc.write_int_value(vals[0]);
  if vals.len() == 1 {
    return;
  }
  let mut deltas = Vec::with_capacity(vals.len() - 1);
  let mut prev = vals[0];
  for &v in vals[1..].iter() {
    let d = v.wrapping_sub(prev);
    deltas.push(d);
    prev = prev.wrapping_add(d);
  }
  encode_delta_stream(enc, &deltas);
}

fn encode_float_column(enc: &mut Encoder, vals: &[f64]) {
  // The base and every reconstruction step use exactly what the decoder
  // will compute, so quantization error never accumulates.
  let mut prev = enc.write_float32_value(vals[0]);
  if vals.len() == 1 {
    return;
  }
  let mut deltas = Vec::with_capacity(vals.len() - 1);
  for &v in vals[1..].iter() {
    let d = round_half_even((v - prev) * 65536.0) as i32;
    deltas.push(d);
    prev += d as f64 / 65536.0;
  }
  encode_delta_stream(enc, &deltas);
}

fn encode_delta_stream(enc: &mut Encoder, deltas: &[i32]) {
  let all_small = deltas.iter().all(|&d| d >= -8 && d <= 7);
  let mut use_bitpack = all_small;
  if all_small {
    let bitpack_cost = 2 + (deltas.len() + 1) / 2;
    if (fallback_cost(deltas) as f64) < 0.8 * bitpack_cost as f64 {
      use_bitpack = false;
    }
  }

  if use_bitpack {
    enc.emit_token(token::BITPACK_COL);
    enc.put_varint(deltas.len() as u32);
    let mut i = 0;
    while i < deltas.len() {
      let d1 = deltas[i];
      // Odd counts pad the trailing nibble with a zero delta.
      let d2 = if i + 1 < deltas.len() { deltas[i + 1] } else { 0 };
      enc.put_u8((((d1 + 8) as u8) << 4) | ((d2 + 8) as u8 & 0x0F));
      i += 2;
    }
    return;
  }

  if try_rice(enc, deltas) {
    return;
  }

  let mut i = 0;
  while i < deltas.len() {
    if deltas[i] == 0 {
      let mut run = 0;
      while i + run < deltas.len() && deltas[i + run] == 0 {
        run += 1;
      }
      if run >= 4 {
        enc.emit_token(token::RLE_REPEAT);
        enc.put_varint(run as u32);
        i += run;
        continue;
      }
    }
    enc.emit_delta(deltas[i]);
    i += 1;
  }
}

// Wire bytes the per-token fallback would take.
fn fallback_cost(deltas: &[i32]) -> usize {
  let mut cost = 0;
  let mut i = 0;
  while i < deltas.len() {
    if deltas[i] == 0 {
      let mut run = 0;
      while i + run < deltas.len() && deltas[i + run] == 0 {
        run += 1;
      }
      if run >= 4 {
        cost += 2 + if run > 127 { 1 } else { 0 };
        i += run;
        continue;
      }
    }
    cost += delta_cost(deltas[i]);
    i += 1;
  }
  cost
}

fn try_rice(enc: &mut Encoder, deltas: &[i32]) -> bool {
  if deltas.len() < MIN_RICE_ITEMS {
    return false;
  }
  let mut max_abs: i64 = 0;
  for &d in deltas.iter() {
    let a = (d as i64).abs();
    if a > max_abs {
      max_abs = a;
    }
  }
  if max_abs >= RICE_MAX_DELTA {
    return false;
  }

  let bits = num_required_bits(max_abs as u32);
  let k = if bits > 2 { cmp::min(bits - 2, 7) } else { 0 };
  let mask = (1u32 << k) - 1;
  let mut bw = BitWriter::new();
  for &d in deltas.iter() {
    let zz = zigzag_encode(d);
    bw.put_unary(zz >> k);
    bw.put_value(zz & mask, k);
  }
  let bytes = bw.consume();

  if (bytes.len() as f64) < deltas.len() as f64 * 1.5 {
    enc.emit_token(token::RICE_COLUMN);
    enc.put_varint(deltas.len() as u32);
    enc.put_u8(k);
    enc.put_bytes(&bytes);
    true
  } else {
    false
  }
}

// ----------------------------------------------------------------------
// Run-length columns

fn encode_rle_strings(enc: &mut Encoder, vals: &[String]) {
  let mut i = 0;
  while i < vals.len() {
    let mut run = 1;
    while i + run < vals.len() && vals[i + run] == vals[i] {
      run += 1;
    }
    enc.write_string_value(&vals[i]);
    if run > 1 {
      enc.emit_token(token::RLE_REPEAT);
      enc.put_varint((run - 1) as u32);
    }
    i += run;
  }
}

fn encode_rle_bools(enc: &mut Encoder, vals: &[bool]) {
  let mut i = 0;
  while i < vals.len() {
    let mut run = 1;
    while i + run < vals.len() && vals[i + run] == vals[i] {
      run += 1;
    }
    enc.write_bool_value(vals[i]);
    if run > 1 {
      enc.emit_token(token::RLE_REPEAT);
      enc.put_varint((run - 1) as u32);
    }
    i += run;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use encoder::EncodeOptions;

  const NO_COMPRESS: EncodeOptions = EncodeOptions { compress: false };

  fn body_of(frame: &[u8]) -> &[u8] {
    let mut pos = 6;
    while frame[pos] & 0x80 != 0 {
      pos += 1;
    }
    &frame[pos + 1..frame.len() - 4]
  }

  fn encode_rows(rows: Vec<Value>) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.encode_document(&Value::Array(rows)).unwrap();
    let frame = encoder.finish(&NO_COMPRESS).unwrap();
    body_of(&frame).to_vec()
  }

  #[test]
  fn test_batchability() {
    let good = Value::object(vec![("a", Value::Int(1)), ("b", Value::Str("x".to_owned()))]);
    assert!(is_batchable_record(&good));
    assert!(!is_batchable_record(&Value::Int(1)));
    assert!(!is_batchable_record(&Value::object(vec![("a", Value::Null)])));
    assert!(!is_batchable_record(&Value::object(vec![("a", Value::Array(vec![]))])));
    assert!(!is_batchable_record(&Value::object(vec![("a", Value::Double(1.0e9))])));
    // duplicate keys
    assert!(!is_batchable_record(&Value::object(vec![
      ("a", Value::Int(1)),
      ("a", Value::Int(2)),
    ])));

    assert!(!is_batchable_array(&[]));
    // int/float widening is fine, string/int conflict is not
    assert!(is_batchable_array(&[
      Value::object(vec![("v", Value::Int(1))]),
      Value::object(vec![("v", Value::Double(1.5))]),
    ]));
    assert!(!is_batchable_array(&[
      Value::object(vec![("v", Value::Int(1))]),
      Value::object(vec![("v", Value::Str("x".to_owned()))]),
    ]));
  }

  #[test]
  fn test_monotonic_int_column_bitpacks() {
    // [{"t":100}..{"t":104}] from the wire down to the two packed bytes.
    let rows: Vec<Value> = (100..105)
      .map(|v| Value::object(vec![("t", Value::Int(v))]))
      .collect();
    let body = encode_rows(rows);
    let expected = [
      token::ULTRA_BATCH,
      5, // rows
      1, // cols
      token::NEW_FIELD, 1, b't',
      COL_DELTA,
      token::INT, 0xC8, 0x01, // base 100, zigzag varint
      token::BITPACK_COL,
      4,          // delta count
      0x99, 0x99, // four +1 deltas, two per byte
    ];
    assert_eq!(&body[..], &expected[..]);
  }

  #[test]
  fn test_bitpack_odd_count_pads_with_zero() {
    let rows: Vec<Value> = [10, 11, 12, 13].iter()
      .map(|&v| Value::object(vec![("t", Value::Int(v))]))
      .collect();
    // Three +1 deltas: fallback would cost 3 < 0.8 * 4, so force a shape
    // where bitpack wins by using five values -> four deltas... instead
    // check padding via a 6-value column (five deltas, odd).
    let rows6: Vec<Value> = (0..6)
      .map(|v| Value::object(vec![("t", Value::Int(v * 2))]))
      .collect();
    let body = encode_rows(rows6);
    let at = body.iter().position(|&b| b == token::BITPACK_COL).unwrap();
    assert_eq!(body[at + 1], 5);
    // Deltas are all +2: nibble 10. Last byte pads with nibble 8 (zero).
    assert_eq!(&body[at + 2..at + 5], &[0xAA, 0xAA, 0xA8]);
    // Four values take the fallback instead: three single-token deltas.
    let body4 = encode_rows(rows.to_vec());
    assert!(body4.iter().position(|&b| b == token::BITPACK_COL).is_none());
  }

  #[test]
  fn test_constant_column() {
    let rows: Vec<Value> = (0..1000)
      .map(|_| Value::object(vec![("v", Value::Int(7))]))
      .collect();
    let body = encode_rows(rows);
    let expected = [
      token::ULTRA_BATCH,
      0xE8, 0x07, // 1000
      1,
      token::NEW_FIELD, 1, b'v',
      COL_CONSTANT,
      token::INT, 14, // zigzag(7)
    ];
    assert_eq!(&body[..], &expected[..]);
  }

  #[test]
  fn test_constant_float_stays_float() {
    let rows: Vec<Value> = (0..10)
      .map(|_| Value::object(vec![("v", Value::Double(7.0))]))
      .collect();
    let body = encode_rows(rows);
    assert!(body.contains(&token::FLOAT32));
    assert!(!body.contains(&token::INT));
  }

  #[test]
  fn test_rice_column_selected() {
    // Steps of 40: too large for nibbles, small enough for Rice to win.
    let rows: Vec<Value> = (0..40)
      .map(|i| Value::object(vec![("t", Value::Int(i * 40))]))
      .collect();
    let body = encode_rows(rows);
    let at = body.iter().position(|&b| b == token::RICE_COLUMN).unwrap();
    assert_eq!(body[at + 1], 39); // delta count
    // max |delta| = 40 -> 6 bits -> k = 4
    assert_eq!(body[at + 2], 4);
  }

  #[test]
  fn test_zero_run_uses_rle_repeat() {
    // A large spike disqualifies Rice; the flat run collapses to one
    // RLE_REPEAT in the token fallback.
    let mut values = vec![0, 2000];
    for _ in 0..20 {
      values.push(2000);
    }
    values.push(2001);
    let rows: Vec<Value> = values.iter()
      .map(|&v| Value::object(vec![("t", Value::Int(v))]))
      .collect();
    let body = encode_rows(rows);
    let at = body.iter().position(|&b| b == token::RLE_REPEAT).unwrap();
    assert_eq!(body[at + 1], 20); // run of zero deltas
  }

  #[test]
  fn test_mfv_column() {
    let mut rows = Vec::new();
    for i in 0..100 {
      let state = if i % 5 == 4 {
        format!("err{}", i)
      } else {
        "ok".to_owned()
      };
      rows.push(Value::object(vec![("state", Value::Str(state))]));
    }
    let body = encode_rows(rows);
    let at = body.iter().position(|&b| b == token::MFV_COLUMN).unwrap();
    assert_eq!(body[at + 1], 100);
    // Mode value is the first string installed.
    assert_eq!(body[at + 2], token::NEW_STRING);
    assert_eq!(&body[at + 4..at + 6], b"ok");
    // Bitmap: every fifth row is an exception -> 20 set bits.
    let bitmap = &body[at + 6..at + 6 + 13];
    let ones: u32 = bitmap.iter().map(|b| b.count_ones()).sum();
    assert_eq!(ones, 20);
  }

  #[test]
  fn test_validity_bitmap_for_missing_fields() {
    let rows = vec![
      Value::object(vec![("a", Value::Int(1)), ("b", Value::Int(10))]),
      Value::object(vec![("a", Value::Int(2))]),
      Value::object(vec![("a", Value::Int(3)), ("b", Value::Int(12))]),
    ];
    let body = encode_rows(rows);
    // Column header for "b" carries the has-nulls bit.
    let at = body.iter().position(|&b| b == b'b').unwrap();
    assert_eq!(body[at + 1], COL_DELTA | COL_HAS_NULLS);
  }

  #[test]
  fn test_mem_tracker_sees_column_scratch() {
    use std::rc::Rc;
    use util::memory::MemTracker;

    let tracker = Rc::new(MemTracker::new());
    let mut encoder = Encoder::with_mem_tracker(tracker.clone());
    let rows: Vec<Value> = (0..50)
      .map(|i| Value::object(vec![("x", Value::Int(i))]))
      .collect();
    encoder.encode_document(&Value::Array(rows)).unwrap();
    encoder.finish(&NO_COMPRESS).unwrap();
    assert_eq!(tracker.memory_usage(), 0);
    assert!(tracker.max_memory_usage() > 0);
  }
}
