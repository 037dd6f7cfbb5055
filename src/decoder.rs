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

//! The PACKR decoder.
//!
//! `Decoder::new` strips the optional LZ77 envelope, validates magic,
//! version and CRC, and rejects the frame wholesale on any mismatch — no
//! events are produced and no dictionary state is touched for a bad frame.
//! Token dispatch then mirrors the encoder exactly: the same dictionary
//! reference/install rules and the same delta memory updates, driven purely
//! by the body bytes.

use std::borrow::Cow;
use std::cmp;

use byteorder::{ByteOrder, LittleEndian};

use basic::{self, token, COL_CONSTANT, COL_DELTA, COL_HAS_NULLS, COL_RLE};
use data_type::Value;
use delta::{DeltaMemory, LastKind};
use dict::Dictionary;
use encoder::MAX_DEPTH;
use encodings::batch::MAX_BATCH_COLS;
use errors::{PackrError, Result};
use lz77;
use util::bit_util::{decode_varint, zigzag_decode, BitReader};
use util::crc::crc32;

/// Parsed frame header. The symbol count is advisory: streamed frames
/// declare zero.
pub struct FrameHeader {
  pub version: u8,
  pub flags: u8,
  pub symbol_count: u32
}

/// Decodes the single document of a frame.
pub fn decode(data: &[u8]) -> Result<Value> {
  let mut decoder = Decoder::new(data)?;
  decoder.decode_document()
}

/// Stateful frame reader. A frame body may hold several documents;
/// `decode_document` may be called until `has_more` turns false.
pub struct Decoder<'a> {
  data: Cow<'a, [u8]>,
  pos: usize,
  body_end: usize,
  header: FrameHeader,
  fields: Dictionary,
  strings: Dictionary,
  macs: Dictionary,
  deltas: DeltaMemory
}

impl<'a> Decoder<'a> {
  /// Validates the frame and positions the reader at the first body token.
  pub fn new(input: &'a [u8]) -> Result<Decoder<'a>> {
    let data: Cow<'a, [u8]> = if input.len() >= 2
        && input[0] == basic::ENVELOPE[0]
        && input[1] == basic::ENVELOPE[1] {
      Cow::Owned(lz77::decompress(&input[2..])?)
    } else {
      Cow::Borrowed(input)
    };

    let (flags, symbol_count, body_start, crc_at) = {
      let bytes: &[u8] = &data;
      // magic + version + flags + at least one varint byte + CRC trailer
      if bytes.len() < 11 {
        return Err(PackrError::TruncatedInput("frame header"));
      }
      if bytes[..4] != basic::MAGIC {
        return Err(PackrError::InvalidMagic);
      }
      if bytes[4] != basic::VERSION {
        return Err(PackrError::VersionMismatch(bytes[4]));
      }
      let flags = bytes[5];

      let crc_at = bytes.len() - 4;
      let stored = LittleEndian::read_u32(&bytes[crc_at..]);
      let actual = crc32(&bytes[..crc_at]);
      if stored != actual {
        return Err(PackrError::CrcMismatch(stored, actual));
      }

      let (symbol_count, varint_len) = decode_varint(&bytes[6..crc_at])?;
      (flags, symbol_count, 6 + varint_len, crc_at)
    };

    Ok(Decoder {
      data: data,
      pos: body_start,
      body_end: crc_at,
      header: FrameHeader {
        version: basic::VERSION,
        flags: flags,
        symbol_count: symbol_count
      },
      fields: Dictionary::new(),
      strings: Dictionary::new(),
      macs: Dictionary::new(),
      deltas: DeltaMemory::new()
    })
  }

  pub fn header(&self) -> &FrameHeader {
    &self.header
  }

  /// True while body tokens remain.
  pub fn has_more(&self) -> bool {
    self.pos < self.body_end
  }

  /// Decodes the next document from the body.
  pub fn decode_document(&mut self) -> Result<Value> {
    let t = self.next_token()?;
    self.decode_value(t, 0)
  }

  // ----------------------------------------------------------------------
  // Byte-level reads (bounded by the body; the CRC trailer is never data)

  fn buf(&self) -> &[u8] {
    &self.data
  }

  fn next_token(&mut self) -> Result<u8> {
    if self.pos >= self.body_end {
      return Err(PackrError::TruncatedInput("token"));
    }
    let t = self.buf()[self.pos];
    self.pos += 1;
    Ok(t)
  }

  fn peek_token(&self) -> Result<u8> {
    if self.pos >= self.body_end {
      return Err(PackrError::TruncatedInput("token"));
    }
    Ok(self.buf()[self.pos])
  }

  fn read_u8(&mut self, what: &'static str) -> Result<u8> {
    if self.pos >= self.body_end {
      return Err(PackrError::TruncatedInput(what));
    }
    let b = self.buf()[self.pos];
    self.pos += 1;
    Ok(b)
  }

  fn read_slice(&mut self, n: usize, what: &'static str) -> Result<&[u8]> {
    if self.pos + n > self.body_end {
      return Err(PackrError::TruncatedInput(what));
    }
    let start = self.pos;
    self.pos += n;
    Ok(&self.buf()[start..start + n])
  }

  fn read_varint(&mut self) -> Result<u32> {
    let (value, used) = {
      let bytes = self.buf();
      decode_varint(&bytes[self.pos..self.body_end])?
    };
    self.pos += used;
    Ok(value)
  }

  fn read_int(&mut self) -> Result<i32> {
    Ok(zigzag_decode(self.read_varint()?))
  }

  fn read_i32_le(&mut self) -> Result<i32> {
    let slice = self.read_slice(4, "fixed32 payload")?;
    Ok(LittleEndian::read_i32(slice))
  }

  // ----------------------------------------------------------------------
  // Value dispatch

  fn decode_value(&mut self, t: u8, depth: usize) -> Result<Value> {
    if depth >= MAX_DEPTH {
      return Err(PackrError::InvalidNesting("nesting too deep"));
    }
    match t {
      token::OBJECT_START => self.decode_object(depth),
      token::ARRAY_START => {
        let count = self.read_varint()?;
        let mut items = Vec::with_capacity(cmp::min(count as usize, 4096));
        for _ in 0..count {
          let t = self.next_token()?;
          items.push(self.decode_value(t, depth + 1)?);
        }
        let end = self.next_token()?;
        if end != token::ARRAY_END {
          return Err(PackrError::InvalidToken(end));
        }
        Ok(Value::Array(items))
      },
      token::ARRAY_STREAM => self.decode_array_stream(depth),
      token::ULTRA_BATCH => Ok(Value::Array(self.decode_batch()?)),
      _ => self.decode_scalar(t)
    }
  }

  fn decode_scalar(&mut self, t: u8) -> Result<Value> {
    match t {
      token::INT => Ok(Value::Int(self.read_int()?)),
      token::FLOAT16 => {
        let slice = self.read_slice(2, "fixed16 payload")?;
        let scaled = LittleEndian::read_i16(slice);
        Ok(Value::Double(scaled as f64 / 256.0))
      },
      token::FLOAT32 => {
        let scaled = self.read_i32_le()?;
        Ok(Value::Double(scaled as f64 / 65536.0))
      },
      token::DOUBLE => {
        let slice = self.read_slice(8, "double payload")?;
        Ok(Value::Double(LittleEndian::read_f64(slice)))
      },
      token::BOOL_TRUE => Ok(Value::Bool(true)),
      token::BOOL_FALSE => Ok(Value::Bool(false)),
      token::NULL => Ok(Value::Null),
      token::BINARY => {
        let len = self.read_varint()? as usize;
        let bytes = self.read_slice(len, "binary payload")?.to_vec();
        Ok(Value::Binary(bytes))
      },
      token::NEW_STRING => {
        let len = self.read_varint()? as usize;
        let bytes = self.read_slice(len, "string payload")?.to_vec();
        self.strings.insert(&bytes);
        Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
      },
      token::NEW_MAC => {
        let bytes = self.read_slice(6, "mac payload")?.to_vec();
        self.macs.insert(&bytes);
        Ok(Value::Str(basic::format_mac(&bytes)))
      },
      t if t >= token::STRING_BASE && t < token::MAC_BASE => {
        let index = t - token::STRING_BASE;
        let text = match self.strings.get(index) {
          Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
          None => return Err(PackrError::InvalidToken(t))
        };
        self.strings.bump(index);
        Ok(Value::Str(text))
      },
      t if t >= token::MAC_BASE && t < token::INT => {
        let index = t - token::MAC_BASE;
        let text = match self.macs.get(index) {
          Some(bytes) => basic::format_mac(bytes),
          None => return Err(PackrError::InvalidToken(t))
        };
        self.macs.bump(index);
        Ok(Value::Str(text))
      },
      _ => Err(PackrError::InvalidToken(t))
    }
  }

  // ----------------------------------------------------------------------
  // Records

  fn decode_object(&mut self, depth: usize) -> Result<Value> {
    let mut pairs = Vec::new();
    loop {
      let t = self.next_token()?;
      if t == token::OBJECT_END {
        return Ok(Value::Object(pairs));
      }
      let (name, slot) = self.read_field(t)?;
      let vt = self.next_token()?;
      let value = self.decode_field_value(vt, slot, depth)?;
      pairs.push((name, value));
    }
  }

  fn read_field(&mut self, t: u8) -> Result<(String, u8)> {
    if t < token::STRING_BASE {
      let name = match self.fields.get(t) {
        Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        None => return Err(PackrError::InvalidToken(t))
      };
      self.fields.bump(t);
      Ok((name, t))
    } else if t == token::NEW_FIELD {
      let len = self.read_varint()? as usize;
      let bytes = self.read_slice(len, "field name")?.to_vec();
      let slot = self.fields.insert(&bytes);
      self.deltas.reset_slot(slot);
      Ok((String::from_utf8_lossy(&bytes).into_owned(), slot))
    } else {
      Err(PackrError::InvalidToken(t))
    }
  }

  fn decode_field_value(&mut self, t: u8, slot: u8, depth: usize) -> Result<Value> {
    match t {
      token::INT => {
        let v = self.read_int()?;
        self.deltas.record_int(slot, v);
        Ok(Value::Int(v))
      },
      token::DOUBLE => {
        let slice = self.read_slice(8, "double payload")?;
        let v = LittleEndian::read_f64(slice);
        self.deltas.record_float(slot, v);
        Ok(Value::Double(v))
      },
      token::FLOAT32 => {
        let scaled = self.read_i32_le()?;
        let v = scaled as f64 / 65536.0;
        self.deltas.record_float(slot, v);
        Ok(Value::Double(v))
      },
      t if is_delta_token(t) => {
        let d = self.read_delta(t)?;
        match self.deltas.kind(slot) {
          LastKind::Int => {
            let v = self.deltas.int_value(slot).wrapping_add(d);
            self.deltas.record_int(slot, v);
            Ok(Value::Int(v))
          },
          LastKind::Float => {
            let v = self.deltas.float_value(slot) + d as f64 / 65536.0;
            self.deltas.record_float(slot, v);
            Ok(Value::Double(v))
          },
          LastKind::None => Err(PackrError::InvalidDelta(slot))
        }
      },
      _ => self.decode_value(t, depth + 1)
    }
  }

  fn read_delta(&mut self, t: u8) -> Result<i32> {
    match t {
      token::DELTA_ZERO => Ok(0),
      token::DELTA_ONE => Ok(1),
      token::DELTA_NEG_ONE => Ok(-1),
      token::DELTA_MEDIUM => Ok(self.read_u8("medium delta")? as i32 - 64),
      token::DELTA_LARGE => Ok(zigzag_decode(self.read_varint()?)),
      _ => Ok((t - token::DELTA_BASE) as i32 - 8)
    }
  }

  // ----------------------------------------------------------------------
  // Array streams and batches

  fn decode_array_stream(&mut self, depth: usize) -> Result<Value> {
    let mut items = Vec::new();
    loop {
      let t = self.next_token()?;
      match t {
        token::ARRAY_END => return Ok(Value::Array(items)),
        token::BATCH_PARTIAL => {
          let rows = self.decode_batch()?;
          items.extend(rows);
        },
        _ => items.push(self.decode_value(t, depth + 1)?)
      }
    }
  }

  fn decode_batch(&mut self) -> Result<Vec<Value>> {
    let rows = self.read_varint()? as usize;
    let cols = self.read_varint()? as usize;
    if cols > MAX_BATCH_COLS {
      return Err(PackrError::InvalidToken(token::ULTRA_BATCH));
    }

    let mut headers: Vec<(String, u8)> = Vec::with_capacity(cols);
    for _ in 0..cols {
      let t = self.next_token()?;
      let (name, _slot) = self.read_field(t)?;
      let flags = self.read_u8("column flags")?;
      headers.push((name, flags));
    }

    let mut columns: Vec<(Option<Vec<bool>>, Vec<Value>)> = Vec::with_capacity(cols);
    for i in 0..cols {
      let flags = headers[i].1;
      let validity = if flags & COL_HAS_NULLS != 0 {
        let nbytes = (rows + 7) / 8;
        let bytes = self.read_slice(nbytes, "validity bitmap")?.to_vec();
        let mut bits = Vec::with_capacity(rows);
        for r in 0..rows {
          bits.push(bytes[r / 8] >> (r % 8) & 1 == 1);
        }
        Some(bits)
      } else {
        None
      };
      let present = match validity {
        Some(ref bits) => bits.iter().filter(|&&b| b).count(),
        None => rows
      };
      let values = self.decode_column_body(flags, present)?;
      columns.push((validity, values));
    }

    let mut out = Vec::with_capacity(cmp::min(rows, 4096));
    let mut cursors = vec![0usize; cols];
    for r in 0..rows {
      let mut pairs = Vec::with_capacity(cols);
      for c in 0..cols {
        let present = match columns[c].0 {
          Some(ref bits) => bits[r],
          None => true
        };
        if present {
          let value = columns[c].1[cursors[c]].clone();
          cursors[c] += 1;
          pairs.push((headers[c].0.clone(), value));
        }
      }
      out.push(Value::Object(pairs));
    }
    Ok(out)
  }

  fn decode_column_body(&mut self, flags: u8, n: usize) -> Result<Vec<Value>> {
    if n == 0 {
      return Ok(Vec::new());
    }
    if self.peek_token()? == token::MFV_COLUMN {
      self.next_token()?;
      return self.decode_mfv(n);
    }
    if flags & COL_CONSTANT != 0 {
      let t = self.next_token()?;
      let value = self.decode_scalar(t)?;
      return Ok(vec![value; n]);
    }
    if flags & COL_DELTA != 0 {
      return self.decode_numeric_column(n);
    }
    if flags & COL_RLE != 0 {
      return self.decode_rle_column(n);
    }
    Err(PackrError::InvalidToken(flags))
  }

  fn decode_mfv(&mut self, n: usize) -> Result<Vec<Value>> {
    let declared = self.read_varint()? as usize;
    if declared != n {
      return Err(PackrError::InvalidToken(token::MFV_COLUMN));
    }
    let t = self.next_token()?;
    let mode = self.decode_scalar(t)?;
    let nbytes = (n + 7) / 8;
    let bitmap = self.read_slice(nbytes, "mfv bitmap")?.to_vec();
    let mut values = Vec::with_capacity(n);
    for i in 0..n {
      if bitmap[i / 8] >> (i % 8) & 1 == 1 {
        let t = self.next_token()?;
        values.push(self.decode_scalar(t)?);
      } else {
        values.push(mode.clone());
      }
    }
    Ok(values)
  }

  fn decode_numeric_column(&mut self, n: usize) -> Result<Vec<Value>> {
    let t = self.next_token()?;
    match t {
      token::INT => {
        let base = self.read_int()?;
        let mut values = Vec::with_capacity(n);
        values.push(Value::Int(base));
        if n > 1 {
          let deltas = self.read_delta_stream(n - 1)?;
          let mut prev = base;
          for d in deltas {
            prev = prev.wrapping_add(d);
            values.push(Value::Int(prev));
          }
        }
        Ok(values)
      },
      token::FLOAT32 => {
        let scaled = self.read_i32_le()?;
        let mut prev = scaled as f64 / 65536.0;
        let mut values = Vec::with_capacity(n);
        values.push(Value::Double(prev));
        if n > 1 {
          let deltas = self.read_delta_stream(n - 1)?;
          for d in deltas {
            prev += d as f64 / 65536.0;
            values.push(Value::Double(prev));
          }
        }
        Ok(values)
      },
      _ => Err(PackrError::InvalidToken(t))
    }
  }

  fn read_delta_stream(&mut self, count: usize) -> Result<Vec<i32>> {
    match self.peek_token()? {
      token::BITPACK_COL => {
        self.next_token()?;
        let declared = self.read_varint()? as usize;
        if declared < count {
          return Err(PackrError::TruncatedInput("bitpack column"));
        }
        let nbytes = (declared + 1) / 2;
        let bytes = self.read_slice(nbytes, "bitpack column")?.to_vec();
        let mut deltas = Vec::with_capacity(count);
        for i in 0..count {
          let byte = bytes[i / 2];
          let nib = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
          deltas.push(nib as i32 - 8);
        }
        Ok(deltas)
      },
      token::RICE_COLUMN => {
        self.next_token()?;
        let declared = self.read_varint()? as usize;
        if declared < count {
          return Err(PackrError::TruncatedInput("rice column"));
        }
        let k = self.read_u8("rice parameter")?;
        let mut deltas = Vec::with_capacity(declared);
        let consumed = {
          let bytes = self.buf();
          let mut reader = BitReader::new(&bytes[self.pos..self.body_end]);
          for _ in 0..declared {
            let mut q: u32 = 0;
            while reader.read_bit()? == 0 {
              q += 1;
            }
            let r = reader.read_value(k)?;
            deltas.push(zigzag_decode((q << k) | r));
          }
          reader.bytes_consumed()
        };
        self.pos += consumed;
        deltas.truncate(count);
        Ok(deltas)
      },
      _ => {
        let mut deltas = Vec::with_capacity(count);
        while deltas.len() < count {
          let t = self.next_token()?;
          if t == token::RLE_REPEAT {
            let run = self.read_varint()? as usize;
            if deltas.len() + run > count {
              return Err(PackrError::InvalidToken(token::RLE_REPEAT));
            }
            for _ in 0..run {
              deltas.push(0);
            }
          } else if is_delta_token(t) {
            deltas.push(self.read_delta(t)?);
          } else {
            return Err(PackrError::InvalidToken(t));
          }
        }
        Ok(deltas)
      }
    }
  }

  fn decode_rle_column(&mut self, n: usize) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(n);
    while values.len() < n {
      let t = self.next_token()?;
      let value = self.decode_scalar(t)?;
      let mut run = 1;
      if values.len() + 1 < n && self.peek_token()? == token::RLE_REPEAT {
        self.next_token()?;
        run += self.read_varint()? as usize;
      }
      if values.len() + run > n {
        return Err(PackrError::InvalidToken(token::RLE_REPEAT));
      }
      for _ in 0..run {
        values.push(value.clone());
      }
    }
    Ok(values)
  }
}

fn is_delta_token(t: u8) -> bool {
  (t >= token::DELTA_BASE && t <= token::DELTA_LARGE)
    || t == token::DELTA_ZERO
    || t == token::DELTA_ONE
    || t == token::DELTA_NEG_ONE
    || t == token::DELTA_MEDIUM
}

#[cfg(test)]
mod tests {
  use super::*;
  use encoder::{encode, EncodeOptions, Encoder};
  use util::test_common::telemetry_records;

  const NO_COMPRESS: EncodeOptions = EncodeOptions { compress: false };

  fn round_trip(doc: &Value) {
    for options in [NO_COMPRESS, EncodeOptions::default()].iter() {
      let frame = encode(doc, options).unwrap();
      let decoded = decode(&frame).unwrap();
      assert_eq!(&decoded, doc);
    }
  }

  fn make_frame(body: &[u8], symbols: u32) -> Vec<u8> {
    use util::bit_util::encode_varint;
    use util::crc::crc32;

    let mut frame = Vec::new();
    frame.extend_from_slice(&basic::MAGIC);
    frame.push(basic::VERSION);
    frame.push(0);
    encode_varint(&mut frame, symbols);
    frame.extend_from_slice(body);
    let crc = crc32(&frame);
    let mut trailer = [0u8; 4];
    LittleEndian::write_u32(&mut trailer, crc);
    frame.extend_from_slice(&trailer);
    frame
  }

  #[test]
  fn test_round_trip_scalars() {
    round_trip(&Value::Null);
    round_trip(&Value::Bool(true));
    round_trip(&Value::Bool(false));
    round_trip(&Value::Int(0));
    round_trip(&Value::Int(-1));
    round_trip(&Value::Int(i32::max_value()));
    round_trip(&Value::Int(i32::min_value()));
    round_trip(&Value::Double(0.0));
    round_trip(&Value::Double(-1234.5678));
    round_trip(&Value::Double(1.0e308));
    round_trip(&Value::Str("".to_owned()));
    round_trip(&Value::Str("short".to_owned()));
    round_trip(&Value::Binary(vec![]));
    round_trip(&Value::Binary((0..255).collect()));
  }

  #[test]
  fn test_round_trip_empty_object() {
    round_trip(&Value::Object(vec![]));
  }

  #[test]
  fn test_round_trip_nested_document() {
    let doc = Value::object(vec![
      ("device", Value::Str("ap-3".to_owned())),
      ("mac", Value::Str("a4:cf:12:05:ee:01".to_owned())),
      ("up", Value::Bool(true)),
      ("temp", Value::Double(41.25)),
      (
        "radios",
        Value::Array(vec![
          Value::object(vec![("chan", Value::Int(1)), ("dbm", Value::Int(-40))]),
          Value::object(vec![("chan", Value::Int(11)), ("dbm", Value::Int(-44))]),
        ]),
      ),
      ("notes", Value::Null),
    ]);
    round_trip(&doc);
  }

  #[test]
  fn test_round_trip_mixed_array_fallback() {
    // Mixed element shapes cannot batch: recursive ARRAY_START form.
    let doc = Value::Array(vec![
      Value::Int(1),
      Value::Str("two".to_owned()),
      Value::object(vec![("three", Value::Int(3))]),
      Value::Array(vec![Value::Bool(false)]),
      Value::Null,
    ]);
    round_trip(&doc);
  }

  #[test]
  fn test_round_trip_record_batches() {
    // Small int batch with bitpack.
    round_trip(&Value::Array(
      (100..105).map(|v| Value::object(vec![("t", Value::Int(v))])).collect(),
    ));
    // Constant column.
    round_trip(&Value::Array(
      (0..1000).map(|_| Value::object(vec![("v", Value::Int(7))])).collect(),
    ));
    // Rice column.
    round_trip(&Value::Array(
      (0..40).map(|i| Value::object(vec![("t", Value::Int(i * 40))])).collect(),
    ));
    // String RLE runs plus bools.
    round_trip(&Value::Array(
      (0..50)
        .map(|i| {
          Value::object(vec![
            ("state", Value::Str(if i < 30 { "ok" } else { "down" }.to_owned())),
            ("alive", Value::Bool(i < 45)),
          ])
        })
        .collect(),
    ));
  }

  #[test]
  fn test_round_trip_batch_with_missing_fields() {
    let rows: Vec<Value> = (0..20)
      .map(|i| {
        if i % 3 == 0 {
          Value::object(vec![("a", Value::Int(i))])
        } else {
          Value::object(vec![("a", Value::Int(i)), ("b", Value::Int(i * 2))])
        }
      })
      .collect();
    round_trip(&Value::Array(rows));
  }

  #[test]
  fn test_round_trip_mfv_batch() {
    let rows: Vec<Value> = (0..100)
      .map(|i| {
        let state = if i % 5 == 4 { format!("e{}", i) } else { "ok".to_owned() };
        Value::object(vec![("state", Value::Str(state))])
      })
      .collect();
    round_trip(&Value::Array(rows));
  }

  #[test]
  fn test_round_trip_null_record_falls_back() {
    // An explicit null forces the recursive path and survives exactly.
    let rows = vec![
      Value::object(vec![("a", Value::Int(1)), ("b", Value::Null)]),
      Value::object(vec![("a", Value::Int(2)), ("b", Value::Int(5))]),
    ];
    round_trip(&Value::Array(rows));
  }

  #[test]
  fn test_round_trip_telemetry() {
    let rows = telemetry_records(500);
    round_trip(&Value::Array(rows));
  }

  #[test]
  fn test_float_batch_quantization_bound() {
    // 100k drifting readings stream through partial batches; every decoded
    // value stays within one fixed-point step of the source, with no
    // cumulative drift.
    let n = 100_000;
    let values: Vec<f64> = (0..n).map(|i| (i as f64) * 0.01 - 300.0).collect();
    let doc = Value::Array(
      values.iter().map(|&v| Value::object(vec![("r", Value::Double(v))])).collect(),
    );
    let frame = encode(&doc, &NO_COMPRESS).unwrap();
    let decoded = decode(&frame).unwrap();
    let items = decoded.as_array().unwrap();
    assert_eq!(items.len(), n);
    let step = 1.0 / 65536.0;
    for (i, item) in items.iter().enumerate() {
      match *item.get("r").unwrap() {
        Value::Double(d) => {
          assert!(
            (d - values[i]).abs() <= step,
            "row {}: {} vs {}",
            i, d, values[i]
          );
        },
        ref other => panic!("expected double, got {:?}", other)
      }
    }
  }

  #[test]
  fn test_int_widens_to_float_in_batch() {
    let rows = vec![
      Value::object(vec![("v", Value::Int(1))]),
      Value::object(vec![("v", Value::Double(2.5))]),
      Value::object(vec![("v", Value::Int(4))]),
    ];
    let frame = encode(&Value::Array(rows), &NO_COMPRESS).unwrap();
    let decoded = decode(&frame).unwrap();
    let items = decoded.as_array().unwrap();
    assert_eq!(items[0].get("v"), Some(&Value::Double(1.0)));
    assert_eq!(items[1].get("v"), Some(&Value::Double(2.5)));
    assert_eq!(items[2].get("v"), Some(&Value::Double(4.0)));
  }

  #[test]
  fn test_out_of_range_floats_stay_lossless() {
    // Beyond fixed-point range the analyzer refuses to batch and DOUBLE
    // keeps full precision.
    let rows = vec![
      Value::object(vec![("v", Value::Double(1.0e9))]),
      Value::object(vec![("v", Value::Double(-2.5e12))]),
    ];
    round_trip(&Value::Array(rows));
  }

  #[test]
  fn test_multi_document_frame() {
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

    let mut decoder = Decoder::new(&frame).unwrap();
    assert_eq!(decoder.header().symbol_count, 10);
    let first = decoder.decode_document().unwrap();
    assert_eq!(
      first,
      Value::object(vec![("id", Value::Int(42)), ("ok", Value::Bool(true))])
    );
    assert!(decoder.has_more());
    let second = decoder.decode_document().unwrap();
    assert_eq!(second, Value::object(vec![("id", Value::Int(43))]));
    assert!(!decoder.has_more());
  }

  #[test]
  fn test_delta_wraps_at_i32_boundary() {
    let mut encoder = Encoder::new();
    encoder
      .encode_document(&Value::object(vec![("x", Value::Int(i32::max_value()))]))
      .unwrap();
    encoder
      .encode_document(&Value::object(vec![("x", Value::Int(i32::min_value()))]))
      .unwrap();
    let frame = encoder.finish(&NO_COMPRESS).unwrap();
    let mut decoder = Decoder::new(&frame).unwrap();
    decoder.decode_document().unwrap();
    let second = decoder.decode_document().unwrap();
    assert_eq!(second, Value::object(vec![("x", Value::Int(i32::min_value()))]));
  }

  #[test]
  fn test_dictionary_lockstep_across_eviction() {
    // 65 distinct strings overflow the dictionary; references after the
    // eviction still resolve identically on both sides.
    let mut items: Vec<Value> = (0..65)
      .map(|i| Value::Str(format!("s{}", i)))
      .collect();
    items.push(Value::Str("s1".to_owned()));
    items.push(Value::Str("s64".to_owned()));
    let doc = Value::Array(items);
    round_trip(&doc);
  }

  #[test]
  fn test_invalid_magic() {
    let mut frame = make_frame(&[token::NULL], 1);
    frame[0] = b'Q';
    match Decoder::new(&frame) {
      Err(PackrError::InvalidMagic) => {},
      other => panic!("expected InvalidMagic, got {:?}", other.err())
    }
  }

  #[test]
  fn test_version_mismatch() {
    let mut frame = make_frame(&[token::NULL], 1);
    frame[4] = 0x02;
    // CRC is checked after the version, so fix it up.
    let crc_at = frame.len() - 4;
    let crc = crc32(&frame[..crc_at]);
    LittleEndian::write_u32(&mut frame[crc_at..], crc);
    match Decoder::new(&frame) {
      Err(PackrError::VersionMismatch(2)) => {},
      other => panic!("expected VersionMismatch, got {:?}", other.err())
    }
  }

  #[test]
  fn test_crc_mismatch_rejects_frame() {
    let mut frame = make_frame(&[token::NULL], 1);
    let at = frame.len() - 5;
    frame[at] ^= 0x40;
    match Decoder::new(&frame) {
      Err(PackrError::CrcMismatch(_, _)) => {},
      other => panic!("expected CrcMismatch, got {:?}", other.err())
    }
  }

  #[test]
  fn test_invalid_token() {
    let frame = make_frame(&[0xE0], 1);
    let mut decoder = Decoder::new(&frame).unwrap();
    match decoder.decode_document() {
      Err(PackrError::InvalidToken(0xE0)) => {},
      other => panic!("expected InvalidToken, got {:?}", other.err())
    }
  }

  #[test]
  fn test_truncated_payload() {
    // NEW_STRING declaring 10 bytes with only 2 available.
    let frame = make_frame(&[token::NEW_STRING, 10, b'a', b'b'], 1);
    let mut decoder = Decoder::new(&frame).unwrap();
    match decoder.decode_document() {
      Err(PackrError::TruncatedInput(_)) => {},
      other => panic!("expected TruncatedInput, got {:?}", other.err())
    }
  }

  #[test]
  fn test_delta_without_history_is_invalid() {
    let body = [
      token::OBJECT_START,
      token::NEW_FIELD, 1, b'x',
      token::DELTA_ONE,
      token::OBJECT_END,
    ];
    let frame = make_frame(&body, 4);
    let mut decoder = Decoder::new(&frame).unwrap();
    match decoder.decode_document() {
      Err(PackrError::InvalidDelta(0)) => {},
      other => panic!("expected InvalidDelta, got {:?}", other.err())
    }
  }

  #[test]
  fn test_float_prior_delta_reconstruction() {
    // A delta after a FLOAT32 value applies in fixed-point units.
    let mut body = vec![
      token::OBJECT_START,
      token::NEW_FIELD, 1, b'f',
      token::FLOAT32,
    ];
    let mut scaled = [0u8; 4];
    LittleEndian::write_i32(&mut scaled, 3 * 65536 / 2); // 1.5
    body.extend_from_slice(&scaled);
    body.push(0x00); // field reference
    body.push(token::DELTA_ONE);
    body.push(token::OBJECT_END);
    let frame = make_frame(&body, 6);
    let mut decoder = Decoder::new(&frame).unwrap();
    let doc = decoder.decode_document().unwrap();
    let pairs = doc.as_object().unwrap();
    assert_eq!(pairs[0].1, Value::Double(1.5));
    assert_eq!(pairs[1].1, Value::Double(1.5 + 1.0 / 65536.0));
  }

  #[test]
  fn test_unknown_first_bytes_are_not_a_frame() {
    assert!(decode(&[]).is_err());
    assert!(decode(b"PKR0\x01\x00\x00\x00\x00\x00\x00").is_err());
    assert!(decode(&[0xFE]).is_err());
  }

  #[test]
  fn test_stray_structure_tokens() {
    for &t in [token::OBJECT_END, token::ARRAY_END, token::BATCH_PARTIAL,
               token::RLE_REPEAT, token::BITPACK_COL].iter() {
      let frame = make_frame(&[t, 0], 1);
      let mut decoder = Decoder::new(&frame).unwrap();
      assert!(decoder.decode_document().is_err());
    }
  }
}
