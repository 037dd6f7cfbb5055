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

//! Byte-level LZ77 transform applied over finished frames.
//!
//! Block layout: a format byte (`0x00` stored, `0x02` compressed) and a
//! little-endian u32 original length, then either raw bytes or a stream of
//! LZ4-style commands. Each command packs the literal length in the high
//! nibble and `match length - 3` in the low nibble; nibble value 15 extends
//! with `0xFF`-chained bytes. Literals follow the control byte, then the
//! match extension and a two-byte little-endian back-offset. Offset zero is
//! the literal-only form used by the streaming flush; a command may also
//! simply end the input after its literals.

use std::cmp;

use byteorder::{ByteOrder, LittleEndian};

use errors::{PackrError, Result};

pub const FORMAT_RAW: u8 = 0x00;
pub const FORMAT_COMPRESSED: u8 = 0x02;

/// Original-length sentinel for streams whose size is unknown up front.
pub const LEN_UNKNOWN: u32 = 0xFFFFFFFF;

const HASH_SIZE: usize = 4096;
const HASH_MASK: u32 = 0xFFF;
const WINDOW_SIZE: usize = 8192;
const MAX_MATCH: usize = 258;
const CHAIN_LIMIT: u32 = 32;
const GOOD_MATCH: usize = 32;

const ENTROPY_SAMPLE: usize = 1024;
const ENTROPY_PERCENT: usize = 80;

// ----------------------------------------------------------------------
// Single-shot compression

fn hash4(data: &[u8], pos: usize) -> usize {
  let h = LittleEndian::read_u32(&data[pos..pos + 4]).wrapping_mul(0x1E35A7BD);
  ((h ^ (h >> 16)) & HASH_MASK) as usize
}

// Head stores position + 1 so that zero means empty; chain links live in a
// ring over the window and are truncated to 16 bits, which only ever costs
// a missed match (candidates are verified byte by byte).
struct MatchTable {
  head: Vec<u32>,
  prev: Vec<u16>
}

impl MatchTable {
  fn new() -> Self {
    MatchTable {
      head: vec![0; HASH_SIZE],
      prev: vec![0; WINDOW_SIZE]
    }
  }

  fn insert(&mut self, data: &[u8], pos: usize) {
    if pos + 3 < data.len() {
      let h = hash4(data, pos);
      self.prev[pos % WINDOW_SIZE] = self.head[h] as u16;
      self.head[h] = (pos + 1) as u32;
    }
  }
}

fn stored_block(data: &[u8]) -> Vec<u8> {
  let mut out = Vec::with_capacity(data.len() + 5);
  out.push(FORMAT_RAW);
  let mut len = [0u8; 4];
  LittleEndian::write_u32(&mut len, data.len() as u32);
  out.extend_from_slice(&len);
  out.extend_from_slice(data);
  out
}

fn write_len_ext(out: &mut Vec<u8>, mut rem: usize) {
  while rem >= 255 {
    out.push(255);
    rem -= 255;
  }
  out.push(rem as u8);
}

fn emit_command(out: &mut Vec<u8>, literals: &[u8], match_len: usize, offset: usize) {
  let lit_nib = cmp::min(literals.len(), 15);
  let match_nib = cmp::min(match_len - 3, 15);
  out.push(((lit_nib << 4) | match_nib) as u8);
  if lit_nib == 15 {
    write_len_ext(out, literals.len() - 15);
  }
  out.extend_from_slice(literals);
  if match_nib == 15 {
    write_len_ext(out, match_len - 3 - 15);
  }
  out.push(offset as u8);
  out.push((offset >> 8) as u8);
}

/// True when a sample of the input has too many distinct bytes for LZ77 to
/// help.
fn high_entropy(data: &[u8]) -> bool {
  let sample = cmp::min(data.len(), ENTROPY_SAMPLE);
  if sample == 0 {
    return true;
  }
  let mut seen = [false; 256];
  let mut unique = 0;
  for &b in &data[..sample] {
    if !seen[b as usize] {
      seen[b as usize] = true;
      unique += 1;
    }
  }
  unique * 100 / sample > ENTROPY_PERCENT
}

/// Compresses `input` into a self-describing block. Falls back to the
/// stored form when the input samples as high entropy or when compression
/// would expand it.
pub fn compress(input: &[u8]) -> Vec<u8> {
  if high_entropy(input) {
    return stored_block(input);
  }

  let mut out = Vec::with_capacity(input.len() / 2 + 16);
  out.push(FORMAT_COMPRESSED);
  let mut len = [0u8; 4];
  LittleEndian::write_u32(&mut len, input.len() as u32);
  out.extend_from_slice(&len);

  let mut table = MatchTable::new();
  let mut ip = 0;
  let mut anchor = 0;

  while ip < input.len() {
    let mut best_len = 0;
    let mut best_off = 0;

    if ip + 3 < input.len() {
      let h = hash4(input, ip);
      let stored = table.head[h];
      table.insert(input, ip);

      let mut candidate = stored;
      let mut chain = CHAIN_LIMIT;
      while candidate != 0 && chain > 0 {
        chain -= 1;
        let pos = (candidate - 1) as usize;
        if pos >= ip {
          break;
        }
        let dist = ip - pos;
        if dist > WINDOW_SIZE {
          break;
        }
        let mut len = 0;
        while ip + len < input.len()
            && len < MAX_MATCH
            && input[pos + len] == input[ip + len] {
          len += 1;
        }
        if len >= 3 && len > best_len {
          best_len = len;
          best_off = dist;
          if len >= GOOD_MATCH {
            break;
          }
        }
        candidate = table.prev[pos % WINDOW_SIZE] as u32;
      }
    }

    // A match breaking a literal run can be shorter than one at the anchor.
    let min_match = if ip > anchor { 3 } else { 4 };
    if best_len >= min_match {
      emit_command(&mut out, &input[anchor..ip], best_len, best_off);
      // Index match interiors so later matches can land inside this one.
      for j in ip + 1..ip + best_len {
        table.insert(input, j);
      }
      ip += best_len;
      anchor = ip;
    } else {
      ip += 1;
    }
  }

  // Trailing literals: control byte with an empty match and no offset.
  if ip > anchor {
    let literals = &input[anchor..ip];
    let lit_nib = cmp::min(literals.len(), 15);
    out.push((lit_nib << 4) as u8);
    if lit_nib == 15 {
      write_len_ext(&mut out, literals.len() - 15);
    }
    out.extend_from_slice(literals);
  }

  if out.len() >= input.len() {
    return stored_block(input);
  }
  out
}

// ----------------------------------------------------------------------
// Decompression

fn read_len_ext(data: &[u8], ip: &mut usize) -> Result<usize> {
  let mut total = 0;
  loop {
    if *ip >= data.len() {
      return Err(PackrError::TruncatedInput("lz77 length extension"));
    }
    let v = data[*ip];
    *ip += 1;
    total += v as usize;
    if v < 255 {
      return Ok(total);
    }
  }
}

/// Decompresses a block produced by [`compress`] or by the streaming
/// encoder (whose length field is the [`LEN_UNKNOWN`] sentinel).
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
  if input.len() < 5 {
    return Err(PackrError::TruncatedInput("lz77 block header"));
  }
  let format = input[0];
  let declared = LittleEndian::read_u32(&input[1..5]);

  if format == FORMAT_RAW {
    let len = declared as usize;
    if input.len() < 5 + len {
      return Err(PackrError::TruncatedInput("lz77 stored block"));
    }
    return Ok(input[5..5 + len].to_vec());
  }
  if format != FORMAT_COMPRESSED {
    return Err(PackrError::InvalidToken(format));
  }

  let unknown = declared == LEN_UNKNOWN;
  let target = declared as usize;
  let data = &input[5..];
  let mut out = if unknown {
    Vec::new()
  } else {
    Vec::with_capacity(cmp::min(target, 1 << 20))
  };

  let mut ip = 0;
  while ip < data.len() && (unknown || out.len() < target) {
    let ctrl = data[ip];
    ip += 1;
    let mut lit_len = (ctrl >> 4) as usize;
    let match_code = (ctrl & 0x0F) as usize;

    if lit_len == 15 {
      lit_len += read_len_ext(data, &mut ip)?;
    }
    if ip + lit_len > data.len() {
      return Err(PackrError::TruncatedInput("lz77 literals"));
    }
    out.extend_from_slice(&data[ip..ip + lit_len]);
    ip += lit_len;

    if ip >= data.len() {
      break;
    }
    if !unknown && out.len() >= target {
      break;
    }

    let mut match_len = match_code + 3;
    if match_code == 15 {
      match_len += read_len_ext(data, &mut ip)?;
    }
    if ip + 2 > data.len() {
      return Err(PackrError::TruncatedInput("lz77 offset"));
    }
    let offset = LittleEndian::read_u16(&data[ip..ip + 2]) as usize;
    ip += 2;

    if offset == 0 {
      // Streaming flush sentinel: the command carried literals only.
      continue;
    }
    if offset > out.len() {
      return Err(PackrError::TruncatedInput("lz77 back-reference"));
    }
    // Byte-wise copy so an offset smaller than the length replicates the
    // overlap region.
    for _ in 0..match_len {
      let b = out[out.len() - offset];
      out.push(b);
    }
  }

  if !unknown && out.len() != target {
    return Err(PackrError::TruncatedInput("lz77 stream"));
  }
  Ok(out)
}

// ----------------------------------------------------------------------
// Streaming compression

/// Byte sink fed by the streaming encoder. A non-zero return code aborts
/// encoding and surfaces as `SinkError`.
pub trait Sink {
  fn flush(&mut self, data: &[u8]) -> i32;
}

impl Sink for Vec<u8> {
  fn flush(&mut self, data: &[u8]) -> i32 {
    self.extend_from_slice(data);
    0
  }
}

const STREAM_WINDOW: usize = 4096;
const STREAM_BUF: usize = 2 * STREAM_WINDOW;
const STREAM_HASH_SIZE: usize = 2048;
const SCRATCH_SIZE: usize = 128;

/// Fixed footprint of the streaming state: window buffer plus both hash
/// arrays.
pub const STREAM_STATE_BYTES: usize = STREAM_BUF + 2 * STREAM_HASH_SIZE + 2 * STREAM_WINDOW;

fn stream_hash(window: &[u8], pos: usize) -> usize {
  let h = LittleEndian::read_u32(&window[pos..pos + 4]).wrapping_mul(0x1E35A7BD);
  ((h >> 19) & (STREAM_HASH_SIZE as u32 - 1)) as usize
}

/// Incremental LZ77 encoder over a sliding window. Output is produced in
/// command units through a small scratchpad; a forced flush drains pending
/// literals with an offset-zero command.
pub struct Lz77Stream {
  window: Vec<u8>,
  head: Vec<u16>,
  prev: Vec<u16>,
  window_pos: usize,
  process_pos: usize,
  anchor: usize,
  scratch: [u8; SCRATCH_SIZE],
  scratch_len: usize
}

impl Lz77Stream {
  pub fn new() -> Self {
    Lz77Stream {
      window: vec![0; STREAM_BUF],
      head: vec![0; STREAM_HASH_SIZE],
      prev: vec![0; STREAM_WINDOW],
      window_pos: 0,
      process_pos: 0,
      anchor: 0,
      scratch: [0; SCRATCH_SIZE],
      scratch_len: 0
    }
  }

  /// Feeds `input` to the compressor. With `flush` set, all buffered bytes
  /// are encoded and emitted before returning.
  pub fn write<S: Sink>(&mut self, input: &[u8], flush: bool, sink: &mut S) -> Result<()> {
    if !flush && self.window_pos + input.len() < STREAM_WINDOW {
      self.window[self.window_pos..self.window_pos + input.len()].copy_from_slice(input);
      self.window_pos += input.len();
      return Ok(());
    }

    let mut consumed = 0;
    loop {
      let mut space = STREAM_BUF - self.window_pos;
      if space < MAX_MATCH && self.process_pos >= STREAM_WINDOW {
        self.emit_pending_literals(sink)?;
        self.slide();
        space = STREAM_BUF - self.window_pos;
      }

      let chunk = cmp::min(input.len() - consumed, space);
      if chunk > 0 {
        self.window[self.window_pos..self.window_pos + chunk]
          .copy_from_slice(&input[consumed..consumed + chunk]);
        self.window_pos += chunk;
        consumed += chunk;
      }
      let done_filling = consumed == input.len();

      let limit = if flush && done_filling {
        self.window_pos
      } else {
        cmp::max(self.window_pos.saturating_sub(3), self.process_pos)
      };

      while self.process_pos < limit {
        let p = self.process_pos;
        let mut best_len = 0;
        let mut best_off = 0;

        if p + 4 <= self.window_pos {
          let h = stream_hash(&self.window, p);
          let match_pos = self.head[h] as usize;
          self.prev[p % STREAM_WINDOW] = match_pos as u16;
          self.head[h] = p as u16;

          if match_pos > 0 && p > match_pos {
            let dist = p - match_pos;
            if dist <= STREAM_WINDOW {
              let max_len = cmp::min(self.window_pos - p, MAX_MATCH);
              let mut len = 0;
              while len < max_len && self.window[match_pos + len] == self.window[p + len] {
                len += 1;
              }
              if len >= 3 {
                best_len = len;
                best_off = dist;
              }
            }
          }
        }

        if best_len >= 3 {
          self.emit_match(best_off, best_len, sink)?;
          let mut k = 1;
          while k < best_len && p + k + 4 <= self.window_pos {
            let h = stream_hash(&self.window, p + k);
            self.prev[(p + k) % STREAM_WINDOW] = self.head[h];
            self.head[h] = (p + k) as u16;
            k += 1;
          }
          self.process_pos += best_len;
          self.anchor = self.process_pos;
        } else {
          self.process_pos += 1;
        }
      }

      if flush && done_filling {
        debug!("lz77 stream: flushing at window position {}", self.window_pos);
        self.emit_pending_literals(sink)?;
        self.flush_scratch(sink)?;
        return Ok(());
      }
      self.flush_scratch(sink)?;
      if done_filling {
        return Ok(());
      }
    }
  }

  fn emit_byte<S: Sink>(&mut self, b: u8, sink: &mut S) -> Result<()> {
    self.scratch[self.scratch_len] = b;
    self.scratch_len += 1;
    if self.scratch_len == SCRATCH_SIZE {
      self.flush_scratch(sink)?;
    }
    Ok(())
  }

  fn flush_scratch<S: Sink>(&mut self, sink: &mut S) -> Result<()> {
    if self.scratch_len > 0 {
      let code = sink.flush(&self.scratch[..self.scratch_len]);
      if code != 0 {
        return Err(PackrError::SinkError(code));
      }
      self.scratch_len = 0;
    }
    Ok(())
  }

  fn emit_len_ext<S: Sink>(&mut self, mut rem: usize, sink: &mut S) -> Result<()> {
    while rem >= 255 {
      self.emit_byte(255, sink)?;
      rem -= 255;
    }
    self.emit_byte(rem as u8, sink)
  }

  fn emit_match<S: Sink>(&mut self, offset: usize, len: usize, sink: &mut S) -> Result<()> {
    let lit_len = self.process_pos - self.anchor;
    let lit_nib = cmp::min(lit_len, 15);
    let match_nib = cmp::min(len - 3, 15);
    self.emit_byte(((lit_nib << 4) | match_nib) as u8, sink)?;
    if lit_nib == 15 {
      self.emit_len_ext(lit_len - 15, sink)?;
    }
    for i in 0..lit_len {
      let b = self.window[self.anchor + i];
      self.emit_byte(b, sink)?;
    }
    if match_nib == 15 {
      self.emit_len_ext(len - 3 - 15, sink)?;
    }
    self.emit_byte(offset as u8, sink)?;
    self.emit_byte((offset >> 8) as u8, sink)
  }

  // Emits the run between anchor and process position as a literal-only
  // command (offset zero; no real match ever uses it).
  fn emit_pending_literals<S: Sink>(&mut self, sink: &mut S) -> Result<()> {
    if self.anchor >= self.process_pos {
      return Ok(());
    }
    let lit_len = self.process_pos - self.anchor;
    let lit_nib = cmp::min(lit_len, 15);
    self.emit_byte((lit_nib << 4) as u8, sink)?;
    if lit_nib == 15 {
      self.emit_len_ext(lit_len - 15, sink)?;
    }
    for i in 0..lit_len {
      let b = self.window[self.anchor + i];
      self.emit_byte(b, sink)?;
    }
    self.emit_byte(0, sink)?;
    self.emit_byte(0, sink)?;
    self.anchor = self.process_pos;
    Ok(())
  }

  fn slide(&mut self) {
    trace!("lz77 stream: sliding window at {}", self.window_pos);
    {
      let (lo, hi) = self.window.split_at_mut(STREAM_WINDOW);
      lo.copy_from_slice(hi);
    }
    self.window_pos -= STREAM_WINDOW;
    self.process_pos -= STREAM_WINDOW;
    self.anchor -= STREAM_WINDOW;
    for h in self.head.iter_mut() {
      *h = if (*h as usize) < STREAM_WINDOW { 0 } else { *h - STREAM_WINDOW as u16 };
    }
    for p in self.prev.iter_mut() {
      *p = if (*p as usize) < STREAM_WINDOW { 0 } else { *p - STREAM_WINDOW as u16 };
    }
  }
}
