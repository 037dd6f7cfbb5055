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

//! Streaming encoder: the batch scheduler plus the streaming frame
//! pipeline.
//!
//! Value events arrive through the same interface the one-shot encoder
//! offers. A top-level array is not buffered as a whole: completed records
//! accumulate until the row or string-byte threshold, then leave as a
//! `BATCH_PARTIAL` inside an `ARRAY_STREAM`. Frame bytes flow to the
//! caller's [`Sink`], optionally through the streaming LZ77 transform; the
//! CRC runs over header and body and its four trailer bytes join the LZ77
//! payload without being folded into the CRC itself.

use std::mem;

use byteorder::{ByteOrder, LittleEndian};

use basic::{self, token, ColumnKind};
use data_type::Value;
use encoder::{Encoder, EncodeOptions, MAX_DEPTH};
use encodings::batch::{self, MAX_BATCH_BYTES, MAX_BATCH_ROWS};
use errors::{PackrError, Result};
use lz77::{Lz77Stream, Sink, FORMAT_COMPRESSED, STREAM_STATE_BYTES};
use util::bit_util::encode_varint;
use util::crc::Crc32;
use util::memory::MemTrackerPtr;

enum RootState {
  /// No event seen yet.
  Idle,
  /// A non-array root value under construction.
  Inline(RowBuilder),
  /// The top-level array stream.
  Stream(StreamState),
  /// Root value complete; only `finish` is valid now.
  Done
}

struct StreamState {
  rows: Vec<Value>,
  schema: Vec<(String, ColumnKind)>,
  string_bytes: usize,
  opened: bool,
  builder: Option<RowBuilder>
}

impl StreamState {
  fn new() -> Self {
    StreamState {
      rows: Vec::new(),
      schema: Vec::new(),
      string_bytes: 0,
      opened: false,
      builder: None
    }
  }
}

/// Event-driven frame encoder writing to a caller-supplied sink.
///
/// The header goes out immediately (streamed frames carry a zero symbol
/// count), body bytes follow as they are produced, and `finish` appends the
/// CRC and flushes the LZ77 stream.
pub struct StreamEncoder<S: Sink> {
  sink: S,
  enc: Encoder,
  crc: Crc32,
  lz: Option<Lz77Stream>,
  root: RootState,
  mem: Option<MemTrackerPtr>
}

impl<S: Sink> StreamEncoder<S> {
  pub fn new(sink: S, options: &EncodeOptions) -> Result<Self> {
    let mut stream = StreamEncoder {
      sink: sink,
      enc: Encoder::new(),
      crc: Crc32::new(),
      lz: if options.compress { Some(Lz77Stream::new()) } else { None },
      root: RootState::Idle,
      mem: None
    };
    stream.write_prologue()?;
    Ok(stream)
  }

  /// Like `new`, with scratch allocations reported to `tracker`.
  pub fn with_mem_tracker(sink: S, options: &EncodeOptions, tracker: MemTrackerPtr) -> Result<Self> {
    let mut stream = StreamEncoder {
      sink: sink,
      enc: Encoder::with_mem_tracker(tracker.clone()),
      crc: Crc32::new(),
      lz: if options.compress { Some(Lz77Stream::new()) } else { None },
      root: RootState::Idle,
      mem: Some(tracker)
    };
    if stream.lz.is_some() {
      if let Some(ref t) = stream.mem {
        t.alloc(STREAM_STATE_BYTES as i64);
      }
    }
    stream.write_prologue()?;
    Ok(stream)
  }

  fn write_prologue(&mut self) -> Result<()> {
    if self.lz.is_some() {
      // LZ77 envelope with the unknown-length sentinel.
      let prefix = [
        basic::ENVELOPE[0],
        basic::ENVELOPE[1],
        FORMAT_COMPRESSED,
        0xFF, 0xFF, 0xFF, 0xFF,
      ];
      let code = self.sink.flush(&prefix);
      if code != 0 {
        return Err(PackrError::SinkError(code));
      }
    }
    let mut header = Vec::with_capacity(8);
    header.extend_from_slice(&basic::MAGIC);
    header.push(basic::VERSION);
    header.push(0);
    // The symbol count is unknowable before the body ends; streamed
    // frames declare zero and decoders treat the count as advisory.
    encode_varint(&mut header, 0);
    self.pipe_body(&header)
  }

  // ----------------------------------------------------------------------
  // Value events

  pub fn encode_null(&mut self) -> Result<()> {
    self.on_value(Value::Null)
  }

  pub fn encode_bool(&mut self, value: bool) -> Result<()> {
    self.on_value(Value::Bool(value))
  }

  pub fn encode_int(&mut self, value: i32) -> Result<()> {
    self.on_value(Value::Int(value))
  }

  pub fn encode_double(&mut self, value: f64) -> Result<()> {
    self.on_value(Value::Double(value))
  }

  pub fn encode_string(&mut self, value: &str) -> Result<()> {
    self.on_value(Value::Str(value.to_owned()))
  }

  pub fn encode_binary(&mut self, data: &[u8]) -> Result<()> {
    self.on_value(Value::Binary(data.to_vec()))
  }

  pub fn encode_field(&mut self, name: &str) -> Result<()> {
    match self.root {
      RootState::Inline(ref mut builder) => builder.field(name),
      RootState::Stream(ref mut st) => match st.builder {
        Some(ref mut builder) => builder.field(name),
        None => Err(PackrError::InvalidNesting("field event outside a record"))
      },
      _ => Err(PackrError::InvalidNesting("field event outside a record"))
    }
  }

  pub fn encode_object_start(&mut self) -> Result<()> {
    match self.root {
      RootState::Idle => {
        let mut builder = RowBuilder::new();
        builder.object_start()?;
        self.root = RootState::Inline(builder);
        Ok(())
      },
      RootState::Inline(ref mut builder) => builder.object_start(),
      RootState::Stream(ref mut st) => {
        if st.builder.is_none() {
          st.builder = Some(RowBuilder::new());
        }
        st.builder.as_mut().unwrap().object_start()
      },
      RootState::Done => Err(PackrError::InvalidNesting("event after root value completed"))
    }
  }

  pub fn encode_object_end(&mut self) -> Result<()> {
    let root = mem::replace(&mut self.root, RootState::Done);
    match root {
      RootState::Inline(mut builder) => {
        match builder.object_end()? {
          Some(value) => self.finish_root(value),
          None => {
            self.root = RootState::Inline(builder);
            Ok(())
          }
        }
      },
      RootState::Stream(mut st) => {
        let completed = match st.builder {
          Some(ref mut builder) => builder.object_end()?,
          None => {
            self.root = RootState::Stream(st);
            return Err(PackrError::InvalidNesting("object end without matching start"));
          }
        };
        if let Some(row) = completed {
          st.builder = None;
          self.push_row(&mut st, row)?;
        }
        self.root = RootState::Stream(st);
        Ok(())
      },
      other => {
        self.root = other;
        Err(PackrError::InvalidNesting("object end without matching start"))
      }
    }
  }

  /// Opens an array. At the top level this opens the (unbounded) record
  /// stream; nested, it is an ordinary array element.
  pub fn encode_array_start(&mut self) -> Result<()> {
    match self.root {
      RootState::Idle => {
        self.root = RootState::Stream(StreamState::new());
        Ok(())
      },
      RootState::Inline(ref mut builder) => builder.array_start(),
      RootState::Stream(ref mut st) => {
        if st.builder.is_none() {
          st.builder = Some(RowBuilder::new());
        }
        st.builder.as_mut().unwrap().array_start()
      },
      RootState::Done => Err(PackrError::InvalidNesting("event after root value completed"))
    }
  }

  pub fn encode_array_end(&mut self) -> Result<()> {
    let root = mem::replace(&mut self.root, RootState::Done);
    match root {
      RootState::Inline(mut builder) => {
        match builder.array_end()? {
          Some(value) => self.finish_root(value),
          None => {
            self.root = RootState::Inline(builder);
            Ok(())
          }
        }
      },
      RootState::Stream(mut st) => {
        match st.builder {
          Some(_) => {
            let completed = st.builder.as_mut().unwrap().array_end()?;
            if let Some(row) = completed {
              st.builder = None;
              self.push_row(&mut st, row)?;
            }
            self.root = RootState::Stream(st);
            Ok(())
          },
          // No element under construction: this closes the stream itself.
          None => self.close_stream(st)
        }
      },
      other => {
        self.root = other;
        Err(PackrError::InvalidNesting("array end without matching start"))
      }
    }
  }

  /// Appends the CRC, flushes the LZ77 stream and returns the sink.
  pub fn finish(mut self) -> Result<S> {
    match self.root {
      RootState::Stream(_) => {
        return Err(PackrError::InvalidNesting("unterminated array stream"));
      },
      RootState::Inline(_) => {
        return Err(PackrError::InvalidNesting("unterminated root value"));
      },
      _ => {}
    }
    self.drain()?;

    let crc = self.crc.finish();
    let mut trailer = [0u8; 4];
    LittleEndian::write_u32(&mut trailer, crc);
    // The trailer joins the LZ77 payload but is excluded from the CRC.
    match self.lz {
      Some(ref mut lz) => {
        lz.write(&trailer, true, &mut self.sink)?;
        if let Some(ref t) = self.mem {
          t.alloc(-(STREAM_STATE_BYTES as i64));
        }
      },
      None => {
        let code = self.sink.flush(&trailer);
        if code != 0 {
          return Err(PackrError::SinkError(code));
        }
      }
    }
    Ok(self.sink)
  }

  // ----------------------------------------------------------------------
  // Scheduler

  fn on_value(&mut self, value: Value) -> Result<()> {
    let root = mem::replace(&mut self.root, RootState::Done);
    match root {
      RootState::Idle => self.finish_root(value),
      RootState::Inline(mut builder) => {
        match builder.on_value(value)? {
          Some(root_value) => self.finish_root(root_value),
          None => {
            self.root = RootState::Inline(builder);
            Ok(())
          }
        }
      },
      RootState::Stream(mut st) => {
        if st.builder.is_none() {
          st.builder = Some(RowBuilder::new());
        }
        let completed = st.builder.as_mut().unwrap().on_value(value)?;
        if let Some(row) = completed {
          st.builder = None;
          self.push_row(&mut st, row)?;
        }
        self.root = RootState::Stream(st);
        Ok(())
      },
      RootState::Done => {
        Err(PackrError::InvalidNesting("event after root value completed"))
      }
    }
  }

  fn finish_root(&mut self, value: Value) -> Result<()> {
    self.enc.encode_document(&value)?;
    self.root = RootState::Done;
    self.drain()
  }

  fn push_row(&mut self, st: &mut StreamState, row: Value) -> Result<()> {
    if batch::is_batchable_record(&row) {
      if !batch::schema_admits(&st.schema, &row) {
        self.flush_partial(st)?;
      }
      batch::admit_row(&mut st.schema, &row);
      if let Value::Object(ref pairs) = row {
        for &(_, ref v) in pairs.iter() {
          if let Value::Str(ref s) = *v {
            st.string_bytes += s.len();
          }
        }
      }
      st.rows.push(row);
      if st.rows.len() >= MAX_BATCH_ROWS || st.string_bytes >= MAX_BATCH_BYTES {
        self.flush_partial(st)?;
      }
      Ok(())
    } else {
      // Rows the analyzer cannot batch are emitted inline between
      // partial batches.
      self.flush_partial(st)?;
      self.open_stream(st);
      self.enc.encode_document(&row)?;
      self.drain()
    }
  }

  fn flush_partial(&mut self, st: &mut StreamState) -> Result<()> {
    if st.rows.is_empty() {
      st.schema.clear();
      st.string_bytes = 0;
      return Ok(());
    }
    self.open_stream(st);
    debug!("flushing partial batch of {} rows", st.rows.len());
    batch::encode_batch(&mut self.enc, &st.rows, token::BATCH_PARTIAL)?;
    st.rows.clear();
    st.schema.clear();
    st.string_bytes = 0;
    self.drain()
  }

  fn open_stream(&mut self, st: &mut StreamState) {
    if !st.opened {
      st.opened = true;
      self.enc.emit_token(token::ARRAY_STREAM);
    }
  }

  fn close_stream(&mut self, mut st: StreamState) -> Result<()> {
    if !st.opened && !st.rows.is_empty() {
      // The whole array fit in one buffer: a self-contained batch.
      batch::encode_batch(&mut self.enc, &st.rows, token::ULTRA_BATCH)?;
    } else if !st.opened {
      self.enc.emit_token(token::ARRAY_START);
      self.enc.put_varint(0);
      self.enc.emit_token(token::ARRAY_END);
    } else {
      self.flush_partial(&mut st)?;
      self.enc.emit_token(token::ARRAY_END);
    }
    self.root = RootState::Done;
    self.drain()
  }

  // ----------------------------------------------------------------------
  // Frame pipeline

  fn drain(&mut self) -> Result<()> {
    let bytes = self.enc.take_body();
    if bytes.is_empty() {
      return Ok(());
    }
    self.pipe_body(&bytes)
  }

  fn pipe_body(&mut self, data: &[u8]) -> Result<()> {
    self.crc.update(data);
    match self.lz {
      Some(ref mut lz) => lz.write(data, false, &mut self.sink),
      None => {
        let code = self.sink.flush(data);
        if code != 0 {
          Err(PackrError::SinkError(code))
        } else {
          Ok(())
        }
      }
    }
  }
}

// ----------------------------------------------------------------------
// Row assembly

// Builds one Value from a balanced event sequence. The scheduler uses it
// per stream element, so memory is bounded by a single row plus nesting.
struct RowBuilder {
  stack: Vec<BuildFrame>
}

enum BuildFrame {
  Object { pairs: Vec<(String, Value)>, pending: Option<String> },
  Array { items: Vec<Value> }
}

impl RowBuilder {
  fn new() -> Self {
    RowBuilder { stack: Vec::new() }
  }

  // Returns the completed value once the outermost container closes (or
  // immediately for a bare scalar).
  fn on_value(&mut self, value: Value) -> Result<Option<Value>> {
    match self.stack.last_mut() {
      None => return Ok(Some(value)),
      Some(&mut BuildFrame::Object { ref mut pairs, ref mut pending }) => {
        match pending.take() {
          Some(name) => pairs.push((name, value)),
          None => {
            return Err(PackrError::InvalidNesting("record value requires a preceding field"));
          }
        }
      },
      Some(&mut BuildFrame::Array { ref mut items }) => items.push(value)
    }
    Ok(None)
  }

  fn field(&mut self, name: &str) -> Result<()> {
    match self.stack.last_mut() {
      Some(&mut BuildFrame::Object { ref mut pending, .. }) => {
        if pending.is_some() {
          return Err(PackrError::InvalidNesting("field follows an unvalued field"));
        }
        *pending = Some(name.to_owned());
        Ok(())
      },
      _ => Err(PackrError::InvalidNesting("field event outside a record"))
    }
  }

  fn object_start(&mut self) -> Result<()> {
    if self.stack.len() >= MAX_DEPTH {
      return Err(PackrError::InvalidNesting("nesting too deep"));
    }
    self.stack.push(BuildFrame::Object {
      pairs: Vec::new(),
      pending: None
    });
    Ok(())
  }

  fn object_end(&mut self) -> Result<Option<Value>> {
    match self.stack.pop() {
      Some(BuildFrame::Object { pairs, pending: None }) => {
        self.on_value(Value::Object(pairs))
      },
      Some(BuildFrame::Object { .. }) => {
        Err(PackrError::InvalidNesting("record closed after an unvalued field"))
      },
      _ => Err(PackrError::InvalidNesting("object end without matching start"))
    }
  }

  fn array_start(&mut self) -> Result<()> {
    if self.stack.len() >= MAX_DEPTH {
      return Err(PackrError::InvalidNesting("nesting too deep"));
    }
    self.stack.push(BuildFrame::Array { items: Vec::new() });
    Ok(())
  }

  fn array_end(&mut self) -> Result<Option<Value>> {
    match self.stack.pop() {
      Some(BuildFrame::Array { items }) => self.on_value(Value::Array(items)),
      _ => Err(PackrError::InvalidNesting("array end without matching start"))
    }
  }
}
