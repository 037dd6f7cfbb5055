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

//! PACKR is a structure-first binary codec for semi-structured telemetry
//! records: JSON-shaped documents dominated by repeating field names, short
//! strings, MAC-like identifiers and slowly drifting numeric series.
//!
//! A frame is `HEADER || BODY || CRC`, optionally wrapped in an LZ77
//! envelope. The body is a token stream over three 64-slot LRU dictionaries
//! (field names, string values, MAC addresses) with per-field delta memory;
//! arrays of flat records are rewritten column-wise with per-column
//! constant, delta (bit-packed, Rice-coded or token-ladder), run-length and
//! most-frequent-value strategies. Large arrays stream as chained partial
//! batches so neither side buffers the whole input.
//!
//! ```rust
//! use packr::{encode, decode, EncodeOptions, Value};
//!
//! let doc = Value::Array(
//!   (0..100).map(|i| Value::object(vec![("seq", Value::Int(i))])).collect(),
//! );
//! let frame = encode(&doc, &EncodeOptions::default()).unwrap();
//! assert_eq!(decode(&frame).unwrap(), doc);
//! ```

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate quick_error;
extern crate byteorder;
extern crate serde_json;
#[cfg(test)]
extern crate rand;

pub mod errors;
pub mod basic;
pub mod data_type;
pub mod util;
pub mod dict;
pub mod delta;
pub mod lz77;
pub mod encoder;
pub mod encodings;
pub mod decoder;
pub mod json;

pub use data_type::Value;
pub use decoder::{decode, Decoder, FrameHeader};
pub use encoder::{encode, EncodeOptions, Encoder};
pub use encodings::stream::StreamEncoder;
pub use errors::{PackrError, Result};
pub use lz77::Sink;
