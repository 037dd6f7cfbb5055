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

//! JSON front-end: maps `serde_json` values to and from the codec's
//! document model and backs the CLI.
//!
//! Integers outside the signed 32-bit range become doubles (the document
//! model fixes ints at 32 bits). Binary values have no JSON source form
//! and render as arrays of byte values.

use serde_json;

use data_type::Value;
use decoder;
use encoder::{self, EncodeOptions};
use errors::Result;

/// Converts a parsed JSON value into a codec document.
pub fn from_json(json: &serde_json::Value) -> Value {
  match *json {
    serde_json::Value::Null => Value::Null,
    serde_json::Value::Bool(v) => Value::Bool(v),
    serde_json::Value::Number(ref n) => {
      if let Some(v) = n.as_i64() {
        if v >= i32::min_value() as i64 && v <= i32::max_value() as i64 {
          return Value::Int(v as i32);
        }
      }
      Value::Double(n.as_f64().unwrap_or(0.0))
    },
    serde_json::Value::String(ref s) => Value::Str(s.clone()),
    serde_json::Value::Array(ref items) => {
      Value::Array(items.iter().map(from_json).collect())
    },
    serde_json::Value::Object(ref map) => {
      Value::Object(map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect())
    }
  }
}

/// Converts a codec document back into a JSON value.
pub fn to_json(value: &Value) -> serde_json::Value {
  match *value {
    Value::Null => serde_json::Value::Null,
    Value::Bool(v) => serde_json::Value::Bool(v),
    Value::Int(v) => serde_json::Value::from(v),
    Value::Double(v) => {
      serde_json::Number::from_f64(v)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
    },
    Value::Str(ref s) => serde_json::Value::String(s.clone()),
    Value::Binary(ref bytes) => {
      serde_json::Value::Array(bytes.iter().map(|&b| serde_json::Value::from(b)).collect())
    },
    Value::Array(ref items) => {
      serde_json::Value::Array(items.iter().map(to_json).collect())
    },
    Value::Object(ref pairs) => {
      let mut map = serde_json::Map::new();
      for &(ref k, ref v) in pairs.iter() {
        map.insert(k.clone(), to_json(v));
      }
      serde_json::Value::Object(map)
    }
  }
}

/// Encodes JSON text into a PACKR frame.
pub fn encode_json(text: &str, options: &EncodeOptions) -> Result<Vec<u8>> {
  let json: serde_json::Value = serde_json::from_str(text)?;
  let value = from_json(&json);
  encoder::encode(&value, options)
}

/// Decodes a PACKR frame back into JSON text.
pub fn decode_to_json(data: &[u8]) -> Result<String> {
  let value = decoder::decode(data)?;
  Ok(serde_json::to_string(&to_json(&value))?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use encoder::EncodeOptions;

  fn json_round_trip(text: &str) {
    let frame = encode_json(text, &EncodeOptions::default()).unwrap();
    let back = decode_to_json(&frame).unwrap();
    let original: serde_json::Value = serde_json::from_str(text).unwrap();
    let decoded: serde_json::Value = serde_json::from_str(&back).unwrap();
    assert_eq!(original, decoded);
  }

  #[test]
  fn test_json_round_trip() {
    json_round_trip("{}");
    json_round_trip("{\"id\":42,\"ok\":true}");
    json_round_trip("[{\"t\":100},{\"t\":101},{\"t\":102},{\"t\":103},{\"t\":104}]");
    json_round_trip("{\"name\":\"ap-1\",\"mac\":\"de:ad:be:ef:00:01\",\"load\":0.5,\"tags\":[\"a\",\"b\"],\"extra\":null}");
    json_round_trip("[1,\"two\",null,[true,false],{\"deep\":{\"deeper\":[]}}]");
  }

  #[test]
  fn test_field_order_preserved() {
    let text = "{\"zeta\":1,\"alpha\":2,\"mid\":3}";
    let frame = encode_json(text, &EncodeOptions::default()).unwrap();
    assert_eq!(decode_to_json(&frame).unwrap(), text);
  }

  #[test]
  fn test_wide_integers_become_doubles() {
    let json: serde_json::Value = serde_json::from_str("[2147483647,2147483648]").unwrap();
    let value = from_json(&json);
    let items = value.as_array().unwrap();
    assert_eq!(items[0], ::data_type::Value::Int(2147483647));
    assert_eq!(items[1], ::data_type::Value::Double(2147483648.0));
  }

  #[test]
  fn test_binary_renders_as_byte_array() {
    let json = to_json(&::data_type::Value::Binary(vec![1, 2, 255]));
    assert_eq!(json, serde_json::from_str::<serde_json::Value>("[1,2,255]").unwrap());
  }

  #[test]
  fn test_malformed_json_is_an_error() {
    assert!(encode_json("{nope", &EncodeOptions::default()).is_err());
  }
}
