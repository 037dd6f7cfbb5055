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

//! The document value model: a rooted tree of scalars, records and arrays.
//!
//! Records preserve field insertion order, which is part of the wire
//! contract. Integers are signed 32-bit; wider numbers are represented as
//! doubles by the JSON layer.

/// One node of a document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i32),
  Double(f64),
  Binary(Vec<u8>),
  Str(String),
  /// Ordered array of values.
  Array(Vec<Value>),
  /// Ordered mapping of field name to value.
  Object(Vec<(String, Value)>)
}

impl Value {
  /// Returns true for null, bool, int, double and string values. Binary
  /// blobs and containers are not scalars for batching purposes.
  pub fn is_scalar(&self) -> bool {
    match *self {
      Value::Null | Value::Bool(_) | Value::Int(_) | Value::Double(_) | Value::Str(_) => true,
      _ => false
    }
  }

  pub fn as_object(&self) -> Option<&[(String, Value)]> {
    match *self {
      Value::Object(ref pairs) => Some(pairs),
      _ => None
    }
  }

  pub fn as_array(&self) -> Option<&[Value]> {
    match *self {
      Value::Array(ref items) => Some(items),
      _ => None
    }
  }

  /// Builds a record from string/value pairs, preserving order.
  pub fn object(pairs: Vec<(&str, Value)>) -> Value {
    Value::Object(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
  }

  /// Looks up a field by name in a record.
  pub fn get(&self, name: &str) -> Option<&Value> {
    match *self {
      Value::Object(ref pairs) => {
        pairs.iter().find(|&&(ref k, _)| k == name).map(|&(_, ref v)| v)
      },
      _ => None
    }
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Value {
    Value::Bool(v)
  }
}

impl From<i32> for Value {
  fn from(v: i32) -> Value {
    Value::Int(v)
  }
}

impl From<f64> for Value {
  fn from(v: f64) -> Value {
    Value::Double(v)
  }
}

impl<'a> From<&'a str> for Value {
  fn from(v: &'a str) -> Value {
    Value::Str(v.to_owned())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_is_scalar() {
    assert!(Value::Null.is_scalar());
    assert!(Value::Bool(true).is_scalar());
    assert!(Value::Int(-3).is_scalar());
    assert!(Value::Double(0.5).is_scalar());
    assert!(Value::Str("x".to_owned()).is_scalar());
    assert!(!Value::Binary(vec![1, 2]).is_scalar());
    assert!(!Value::Array(vec![]).is_scalar());
    assert!(!Value::Object(vec![]).is_scalar());
  }

  #[test]
  fn test_object_preserves_order() {
    let record = Value::object(vec![
      ("zeta", Value::Int(1)),
      ("alpha", Value::Int(2)),
      ("mid", Value::Int(3)),
    ]);
    let pairs = record.as_object().unwrap();
    let names: Vec<&str> = pairs.iter().map(|&(ref k, _)| k.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    assert_eq!(record.get("alpha"), Some(&Value::Int(2)));
    assert_eq!(record.get("missing"), None);
  }
}
