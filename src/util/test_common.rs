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

use rand::distributions::range::SampleRange;
use rand::{thread_rng, Rng};

use data_type::Value;

pub fn random_bytes(n: usize) -> Vec<u8> {
  let mut result = vec![];
  let mut rng = thread_rng();
  for _ in 0..n {
    result.push(rng.gen::<u8>());
  }
  result
}

pub fn random_bools(n: usize) -> Vec<bool> {
  let mut result = vec![];
  let mut rng = thread_rng();
  for _ in 0..n {
    result.push(rng.gen::<bool>());
  }
  result
}

pub fn random_numbers_range<T>(n: usize, low: T, high: T, result: &mut Vec<T>)
    where T: PartialOrd + SampleRange + Copy {
  let mut rng = thread_rng();
  for _ in 0..n {
    result.push(rng.gen_range(low, high));
  }
}

pub fn random_ascii_string(len: usize) -> String {
  let mut rng = thread_rng();
  (0..len).map(|_| rng.gen_range(b'a', b'z' + 1) as char).collect()
}

/// Builds a telemetry-shaped record batch: a slowly drifting counter, a
/// bounded gauge and a small status vocabulary.
pub fn telemetry_records(n: usize) -> Vec<Value> {
  let mut rng = thread_rng();
  let states = ["ok", "warn", "down"];
  let mut seq: i32 = 1000;
  let mut records = Vec::with_capacity(n);
  for _ in 0..n {
    seq += rng.gen_range(0, 5);
    records.push(Value::object(vec![
      ("seq", Value::Int(seq)),
      ("rssi", Value::Int(rng.gen_range(-90, -30))),
      ("state", Value::Str(states[rng.gen_range(0, states.len())].to_owned())),
    ]));
  }
  records
}
