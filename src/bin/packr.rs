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

//! Command line converter between JSON text and PACKR frames.
//!
//! ```text
//! packr encode input.json output.pkr
//! packr decode input.pkr output.json
//! ```

extern crate packr;

use std::env;
use std::fs;
use std::io::{Read, Write};
use std::process;

use packr::json;
use packr::EncodeOptions;

fn usage(program: &str) {
  eprintln!("Usage: {} encode input.json output.pkr", program);
  eprintln!("       {} decode input.pkr output.json", program);
}

fn read_file(path: &str) -> Result<Vec<u8>, String> {
  let mut data = Vec::new();
  fs::File::open(path)
    .and_then(|mut f| f.read_to_end(&mut data))
    .map_err(|e| format!("cannot read {}: {}", path, e))?;
  Ok(data)
}

fn write_file(path: &str, data: &[u8]) -> Result<(), String> {
  fs::File::create(path)
    .and_then(|mut f| f.write_all(data))
    .map_err(|e| format!("cannot write {}: {}", path, e))
}

fn run() -> Result<(), String> {
  let args: Vec<String> = env::args().collect();
  if args.len() != 4 {
    usage(&args[0]);
    return Err("expected a mode and two paths".to_owned());
  }
  let mode = &args[1];
  let input_path = &args[2];
  let output_path = &args[3];

  match mode.as_str() {
    "encode" => {
      let input = read_file(input_path)?;
      let text = String::from_utf8(input)
        .map_err(|e| format!("{} is not UTF-8 JSON: {}", input_path, e))?;
      let frame = json::encode_json(&text, &EncodeOptions::default())
        .map_err(|e| format!("encode failed: {}", e))?;
      write_file(output_path, &frame)?;
      println!(
        "Encoded {} bytes -> {} bytes ({:.1}:1)",
        text.len(),
        frame.len(),
        text.len() as f64 / frame.len() as f64
      );
      Ok(())
    },
    "decode" => {
      let frame = read_file(input_path)?;
      let text = json::decode_to_json(&frame)
        .map_err(|e| format!("decode failed: {}", e))?;
      write_file(output_path, text.as_bytes())?;
      println!("Decoded {} bytes -> {} bytes", frame.len(), text.len());
      Ok(())
    },
    _ => {
      usage(&args[0]);
      Err(format!("unknown mode: {}", mode))
    }
  }
}

fn main() {
  if let Err(message) = run() {
    eprintln!("Error: {}", message);
    process::exit(1);
  }
}
