// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Content-addressed stimulus hashing.
//!
//! A stimulus is an activity type name plus a payload of semantically
//! relevant fields. Its hash is the sole key into the bookmark and trigger
//! indexes, so it must be identical for logically equal stimuli regardless of
//! originating instance, process, or time. Payload objects are canonicalized
//! (keys sorted recursively, compact encoding) before hashing.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes routing hashes for stimuli.
#[derive(Debug, Clone, Copy, Default)]
pub struct StimulusHasher;

impl StimulusHasher {
    /// Create a new hasher.
    pub fn new() -> Self {
        Self
    }

    /// Hash an activity type name and payload into a hex-encoded digest.
    pub fn hash(&self, activity_type_name: &str, payload: &Value) -> String {
        let mut canonical = String::new();
        write_canonical(payload, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(activity_type_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Write a JSON value in canonical form: object keys sorted, arrays in
/// order, scalars in serde_json's compact encoding.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                // Object keys are strings; serialization cannot fail.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
