//! # Payload codec: rich [`Value`]s ⇄ tagged JSON envelopes.
//!
//! Contexts share no memory, so anything that is not plain JSON is rewritten
//! into a tagged envelope before it crosses a transport:
//!
//! ```text
//! {"__type": "<tag>", "__data": {...}}      tag ∈ dom | error | function | object | ast | collection
//! {"__id": n, "__data": <encoded node>}     shared node referenced by a cycle
//! {"__ref": n}                               re-entry into node n
//! ```
//!
//! ## Rules
//! - Primitives pass through; non-finite numbers become `null`.
//! - Plain objects whose keys collide with a reserved key are wrapped as `object`.
//! - Objects shaped like syntax trees (`type` plus `children`/`properties`/`value`)
//!   are tagged `ast`.
//! - Reference ids are per call and monotonic from 0, so output is deterministic.
//! - Nesting deeper than `max_depth` fails with [`CodecError::DepthExceeded`].
//! - Shared nodes outside any cycle are inlined; only cycle targets keep identity.
//!
//! ```rust
//! use relaybus::{Codec, SharedValue, Value};
//!
//! let codec = Codec::default();
//! let node = SharedValue::new(Value::object());
//! node.with_mut(|v| v.insert("me", Value::Shared(node.clone())));
//!
//! let json = codec.serialize(&Value::Shared(node.clone())).unwrap();
//! assert_eq!(json.to_string().matches("__ref").count(), 1);
//! node.replace(Value::Null);
//! ```

mod decode;
mod encode;
mod stats;

pub use stats::CodecStats;

use parking_lot::Mutex;

use crate::error::CodecError;
use crate::value::Value;

pub(crate) const TYPE_KEY: &str = "__type";
pub(crate) const DATA_KEY: &str = "__data";
pub(crate) const ID_KEY: &str = "__id";
pub(crate) const REF_KEY: &str = "__ref";

/// Keys that cannot appear unwrapped in a plain object.
pub(crate) const RESERVED_KEYS: [&str; 4] = [TYPE_KEY, DATA_KEY, ID_KEY, REF_KEY];

/// Envelope tags.
pub(crate) mod tag {
    pub const DOM: &str = "dom";
    pub const ERROR: &str = "error";
    pub const FUNCTION: &str = "function";
    pub const OBJECT: &str = "object";
    pub const AST: &str = "ast";
    pub const COLLECTION: &str = "collection";
}

/// Serializes and deserializes payloads, keeping running statistics.
#[derive(Debug)]
pub struct Codec {
    max_depth: usize,
    dom_text_limit: usize,
    function_source_limit: usize,
    stats: Mutex<CodecStats>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Codec {
    /// Creates a codec accepting payloads nested at most `max_depth` levels.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            dom_text_limit: 100,
            function_source_limit: 200,
            stats: Mutex::new(CodecStats::default()),
        }
    }

    /// Maximum accepted nesting depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Encodes `value` into a transport-safe JSON envelope.
    pub fn serialize(&self, value: &Value) -> Result<serde_json::Value, CodecError> {
        let result = encode::Encoder::new(self).run(value);
        let mut stats = self.stats.lock();
        match &result {
            Ok(json) => {
                stats.serialized += 1;
                stats.bytes_before += value.approx_size() as u64;
                stats.bytes_after += json.to_string().len() as u64;
            }
            Err(_) => stats.errors += 1,
        }
        result
    }

    /// Rebuilds a [`Value`] from an envelope produced by [`Codec::serialize`].
    pub fn deserialize(&self, json: &serde_json::Value) -> Result<Value, CodecError> {
        let result = decode::Decoder::new(self.max_depth).run(json);
        let mut stats = self.stats.lock();
        match &result {
            Ok(_) => stats.deserialized += 1,
            Err(_) => stats.errors += 1,
        }
        result
    }

    /// Snapshot of the running statistics.
    pub fn stats(&self) -> CodecStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::value::{DomDescriptor, ErrorValue, FunctionDescriptor, SharedValue};

    fn round_trip(v: &Value) -> Value {
        let codec = Codec::default();
        let json = codec.serialize(v).unwrap();
        codec.deserialize(&json).unwrap()
    }

    #[test]
    fn plain_data_round_trips() {
        let v = Value::from(json!({
            "user": {"name": "ada", "tags": ["a", "b"], "age": 36.0},
            "ok": true,
            "none": null
        }));
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn non_finite_numbers_become_null() {
        let codec = Codec::default();
        let json = codec
            .serialize(&Value::Array(vec![Value::Number(f64::NAN), Value::Number(1.5)]))
            .unwrap();
        assert_eq!(json, json!([null, 1.5]));
    }

    #[test]
    fn reserved_keys_are_wrapped() {
        let v = Value::from(json!({"__type": "dom", "x": 1.0}));
        let codec = Codec::default();
        let json = codec.serialize(&v).unwrap();
        assert_eq!(json["__type"], "object");
        assert_eq!(codec.deserialize(&json).unwrap(), v);
    }

    #[test]
    fn ast_shaped_objects_are_tagged() {
        let v = Value::from(json!({"type": "Identifier", "value": "x"}));
        let json = Codec::default().serialize(&v).unwrap();
        assert_eq!(json["__type"], "ast");
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn collections_round_trip() {
        let v = Value::Array(vec![
            Value::Map(vec![(Value::from(1), Value::from("one"))]),
            Value::Set(vec![Value::from("a"), Value::from("b")]),
        ]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn error_keeps_cause_chain() {
        let mut inner = ErrorValue::new("IOError", "disk");
        inner.extras.insert("code".into(), Value::from(5));
        let mut outer = ErrorValue::new("Error", "save failed");
        outer.stack = Some("at save()".into());
        outer.cause = Some(Box::new(Value::Error(inner)));
        let v = Value::Error(outer);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn descriptors_are_truncated() {
        let dom = DomDescriptor {
            tag_name: "P".into(),
            text_content: "x".repeat(500),
            attributes: BTreeMap::from([("lang".to_string(), "en".to_string())]),
            ..DomDescriptor::default()
        };
        let func = FunctionDescriptor {
            name: "f".into(),
            source: "y".repeat(500),
            is_arrow: true,
            length: 2,
            ..FunctionDescriptor::default()
        };
        let out = round_trip(&Value::Array(vec![Value::Dom(dom), Value::Function(func)]));
        let Value::Array(items) = out else {
            panic!("expected array");
        };
        match (&items[0], &items[1]) {
            (Value::Dom(d), Value::Function(f)) => {
                assert_eq!(d.text_content.chars().count(), 100);
                assert_eq!(d.attributes.get("lang").map(String::as_str), Some("en"));
                assert_eq!(f.source.chars().count(), 200);
                assert!(f.is_arrow);
                assert_eq!(f.length, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn self_reference_emits_single_ref() {
        let node = SharedValue::new(Value::object());
        node.with_mut(|v| {
            v.insert("name", "root");
            v.insert("self", Value::Shared(node.clone()));
        });

        let codec = Codec::default();
        let json = codec.serialize(&Value::Shared(node.clone())).unwrap();
        assert_eq!(json.to_string().matches("\"__ref\"").count(), 1);
        assert_eq!(json["__id"], 0);

        let back = codec.deserialize(&json).unwrap();
        let Value::Shared(rebuilt) = &back else {
            panic!("expected shared node");
        };
        let inner = rebuilt.get();
        assert_eq!(inner.get("name"), Some(&Value::from("root")));
        assert_eq!(inner.get("self"), Some(&back));

        rebuilt.replace(Value::Null);
        node.replace(Value::Null);
    }

    #[test]
    fn shared_without_cycle_is_inlined() {
        let leaf = SharedValue::new(Value::from("leaf"));
        let v = Value::Array(vec![Value::Shared(leaf.clone()), Value::Shared(leaf)]);
        let json = Codec::default().serialize(&v).unwrap();
        assert_eq!(json, json!(["leaf", "leaf"]));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut v = Value::from(1);
        for _ in 0..10 {
            v = Value::Array(vec![v]);
        }
        let codec = Codec::new(5);
        assert_eq!(
            codec.serialize(&v),
            Err(CodecError::DepthExceeded { max_depth: 5 })
        );
        assert_eq!(codec.stats().errors, 1);
    }

    #[test]
    fn dangling_ref_is_rejected() {
        let codec = Codec::default();
        assert_eq!(
            codec.deserialize(&json!({"__ref": 7})),
            Err(CodecError::DanglingRef { id: 7 })
        );
    }

    #[test]
    fn stats_track_sizes() {
        let codec = Codec::default();
        codec.serialize(&Value::from("hello")).unwrap();
        codec.serialize(&Value::Set(vec![Value::from(1)])).unwrap();
        let stats = codec.stats();
        assert_eq!(stats.serialized, 2);
        assert!(stats.bytes_after > 0);
        assert!(stats.compression_ratio() > 0.0);
        assert_eq!(stats.error_rate(), 0.0);
    }
}
