use std::collections::{HashMap, HashSet};

use serde_json::{json, Map as JsonMap, Value as Json};

use super::{tag, Codec, DATA_KEY, ID_KEY, REF_KEY, RESERVED_KEYS, TYPE_KEY};
use crate::error::CodecError;
use crate::value::{DomDescriptor, ErrorValue, FunctionDescriptor, Map, SharedValue, Value};

/// One serialization pass. Holds the visited-set for the duration of a call.
pub(super) struct Encoder<'a> {
    codec: &'a Codec,
    /// Shared nodes that are re-entered while on the stack.
    targets: HashSet<usize>,
    /// Shared nodes on the current path, with their id if they are targets.
    on_stack: HashMap<usize, Option<u64>>,
    next_id: u64,
}

impl<'a> Encoder<'a> {
    pub(super) fn new(codec: &'a Codec) -> Self {
        Self {
            codec,
            targets: HashSet::new(),
            on_stack: HashMap::new(),
            next_id: 0,
        }
    }

    pub(super) fn run(mut self, value: &Value) -> Result<Json, CodecError> {
        let mut path = HashSet::new();
        let mut done = HashSet::new();
        self.find_cycles(value, 0, &mut path, &mut done)?;
        self.encode(value, 0)
    }

    fn find_cycles(
        &mut self,
        value: &Value,
        depth: usize,
        path: &mut HashSet<usize>,
        done: &mut HashSet<usize>,
    ) -> Result<(), CodecError> {
        self.check_depth(depth)?;
        match value {
            Value::Array(items) | Value::Set(items) => {
                for item in items {
                    self.find_cycles(item, depth + 1, path, done)?;
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    self.find_cycles(item, depth + 1, path, done)?;
                }
            }
            Value::Map(entries) => {
                for (k, v) in entries {
                    self.find_cycles(k, depth + 1, path, done)?;
                    self.find_cycles(v, depth + 1, path, done)?;
                }
            }
            Value::Error(e) => {
                if let Some(cause) = &e.cause {
                    self.find_cycles(cause, depth + 1, path, done)?;
                }
                for item in e.extras.values() {
                    self.find_cycles(item, depth + 1, path, done)?;
                }
            }
            Value::Shared(node) => {
                let addr = node.addr();
                if path.contains(&addr) {
                    self.targets.insert(addr);
                    return Ok(());
                }
                if done.contains(&addr) {
                    return Ok(());
                }
                path.insert(addr);
                let res = node.with(|inner| self.find_cycles(inner, depth, path, done));
                path.remove(&addr);
                done.insert(addr);
                res?;
            }
            Value::Null
            | Value::Bool(_)
            | Value::Number(_)
            | Value::String(_)
            | Value::Function(_)
            | Value::Dom(_) => {}
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<(), CodecError> {
        if depth > self.codec.max_depth {
            Err(CodecError::DepthExceeded {
                max_depth: self.codec.max_depth,
            })
        } else {
            Ok(())
        }
    }

    fn encode(&mut self, value: &Value, depth: usize) -> Result<Json, CodecError> {
        self.check_depth(depth)?;
        let out = match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|v| self.encode(v, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let fields = self.encode_fields(map, depth + 1)?;
                if is_ast(map) {
                    tagged(tag::AST, Json::Object(fields))
                } else if map.keys().any(|k| RESERVED_KEYS.contains(&k.as_str())) {
                    tagged(tag::OBJECT, Json::Object(fields))
                } else {
                    Json::Object(fields)
                }
            }
            Value::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let k = self.encode(k, depth + 1)?;
                    let v = self.encode(v, depth + 1)?;
                    pairs.push(Json::Array(vec![k, v]));
                }
                tagged(tag::COLLECTION, json!({"kind": "map", "entries": pairs}))
            }
            Value::Set(items) => {
                let values = items
                    .iter()
                    .map(|v| self.encode(v, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                tagged(tag::COLLECTION, json!({"kind": "set", "values": values}))
            }
            Value::Error(e) => self.encode_error(e, depth)?,
            Value::Function(f) => self.encode_function(f),
            Value::Dom(d) => self.encode_dom(d),
            Value::Shared(node) => self.encode_shared(node, depth)?,
        };
        Ok(out)
    }

    fn encode_fields(&mut self, map: &Map, depth: usize) -> Result<JsonMap<String, Json>, CodecError> {
        let mut out = JsonMap::new();
        for (k, v) in map {
            out.insert(k.clone(), self.encode(v, depth)?);
        }
        Ok(out)
    }

    fn encode_error(&mut self, e: &ErrorValue, depth: usize) -> Result<Json, CodecError> {
        let cause = match &e.cause {
            Some(c) => self.encode(c, depth + 1)?,
            None => Json::Null,
        };
        let extras = self.encode_fields(&e.extras, depth + 1)?;
        Ok(tagged(
            tag::ERROR,
            json!({
                "name": e.name,
                "message": e.message,
                "stack": e.stack,
                "cause": cause,
                "extras": extras,
            }),
        ))
    }

    fn encode_function(&self, f: &FunctionDescriptor) -> Json {
        tagged(
            tag::FUNCTION,
            json!({
                "name": f.name,
                "source": truncate(&f.source, self.codec.function_source_limit),
                "isAsync": f.is_async,
                "isArrow": f.is_arrow,
                "length": f.length,
            }),
        )
    }

    fn encode_dom(&self, d: &DomDescriptor) -> Json {
        tagged(
            tag::DOM,
            json!({
                "tagName": d.tag_name,
                "id": d.id,
                "className": d.class_name,
                "textContent": truncate(&d.text_content, self.codec.dom_text_limit),
                "attributes": d.attributes,
            }),
        )
    }

    fn encode_shared(&mut self, node: &SharedValue, depth: usize) -> Result<Json, CodecError> {
        let addr = node.addr();
        if let Some(id) = self.on_stack.get(&addr) {
            // Only targets are re-entered, so the id is always assigned here.
            return match id {
                Some(id) => Ok(json!({ REF_KEY: id })),
                None => Err(CodecError::malformed("re-entered shared node without id")),
            };
        }

        let id = if self.targets.contains(&addr) {
            let id = self.next_id;
            self.next_id += 1;
            Some(id)
        } else {
            None
        };

        self.on_stack.insert(addr, id);
        let inner = node.with(|v| self.encode(v, depth));
        self.on_stack.remove(&addr);
        let inner = inner?;

        Ok(match id {
            Some(id) => json!({ ID_KEY: id, DATA_KEY: inner }),
            None => inner,
        })
    }
}

fn tagged(tag: &str, data: Json) -> Json {
    json!({ TYPE_KEY: tag, DATA_KEY: data })
}

fn is_ast(map: &Map) -> bool {
    matches!(map.get("type"), Some(Value::String(_)))
        && ["children", "properties", "value"]
            .iter()
            .any(|k| map.contains_key(*k))
}

fn truncate(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
