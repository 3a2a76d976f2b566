use std::collections::{BTreeMap, HashMap};

use serde_json::{Map as JsonMap, Value as Json};

use super::{tag, DATA_KEY, ID_KEY, REF_KEY, TYPE_KEY};
use crate::error::CodecError;
use crate::value::{DomDescriptor, ErrorValue, FunctionDescriptor, Map, SharedValue, Value};

/// One deserialization pass. `refs` maps envelope ids to rebuilt nodes.
pub(super) struct Decoder {
    max_depth: usize,
    refs: HashMap<u64, SharedValue>,
}

impl Decoder {
    pub(super) fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            refs: HashMap::new(),
        }
    }

    pub(super) fn run(mut self, json: &Json) -> Result<Value, CodecError> {
        self.decode(json, 0)
    }

    fn decode(&mut self, json: &Json, depth: usize) -> Result<Value, CodecError> {
        if depth > self.max_depth {
            return Err(CodecError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.decode(v, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Json::Object(map) => {
                if let Some(id) = map.get(REF_KEY) {
                    let id = as_id(id)?;
                    let node = self
                        .refs
                        .get(&id)
                        .cloned()
                        .ok_or(CodecError::DanglingRef { id })?;
                    return Ok(Value::Shared(node));
                }
                if let Some(id) = map.get(ID_KEY) {
                    let id = as_id(id)?;
                    let data = map
                        .get(DATA_KEY)
                        .ok_or_else(|| CodecError::malformed("__id without __data"))?;
                    // Registered before decoding so that inner refs resolve.
                    let node = SharedValue::new(Value::Null);
                    self.refs.insert(id, node.clone());
                    let inner = self.decode(data, depth)?;
                    node.replace(inner);
                    return Ok(Value::Shared(node));
                }
                if let Some(t) = map.get(TYPE_KEY) {
                    let t = t
                        .as_str()
                        .ok_or_else(|| CodecError::malformed("__type is not a string"))?;
                    let data = map
                        .get(DATA_KEY)
                        .ok_or_else(|| CodecError::malformed("__type without __data"))?;
                    return self.decode_tagged(t, data, depth);
                }
                Value::Object(self.decode_fields(map, depth + 1)?)
            }
        })
    }

    fn decode_fields(&mut self, map: &JsonMap<String, Json>, depth: usize) -> Result<Map, CodecError> {
        let mut out = Map::new();
        for (k, v) in map {
            out.insert(k.clone(), self.decode(v, depth)?);
        }
        Ok(out)
    }

    fn decode_tagged(&mut self, t: &str, data: &Json, depth: usize) -> Result<Value, CodecError> {
        match t {
            tag::OBJECT | tag::AST => {
                let map = data
                    .as_object()
                    .ok_or_else(|| CodecError::malformed(format!("{t} data is not an object")))?;
                Ok(Value::Object(self.decode_fields(map, depth + 1)?))
            }
            tag::COLLECTION => self.decode_collection(data, depth),
            tag::ERROR => self.decode_error(data, depth),
            tag::FUNCTION => Ok(Value::Function(FunctionDescriptor {
                name: str_field(data, "name"),
                source: str_field(data, "source"),
                is_async: bool_field(data, "isAsync"),
                is_arrow: bool_field(data, "isArrow"),
                length: data
                    .get("length")
                    .and_then(Json::as_u64)
                    .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX)),
            })),
            tag::DOM => {
                let attributes: BTreeMap<String, String> = data
                    .get("attributes")
                    .and_then(Json::as_object)
                    .map(|attrs| {
                        attrs
                            .iter()
                            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_owned())))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Value::Dom(DomDescriptor {
                    tag_name: str_field(data, "tagName"),
                    id: str_field(data, "id"),
                    class_name: str_field(data, "className"),
                    text_content: str_field(data, "textContent"),
                    attributes,
                }))
            }
            other => Err(CodecError::malformed(format!("unknown tag {other:?}"))),
        }
    }

    fn decode_collection(&mut self, data: &Json, depth: usize) -> Result<Value, CodecError> {
        match data.get("kind").and_then(Json::as_str) {
            Some("map") => {
                let entries = data
                    .get("entries")
                    .and_then(Json::as_array)
                    .ok_or_else(|| CodecError::malformed("map without entries"))?;
                let mut out = Vec::with_capacity(entries.len());
                for pair in entries {
                    match pair.as_array().map(Vec::as_slice) {
                        Some([k, v]) => {
                            out.push((self.decode(k, depth + 1)?, self.decode(v, depth + 1)?))
                        }
                        _ => return Err(CodecError::malformed("map entry is not a pair")),
                    }
                }
                Ok(Value::Map(out))
            }
            Some("set") => {
                let values = data
                    .get("values")
                    .and_then(Json::as_array)
                    .ok_or_else(|| CodecError::malformed("set without values"))?;
                Ok(Value::Set(
                    values
                        .iter()
                        .map(|v| self.decode(v, depth + 1))
                        .collect::<Result<_, _>>()?,
                ))
            }
            _ => Err(CodecError::malformed("collection without a known kind")),
        }
    }

    fn decode_error(&mut self, data: &Json, depth: usize) -> Result<Value, CodecError> {
        let cause = match data.get("cause") {
            None | Some(Json::Null) => None,
            Some(c) => Some(Box::new(self.decode(c, depth + 1)?)),
        };
        let extras = match data.get("extras").and_then(Json::as_object) {
            Some(map) => self.decode_fields(map, depth + 1)?,
            None => Map::new(),
        };
        Ok(Value::Error(ErrorValue {
            name: str_field(data, "name"),
            message: str_field(data, "message"),
            stack: data.get("stack").and_then(Json::as_str).map(str::to_owned),
            cause,
            extras,
        }))
    }
}

fn as_id(v: &Json) -> Result<u64, CodecError> {
    v.as_u64()
        .ok_or_else(|| CodecError::malformed("reference id is not an unsigned integer"))
}

fn str_field(data: &Json, key: &str) -> String {
    data.get(key)
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn bool_field(data: &Json, key: &str) -> bool {
    data.get(key).and_then(Json::as_bool).unwrap_or(false)
}
