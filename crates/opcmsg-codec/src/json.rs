//! Conversion between [`ParamValue`] and `serde_json::Value`.
//!
//! JSON objects map to structs: the `"@id"` member holds the textual struct
//! id and every other member becomes a field, in document order.

use serde_json::{Map, Number, Value};

use crate::error::{CodecError, Result};
use crate::param_id::ParamId;
use crate::structure::Struct;
use crate::value::{ParamArray, ParamValue};

/// Object key carrying the struct id.
pub const STRUCT_ID_KEY: &str = "@id";

fn unsupported(what: impl Into<String>) -> CodecError {
    CodecError::UnsupportedJson(what.into())
}

fn number_to_value(n: &Number) -> Result<ParamValue> {
    if let Some(i) = n.as_i64() {
        return Ok(match i32::try_from(i) {
            Ok(small) => ParamValue::Int(small),
            Err(_) => ParamValue::Long(i),
        });
    }
    if n.is_u64() {
        return Err(unsupported(format!("integer {n} exceeds 64-bit signed range")));
    }
    n.as_f64()
        .map(ParamValue::Double)
        .ok_or_else(|| unsupported(format!("number {n}")))
}

fn object_to_struct(map: &Map<String, Value>) -> Result<Struct> {
    let mut id = None;
    let mut fields = Vec::with_capacity(map.len());
    for (key, value) in map {
        let key = key.trim();
        if key == STRUCT_ID_KEY {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            id = Some(text.parse::<ParamId>()?);
        } else {
            fields.push((key.to_string(), from_json(value)?));
        }
    }
    let id = id.ok_or_else(|| unsupported(format!("object without \"{STRUCT_ID_KEY}\" member")))?;
    let mut out = Struct::new(id);
    for (name, value) in fields {
        out.push(name, value);
    }
    Ok(out)
}

fn array_to_value(items: &[Value]) -> Result<ParamArray> {
    let Some(first) = items.first() else {
        return Ok(ParamArray::Int(Vec::new()));
    };

    let mixed = || unsupported("array elements must share one type");
    match first {
        Value::Bool(_) => items
            .iter()
            .map(|v| v.as_bool().ok_or_else(mixed))
            .collect::<Result<Vec<_>>>()
            .map(ParamArray::Boolean),
        Value::String(_) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(mixed))
            .collect::<Result<Vec<_>>>()
            .map(ParamArray::String),
        Value::Object(_) => items
            .iter()
            .map(|v| v.as_object().ok_or_else(mixed).and_then(object_to_struct))
            .collect::<Result<Vec<_>>>()
            .map(ParamArray::Struct),
        Value::Number(_) => {
            let numbers = items
                .iter()
                .map(|v| match v {
                    Value::Number(n) => number_to_value(n),
                    _ => Err(mixed()),
                })
                .collect::<Result<Vec<_>>>()?;
            // Widen to the largest kind present.
            if numbers.iter().any(|n| matches!(n, ParamValue::Double(_))) {
                Ok(ParamArray::Double(
                    numbers.iter().filter_map(ParamValue::as_f64_lossy).collect(),
                ))
            } else if numbers.iter().any(|n| matches!(n, ParamValue::Long(_))) {
                Ok(ParamArray::Long(
                    numbers.iter().filter_map(ParamValue::as_i64).collect(),
                ))
            } else {
                Ok(ParamArray::Int(
                    numbers
                        .iter()
                        .filter_map(|n| match n {
                            ParamValue::Int(i) => Some(*i),
                            _ => None,
                        })
                        .collect(),
                ))
            }
        }
        Value::Array(_) => Err(unsupported("nested arrays other than string arrays")),
        Value::Null => Err(unsupported("null array element")),
    }
}

/// Convert a JSON value into a wire value.
pub fn from_json(value: &Value) -> Result<ParamValue> {
    match value {
        Value::Null => Err(unsupported("null")),
        Value::Bool(b) => Ok(ParamValue::Boolean(*b)),
        Value::Number(n) => number_to_value(n),
        Value::String(s) => Ok(ParamValue::String(s.clone())),
        Value::Array(items) => array_to_value(items).map(ParamValue::Array),
        Value::Object(map) => object_to_struct(map).map(ParamValue::Struct),
    }
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// JSON object for a struct, `"@id"` first.
pub fn struct_to_json(s: &Struct) -> Value {
    let mut map = Map::with_capacity(s.fields.len() + 1);
    map.insert(STRUCT_ID_KEY.to_string(), Value::String(s.id.to_string()));
    for field in &s.fields {
        map.insert(field.name.clone(), to_json(&field.value));
    }
    Value::Object(map)
}

/// Convert a wire value into JSON. Non-finite floats become `null`.
pub fn to_json(value: &ParamValue) -> Value {
    match value {
        ParamValue::Boolean(b) => Value::Bool(*b),
        ParamValue::Byte(v) => Value::from(*v),
        ParamValue::Short(v) => Value::from(*v),
        ParamValue::Int(v) => Value::from(*v),
        ParamValue::Long(v) => Value::from(*v),
        ParamValue::Float(v) => float(f64::from(*v)),
        ParamValue::Double(v) => float(*v),
        ParamValue::String(s) => Value::String(s.clone()),
        ParamValue::Struct(s) => struct_to_json(s),
        ParamValue::Array(array) => Value::Array(match array {
            ParamArray::Boolean(v) => v.iter().map(|b| Value::Bool(*b)).collect(),
            ParamArray::Byte(v) => v.iter().map(|x| Value::from(*x)).collect(),
            ParamArray::Short(v) => v.iter().map(|x| Value::from(*x)).collect(),
            ParamArray::Int(v) => v.iter().map(|x| Value::from(*x)).collect(),
            ParamArray::Long(v) => v.iter().map(|x| Value::from(*x)).collect(),
            ParamArray::Float(v) => v.iter().map(|x| float(f64::from(*x))).collect(),
            ParamArray::Double(v) => v.iter().map(|x| float(*x)).collect(),
            ParamArray::String(v) => v.iter().map(|s| Value::String(s.clone())).collect(),
            ParamArray::Struct(v) => v.iter().map(struct_to_json).collect(),
        }),
    }
}

impl ParamValue {
    fn as_f64_lossy(&self) -> Option<f64> {
        self.as_f64().or_else(|| self.as_i64().map(|i| i as f64))
    }
}

impl TryFrom<&Value> for ParamValue {
    type Error = CodecError;

    fn try_from(value: &Value) -> Result<Self> {
        from_json(value)
    }
}

impl From<&ParamValue> for Value {
    fn from(value: &ParamValue) -> Self {
        to_json(value)
    }
}
