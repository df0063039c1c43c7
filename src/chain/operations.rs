//! Built-in chain operations and the registry that resolves them by name.
//!
//! Every operation has the same shape: it receives the rolling value by
//! ownership plus the step's [`Arguments`] and returns the next value. A null
//! return is legitimate and ends the chain.

use super::errors::{invalid_arguments, type_mismatch, ChainError, ChainResult};
use super::{Arguments, Chain, OperationFn};
use crate::constants::messages::NESTED_ATTRIBUTES_SUFFIX;
use crate::directive::permit::{permit_with_suffix, PermitSchema};
use crate::utils::{is_blank, is_truthy};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

static BUILTINS: OnceLock<OperationRegistry> = OnceLock::new();

/// Name → operation lookup used when chains are built
#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, OperationFn>,
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("OperationRegistry")
            .field("operations", &names)
            .finish()
    }
}

impl OperationRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared registry holding only the built-in operations
    pub fn builtins() -> &'static OperationRegistry {
        BUILTINS.get_or_init(Self::with_builtins)
    }

    /// A fresh registry pre-populated with the built-in operations
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("fetch", fetch);
        registry.register("dig", dig);
        registry.register("to_string", to_string);
        registry.register("to_integer", to_integer);
        registry.register("to_float", to_float);
        registry.register("to_boolean", to_boolean);
        registry.register("to_datetime", to_datetime);
        registry.register("strip", strip);
        registry.register("downcase", downcase);
        registry.register("upcase", upcase);
        registry.register("split", split);
        registry.register("presence", presence);
        registry.register("length", length);
        registry.register("first", first);
        registry.register("last", last);
        registry.register("keys", keys);
        registry.register("compact", compact);
        registry.register("map", map);
        registry.register("select", select);
        registry.register("permit", permit);
        registry
    }

    /// Register (or replace) an operation under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, operation: F) -> &mut Self
    where
        F: Fn(Value, &Arguments) -> ChainResult<Value> + Send + Sync + 'static,
    {
        self.operations.insert(name.into(), Arc::new(operation));
        self
    }

    pub fn resolve(&self, name: &str) -> ChainResult<OperationFn> {
        self.operations
            .get(name)
            .cloned()
            .ok_or_else(|| ChainError::UnknownOperation {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }
}

fn callback<'a>(operation: &str, args: &'a Arguments) -> ChainResult<&'a Chain> {
    args.callback().ok_or_else(|| ChainError::CallbackRequired {
        operation: operation.to_string(),
    })
}

fn index_into(operation: &str, value: &Value, key: &Value) -> ChainResult<Value> {
    match (value, key) {
        (Value::Object(map), Value::String(k)) => Ok(map.get(k).cloned().unwrap_or(Value::Null)),
        (Value::Array(items), Value::Number(n)) => {
            let idx = n
                .as_i64()
                .ok_or_else(|| invalid_arguments(operation, "index must be an integer"))?;
            let len = items.len() as i64;
            let resolved = if idx < 0 { len + idx } else { idx };
            if resolved < 0 || resolved >= len {
                return Ok(Value::Null);
            }
            Ok(items[resolved as usize].clone())
        }
        (Value::Object(_), _) => Err(invalid_arguments(operation, "object keys must be strings")),
        (Value::Array(_), _) => Err(invalid_arguments(operation, "array indices must be integers")),
        (other, _) => Err(type_mismatch(operation, "object or array", other)),
    }
}

/// `fetch(key)`: object member or array element, null when absent
pub fn fetch(value: Value, args: &Arguments) -> ChainResult<Value> {
    match args.positional() {
        [key] => index_into("fetch", &value, key),
        _ => Err(invalid_arguments("fetch", "expected exactly one key")),
    }
}

/// `dig(k1, k2, ...)`: repeated `fetch`, stopping at the first null
pub fn dig(value: Value, args: &Arguments) -> ChainResult<Value> {
    let path = args.positional();
    if path.is_empty() {
        return Err(invalid_arguments("dig", "expected at least one key"));
    }
    let mut current = value;
    for key in path {
        if current.is_null() {
            break;
        }
        current = index_into("dig", &current, key)?;
    }
    Ok(current)
}

pub fn to_string(value: Value, _args: &Arguments) -> ChainResult<Value> {
    match value {
        Value::String(_) => Ok(value),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(type_mismatch("to_string", "scalar", &other)),
    }
}

/// Integer conversion; unparseable strings become null
pub fn to_integer(value: Value, _args: &Arguments) -> ChainResult<Value> {
    match &value {
        Value::Number(n) => match n.as_i64() {
            Some(_) => Ok(value),
            None => Ok(n
                .as_f64()
                .map(|f| Value::from(f.trunc() as i64))
                .unwrap_or(Value::Null)),
        },
        Value::String(s) => Ok(s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::Null)),
        other => Err(type_mismatch("to_integer", "number or string", other)),
    }
}

/// Float conversion; unparseable strings become null
pub fn to_float(value: Value, _args: &Arguments) -> ChainResult<Value> {
    let parsed = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => return Err(type_mismatch("to_float", "number or string", other)),
    };
    Ok(parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null))
}

pub fn to_boolean(value: Value, _args: &Arguments) -> ChainResult<Value> {
    match &value {
        Value::Bool(_) => Ok(value),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => Ok(match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" | "t" => Value::Bool(true),
            "false" | "0" | "no" | "off" | "f" | "" => Value::Bool(false),
            _ => Value::Null,
        }),
        other => Err(type_mismatch("to_boolean", "scalar", other)),
    }
}

/// RFC 3339 timestamps, plain dates, or unix seconds, normalized to UTC
pub fn to_datetime(value: Value, _args: &Arguments) -> ChainResult<Value> {
    let parsed: Option<DateTime<Utc>> = match &value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        other => return Err(type_mismatch("to_datetime", "string or number", other)),
    };
    Ok(parsed
        .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .unwrap_or(Value::Null))
}

fn map_string(operation: &str, value: Value, f: impl Fn(&str) -> String) -> ChainResult<Value> {
    match value {
        Value::String(s) => Ok(Value::String(f(&s))),
        other => Err(type_mismatch(operation, "string", &other)),
    }
}

pub fn strip(value: Value, _args: &Arguments) -> ChainResult<Value> {
    map_string("strip", value, |s| s.trim().to_string())
}

pub fn downcase(value: Value, _args: &Arguments) -> ChainResult<Value> {
    map_string("downcase", value, str::to_lowercase)
}

pub fn upcase(value: Value, _args: &Arguments) -> ChainResult<Value> {
    map_string("upcase", value, str::to_uppercase)
}

/// `split(separator?)`: whitespace split without a separator
pub fn split(value: Value, args: &Arguments) -> ChainResult<Value> {
    let s = match value {
        Value::String(s) => s,
        other => return Err(type_mismatch("split", "string", &other)),
    };
    let parts: Vec<Value> = match args.positional() {
        [] => s.split_whitespace().map(Value::from).collect(),
        [Value::String(sep)] if !sep.is_empty() => s.split(sep.as_str()).map(Value::from).collect(),
        _ => return Err(invalid_arguments("split", "separator must be a non-empty string")),
    };
    Ok(Value::Array(parts))
}

/// Blank values collapse to null so downstream steps are skipped
pub fn presence(value: Value, _args: &Arguments) -> ChainResult<Value> {
    if is_blank(&value) {
        Ok(Value::Null)
    } else {
        Ok(value)
    }
}

pub fn length(value: Value, _args: &Arguments) -> ChainResult<Value> {
    match &value {
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(map) => Ok(Value::from(map.len())),
        other => Err(type_mismatch("length", "string, array or object", other)),
    }
}

pub fn first(value: Value, _args: &Arguments) -> ChainResult<Value> {
    match value {
        Value::Array(items) => Ok(items.into_iter().next().unwrap_or(Value::Null)),
        other => Err(type_mismatch("first", "array", &other)),
    }
}

pub fn last(value: Value, _args: &Arguments) -> ChainResult<Value> {
    match value {
        Value::Array(items) => Ok(items.into_iter().last().unwrap_or(Value::Null)),
        other => Err(type_mismatch("last", "array", &other)),
    }
}

pub fn keys(value: Value, _args: &Arguments) -> ChainResult<Value> {
    match value {
        Value::Object(map) => Ok(Value::Array(map.into_iter().map(|(k, _)| Value::String(k)).collect())),
        other => Err(type_mismatch("keys", "object", &other)),
    }
}

pub fn compact(value: Value, _args: &Arguments) -> ChainResult<Value> {
    match value {
        Value::Array(items) => Ok(Value::Array(
            items.into_iter().filter(|v| !v.is_null()).collect(),
        )),
        Value::Object(map) => Ok(Value::Object(
            map.into_iter().filter(|(_, v)| !v.is_null()).collect::<Map<_, _>>(),
        )),
        other => Err(type_mismatch("compact", "array or object", &other)),
    }
}

/// Apply the callback chain to every element
pub fn map(value: Value, args: &Arguments) -> ChainResult<Value> {
    let chain = callback("map", args)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| chain.apply_owned(item))
            .collect::<ChainResult<Vec<_>>>()
            .map(Value::Array),
        other => Err(type_mismatch("map", "array", &other)),
    }
}

/// Keep the elements whose callback result is truthy
pub fn select(value: Value, args: &Arguments) -> ChainResult<Value> {
    let chain = callback("select", args)?;
    match value {
        Value::Array(items) => {
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                if is_truthy(&chain.apply(&item)?) {
                    kept.push(item);
                }
            }
            Ok(Value::Array(kept))
        }
        other => Err(type_mismatch("select", "array", &other)),
    }
}

/// Whitelist filtering with Rails-style field lists
pub fn permit(value: Value, args: &Arguments) -> ChainResult<Value> {
    let schema = PermitSchema::from_values(args.positional())
        .map_err(|reason| invalid_arguments("permit", reason))?;
    match &value {
        Value::Object(_) => Ok(permit_with_suffix(&value, &schema, NESTED_ATTRIBUTES_SUFFIX)),
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| permit_with_suffix(item, &schema, NESTED_ATTRIBUTES_SUFFIX))
                .collect(),
        )),
        other => Err(type_mismatch("permit", "object or array", other)),
    }
}
