use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Number, Value};

/// Failure to convert a raw looked-up value into its declared type.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot resolve {type_class} from {raw}")]
    Incompatible { type_class: String, raw: String },
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

impl ResolveError {
    fn incompatible(type_class: &str, raw: &Value) -> Self {
        Self::Incompatible {
            type_class: type_class.to_string(),
            raw: raw.to_string(),
        }
    }
}

/// Converts one raw scalar/map into the wire value for a declared type.
pub type ResolveFn =
    Arc<dyn Fn(&str, &[String], Value) -> Result<Value, ResolveError> + Send + Sync>;

/// Type-class keyed resolver set owned by the composition root.
///
/// Lookups fall back to the default resolver, which passes the raw value
/// through unchanged.
pub struct ResolverRegistry {
    by_class: HashMap<String, ResolveFn>,
    fallback: ResolveFn,
}

impl ResolverRegistry {
    /// Registry pre-loaded with resolvers for the JVM scalar and collection
    /// types generic invocation declares.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            by_class: HashMap::new(),
            fallback: Arc::new(|_, _, raw| Ok(raw)),
        };
        for class in ["java.lang.String", "string"] {
            registry.register(class, Arc::new(|tc, _, raw| resolve_string(tc, raw)));
        }
        for class in [
            "java.lang.Integer",
            "java.lang.Long",
            "java.lang.Short",
            "java.lang.Byte",
            "int",
            "long",
            "short",
            "byte",
        ] {
            registry.register(class, Arc::new(|tc, _, raw| resolve_integer(tc, raw)));
        }
        for class in ["java.lang.Float", "java.lang.Double", "float", "double"] {
            registry.register(class, Arc::new(|tc, _, raw| resolve_float(tc, raw)));
        }
        for class in ["java.lang.Boolean", "boolean", "bool"] {
            registry.register(class, Arc::new(|tc, _, raw| resolve_boolean(tc, raw)));
        }
        for class in ["java.util.Map", "java.util.HashMap", "map"] {
            registry.register(class, Arc::new(|tc, _, raw| resolve_map(tc, raw)));
        }
        for class in ["java.util.List", "java.util.ArrayList", "list"] {
            registry.register(class, Arc::new(|_, _, raw| Ok(resolve_list(raw))));
        }
        registry
    }

    pub fn register(&mut self, type_class: &str, resolver: ResolveFn) {
        self.by_class.insert(type_class.to_string(), resolver);
    }

    /// Resolve `raw` for the declared `type_class`, using the default
    /// resolver when no specific one is registered.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the raw value cannot be converted.
    pub fn resolve(
        &self,
        type_class: &str,
        generics: &[String],
        raw: Value,
    ) -> Result<Value, ResolveError> {
        let resolver = self.by_class.get(type_class).unwrap_or(&self.fallback);
        resolver(type_class, generics, raw)
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Strings absorb anything: scalars stringify, maps and lists serialize to
/// JSON text. This is the contract that lets a map-valued attribute ride a
/// declared `java.lang.String` through generic invocation.
fn resolve_string(_type_class: &str, raw: Value) -> Result<Value, ResolveError> {
    let s = match raw {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        composite @ (Value::Object(_) | Value::Array(_)) => serde_json::to_string(&composite)?,
    };
    Ok(Value::String(s))
}

fn resolve_integer(type_class: &str, raw: Value) -> Result<Value, ResolveError> {
    let n = match &raw {
        Value::Null => 0,
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| ResolveError::incompatible(type_class, &raw))?,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ResolveError::incompatible(type_class, &raw))?,
        Value::Bool(b) => i64::from(*b),
        _ => return Err(ResolveError::incompatible(type_class, &raw)),
    };
    Ok(Value::Number(Number::from(n)))
}

fn resolve_float(type_class: &str, raw: Value) -> Result<Value, ResolveError> {
    let f = match &raw {
        Value::Null => 0.0,
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ResolveError::incompatible(type_class, &raw))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ResolveError::incompatible(type_class, &raw))?,
        _ => return Err(ResolveError::incompatible(type_class, &raw)),
    };
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ResolveError::incompatible(type_class, &raw))
}

fn resolve_boolean(type_class: &str, raw: Value) -> Result<Value, ResolveError> {
    let b = match &raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" | "" => false,
            _ => return Err(ResolveError::incompatible(type_class, &raw)),
        },
        _ => return Err(ResolveError::incompatible(type_class, &raw)),
    };
    Ok(Value::Bool(b))
}

/// Maps pass through; JSON text re-parses into a map.
fn resolve_map(type_class: &str, raw: Value) -> Result<Value, ResolveError> {
    match raw {
        Value::Null => Ok(Value::Object(serde_json::Map::new())),
        obj @ Value::Object(_) => Ok(obj),
        Value::String(s) => {
            let parsed: Value = serde_json::from_str(&s)?;
            if parsed.is_object() {
                Ok(parsed)
            } else {
                Err(ResolveError::incompatible(type_class, &Value::String(s)))
            }
        }
        other => Err(ResolveError::incompatible(type_class, &other)),
    }
}

fn resolve_list(raw: Value) -> Value {
    match raw {
        Value::Null => Value::Array(Vec::new()),
        arr @ Value::Array(_) => arr,
        single => Value::Array(vec![single]),
    }
}
