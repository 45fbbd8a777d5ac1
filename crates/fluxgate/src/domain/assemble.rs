use fluxgate_sdk::{ArgType, Argument};
use serde_json::Value;
use tracing::warn;

use super::context::GatewayContext;
use super::lookup::lookup_raw;
use super::resolver::{ResolveError, ResolverRegistry};

/// Reserved key naming the wire class of a complex value in generic
/// invocation.
const CLASS_KEY: &str = "class";

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("argument resolve: arg.http={http_name}, class=[{type_class}]: {source}")]
    Resolve {
        http_name: String,
        type_class: String,
        #[source]
        source: ResolveError,
    },
}

/// Assemble the protocol argument tuple `(types, values)` for a generic RPC
/// invocation from the endpoint's declared arguments.
///
/// Types and values stay parallel: each primitive contributes its declared
/// type class and resolved value; each complex argument contributes its
/// class name and a map `{"class": <class>, <field.arg_name>: <value>…}`
/// assembled recursively. Arguments of an unknown kind are skipped with a
/// warning so later arguments keep their positions relative to each other.
///
/// # Errors
///
/// Fails when any resolver rejects its raw value.
pub fn assemble_invocation(
    arguments: &[Argument],
    ctx: &GatewayContext,
    resolvers: &ResolverRegistry,
) -> Result<(Vec<String>, Vec<Value>), AssembleError> {
    let mut types = Vec::with_capacity(arguments.len());
    let mut values = Vec::with_capacity(arguments.len());
    for argument in arguments {
        match argument.arg_type {
            ArgType::Primitive => {
                types.push(argument.type_class.clone());
                values.push(resolve_primitive(argument, ctx, resolvers)?);
            }
            ArgType::Complex => {
                types.push(argument.type_class.clone());
                values.push(assemble_complex(argument, ctx, resolvers)?);
            }
            ArgType::Other => {
                warn!(
                    class = %argument.type_class,
                    arg = %argument.arg_name,
                    "skipping argument of unsupported kind"
                );
            }
        }
    }
    Ok((types, values))
}

/// Assemble top-level arguments as name/value text pairs for HTTP
/// forwarding. Complex values flatten to compact JSON.
///
/// # Errors
///
/// Fails when any resolver rejects its raw value.
pub fn assemble_form(
    arguments: &[Argument],
    ctx: &GatewayContext,
    resolvers: &ResolverRegistry,
) -> Result<Vec<(String, String)>, AssembleError> {
    let mut pairs = Vec::with_capacity(arguments.len());
    for argument in arguments {
        let value = match argument.arg_type {
            ArgType::Primitive => resolve_primitive(argument, ctx, resolvers)?,
            ArgType::Complex => assemble_complex(argument, ctx, resolvers)?,
            ArgType::Other => {
                warn!(
                    class = %argument.type_class,
                    arg = %argument.arg_name,
                    "skipping argument of unsupported kind"
                );
                continue;
            }
        };
        let text = match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        pairs.push((argument.http_name.clone(), text));
    }
    Ok(pairs)
}

fn resolve_primitive(
    argument: &Argument,
    ctx: &GatewayContext,
    resolvers: &ResolverRegistry,
) -> Result<Value, AssembleError> {
    let raw = lookup_raw(argument, ctx);
    resolvers
        .resolve(&argument.type_class, &argument.type_generic, raw)
        .map_err(|source| AssembleError::Resolve {
            http_name: argument.http_name.clone(),
            type_class: argument.type_class.clone(),
            source,
        })
}

fn assemble_complex(
    argument: &Argument,
    ctx: &GatewayContext,
    resolvers: &ResolverRegistry,
) -> Result<Value, AssembleError> {
    let mut object = serde_json::Map::new();
    object.insert(CLASS_KEY.to_string(), Value::String(argument.type_class.clone()));
    for field in &argument.fields {
        let value = match field.arg_type {
            ArgType::Primitive => resolve_primitive(field, ctx, resolvers)?,
            ArgType::Complex => assemble_complex(field, ctx, resolvers)?,
            ArgType::Other => {
                warn!(
                    class = %field.type_class,
                    arg = %field.arg_name,
                    "skipping field of unsupported kind"
                );
                continue;
            }
        };
        // The wire object keys by the upstream field name, not the HTTP
        // binding, so the payload matches the declared class.
        object.insert(field.arg_name.clone(), value);
    }
    Ok(Value::Object(object))
}
