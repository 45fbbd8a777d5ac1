use fluxgate_sdk::{Argument, HttpScope};
use serde_json::Value;

use super::context::GatewayContext;

/// Extract the raw value for one argument from the request by scope.
///
/// Direct scopes return whatever the source holds (`Null` when absent).
/// `Param` and `Auto` treat the empty string as absent and fall through to
/// the next source; `Auto`'s final attribute step accepts any non-null
/// attribute value regardless of type.
#[must_use]
pub fn lookup_raw(arg: &Argument, ctx: &GatewayContext) -> Value {
    let request = ctx.request();
    let name = arg.http_name.as_str();
    match arg.http_scope {
        HttpScope::Query => opt_string(request.query_value(name)),
        HttpScope::Path => opt_string(request.path_value(name)),
        HttpScope::Form => opt_string(request.form_value(name)),
        HttpScope::Header => opt_string(request.header(name)),
        HttpScope::Param => match non_empty(request.query_value(name)) {
            Some(v) => Value::String(v),
            None => opt_string(request.form_value(name)),
        },
        HttpScope::Attr => ctx.attribute(name).cloned().unwrap_or(Value::Null),
        HttpScope::Attrs => {
            let map: serde_json::Map<String, Value> = ctx
                .attributes()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(map)
        }
        HttpScope::Auto => {
            if let Some(v) = non_empty(request.path_value(name)) {
                Value::String(v)
            } else if let Some(v) = non_empty(request.query_value(name)) {
                Value::String(v)
            } else if let Some(v) = non_empty(request.form_value(name)) {
                Value::String(v)
            } else if let Some(v) = non_empty(request.header(name)) {
                Value::String(v)
            } else if let Some(v) = ctx.attribute(name)
                && !v.is_null()
            {
                v.clone()
            } else {
                Value::Null
            }
        }
    }
}

fn opt_string(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
