//! Payload helpers applied by callers before [`Session::send`](crate::Session::send).

use serde_json::{Map, Value};

/// Drop `null` members from an object, recursing into nested objects.
///
/// Nested objects that are (or become) empty are removed as well. Arrays and
/// scalars are left untouched, as is a top-level value that is not an object.
pub fn remove_none(value: &mut Value) {
    if let Value::Object(map) = value {
        strip_object(map);
    }
}

fn strip_object(map: &mut Map<String, Value>) {
    map.retain(|_, member| match member {
        Value::Null => false,
        Value::Object(inner) => {
            strip_object(inner);
            !inner.is_empty()
        }
        _ => true,
    });
}
