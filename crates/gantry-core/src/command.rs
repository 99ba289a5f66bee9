//! Positional command arguments
//!
//! Commands receive their arguments as a list of JSON values. Values coming
//! from a query string arrive as strings, so typed accessors fall back to
//! parsing a string argument as JSON (`"1"` reads as the number 1).

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

/// Read argument `index` of `command` as `T`
pub fn arg<T: DeserializeOwned>(command: &str, args: &[Value], index: usize) -> Result<T> {
    let value = args.get(index).ok_or_else(|| Error::InvalidArgument {
        command: command.to_string(),
        index,
        reason: "missing".to_string(),
    })?;
    coerce(command, value, index)
}

/// Like [`arg`] but absent arguments read as `None`
pub fn optional_arg<T: DeserializeOwned>(
    command: &str,
    args: &[Value],
    index: usize,
) -> Result<Option<T>> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce(command, value, index).map(Some),
    }
}

fn coerce<T: DeserializeOwned>(command: &str, value: &Value, index: usize) -> Result<T> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(v) => Ok(v),
        Err(first) => {
            if let Value::String(s) = value {
                if let Ok(v) = serde_json::from_str::<T>(s) {
                    return Ok(v);
                }
            }
            Err(Error::InvalidArgument {
                command: command.to_string(),
                index,
                reason: first.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arg_native_and_string_forms() {
        let args = vec![json!(90), json!("180"), json!("fast")];
        assert_eq!(arg::<i64>("roll", &args, 0).unwrap(), 90);
        assert_eq!(arg::<i64>("roll", &args, 1).unwrap(), 180);
        assert_eq!(arg::<String>("roll", &args, 2).unwrap(), "fast");
    }

    #[test]
    fn test_arg_errors() {
        let args = vec![json!("fast")];
        let err = arg::<i64>("roll", &args, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { index: 0, .. }));

        let err = arg::<i64>("roll", &args, 3).unwrap_err();
        assert_eq!(err.to_string(), "Invalid argument 3 for 'roll': missing");
    }

    #[test]
    fn test_optional_arg() {
        let args = vec![json!(null), json!("2")];
        assert_eq!(optional_arg::<u8>("speed", &args, 0).unwrap(), None);
        assert_eq!(optional_arg::<u8>("speed", &args, 1).unwrap(), Some(2));
        assert_eq!(optional_arg::<u8>("speed", &args, 2).unwrap(), None);
    }
}
