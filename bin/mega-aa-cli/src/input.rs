//! Loading of JSON inputs.

use std::{fs, io::Read, path::Path};

use mega_aa::{EntryPointConfig, UserOperation};
use serde_json::Value;

use crate::{CliError, Result};

/// Reads a JSON document from an inline argument or a file. A dash (-) as file reads stdin.
/// Priority: arg > file.
pub fn load_json(arg: Option<&str>, file: Option<&Path>) -> Result<Value> {
    let json = match (arg, file) {
        (Some(arg), _) => arg.to_string(),
        (None, Some(file)) if file == Path::new("-") => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        (None, Some(file)) => fs::read_to_string(file)?,
        (None, None) => {
            return Err(CliError::InvalidInput("expected --op or --op.file".to_string()));
        }
    };
    Ok(serde_json::from_str(&json)?)
}

/// Parses a user operation. Missing fields default to zero.
pub fn parse_user_op(value: Value) -> Result<UserOperation> {
    let Value::Object(mut fields) = value else {
        return Err(CliError::InvalidInput("user operation must be a JSON object".to_string()));
    };
    let defaults = serde_json::to_value(UserOperation::default())?;
    if let Value::Object(defaults) = defaults {
        for (key, value) in defaults {
            fields.entry(key).or_insert(value);
        }
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Loads an entry point configuration file. Missing fields take their default values.
pub fn load_config(path: &Path) -> Result<EntryPointConfig> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}
