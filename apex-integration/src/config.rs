use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or querying application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {error}")]
    Io {
        path: String,
        error: std::io::Error,
    },

    #[error("cannot parse config file {path}: {error}")]
    Parse {
        path: String,
        error: serde_json::Error,
    },

    #[error("config field missing: {0}")]
    MissingField(String),

    #[error("config field {path} has wrong type, expected {expected}")]
    WrongType { path: String, expected: &'static str },
}

/// Application configuration: a thin query wrapper around a JSON document.
///
/// String values support `${VAR}` environment-variable interpolation; an unset variable
/// interpolates to the empty string.
#[derive(Debug, Clone, Default)]
pub struct Config {
    raw: Value,
    /// Dotted path from the document root, used in error messages.
    path: String,
}

impl Config {
    pub fn new(raw: Value) -> Self {
        Self {
            raw,
            path: String::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.display().to_string(),
            error,
        })?;
        let raw = serde_json::from_str(&text).map_err(|error| ConfigError::Parse {
            path: path.display().to_string(),
            error,
        })?;
        Ok(Self::new(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_null()
    }

    pub fn is_array(&self) -> bool {
        self.raw.is_array()
    }

    fn field_path(&self, field: &str) -> String {
        if self.path.is_empty() {
            field.to_string()
        } else {
            format!("{}.{field}", self.path)
        }
    }

    fn find(&self, field: &str) -> Result<&Value, ConfigError> {
        self.raw
            .get(field)
            .ok_or_else(|| ConfigError::MissingField(self.field_path(field)))
    }

    pub fn get_string(&self, field: &str) -> Result<String, ConfigError> {
        match self.find(field)? {
            Value::String(s) => Ok(interpolate_env(s)),
            _ => Err(ConfigError::WrongType {
                path: self.field_path(field),
                expected: "string",
            }),
        }
    }

    pub fn get_string_or(&self, field: &str, default: &str) -> String {
        match self.get_string(field) {
            Ok(value) => value,
            Err(_) => default.to_string(),
        }
    }

    pub fn get_bool(&self, field: &str) -> Result<bool, ConfigError> {
        match self.find(field)? {
            Value::Bool(b) => Ok(*b),
            _ => Err(ConfigError::WrongType {
                path: self.field_path(field),
                expected: "bool",
            }),
        }
    }

    pub fn get_bool_or(&self, field: &str, default: bool) -> bool {
        self.get_bool(field).unwrap_or(default)
    }

    pub fn get_uint(&self, field: &str) -> Result<u64, ConfigError> {
        match self.find(field)? {
            Value::Number(n) => n.as_u64().ok_or_else(|| ConfigError::WrongType {
                path: self.field_path(field),
                expected: "unsigned integer",
            }),
            _ => Err(ConfigError::WrongType {
                path: self.field_path(field),
                expected: "unsigned integer",
            }),
        }
    }

    pub fn get_uint_or(&self, field: &str, default: u64) -> u64 {
        self.get_uint(field).unwrap_or(default)
    }

    pub fn sub_config(&self, field: &str) -> Result<Config, ConfigError> {
        let value = self.find(field)?;
        if !value.is_object() && !value.is_array() {
            return Err(ConfigError::WrongType {
                path: self.field_path(field),
                expected: "object or array",
            });
        }
        Ok(Config {
            raw: value.clone(),
            path: self.field_path(field),
        })
    }

    pub fn sub_config_or_empty(&self, field: &str) -> Config {
        self.sub_config(field).unwrap_or_else(|_| Config::empty())
    }

    pub fn array_len(&self) -> usize {
        self.raw.as_array().map(Vec::len).unwrap_or(0)
    }

    pub fn array_item(&self, index: usize) -> Result<Config, ConfigError> {
        let items = self.raw.as_array().ok_or_else(|| ConfigError::WrongType {
            path: self.path.clone(),
            expected: "array",
        })?;
        let value = items
            .get(index)
            .ok_or_else(|| ConfigError::MissingField(format!("{}[{index}]", self.path)))?;
        Ok(Config {
            raw: value.clone(),
            path: format!("{}[{index}]", self.path),
        })
    }
}

/// Replace every `${VAR}` occurrence with the environment variable's value, or the empty
/// string when unset.
fn interpolate_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let var = &rest[start + 2..start + 2 + end];
                if let Ok(value) = std::env::var(var) {
                    out.push_str(&value);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                // unterminated: emit the remainder verbatim
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_env_interpolation_set_and_unset() {
        std::env::set_var("APEX_CONFIG_TEST_VAR", "foo");
        std::env::remove_var("APEX_CONFIG_TEST_UNSET");

        let config = Config::new(json!({
            "set": "${APEX_CONFIG_TEST_VAR}",
            "unset": "${APEX_CONFIG_TEST_UNSET}",
            "mixed": "pre-${APEX_CONFIG_TEST_VAR}-post",
            "plain": "no-vars",
        }));

        assert_eq!(config.get_string("set").unwrap(), "foo");
        assert_eq!(config.get_string("unset").unwrap(), "");
        assert_eq!(config.get_string("mixed").unwrap(), "pre-foo-post");
        assert_eq!(config.get_string("plain").unwrap(), "no-vars");
    }

    #[test]
    fn test_missing_field_carries_path() {
        let config = Config::new(json!({"services": {"gateways": []}}));
        let services = config.sub_config("services").unwrap();

        let error = services.get_string("missing").unwrap_err();
        assert!(matches!(error, ConfigError::MissingField(ref path) if path == "services.missing"));
    }

    #[test]
    fn test_typed_getters_and_defaults() {
        let config = Config::new(json!({
            "port": 4080,
            "enabled": true,
            "name": "apex",
        }));

        assert_eq!(config.get_uint("port").unwrap(), 4080);
        assert!(config.get_bool("enabled").unwrap());
        assert_eq!(config.get_uint_or("other_port", 9), 9);
        assert!(!config.get_bool_or("missing", false));
        assert!(config.get_string("port").is_err());
    }

    #[test]
    fn test_array_access() {
        let config = Config::new(json!({
            "exchanges": [
                {"type": "binance"},
                {"type": "simulated"},
            ]
        }));

        let exchanges = config.sub_config("exchanges").unwrap();
        assert!(exchanges.is_array());
        assert_eq!(exchanges.array_len(), 2);
        assert_eq!(
            exchanges.array_item(1).unwrap().get_string("type").unwrap(),
            "simulated"
        );
        assert!(exchanges.array_item(2).is_err());
    }
}
