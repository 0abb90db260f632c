//! SerDe helpers for venue payloads.

use serde::{Deserialize, Deserializer};

/// Deserialize a value that arrives as a string, eg/ `"42000.5"` into an `f64`.
pub fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: &str = Deserialize::deserialize(deserializer)?;
    raw.parse::<T>().map_err(serde::de::Error::custom)
}

/// Deserialize an optional string-encoded value; empty string maps to `None`.
pub fn de_str_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<&str> = Deserialize::deserialize(deserializer)?;
    match raw {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        #[serde(deserialize_with = "de_str")]
        price: f64,
        #[serde(default, deserialize_with = "de_str_opt")]
        qty: Option<f64>,
    }

    #[test]
    fn test_de_str() {
        let payload: Payload = serde_json::from_str(r#"{"price":"42000.5","qty":"1.5"}"#).unwrap();
        assert_eq!(payload.price, 42000.5);
        assert_eq!(payload.qty, Some(1.5));

        let payload: Payload = serde_json::from_str(r#"{"price":"1","qty":""}"#).unwrap();
        assert_eq!(payload.qty, None);

        assert!(serde_json::from_str::<Payload>(r#"{"price":"abc"}"#).is_err());
    }
}
