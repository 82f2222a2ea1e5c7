//! Body converters.
//!
//! A converter turns response bodies into typed values and typed values
//! into request bodies. The configured [`ConverterMode`] maps onto a small
//! closed set of formats; anything else goes through a caller-supplied
//! [`BodyConverter`].

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ConverterMode;
use crate::error::{ConfigError, DecodeError};

/// A caller-supplied converter.
///
/// Works on [`serde_json::Value`] so it can serve any typed call.
pub trait BodyConverter: Send + Sync {
    /// Converter name, used in logs.
    fn name(&self) -> &str;

    /// Content type of encoded bodies.
    fn content_type(&self) -> &'static str;

    /// Decodes a response body.
    fn decode(&self, body: &[u8]) -> Result<Value, DecodeError>;

    /// Encodes a request body.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, DecodeError>;
}

/// The converter attached to a client.
#[derive(Clone)]
pub enum Converter {
    /// JSON bodies.
    Json,
    /// Plain-text scalar bodies.
    Text,
    /// XML bodies.
    Xml,
    /// JSON bodies where an empty body decodes as `null`.
    Optional,
    /// Caller-supplied converter.
    Custom(Arc<dyn BodyConverter>),
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => f.write_str("Json"),
            Self::Text => f.write_str("Text"),
            Self::Xml => f.write_str("Xml"),
            Self::Optional => f.write_str("Optional"),
            Self::Custom(c) => f.debug_tuple("Custom").field(&c.name()).finish(),
        }
    }
}

impl Converter {
    /// Selects the converter for `mode`.
    ///
    /// Protocol-buffer modes have no built-in codec and, like
    /// [`ConverterMode::Custom`], require `custom`.
    pub fn select(
        mode: Option<ConverterMode>,
        custom: Option<&Arc<dyn BodyConverter>>,
    ) -> Result<Self, ConfigError> {
        let mode = mode.ok_or(ConfigError::MissingConverterMode)?;
        let converter = match mode {
            ConverterMode::Gson | ConverterMode::Jackson | ConverterMode::Moshi => Self::Json,
            ConverterMode::Scalars => Self::Text,
            ConverterMode::SimpleXml | ConverterMode::Jaxb => Self::Xml,
            ConverterMode::Java8 | ConverterMode::Guava => Self::Optional,
            ConverterMode::Wire | ConverterMode::Protobuf | ConverterMode::Custom => {
                let custom = custom.ok_or_else(|| ConfigError::MissingCustomConverter(mode.to_string()))?;
                Self::Custom(Arc::clone(custom))
            }
        };
        Ok(converter)
    }

    /// Content type of encoded bodies.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json | Self::Optional => "application/json; charset=utf-8",
            Self::Text => "text/plain; charset=utf-8",
            Self::Xml => "application/xml; charset=utf-8",
            Self::Custom(c) => c.content_type(),
        }
    }

    /// Decodes a response body into `T`.
    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, DecodeError> {
        match self {
            Self::Json => Ok(serde_json::from_slice(body)?),
            Self::Optional => {
                if body.iter().all(u8::is_ascii_whitespace) {
                    Ok(serde_json::from_value(Value::Null)?)
                } else {
                    Ok(serde_json::from_slice(body)?)
                }
            }
            Self::Text => {
                let text = std::str::from_utf8(body).map_err(|_| DecodeError::NotText)?;
                Ok(serde_json::from_value(Value::String(text.to_string()))?)
            }
            Self::Xml => {
                let text = std::str::from_utf8(body).map_err(|_| DecodeError::NotText)?;
                Ok(quick_xml::de::from_str(text)?)
            }
            Self::Custom(c) => Ok(serde_json::from_value(c.decode(body)?)?),
        }
    }

    /// Encodes `value` as a request body.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, DecodeError> {
        match self {
            Self::Json | Self::Optional => Ok(serde_json::to_vec(value)?),
            Self::Text => match serde_json::to_value(value)? {
                Value::String(s) => Ok(s.into_bytes()),
                v @ (Value::Number(_) | Value::Bool(_)) => Ok(v.to_string().into_bytes()),
                other => Err(DecodeError::Mismatch(format!(
                    "cannot send {} as plain text",
                    value_kind(&other)
                ))),
            },
            Self::Xml => quick_xml::se::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| DecodeError::Mismatch(e.to_string())),
            Self::Custom(c) => c.encode(&serde_json::to_value(value)?),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
