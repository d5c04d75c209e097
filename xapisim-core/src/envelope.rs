//! The uniform result envelope returned for every dispatched call.

use serde::Serialize;

use crate::error::ApiError;
use crate::value::{Record, Value};

/// `{Status: Success, Value}` or `{Status: Failure, ErrorDescription}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Status")]
pub enum Envelope {
    Success {
        #[serde(rename = "Value")]
        value: Value,
    },
    Failure {
        #[serde(rename = "ErrorDescription")]
        error_description: Vec<String>,
    },
}

impl Envelope {
    /// Wrap a return value; operations without one report `""`.
    pub fn success(value: Option<Value>) -> Self {
        Envelope::Success {
            value: value.unwrap_or_else(Value::empty),
        }
    }

    pub fn failure(err: &ApiError) -> Self {
        Envelope::Failure {
            error_description: err.error_description(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    /// Error code of a failure envelope.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Envelope::Success { .. } => None,
            Envelope::Failure { error_description } => {
                error_description.first().map(String::as_str)
            }
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Envelope::Success { value } => Some(value),
            Envelope::Failure { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Envelope::Success { value } => Some(value),
            Envelope::Failure { .. } => None,
        }
    }

    /// The envelope as an XML-RPC struct, the shape a transport puts on the wire.
    pub fn into_struct(self) -> Value {
        let mut fields = Record::new();
        match self {
            Envelope::Success { value } => {
                fields.insert("Status".to_string(), Value::from("Success"));
                fields.insert("Value".to_string(), value);
            }
            Envelope::Failure { error_description } => {
                fields.insert("Status".to_string(), Value::from("Failure"));
                fields.insert(
                    "ErrorDescription".to_string(),
                    Value::string_list(error_description),
                );
            }
        }
        Value::Struct(fields)
    }
}

impl From<Result<Option<Value>, ApiError>> for Envelope {
    fn from(result: Result<Option<Value>, ApiError>) -> Self {
        match result {
            Ok(value) => Envelope::success(value),
            Err(err) => Envelope::failure(&err),
        }
    }
}
