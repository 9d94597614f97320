use serde_json::json;

use crate::ingest::IngestError;
use crate::store::{StoreError, ValidationError};
use crate::workbook::DecodeError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// A failed request, carried until it is turned into a response line.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ValidationError> for HandlerErr {
    fn from(e: ValidationError) -> Self {
        HandlerErr::new("bad_params", e.to_string())
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        HandlerErr::new("db_failed", e.to_string())
    }
}

impl From<DecodeError> for HandlerErr {
    fn from(e: DecodeError) -> Self {
        HandlerErr::new("decode_failed", e.to_string())
    }
}

impl From<IngestError> for HandlerErr {
    fn from(e: IngestError) -> Self {
        let message = e.to_string();
        match e {
            IngestError::Decode(d) => d.into(),
            IngestError::Store(s) => s.into(),
            IngestError::NoValidData { header_row } => HandlerErr {
                code: "no_valid_data",
                message,
                details: Some(json!({ "headerRow": header_row })),
            },
        }
    }
}
