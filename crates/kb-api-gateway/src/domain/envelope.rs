//! Call and reply envelopes plus their stream codec.
//!
//! A caller writes one or more JSON call objects back to back; the gateway
//! answers each with one reply object terminated by a newline.

use crate::domain::error::{ApiError, DecodeError, GatewayError};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Deserializer, StreamDeserializer};
use std::io::Read;

/// The only API version that exists
pub const API_VERSION: u32 = 1;

/// Inbound call envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct Call {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: Params,
}

/// Versioned options carried by a call. Options stay raw until the method
/// (and with it the options type) is known.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Params {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Box<RawValue>>,
}

impl Params {
    /// Version the call targets. An absent version means the current one.
    pub fn effective_version(&self) -> u32 {
        if self.version == 0 {
            API_VERSION
        } else {
            self.version
        }
    }
}

impl Call {
    /// Build a call from a method name and JSON options
    pub fn new(method: impl Into<String>, options: Option<&serde_json::Value>) -> Self {
        let options = options.and_then(|value| serde_json::value::to_raw_value(value).ok());
        Self {
            jsonrpc: String::new(),
            id: 0,
            method: method.into(),
            params: Params {
                version: API_VERSION,
                options,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }
}

/// Outbound reply envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Reply {
    /// Successful reply. A `null` result is left out of the envelope.
    pub fn success(call: &Call, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: call.jsonrpc.clone(),
            id: call.id,
            error: None,
            result: (!result.is_null()).then_some(result),
        }
    }

    pub fn failure(call: &Call, error: ApiError) -> Self {
        Self {
            jsonrpc: call.jsonrpc.clone(),
            id: call.id,
            error: Some(error),
            result: None,
        }
    }
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Reads consecutive call objects from a byte stream
pub struct CallDecoder<R: Read> {
    stream: StreamDeserializer<'static, serde_json::de::IoRead<R>, Call>,
}

impl<R: Read> CallDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            stream: Deserializer::from_reader(reader).into_iter(),
        }
    }

    /// Next complete call, `None` at a clean end of input
    pub fn next_call(&mut self) -> Result<Option<Call>, DecodeError> {
        match self.stream.next() {
            None => Ok(None),
            Some(Ok(call)) => Ok(Some(call)),
            Some(Err(e)) => Err(DecodeError::from(e)),
        }
    }

    /// Bytes consumed so far
    pub fn byte_offset(&self) -> usize {
        self.stream.byte_offset()
    }
}

/// Serialize a reply followed by a newline
pub fn encode(reply: &Reply) -> Result<Vec<u8>, GatewayError> {
    let mut out = serde_json::to_vec(reply)?;
    out.push(b'\n');
    Ok(out)
}
