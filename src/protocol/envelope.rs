use thiserror::Error;

use crate::protocol::codec::{parse, serialize, Limits};
use crate::protocol::constants::{TYPE_REQUEST, TYPE_RESPONSE};
use crate::protocol::error::CodecError;
use crate::protocol::error_code::ErrorCode;
use crate::protocol::value::{Object, Value};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Request {
    pub cmd: String,
    pub args: Object,
}

impl Request {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into(), args: Object::new() }
    }

    pub fn arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(key, value);
        self
    }
}

/// `ok == false` always carries a non-Ok code; use [`Response::fail`] to keep
/// that pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub ok: bool,
    pub code: ErrorCode,
    pub msg: String,
    pub data: Object,
}

impl Default for Response {
    fn default() -> Self {
        Self::success("OK")
    }
}

impl Response {
    pub fn success(msg: impl Into<String>) -> Self {
        Self { ok: true, code: ErrorCode::Ok, msg: msg.into(), data: Object::new() }
    }

    pub fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        let mut resp = Self::success("");
        resp.fail(code, msg);
        resp
    }

    /// Mark successful and clear any data set so far.
    pub fn succeed(&mut self, msg: impl Into<String>) {
        self.ok = true;
        self.code = ErrorCode::Ok;
        self.msg = msg.into();
        self.data.clear();
    }

    /// Mark failed and clear any data set so far.
    pub fn fail(&mut self, code: ErrorCode, msg: impl Into<String>) {
        debug_assert!(code != ErrorCode::Ok);
        self.ok = false;
        self.code = code;
        self.msg = msg.into();
        self.data.clear();
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.data.insert(key, value);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("encoded envelope is {size} bytes, limit {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// A frame that does not hold a well-formed envelope. Always classified as
/// `BadRequest`, never confused with a decoded `ok=false` response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not utf-8")]
    NotUtf8,
    #[error("malformed payload: {0}")]
    Codec(#[from] CodecError),
    #[error("envelope root is not an object")]
    NotAnObject,
    #[error("wrong envelope type")]
    WrongType,
    #[error("missing or mistyped field `{0}`")]
    Field(&'static str),
    #[error("failed response carries Ok code")]
    InconsistentStatus,
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::BadRequest
    }
}

pub fn encode_request(req: &Request) -> Result<String, EnvelopeError> {
    let root = Object::new()
        .with("type", TYPE_REQUEST)
        .with("cmd", req.cmd.as_str())
        .with("args", req.args.clone());
    finish(Value::Object(root))
}

pub fn encode_response(resp: &Response) -> Result<String, EnvelopeError> {
    let root = Object::new()
        .with("type", TYPE_RESPONSE)
        .with("ok", resp.ok)
        .with("code", resp.code.code())
        .with("msg", resp.msg.as_str())
        .with("data", resp.data.clone());
    finish(Value::Object(root))
}

fn finish(root: Value) -> Result<String, EnvelopeError> {
    let text = serialize(&root);
    let limit = Limits::default().max_json_size;
    if text.len() > limit {
        return Err(EnvelopeError::TooLarge { size: text.len(), limit });
    }
    Ok(text)
}

fn open(payload: &[u8], expected_type: &str) -> Result<Object, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;
    let root = match parse(text, &Limits::default())? {
        Value::Object(obj) => obj,
        _ => return Err(DecodeError::NotAnObject),
    };
    if root.get_str("type") != Some(expected_type) {
        return Err(DecodeError::WrongType);
    }
    Ok(root)
}

pub fn decode_request(payload: &[u8]) -> Result<Request, DecodeError> {
    let root = open(payload, TYPE_REQUEST)?;
    let cmd = root.get_str("cmd").ok_or(DecodeError::Field("cmd"))?;
    let args = root.get_object("args").ok_or(DecodeError::Field("args"))?;
    Ok(Request { cmd: cmd.to_string(), args: args.clone() })
}

pub fn decode_response(payload: &[u8]) -> Result<Response, DecodeError> {
    let root = open(payload, TYPE_RESPONSE)?;
    let ok = root.get_bool("ok").ok_or(DecodeError::Field("ok"))?;
    let code = root.get_i64("code").ok_or(DecodeError::Field("code"))?;
    let msg = root.get_str("msg").ok_or(DecodeError::Field("msg"))?;
    let data = root.get_object("data").ok_or(DecodeError::Field("data"))?;

    let code = ErrorCode::from_code(code);
    if !ok && code == ErrorCode::Ok {
        return Err(DecodeError::InconsistentStatus);
    }

    Ok(Response { ok, code, msg: msg.to_string(), data: data.clone() })
}
