pub mod codec;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod error_code;
pub mod frame;
pub mod handshake;
pub mod value;

pub use constants::*;
pub use envelope::{Request, Response};
pub use error::{CodecError, ProtocolError};
pub use error_code::ErrorCode;
pub use value::{Object, Value};
