use std::fmt;

/// Closed set of response codes with fixed wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    BadRequest,
    UnknownCmd,
    NotLogin,
    NoPermission,
    FileExists,
    FileNotFound,
    TransferStateError,
    SizeMismatch,
    /// Reserved. No transfer computes a content checksum.
    ChecksumMismatch,
    InternalError,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::BadRequest => 1001,
            ErrorCode::UnknownCmd => 1002,
            ErrorCode::NotLogin => 1003,
            ErrorCode::NoPermission => 1004,
            ErrorCode::InternalError => 1500,
            ErrorCode::FileExists => 2001,
            ErrorCode::FileNotFound => 2002,
            ErrorCode::TransferStateError => 2003,
            ErrorCode::SizeMismatch => 2004,
            ErrorCode::ChecksumMismatch => 2005,
        }
    }

    /// Unknown wire values collapse to `InternalError`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ErrorCode::Ok,
            1001 => ErrorCode::BadRequest,
            1002 => ErrorCode::UnknownCmd,
            1003 => ErrorCode::NotLogin,
            1004 => ErrorCode::NoPermission,
            2001 => ErrorCode::FileExists,
            2002 => ErrorCode::FileNotFound,
            2003 => ErrorCode::TransferStateError,
            2004 => ErrorCode::SizeMismatch,
            2005 => ErrorCode::ChecksumMismatch,
            _ => ErrorCode::InternalError,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Ok => "Ok",
            ErrorCode::BadRequest => "BadRequest",
            ErrorCode::UnknownCmd => "UnknownCmd",
            ErrorCode::NotLogin => "NotLogin",
            ErrorCode::NoPermission => "NoPermission",
            ErrorCode::FileExists => "FileExists",
            ErrorCode::FileNotFound => "FileNotFound",
            ErrorCode::TransferStateError => "TransferStateError",
            ErrorCode::SizeMismatch => "SizeMismatch",
            ErrorCode::ChecksumMismatch => "ChecksumMismatch",
            ErrorCode::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.code())
    }
}
