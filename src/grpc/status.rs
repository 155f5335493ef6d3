//! gRPC status codes (C10). Deliberately a separate numeric space from
//! [`crate::error::Error`]'s `Kind` discriminants — nothing in this module
//! collides with the core I/O/protocol error taxonomy, so a `grpc-status`
//! trailer value and an internal `Kind` can never be confused even though
//! both are small integers.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    pub fn from_u32(value: u32) -> Code {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A terminal gRPC call outcome: a code plus an optional human-readable
/// message, as carried in the `grpc-status`/`grpc-message` trailers.
#[derive(Debug, Clone)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn ok() -> Status {
        Status {
            code: Code::Ok,
            message: String::new(),
        }
    }

    pub fn new(code: Code, message: impl Into<String>) -> Status {
        Status {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    pub(crate) fn from_trailers(trailers: &[(String, String)]) -> Status {
        let code = trailers
            .iter()
            .find(|(n, _)| n == "grpc-status")
            .and_then(|(_, v)| v.parse::<u32>().ok())
            .map(Code::from_u32)
            .unwrap_or(Code::Unknown);
        let message = trailers
            .iter()
            .find(|(n, _)| n == "grpc-message")
            .map(|(_, v)| super::metadata::percent_decode(v))
            .unwrap_or_default();
        Status { code, message }
    }

    pub(crate) fn to_trailers(&self) -> Vec<(String, String)> {
        vec![
            ("grpc-status".to_string(), self.code.as_u32().to_string()),
            (
                "grpc-message".to_string(),
                super::metadata::percent_encode(&self.message),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_trailers() {
        let status = Status::new(Code::NotFound, "no such widget");
        let trailers = status.to_trailers();
        let parsed = Status::from_trailers(&trailers);
        assert_eq!(parsed.code, Code::NotFound);
        assert_eq!(parsed.message, "no such widget");
    }

    #[test]
    fn unrecognized_code_falls_back_to_unknown() {
        let trailers = vec![("grpc-status".to_string(), "999".to_string())];
        assert_eq!(Status::from_trailers(&trailers).code, Code::Unknown);
    }
}
