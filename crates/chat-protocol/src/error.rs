use std::fmt;

/// Errors arising from envelope encoding/decoding.
#[derive(Debug)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Encode(s) => write!(f, "encode error: {s}"),
            ProtocolError::Decode(s) => write!(f, "decode error: {s}"),
        }
    }
}

impl std::error::Error for ProtocolError {}
