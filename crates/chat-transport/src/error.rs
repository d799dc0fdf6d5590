use std::fmt;

/// Errors arising from the ZeroMQ transport layer.
#[derive(Debug)]
pub enum TransportError {
    Bind(String),
    Connect(String),
    Send(String),
    Timeout,
    Recv(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Bind(s) => write!(f, "bind failed: {s}"),
            TransportError::Connect(s) => write!(f, "connect failed: {s}"),
            TransportError::Send(s) => write!(f, "send failed: {s}"),
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Recv(s) => write!(f, "recv failed: {s}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<zmq::Error> for TransportError {
    fn from(e: zmq::Error) -> Self {
        if e == zmq::Error::EAGAIN {
            TransportError::Timeout
        } else {
            TransportError::Send(e.to_string())
        }
    }
}
