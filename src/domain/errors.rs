use std::fmt;

#[derive(Debug, Clone)]
pub enum ProxyError {
    InvalidDestination(String),
    DialFailed {
        target: String,
        kind: std::io::ErrorKind,
        reason: String,
    },
    SniffFailed(String),
    MalformedRequest(String),
    NotAbsoluteUri(String),
    TransportFailed(String),
    Socks(String),
    Bind(String),
    Accept(String),
    Config(String),
    Io(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::InvalidDestination(msg) => write!(f, "Invalid destination: {}", msg),
            ProxyError::DialFailed { target, reason, .. } => write!(f, "Dial {} failed: {}", target, reason),
            ProxyError::SniffFailed(msg) => write!(f, "Protocol sniffing failed: {}", msg),
            ProxyError::MalformedRequest(msg) => write!(f, "Malformed request: {}", msg),
            ProxyError::NotAbsoluteUri(uri) => write!(f, "{} is not a full URL path", uri),
            ProxyError::TransportFailed(msg) => write!(f, "Round trip failed: {}", msg),
            ProxyError::Socks(msg) => write!(f, "SOCKS5 error: {}", msg),
            ProxyError::Bind(msg) => write!(f, "Bind failed: {}", msg),
            ProxyError::Accept(msg) => write!(f, "Accept failed: {}", msg),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ProxyError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

impl ProxyError {
    pub fn dial(target: impl ToString, err: &std::io::Error) -> Self {
        ProxyError::DialFailed {
            target: target.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
