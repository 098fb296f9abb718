use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidConfig(String),
    SolverFailed(String),
    NonceSpaceExhausted,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::SolverFailed(msg) => write!(f, "solver failed: {msg}"),
            Error::NonceSpaceExhausted => write!(f, "nonce space exhausted without a solution"),
        }
    }
}

impl std::error::Error for Error {}
