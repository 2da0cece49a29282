use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("authentication denied: {0}")]
    AuthDenied(String),

    #[error("bad auth webhook response: {0}")]
    BadAuthResponse(String),

    #[error("ErrStorage")]
    Storage(#[from] std::io::Error),

    #[error("stream already exists: {0}")]
    AlreadyExists(String),

    #[error("unknown stream: {0}")]
    UnknownStream(String),

    #[error("max sessions reached")]
    MaxSessions,

    #[error("no sessions available")]
    NoSessions,

    #[error("error transcoding segment: {0}")]
    TranscodeError(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),
}

pub type IngestResult<T> = Result<T, IngestError>;
