use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaygroundError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("room error: {0}")]
    Room(String),
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("media error: {0}")]
    Media(String),
    #[error("no participant with id {0}")]
    UnknownParticipant(String),
}
