use thiserror::Error;

pub type Result<T, E = BrokerError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("command payload could not be decoded")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown command tag: {0}")]
    UnknownCommand(String),

    #[error("command could not be encoded")]
    EncodeFailure(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("failed to compress payload")]
    Pack(#[source] std::io::Error),

    #[error("failed to decompress payload")]
    Unpack(#[source] std::io::Error),
}

impl CompressionError {
    /// True for a gzip stream that ended before a full member was read — the
    /// broker tolerates this on a datagram that turns out to be plain text.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(
            self,
            CompressionError::Unpack(e) if e.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }
}

#[derive(Error, Debug)]
pub enum TopicError {
    #[error("failed to enqueue message for subscriber {0}")]
    SendFailed(String),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to open persistence file {path}")]
    OpenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write persistence record")]
    Write(#[source] csv::Error),
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("no handler registered for command '{0}'")]
    NoHandler(String),

    #[error("handler for '{0}' failed: {1}")]
    Failed(String, String),
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
