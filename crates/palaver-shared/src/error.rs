use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed frame: expected 4 fields, got {0}")]
    FieldCount(usize),

    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("empty line")]
    Empty,
}
