use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid range: lower {lower} > upper {upper}")]
    InvalidRange { lower: u64, upper: u64 },
}

pub type CodecResult<T> = Result<T, CodecError>;
