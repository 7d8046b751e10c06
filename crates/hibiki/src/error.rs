use aes::cipher::block_padding::UnpadError;
use thiserror::Error;

use crate::http::RequestStatus;

#[derive(Error, Debug)]
pub enum HibikiError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("request failed: {0:?}")]
    RequestFailed(RequestStatus),

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),

    #[error("download timed out")]
    Timeout,

    #[error("download canceled")]
    Canceled,

    #[error("local connections are not allowed for {0}")]
    LocalNotAllowed(String),

    #[error("invalid key length: expected 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("decryption key required")]
    DecryptionKeyRequired,

    #[error("invalid hex key: {0}")]
    InvalidHexKey(String),

    #[error("Pkcs7 unpad error")]
    UnpadError(#[from] UnpadError),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("playlist error: {0}")]
    PlaylistError(String),

    #[error("playlist can no longer update")]
    CanNoLongerUpdate,

    #[error("no usable representation left")]
    NoUsableRepresentation,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    HexDecodeError(#[from] hex::FromHexError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

pub type HibikiResult<T> = Result<T, HibikiError>;
