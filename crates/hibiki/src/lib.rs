pub mod error;
pub mod http;
pub mod keyring;
pub mod logic;
pub mod options;
pub mod playlist;
pub mod stream;
pub mod time;

pub use error::{HibikiError, HibikiResult};
pub use keyring::Keyring;
pub use options::{AdaptationStrategy, StreamingOptions};
pub use playlist::{Playlist, RepresentationKey, SplitPoint, StreamFormat};
pub use stream::manager::{ManifestParser, PlaylistManager};
pub use stream::{StreamChunk, StreamId};
