mod blocking;
mod core;
mod errors;
mod message;
mod options;
pub mod prompts;
pub mod response;
pub mod stream;

pub use blocking::{BlockingChain, BlockingStream};
pub use self::core::{Chain, Modifier, STRUCTURED_MODEL};
pub use errors::{ChainError, ErrorKind};
pub use message::{Content, ContentPart, Message, Role};
pub use options::{LinkOptions, PullOptions, StreamMode, StreamOptions};
pub use response::Response;
pub use stream::{ChainStream, StreamEvent};
