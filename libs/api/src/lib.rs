pub mod error;
pub mod reader;
pub mod types;
pub mod util;

pub use error::{ErrorKind, SourceError};
pub use reader::{Authorizer, MessageReader, ReaderFactory, TopicCatalog};
pub use types::{Message, MessageId, ReaderOptions, StartPosition, SubscriptionType};
pub use util::now_ms;
