pub mod ext_keys;
mod file_store;
mod model;
mod repository;

pub use file_store::FileMessageStore;
pub use model::{ContentType, InputPart, Message, MessagePatch, MessageRole, MessageType};
pub use repository::MessageRepository;
