// Message module: application payloads carried in user-data frames

pub mod types;
pub mod codec;

pub use types::UserMessage;
pub use codec::{decode_user_message, encode_user_message, max_user_payload};
