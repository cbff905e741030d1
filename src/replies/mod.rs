/// Replies: nested discussion under threads
pub mod models;
pub mod service;
pub mod tree;

pub use models::{NewReply, Reply};
pub use service::ReplyService;
pub use tree::{ReplyNode, ReplyTreeBuilder};
