/// Threads: the top-level post entity and its mutations
pub mod models;
pub mod service;

pub use models::{Media, MediaKind, NewThread, Thread};
pub use service::ThreadService;
