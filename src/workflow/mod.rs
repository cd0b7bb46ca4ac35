pub mod client;
pub mod fetch;
pub mod message;
pub mod payload;
pub mod template;
pub mod watcher;
