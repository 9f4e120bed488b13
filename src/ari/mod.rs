pub mod client;
pub mod events;
pub mod feed;

pub use client::AriClient;
pub use events::{is_caller_event, AriChannel, AriEvent};
pub use feed::EventFeed;
