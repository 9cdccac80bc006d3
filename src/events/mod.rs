// Event intake: subscription lifecycle, bounded inbox, reconnect backoff

mod backoff;
mod client;
mod inbox;

pub use backoff::Backoff;
pub use client::{EventStreamClient, StreamConfig};
pub use inbox::{Inbox, OverflowPolicy, Pushed};
