//! Transport to the in-process agent plus the per-target status it feeds.
//!
//! [`AgentChannel`] owns the sockets. Each request carries an id; a reader
//! task per connection hands every reply to the caller that sent the matching
//! request, so callers simply await the return value. [`StatusStore`] keeps
//! the last-known-good view of each target for anyone who wants to look.

mod channel;
mod connection;
mod error;
mod filter;
mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use channel::{AgentChannel, AgentReply, ChannelConfig};
pub use error::{ChannelError, Result};
pub use filter::ClassFilter;
pub use status::{FetchedClass, StatusStore, TargetSnapshot};
