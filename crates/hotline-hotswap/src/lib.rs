//! Live redefinition: package compiled classes for the agent, and the
//! [`Session`] facade that drives list / fetch / compile / save / upload /
//! halt against one target without blocking its caller.

mod observer;
mod report;
mod session;
mod upload;

pub use observer::{EventObserver, SessionEvent, SessionObserver};
pub use report::{HotSwapClassResult, HotSwapReport, HotSwapStatus};
pub use session::{SaveSettings, Session, SessionError};
pub use upload::{UploadAck, UploadError, UploadPayload, UploadPipeline};
