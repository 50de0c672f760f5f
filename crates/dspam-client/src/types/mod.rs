//! Core protocol types.

mod args;
mod capability;
mod record;
mod recipients;
mod reply;

pub use args::{Class, ClientArgs, Delivery, Operation, Source};
pub use capability::{Capability, DSPAM_PROCESS_MODE};
pub use record::{ClassificationRecord, Summary};
pub use recipients::{Outstanding, Results};
pub use reply::{Reply, ReplyCode};
