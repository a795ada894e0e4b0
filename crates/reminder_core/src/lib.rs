pub mod error;
pub mod expiration;
pub mod format;
pub mod notice;
pub mod remote;
pub mod schedule;
pub mod scheduler;
pub mod timer;

pub use crate::expiration::ExpirationChecker;
pub use crate::scheduler::EmailScheduler;
pub use crate::timer::CountdownTimer;
