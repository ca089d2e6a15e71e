//! Hands work from threads that do not own bot-side state to the scheduler that does.
//!
//! The HTTP workers only ever see a [DispatchBridge]. The scheduler side starts a [JobLoop]
//! from inside its own runtime, which binds the bridge to a bounded channel it consumes.

mod bridge;
mod job_loop;

pub use bridge::*;
pub use job_loop::*;
