//! # Concurrency Bridge
//!
//! The only structures in the core touched from more than one thread.
//!
//! - [`Dispatcher`] / [`PeerRoutes`] - transport threads hand inbound work to
//!   the tick thread
//! - [`Executor`] - async work resumes on the tick thread
//! - [`Scheduler`] - timer tasks driven by the tick's delta time

mod dispatcher;
mod executor;
mod scheduler;

pub use dispatcher::{Action, Dispatcher, PeerRoutes};
pub use executor::Executor;
pub use scheduler::{HandleAllocator, Repeat, Scheduler, TaskFn, TaskHandle};
