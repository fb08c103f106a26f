//! The offline cache manager.
//!
//! A worker version precaches its asset manifest on install, deletes the
//! stores of older versions on activate, and answers GET requests
//! cache-first. Lifecycle events reach it through a [`Dispatcher`], and a
//! [`WorkerHost`] plays the part of the environment that registers
//! versions and routes page requests.

mod context;
mod dispatch;
mod error;
mod host;
mod lifecycle;
#[cfg(test)]
mod testing;

pub use context::WorkerContext;
pub use dispatch::Dispatcher;
pub use host::{Route, WorkerHost};
