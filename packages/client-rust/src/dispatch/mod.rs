//! Operation dispatch and completion correlation.
//!
//! This module implements the request/response pipeline on top of a one-way
//! worker hand-off:
//!
//! 1. **Dispatch** (`dispatcher`): allocate id, build envelope, register, hand off
//! 2. **Hand-off** (`worker`): `Worker` seam plus the stock `ChannelWorker`
//! 3. **Completion bus** (`bus`): typed topic -> single-fire listener
//! 4. **Request cache** (`cache`): parked callbacks for in-process fast paths
//! 5. **Notification** (`notifier`): routes a finished request to cache or bus
//! 6. **Listeners** (`listener`): callback adapters and the awaitable form

pub mod bus;
pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod notifier;
pub mod worker;

// Re-export key types for convenient access.
pub use bus::{BusStats, CompletionBus};
pub use cache::{CacheKey, RequestCache};
pub use dispatcher::{
    AckCallback, ClientCallback, ClientHandle, ClientStatus, Dispatcher, OnlineClientsCallback,
    StatusCallback,
};
pub use error::{BusError, CacheError, DispatchError, HandoffError, WaitError};
pub use listener::{callback, BoxedCallback, CompletionListener, PendingCompletion};
pub use notifier::{CompletionNotifier, Delivery};
pub use worker::{ChannelWorker, EnvelopeHandler, Worker};
