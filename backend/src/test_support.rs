//! Test utilities for the backend crate.
//!
//! This module provides shared helpers for both unit tests (in `src/`) and
//! integration tests (in `tests/`). It is only compiled for tests or with the
//! `test-support` feature.

mod clock;
mod device;
mod documents;
mod recorders;
mod ticket_store;

pub use clock::{ImmediateSleeper, MutableClock, PendingSleeper, RecordingSleeper};
pub use device::ScriptedDeviceTransport;
pub use documents::{InMemoryChangeFeed, InMemoryDocumentCollection};
pub use recorders::{RecordingCommunicationLog, RecordingWakeObserver};
pub use ticket_store::InMemoryTicketStore;

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
