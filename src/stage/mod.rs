use std::pin::Pin;

pub mod engine;
pub mod progress;

use futures_core::Stream;

/// A stage's output stream plus the number of items it is expected to yield,
/// when known.
pub struct StreamBundle<T> {
    pub stream: Pin<Box<dyn Stream<Item = T> + Send>>,
    pub total_events: Option<u64>,
}

impl<T> StreamBundle<T> {
    pub fn new(stream: Pin<Box<dyn Stream<Item = T> + Send>>, total_events: Option<u64>) -> Self {
        Self {
            stream,
            total_events,
        }
    }
}
