use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{StreamError, StreamPublisher};

// ============================================================================
// Publisher Double
// ============================================================================

/// Records every publish so tests can assert what reached the stream, and
/// can be flipped into a failing state to exercise the 500 path.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl StreamPublisher for RecordingPublisher {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<(), StreamError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StreamError::Unavailable("broker down".to_string()));
        }
        self.published.lock().push((key.to_string(), payload));
        Ok(())
    }
}
