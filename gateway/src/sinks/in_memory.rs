//! In-memory sink
//!
//! Records every event it receives. Exists for tests and for wiring
//! checks; it is not a production destination.

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::sinks::Sink;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InMemoryConfig {}

#[derive(Default)]
pub struct InMemorySink {
    events: Mutex<Vec<EnhancedEvent>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EnhancedEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl Sink for InMemorySink {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
