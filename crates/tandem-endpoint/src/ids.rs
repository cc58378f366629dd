//! Request id generation for outgoing requests

use std::sync::atomic::{AtomicI64, Ordering};

use tandem_core::RequestId;
use uuid::Uuid;

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> RequestId;
}

/// Default generator: random v4 UUIDs as string ids
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> RequestId {
        RequestId::String(Uuid::new_v4().to_string())
    }
}

/// Deterministic numeric ids, mostly useful in tests
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicI64,
}

impl SequentialIdGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> RequestId {
        RequestId::number(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> RequestId + Send + Sync,
{
    fn next_id(&self) -> RequestId {
        self()
    }
}
