use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::cpu::CpuGetter;

pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// CPU feed whose value tests can change at will.
#[derive(Clone, Debug)]
pub struct SettableCpu(Arc<AtomicI64>);

impl SettableCpu {
    pub fn new(usage: i64) -> Self {
        Self(Arc::new(AtomicI64::new(usage)))
    }

    pub fn set(&self, usage: i64) {
        self.0.store(usage, Ordering::SeqCst);
    }

    pub fn getter(&self) -> CpuGetter {
        let usage = Arc::clone(&self.0);
        Arc::new(move || usage.load(Ordering::SeqCst))
    }
}
