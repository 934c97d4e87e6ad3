//! Cooperative stop signal shared by every shard pipeline of a run.
//!
//! Stopping never interrupts a delete already issued: pipelines check the
//! token between rows, stop requesting rows and close their cursor.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Why a run was stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator interrupt (SIGINT).
    Interrupted,
    /// Another shard of the same run failed.
    ShardFailed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupted => write!(f, "interrupted by operator"),
            StopReason::ShardFailed => write!(f, "another shard failed"),
        }
    }
}

/// Cloneable stop token. The first reason recorded wins.
#[derive(Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<StopReason>>>,
}

impl StopToken {
    /// A token that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop.
    pub fn stop(&self, reason: StopReason) {
        if let Ok(mut r) = self.reason.lock() {
            if r.is_none() {
                *r = Some(reason);
            }
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Returns the stop reason once triggered.
    pub fn stopped(&self) -> Option<StopReason> {
        if !self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        self.reason.lock().ok().and_then(|r| *r)
    }
}
