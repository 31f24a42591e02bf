//! The "new sample ready" event: a free-running software trigger for polled capture, and
//! a model of an edge-sensitive interrupt line for triggered capture.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::IrqError;

pub trait Trigger {
    /// Enable delivery of ready events.
    fn arm(&mut self) -> Result<(), IrqError>;
    /// Disable delivery of ready events. Edges seen while disarmed may be latched as pending.
    fn disarm(&mut self) -> Result<(), IrqError>;
    /// Forget any edge latched while disarmed.
    fn clear_pending(&mut self) -> Result<(), IrqError>;
    /// Consume the ready flag raised by a delivered event, if any.
    fn take_ready(&mut self) -> bool;
}

impl<T: Trigger + ?Sized> Trigger for Box<T> {
    fn arm(&mut self) -> Result<(), IrqError> {
        (**self).arm()
    }

    fn disarm(&mut self) -> Result<(), IrqError> {
        (**self).disarm()
    }

    fn clear_pending(&mut self) -> Result<(), IrqError> {
        (**self).clear_pending()
    }

    fn take_ready(&mut self) -> bool {
        (**self).take_ready()
    }
}

/// Trigger for capture loops that poll the converter directly; the converter is always ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeRunning;

impl Trigger for FreeRunning {
    fn arm(&mut self) -> Result<(), IrqError> {
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), IrqError> {
        Ok(())
    }

    fn clear_pending(&mut self) -> Result<(), IrqError> {
        Ok(())
    }

    fn take_ready(&mut self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineCounters {
    pub arms: u64,
    pub disarms: u64,
    pub clears: u64,
    /// Edges delivered while the line was enabled.
    pub delivered: u64,
    /// Edges latched while the line was disabled.
    pub latched: u64,
    /// Latched edges delivered when the line was re-enabled without clearing them first.
    pub stale: u64,
}

/// An edge-sensitive interrupt line, shared between the code that observes edges (an interrupt
/// controller, or a thread standing in for one) and the [`EdgeTrigger`] that masks it.
///
/// Like a real controller, an edge arriving while the line is disabled is latched and delivered
/// as soon as the line is enabled again, unless it is cleared first.
#[derive(Debug, Default)]
pub struct EdgeLine {
    enabled: AtomicBool,
    pending: AtomicBool,
    ready: AtomicBool,
    arms: AtomicU64,
    disarms: AtomicU64,
    clears: AtomicU64,
    delivered: AtomicU64,
    latched: AtomicU64,
    stale: AtomicU64,
}

impl EdgeLine {
    pub fn new() -> Arc<EdgeLine> {
        Arc::new(EdgeLine::default())
    }

    /// Signal an edge. Returns `true` if the edge was delivered, i.e. the handler must run.
    pub fn fire(&self) -> bool {
        if self.enabled.load(Ordering::SeqCst) {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.ready.store(true, Ordering::SeqCst);
            true
        } else {
            self.latched.fetch_add(1, Ordering::SeqCst);
            self.pending.store(true, Ordering::SeqCst);
            false
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn counters(&self) -> LineCounters {
        LineCounters {
            arms: self.arms.load(Ordering::SeqCst),
            disarms: self.disarms.load(Ordering::SeqCst),
            clears: self.clears.load(Ordering::SeqCst),
            delivered: self.delivered.load(Ordering::SeqCst),
            latched: self.latched.load(Ordering::SeqCst),
            stale: self.stale.load(Ordering::SeqCst),
        }
    }

    fn enable(&self) {
        self.arms.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(true, Ordering::SeqCst);
        if self.pending.swap(false, Ordering::SeqCst) {
            log::warn!("stale edge delivered on enable");
            self.stale.fetch_add(1, Ordering::SeqCst);
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.ready.store(true, Ordering::SeqCst);
        }
    }

    fn disable(&self) {
        self.disarms.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct EdgeTrigger {
    line: Arc<EdgeLine>,
}

impl EdgeTrigger {
    pub fn new(line: Arc<EdgeLine>) -> EdgeTrigger {
        EdgeTrigger { line }
    }

    pub fn line(&self) -> &Arc<EdgeLine> {
        &self.line
    }
}

impl Trigger for EdgeTrigger {
    fn arm(&mut self) -> Result<(), IrqError> {
        log::trace!("arm()");
        self.line.enable();
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), IrqError> {
        log::trace!("disarm()");
        self.line.disable();
        Ok(())
    }

    fn clear_pending(&mut self) -> Result<(), IrqError> {
        log::trace!("clear_pending()");
        self.line.clear();
        Ok(())
    }

    fn take_ready(&mut self) -> bool {
        self.line.ready.swap(false, Ordering::SeqCst)
    }
}
