//! Sharing a session between the interrupt dispatch path and the transfer control path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::capture::RingBufferSink;
use crate::channel::ChannelMask;
use crate::session::{AcquisitionSession, SessionStats, State};
use crate::sys::SampleSource;
use crate::trigger::Trigger;
use crate::Result;

struct Inner<S, T> {
    session: Mutex<AcquisitionSession<S, T>>,
    stop: Arc<AtomicBool>,
    missed: AtomicU64,
}

/// Handle to a session used from several threads.
///
/// All state lives behind one lock. The dispatch path never waits for it: an event that
/// arrives while the control path holds the lock is counted as missed and dropped. Ending a
/// transfer first raises a stop request, so that an event handler already running does not
/// re-arm the trigger.
pub struct SharedSession<S, T> {
    inner: Arc<Inner<S, T>>,
}

impl<S, T> Clone for SharedSession<S, T> {
    fn clone(&self) -> Self {
        SharedSession { inner: self.inner.clone() }
    }
}

impl<S: SampleSource, T: Trigger> SharedSession<S, T> {
    pub fn new(session: AcquisitionSession<S, T>) -> Self {
        let stop = session.stop_flag();
        SharedSession {
            inner: Arc::new(Inner {
                session: Mutex::new(session),
                stop,
                missed: AtomicU64::new(0),
            })
        }
    }

    fn lock(&self) -> MutexGuard<'_, AcquisitionSession<S, T>> {
        self.inner.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_session<R>(&self, f: impl FnOnce(&mut AcquisitionSession<S, T>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn prepare_transfer(&self, mask: ChannelMask, capacity: usize) -> Result<()> {
        self.lock().prepare_transfer(mask, capacity)
    }

    pub fn end_transfer(&self) -> Result<()> {
        self.inner.stop.store(true, Ordering::SeqCst);
        self.lock().end_transfer()
    }

    pub fn read_single_sample(&self, channel: usize) -> Result<i64> {
        self.lock().read_single_sample(channel)
    }

    /// Handle a trigger event without blocking. Returns `false` if the event was dropped
    /// because the session was in use.
    pub fn dispatch_event(&self) -> Result<bool> {
        let mut session = match self.inner.session.try_lock() {
            Ok(session) => session,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                let missed = self.inner.missed.fetch_add(1, Ordering::SeqCst) + 1;
                log::debug!("session busy, event missed ({} so far)", missed);
                return Ok(false)
            }
        };
        session.on_trigger_event()?;
        Ok(true)
    }

    pub fn drain(&self, data: &mut [u8]) -> usize {
        self.lock().sink_mut().drain(data)
    }

    pub fn drain_samples<V: bytemuck::Pod>(&self, samples: &mut [V]) -> usize {
        self.lock().sink_mut().drain_samples(samples)
    }

    pub fn with_sink<R>(&self, f: impl FnOnce(&mut RingBufferSink) -> R) -> R {
        f(self.lock().sink_mut())
    }

    pub fn state(&self) -> State {
        self.lock().state()
    }

    pub fn stats(&self) -> SessionStats {
        self.lock().stats()
    }

    pub fn missed_events(&self) -> u64 {
        self.inner.missed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::config::AcquisitionConfig;
    use crate::scan::ScanType;
    use crate::sim::SimulatedSource;
    use crate::trigger::{EdgeLine, EdgeTrigger};
    use crate::Error;

    fn shared(capacity: usize) -> (SharedSession<SimulatedSource, EdgeTrigger>, Arc<EdgeLine>) {
        let config = AcquisitionConfig::continuous(vec![ScanType::unsigned(16)])
            .with_capacity(capacity);
        let line = EdgeLine::new();
        let trigger = EdgeTrigger::new(line.clone());
        let session = AcquisitionSession::new(SimulatedSource::new(&config), trigger, config).unwrap();
        (SharedSession::new(session), line)
    }

    #[test]
    fn test_dispatch_from_thread() {
        let (shared, line) = shared(1024);
        shared.prepare_transfer(ChannelMask::CH0, 1024).unwrap();
        let dispatcher = {
            let shared = shared.clone();
            let line = line.clone();
            thread::spawn(move || {
                let mut handled = 0;
                for _ in 0..100 {
                    if line.fire() && shared.dispatch_event().unwrap() {
                        handled += 1;
                    }
                }
                handled
            })
        };
        let handled = dispatcher.join().unwrap();
        assert_eq!(handled, 100);
        shared.end_transfer().unwrap();
        assert_eq!(shared.stats().scans, 100);
        assert_eq!(shared.missed_events(), 0);
        let mut samples = [0u16; 100];
        assert_eq!(shared.drain_samples(&mut samples), 100);
        assert_eq!(samples[99], SimulatedSource::value(0, 99) as u16);
    }

    #[test]
    fn test_event_missed_while_locked() {
        let (shared, line) = shared(64);
        shared.prepare_transfer(ChannelMask::CH0, 64).unwrap();
        assert!(line.fire());
        let dispatched = shared.with_session(|_session| {
            thread::scope(|scope| scope.spawn(|| shared.dispatch_event()).join().unwrap())
        });
        assert!(matches!(dispatched, Ok(false)));
        assert_eq!(shared.missed_events(), 1);
        assert_eq!(shared.stats().scans, 0);
        assert_eq!(shared.state(), State::Armed);
    }

    #[test]
    fn test_end_while_dispatching() {
        let (shared, line) = shared(1 << 16);
        shared.prepare_transfer(ChannelMask::CH0, 1 << 16).unwrap();
        let dispatcher = {
            let shared = shared.clone();
            let line = line.clone();
            thread::spawn(move || {
                while shared.state() != State::Idle {
                    if line.fire() {
                        match shared.dispatch_event() {
                            Ok(_) | Err(Error::BufferFull { .. }) => (),
                            Err(error) => panic!("{}", error),
                        }
                    }
                    thread::yield_now();
                }
            })
        };
        thread::sleep(Duration::from_millis(10));
        shared.end_transfer().unwrap();
        dispatcher.join().unwrap();
        assert_eq!(shared.state(), State::Idle);
        assert!(!line.is_enabled());
        let scans = shared.stats().scans;
        assert!(!line.fire());
        assert!(shared.dispatch_event().unwrap());
        assert_eq!(shared.stats().scans, scans);
        assert!(matches!(shared.end_transfer(), Err(Error::NotActive)));
    }

    #[test]
    fn test_stop_request_cleared_by_prepare() {
        let (shared, line) = shared(64);
        assert!(matches!(shared.end_transfer(), Err(Error::NotActive)));
        shared.prepare_transfer(ChannelMask::CH0, 64).unwrap();
        assert!(line.fire());
        assert!(shared.dispatch_event().unwrap());
        assert_eq!(shared.state(), State::Armed);
        assert!(line.is_enabled());
    }

    #[test]
    fn test_single_sample_waits_for_edge() {
        let (shared, line) = shared(64);
        let firing = Arc::new(AtomicBool::new(true));
        let firer = {
            let firing = firing.clone();
            let line = line.clone();
            thread::spawn(move || {
                while firing.load(Ordering::SeqCst) {
                    line.fire();
                    thread::yield_now();
                }
            })
        };
        let value = shared.read_single_sample(0);
        firing.store(false, Ordering::SeqCst);
        firer.join().unwrap();
        assert_eq!(value.unwrap(), SimulatedSource::value(0, 0) as i64);
        assert!(!line.is_enabled());
    }
}
