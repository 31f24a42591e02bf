//! The acquisition session state machine.
//!
//! A session owns a [`SampleSource`], a [`Trigger`], the channel selection and the capture
//! buffer, and moves between the following states:
//!
//! ```text
//!   Idle --prepare_transfer--> Armed --event--> Capturing --> Armed ... --end_transfer--> Idle
//!   Idle --prepare_transfer--> Draining (burst) --end_transfer--> Idle
//! ```
//!
//! In continuous mode, every trigger event runs the capture bracket: the trigger is disarmed,
//! a frame is read while it is disarmed, any edge latched during the read is cleared, and only
//! then is the trigger re-armed. On converters where the data-out line doubles as the
//! data-ready line, reading the frame toggles the line, and re-arming without clearing the
//! latched edge immediately produces a false event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::capture::RingBufferSink;
use crate::channel::{ChannelMask, ChannelSelector};
use crate::config::{AcquisitionConfig, CaptureKind, FrameShape};
use crate::scan::ScanType;
use crate::sys::SampleSource;
use crate::trigger::Trigger;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    /// Waiting for a trigger event.
    Armed,
    /// Handling a trigger event with the trigger disarmed.
    Capturing,
    /// Capture has finished or is being stopped; the buffer is being drained.
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    /// Scans pushed into the buffer.
    pub scans: u64,
    /// Scans skipped because the converter did not become ready in time.
    pub dropped: u64,
    /// Scans rejected because the buffer was full.
    pub overruns: u64,
    /// Events that arrived while no capture was expected.
    pub spurious: u64,
}

/// Called with the capture buffer after new data has been pushed into it.
pub type DataCallback = Box<dyn FnMut(&mut RingBufferSink) -> Result<()> + Send>;

/// Everything a capture policy operates on.
pub struct Pipeline<S, T> {
    source: S,
    trigger: T,
    selector: ChannelSelector,
    sink: RingBufferSink,
    frame_shape: FrameShape,
    ready_timeout: u32,
    burst_wait_ready: bool,
    frame: Vec<u8>,
    scan: Vec<u8>,
    state: State,
    armed: bool,
    stats: SessionStats,
    stop: Arc<AtomicBool>,
    callback: Option<DataCallback>,
}

impl<S: SampleSource, T: Trigger> Pipeline<S, T> {
    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_state(&mut self, state: State) {
        if self.state != state {
            log::trace!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    pub fn selector(&self) -> &ChannelSelector {
        &self.selector
    }

    pub fn sink(&self) -> &RingBufferSink {
        &self.sink
    }

    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    pub fn waits_for_ready(&self) -> bool {
        self.burst_wait_ready
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Clear any latched edge, then enable the trigger. The trigger is never enabled any
    /// other way.
    pub fn rearm(&mut self) -> Result<()> {
        self.trigger.clear_pending()?;
        self.trigger.take_ready();
        self.trigger.arm()?;
        self.armed = true;
        Ok(())
    }

    /// Disable the trigger if it is enabled, so that every arm is paired with one disarm.
    pub fn disarm(&mut self) -> Result<()> {
        if self.armed {
            self.trigger.disarm()?;
            self.armed = false;
        }
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn take_ready(&mut self) -> bool {
        self.trigger.take_ready()
    }

    /// Busy-wait for the ready signal for at most the configured number of iterations.
    pub fn wait_ready(&mut self) -> Result<()> {
        for _ in 0..self.ready_timeout {
            if self.trigger.take_ready() {
                return Ok(())
            }
            std::hint::spin_loop();
        }
        log::warn!("converter not ready after {} iterations", self.ready_timeout);
        Err(Error::Timeout)
    }

    /// `Armed -> Capturing`: stop event delivery before touching the bus.
    pub fn enter_capturing(&mut self) -> Result<()> {
        self.disarm()?;
        self.trigger.clear_pending()?;
        self.set_state(State::Capturing);
        Ok(())
    }

    /// `Capturing -> Armed`, or `Capturing -> Draining` if the transfer is being ended.
    pub fn leave_capturing(&mut self) -> Result<()> {
        if self.stop_requested() {
            log::debug!("stop requested, not re-arming");
            self.set_state(State::Draining);
            return Ok(())
        }
        self.rearm()?;
        self.set_state(State::Armed);
        Ok(())
    }

    /// Read one scan of the active channels from the converter.
    pub fn read_scan(&mut self) -> Result<()> {
        self.scan.clear();
        match self.frame_shape {
            FrameShape::Simultaneous => {
                self.source.read_frame(&mut self.frame)?;
                self.selector.demux_frame(&self.frame, &mut self.scan);
            }
            FrameShape::Multiplexed => {
                for channel in self.selector.active_channels().channels() {
                    let bus_bytes = self.selector.scan_type(channel).map(ScanType::bus_bytes).unwrap_or(0);
                    self.source.read_frame(&mut self.frame[..bus_bytes])?;
                    self.selector.extract_sample(channel, &self.frame[..bus_bytes], &mut self.scan);
                }
            }
        }
        Ok(())
    }

    /// Push the last scan read into the buffer.
    pub fn push_scan(&mut self) -> Result<()> {
        match self.sink.push(&self.scan) {
            Ok(()) => {
                self.stats.scans += 1;
                Ok(())
            }
            Err(error) => {
                if let Error::BufferFull { .. } = error {
                    self.stats.overruns += 1;
                    log::warn!("buffer overrun, scan dropped ({} so far)", self.stats.overruns);
                }
                Err(error)
            }
        }
    }

    pub fn capture_scan(&mut self) -> Result<()> {
        self.read_scan()?;
        self.push_scan()
    }

    /// Hand the buffer to the registered callback, if any.
    pub fn notify(&mut self) -> Result<()> {
        match self.callback.as_mut() {
            Some(callback) => callback(&mut self.sink),
            None => Ok(())
        }
    }

    fn read_single(&mut self, channel: usize, scan_type: &ScanType) -> Result<i64> {
        self.rearm()?;
        let ready = self.wait_ready();
        self.disarm()?;
        ready?;
        let bus_bytes = scan_type.bus_bytes();
        let offset = match self.frame_shape {
            FrameShape::Simultaneous => {
                self.source.read_frame(&mut self.frame)?;
                self.selector.frame_offset(channel)
            }
            FrameShape::Multiplexed => {
                self.source.read_frame(&mut self.frame[..bus_bytes])?;
                0
            }
        };
        let mut storage = [0u8; 4];
        let storage = &mut storage[..scan_type.storage_bytes()];
        scan_type.extract(&self.frame[offset..offset + bus_bytes], storage);
        Ok(scan_type.decode(storage))
    }

    /// Stop everything after a fatal error. Secondary failures are logged only.
    fn abort(&mut self) {
        log::warn!("aborting transfer");
        if let Err(error) = self.disarm() {
            log::warn!("disarm failed during abort: {}", error);
        }
        if let Err(error) = self.source.stop_conversion() {
            log::warn!("stop_conversion failed during abort: {}", error);
        }
        self.set_state(State::Idle);
    }
}

/// Capture policy of a session, chosen when the session is constructed.
pub trait CaptureMode<S: SampleSource, T: Trigger> {
    fn kind(&self) -> CaptureKind;

    /// Start capturing; channels and buffer are already set up.
    fn begin(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()>;

    /// Handle one trigger event.
    fn on_event(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()>;

    /// Capture another batch into the buffer.
    fn batch(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()>;

    /// Stop capturing.
    fn end(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()>;
}

/// Fill the buffer with as many scans as fit, polling the converter directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct Burst;

impl<S: SampleSource, T: Trigger> CaptureMode<S, T> for Burst {
    fn kind(&self) -> CaptureKind {
        CaptureKind::Burst
    }

    fn begin(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()> {
        pipeline.set_state(State::Draining);
        if pipeline.waits_for_ready() {
            pipeline.rearm()?;
        }
        self.batch(pipeline)
    }

    fn on_event(&mut self, _pipeline: &mut Pipeline<S, T>) -> Result<()> {
        // the ready flag is polled by the capture loop
        Ok(())
    }

    fn batch(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()> {
        let scans = pipeline.sink().capacity() / pipeline.selector().bytes_per_scan();
        log::debug!("burst of {} scans", scans);
        for _ in 0..scans {
            if pipeline.waits_for_ready() {
                match pipeline.wait_ready() {
                    Ok(()) => (),
                    Err(Error::Timeout) => {
                        pipeline.stats_mut().dropped += 1;
                        continue
                    }
                    Err(error) => return Err(error),
                }
                pipeline.disarm()?;
                let captured = pipeline.capture_scan();
                pipeline.rearm()?;
                captured?;
            } else {
                pipeline.capture_scan()?;
            }
        }
        pipeline.notify()
    }

    fn end(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()> {
        if pipeline.waits_for_ready() {
            pipeline.disarm()?;
        }
        Ok(())
    }
}

/// Capture one scan per trigger event until the transfer is ended.
#[derive(Debug, Clone, Copy, Default)]
pub struct Continuous;

impl<S: SampleSource, T: Trigger> CaptureMode<S, T> for Continuous {
    fn kind(&self) -> CaptureKind {
        CaptureKind::Continuous
    }

    fn begin(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()> {
        pipeline.rearm()?;
        pipeline.set_state(State::Armed);
        Ok(())
    }

    fn on_event(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()> {
        if pipeline.state() != State::Armed || !pipeline.take_ready() {
            pipeline.stats_mut().spurious += 1;
            log::debug!("spurious event in state {:?}", pipeline.state());
            return Ok(())
        }
        pipeline.enter_capturing()?;
        pipeline.read_scan()?;
        let pushed = pipeline.push_scan();
        pipeline.leave_capturing()?;
        pushed?;
        pipeline.notify()
    }

    fn batch(&mut self, _pipeline: &mut Pipeline<S, T>) -> Result<()> {
        Err(Error::InvalidConfiguration("batches are only captured in burst mode"))
    }

    fn end(&mut self, pipeline: &mut Pipeline<S, T>) -> Result<()> {
        pipeline.disarm()
    }
}

fn aborts_transfer(error: &Error) -> bool {
    matches!(error, Error::Bus(_) | Error::Irq(_))
}

pub struct AcquisitionSession<S, T> {
    pipeline: Pipeline<S, T>,
    mode: Box<dyn CaptureMode<S, T> + Send>,
}

impl<S, T> std::fmt::Debug for AcquisitionSession<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("state", &self.pipeline.state)
            .field("active_channels", &self.pipeline.selector.active_channels())
            .field("stats", &self.pipeline.stats)
            .finish_non_exhaustive()
    }
}

impl<S: SampleSource, T: Trigger> AcquisitionSession<S, T> {
    pub fn new(source: S, trigger: T, config: AcquisitionConfig) -> Result<Self> {
        let mode: Box<dyn CaptureMode<S, T> + Send> = match config.capture {
            CaptureKind::Burst => Box::new(Burst),
            CaptureKind::Continuous => Box::new(Continuous),
        };
        Self::with_mode(source, trigger, config, mode)
    }

    pub fn with_mode(source: S, trigger: T, config: AcquisitionConfig,
                     mode: Box<dyn CaptureMode<S, T> + Send>) -> Result<Self> {
        config.validate()?;
        let frame_len = config.frame_len();
        let scan_len: usize = config.channels.iter().map(ScanType::storage_bytes).sum();
        Ok(AcquisitionSession {
            pipeline: Pipeline {
                source,
                trigger,
                selector: ChannelSelector::new(config.channels),
                sink: RingBufferSink::new(config.capacity),
                frame_shape: config.frame_shape,
                ready_timeout: config.ready_timeout,
                burst_wait_ready: config.burst_wait_ready,
                frame: vec![0; frame_len],
                scan: Vec::with_capacity(scan_len),
                state: State::Idle,
                armed: false,
                stats: SessionStats::default(),
                stop: Arc::new(AtomicBool::new(false)),
                callback: None,
            },
            mode,
        })
    }

    /// Register the callback invoked after every scan (continuous) or batch (burst).
    pub fn on_data<F>(&mut self, callback: F)
            where F: FnMut(&mut RingBufferSink) -> Result<()> + Send + 'static {
        self.pipeline.callback = Some(Box::new(callback));
    }

    pub fn state(&self) -> State {
        self.pipeline.state
    }

    pub fn capture_kind(&self) -> CaptureKind {
        self.mode.kind()
    }

    pub fn stats(&self) -> SessionStats {
        self.pipeline.stats
    }

    pub fn selector(&self) -> &ChannelSelector {
        &self.pipeline.selector
    }

    pub fn sink(&self) -> &RingBufferSink {
        &self.pipeline.sink
    }

    /// The buffer may be drained at any time.
    pub fn sink_mut(&mut self) -> &mut RingBufferSink {
        &mut self.pipeline.sink
    }

    pub fn source(&self) -> &S {
        &self.pipeline.source
    }

    pub fn trigger(&self) -> &T {
        &self.pipeline.trigger
    }

    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        self.pipeline.stop.clone()
    }

    fn check(&mut self, result: Result<()>) -> Result<()> {
        if let Err(ref error) = result {
            if aborts_transfer(error) {
                self.pipeline.abort();
            }
        }
        result
    }

    /// Select `mask` channels and a `capacity` byte buffer, and start capturing.
    ///
    /// In burst mode the whole batch is captured before this returns.
    pub fn prepare_transfer(&mut self, mask: ChannelMask, capacity: usize) -> Result<()> {
        if self.pipeline.state != State::Idle {
            return Err(Error::Busy)
        }
        self.pipeline.selector.set_active_channels(mask)?;
        let bytes_per_scan = self.pipeline.selector.bytes_per_scan();
        if capacity < bytes_per_scan {
            return Err(Error::InvalidConfiguration("buffer is smaller than one scan"))
        }
        log::debug!("prepare_transfer({:#010x}, {}) in {:?} mode, {} bytes per scan",
                    mask.bits(), capacity, self.mode.kind(), bytes_per_scan);
        self.pipeline.stop.store(false, Ordering::SeqCst);
        self.pipeline.stats = SessionStats::default();
        self.pipeline.sink.set_capacity(capacity);
        self.pipeline.sink.begin_session(bytes_per_scan);
        let result = self.pipeline.source.configure_channels(mask)
            .and_then(|()| self.pipeline.source.start_conversion())
            .map_err(Error::from);
        if let Err(error) = result {
            self.pipeline.abort();
            return Err(error)
        }
        let result = self.mode.begin(&mut self.pipeline);
        self.check(result)
    }

    /// Handle a trigger event. Meant to be called from the interrupt dispatch path; errors are
    /// returned as-is and never retried.
    pub fn on_trigger_event(&mut self) -> Result<()> {
        let result = self.mode.on_event(&mut self.pipeline);
        self.check(result)
    }

    /// Capture another burst batch, e.g. once the previous one has been drained.
    pub fn capture_batch(&mut self) -> Result<()> {
        if self.pipeline.state != State::Draining {
            return Err(Error::NotActive)
        }
        let result = self.mode.batch(&mut self.pipeline);
        self.check(result)
    }

    pub fn end_transfer(&mut self) -> Result<()> {
        if self.pipeline.state == State::Idle {
            return Err(Error::NotActive)
        }
        log::debug!("end_transfer() after {:?}", self.pipeline.stats);
        let ended = self.mode.end(&mut self.pipeline);
        let stopped = self.pipeline.source.stop_conversion();
        self.pipeline.stop.store(false, Ordering::SeqCst);
        self.pipeline.set_state(State::Idle);
        ended?;
        Ok(stopped?)
    }

    /// Read the current raw value of one channel, outside of any transfer.
    pub fn read_single_sample(&mut self, channel: usize) -> Result<i64> {
        if self.pipeline.state != State::Idle {
            return Err(Error::Busy)
        }
        let scan_type = *self.pipeline.selector.scan_type(channel)
            .ok_or(Error::InvalidConfiguration("channel does not exist"))?;
        if self.pipeline.frame_shape == FrameShape::Multiplexed {
            self.pipeline.source.configure_channels(ChannelMask::channel(channel))?;
        }
        self.pipeline.source.select()?;
        let value = self.pipeline.read_single(channel, &scan_type);
        let deselected = self.pipeline.source.deselect();
        let value = value?;
        deselected?;
        log::debug!("read_single_sample({}) = {:#x}", channel, value);
        Ok(value)
    }
}
