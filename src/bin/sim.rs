use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use adc_capture::sim::SimulatedSource;
use adc_capture::{
    AcquisitionConfig, AcquisitionSession, ChannelMask, EdgeLine, EdgeTrigger, FrameShape,
    ScanType, SharedSession, State
};

fn main() -> adc_capture::Result<()> {
    env_logger::init();

    let multiplexed = std::env::args().any(|arg| arg == "--multiplexed");
    let config = AcquisitionConfig::continuous(vec![ScanType::signed(24).with_storage_bytes(4); 4])
        .with_frame_shape(if multiplexed { FrameShape::Multiplexed } else { FrameShape::Simultaneous });
    let line = EdgeLine::new();
    let mut session = AcquisitionSession::new(
        SimulatedSource::new(&config), EdgeTrigger::new(line.clone()), config)?;

    let callbacks = Arc::new(AtomicU64::new(0));
    session.on_data({
        let callbacks = callbacks.clone();
        move |_sink| {
            callbacks.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    });
    let session = SharedSession::new(session);
    session.prepare_transfer(ChannelMask::CH0 | ChannelMask::CH2, 4096)?;

    let converter = {
        let session = session.clone();
        let line = line.clone();
        thread::spawn(move || {
            while session.state() != State::Idle {
                if line.fire() {
                    if let Err(error) = session.dispatch_event() {
                        log::warn!("event handler failed: {}", error);
                    }
                }
                thread::sleep(Duration::from_micros(100));
            }
        })
    };

    thread::sleep(Duration::from_millis(50));
    session.end_transfer()?;
    if converter.join().is_err() {
        log::error!("converter thread panicked");
    }

    let mut samples = [0i32; 8];
    let count = session.drain_samples(&mut samples[..]);
    println!("{:?}", session.stats());
    println!("{} callbacks, {} events missed, {:?}",
             callbacks.load(Ordering::Relaxed), session.missed_events(), line.counters());
    println!("first samples: {:?}", &samples[..count]);
    Ok(())
}
