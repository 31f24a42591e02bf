#[cfg(target_os = "linux")]
fn main() -> adc_capture::Result<()> {
    use std::fs::File;
    use std::io;

    use adc_capture::{AcquisitionConfig, AcquisitionSession, ChannelMask, Error, FreeRunning, ScanType};

    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(path), num_channels, scans) = (args.next(), args.next(), args.next()) else {
        eprintln!("usage: adc-capture <device> [channels] [scans]");
        std::process::exit(1)
    };
    let num_channels: usize = num_channels.as_deref().unwrap_or("1").parse()
        .map_err(|_| Error::InvalidConfiguration("channel count is not a number"))?;
    let scans: usize = scans.as_deref().unwrap_or("1024").parse()
        .map_err(|_| Error::InvalidConfiguration("scan count is not a number"))?;

    let config = AcquisitionConfig::burst(vec![ScanType::signed(24); num_channels]);
    let bytes_per_scan: usize = config.channels.iter().map(ScanType::storage_bytes).sum();
    let source = adc_capture::DeviceFileSource::open(&path)?;
    let mut session = AcquisitionSession::new(source, FreeRunning, config)?;
    let mask = ChannelMask::from_channels(&(0..num_channels).collect::<Vec<_>>());
    session.prepare_transfer(mask, scans * bytes_per_scan)?;
    session.end_transfer()?;

    let mut output = File::create("capture.data")?;
    let written = io::copy(session.sink_mut(), &mut output)?;
    log::info!("{} scans ({} bytes) written to capture.data", session.stats().scans, written);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("adc-capture requires Linux");
    std::process::exit(1)
}
