//! Two plugin instances sharing one synthetic capture device
//!
//! The first instance starts the test-pattern stream, the second joins it.
//! Both convert frames for a couple of seconds, then the headroom toggle is
//! flipped and the owner shuts down, which hands the stream to the joiner.
//!
//! Set `HDMISUPPLY_DEBUG=1` for debug logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hdmisupply_capture::SyntheticProvider;
use hdmisupply_host::{
    HostInfo, LogNotifier, MemorySlots, ProcessOutcome, SupplyConfig, SupplySession, OUTPUT_SLOT,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let processors = std::thread::available_parallelism().map_or(1, |n| n.get());
    let host = HostInfo::hd1080(25.0, processors);
    let provider = Arc::new(SyntheticProvider::pattern(502, 480, 560));
    let notifier = Arc::new(LogNotifier);

    let config = SupplyConfig::builder()
        .telemetry_window_ms(1000)
        .debug_log(true)
        .build()
        .with_env();

    let first = SupplySession::initialize(config.clone(), &host, provider.clone(), notifier.clone())?;
    let mut second = SupplySession::initialize(config, &host, provider.clone(), notifier)?;
    println!("hdmisupply-host v{}", hdmisupply_host::VERSION);
    println!("first: {:?}", first);
    println!("second: {:?}", second);

    let mut slots = MemorySlots::new(2, host.frame_width, host.frame_height);
    let frame_interval = Duration::from_secs_f64(1.0 / host.frame_rate);

    let run = |session: &mut SupplySession, slots: &mut MemorySlots, frames: usize| {
        let mut torn = 0;
        for _ in 0..frames {
            let started = Instant::now();
            match session.process(&host, slots) {
                Ok(ProcessOutcome::Converted(report)) => torn += usize::from(report.torn),
                Ok(ProcessOutcome::Skipped(reason)) => println!("  skipped: {reason:?}"),
                Err(e) => println!("  error: {e}"),
            }
            std::thread::sleep(frame_interval.saturating_sub(started.elapsed()));
        }
        torn
    };

    let torn = run(&mut second, &mut slots, 50);
    println!("second instance converted 50 frames, {torn} possibly torn");
    println!("first pixel: {:04x?}", &slots.components(OUTPUT_SLOT)[..3]);

    second.set_headroom(true);
    run(&mut second, &mut slots, 1);
    println!("with headroom: {:04x?}", &slots.components(OUTPUT_SLOT)[..3]);

    first.shutdown()?;
    println!("first instance shut down, {} frames delivered", provider.frames_delivered());

    run(&mut second, &mut slots, 25);
    println!("second instance is now {:?}", second.role());
    second.shutdown()?;
    Ok(())
}
