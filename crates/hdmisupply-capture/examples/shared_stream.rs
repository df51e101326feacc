//! Start a synthetic stream in one coordinator and read it from another
//!
//! Prints each instance's role, then watches the generation counter advance
//! as the pattern thread writes frames.

use std::sync::Arc;
use std::time::Duration;

use hdmisupply_capture::{CoordinatorConfig, DisplayMode, InstanceCoordinator, SyntheticProvider};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let config = CoordinatorConfig::new(format!("demo-{}", std::process::id()))
        .with_mode(DisplayMode::Hd1080p2997);
    let provider = Arc::new(SyntheticProvider::pattern(940, 512, 512));

    let mut owner = InstanceCoordinator::new(config.clone(), provider.clone())?;
    let mut joiner = InstanceCoordinator::new(config.clone(), provider.clone())?;

    let owner_handle = owner.ensure_streaming()?;
    let joiner_handle = joiner.ensure_streaming()?;
    println!("control segment {}", config.control_segment());
    println!("owner {:?}, joiner {:?}", owner_handle.role(), joiner_handle.role());

    for _ in 0..5 {
        std::thread::sleep(Duration::from_millis(100));
        println!(
            "generation {} ({} frames delivered)",
            joiner_handle.generation(),
            provider.frames_delivered()
        );
    }

    let frame = joiner_handle.buffer().snapshot();
    println!("snapshot of {} bytes, first word {:08x?}", frame.len(), &frame[..4]);

    joiner.release()?;
    owner.release()?;
    println!("device open after release: {}", provider.is_open());
    Ok(())
}
