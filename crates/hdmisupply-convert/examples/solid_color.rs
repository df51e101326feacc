//! Convert a solid-colour 1080p v210 frame and print the first pixel
//!
//! Runs the same conversion on both half-float backends (when the CPU has
//! F16C) and checks that they agree.

use hdmisupply_convert::{
    solid_frame, words_from_bytes, ConversionKernel, FrameGeometry, HalfBackend, HalfPreference,
    LumaRange, OutputBuffer, RayonDistributor, SoftwareHalf,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let geometry = FrameGeometry::HD1080;
    // Mid-grey with a slight warm cast
    let packed = words_from_bytes(&solid_frame(geometry, 502, 480, 560));

    let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
    let pool = RayonDistributor::new(workers)?;
    println!("hdmisupply-convert v{}", hdmisupply_convert::VERSION);
    println!("Converting {geometry} with {workers} workers");

    let mut results = Vec::new();
    for backend in [
        HalfBackend::select(HalfPreference::Auto)?,
        HalfBackend::Software(SoftwareHalf),
    ] {
        let mut rgb = vec![0u16; geometry.output_row_components() * geometry.height() as usize];
        let start = std::time::Instant::now();
        ConversionKernel::new(geometry, backend).convert(
            &packed,
            OutputBuffer::new(&mut rgb, geometry.output_row_bytes())?,
            LumaRange::Limited,
            &pool,
        )?;
        let elapsed = start.elapsed();

        let px: Vec<f32> = rgb[..3]
            .iter()
            .map(|&bits| half::f16::from_bits(bits).to_f32())
            .collect();
        println!("  {:?}: first pixel {:?} in {:?}", backend, px, elapsed);
        results.push(rgb);
    }

    if results[0] == results[1] {
        println!("Backends agree");
    } else {
        println!("Backends differ");
    }
    Ok(())
}
