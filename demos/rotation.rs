//! Rotation demo
//!
//! Writes enough events to force several size rotations, with compression on,
//! then lists the resulting segment files.
//!
//! Run with: cargo run --example rotation -- [directory]

use std::sync::Arc;

use seglog::{Field, SinkLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> seglog::Result<()> {
    let directory = std::env::args().nth(1).unwrap_or_else(|| "demo-logs".to_string());

    let logger = Arc::new(
        seglog::builder(&directory, "demo")
            .with_max_size(4 * 1024)
            .with_max_age_days(7)
            .with_compression(true)
            .build()?,
    );

    tracing_subscriber::registry()
        .with(SinkLayer::new(Arc::clone(&logger)))
        .init();

    for i in 0..200u64 {
        logger.info(
            "request served",
            [
                Field::new("request_id", i),
                Field::new("path", "/api/items"),
                Field::new("cached", i % 3 == 0),
            ],
        );
        if i % 50 == 0 {
            logger.debug("checkpoint", [Field::new("n", i)]);
        }
    }

    tracing::info!(target: "demo", requests = 200u64, "traffic replayed through tracing");
    logger.error("upstream timed out", [Field::new("elapsed_ms", 5000)]);
    logger.rotate()?;
    logger.close()?;

    let mut files: Vec<_> = std::fs::read_dir(&directory)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    files.sort();
    for file in files {
        let size = std::fs::metadata(&file)?.len();
        println!("{:>8}  {}", size, file.display());
    }
    Ok(())
}
