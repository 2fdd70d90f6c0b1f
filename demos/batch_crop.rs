//! Crop every unprocessed image with the default centered selection.
//!
//! Talks to the API at `BATCH_CROP_API` (defaults to the production
//! endpoint). Pass a number to stop after that many images.
//!
//! ```sh
//! RUST_LOG=info cargo run --example batch_crop -- 5
//! ```

use batch_crop::{ClientConfig, CropSessionController, RasterCropper, RemoteImageCatalog};
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let limit = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<usize>()?,
        None => usize::MAX,
    };

    let mut builder = ClientConfig::builder();
    if let Ok(url) = std::env::var("BATCH_CROP_API") {
        builder = builder.with_base_url(url);
    }
    let catalog = Arc::new(RemoteImageCatalog::new(builder.build()));

    if let Err(e) = catalog.refresh().await {
        eprintln!("Error: {}", e);
        return Ok(());
    }
    let summary = catalog.summary();
    println!(
        "{} images, {} processed, {} remaining",
        summary.total,
        summary.processed,
        summary.remaining()
    );

    let mut controller = CropSessionController::new(Arc::clone(&catalog), RasterCropper::new());
    for image in catalog.unprocessed().into_iter().take(limit) {
        if let Err(e) = controller.open_session(&image).await {
            eprintln!("Skipping {}: {}", image.name, e);
            continue;
        }
        match controller.commit_crop().await {
            Ok(()) => println!("Cropped {}", image.name),
            Err(e) => {
                eprintln!("Failed {}: {}", image.name, e);
                controller.cancel_session();
            }
        }
    }

    if !controller.unreconciled().is_empty() {
        println!(
            "Retrying {} uploads that were not marked processed",
            controller.unreconciled().len()
        );
        if let Err(e) = controller.reconcile().await {
            eprintln!("Reconcile failed: {}", e);
        }
    }

    let summary = catalog.summary();
    println!("Done: {}/{} processed", summary.processed, summary.total);
    Ok(())
}
