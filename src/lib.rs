//! # batch-crop
//!
//! Async Rust client for a batch image-cropping API.
//!
//! The API holds a list of images. Each one is opened in a crop session with
//! a square crop box, rendered to a 2048×2048 JPEG, uploaded, and marked
//! processed on the server.
//!
//! ## Features
//!
//! - **Retrying requests** — bounded attempts with linear backoff; terminal
//!   4xx responses are returned immediately
//! - **Shared catalog** — one owned store of image descriptors, safe to share
//!   between a list view and the session controller, with a guard against
//!   stale refreshes overwriting newer marks
//! - **Crop sessions** — explicit `Idle`/`Open`/`Committing` state machine,
//!   one session at a time, upload strictly before mark-processed
//! - **Pluggable cropper** — [`CropCapability`] trait with a concrete
//!   [`RasterCropper`] built on the `image` crate
//! - **Reconciliation** — uploads whose mark-processed call failed are kept
//!   and can be retried with [`CropSessionController::reconcile`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use batch_crop::{ClientConfig, CropSessionController, RasterCropper, RemoteImageCatalog};
//! use std::sync::Arc;
//!
//! # async fn example() -> batch_crop::Result<()> {
//! let catalog = Arc::new(RemoteImageCatalog::new(ClientConfig::default()));
//! let images = catalog.refresh().await?;
//! println!("{} images, {} left", images.len(), catalog.summary().remaining());
//!
//! let mut controller = CropSessionController::new(Arc::clone(&catalog), RasterCropper::new());
//! for image in catalog.unprocessed() {
//!     controller.open_session(&image).await?;
//!     if let Err(e) = controller.commit_crop().await {
//!         eprintln!("{}: {}", image.name, e);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod cropper;
pub mod error;
pub mod session;
pub mod transport;
pub mod types;

pub use catalog::RemoteImageCatalog;
pub use client::RetryingHttpClient;
pub use config::{ClientConfig, ClientConfigBuilder, SessionConfig, DEFAULT_BASE_URL};
pub use cropper::{
    CropCapability, CropHandle, CropOptions, CropRegion, OutputSize, RasterCropper,
    RasterSelection, ViewMode,
};
pub use error::{CropError, Result};
pub use session::CropSessionController;
pub use transport::{ApiRequest, HttpMethod, HttpTransport, RawResponse, RequestBody, Transport};
pub use types::{
    base_name, CatalogStatus, CatalogSummary, CropSession, ImageDescriptor, SessionState,
};
