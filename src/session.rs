use log::{debug, error, info};
use std::sync::Arc;

use crate::catalog::RemoteImageCatalog;
use crate::config::SessionConfig;
use crate::cropper::{CropCapability, CropHandle, RasterCropper};
use crate::error::{CropError, Result};
use crate::transport::{ApiRequest, HttpTransport, Transport};
use crate::types::{CropSession, ImageDescriptor, SessionState};

const UPLOAD_PATH: &str = "/upload";

struct ActiveSession<H> {
    session: CropSession,
    handle: H,
}

/// Drives one crop session at a time: open an image, render the selection,
/// upload it, and mark the source processed.
///
/// ```text
/// Idle --open_session--> Open --commit_crop--> Committing --> Idle
///                         |  ^                     |
///                         |  +-- render failure ---+
///                         +------cancel_session-----> Idle
/// ```
///
/// The cropper handle is detached on every path out of `Open`, including
/// failed commits and dropping the controller. A commit future dropped
/// before it finishes leaves the controller in `Committing`;
/// [`cancel_session`](Self::cancel_session) returns it to `Idle`.
///
/// # Example
/// ```no_run
/// use batch_crop::{ClientConfig, CropSessionController, RasterCropper, RemoteImageCatalog};
/// use std::sync::Arc;
///
/// # async fn example() -> batch_crop::Result<()> {
/// let catalog = Arc::new(RemoteImageCatalog::new(ClientConfig::default()));
/// catalog.refresh().await?;
///
/// let mut controller = CropSessionController::new(Arc::clone(&catalog), RasterCropper::new());
/// if let Some(image) = catalog.unprocessed().first() {
///     controller.open_session(image).await?;
///     controller.commit_crop().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct CropSessionController<T = HttpTransport, C = RasterCropper>
where
    C: CropCapability,
{
    catalog: Arc<RemoteImageCatalog<T>>,
    cropper: C,
    config: SessionConfig,
    state: SessionState,
    active: Option<ActiveSession<C::Handle>>,
    last_error: Option<String>,
    unreconciled: Vec<String>,
}

impl<T: Transport, C: CropCapability> CropSessionController<T, C> {
    /// Create an idle controller with the default session constants
    /// (1:1 crop box, 2048×2048 JPEG upload).
    pub fn new(catalog: Arc<RemoteImageCatalog<T>>, cropper: C) -> Self {
        Self::with_config(catalog, cropper, SessionConfig::default())
    }

    pub fn with_config(catalog: Arc<RemoteImageCatalog<T>>, cropper: C, config: SessionConfig) -> Self {
        Self {
            catalog,
            cropper,
            config,
            state: SessionState::Idle,
            active: None,
            last_error: None,
            unreconciled: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<RemoteImageCatalog<T>> {
        &self.catalog
    }

    /// The open session, if any.
    pub fn session(&self) -> Option<&CropSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn handle(&self) -> Option<&C::Handle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    /// Mutable access to the attached cropper, for adjusting the selection.
    pub fn selection_mut(&mut self) -> Option<&mut C::Handle> {
        self.active.as_mut().map(|a| &mut a.handle)
    }

    /// Message of the most recent failed operation.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Images that were uploaded but could not be marked processed.
    pub fn unreconciled(&self) -> &[String] {
        &self.unreconciled
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Open `descriptor` for cropping.
    ///
    /// Fails with [`CropError::SessionActive`] if a session is already open.
    /// If the display URL cannot be fetched or the cropper cannot attach,
    /// the controller stays `Idle` and the error is returned.
    pub async fn open_session(&mut self, descriptor: &ImageDescriptor) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(CropError::SessionActive {
                current: active.session.descriptor.name.clone(),
            });
        }

        let display_url = match self.catalog.fetch_display_url(&descriptor.name).await {
            Ok(url) => url,
            Err(e) => {
                error!("Could not fetch image URL for {}: {}", descriptor.name, e);
                return Err(self.record(e));
            }
        };

        let handle = match self
            .cropper
            .attach(&display_url, self.config.crop_options())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                error!("Could not attach cropper to {}: {}", descriptor.name, e);
                return Err(self.record(e));
            }
        };

        debug!("Opened crop session for {} at {}", descriptor.name, display_url);
        self.active = Some(ActiveSession {
            session: CropSession {
                descriptor: descriptor.clone(),
                display_url,
            },
            handle,
        });
        self.state = SessionState::Open;
        Ok(())
    }

    /// Render, upload, and mark the open image processed.
    ///
    /// A rendering failure keeps the session open and makes no remote call.
    /// Otherwise the session is closed whether or not the upload and mark
    /// succeed. The catalog entry is only flagged when both succeed.
    pub async fn commit_crop(&mut self) -> Result<()> {
        let active = match &self.active {
            Some(active) => active,
            None => return Err(CropError::NoSession),
        };
        let name = active.session.descriptor.name.clone();
        let rendered = active.handle.render_selection(self.config.output_size).await;

        let bytes = match rendered {
            Some(bytes) => bytes,
            None => {
                error!("Failed to render cropped image for {}", name);
                return Err(self.record(CropError::Rendering(format!(
                    "no image produced for {}",
                    name
                ))));
            }
        };

        self.state = SessionState::Committing;
        let result = self.upload_and_mark(&name, bytes).await;
        self.close();

        match result {
            Ok(()) => {
                info!("Uploaded crop of {} and marked it processed", name);
                Ok(())
            }
            Err(e) => {
                error!("Error during upload or marking processed for {}: {}", name, e);
                Err(self.record(e))
            }
        }
    }

    /// Close the open session without contacting the API. No-op when idle.
    pub fn cancel_session(&mut self) {
        if let Some(active) = &self.active {
            debug!("Cancelled crop session for {}", active.session.descriptor.name);
        }
        self.close();
    }

    /// Retry marking every unreconciled upload as processed.
    ///
    /// Returns how many were reconciled. If any still fail, the last error
    /// is returned and those names stay in [`unreconciled`](Self::unreconciled).
    pub async fn reconcile(&mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.unreconciled);
        let mut reconciled = 0;
        let mut last_err = None;

        for name in pending {
            match self.catalog.mark_processed(&name).await {
                Ok(()) => reconciled += 1,
                Err(e) => {
                    error!("Still unable to mark {} processed: {}", name, e);
                    self.unreconciled.push(name);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(self.record(e)),
            None => Ok(reconciled),
        }
    }

    async fn upload_and_mark(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let upload = ApiRequest::post(UPLOAD_PATH).with_file(
            self.config.upload_field.clone(),
            name,
            self.config.upload_mime.clone(),
            bytes,
        );
        self.catalog.client().request(&upload).await?;

        if let Err(e) = self.catalog.mark_processed(name).await {
            if !self.unreconciled.iter().any(|n| n == name) {
                self.unreconciled.push(name.to_string());
            }
            return Err(e);
        }
        Ok(())
    }

    fn record(&mut self, err: CropError) -> CropError {
        self.last_error = Some(err.to_string());
        err
    }
}

impl<T, C: CropCapability> CropSessionController<T, C> {
    fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.handle.detach();
        }
        self.state = SessionState::Idle;
    }
}

impl<T, C: CropCapability> Drop for CropSessionController<T, C> {
    fn drop(&mut self) {
        self.close();
    }
}
