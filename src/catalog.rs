use log::{debug, error, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::client::RetryingHttpClient;
use crate::config::ClientConfig;
use crate::error::{CropError, Result};
use crate::transport::{ApiRequest, HttpTransport, Transport};
use crate::types::{base_name, CatalogStatus, CatalogSummary, DisplayUrl, ImageDescriptor};

const LIST_PATH: &str = "/images";

#[derive(Debug)]
struct CatalogState {
    entries: Vec<ImageDescriptor>,
    status: CatalogStatus,
    last_error: Option<String>,
    /// Bumped by every successful mark.
    revision: u64,
    /// Revision at which each name was last marked processed.
    marked_at: HashMap<String, u64>,
    /// Number of refreshes started.
    refresh_seq: u64,
    /// Sequence number of the refresh whose response is currently applied.
    applied_seq: u64,
}

impl Default for CatalogState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            status: CatalogStatus::Loading,
            last_error: None,
            revision: 0,
            marked_at: HashMap::new(),
            refresh_seq: 0,
            applied_seq: 0,
        }
    }
}

/// In-memory list of the API's images, kept in server order.
///
/// All mutation goes through this type. Methods take `&self` and serialize
/// access internally, so a catalog can be shared through an `Arc` between a
/// list view and a [`CropSessionController`](crate::session::CropSessionController).
/// The lock is never held across a network call.
///
/// A refresh that was started before a [`mark_processed`](Self::mark_processed)
/// completed cannot clear that mark, and a refresh response older than the
/// one already applied is discarded.
#[derive(Debug)]
pub struct RemoteImageCatalog<T = HttpTransport> {
    client: RetryingHttpClient<T>,
    state: Mutex<CatalogState>,
}

impl RemoteImageCatalog<HttpTransport> {
    /// Create an empty catalog backed by the HTTP API.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_client(RetryingHttpClient::new(config))
    }
}

impl<T: Transport> RemoteImageCatalog<T> {
    /// Create an empty catalog over an existing client.
    pub fn with_client(client: RetryingHttpClient<T>) -> Self {
        Self {
            client,
            state: Mutex::new(CatalogState::default()),
        }
    }

    /// The client used for all catalog requests.
    pub fn client(&self) -> &RetryingHttpClient<T> {
        &self.client
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Remote operations ───────────────────────────────────────────

    /// Fetch the image list and replace the catalog with it.
    ///
    /// On failure the previous entries are kept, the status becomes
    /// [`CatalogStatus::Failed`], and the error is returned.
    pub async fn refresh(&self) -> Result<Vec<ImageDescriptor>> {
        let (seq, started_at) = {
            let mut state = self.lock();
            state.refresh_seq += 1;
            (state.refresh_seq, state.revision)
        };

        let fetched = self
            .client
            .request_json::<Vec<ImageDescriptor>>(&ApiRequest::get(LIST_PATH))
            .await;

        let mut state = self.lock();
        if seq < state.applied_seq {
            debug!(
                "Discarding image list from refresh #{} (#{} already applied)",
                seq, state.applied_seq
            );
            return match fetched {
                Ok(_) => Ok(state.entries.clone()),
                Err(e) => Err(e),
            };
        }

        match fetched {
            Ok(list) => {
                let mut entries = dedupe(list);
                for entry in entries.iter_mut() {
                    let marked_since = state
                        .marked_at
                        .get(&entry.name)
                        .is_some_and(|rev| *rev > started_at);
                    if marked_since && !entry.processed {
                        debug!("Keeping {} processed over stale image list", entry.name);
                        entry.processed = true;
                    }
                }
                state.entries = entries;
                state.applied_seq = seq;
                state.status = CatalogStatus::Ready;
                state.last_error = None;
                Ok(state.entries.clone())
            }
            Err(e) => {
                error!("Failed to load image list: {}", e);
                state.status = CatalogStatus::Failed(e.to_string());
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Record `name` as processed on the server, then flag the matching
    /// entry locally.
    ///
    /// A name missing from the catalog is not an error; the local update is
    /// skipped. If the remote call fails the catalog is left untouched.
    pub async fn mark_processed(&self, name: &str) -> Result<()> {
        let path = format!("/mark-processed/{}", base_name(name));
        self.client.request(&ApiRequest::post(path)).await?;

        let mut state = self.lock();
        state.revision += 1;
        let revision = state.revision;
        state.marked_at.insert(name.to_string(), revision);

        match state.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.processed = true,
            None => debug!("{} is not in the catalog; nothing to update", name),
        }
        Ok(())
    }

    /// Fetch the short-lived full resolution URL for `name`.
    pub async fn fetch_display_url(&self, name: &str) -> Result<String> {
        let path = format!("/image/{}", base_name(name));
        let resp: DisplayUrl = self
            .client
            .request_json(&ApiRequest::get(path))
            .await
            .map_err(|e| match e {
                CropError::NotFound(_) => CropError::NotFound(name.to_string()),
                other => other,
            })?;

        resp.url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| CropError::NotFound(name.to_string()))
    }

    // ── Local views ─────────────────────────────────────────────────

    /// Snapshot of all entries in server order.
    pub fn entries(&self) -> Vec<ImageDescriptor> {
        self.lock().entries.clone()
    }

    pub fn get(&self, name: &str) -> Option<ImageDescriptor> {
        self.lock().entries.iter().find(|e| e.name == name).cloned()
    }

    /// Entries that still need cropping.
    pub fn unprocessed(&self) -> Vec<ImageDescriptor> {
        self.lock()
            .entries
            .iter()
            .filter(|e| !e.processed)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn status(&self) -> CatalogStatus {
        self.lock().status.clone()
    }

    /// Message of the most recent failed refresh, cleared by a successful one.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn summary(&self) -> CatalogSummary {
        let state = self.lock();
        CatalogSummary {
            total: state.entries.len(),
            processed: state.entries.iter().filter(|e| e.processed).count(),
        }
    }
}

/// Keep the first entry for each name.
fn dedupe(list: Vec<ImageDescriptor>) -> Vec<ImageDescriptor> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|entry| {
            let fresh = seen.insert(entry.name.clone());
            if !fresh {
                warn!("Dropping duplicate image {} from image list", entry.name);
            }
            fresh
        })
        .collect()
}
