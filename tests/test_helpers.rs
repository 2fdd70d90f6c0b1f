#![allow(dead_code)]

use batch_crop::*;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "http://api.test";

/// A scripted reply, optionally delivered after a (virtual) delay.
#[derive(Clone)]
pub struct Reply {
    pub result: std::result::Result<RawResponse, String>,
    pub delay: Option<Duration>,
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Self {
            result: Ok(RawResponse::new(200, body)),
            delay: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            result: Ok(RawResponse::new(status, format!("status {}", status))),
            delay: None,
        }
    }

    pub fn network(msg: &str) -> Self {
        Self {
            result: Err(msg.to_string()),
            delay: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub request: ApiRequest,
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    fallback: HashMap<String, Reply>,
    calls: Vec<Call>,
}

/// In-memory [`Transport`] answering from per-path scripts and recording
/// every attempt.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply used once, before any fallback.
    pub fn push(&self, path: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue the same reply `times` times.
    pub fn push_n(&self, path: &str, reply: Reply, times: usize) -> &Self {
        for _ in 0..times {
            self.push(path, reply.clone());
        }
        self
    }

    /// Reply used whenever the queue for `path` is empty.
    pub fn always(&self, path: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .unwrap()
            .fallback
            .insert(path.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.request.path).collect()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.paths().iter().filter(|p| *p == path).count()
    }
}

impl ScriptedTransport {
    fn next_reply(&self, url: &str, request: &ApiRequest) -> Option<Reply> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call {
            url: url.to_string(),
            request: request.clone(),
        });
        if let Some(reply) = script
            .queued
            .get_mut(&request.path)
            .and_then(|q| q.pop_front())
        {
            return Some(reply);
        }
        script.fallback.get(&request.path).cloned()
    }
}

impl Transport for ScriptedTransport {
    async fn send(
        &self,
        url: &str,
        request: &ApiRequest,
        _timeout: Duration,
    ) -> std::result::Result<RawResponse, String> {
        let reply = match self.next_reply(url, request) {
            Some(reply) => reply,
            None => return Err(format!("no scripted reply for {}", request.path)),
        };
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        reply.result
    }
}

/// Counters shared between a [`FakeCropper`] and its handles.
#[derive(Default)]
pub struct CropperLog {
    pub attached: AtomicUsize,
    pub detached: AtomicUsize,
    pub options: Mutex<Vec<CropOptions>>,
    pub urls: Mutex<Vec<String>>,
    pub rendered: Mutex<Vec<OutputSize>>,
}

impl CropperLog {
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn detached(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

/// [`CropCapability`] that renders fixed bytes, or nothing.
#[derive(Clone)]
pub struct FakeCropper {
    pub log: Arc<CropperLog>,
    pub output: Option<Vec<u8>>,
    pub fail_attach: bool,
}

impl FakeCropper {
    pub fn new() -> Self {
        Self {
            log: Arc::new(CropperLog::default()),
            output: Some(vec![0xFF, 0xD8, 0xFF, 0xD9]),
            fail_attach: false,
        }
    }

    pub fn failing_render() -> Self {
        Self {
            output: None,
            ..Self::new()
        }
    }

    pub fn failing_attach() -> Self {
        Self {
            fail_attach: true,
            ..Self::new()
        }
    }
}

pub struct FakeHandle {
    log: Arc<CropperLog>,
    output: Option<Vec<u8>>,
    detached: bool,
}

impl FakeHandle {
    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl CropHandle for FakeHandle {
    async fn render_selection(&self, size: OutputSize) -> Option<Vec<u8>> {
        self.log.rendered.lock().unwrap().push(size);
        if self.detached {
            return None;
        }
        self.output.clone()
    }

    fn detach(&mut self) {
        self.detached = true;
        self.log.detached.fetch_add(1, Ordering::SeqCst);
    }
}

impl CropCapability for FakeCropper {
    type Handle = FakeHandle;

    async fn attach(&self, display_url: &str, options: CropOptions) -> batch_crop::Result<FakeHandle> {
        if self.fail_attach {
            return Err(CropError::Rendering("image element unavailable".into()));
        }
        self.log.attached.fetch_add(1, Ordering::SeqCst);
        self.log.urls.lock().unwrap().push(display_url.to_string());
        self.log.options.lock().unwrap().push(options);
        Ok(FakeHandle {
            log: Arc::clone(&self.log),
            output: self.output.clone(),
            detached: false,
        })
    }
}

/// [`CropCapability`] that decodes fixed image bytes with [`RasterCropper`].
pub struct InMemoryCropper {
    pub bytes: Vec<u8>,
    pub raster: RasterCropper,
}

impl CropCapability for InMemoryCropper {
    type Handle = RasterSelection;

    async fn attach(&self, _display_url: &str, options: CropOptions) -> batch_crop::Result<RasterSelection> {
        self.raster.load(self.bytes.clone(), options).await
    }
}

pub fn client_config() -> ClientConfig {
    ClientConfig::builder().with_base_url(BASE_URL).build()
}

pub fn catalog_with(transport: &ScriptedTransport, config: ClientConfig) -> Arc<RemoteImageCatalog<ScriptedTransport>> {
    let client = RetryingHttpClient::with_transport(transport.clone(), config);
    Arc::new(RemoteImageCatalog::with_client(client))
}

pub fn catalog(transport: &ScriptedTransport) -> Arc<RemoteImageCatalog<ScriptedTransport>> {
    catalog_with(transport, client_config())
}

pub fn descriptor(name: &str, processed: bool) -> ImageDescriptor {
    ImageDescriptor {
        name: name.to_string(),
        processed,
    }
}
