use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use log::error;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CropError, Result};

/// How the crop box relates to the image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// The crop box may extend past the image; uncovered area renders black.
    Unrestricted,
    /// The crop box always stays inside the image.
    Restricted,
}

/// Constraints applied when attaching a cropper to an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropOptions {
    /// Width divided by height of the crop box.
    pub aspect_ratio: f64,
    pub view_mode: ViewMode,
    /// Share of the largest fitting box used for the initial selection.
    pub auto_crop_area: f64,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            aspect_ratio: 1.0,
            view_mode: ViewMode::Restricted,
            auto_crop_area: 0.8,
        }
    }
}

/// Pixel size of a rendered selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl OutputSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }
}

/// Crop box in source image pixels. The origin may be negative in
/// [`ViewMode::Unrestricted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Whether the region lies entirely within an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(i64::from(self.width));
        let bottom = self.y.checked_add(i64::from(self.height));
        self.x >= 0
            && self.y >= 0
            && right.is_some_and(|r| r <= i64::from(width))
            && bottom.is_some_and(|b| b <= i64::from(height))
    }
}

/// An attached cropper.
///
/// Must be detached on every exit from an open session.
pub trait CropHandle: Send + Sync {
    /// Render the current selection at `size` as an encoded image.
    /// Resolves to `None` when no image can be produced.
    fn render_selection(&self, size: OutputSize) -> impl Future<Output = Option<Vec<u8>>> + Send;

    /// Release the cropper. Rendering after detach yields `None`.
    fn detach(&mut self);
}

/// Something that can attach an adjustable crop box to a displayed image.
pub trait CropCapability: Send + Sync {
    type Handle: CropHandle;

    fn attach(
        &self,
        display_url: &str,
        options: CropOptions,
    ) -> impl Future<Output = Result<Self::Handle>> + Send;
}

/// [`CropCapability`] that downloads the display image and crops it with
/// the `image` crate, encoding JPEG output.
#[derive(Debug, Clone)]
pub struct RasterCropper {
    http: Client,
    timeout: Duration,
    jpeg_quality: u8,
}

impl Default for RasterCropper {
    fn default() -> Self {
        Self {
            http: Client::new(),
            timeout: Duration::from_secs(30),
            jpeg_quality: 92,
        }
    }
}

impl RasterCropper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom `reqwest::Client` for image downloads.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// JPEG quality, clamped to 1-100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Attach to an already downloaded, still encoded image.
    ///
    /// Decodes on the calling thread. Async callers should use [`load`](Self::load).
    pub fn attach_bytes(&self, bytes: &[u8], options: CropOptions) -> Result<RasterSelection> {
        let image = image::load_from_memory(bytes)?;
        Ok(RasterSelection::new(image, options, self.jpeg_quality))
    }

    /// Decode an encoded image on the blocking pool and attach to it.
    pub async fn load<B>(&self, bytes: B, options: CropOptions) -> Result<RasterSelection>
    where
        B: AsRef<[u8]> + Send + 'static,
    {
        // Decoding a full-size photo is CPU-bound
        let image = tokio::task::spawn_blocking(move || image::load_from_memory(bytes.as_ref()))
            .await
            .map_err(|e| CropError::Rendering(format!("Task join error: {}", e)))??;
        Ok(RasterSelection::new(image, options, self.jpeg_quality))
    }
}

impl CropCapability for RasterCropper {
    type Handle = RasterSelection;

    async fn attach(&self, display_url: &str, options: CropOptions) -> Result<RasterSelection> {
        let resp = self
            .http
            .get(display_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CropError::Network {
                context: format!("Failed to fetch display image {}", display_url),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(CropError::Http {
                status: resp.status().as_u16(),
                body: format!("Failed to fetch display image {}", display_url),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| CropError::Network {
            context: "Failed to read display image bytes".into(),
            source: e,
        })?;

        self.load(bytes, options).await
    }
}

/// Adjustable crop box over a decoded image.
#[derive(Debug)]
pub struct RasterSelection {
    image: Option<Arc<DynamicImage>>,
    width: u32,
    height: u32,
    options: CropOptions,
    region: CropRegion,
    jpeg_quality: u8,
}

impl RasterSelection {
    /// Wrap a decoded image with the initial, centered selection.
    pub fn new(image: DynamicImage, options: CropOptions, jpeg_quality: u8) -> Self {
        let (width, height) = image.dimensions();
        let region = initial_region(width, height, &options);
        Self {
            image: Some(Arc::new(image)),
            width,
            height,
            options,
            region,
            jpeg_quality,
        }
    }

    /// Source image dimensions.
    pub fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn options(&self) -> &CropOptions {
        &self.options
    }

    pub fn selection(&self) -> CropRegion {
        self.region
    }

    pub fn is_attached(&self) -> bool {
        self.image.is_some()
    }

    /// Move or resize the crop box.
    ///
    /// The height is derived from the requested width and the aspect ratio.
    /// In [`ViewMode::Restricted`] the box is shrunk and shifted to stay
    /// inside the image. In [`ViewMode::Unrestricted`] the box size and its
    /// offset from the image origin are capped at twice the longer image
    /// side. Returns the region actually applied.
    pub fn set_selection(&mut self, requested: CropRegion) -> CropRegion {
        self.region = constrain(requested, self.width, self.height, &self.options);
        self.region
    }

    /// Restore the initial centered selection.
    pub fn reset(&mut self) -> CropRegion {
        self.region = initial_region(self.width, self.height, &self.options);
        self.region
    }
}

impl CropHandle for RasterSelection {
    fn render_selection(&self, size: OutputSize) -> impl Future<Output = Option<Vec<u8>>> + Send {
        let image = self.image.clone();
        let region = self.region;
        let quality = self.jpeg_quality;
        async move {
            let image = image?;
            let job = tokio::task::spawn_blocking(move || render(&image, region, size, quality));
            match job.await {
                Ok(Ok(bytes)) => Some(bytes),
                Ok(Err(e)) => {
                    error!("Failed to render crop selection: {}", e);
                    None
                }
                Err(e) => {
                    error!("Render task join error: {}", e);
                    None
                }
            }
        }
    }

    fn detach(&mut self) {
        self.image = None;
    }
}

/// Crop, resize, and JPEG-encode one region. Blocking.
fn render(
    image: &DynamicImage,
    region: CropRegion,
    size: OutputSize,
    quality: u8,
) -> std::result::Result<Vec<u8>, String> {
    if size.width == 0 || size.height == 0 {
        return Err(format!("invalid output size {}x{}", size.width, size.height));
    }
    if !region.is_valid() {
        return Err("empty crop selection".into());
    }

    let (width, height) = image.dimensions();
    let reach = overscan_limit(width, height);
    if region.width > reach
        || region.height > reach
        || region.x.unsigned_abs() > u64::from(reach)
        || region.y.unsigned_abs() > u64::from(reach)
    {
        return Err(format!("crop selection {:?} out of range", region));
    }

    let cropped = if region.fits_within(width, height) {
        image
            .crop_imm(region.x as u32, region.y as u32, region.width, region.height)
            .to_rgb8()
    } else {
        let mut canvas = RgbImage::from_pixel(region.width, region.height, Rgb([0, 0, 0]));
        imageops::overlay(&mut canvas, &image.to_rgb8(), -region.x, -region.y);
        canvas
    };

    let scaled = imageops::resize(&cropped, size.width, size.height, FilterType::Lanczos3);

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(scaled)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

/// Bound on box size and origin offset in [`ViewMode::Unrestricted`]:
/// twice the longer image side.
fn overscan_limit(width: u32, height: u32) -> u32 {
    width.max(height).max(1).saturating_mul(2)
}

/// Largest box with the requested aspect ratio that fits the image, scaled
/// by `auto_crop_area` and centered.
fn initial_region(width: u32, height: u32, options: &CropOptions) -> CropRegion {
    let ratio = sanitize_ratio(options.aspect_ratio);
    let (w, h) = (f64::from(width), f64::from(height));
    let (fit_w, fit_h) = if w / h > ratio { (h * ratio, h) } else { (w, w / ratio) };

    let area = options.auto_crop_area.clamp(0.0, 1.0);
    let box_w = ((fit_w * area).round() as u32).clamp(1, width.max(1));
    let box_h = ((fit_h * area).round() as u32).clamp(1, height.max(1));

    CropRegion::new(
        i64::from(width.saturating_sub(box_w) / 2),
        i64::from(height.saturating_sub(box_h) / 2),
        box_w,
        box_h,
    )
}

fn constrain(requested: CropRegion, width: u32, height: u32, options: &CropOptions) -> CropRegion {
    let ratio = sanitize_ratio(options.aspect_ratio);
    let mut box_w = f64::from(requested.width.max(1));
    let mut box_h = box_w / ratio;

    if options.view_mode == ViewMode::Unrestricted {
        let reach = overscan_limit(width, height);
        let limit = f64::from(reach);
        if box_w > limit {
            box_w = limit;
            box_h = box_w / ratio;
        }
        if box_h > limit {
            box_h = limit;
            box_w = box_h * ratio;
        }
        let reach = i64::from(reach);
        return CropRegion::new(
            requested.x.clamp(-reach, reach),
            requested.y.clamp(-reach, reach),
            (box_w.round() as u32).clamp(1, limit as u32),
            (box_h.round() as u32).clamp(1, limit as u32),
        );
    }

    let (w, h) = (f64::from(width), f64::from(height));
    if box_w > w {
        box_w = w;
        box_h = box_w / ratio;
    }
    if box_h > h {
        box_h = h;
        box_w = box_h * ratio;
    }

    let box_w = (box_w.round() as u32).clamp(1, width.max(1));
    let box_h = (box_h.round() as u32).clamp(1, height.max(1));
    let x = requested.x.clamp(0, i64::from(width.saturating_sub(box_w)));
    let y = requested.y.clamp(0, i64::from(height.saturating_sub(box_h)));

    CropRegion::new(x, y, box_w, box_h)
}

fn sanitize_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}
