use std::time::Duration;

use crate::cropper::{CropOptions, OutputSize, ViewMode};

/// Base endpoint of the batch crop API.
pub const DEFAULT_BASE_URL: &str = "https://year-book-back.replit.app";

/// Configuration for [`RetryingHttpClient`](crate::client::RetryingHttpClient).
///
/// Use [`ClientConfig::builder()`] for ergonomic construction, or
/// [`ClientConfig::default()`] for the production endpoint with four
/// attempts and a one second backoff unit.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base endpoint. Request paths are appended to it verbatim.
    pub base_url: String,

    /// Attempts per request, including the first one.
    pub max_attempts: u32,

    /// Backoff after failed attempt `n` is `backoff_unit * n`.
    pub backoff_unit: Duration,

    /// Timeout applied to each individual attempt.
    pub timeout: Duration,

    /// Retry 4xx responses as well (other than 408/429, which always retry).
    pub retry_client_errors: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: 4,
            backoff_unit: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            retry_client_errors: false,
        }
    }
}

impl ClientConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the API base endpoint. A trailing `/` is removed.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the number of attempts per request (minimum 1).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// Set the linear backoff unit.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.config.backoff_unit = unit;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Retry client errors (4xx) the same way as server errors.
    pub fn with_retry_client_errors(mut self, enabled: bool) -> Self {
        self.config.retry_client_errors = enabled;
        self
    }

    /// Build the final [`ClientConfig`].
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Crop constants applied to every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Crop boxes are always square.
    aspect_ratio: f64,

    /// How the crop box relates to the image bounds.
    pub view_mode: ViewMode,

    /// Size of the uploaded raster.
    pub output_size: OutputSize,

    /// Share of the largest fitting box used for the initial selection.
    pub auto_crop_area: f64,

    /// MIME type sent with the upload.
    pub upload_mime: String,

    /// Multipart field carrying the upload.
    pub upload_field: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: 1.0,
            view_mode: ViewMode::Restricted,
            output_size: OutputSize::square(2048),
            auto_crop_area: 0.8,
            upload_mime: "image/jpeg".to_string(),
            upload_field: "file".to_string(),
        }
    }
}

impl SessionConfig {
    /// Width divided by height of the crop box. Always 1.0.
    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    pub fn with_output_size(mut self, size: OutputSize) -> Self {
        self.output_size = size;
        self
    }

    pub fn with_auto_crop_area(mut self, area: f64) -> Self {
        self.auto_crop_area = area.clamp(0.0, 1.0);
        self
    }

    pub fn with_view_mode(mut self, mode: ViewMode) -> Self {
        self.view_mode = mode;
        self
    }

    /// Options passed to the cropper when a session opens.
    pub fn crop_options(&self) -> CropOptions {
        CropOptions {
            aspect_ratio: self.aspect_ratio,
            view_mode: self.view_mode,
            auto_crop_area: self.auto_crop_area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.backoff_unit, Duration::from_secs(1));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(!config.retry_client_errors);
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::builder()
            .with_base_url("http://localhost:3000///")
            .with_max_attempts(0)
            .with_backoff_unit(Duration::from_millis(50))
            .with_retry_client_errors(true)
            .build();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.backoff_unit, Duration::from_millis(50));
        assert!(config.retry_client_errors);
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.aspect_ratio(), 1.0);
        assert_eq!(config.view_mode, ViewMode::Restricted);
        assert_eq!(config.output_size, OutputSize::square(2048));
        assert_eq!(config.upload_field, "file");
        assert_eq!(config.upload_mime, "image/jpeg");
        assert_eq!(config.auto_crop_area, 0.8);
    }

    #[test]
    fn test_crop_options_follow_session_config() {
        let config = SessionConfig::default()
            .with_view_mode(ViewMode::Unrestricted)
            .with_auto_crop_area(1.5);
        let options = config.crop_options();
        assert_eq!(options.aspect_ratio, 1.0);
        assert_eq!(options.view_mode, ViewMode::Unrestricted);
        assert_eq!(options.auto_crop_area, 1.0);
    }

    #[test]
    fn test_builders_keep_square_aspect_ratio() {
        let config = SessionConfig::default()
            .with_output_size(OutputSize::new(640, 480))
            .with_view_mode(ViewMode::Unrestricted)
            .with_auto_crop_area(0.5);
        assert_eq!(config.aspect_ratio(), 1.0);
        assert_eq!(config.crop_options().aspect_ratio, 1.0);
    }
}
