//! Image transformation proxy.
//!
//! Fetches a source image from storage (or an allow-listed host), resizes it
//! to fit the requested box and re-encodes it in the negotiated format.
//! Decoding and encoding run on the blocking pool.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::{ImageProxySettings, Settings};
use crate::error::ApiError;

/// Query string of `GET /images`
#[derive(Debug, Clone, Deserialize)]
pub struct ImageQuery {
    pub url: String,
    pub w: Option<u32>,
    pub h: Option<u32>,
    pub q: Option<u32>,
    pub fmt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn from_param(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Webp => ImageFormat::WebP,
        }
    }
}

/// Output format as far as it can be decided before the source is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChoice {
    Fixed(OutputFormat),
    /// PNG for PNG sources, JPEG otherwise
    FromSource,
}

impl FormatChoice {
    fn token(self) -> &'static str {
        match self {
            Self::Fixed(OutputFormat::Jpeg) => "jpeg",
            Self::Fixed(OutputFormat::Png) => "png",
            Self::Fixed(OutputFormat::Webp) => "webp",
            Self::FromSource => "auto",
        }
    }

    pub fn resolve(self, source: ImageFormat) -> OutputFormat {
        match self {
            Self::Fixed(format) => format,
            Self::FromSource if source == ImageFormat::Png => OutputFormat::Png,
            Self::FromSource => OutputFormat::Jpeg,
        }
    }
}

/// Explicit `fmt` wins, then WebP when the client accepts it
pub fn negotiate(explicit: Option<OutputFormat>, accept: Option<&str>) -> FormatChoice {
    if let Some(format) = explicit {
        return FormatChoice::Fixed(format);
    }
    if accept.is_some_and(accepts_webp) {
        return FormatChoice::Fixed(OutputFormat::Webp);
    }
    FormatChoice::FromSource
}

fn accepts_webp(accept: &str) -> bool {
    accept.split(',').any(|part| {
        let mut pieces = part.split(';').map(str::trim);
        let media = pieces.next().unwrap_or_default();
        let refused = pieces.any(|p| {
            p.strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        });
        media.eq_ignore_ascii_case("image/webp") && !refused
    })
}

/// Target size fitting inside the requested box, keeping aspect ratio.
/// `None` when the source already fits (images are never upscaled).
pub fn fit_within(src_w: u32, src_h: u32, max_w: Option<u32>, max_h: Option<u32>) -> Option<(u32, u32)> {
    if src_w == 0 || src_h == 0 {
        return None;
    }
    let scale_w = max_w.map(|w| w as f64 / src_w as f64).unwrap_or(f64::INFINITY);
    let scale_h = max_h.map(|h| h as f64 / src_h as f64).unwrap_or(f64::INFINITY);
    let scale = scale_w.min(scale_h);
    if scale >= 1.0 {
        return None;
    }
    let w = ((src_w as f64 * scale).round() as u32).max(1);
    let h = ((src_h as f64 * scale).round() as u32).max(1);
    Some((w, h))
}

/// A validated request, ready to be rendered
#[derive(Debug, Clone)]
pub struct ImagePlan {
    pub source: Url,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: u8,
    pub format: FormatChoice,
    /// Quoted entity tag
    pub etag: String,
}

impl ImagePlan {
    /// `If-None-Match` carries this plan's entity tag (or `*`)
    pub fn matches(&self, if_none_match: &str) -> bool {
        if_none_match
            .split(',')
            .map(|t| t.trim().trim_start_matches("W/"))
            .any(|t| t == "*" || t == self.etag)
    }
}

fn etag_for(source: &Url, width: Option<u32>, height: Option<u32>, quality: u8, format: FormatChoice) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(format!("|w={width:?}|h={height:?}|q={quality}|fmt={}", format.token()).as_bytes());
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

#[derive(Debug)]
pub struct ProxiedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

/// Decode, resize and encode. Returns the input untouched when nothing changes.
pub fn transform(
    bytes: Vec<u8>,
    source: ImageFormat,
    width: Option<u32>,
    height: Option<u32>,
    quality: u8,
    format: FormatChoice,
) -> Result<ProxiedImage, image::ImageError> {
    let output = format.resolve(source);
    let image = image::load_from_memory_with_format(&bytes, source)?;
    let target = fit_within(image.width(), image.height(), width, height);

    if target.is_none() && output.image_format() == source {
        return Ok(ProxiedImage { bytes, format: output });
    }

    let image = match target {
        Some((w, h)) => image.resize_exact(w, h, FilterType::Lanczos3),
        None => image,
    };

    let mut out = Vec::new();
    match output {
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
        }
        OutputFormat::Png => image.write_with_encoder(PngEncoder::new(&mut out))?,
        OutputFormat::Webp => {
            let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))?;
        }
    }
    Ok(ProxiedImage { bytes: out, format: output })
}

const MAX_REDIRECTS: usize = 5;

/// Hosts the proxy may fetch from: the storage host plus the allow-list
#[derive(Debug, Clone)]
struct HostRule {
    storage_host: String,
    allowed: Vec<String>,
}

impl HostRule {
    fn new(storage_base: &Url, allowed: &[String]) -> Self {
        Self {
            storage_host: storage_base.host_str().unwrap_or_default().to_lowercase(),
            allowed: allowed.iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    fn permits(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let host = url.host_str().unwrap_or_default().to_lowercase();
        host == self.storage_host || self.allowed.iter().any(|h| *h == host)
    }

    /// Every redirect hop must stay on a permitted host
    fn follows(&self, next: &Url, previous_hops: usize) -> bool {
        previous_hops < MAX_REDIRECTS && self.permits(next)
    }
}

fn redirect_policy(hosts: HostRule) -> Policy {
    Policy::custom(move |attempt| {
        if hosts.follows(attempt.url(), attempt.previous().len()) {
            attempt.follow()
        } else {
            warn!(target_url = %attempt.url(), "Refusing image source redirect");
            attempt.stop()
        }
    })
}

#[derive(Clone)]
pub struct ImageProxy {
    client: Client,
    settings: ImageProxySettings,
    storage_base: Url,
    hosts: HostRule,
    timeout: Duration,
}

impl ImageProxy {
    /// Sources are untrusted, so the proxy has its own client whose
    /// redirects are held to the same host rule as the first request.
    pub fn new(settings: &Settings) -> Result<Self> {
        // Trailing slash so relative paths join under the bucket
        let storage_base = Url::parse(&format!("{}/", settings.storage_public_base()))
            .context("SUPABASE_URL is not a valid URL")?;
        let hosts = HostRule::new(&storage_base, &settings.image_proxy.allowed_hosts);

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("estatehub-backend/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect_policy(hosts.clone()))
            .build()
            .context("Failed to create image proxy HTTP client")?;

        Ok(Self {
            client,
            hosts,
            timeout: Duration::from_secs(settings.image_proxy.timeout_seconds),
            settings: settings.image_proxy.clone(),
            storage_base,
        })
    }

    pub fn cache_max_age(&self) -> u64 {
        self.settings.cache_max_age_seconds
    }

    /// Resolve the `url` parameter: relative paths live in the storage
    /// bucket; absolute URLs must be http(s) on an allowed host.
    pub fn resolve_source(&self, raw: &str) -> Result<Url, ApiError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ApiError::bad_request("url is required"));
        }

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .storage_base
                .join(raw.trim_start_matches('/'))
                .map_err(|_| ApiError::bad_request("url is not a valid path"))?,
            Err(_) => return Err(ApiError::bad_request("url is not valid")),
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::bad_request("url must use http or https"));
        }
        if !self.hosts.permits(&url) {
            let host = url.host_str().unwrap_or_default();
            return Err(ApiError::bad_request(format!("host '{host}' is not allowed")));
        }

        Ok(url)
    }

    /// Validate and clamp the query into a plan
    pub fn plan(&self, query: &ImageQuery, accept: Option<&str>) -> Result<ImagePlan, ApiError> {
        let source = self.resolve_source(&query.url)?;

        let explicit = match query.fmt.as_deref().filter(|f| !f.trim().is_empty()) {
            Some(raw) => Some(OutputFormat::from_param(raw).ok_or_else(|| {
                ApiError::bad_request(format!("fmt '{raw}' is not one of jpeg, png, webp"))
            })?),
            None => None,
        };

        let max = self.settings.max_dimension.max(1);
        let width = query.w.map(|w| w.clamp(1, max));
        let height = query.h.map(|h| h.clamp(1, max));
        let quality = query
            .q
            .map(|q| q.clamp(1, 100) as u8)
            .unwrap_or(self.settings.default_quality.clamp(1, 100));
        let format = negotiate(explicit, accept);
        let etag = etag_for(&source, width, height, quality, format);

        Ok(ImagePlan {
            source,
            width,
            height,
            quality,
            format,
            etag,
        })
    }

    /// Fetch the source image with the size cap enforced while streaming
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ApiError> {
        let mut response = self
            .client
            .get(url.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| upstream_error(&e))?;

        let status = response.status();
        if status.is_redirection() {
            return Err(ApiError::bad_request(
                "Image source redirected to a host that is not allowed",
            ));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::not_found("Source image not found"));
        }
        if !status.is_success() {
            error!(status = %status, "Image source returned an error");
            return Err(ApiError::BadGateway(format!("Image source returned {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !content_type.starts_with("image/") {
            return Err(ApiError::bad_request("Source is not an image"));
        }

        let max = self.settings.max_source_bytes;
        let too_large = || ApiError::bad_request(format!("Source image exceeds {max} bytes"));
        if response.content_length().is_some_and(|len| len as usize > max) {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| upstream_error(&e))? {
            if bytes.len() + chunk.len() > max {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(size = bytes.len(), "Fetched source image");
        Ok(bytes)
    }

    /// Fetch and transform the image described by `plan`
    pub async fn render(&self, plan: &ImagePlan) -> Result<ProxiedImage, ApiError> {
        let bytes = self.fetch(&plan.source).await?;
        let source = image::guess_format(&bytes)
            .map_err(|_| ApiError::bad_request("Source image format is not recognised"))?;

        let (width, height, quality, format) = (plan.width, plan.height, plan.quality, plan.format);
        tokio::task::spawn_blocking(move || transform(bytes, source, width, height, quality, format))
            .await
            .map_err(|e| ApiError::internal(format!("Image task failed: {e}")))?
            .map_err(|e| {
                debug!(error = %e, "Image transform failed");
                ApiError::bad_request("Source image could not be processed")
            })
    }
}

fn upstream_error(e: &reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout("Fetching the source image timed out".into())
    } else {
        error!(error = %e, "Image source request failed");
        ApiError::BadGateway("Image source unavailable".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageProxySettings;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn proxy() -> ImageProxy {
        let settings = ImageProxySettings {
            allowed_hosts: vec!["images.example.com".into()],
            max_dimension: 2000,
            default_quality: 75,
            max_source_bytes: 1024,
            cache_max_age_seconds: 60,
            timeout_seconds: 5,
        };
        let storage_base =
            Url::parse("https://abc.supabase.co/storage/v1/object/public/media/").unwrap();
        ImageProxy {
            client: Client::new(),
            hosts: HostRule::new(&storage_base, &settings.allowed_hosts),
            settings,
            storage_base,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn redirects_must_stay_on_permitted_hosts() {
        let hosts = proxy().hosts;
        let url = |s: &str| Url::parse(s).unwrap();

        assert!(hosts.follows(&url("https://images.example.com/moved.jpg"), 0));
        assert!(hosts.follows(&url("https://abc.supabase.co/storage/v1/object/public/media/a.jpg"), 1));
        assert!(!hosts.follows(&url("http://169.254.169.254/latest/meta-data"), 0));
        assert!(!hosts.follows(&url("http://localhost:5432/"), 0));
        assert!(!hosts.follows(&url("file:///etc/passwd"), 0));
        assert!(!hosts.follows(&url("https://images.example.com/loop.jpg"), MAX_REDIRECTS));
    }

    fn query(url: &str) -> ImageQuery {
        ImageQuery {
            url: url.into(),
            w: None,
            h: None,
            q: None,
            fmt: None,
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn relative_urls_resolve_into_the_bucket() {
        let url = proxy().resolve_source("/projects/p1/a.jpg").unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/storage/v1/object/public/media/projects/p1/a.jpg"
        );
    }

    #[test]
    fn only_allowed_hosts_and_http_schemes() {
        let proxy = proxy();
        assert!(proxy.resolve_source("https://images.example.com/x.png").is_ok());
        assert!(proxy.resolve_source("https://ABC.supabase.co/other.png").is_ok());
        assert!(matches!(
            proxy.resolve_source("https://evil.example.com/x.png"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            proxy.resolve_source("file:///etc/passwd"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(proxy.resolve_source("  ").is_err());
    }

    #[test]
    fn format_negotiation_order() {
        assert_eq!(
            negotiate(Some(OutputFormat::Png), Some("image/webp")),
            FormatChoice::Fixed(OutputFormat::Png)
        );
        assert_eq!(
            negotiate(None, Some("image/avif,image/webp,*/*;q=0.8")),
            FormatChoice::Fixed(OutputFormat::Webp)
        );
        assert_eq!(negotiate(None, Some("image/webp;q=0")), FormatChoice::FromSource);
        assert_eq!(negotiate(None, None), FormatChoice::FromSource);
        assert_eq!(FormatChoice::FromSource.resolve(ImageFormat::Png), OutputFormat::Png);
        assert_eq!(FormatChoice::FromSource.resolve(ImageFormat::WebP), OutputFormat::Jpeg);
    }

    #[test]
    fn fitting_keeps_aspect_ratio_and_never_upscales() {
        assert_eq!(fit_within(4000, 2000, Some(1000), None), Some((1000, 500)));
        assert_eq!(fit_within(4000, 2000, Some(1000), Some(200)), Some((400, 200)));
        assert_eq!(fit_within(800, 600, Some(1600), Some(1200)), None);
        assert_eq!(fit_within(800, 600, None, None), None);
        assert_eq!(fit_within(1000, 1, Some(10), None), Some((10, 1)));
    }

    #[test]
    fn plan_clamps_parameters() {
        let proxy = proxy();
        let mut q = query("a.png");
        q.w = Some(10_000);
        q.h = Some(0);
        q.q = Some(500);
        let plan = proxy.plan(&q, None).unwrap();
        assert_eq!(plan.width, Some(2000));
        assert_eq!(plan.height, Some(1));
        assert_eq!(plan.quality, 100);

        q.fmt = Some("gif".into());
        assert!(matches!(proxy.plan(&q, None), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn etag_depends_on_params_and_format() {
        let proxy = proxy();
        let mut q = query("a.png");
        let base = proxy.plan(&q, None).unwrap();
        assert_eq!(base.etag, proxy.plan(&q, None).unwrap().etag);
        assert_ne!(base.etag, proxy.plan(&q, Some("image/webp")).unwrap().etag);
        q.w = Some(100);
        assert_ne!(base.etag, proxy.plan(&q, None).unwrap().etag);

        assert!(base.matches(&base.etag));
        assert!(base.matches(&format!("W/{}, \"other\"", base.etag)));
        assert!(base.matches("*"));
        assert!(!base.matches("\"other\""));
    }

    #[test]
    fn unchanged_images_pass_through() {
        let original = png(40, 20);
        let out = transform(original.clone(), ImageFormat::Png, Some(100), None, 80, FormatChoice::FromSource).unwrap();
        assert_eq!(out.format, OutputFormat::Png);
        assert_eq!(out.bytes, original);
    }

    #[test]
    fn resizes_and_converts() {
        let out = transform(
            png(40, 20),
            ImageFormat::Png,
            Some(10),
            None,
            80,
            FormatChoice::Fixed(OutputFormat::Jpeg),
        )
        .unwrap();
        assert_eq!(out.format, OutputFormat::Jpeg);
        let decoded = image::load_from_memory_with_format(&out.bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 5));

        let webp = transform(
            png(40, 20),
            ImageFormat::Png,
            None,
            None,
            80,
            FormatChoice::Fixed(OutputFormat::Webp),
        )
        .unwrap();
        assert_eq!(image::guess_format(&webp.bytes).unwrap(), ImageFormat::WebP);
    }
}
