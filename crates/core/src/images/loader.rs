//! Turns an image URL into an [`ImageOutcome`].

use std::io::Cursor;
use std::sync::Arc;

use image::ImageFormat;

use super::{ImageConfig, ImageContent, ImageOutcome};
use crate::fetch::Fetcher;
use crate::unique::sanitize_file_name;

/// Downloads, names, filters and optionally normalizes one image.
pub struct ImageLoader {
    fetcher: Arc<dyn Fetcher>,
    config: ImageConfig,
}

impl ImageLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: ImageConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Never fails: transport and format problems become
    /// [`ImageOutcome::Failed`] with the reason.
    pub fn load(&self, url: &str) -> ImageOutcome {
        tracing::trace!(url, "Retrieving image");
        match self.try_load(url) {
            Ok(outcome) => outcome,
            Err(reason) => {
                tracing::trace!(url, %reason, "Could not retrieve image");
                ImageOutcome::Failed(reason)
            }
        }
    }

    fn try_load(&self, url: &str) -> Result<ImageOutcome, String> {
        let response = self.fetcher.get(url).map_err(|e| e.to_string())?;
        if !response.is_ok() {
            return Err(format!("GET {url} returned {}", response.status));
        }
        if response.body.is_empty() {
            return Err(format!("GET {url} returned zero bytes"));
        }

        let extension = extension_from_url(url)
            .or_else(|| response.content_type.as_deref().and_then(extension_from_content_type))
            .or_else(|| extension_from_bytes(&response.body))
            .ok_or_else(|| format!("Unknown extension for URL {url}"))?;

        let content = ImageContent {
            bytes: response.body,
            name: sanitize_file_name(&name_from_url(url), "image"),
            extension: clean_extension(&extension),
        };

        if !self.config.needs_decode() {
            tracing::trace!(url, "Retrieved image");
            return Ok(ImageOutcome::Available(Arc::new(content)));
        }

        let decoded = image::load_from_memory(&content.bytes).map_err(|e| format!("Cannot decode {url}: {e}"))?;
        if decoded.width() <= self.config.min_width || decoded.height() <= self.config.min_height {
            tracing::trace!(url, width = decoded.width(), height = decoded.height(), "Image too small to be used");
            return Ok(ImageOutcome::Excluded);
        }

        if self.config.to_png {
            let mut out = Cursor::new(Vec::new());
            decoded
                .write_to(&mut out, ImageFormat::Png)
                .map_err(|e| format!("Cannot convert {url} to PNG: {e}"))?;
            tracing::trace!(url, "Retrieved image and converted to PNG");
            return Ok(ImageOutcome::Available(Arc::new(ImageContent {
                bytes: out.into_inner(),
                name: content.name,
                extension: ".png".to_string(),
            })));
        }

        tracing::trace!(url, "Retrieved image");
        Ok(ImageOutcome::Available(Arc::new(content)))
    }
}

/// URL without its query string.
fn url_path(url: &str) -> &str {
    match url.find('?') {
        Some(pos) if pos > 0 => &url[..pos],
        _ => url,
    }
}

fn last_segment(url: &str) -> &str {
    let path = url_path(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Base name of the last path segment without its extension.
pub(crate) fn name_from_url(url: &str) -> String {
    let segment = last_segment(url);
    let stem = match segment.rfind('.') {
        Some(pos) => &segment[..pos],
        None => segment,
    };
    if stem.is_empty() { "image".to_string() } else { stem.to_string() }
}

/// `.ext` from the URL path when the extension is one to three characters.
pub(crate) fn extension_from_url(url: &str) -> Option<String> {
    let segment = last_segment(url);
    let ext = &segment[segment.rfind('.')? + 1..];
    (!ext.is_empty() && ext.chars().count() <= 3).then(|| format!(".{ext}"))
}

/// `.subtype` from an `image/subtype` content type, parameters ignored.
pub(crate) fn extension_from_content_type(content_type: &str) -> Option<String> {
    let mime = content_type.split([';', ' ']).next().unwrap_or_default().trim();
    let subtype = mime.strip_prefix("image/")?;
    (!subtype.is_empty()).then(|| format!(".{subtype}"))
}

/// Lowercase `.ext` with anything but ASCII letters and digits removed.
fn clean_extension(ext: &str) -> String {
    let cleaned: String = ext.chars().filter(char::is_ascii_alphanumeric).collect();
    if cleaned.is_empty() { ".image".to_string() } else { format!(".{}", cleaned.to_ascii_lowercase()) }
}

/// Extension sniffed from the leading bytes.
pub(crate) fn extension_from_bytes(bytes: &[u8]) -> Option<String> {
    let format = image::guess_format(bytes).ok()?;
    format.extensions_str().first().map(|ext| format!(".{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use crate::images::ImageConfig;
    use crate::testing::{FakeFetcher, image_bytes, png_bytes};
    use rstest::rstest;

    fn loader(fetcher: FakeFetcher, config: ImageConfig) -> ImageLoader {
        ImageLoader::new(Arc::new(fetcher), config)
    }

    #[rstest]
    #[case("http://a.example/img/photo.jpg", "photo", Some(".jpg"))]
    #[case("http://a.example/img/photo.JPG?w=100", "photo", Some(".JPG"))]
    #[case("http://a.example/img/photo.jpeg", "photo", None)]
    #[case("http://a.example/img/render", "render", None)]
    #[case("http://a.example/img/.png", "image", Some(".png"))]
    #[case("http://a.example/img/", "image", None)]
    fn test_names_from_url(#[case] url: &str, #[case] name: &str, #[case] ext: Option<&str>) {
        assert_eq!(name_from_url(url), name);
        assert_eq!(extension_from_url(url).as_deref(), ext);
    }

    #[rstest]
    #[case("image/gif", Some(".gif"))]
    #[case("image/jpeg; charset=binary", Some(".jpeg"))]
    #[case("image/", None)]
    #[case("text/html", None)]
    fn test_extension_from_content_type(#[case] ct: &str, #[case] expected: Option<&str>) {
        assert_eq!(extension_from_content_type(ct).as_deref(), expected);
    }

    #[rstest]
    #[case(".GIF", ".gif")]
    #[case(".svg+xml", ".svgxml")]
    #[case(".", ".image")]
    fn test_clean_extension(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(clean_extension(raw), expected);
    }

    #[test]
    fn test_extension_from_magic_bytes() {
        assert_eq!(extension_from_bytes(&png_bytes(2, 2)).as_deref(), Some(".png"));
        assert_eq!(extension_from_bytes(b"plain text").as_deref(), None);
    }

    #[test]
    fn test_load_uses_url_extension() {
        let url = "http://a.example/Pic%20One.GIF";
        let fetcher = FakeFetcher::new().with(url, FetchResponse::ok(vec![1, 2, 3], Some("image/png")));
        let outcome = loader(fetcher, ImageConfig::default()).load(url);

        let ImageOutcome::Available(content) = outcome else { panic!("expected an available image") };
        assert_eq!(content.name, "Pic%20One");
        assert_eq!(content.extension, ".gif");
        assert_eq!(content.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_load_falls_back_to_content_type_then_magic() {
        let by_header = "http://a.example/render";
        let by_magic = "http://a.example/blob";
        let fetcher = FakeFetcher::new()
            .with(by_header, FetchResponse::ok(vec![9; 4], Some("image/webp")))
            .with(by_magic, FetchResponse::ok(png_bytes(3, 3), Some("application/octet-stream")));
        let loader = loader(fetcher, ImageConfig::default());

        let ImageOutcome::Available(a) = loader.load(by_header) else { panic!() };
        assert_eq!(a.extension, ".webp");
        let ImageOutcome::Available(b) = loader.load(by_magic) else { panic!() };
        assert_eq!(b.extension, ".png");
    }

    #[rstest]
    #[case(FetchResponse { status: 404, ..Default::default() }, "returned 404")]
    #[case(FetchResponse::ok(Vec::new(), Some("image/png")), "zero bytes")]
    #[case(FetchResponse::ok(b"not an image".to_vec(), None), "Unknown extension")]
    fn test_load_failures(#[case] response: FetchResponse, #[case] reason: &str) {
        let url = "http://a.example/thing";
        let fetcher = FakeFetcher::new().with(url, response);
        match loader(fetcher, ImageConfig::default()).load(url) {
            ImageOutcome::Failed(msg) => assert!(msg.contains(reason), "{msg}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_transport_error_is_failure() {
        let outcome = loader(FakeFetcher::new(), ImageConfig::default()).load("http://a.example/x.png");
        assert!(matches!(outcome, ImageOutcome::Failed(_)));
    }

    #[rstest]
    #[case(1, 5, 5)]
    #[case(5, 1, 5)]
    #[case(5, 5, 5)]
    fn test_small_images_are_excluded(#[case] width: u32, #[case] height: u32, #[case] min: u32) {
        let url = "http://a.example/pixel.png";
        let fetcher = FakeFetcher::new().with(url, FetchResponse::ok(png_bytes(width, height), None));
        let config = ImageConfig::builder().min_width(min).min_height(min).build();

        assert_eq!(loader(fetcher, config).load(url), ImageOutcome::Excluded);
    }

    #[test]
    fn test_only_width_minimum() {
        let url = "http://a.example/tall.png";
        let fetcher = FakeFetcher::new().with(url, FetchResponse::ok(png_bytes(10, 1), None));
        let config = ImageConfig::builder().min_width(4).build();

        assert!(loader(fetcher, config).load(url).is_available());
    }

    #[test]
    fn test_undecodable_with_minimum_is_failure() {
        let url = "http://a.example/broken.png";
        let fetcher = FakeFetcher::new().with(url, FetchResponse::ok(vec![0x89, b'P', b'N', b'G'], None));
        let config = ImageConfig::builder().min_width(1).build();

        assert!(matches!(loader(fetcher, config).load(url), ImageOutcome::Failed(_)));
    }

    #[test]
    fn test_to_png_reencodes() {
        let url = "http://a.example/photo.jpg";
        let jpeg = image_bytes(8, 8, ImageFormat::Jpeg);
        let fetcher = FakeFetcher::new().with(url, FetchResponse::ok(jpeg, None));
        let config = ImageConfig::builder().to_png(true).build();

        let ImageOutcome::Available(content) = loader(fetcher, config).load(url) else { panic!() };
        assert_eq!(content.name, "photo");
        assert_eq!(content.extension, ".png");
        assert_eq!(image::guess_format(&content.bytes).unwrap(), ImageFormat::Png);
    }
}
