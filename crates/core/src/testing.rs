//! Shared fakes for unit tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, RgbImage};
use parking_lot::Mutex;

use crate::fetch::{FetchResponse, Fetcher};
use crate::{QuireError, Result};

/// In-memory [`Fetcher`] that counts requests per URL.
#[derive(Default)]
pub struct FakeFetcher {
    responses: HashMap<String, FetchResponse>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, response: FetchResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// Sleep inside every request, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl Fetcher for FakeFetcher {
    fn get(&self, url: &str) -> Result<FetchResponse> {
        *self.calls.lock().entry(url.to_string()).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| QuireError::InvalidUrl(format!("no route to {url}")))
    }
}

/// Encodes a solid `width` x `height` image in `format`.
pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 80, 40])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Png)
}
