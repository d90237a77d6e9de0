//! Test doubles for sources, loaders and predictors
#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use snaplabel_core::{Error, Result, Vocabulary};
use snaplabel_model::{ArtifactSource, Predictor, PredictorLoader, RawPrediction};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source that writes fixed bytes and counts how often it was asked
pub struct CountingSource {
    payload: Vec<u8>,
    fail_with: Option<String>,
    latency: Option<Duration>,
    calls: AtomicU32,
}

impl CountingSource {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            fail_with: None,
            latency: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Write part of the payload, then fail
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(b"partial".to_vec())
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactSource for CountingSource {
    fn describe(&self, remote_id: &str) -> String {
        format!("mock://{}", remote_id)
    }

    async fn fetch(&self, _remote_id: &str, dest: &Path) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        tokio::fs::write(dest, &self.payload).await?;
        match &self.fail_with {
            Some(message) => Err(Error::download(message.clone())),
            None => Ok(self.payload.len() as u64),
        }
    }
}

/// Predictor returning a scripted output
pub struct MockPredictor {
    vocabulary: Arc<Vocabulary>,
    output: Mutex<Result<RawPrediction>>,
    calls: AtomicU32,
    last_input: Mutex<Option<RgbImage>>,
}

impl MockPredictor {
    pub fn new(labels: &[&str], output: RawPrediction) -> Self {
        Self {
            vocabulary: Arc::new(Vocabulary::new(labels.iter().copied()).unwrap()),
            output: Mutex::new(Ok(output)),
            calls: AtomicU32::new(0),
            last_input: Mutex::new(None),
        }
    }

    /// Predictor for `cat/dog/bird` that always answers `cat`
    pub fn pets() -> Self {
        Self::new(
            &["bird", "cat", "dog"],
            RawPrediction {
                label: "cat".to_string(),
                index: 1,
                probabilities: vec![0.1, 0.7, 0.2],
            },
        )
    }

    pub fn set_output(&self, output: Result<RawPrediction>) {
        *self.output.lock().unwrap() = output;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<RgbImage> {
        self.last_input.lock().unwrap().clone()
    }
}

impl Predictor for MockPredictor {
    fn name(&self) -> &str {
        "mock"
    }

    fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    fn predict(&self, image: &RgbImage) -> Result<RawPrediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(image.clone());

        match &*self.output.lock().unwrap() {
            Ok(raw) => Ok(raw.clone()),
            Err(e) => Err(match e.kind() {
                snaplabel_core::ErrorKind::ImageConversion => Error::image_conversion(e.to_string()),
                _ => Error::inference(e.to_string()),
            }),
        }
    }
}

/// Loader handing out a fixed predictor, recording every load
pub struct CountingLoader {
    predictor: Arc<MockPredictor>,
    loads: AtomicUsize,
    seen_paths: Mutex<Vec<PathBuf>>,
    fail: bool,
}

impl CountingLoader {
    pub fn new(predictor: Arc<MockPredictor>) -> Self {
        Self {
            predictor,
            loads: AtomicUsize::new(0),
            seen_paths: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Arc::new(MockPredictor::pets()))
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen_paths.lock().unwrap().clone()
    }
}

impl PredictorLoader for CountingLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Predictor>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.seen_paths.lock().unwrap().push(path.to_path_buf());

        if !path.exists() {
            return Err(Error::model_load(format!("{} does not exist", path.display())));
        }
        if self.fail {
            return Err(Error::model_load("artifact is truncated"));
        }
        Ok(self.predictor.clone())
    }
}

/// Encode an image in the given container format
pub fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// Insert an EXIF block carrying `orientation` right after the JPEG SOI marker
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");

    let mut exif = Vec::new();
    exif.extend_from_slice(b"Exif\0\0");
    // Big-endian TIFF header, first IFD at offset 8
    exif.extend_from_slice(b"MM\x00\x2A\x00\x00\x00\x08");
    // One entry: Orientation (0x0112), SHORT, count 1
    exif.extend_from_slice(&1u16.to_be_bytes());
    exif.extend_from_slice(&0x0112u16.to_be_bytes());
    exif.extend_from_slice(&3u16.to_be_bytes());
    exif.extend_from_slice(&1u32.to_be_bytes());
    exif.extend_from_slice(&orientation.to_be_bytes());
    exif.extend_from_slice(&[0, 0]);
    // No next IFD
    exif.extend_from_slice(&0u32.to_be_bytes());

    let mut out = Vec::with_capacity(jpeg.len() + exif.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((exif.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&exif);
    out.extend_from_slice(&jpeg[2..]);
    out
}
