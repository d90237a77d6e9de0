//! Tests for the download-once artifact cache

mod support;

use sha2::{Digest, Sha256};
use snaplabel_core::ErrorKind;
use snaplabel_model::ArtifactFetcher;
use std::sync::Arc;
use support::CountingSource;

#[tokio::test]
async fn test_downloads_once_then_reuses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let source = Arc::new(CountingSource::new(b"weights".to_vec()));
    let fetcher = ArtifactFetcher::new(source.clone());

    for _ in 0..3 {
        let local = fetcher.ensure_local("abc123", &path).await.unwrap();
        assert_eq!(local, path);
    }

    assert_eq!(source.calls(), 1);
    assert_eq!(std::fs::read(&path).unwrap(), b"weights");
}

#[tokio::test]
async fn test_existing_file_is_trusted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    std::fs::write(&path, b"already here").unwrap();

    let source = Arc::new(CountingSource::new(b"fresh".to_vec()));
    let fetcher = ArtifactFetcher::new(source.clone()).with_sha256("0".repeat(64));

    fetcher.ensure_local("abc123", &path).await.unwrap();

    assert_eq!(source.calls(), 0);
    assert_eq!(std::fs::read(&path).unwrap(), b"already here");
}

#[tokio::test]
async fn test_cached_file_needs_no_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    std::fs::write(&path, b"cached").unwrap();

    let source = Arc::new(CountingSource::new(b"fresh".to_vec()));
    let fetcher = ArtifactFetcher::new(source.clone());

    assert!(fetcher.ensure_local("", &path).await.is_ok());
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_failed_download_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let source = Arc::new(CountingSource::failing("connection reset"));
    let fetcher = ArtifactFetcher::new(source.clone());

    let err = fetcher.ensure_local("abc123", &path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Download);
    assert!(err.to_string().contains("connection reset"));

    assert!(!path.exists());
    assert!(!dir.path().join("model.safetensors.part").exists());

    // The next attempt goes back to the source
    let _ = fetcher.ensure_local("abc123", &path).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_checksum_mismatch_is_a_download_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let source = Arc::new(CountingSource::new(b"tampered".to_vec()));
    let fetcher = ArtifactFetcher::new(source).with_sha256("ab".repeat(32));

    let err = fetcher.ensure_local("abc123", &path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Download);
    assert!(err.to_string().contains("checksum mismatch"));
    assert!(!path.exists());
    assert!(!dir.path().join("model.safetensors.part").exists());
}

#[tokio::test]
async fn test_checksum_match_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let payload = b"genuine weights".to_vec();
    let digest = format!("{:X}", Sha256::digest(&payload));

    let source = Arc::new(CountingSource::new(payload.clone()));
    // Upper-case digests are accepted too
    let fetcher = ArtifactFetcher::new(source).with_sha256(digest);

    fetcher.ensure_local("abc123", &path).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), payload);
}

#[tokio::test]
async fn test_invalid_identifier_is_rejected_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    let source = Arc::new(CountingSource::new(b"weights".to_vec()));
    let fetcher = ArtifactFetcher::new(source.clone());

    for id in ["", "  ", "has space", "../escape"] {
        let err = fetcher.ensure_local(id, &path).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download, "id {:?}", id);
    }
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache").join("models").join("pets.safetensors");
    let source = Arc::new(CountingSource::new(b"weights".to_vec()));
    let fetcher = ArtifactFetcher::new(source);

    fetcher.ensure_local("abc123", &path).await.unwrap();
    assert!(path.is_file());
}
