//! Full update cycles with persisted JSON state.

use crate::common::*;
use anyhow::Result;
use binguard_cli::core::ErrorKind;
use binguard_cli::test_utils::{ArtifactFixture, RecordingNotifier, init_test_logging};
use binguard_cli::upgrade::{
    DownloadCoordinator, DownloadEvent, DownloadState, HttpReleaseOracle, InstalledBinaryState,
    IntegrityVerifier, JsonStateStore, StateStore, UpdateOutcome,
};
use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn json_coordinator(
    server: &ReleaseServer,
    binary: &Path,
    store: Arc<JsonStateStore>,
    notifier: Arc<RecordingNotifier>,
) -> Result<DownloadCoordinator> {
    let config = server.config();
    let client = reqwest::Client::new();
    let oracle = Arc::new(HttpReleaseOracle::new(client.clone(), config.clone(), linux()));
    Ok(DownloadCoordinator::builder(config, oracle, store)
        .client(client)
        .binary_path(binary)
        .notifier(notifier)
        .build()?)
}

async fn seed_stale_install(temp: &TempDir) -> Result<(std::path::PathBuf, Arc<JsonStateStore>)> {
    let binary = temp.path().join("bin").join(ARTIFACT);
    std::fs::create_dir_all(binary.parent().unwrap())?;
    std::fs::write(&binary, b"#!/bin/sh\necho engine 1.342.2\n")?;

    let store = Arc::new(JsonStateStore::new(temp.path().join("state.json")));
    store
        .save(&InstalledBinaryState {
            version: Some("1.342.2".into()),
            last_checked_at: Some(Utc::now() - Duration::days(5)),
            protocol_version: Some(1),
            executable_bit_set: true,
            ..InstalledBinaryState::new(&binary)
        })
        .await?;
    Ok((binary, store))
}

#[tokio::test]
async fn test_stale_install_is_updated() -> Result<()> {
    init_test_logging(None);
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 300 * 1024);
    server.mount_release("1.345.1", &fixture).await;

    let temp = TempDir::new()?;
    let (binary, store) = seed_stale_install(&temp).await?;
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = json_coordinator(&server, &binary, store.clone(), notifier.clone())?;
    let mut events = coordinator.subscribe();
    let started = Utc::now();

    let outcome = coordinator.request_update(false).await?;

    let UpdateOutcome::Installed(state) = outcome else {
        panic!("expected an install, got {outcome:?}");
    };
    assert_eq!(state.version.as_deref(), Some("1.345.1"));
    assert_eq!(std::fs::read(&binary)?, fixture.bytes);
    assert_eq!(IntegrityVerifier::digest_file(&binary).await?, fixture.sha256);

    let persisted = store.load().await?.unwrap();
    assert_eq!(persisted.version.as_deref(), Some("1.345.1"));
    assert!(persisted.last_checked_at.unwrap() >= started);
    assert_eq!(persisted.sha256.as_deref(), Some(fixture.sha256.as_str()));
    assert_eq!(persisted.protocol_version, Some(1));

    let seen = drain(&mut events);
    let states: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            DownloadState::CheckingVersion,
            DownloadState::Downloading,
            DownloadState::Verifying,
            DownloadState::Installing,
            DownloadState::Idle,
        ]
    );
    let done = finished(&seen);
    assert_eq!(done.len(), 1);
    assert!(done[0].success);
    assert_eq!(done[0].installed_version.as_deref(), Some("1.345.1"));
    assert!(notifier.notices().is_empty());

    coordinator.verify_installed().await?;
    Ok(())
}

#[tokio::test]
async fn test_release_endpoint_down_keeps_state() -> Result<()> {
    init_test_logging(None);
    let server = ReleaseServer::start().await;
    server.mount_version_status(503).await;

    let temp = TempDir::new()?;
    let (binary, store) = seed_stale_install(&temp).await?;
    let before = std::fs::read(temp.path().join("state.json"))?;
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = json_coordinator(&server, &binary, store.clone(), notifier.clone())?;
    let mut events = coordinator.subscribe();

    let err = coordinator.request_update(false).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(std::fs::read(temp.path().join("state.json"))?, before);
    assert_eq!(std::fs::read(&binary)?, b"#!/bin/sh\necho engine 1.342.2\n");

    let done = finished(&drain(&mut events));
    assert_eq!(done.len(), 1);
    assert!(!done[0].success);
    assert_eq!(done[0].error, Some(ErrorKind::Network));

    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].message.starts_with("Failed to fetch the latest release info"));
    assert!(!coordinator.is_in_progress());
    Ok(())
}

#[tokio::test]
async fn test_tampered_binary_fails_verification() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_release("1.345.1", &fixture).await;

    let temp = TempDir::new()?;
    let (binary, store) = seed_stale_install(&temp).await?;
    let coordinator =
        json_coordinator(&server, &binary, store, Arc::new(RecordingNotifier::default()))?;
    coordinator.request_update(false).await?;

    std::fs::write(&binary, fixture.corrupted())?;
    let err = coordinator.verify_installed().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    Ok(())
}
