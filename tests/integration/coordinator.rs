//! DownloadCoordinator sessions: single-flight, cancellation, retry and recovery.

use crate::common::*;
use anyhow::Result;
use binguard_cli::core::ErrorKind;
use binguard_cli::test_utils::{ArtifactFixture, RecordingDependent, RecordingNotifier, init_test_logging};
use binguard_cli::upgrade::{
    DownloadCoordinator, DownloadEvent, DownloadState, HttpReleaseOracle, InstalledBinaryState,
    MemoryStateStore, PromptAction, UpdateConfig, UpdateOutcome,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn installed(binary: &std::path::Path, version: &str, days_ago: i64) -> InstalledBinaryState {
    InstalledBinaryState {
        version: Some(version.to_string()),
        last_checked_at: Some(Utc::now() - ChronoDuration::days(days_ago)),
        protocol_version: Some(1),
        ..InstalledBinaryState::new(binary)
    }
}

#[tokio::test]
async fn test_concurrent_requests_share_one_session() -> Result<()> {
    init_test_logging(None);
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_version("1.345.1").await;
    server.mount_checksum("1.345.1", &fixture).await;
    server
        .mount_artifact("1.345.1", fixture.bytes.clone(), Some(Duration::from_millis(200)))
        .await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    let coordinator = coordinator(
        server.config(),
        &binary,
        Arc::new(MemoryStateStore::default()),
        Arc::new(RecordingNotifier::default()),
    );
    let mut events = coordinator.subscribe();

    let (first, second) = tokio::join!(coordinator.request_update(true), async {
        let in_progress = coordinator.is_in_progress();
        (in_progress, coordinator.request_update(true).await)
    });

    assert!(matches!(first?, UpdateOutcome::Installed(_)));
    let (observed_in_progress, second) = second;
    assert!(observed_in_progress);
    assert_eq!(second?, UpdateOutcome::AlreadyInProgress);

    let seen = drain(&mut events);
    let started = seen.iter().filter(|e| matches!(e, DownloadEvent::Started { .. })).count();
    assert_eq!(started, 1);
    assert_eq!(finished(&seen).len(), 1);
    assert_eq!(server.hits(VERSION_PATH).await, 1);
    assert_eq!(server.hits(&artifact_path("1.345.1")).await, 1);
    assert!(!coordinator.is_in_progress());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_callers_install_once() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_version("1.345.1").await;
    server.mount_checksum("1.345.1", &fixture).await;
    server
        .mount_artifact("1.345.1", fixture.bytes.clone(), Some(Duration::from_millis(500)))
        .await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    let coordinator = coordinator(
        server.config(),
        &binary,
        Arc::new(MemoryStateStore::default()),
        Arc::new(RecordingNotifier::default()),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.request_update(true).await })
        })
        .collect();

    let mut installs = 0;
    for handle in handles {
        match handle.await?? {
            UpdateOutcome::Installed(_) => installs += 1,
            UpdateOutcome::AlreadyInProgress => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(installs, 1);
    assert_eq!(server.hits(&artifact_path("1.345.1")).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_cancel_mid_download_cleans_up() -> Result<()> {
    init_test_logging(None);
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_version("1.345.1").await;
    server.mount_checksum("1.345.1", &fixture).await;
    server
        .mount_artifact("1.345.1", fixture.bytes.clone(), Some(Duration::from_secs(10)))
        .await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    std::fs::write(&binary, b"engine 1.342.2")?;
    let store = Arc::new(MemoryStateStore::with_state(installed(&binary, "1.342.2", 1)));
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = coordinator(server.config(), &binary, store.clone(), notifier.clone());
    let mut events = coordinator.subscribe();

    let session = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_update(true).await })
    };

    loop {
        if let DownloadEvent::StateChanged {
            state: DownloadState::Downloading,
            ..
        } = events.recv().await?
        {
            break;
        }
    }
    assert!(coordinator.is_in_progress());
    coordinator.cancel();
    assert!(!coordinator.is_in_progress());

    assert_eq!(session.await??, UpdateOutcome::Cancelled);
    assert_eq!(std::fs::read(&binary)?, b"engine 1.342.2");
    assert_eq!(dir_entries(temp.path()), vec![binary]);
    assert_eq!(store.save_count(), 0);
    assert!(notifier.notices().is_empty());

    let done = finished(&drain(&mut events));
    assert_eq!(done.len(), 1);
    assert!(!done[0].success);
    assert_eq!(done[0].error, Some(ErrorKind::Cancelled));
    Ok(())
}

#[tokio::test]
async fn test_transient_checksum_failure_is_retried() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_version("1.345.1").await;
    server.mount_checksum("1.345.1", &fixture).await;
    Mock::given(method("GET"))
        .and(path(artifact_path("1.345.1")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fixture.corrupted()))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server.server)
        .await;
    server.mount_artifact("1.345.1", fixture.bytes.clone(), None).await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator =
        coordinator(server.config(), &binary, Arc::new(MemoryStateStore::default()), notifier.clone());

    let outcome = coordinator.request_update(true).await?;

    assert!(matches!(outcome, UpdateOutcome::Installed(_)));
    assert_eq!(std::fs::read(&binary)?, fixture.bytes);
    assert_eq!(server.hits(&artifact_path("1.345.1")).await, 2);
    assert!(notifier.notices().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_persistent_checksum_failure_is_surfaced() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_version("1.345.1").await;
    server.mount_checksum("1.345.1", &fixture).await;
    server.mount_artifact("1.345.1", fixture.corrupted(), None).await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    std::fs::write(&binary, b"engine 1.342.2")?;
    let before = installed(&binary, "1.342.2", 10);
    let store = Arc::new(MemoryStateStore::with_state(before.clone()));
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = coordinator(server.config(), &binary, store.clone(), notifier.clone());
    let mut events = coordinator.subscribe();

    let err = coordinator.request_update(false).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    assert_eq!(server.hits(&artifact_path("1.345.1")).await, 2);
    assert_eq!(std::fs::read(&binary)?, b"engine 1.342.2");
    assert_eq!(store.snapshot().await, Some(before));

    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].message.contains("integrity check failed"));
    assert_eq!(notices[0].actions, vec![PromptAction::RetryDownload, PromptAction::ContactSupport]);

    let done = finished(&drain(&mut events));
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].error, Some(ErrorKind::ChecksumMismatch));
    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_offers_support_only() -> Result<()> {
    let server = ReleaseServer::start().await;
    server.mount_version("1.345.1").await;
    Mock::given(method("GET"))
        .and(path(format!("{}.sha256", artifact_path("1.345.1"))))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server.server)
        .await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator =
        coordinator(server.config(), &binary, Arc::new(MemoryStateStore::default()), notifier.clone());

    let err = coordinator.request_update(true).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::HttpStatus);
    assert_eq!(server.hits(&format!("{}.sha256", artifact_path("1.345.1"))).await, 1);
    assert_eq!(server.hits(&artifact_path("1.345.1")).await, 0);
    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].actions, vec![PromptAction::ContactSupport]);
    Ok(())
}

#[tokio::test]
async fn test_up_to_date_skips_download() -> Result<()> {
    let server = ReleaseServer::start().await;
    server.mount_version("1.345.1").await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    std::fs::write(&binary, b"engine 1.345.1")?;
    let store = Arc::new(MemoryStateStore::with_state(installed(&binary, "1.345.1", 7)));
    let coordinator =
        coordinator(server.config(), &binary, store.clone(), Arc::new(RecordingNotifier::default()));

    let outcome = coordinator.request_update(false).await?;

    assert_eq!(
        outcome,
        UpdateOutcome::UpToDate {
            version: Some("1.345.1".into())
        }
    );
    assert_eq!(server.hits(&artifact_path("1.345.1")).await, 0);
    let state = store.snapshot().await.unwrap();
    assert!(state.last_checked_at.unwrap() > Utc::now() - ChronoDuration::minutes(1));
    Ok(())
}

#[tokio::test]
async fn test_recent_check_is_not_repeated() -> Result<()> {
    let server = ReleaseServer::start().await;
    server.mount_version("1.345.1").await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    std::fs::write(&binary, b"engine 1.342.2")?;
    let store = Arc::new(MemoryStateStore::with_state(installed(&binary, "1.342.2", 3)));
    let coordinator =
        coordinator(server.config(), &binary, store, Arc::new(RecordingNotifier::default()));

    assert_eq!(coordinator.request_update(false).await?, UpdateOutcome::NotDue);
    assert_eq!(server.hits(VERSION_PATH).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_binary_forces_download() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_release("1.345.1", &fixture).await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    // Checked today and on the latest version, but the file is gone.
    let store = Arc::new(MemoryStateStore::with_state(installed(&binary, "1.345.1", 0)));
    let coordinator =
        coordinator(server.config(), &binary, store, Arc::new(RecordingNotifier::default()));

    assert!(matches!(coordinator.request_update(false).await?, UpdateOutcome::Installed(_)));
    assert_eq!(std::fs::read(&binary)?, fixture.bytes);
    Ok(())
}

#[tokio::test]
async fn test_protocol_mismatch_reinstalls_same_version() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_release("1.345.1", &fixture).await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    std::fs::write(&binary, b"engine for protocol 0")?;
    let state = InstalledBinaryState {
        protocol_version: Some(0),
        ..installed(&binary, "1.345.1", 1)
    };
    let store = Arc::new(MemoryStateStore::with_state(state));
    let coordinator =
        coordinator(server.config(), &binary, store.clone(), Arc::new(RecordingNotifier::default()));

    let UpdateOutcome::Installed(state) = coordinator.request_update(false).await? else {
        panic!("expected an install");
    };
    assert_eq!(state.protocol_version, Some(1));
    assert_eq!(store.snapshot().await.unwrap().protocol_version, Some(1));
    Ok(())
}

#[tokio::test]
async fn test_forced_prerelease_is_never_persisted() -> Result<()> {
    init_test_logging(None);
    let rc = ReleaseServer::start().await;
    let rc_fixture = ArtifactFixture::new("2.0.0-rc", 4096);
    rc.mount_release("2.0.0-rc", &rc_fixture).await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    std::fs::write(&binary, b"engine 1.345.1")?;
    let before = installed(&binary, "1.345.1", 5);
    let store = Arc::new(MemoryStateStore::with_state(before.clone()));
    let notifier = Arc::new(RecordingNotifier::default());

    let err = coordinator(rc.config(), &binary, store.clone(), notifier.clone())
        .request_update(true)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedVersion);
    assert_eq!(rc.hits(&artifact_path("2.0.0-rc")).await, 0);
    assert_eq!(store.snapshot().await, Some(before));
    assert_eq!(std::fs::read(&binary)?, b"engine 1.345.1");
    assert_eq!(notifier.notices().len(), 1);

    // The next automatic request still compares and updates normally.
    let stable = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.346.0", 4096);
    stable.mount_release("1.346.0", &fixture).await;
    let automatic = coordinator(stable.config(), &binary, store.clone(), notifier);

    assert!(matches!(automatic.request_update(false).await?, UpdateOutcome::Installed(_)));
    assert_eq!(store.snapshot().await.unwrap().version.as_deref(), Some("1.346.0"));
    Ok(())
}

#[tokio::test]
async fn test_dependents_are_stopped_and_restarted() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_release("1.345.1", &fixture).await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    let config = server.config();
    let client = reqwest::Client::new();
    let oracle = Arc::new(HttpReleaseOracle::new(client.clone(), config.clone(), linux()));
    let server_process = Arc::new(RecordingDependent::new("language-server"));
    let stubborn = Arc::new(RecordingDependent::failing("indexer"));

    let coordinator = DownloadCoordinator::builder(config, oracle, Arc::new(MemoryStateStore::default()))
        .client(client)
        .binary_path(&binary)
        .dependent(server_process.clone())
        .dependent(stubborn.clone())
        .build()?;

    assert!(matches!(coordinator.request_update(true).await?, UpdateOutcome::Installed(_)));
    assert_eq!((server_process.stops(), server_process.restarts()), (1, 1));
    assert_eq!((stubborn.stops(), stubborn.restarts()), (1, 1));
    Ok(())
}

#[tokio::test]
async fn test_operation_deadline_reports_network_error() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_version("1.345.1").await;
    server.mount_checksum("1.345.1", &fixture).await;
    server
        .mount_artifact("1.345.1", fixture.bytes.clone(), Some(Duration::from_secs(10)))
        .await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    let config = UpdateConfig {
        operation_timeout_secs: Some(1),
        ..server.config()
    };
    let coordinator = coordinator(
        config,
        &binary,
        Arc::new(MemoryStateStore::default()),
        Arc::new(RecordingNotifier::default()),
    );

    let err = coordinator.request_update(true).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(dir_entries(temp.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_wait_for_idle_after_session() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server.mount_version("1.345.1").await;
    server.mount_checksum("1.345.1", &fixture).await;
    server
        .mount_artifact("1.345.1", fixture.bytes.clone(), Some(Duration::from_millis(300)))
        .await;

    let temp = TempDir::new()?;
    let binary = temp.path().join(ARTIFACT);
    let coordinator = coordinator(
        server.config(),
        &binary,
        Arc::new(MemoryStateStore::default()),
        Arc::new(RecordingNotifier::default()),
    );

    let session = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_update(true).await })
    };
    while !coordinator.is_in_progress() {
        tokio::task::yield_now().await;
    }

    tokio::time::timeout(Duration::from_secs(10), coordinator.wait_for_idle()).await?;
    assert!(!coordinator.is_in_progress());
    assert!(binary.exists());
    assert!(matches!(session.await??, UpdateOutcome::Installed(_)));
    Ok(())
}
