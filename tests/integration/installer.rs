//! AtomicInstaller against a mocked artifact server.

use crate::common::*;
use anyhow::Result;
use binguard_cli::core::ErrorKind;
use binguard_cli::test_utils::{ArtifactFixture, init_test_logging};
use binguard_cli::upgrade::events::{EventBus, SessionReporter};
use binguard_cli::upgrade::{AtomicInstaller, DownloadEvent, DownloadState};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[tokio::test]
async fn test_install_into_empty_directory() -> Result<()> {
    init_test_logging(None);
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 200 * 1024);
    server.mount_artifact("1.345.1", fixture.bytes.clone(), None).await;

    let temp = TempDir::new()?;
    let target = temp.path().join("bin").join(ARTIFACT);
    let url = format!("{}{}", server.server.uri(), artifact_path("1.345.1"));

    let installed = AtomicInstaller::new(reqwest::Client::new())
        .install(&target, &url, &fixture.sha256, &CancellationToken::new())
        .await?;

    assert_eq!(std::fs::read(&target)?, fixture.bytes);
    assert_eq!(installed.path, target);
    assert_eq!(installed.sha256.as_deref(), Some(fixture.sha256.as_str()));
    assert!(installed.executable_bit_set);
    assert!(installed.version.is_none());
    assert_eq!(dir_entries(target.parent().unwrap()), vec![target.clone()]);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&target)?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
    Ok(())
}

#[tokio::test]
async fn test_replaces_existing_binary() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("2.0.0", 4096);
    server.mount_artifact("2.0.0", fixture.bytes.clone(), None).await;

    let temp = TempDir::new()?;
    let target = temp.path().join(ARTIFACT);
    std::fs::write(&target, b"previous build")?;
    let url = format!("{}{}", server.server.uri(), artifact_path("2.0.0"));

    AtomicInstaller::new(reqwest::Client::new())
        .install(&target, &url, &fixture.sha256.to_uppercase(), &CancellationToken::new())
        .await?;

    assert_eq!(std::fs::read(&target)?, fixture.bytes);
    assert_eq!(dir_entries(temp.path()), vec![target]);
    Ok(())
}

#[tokio::test]
async fn test_corrupted_artifact_leaves_target_untouched() -> Result<()> {
    init_test_logging(None);
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 8192);
    server.mount_artifact("1.345.1", fixture.corrupted(), None).await;

    let temp = TempDir::new()?;
    let target = temp.path().join(ARTIFACT);
    let previous = b"#!/bin/sh\necho engine 1.342.2\n".to_vec();
    std::fs::write(&target, &previous)?;
    let url = format!("{}{}", server.server.uri(), artifact_path("1.345.1"));

    let err = AtomicInstaller::new(reqwest::Client::new())
        .install(&target, &url, &fixture.sha256, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    assert_eq!(std::fs::read(&target)?, previous);
    assert_eq!(dir_entries(temp.path()), vec![target]);
    Ok(())
}

#[tokio::test]
async fn test_http_error_status() -> Result<()> {
    let server = ReleaseServer::start().await;
    let temp = TempDir::new()?;
    let target = temp.path().join(ARTIFACT);
    let url = format!("{}{}", server.server.uri(), artifact_path("9.9.9"));

    let err = AtomicInstaller::new(reqwest::Client::new())
        .install(&target, &url, &"0".repeat(64), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::HttpStatus);
    assert!(dir_entries(temp.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancel_while_waiting_for_response() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.345.1", 4096);
    server
        .mount_artifact("1.345.1", fixture.bytes.clone(), Some(Duration::from_secs(5)))
        .await;

    let temp = TempDir::new()?;
    let target = temp.path().join(ARTIFACT);
    std::fs::write(&target, b"previous build")?;
    let url = format!("{}{}", server.server.uri(), artifact_path("1.345.1"));

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let reporter = SessionReporter::new(bus, Uuid::new_v4());
    let cancel = CancellationToken::new();

    let install = {
        let cancel = cancel.clone();
        let target = target.clone();
        tokio::spawn(async move {
            AtomicInstaller::new(reqwest::Client::new())
                .with_reporter(reporter)
                .install(&target, &url, &fixture.sha256, &cancel)
                .await
        })
    };

    // The staging file exists once the installer reports Downloading.
    loop {
        if let DownloadEvent::StateChanged {
            state: DownloadState::Downloading,
            ..
        } = events.recv().await?
        {
            break;
        }
    }
    assert_eq!(dir_entries(temp.path()).len(), 2);

    cancel.cancel();
    let err = install.await?.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(std::fs::read(&target)?, b"previous build");
    assert_eq!(dir_entries(temp.path()), vec![target]);
    Ok(())
}

#[tokio::test]
async fn test_cancel_between_streamed_chunks() -> Result<()> {
    init_test_logging(None);
    let fixture = ArtifactFixture::new("1.345.1", 512 * 1024);
    let url = serve_slowly(fixture.bytes.clone(), 64 * 1024, Duration::from_millis(300)).await;

    let temp = TempDir::new()?;
    let target = temp.path().join(ARTIFACT);
    std::fs::write(&target, b"previous build")?;

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let cancel = CancellationToken::new();

    let install = {
        let cancel = cancel.clone();
        let target = target.clone();
        let reporter = SessionReporter::new(bus, Uuid::new_v4());
        tokio::spawn(async move {
            AtomicInstaller::new(reqwest::Client::new())
                .with_reporter(reporter)
                .install(&target, &url, &fixture.sha256, &cancel)
                .await
        })
    };

    // Wait until part of the body has been written to the staging file.
    let (downloaded, total) = loop {
        if let DownloadEvent::Progress {
            downloaded, total, ..
        } = events.recv().await?
        {
            break (downloaded, total);
        }
    };
    assert!(downloaded > 0);
    assert!(total.is_some_and(|total| downloaded < total));
    assert_eq!(dir_entries(temp.path()).len(), 2);

    cancel.cancel();
    let err = install.await?.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(std::fs::read(&target)?, b"previous build");
    assert_eq!(dir_entries(temp.path()), vec![target]);

    let later: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, DownloadEvent::StateChanged { .. }))
        .collect();
    assert!(later.is_empty(), "no phase after cancellation: {later:?}");
    Ok(())
}

#[tokio::test]
async fn test_reports_phases_in_order() -> Result<()> {
    let server = ReleaseServer::start().await;
    let fixture = ArtifactFixture::new("1.0.0", 256 * 1024);
    server.mount_artifact("1.0.0", fixture.bytes.clone(), None).await;

    let temp = TempDir::new()?;
    let target = temp.path().join(ARTIFACT);
    let url = format!("{}{}", server.server.uri(), artifact_path("1.0.0"));

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    AtomicInstaller::new(reqwest::Client::new())
        .with_reporter(SessionReporter::new(bus, Uuid::new_v4()))
        .install(&target, &url, &fixture.sha256, &CancellationToken::new())
        .await?;

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
        vec![DownloadState::Downloading, DownloadState::Verifying, DownloadState::Installing]
    );

    let last_progress = seen.iter().rev().find_map(|e| match e {
        DownloadEvent::Progress {
            downloaded, total, ..
        } => Some((*downloaded, *total)),
        _ => None,
    });
    let len = fixture.bytes.len() as u64;
    assert_eq!(last_progress, Some((len, Some(len))));
    Ok(())
}
