//! Check for a new release and install it.
//!
//! The command drives one coordinator session and mirrors its lifecycle
//! events on a progress bar. Ctrl-C cancels the session; the previous binary
//! stays in place and the staging file is removed.
//!
//! # Examples
//!
//! ```bash
//! binguard update            # only if the check interval has elapsed
//! binguard update --force    # check now and reinstall if needed
//! binguard update --no-progress
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::cli::CliConfig;
use crate::cli::common::UpdateContext;
use crate::upgrade::{DownloadEvent, FailureNotice, Notifier, PromptAction, UpdateOutcome};
use crate::utils::progress::DownloadProgress;

/// Arguments of `binguard update`.
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Check now, ignoring the check interval
    #[arg(short, long)]
    pub force: bool,
}

impl UpdateCommand {
    /// Run one update session.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the session. Cancellation is not an error.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let progress = DownloadProgress::new(!cli.no_progress);
        let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier {
            progress: progress.clone(),
        });
        let ctx = UpdateContext::load_with_notifier(cli, Some(notifier)).await?;
        let coordinator = ctx.coordinator.clone();

        let render = tokio::spawn(render_events(coordinator.subscribe(), progress.clone()));
        let interrupt = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("Interrupt received, cancelling update");
                    coordinator.cancel();
                }
            })
        };

        let result = coordinator.request_update(self.force).await;
        interrupt.abort();
        render.abort();
        progress.finish();

        match result? {
            UpdateOutcome::Installed(state) => println!(
                "{}",
                format!(
                    "Installed {} {} at {}",
                    ctx.platform,
                    state.version.as_deref().unwrap_or("unknown"),
                    state.path.display()
                )
                .green()
            ),
            UpdateOutcome::UpToDate { version } => println!(
                "{}",
                format!("{} is up to date ({})", ctx.platform, version.as_deref().unwrap_or("unknown"))
                    .green()
            ),
            UpdateOutcome::NotDue => println!(
                "Last check was less than {} days ago. Run `binguard update --force` to check now.",
                ctx.config.update.check_interval_days
            ),
            UpdateOutcome::NotManaged => println!(
                "{}",
                "Automatic binary management is disabled (update.manage_binaries_automatically)"
                    .yellow()
            ),
            UpdateOutcome::AlreadyInProgress => {
                println!("{}", "An update is already in progress".yellow());
            }
            UpdateOutcome::Cancelled => println!("{}", "Update cancelled".yellow()),
        }
        Ok(())
    }
}

async fn render_events(mut events: broadcast::Receiver<DownloadEvent>, progress: DownloadProgress) {
    loop {
        match events.recv().await {
            Ok(DownloadEvent::Finished(_)) | Err(RecvError::Closed) => break,
            Ok(event) => progress.apply(&event),
            Err(RecvError::Lagged(skipped)) => debug!("Progress display skipped {} events", skipped),
        }
    }
}

/// Prints failure notices and the actions they offer.
struct ConsoleNotifier {
    progress: DownloadProgress,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: &FailureNotice) {
        self.progress.suspend(|| {
            eprintln!("{}", notice.message.yellow());
            for action in &notice.actions {
                match action {
                    PromptAction::RetryDownload => {
                        eprintln!("  {} run `binguard update --force`", "→".cyan());
                    }
                    PromptAction::ContactSupport => eprintln!("  {} {}", "→".cyan(), action),
                }
            }
        });
    }
}
