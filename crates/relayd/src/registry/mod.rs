//! Mailbox registry using the Actor pattern.
//!
//! The registry is the only state shared across connections: it maps each
//! client name to its [`Mailbox`](crate::mailbox::Mailbox). It receives
//! commands via a tokio mpsc channel, so every creation and removal is
//! serialized through one task.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  Deliver/Claim   ┌─────────────────┐
//! │  reader pumps   │─────────────────▶│  RegistryActor  │
//! │ (one per conn)  │  (mpsc channel)  │                 │
//! └─────────────────┘                  │ BTreeMap<Name,  │
//!                                      │   Mailbox>      │
//! ┌─────────────────┐   Arc<Mailbox>   │                 │
//! │  writer pumps   │◀─────────────────│                 │
//! └─────────────────┘                  └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{ConnectionId, MailboxInfo, RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

use crate::config::RegistrySettings;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command channel
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Spawns the periodic backlog reporter
/// 4. Returns a RegistryHandle for client use
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use relayd::config::RegistrySettings;
/// use relayd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(RegistrySettings::default());
///     let names = handle.list_names().await;
/// }
/// ```
pub fn spawn_registry(settings: RegistrySettings) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let report_interval = settings.backlog_report_interval;

    let actor = RegistryActor::new(cmd_rx, settings);
    tokio::spawn(actor.run());

    spawn_backlog_reporter(cmd_tx.downgrade(), report_interval);

    RegistryHandle::new(cmd_tx)
}

/// Spawn a background task that periodically asks for a backlog report.
///
/// Holds only a weak sender so it never keeps the actor alive on its own.
fn spawn_backlog_reporter(sender: mpsc::WeakSender<RegistryCommand>, every: Duration) {
    if every.is_zero() {
        debug!("Backlog reporting disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                debug!("Backlog reporter stopping: registry dropped");
                break;
            };
            if sender.send(RegistryCommand::ReportBacklog).await.is_err() {
                debug!("Backlog reporter stopping: registry channel closed");
                break;
            }
        }
    });
}
