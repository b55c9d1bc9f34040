//! Registry actor - owns every mailbox and processes commands.
//!
//! The RegistryActor is the single owner of the name → mailbox table.
//! It receives commands via an mpsc channel and handles them sequentially,
//! which is what makes `get_or_create` atomic: two simultaneous first
//! references to a name are two commands, and the second one finds the
//! mailbox the first one created.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the requester went away)

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{ClientName, OutboundMessage};

use super::commands::{ConnectionId, MailboxInfo, RegistryCommand, RegistryError};
use crate::config::{DuplicateNamePolicy, RegistrySettings};
use crate::mailbox::Mailbox;

/// Connection currently draining a mailbox.
#[derive(Debug)]
struct Consumer {
    connection: ConnectionId,
    token: CancellationToken,
}

impl Consumer {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct Entry {
    mailbox: Arc<Mailbox>,
    consumer: Option<Consumer>,
}

impl Entry {
    fn new(name: ClientName) -> Self {
        Self {
            mailbox: Arc::new(Mailbox::new(name)),
            consumer: None,
        }
    }

    /// Returns the live consumer other than `connection`, if any.
    fn other_consumer(&self, connection: ConnectionId) -> Option<&Consumer> {
        self.consumer
            .as_ref()
            .filter(|c| c.connection != connection && c.is_live())
    }
}

/// The registry actor - owns all mailboxes.
///
/// # Ownership
///
/// - `mailboxes`: every name ever referenced, with its queue and the
///   connection (if any) consuming it. Entries are only dropped by an
///   explicit `Remove`; a disconnect merely clears the consumer slot.
///
/// A `BTreeMap` keeps listings sorted without a separate sort step.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    mailboxes: BTreeMap<ClientName, Entry>,
    settings: RegistrySettings,
}

impl RegistryActor {
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, settings: RegistrySettings) -> Self {
        Self {
            receiver,
            mailboxes: BTreeMap::new(),
            settings,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!(
            duplicate_names = %self.settings.duplicate_names,
            "Registry actor starting"
        );

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(mailboxes = self.mailboxes.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::GetOrCreate { name, respond_to } => {
                let mailbox = self.handle_get_or_create(name);
                // Ignore send error - requester may have dropped the receiver
                let _ = respond_to.send(mailbox);
            }
            RegistryCommand::Deliver { target, message } => {
                self.handle_deliver(target, message);
            }
            RegistryCommand::Claim {
                name,
                connection,
                token,
                respond_to,
            } => {
                let result = self.handle_claim(name, connection, token);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Reattach {
                name,
                connection,
                token,
                respond_to,
            } => {
                let result = self.handle_reattach(name, connection, token);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Release { name, connection } => {
                self.handle_release(&name, connection);
            }
            RegistryCommand::ListNames { respond_to } => {
                let _ = respond_to.send(self.mailboxes.keys().cloned().collect());
            }
            RegistryCommand::ListMailboxes { respond_to } => {
                let _ = respond_to.send(self.handle_list_mailboxes());
            }
            RegistryCommand::Remove { name, respond_to } => {
                let result = self.handle_remove(name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::ReportBacklog => {
                self.handle_report_backlog();
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn entry(&mut self, name: ClientName) -> &mut Entry {
        self.mailboxes.entry(name).or_insert_with_key(|name| {
            debug!(client = %name, "Created mailbox");
            Entry::new(name.clone())
        })
    }

    fn handle_get_or_create(&mut self, name: ClientName) -> Arc<Mailbox> {
        Arc::clone(&self.entry(name).mailbox)
    }

    fn handle_deliver(&mut self, target: ClientName, message: OutboundMessage) {
        let mailbox = &self.entry(target).mailbox;
        // Entries are closed only as they leave the map, so this cannot fail.
        if !mailbox.push(message) {
            warn!(client = %mailbox.name(), "Dropped message for evicted mailbox");
            return;
        }
        debug!(
            client = %mailbox.name(),
            pending = mailbox.len(),
            "Message queued"
        );
    }

    fn handle_claim(
        &mut self,
        name: ClientName,
        connection: ConnectionId,
        token: CancellationToken,
    ) -> Result<Arc<Mailbox>, RegistryError> {
        let policy = self.settings.duplicate_names;
        let entry = self.entry(name);

        if let Some(current) = entry.other_consumer(connection) {
            match policy {
                DuplicateNamePolicy::Reject => {
                    warn!(
                        client = %entry.mailbox.name(),
                        holder = current.connection,
                        rejected = connection,
                        "Name already bound, rejecting connection"
                    );
                    return Err(RegistryError::NameInUse(entry.mailbox.name().clone()));
                }
                DuplicateNamePolicy::Evict => {
                    warn!(
                        client = %entry.mailbox.name(),
                        evicted = current.connection,
                        connection,
                        "Name re-registered, evicting previous connection"
                    );
                    current.token.cancel();
                }
            }
        }

        entry.consumer = Some(Consumer { connection, token });
        Ok(Arc::clone(&entry.mailbox))
    }

    fn handle_reattach(
        &mut self,
        name: ClientName,
        connection: ConnectionId,
        token: CancellationToken,
    ) -> Result<Arc<Mailbox>, RegistryError> {
        let entry = self.entry(name);

        if entry.other_consumer(connection).is_some() {
            return Err(RegistryError::NameInUse(entry.mailbox.name().clone()));
        }

        debug!(client = %entry.mailbox.name(), connection, "Connection reattached");
        entry.consumer = Some(Consumer { connection, token });
        Ok(Arc::clone(&entry.mailbox))
    }

    fn handle_release(&mut self, name: &ClientName, connection: ConnectionId) {
        let Some(entry) = self.mailboxes.get_mut(name) else {
            return;
        };

        if entry
            .consumer
            .as_ref()
            .is_some_and(|c| c.connection == connection)
        {
            entry.consumer = None;
            debug!(
                client = %name,
                connection,
                pending = entry.mailbox.len(),
                "Connection released mailbox"
            );
        }
    }

    fn handle_list_mailboxes(&self) -> Vec<MailboxInfo> {
        self.mailboxes
            .iter()
            .map(|(name, entry)| MailboxInfo {
                name: name.clone(),
                pending: entry.mailbox.len(),
                connected: entry.consumer.as_ref().is_some_and(Consumer::is_live),
                created_at: entry.mailbox.created_at(),
            })
            .collect()
    }

    fn handle_remove(&mut self, name: ClientName) -> Result<usize, RegistryError> {
        let Some(entry) = self.mailboxes.remove(&name) else {
            warn!(client = %name, "Cannot remove unknown mailbox");
            return Err(RegistryError::NotFound(name));
        };

        let dropped = entry.mailbox.close();
        info!(
            client = %name,
            dropped,
            connected = entry.consumer.as_ref().is_some_and(Consumer::is_live),
            "Mailbox removed"
        );
        Ok(dropped)
    }

    fn handle_report_backlog(&self) {
        let threshold = self.settings.backlog_warn_threshold;
        for (name, entry) in &self.mailboxes {
            let pending = entry.mailbox.len();
            if pending >= threshold {
                warn!(
                    client = %name,
                    pending,
                    threshold,
                    connected = entry.consumer.as_ref().is_some_and(Consumer::is_live),
                    "Mailbox backlog growing"
                );
            }
        }
    }

    /// Returns the number of mailboxes (for testing).
    #[cfg(test)]
    pub fn mailbox_count(&self) -> usize {
        self.mailboxes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_actor(policy: DuplicateNamePolicy) -> (mpsc::Sender<RegistryCommand>, RegistryActor) {
        let (tx, rx) = mpsc::channel(16);
        let settings = RegistrySettings {
            duplicate_names: policy,
            ..Default::default()
        };
        (tx, RegistryActor::new(rx, settings))
    }

    fn name(s: &str) -> ClientName {
        ClientName::new(s)
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Evict);

        let first = actor.handle_get_or_create(name("bob"));
        let second = actor.handle_get_or_create(name("bob"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(actor.mailbox_count(), 1);
    }

    #[test]
    fn test_deliver_creates_target_mailbox() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Evict);

        actor.handle_deliver(
            name("dave"),
            OutboundMessage::new(name("carol"), "later"),
        );

        let mailbox = actor.handle_get_or_create(name("dave"));
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_names_listed_sorted() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Evict);
        for n in ["carol", "alice", "bob"] {
            actor.handle_get_or_create(name(n));
        }

        let names: Vec<ClientName> = actor.mailboxes.keys().cloned().collect();
        assert_eq!(names, vec![name("alice"), name("bob"), name("carol")]);
    }

    #[test]
    fn test_claim_evicts_previous_holder() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Evict);
        let first = CancellationToken::new();
        let second = CancellationToken::new();

        let a = actor.handle_claim(name("bob"), 1, first.clone()).unwrap();
        let b = actor.handle_claim(name("bob"), 2, second.clone()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_claim_rejects_when_configured() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Reject);
        let first = CancellationToken::new();

        actor.handle_claim(name("bob"), 1, first.clone()).unwrap();
        let result = actor.handle_claim(name("bob"), 2, CancellationToken::new());

        assert_eq!(result.unwrap_err(), RegistryError::NameInUse(name("bob")));
        assert!(!first.is_cancelled());
    }

    #[test]
    fn test_claim_after_holder_gone_is_allowed() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Reject);
        let first = CancellationToken::new();

        actor.handle_claim(name("bob"), 1, first.clone()).unwrap();
        first.cancel();

        assert!(actor
            .handle_claim(name("bob"), 2, CancellationToken::new())
            .is_ok());
    }

    #[test]
    fn test_release_only_clears_own_claim() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Evict);
        actor
            .handle_claim(name("bob"), 1, CancellationToken::new())
            .unwrap();
        actor
            .handle_claim(name("bob"), 2, CancellationToken::new())
            .unwrap();

        // Evicted connection 1 releasing must not unbind connection 2.
        actor.handle_release(&name("bob"), 1);
        assert!(actor.handle_list_mailboxes()[0].connected);

        actor.handle_release(&name("bob"), 2);
        let info = &actor.handle_list_mailboxes()[0];
        assert!(!info.connected);
        assert_eq!(actor.mailbox_count(), 1, "mailbox survives disconnect");
    }

    #[test]
    fn test_remove_closes_mailbox_and_drops_backlog() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Evict);
        actor.handle_deliver(name("bob"), OutboundMessage::new(name("alice"), "1"));
        actor.handle_deliver(name("bob"), OutboundMessage::new(name("alice"), "2"));
        let old = actor.handle_get_or_create(name("bob"));

        assert_eq!(actor.handle_remove(name("bob")), Ok(2));
        assert!(old.is_closed());
        assert_eq!(actor.mailbox_count(), 0);

        let fresh = actor.handle_get_or_create(name("bob"));
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_remove_unknown_fails() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Evict);
        assert_eq!(
            actor.handle_remove(name("ghost")),
            Err(RegistryError::NotFound(name("ghost")))
        );
    }

    #[test]
    fn test_reattach_never_evicts() {
        let (_tx, mut actor) = create_actor(DuplicateNamePolicy::Evict);
        let holder = CancellationToken::new();
        actor.handle_claim(name("bob"), 1, holder.clone()).unwrap();

        let result = actor.handle_reattach(name("bob"), 2, CancellationToken::new());
        assert!(matches!(result, Err(RegistryError::NameInUse(_))));
        assert!(!holder.is_cancelled());

        assert!(actor
            .handle_reattach(name("bob"), 1, holder.clone())
            .is_ok());
    }

    #[tokio::test]
    async fn test_run_processes_commands_until_closed() {
        let (tx, actor) = create_actor(DuplicateNamePolicy::Evict);
        let task = tokio::spawn(actor.run());

        let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
        tx.send(RegistryCommand::GetOrCreate {
            name: name("alice"),
            respond_to: resp_tx,
        })
        .await
        .unwrap();
        let mailbox = resp_rx.await.unwrap();
        assert_eq!(mailbox.name().as_str(), "alice");

        drop(tx);
        task.await.unwrap();
    }
}
