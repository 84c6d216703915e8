use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{watch, Mutex};

use crate::error::{Operation, ReconcileError, Result, TransportError};
use crate::list::{Confirmation, MessageList};
use crate::models::{Message, MessageId, MessageStatus, NewMessage};
use crate::transport::MessageTransport;

/// Size of the window `load` fetches. There is no paging past it.
pub const PAGE_SIZE: usize = 100;
/// Backend refuses searches asking for more than this.
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// What happens to an optimistic entry whose creation request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedSendPolicy {
    /// Keep it in place, marked failed, until it is retried or discarded.
    #[default]
    Keep,
    /// Drop it from the list.
    Rollback,
}

/// Everything a view needs to render the message list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct State {
    list: MessageList,
    loads_in_flight: usize,
    /// Last failure, tagged with the operation that hit it.
    error: Option<(Operation, String)>,
    /// Bumped whenever a confirmed entry appears or disappears locally.
    revision: u64,
    loads_started: u64,
    newest_applied_load: u64,
}

impl State {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages: self.list.messages().to_vec(),
            loading: self.loads_in_flight > 0,
            error: self.error.as_ref().map(|(_, reason)| reason.clone()),
        }
    }

    fn record_failure(&mut self, e: &TransportError) {
        self.error = Some((e.operation, e.to_string()));
    }

    /// A success only clears a failure of the same kind: a good load says
    /// nothing about a delete that was just refused.
    fn clear_failure(&mut self, op: Operation) {
        if matches!(&self.error, Some((failed, _)) if *failed == op) {
            self.error = None;
        }
    }
}

/// Keeps the local message list consistent with user actions and the
/// backend. Sends are optimistic, deletes are not.
pub struct Reconciler<T> {
    transport: Arc<T>,
    policy: FailedSendPolicy,
    state: Mutex<State>,
    snapshots: watch::Sender<Snapshot>,
}

impl<T: MessageTransport> Reconciler<T> {
    pub fn new(transport: Arc<T>, policy: FailedSendPolicy) -> Self {
        let (snapshots, _) = watch::channel(Snapshot::default());
        Reconciler {
            transport,
            policy,
            state: Mutex::new(State::default()),
            snapshots,
        }
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receives a new snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// Applies one mutation and publishes the result while still holding the
    /// lock, so subscribers never observe snapshots out of order.
    async fn mutate<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().await;
        let out = f(&mut state);
        self.snapshots.send_replace(state.snapshot());
        out
    }

    /// Replaces the list with the most recent page from the backend. On
    /// failure the current list stays as it is.
    ///
    /// A page is dropped if a newer load already landed, or if a send was
    /// confirmed or a delete applied while it was in flight: it may predate
    /// either, and the next load picks up the difference.
    pub async fn load(&self, token: &str) -> Result<Vec<Message>> {
        let (ticket, revision) = self
            .mutate(|state| {
                state.loads_in_flight += 1;
                state.loads_started += 1;
                (state.loads_started, state.revision)
            })
            .await;
        let result = self.transport.list_messages(token, PAGE_SIZE, 0).await;
        self.mutate(|state| {
            state.loads_in_flight -= 1;
            match result {
                Ok(page) => {
                    if ticket < state.newest_applied_load || revision != state.revision {
                        debug!("dropping stale page from load #{}", ticket);
                    } else {
                        state.list.replace_confirmed(page);
                        state.newest_applied_load = ticket;
                        info!("loaded {} messages", state.list.len());
                    }
                    state.clear_failure(Operation::ListMessages);
                    Ok(state.list.messages().to_vec())
                }
                Err(e) => {
                    warn!("load failed: {}", e);
                    state.record_failure(&e);
                    Err(e.into())
                }
            }
        })
        .await
    }

    /// Shows the message right away under a placeholder id, then swaps in the
    /// server's copy once it is created. Blank content must be rejected by
    /// the caller before getting here.
    pub async fn submit(&self, token: &str, author: &str, content: &str) -> Result<Message> {
        let placeholder = Message::pending(author, content);
        let local_id = placeholder.id.clone();
        self.mutate(|state| state.list.prepend(placeholder)).await;

        let body = NewMessage {
            author: author.to_string(),
            content: content.to_string(),
        };
        self.deliver(token, local_id, body).await
    }

    /// Sends a failed entry again from the same list slot.
    pub async fn retry(&self, token: &str, local_id: &MessageId) -> Result<Message> {
        let body = self
            .mutate(|state| {
                let message = state
                    .list
                    .get(local_id)
                    .ok_or_else(|| ReconcileError::UnknownPlaceholder(local_id.clone()))?;
                if message.status != MessageStatus::Failed {
                    return Err(ReconcileError::NotFailed(local_id.clone()));
                }
                let body = NewMessage {
                    author: message.author.clone(),
                    content: message.content.clone(),
                };
                state.list.set_status(local_id, MessageStatus::Pending);
                Ok(body)
            })
            .await?;
        debug!("retrying {}", local_id);
        self.deliver(token, local_id.clone(), body).await
    }

    /// Drops a failed entry without contacting the backend.
    pub async fn discard(&self, local_id: &MessageId) -> Result<()> {
        self.mutate(|state| {
            let message = state
                .list
                .get(local_id)
                .ok_or_else(|| ReconcileError::UnknownPlaceholder(local_id.clone()))?;
            if message.status != MessageStatus::Failed {
                return Err(ReconcileError::NotFailed(local_id.clone()));
            }
            state.list.remove(local_id);
            Ok(())
        })
        .await
    }

    async fn deliver(
        &self,
        token: &str,
        local_id: MessageId,
        body: NewMessage,
    ) -> Result<Message> {
        match self.transport.create_message(token, &body).await {
            Ok(created) => {
                let message = Message::from(created.clone());
                let outcome = self
                    .mutate(|state| {
                        state.clear_failure(Operation::CreateMessage);
                        state.revision += 1;
                        state.list.confirm(&local_id, created)
                    })
                    .await;
                if outcome == Confirmation::Missing {
                    debug!("{} was discarded before {} came back", local_id, message.id);
                }
                info!("sent {} as {}", local_id, message.id);

                // The server may have normalised the message or reordered the
                // list; pick up its version. The send itself already succeeded,
                // so a failed reload only shows up through the error flag.
                if let Err(e) = self.load(token).await {
                    warn!("resync after sending {} failed: {}", message.id, e);
                }
                Ok(message)
            }
            Err(e) => {
                warn!("sending {} failed: {}", local_id, e);
                let policy = self.policy;
                self.mutate(|state| {
                    match policy {
                        FailedSendPolicy::Keep => {
                            state.list.set_status(&local_id, MessageStatus::Failed);
                        }
                        FailedSendPolicy::Rollback => {
                            state.list.remove(&local_id);
                        }
                    }
                    state.record_failure(&e);
                })
                .await;
                Err(e.into())
            }
        }
    }

    /// Deletes on the backend first, then locally. Placeholders cannot be
    /// deleted: they have no server id yet.
    pub async fn remove(&self, token: &str, id: &MessageId) -> Result<()> {
        let server_id = id
            .as_server()
            .ok_or_else(|| ReconcileError::NotConfirmed(id.clone()))?;

        match self.transport.delete_message(token, server_id).await {
            Ok(()) => {
                self.mutate(|state| {
                    state.list.remove(id);
                    state.revision += 1;
                    state.clear_failure(Operation::DeleteMessage);
                })
                .await;
                info!("deleted {}", id);
                Ok(())
            }
            Err(e) => {
                warn!("deleting {} failed: {}", id, e);
                self.mutate(|state| state.record_failure(&e)).await;
                Err(e.into())
            }
        }
    }

    /// Full-text search on the backend. Leaves the list alone.
    pub async fn search(
        &self,
        token: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        if query.trim().is_empty() {
            return Err(ReconcileError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }
        if limit > MAX_SEARCH_LIMIT {
            return Err(ReconcileError::InvalidQuery(format!(
                "limit cannot be greater than {}",
                MAX_SEARCH_LIMIT
            )));
        }
        let found = self
            .transport
            .search_messages(token, query, limit, offset)
            .await?;
        Ok(found.into_iter().map(Message::from).collect())
    }

    /// Reads one message straight from the backend.
    pub async fn fetch(&self, token: &str, id: &MessageId) -> Result<Option<Message>> {
        let server_id = id
            .as_server()
            .ok_or_else(|| ReconcileError::NotConfirmed(id.clone()))?;
        let found = self.transport.fetch_message(token, server_id).await?;
        Ok(found.map(Message::from))
    }
}
