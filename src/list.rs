use log::debug;

use crate::models::{Message, MessageId, MessageStatus, ServerMessage};

/// Newest-first message storage. Every method is one atomic step from the
/// reconciler's point of view; none of them suspend.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    messages: Vec<Message>,
}

/// What happened to a placeholder when its server copy arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Replaced in place.
    Replaced,
    /// The server copy was already listed, so the placeholder was dropped.
    Merged,
    /// The placeholder is gone (discarded while in flight).
    Missing,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == *id)
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == *id)
    }

    /// Swaps in a fresh page from the server. Unconfirmed entries are not on
    /// the server yet, so they stay at the head in their current order.
    pub fn replace_confirmed(&mut self, page: Vec<ServerMessage>) {
        let mut next: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| !m.is_confirmed())
            .collect();
        let kept = next.len();
        next.extend(page.into_iter().map(Message::from));
        debug!("list replaced: {} from server, {} unconfirmed kept", next.len() - kept, kept);
        self.messages = next;
    }

    pub fn prepend(&mut self, message: Message) {
        debug!("prepending {} ({:?})", message.id, message.status);
        self.messages.insert(0, message);
    }

    pub fn confirm(&mut self, local_id: &MessageId, confirmed: ServerMessage) -> Confirmation {
        let Some(idx) = self.position(local_id) else {
            debug!("placeholder {} vanished before confirmation", local_id);
            return Confirmation::Missing;
        };
        let server_id = MessageId::Server(confirmed.id.clone());
        if self.position(&server_id).is_some() {
            debug!("{} already listed as {}, dropping placeholder", local_id, server_id);
            self.messages.remove(idx);
            return Confirmation::Merged;
        }
        debug!("confirmed {} as {}", local_id, server_id);
        self.messages[idx] = Message::from(confirmed);
        Confirmation::Replaced
    }

    /// Returns false if there was nothing to update.
    pub fn set_status(&mut self, id: &MessageId, status: MessageStatus) -> bool {
        match self.messages.iter_mut().find(|m| m.id == *id) {
            Some(message) => {
                debug!("{} is now {:?}", id, status);
                message.status = status;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let idx = self.position(id)?;
        debug!("removing {}", id);
        Some(self.messages.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn server(id: &str, content: &str) -> ServerMessage {
        ServerMessage {
            id: id.to_string(),
            author: "alice".to_string(),
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn ids(list: &MessageList) -> Vec<String> {
        list.messages().iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn test_confirm_replaces_in_place() {
        let mut list = MessageList::new();
        list.replace_confirmed(vec![server("1", "old")]);
        let first = Message::pending("alice", "a");
        let second = Message::pending("alice", "b");
        let first_id = first.id.clone();
        list.prepend(first);
        list.prepend(second);

        assert_eq!(list.confirm(&first_id, server("9", "a")), Confirmation::Replaced);
        assert_eq!(list.messages()[1].id, MessageId::Server("9".to_string()));
        assert!(list.messages()[1].is_confirmed());
        assert_eq!(list.messages()[0].status, MessageStatus::Pending);
        assert!(list.get(&first_id).is_none());
    }

    #[test]
    fn test_confirm_merges_when_server_copy_already_listed() {
        let mut list = MessageList::new();
        let pending = Message::pending("alice", "hi");
        let local_id = pending.id.clone();
        list.prepend(pending);
        list.replace_confirmed(vec![server("42", "hi")]);

        assert_eq!(list.confirm(&local_id, server("42", "hi")), Confirmation::Merged);
        assert_eq!(ids(&list), vec!["42"]);
    }

    #[test]
    fn test_confirm_of_missing_placeholder_is_a_no_op() {
        let mut list = MessageList::new();
        list.replace_confirmed(vec![server("1", "x")]);
        let ghost = MessageId::new_local();
        assert_eq!(list.confirm(&ghost, server("2", "y")), Confirmation::Missing);
        assert_eq!(ids(&list), vec!["1"]);
    }

    #[test]
    fn test_replace_keeps_unconfirmed_at_head() {
        let mut list = MessageList::new();
        list.replace_confirmed(vec![server("1", "x"), server("2", "y")]);
        let pending = Message::pending("alice", "z");
        let local_id = pending.id.clone();
        list.prepend(pending);

        list.replace_confirmed(vec![server("3", "w")]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.messages()[0].id, local_id);
        assert_eq!(list.messages()[1].id, MessageId::Server("3".to_string()));
    }

    #[test]
    fn test_remove_and_status_report_missing_ids() {
        let mut list = MessageList::new();
        list.replace_confirmed(vec![server("1", "x")]);
        let missing = MessageId::Server("2".to_string());
        assert!(list.remove(&missing).is_none());
        assert!(!list.set_status(&missing, MessageStatus::Failed));
        assert!(list.remove(&MessageId::Server("1".to_string())).is_some());
        assert!(list.is_empty());
    }
}
