//! Persisted history of inbound messages, newest first.

use std::sync::{Arc, Mutex};

use clickflow_core::types::InboundMessage;
use clickflow_storage::{keys, load_json, save_json, KeyValueStore};

use crate::error::TelegramError;

pub struct MessageHistory {
    kv: Arc<dyn KeyValueStore>,
    limit: usize,
    messages: Mutex<Vec<InboundMessage>>,
}

impl MessageHistory {
    pub fn open(kv: Arc<dyn KeyValueStore>, limit: usize) -> Result<Self, TelegramError> {
        let mut messages: Vec<InboundMessage> =
            load_json(kv.as_ref(), keys::INCOMING_MESSAGES)?.unwrap_or_default();
        messages.truncate(limit);
        Ok(Self {
            kv,
            limit,
            messages: Mutex::new(messages),
        })
    }

    fn persist(&self, messages: &[InboundMessage]) -> Result<(), TelegramError> {
        save_json(self.kv.as_ref(), keys::INCOMING_MESSAGES, messages)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<InboundMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Apply `f` to a copy of the list and keep it only once persisted.
    /// `f` returns whether anything changed; unchanged drafts are not written.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<InboundMessage>) -> (bool, T),
    ) -> Result<T, TelegramError> {
        let mut guard = self.lock();
        let mut draft = guard.clone();
        let (changed, out) = f(&mut draft);
        if changed {
            self.persist(&draft)?;
            *guard = draft;
        }
        Ok(out)
    }

    /// Prepend a batch given in arrival order, so the latest ends up first.
    /// Messages already in the history are skipped.
    pub fn record(&self, batch: &[InboundMessage]) -> Result<usize, TelegramError> {
        let limit = self.limit;
        self.mutate(|messages| {
            let mut added = 0;
            for message in batch {
                if messages.iter().any(|m| m.id == message.id) {
                    continue;
                }
                messages.insert(0, message.clone());
                added += 1;
            }
            messages.truncate(limit);
            (added > 0, added)
        })
    }

    pub fn list(&self) -> Vec<InboundMessage> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|m| m.unread).count()
    }

    pub fn mark_all_read(&self) -> Result<(), TelegramError> {
        self.mutate(|messages| {
            messages.iter_mut().for_each(|m| m.unread = false);
            (true, ())
        })
    }

    /// Returns false if no message has that id.
    pub fn delete(&self, id: i64) -> Result<bool, TelegramError> {
        self.mutate(|messages| {
            let before = messages.len();
            messages.retain(|m| m.id != id);
            let removed = messages.len() != before;
            (removed, removed)
        })
    }

    pub fn clear(&self) -> Result<(), TelegramError> {
        self.mutate(|messages| {
            messages.clear();
            (true, ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickflow_core::error::ClickflowError;
    use clickflow_core::types::{MessageKind, Timestamp};
    use clickflow_storage::MemoryKvStore;

    /// Reads from a seeded store, rejects every write.
    struct ReadOnlyKv(MemoryKvStore);

    impl KeyValueStore for ReadOnlyKv {
        fn get(&self, key: &str) -> Result<Option<String>, ClickflowError> {
            self.0.get(key)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), ClickflowError> {
            Err(ClickflowError::Storage("read-only".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), ClickflowError> {
            Err(ClickflowError::Storage("read-only".into()))
        }
    }

    fn msg(id: i64) -> InboundMessage {
        InboundMessage {
            id,
            time: Timestamp(id),
            sender: "Ada".into(),
            username: String::new(),
            content: format!("m{id}"),
            kind: MessageKind::Text,
            chat_id: Some(1),
            unread: true,
        }
    }

    #[test]
    fn test_newest_first_and_capped() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let history = MessageHistory::open(Arc::clone(&kv), 3).unwrap();
        history.record(&[msg(1), msg(2)]).unwrap();
        history.record(&[msg(3), msg(4)]).unwrap();

        let ids: Vec<i64> = history.list().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 3, 2]);

        let reopened = MessageHistory::open(kv, 3).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.list()[0].id, 4);
    }

    #[test]
    fn test_duplicates_skipped() {
        let history = MessageHistory::open(Arc::new(MemoryKvStore::new()), 100).unwrap();
        assert_eq!(history.record(&[msg(1)]).unwrap(), 1);
        assert_eq!(history.record(&[msg(1), msg(2)]).unwrap(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_delete_clear_and_read_state() {
        let history = MessageHistory::open(Arc::new(MemoryKvStore::new()), 100).unwrap();
        history.record(&[msg(1), msg(2), msg(3)]).unwrap();
        assert_eq!(history.unread_count(), 3);

        assert!(history.delete(2).unwrap());
        assert!(!history.delete(2).unwrap());
        assert_eq!(history.len(), 2);

        history.mark_all_read().unwrap();
        assert_eq!(history.unread_count(), 0);

        history.clear().unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_failed_write_leaves_history_unchanged() {
        let seeded = MemoryKvStore::new();
        save_json(&seeded, keys::INCOMING_MESSAGES, &vec![msg(1)]).unwrap();
        let history = MessageHistory::open(Arc::new(ReadOnlyKv(seeded)), 100).unwrap();

        assert!(history.record(&[msg(2)]).is_err());
        assert!(history.mark_all_read().is_err());
        assert!(history.delete(1).is_err());
        assert!(history.clear().is_err());

        let ids: Vec<i64> = history.list().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(history.unread_count(), 1);
    }
}
