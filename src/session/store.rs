//! Typed key/value store scoped to one workflow session.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

/// A typed handle into a `SessionStore`.
pub struct SessionKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SessionKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for SessionKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SessionKey<T> {}

/// Well-known keys used by the workflow.
pub mod keys {
    use super::SessionKey;
    use crate::batch::Batch;

    /// The last uploaded (and possibly generated) batch.
    pub const CSV_DATA: SessionKey<Batch> = SessionKey::new("csv_data");
    /// Pending send confirmation, consumed once.
    pub const SEND_EMAIL_FLAG: SessionKey<bool> = SessionKey::new("send_email_flag");
    /// Workflow-level notices ("Emails generated successfully!").
    pub const CHAT_HISTORY: SessionKey<Vec<String>> = SessionKey::new("chat_history");
    /// Per-page chat messages, cleared on page switch.
    pub const MESSAGES: SessionKey<Vec<String>> = SessionKey::new("messages");
    /// Page marker used to detect page switches.
    pub const CURRENT_PAGE: SessionKey<String> = SessionKey::new("current_page");
}

type Slot = Box<dyn Any + Send + Sync>;

/// Values live until the session is dropped. Each key is initialised lazily
/// on first access.
#[derive(Default)]
pub struct SessionStore {
    slots: HashMap<&'static str, Slot>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the value for `key`, inserting `T::default()` on first access.
    pub fn get_or_default<T>(&mut self, key: SessionKey<T>) -> &mut T
    where
        T: Default + Send + Sync + 'static,
    {
        let slot = self
            .slots
            .entry(key.name)
            .or_insert_with(|| Box::new(T::default()));
        if !slot.is::<T>() {
            tracing::warn!(key = key.name, "Session slot held a different type, resetting");
            *slot = Box::new(T::default());
        }
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("slot {} was just reset to the requested type", key.name),
        }
    }

    /// Borrow the value for `key` without initialising it.
    pub fn get<T: 'static>(&self, key: SessionKey<T>) -> Option<&T> {
        self.slots.get(key.name).and_then(|slot| slot.downcast_ref::<T>())
    }

    /// Replace the value for `key`.
    pub fn set<T>(&mut self, key: SessionKey<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.slots.insert(key.name, Box::new(value));
    }

    /// Remove and return the value for `key`.
    pub fn remove<T: 'static>(&mut self, key: SessionKey<T>) -> Option<T> {
        let slot = self.slots.remove(key.name)?;
        slot.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn contains<T>(&self, key: SessionKey<T>) -> bool {
        self.slots.contains_key(key.name)
    }

    /// Rewrite every key with its current value. Returns how many keys exist.
    ///
    /// Values are unchanged; this only re-registers each slot.
    pub fn resync(&mut self) -> usize {
        let slots = std::mem::take(&mut self.slots);
        for (name, value) in slots {
            self.slots.insert(name, value);
        }
        self.slots.len()
    }

    /// Record that `page` is now active.
    ///
    /// Switching to a different page clears the chat messages. Returns
    /// whether a switch happened.
    pub fn enter_page(&mut self, page: &str) -> bool {
        let switched = match self.get(keys::CURRENT_PAGE) {
            Some(current) => current != page,
            None => false,
        };
        if switched {
            self.remove(keys::MESSAGES);
            self.remove(keys::CURRENT_PAGE);
            tracing::debug!(page, "Page switched, chat messages cleared");
        }
        if !self.contains(keys::CURRENT_PAGE) {
            self.set(keys::CURRENT_PAGE, page.to_string());
        }
        self.get_or_default(keys::MESSAGES);
        switched
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
