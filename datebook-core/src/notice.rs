//! Short user-facing messages queued by the stores for the front end to show.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::constants::DEFAULT_NOTICE_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: String,
    pub kind: NoticeKind,
    pub message: String,
    pub timeout: Duration,
}

#[derive(Default)]
pub struct Notices {
    queue: Mutex<Vec<Notice>>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notice>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a notice and return its id.
    pub fn add(&self, kind: NoticeKind, message: impl Into<String>) -> String {
        self.add_with_timeout(kind, message, DEFAULT_NOTICE_TIMEOUT)
    }

    pub fn add_with_timeout(&self, kind: NoticeKind, message: impl Into<String>, timeout: Duration) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

        self.lock().push(Notice {
            id: id.clone(),
            kind,
            message: message.into(),
            timeout,
        });
        id
    }

    pub fn success(&self, message: impl Into<String>) -> String {
        self.add(NoticeKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> String {
        self.add(NoticeKind::Error, message)
    }

    pub fn remove(&self, id: &str) {
        self.lock().retain(|notice| notice.id != id);
    }

    pub fn list(&self) -> Vec<Notice> {
        self.lock().clone()
    }

    /// Take every queued notice, oldest first.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.lock())
    }
}
