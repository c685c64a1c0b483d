//! User-facing notifications.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{error, info, warn};

use crate::error::{FailureNotice, ParleyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, message: Option<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message,
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title, Some(message.into()))
    }

    pub fn from_failure(level: NoticeLevel, failure: FailureNotice) -> Self {
        Self::new(level, failure.title, failure.message)
    }
}

impl From<&ParleyError> for Notice {
    fn from(error: &ParleyError) -> Self {
        Self::from_failure(NoticeLevel::Error, error.notice())
    }
}

/// Receives notices meant for the user.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}

/// Emits notices as log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notice: Notice) {
        let detail = notice.message.as_deref().unwrap_or_default();
        match notice.level {
            NoticeLevel::Info => info!(title = %notice.title, detail, "notice"),
            NoticeLevel::Warning => warn!(title = %notice.title, detail, "notice"),
            NoticeLevel::Error => error!(title = %notice.title, detail, "notice"),
        }
    }
}

/// Keeps every notice in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, notice: Notice) {
        if let Ok(mut guard) = self.notices.lock() {
            guard.push(notice);
        }
    }
}
