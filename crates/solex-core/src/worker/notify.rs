//! Push messages and notification clicks.
//!
//! Push payloads are plain text and become the notification body. Clicking
//! always dismisses the notification; the `open` action additionally opens
//! the embedded URL in a client window.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::NotificationConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationActionButton {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationActionButton>,
}

impl Notification {
    /// Build the notification for a push message carrying `payload`.
    pub fn from_push(config: &NotificationConfig, payload: Option<&str>) -> Self {
        Self {
            title: config.title.clone(),
            body: payload
                .map(str::to_string)
                .unwrap_or_else(|| config.default_body.clone()),
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            data: NotificationData {
                url: config.target_url.clone(),
            },
            actions: vec![
                NotificationActionButton {
                    action: NotificationAction::Open.as_str().to_string(),
                    title: config.open_label.clone(),
                },
                NotificationActionButton {
                    action: NotificationAction::Close.as_str().to_string(),
                    title: config.close_label.clone(),
                },
            ],
        }
    }
}

/// Which part of a notification was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Open,
    Close,
    /// The notification body itself
    Body,
}

impl NotificationAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "open" => NotificationAction::Open,
            "close" => NotificationAction::Close,
            _ => NotificationAction::Body,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationAction::Open => "open",
            NotificationAction::Close => "close",
            NotificationAction::Body => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Opened(String),
    Dismissed,
}

/// Host surface for showing notifications and opening windows.
pub trait Notifier: Send + Sync {
    fn show(&self, notification: &Notification);
    fn close(&self, notification: &Notification);
    fn open_window(&self, url: &str);
}

/// Recorded notifier call, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    Show(String),
    Close(String),
    OpenWindow(String),
}

/// Notifier that only records what it was asked to do.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<NotifierCall>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: NotifierCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, notification: &Notification) {
        self.record(NotifierCall::Show(notification.body.clone()));
    }

    fn close(&self, notification: &Notification) {
        self.record(NotifierCall::Close(notification.body.clone()));
    }

    fn open_window(&self, url: &str) {
        self.record(NotifierCall::OpenWindow(url.to_string()));
    }
}

/// Dismiss `notification` and, for the open action, open its URL.
pub fn handle_click(
    notifier: &dyn Notifier,
    notification: &Notification,
    action: NotificationAction,
) -> ClickOutcome {
    notifier.close(notification);
    match action {
        NotificationAction::Open => {
            notifier.open_window(&notification.data.url);
            ClickOutcome::Opened(notification.data.url.clone())
        }
        NotificationAction::Close | NotificationAction::Body => ClickOutcome::Dismissed,
    }
}
