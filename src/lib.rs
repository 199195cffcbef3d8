use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod accounts;
pub mod api;
pub mod config;
pub mod decode;
pub mod error;
pub mod ffmpeg;
pub mod history;
pub mod imaging;
pub mod init;
pub mod job;
pub mod pipeline;
pub mod platform;
pub mod poller;
pub mod postprocess;
pub mod script;
pub mod submitter;

pub use error::{JobError, JobResult};

pub type LogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<LogHook>>> = Lazy::new(|| Mutex::new(None));

/// Mirror every tagged progress line to `hook` (or stop, with `None`).
pub fn set_log_hook(hook: Option<LogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("{}", message),
        _ => tracing::info!(tag, "{}", message),
    }

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
