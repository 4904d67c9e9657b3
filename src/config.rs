// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry configuration.

use crate::session::{GlobalRedirect, LogRedirect, SettingsOverlay};
use std::sync::Arc;
use std::time::Duration;

/// Settings for a [`SessionRegistry`](crate::session::SessionRegistry) and its worker pool.
///
/// Built with chained setters from [`Config::default`]:
///
/// ```rust
/// use sessionwise::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .min_workers(2)
///     .keep_alive(Duration::from_secs(1))
///     .thread_name("install-worker");
/// assert_eq!(config.min_workers, 2);
/// ```
#[derive(Clone)]
pub struct Config {
    /// Workers that never retire. Defaults to the available parallelism.
    pub min_workers: usize,
    /// How long an extra worker may sit idle before it exits.
    pub keep_alive: Duration,
    /// Prefix for worker thread names.
    pub thread_name: String,
    /// Receives `begin_overlay_scope` for sessions opened with `OVERLAY_COMPONENT_SETTINGS`.
    /// When unset those sessions simply get no overlay.
    pub settings: Option<Arc<dyn SettingsOverlay>>,
    /// Receives `begin_redirected_context` for sessions opened with `REDIRECT_LOGGING`.
    /// Defaults to [`GlobalRedirect`].
    pub log_redirect: Arc<dyn LogRedirect>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            keep_alive: Duration::from_secs(5),
            thread_name: "sessionwise-worker".to_string(),
            settings: None,
            log_redirect: Arc::new(GlobalRedirect),
        }
    }
}

impl Config {
    pub fn min_workers(mut self, n: usize) -> Self {
        self.min_workers = n.max(1);
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn settings(mut self, settings: Arc<dyn SettingsOverlay>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn log_redirect(mut self, redirect: Arc<dyn LogRedirect>) -> Self {
        self.log_redirect = redirect;
        self
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("min_workers", &self.min_workers)
            .field("keep_alive", &self.keep_alive)
            .field("thread_name", &self.thread_name)
            .field("settings", &self.settings.is_some())
            .finish_non_exhaustive()
    }
}
