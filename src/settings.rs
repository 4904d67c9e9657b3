// SPDX-License-Identifier: MIT OR Apache-2.0

//! A key/value settings store with per-session overlays.
//!
//! [`LayeredSettings`] is a ready-made [`SettingsOverlay`]. Sessions opened with
//! [`OVERLAY_COMPONENT_SETTINGS`](crate::session::SessionOptions::OVERLAY_COMPONENT_SETTINGS) get their own
//! layer: writes made under the session land in that layer, reads see it first, and disposing
//! the session throws the layer away so the values from before are visible again.
//!
//! ```rust
//! use sessionwise::session::{SessionOptions, SessionRegistry};
//! use sessionwise::settings::LayeredSettings;
//! use sessionwise::Config;
//! use std::sync::Arc;
//!
//! let settings = Arc::new(LayeredSettings::new());
//! settings.set_base("proxy", "none");
//! let registry = SessionRegistry::new(Config::default().settings(settings.clone()));
//!
//! let scope = registry.create(SessionOptions::OVERLAY_COMPONENT_SETTINGS).unwrap();
//! settings.set("proxy", "10.0.0.1:3128");
//! assert_eq!(settings.get("proxy").as_deref(), Some("10.0.0.1:3128"));
//! drop(scope);
//!
//! assert_eq!(settings.get("proxy").as_deref(), Some("none"));
//! ```

use crate::error::{ActivationError, DisposeError};
use crate::session::{Disposable, Session, SessionId, SettingsOverlay};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type Layer = HashMap<String, String>;

/// Base values plus one overlay layer per overlaying session.
#[derive(Debug, Default)]
pub struct LayeredSettings {
    base: RwLock<Layer>,
    overlays: Arc<DashMap<SessionId, Layer>>,
}

impl LayeredSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `key` as seen from the current session.
    ///
    /// Layers are searched from the current session outwards through its parents, then the
    /// base values.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut session = Some(Session::current());
        while let Some(s) = session {
            if let Some(layer) = self.overlays.get(&s.id()) {
                if let Some(value) = layer.get(key) {
                    return Some(value.clone());
                }
            }
            session = s.parent();
        }
        self.base.read().get(key).cloned()
    }

    /// Writes `key` into the nearest overlay layer of the current session chain, or into the
    /// base values when no session in the chain has a layer.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        let mut session = Some(Session::current());
        while let Some(s) = session {
            if let Some(mut layer) = self.overlays.get_mut(&s.id()) {
                layer.insert(key, value);
                return;
            }
            session = s.parent();
        }
        self.base.write().insert(key, value);
    }

    /// Writes `key` into the base values, below every overlay.
    pub fn set_base(&self, key: impl Into<String>, value: impl Into<String>) {
        self.base.write().insert(key.into(), value.into());
    }

    /// Number of live overlay layers.
    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }
}

/// Ends one session's overlay layer.
struct OverlayScope {
    overlays: Arc<DashMap<SessionId, Layer>>,
    session: SessionId,
}

impl Disposable for OverlayScope {
    fn dispose(&self) -> Result<(), DisposeError> {
        match self.overlays.remove(&self.session) {
            Some(_) => Ok(()),
            None => Err(DisposeError::failed(format!(
                "settings overlay of session {} was already gone",
                self.session
            ))),
        }
    }
}

impl SettingsOverlay for LayeredSettings {
    fn begin_overlay_scope(
        &self,
        session: &Session,
    ) -> Result<Box<dyn Disposable>, ActivationError> {
        if session.is_root() {
            return Err(ActivationError::new(
                "settings",
                "the root session cannot carry an overlay",
            ));
        }
        self.overlays.insert(session.id(), Layer::new());
        Ok(Box::new(OverlayScope {
            overlays: self.overlays.clone(),
            session: session.id(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::session::{SessionOptions, SessionRegistry};

    fn registry(settings: &Arc<LayeredSettings>) -> SessionRegistry {
        SessionRegistry::new(Config::default().min_workers(1).settings(settings.clone()))
    }

    #[test]
    fn nested_overlays_restore_in_order() {
        let settings = Arc::new(LayeredSettings::new());
        settings.set_base("mode", "base");
        let registry = registry(&settings);

        let outer = registry
            .create(SessionOptions::OVERLAY_COMPONENT_SETTINGS)
            .expect("outer");
        settings.set("mode", "outer");
        {
            let _inner = registry
                .create(SessionOptions::OVERLAY_COMPONENT_SETTINGS)
                .expect("inner");
            assert_eq!(settings.get("mode").as_deref(), Some("outer"));
            settings.set("mode", "inner");
            assert_eq!(settings.get("mode").as_deref(), Some("inner"));
            assert_eq!(settings.overlay_count(), 2);
        }
        assert_eq!(settings.get("mode").as_deref(), Some("outer"));
        drop(outer);
        assert_eq!(settings.get("mode").as_deref(), Some("base"));
        assert_eq!(settings.overlay_count(), 0);
    }

    #[test]
    fn sessions_without_overlay_write_through() {
        let settings = Arc::new(LayeredSettings::new());
        let registry = registry(&settings);
        let outer = registry
            .create(SessionOptions::OVERLAY_COMPONENT_SETTINGS)
            .expect("outer");
        {
            let _plain = registry.create(SessionOptions::empty()).expect("plain");
            settings.set("lang", "fr");
        }
        assert_eq!(settings.get("lang").as_deref(), Some("fr"));
        drop(outer);
        assert_eq!(settings.get("lang"), None);

        settings.set("lang", "de");
        assert_eq!(settings.get("lang").as_deref(), Some("de"));
    }
}
