// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declared per-session variables.

use super::Disposable;
use super::session_impl::Session;
use crate::error::DisposeError;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SLOT: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`SessionSlot`], unique within the process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u64);

pub(crate) type SlotValue = Arc<dyn Any + Send + Sync>;

/// Releases an auto-dispose slot value.
pub(crate) type Releaser = fn(&(dyn Any + Send + Sync)) -> Result<(), DisposeError>;

fn release_as<T: Disposable + 'static>(value: &(dyn Any + Send + Sync)) -> Result<(), DisposeError> {
    match value.downcast_ref::<T>() {
        Some(value) => value.dispose(),
        None => Err(DisposeError::failed("slot value has an unexpected type")),
    }
}

/// One stored slot value.
#[derive(Clone)]
pub(crate) struct SlotEntry {
    pub(crate) value: SlotValue,
    pub(crate) release: Option<Releaser>,
    /// Set on the session that wrote the value; copies taken by child sessions are not owned
    /// and are never released by the child.
    pub(crate) owned: bool,
}

impl SlotEntry {
    pub(crate) fn inherited(&self) -> SlotEntry {
        SlotEntry {
            owned: false,
            ..self.clone()
        }
    }
}

/**
A process-wide variable whose value lives in the current [`Session`].

Declare slots as statics. Reads never write: a session that has no value yet, and the root
session, yield the declared default.

```rust
use sessionwise::session::SessionSlot;

static INSTALL_DIR: SessionSlot<String> = SessionSlot::new(|| "/opt/app".to_string());

assert_eq!(INSTALL_DIR.get(), "/opt/app");
```

Child sessions start with a copy of their creator's values, taken once when the child is
created. Writes on either side afterwards are not seen by the other.
*/
pub struct SessionSlot<T> {
    id: AtomicU64,
    default: fn() -> T,
    release: Option<Releaser>,
}

impl<T> SessionSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub const fn new(default: fn() -> T) -> Self {
        SessionSlot {
            id: AtomicU64::new(0),
            default,
            release: None,
        }
    }

    /// The slot's identity. Allocated on first use and stable afterwards.
    pub fn id(&self) -> SlotId {
        let id = self.id.load(Ordering::Acquire);
        if id != 0 {
            return SlotId(id);
        }
        let fresh = NEXT_SLOT.fetch_add(1, Ordering::Relaxed);
        match self
            .id
            .compare_exchange(0, fresh, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => SlotId(fresh),
            Err(existing) => SlotId(existing),
        }
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }

    pub fn is_auto_dispose(&self) -> bool {
        self.release.is_some()
    }

    pub(crate) fn release(&self) -> Option<Releaser> {
        self.release
    }

    /// Reads the value in the current session, or the default.
    pub fn get(&self) -> T {
        Session::current().slot_value(self)
    }

    /// Writes the value in the current session.
    ///
    /// Overwriting does not release the previous value, even for auto-dispose slots.
    pub fn set(&self, value: T) {
        Session::current().set(self, value);
    }
}

impl<T> SessionSlot<T>
where
    T: Disposable + Clone + Send + Sync + 'static,
{
    /// Declares a slot whose value the owning session releases when its home task ends.
    ///
    /// The value is released once and then removed, so later reads see the default.
    pub const fn auto_dispose(default: fn() -> T) -> Self {
        SessionSlot {
            id: AtomicU64::new(0),
            default,
            release: Some(release_as::<T>),
        }
    }
}

impl<T> std::fmt::Debug for SessionSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSlot")
            .field("id", &self.id.load(Ordering::Relaxed))
            .field("auto_dispose", &self.release.is_some())
            .finish()
    }
}
