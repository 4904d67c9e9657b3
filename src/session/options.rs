// SPDX-License-Identifier: MIT OR Apache-2.0

use bitflags::bitflags;

bitflags! {
    /// What a session does besides holding slot values.
    ///
    /// The empty set is valid: the session only scopes [`SessionSlot`](super::SessionSlot) values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SessionOptions: u8 {
        /// Ask the settings collaborator for an overlay scope. Settings written inside the
        /// session stay in the overlay and are dropped when the session is disposed.
        const OVERLAY_COMPONENT_SETTINGS = 1 << 0;
        /// Route log records written under the session to a logger the logging collaborator
        /// hands out.
        const REDIRECT_LOGGING = 1 << 1;
        /// Give the session a home task with no task parent. Thread fields set on the creating
        /// task are not inherited; slot values are still copied from the creating session.
        const THREAD_HIERARCHY_ROOT = 1 << 2;
    }
}
