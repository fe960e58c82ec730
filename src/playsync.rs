// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Represents the current cancel state.
#[derive(Clone, Copy, PartialEq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// A cancel handle is shared between the transport and every task it spawns. Holders are
/// expected to check it before producing sound and to race their sleeps against it.
#[derive(Clone)]
pub struct CancelHandle {
    /// Set once the owning operation has been cancelled. Never reset.
    state: Arc<Mutex<CancelState>>,
    /// Wakes anything awaiting cancellation.
    notify: Arc<Notify>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            state: Arc::new(Mutex::new(CancelState::Untouched)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Returns true if the operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.state.lock() == CancelState::Cancelled
    }

    /// Resolves once the handle is cancelled. Resolves immediately if it already was.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking so a concurrent cancel can't slip between.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel the operation.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if *state == CancelState::Untouched {
            *state = CancelState::Cancelled;
            self.notify.notify_waiters();
        }
    }
}
