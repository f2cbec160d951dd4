/**
    xenstore-rs provides a Rust based xenstore implementation.
    Copyright (C) 2016 Star Lab Corp.

    This program is free software; you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation; either version 2 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License along
    with this program; if not, see <http://www.gnu.org/licenses/>.
**/

use std::sync::{Condvar, Mutex};

struct GateState {
    shared: usize,
    exclusive: bool,
}

/// Read-preferring shared/exclusive barrier protecting against save/restore.
///
/// Transactions and watch mutations hold the gate shared; suspend holds it
/// exclusively. A shared hold outlives the scope that acquired it (a
/// transaction keeps it from start to end), so acquisition and release are
/// explicit calls rather than guards.
///
/// Shared acquisition only waits while the gate is held exclusively, never
/// for a waiting suspender. Suspend can therefore starve if requests never
/// drain; quiescing callers first is the caller's job.
pub struct SuspendGate {
    state: Mutex<GateState>,
    shared_waitq: Condvar,
    drain_waitq: Condvar,
}

impl SuspendGate {
    pub fn new() -> SuspendGate {
        SuspendGate {
            state: Mutex::new(GateState {
                shared: 0,
                exclusive: false,
            }),
            shared_waitq: Condvar::new(),
            drain_waitq: Condvar::new(),
        }
    }

    pub fn acquire_shared(&self) {
        let mut state = self.state.lock().unwrap();
        while state.exclusive {
            state = self.shared_waitq.wait(state).unwrap();
        }
        state.shared += 1;
    }

    pub fn release_shared(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.shared > 0);
        state.shared -= 1;
        if state.shared == 0 {
            self.drain_waitq.notify_all();
        }
    }

    pub fn acquire_exclusive(&self) {
        let mut state = self.state.lock().unwrap();
        while state.exclusive || state.shared > 0 {
            state = self.drain_waitq.wait(state).unwrap();
        }
        state.exclusive = true;
    }

    pub fn release_exclusive(&self) {
        {
            let mut state = self.state.lock().unwrap();
            debug_assert!(state.exclusive);
            state.exclusive = false;
        }
        self.shared_waitq.notify_all();
        self.drain_waitq.notify_all();
    }
}

/// One request at a time.
///
/// Equivalent to a binary semaphore: suspend acquires it in one call and
/// resume releases it in another, which a scoped mutex guard cannot express.
pub struct RequestLock {
    busy: Mutex<bool>,
    waitq: Condvar,
}

impl RequestLock {
    pub fn new() -> RequestLock {
        RequestLock {
            busy: Mutex::new(false),
            waitq: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        let mut busy = self.busy.lock().unwrap();
        while *busy {
            busy = self.waitq.wait(busy).unwrap();
        }
        *busy = true;
    }

    pub fn release(&self) {
        let mut busy = self.busy.lock().unwrap();
        debug_assert!(*busy);
        *busy = false;
        self.waitq.notify_one();
    }
}
