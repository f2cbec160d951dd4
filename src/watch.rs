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

use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Callback invoked for every event the server fires on a watched node.
///
/// The vector holds the NUL-separated event fields: the changed path at
/// index 0, the registration token at index 1, and whatever else the server
/// chose to append.
pub type WatchCallback = Box<dyn Fn(&Watch, &[String]) + Send + Sync>;

/// A single registration on a node.
pub struct Watch {
    node: String,
    token: String,
    callback: WatchCallback,
    active: AtomicBool,
}

impl Watch {
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The token the server echoes back on every event for this watch.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Reports whether this registration is still in the registry.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn dispatch(&self, vec: &[String]) {
        (self.callback)(self, vec)
    }
}

/// The set of active registrations, keyed by token.
///
/// Used to route incoming events to their registration and to walk every
/// registration during resume.
pub struct WatchList {
    watches: HashMap<String, Arc<Watch>>,
    rng: Box<dyn RngCore + Send>,
}

impl WatchList {
    /// Create a new instance of the `WatchList`.
    pub fn new(rng: Box<dyn RngCore + Send>) -> WatchList {
        WatchList {
            watches: HashMap::new(),
            rng: rng,
        }
    }

    /// Generate a token no other live registration uses.
    ///
    /// Tokens are opaque to the server; it only ever echoes them back. A
    /// random identifier avoids handing a hostile server anything that is
    /// tied to this process's memory layout.
    fn generate_token(&mut self) -> String {
        loop {
            let token = format!("{:08x}", self.rng.next_u32());
            if !self.watches.contains_key(&token) {
                return token;
            }
        }
    }

    /// Insert a new registration for `node` and hand back its record.
    pub fn insert(&mut self, node: &str, callback: WatchCallback) -> Arc<Watch> {
        let token = self.generate_token();
        let watch = Arc::new(Watch {
            node: node.to_owned(),
            token: token.clone(),
            callback: callback,
            active: AtomicBool::new(true),
        });

        self.watches.insert(token, watch.clone());
        watch
    }

    /// Remove a registration. Returns false if it was already gone.
    pub fn remove(&mut self, watch: &Arc<Watch>) -> bool {
        match self.watches.remove(watch.token()) {
            Some(_) => {
                watch.active.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, token: &str) -> Option<Arc<Watch>> {
        self.watches.get(token).cloned()
    }

    pub fn entries(&self) -> Vec<Arc<Watch>> {
        self.watches.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }
}

#[cfg(test)]
mod test {
    use rand::{Error as RngError, RngCore};
    use std::sync::Arc;
    use super::*;

    struct ScriptedRng {
        values: Vec<u32>,
    }

    impl RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            self.values.remove(0)
        }

        fn next_u64(&mut self) -> u64 {
            self.next_u32() as u64
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest.iter_mut() {
                *b = 0;
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RngError> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn noop_callback() -> WatchCallback {
        Box::new(|_, _| {})
    }

    #[test]
    fn check_token_reuse() {
        let rng = ScriptedRng { values: vec![7, 7, 9] };
        let mut watches = WatchList::new(Box::new(rng));

        let first = watches.insert("/a", noop_callback());
        assert_eq!(first.token(), "00000007");

        // the second draw collides with the first and must be retried
        let second = watches.insert("/b", noop_callback());
        assert_eq!(second.token(), "00000009");
    }

    #[test]
    fn find_by_token() {
        let rng = ScriptedRng { values: vec![1, 2] };
        let mut watches = WatchList::new(Box::new(rng));

        let a = watches.insert("/a", noop_callback());
        let b = watches.insert("/b", noop_callback());

        let found = watches.find(a.token()).unwrap();
        assert!(Arc::ptr_eq(&found, &a));
        let found = watches.find(b.token()).unwrap();
        assert!(Arc::ptr_eq(&found, &b));
        assert!(watches.find("deadbeef").is_none());
    }

    #[test]
    fn remove_deactivates() {
        let rng = ScriptedRng { values: vec![1] };
        let mut watches = WatchList::new(Box::new(rng));

        let watch = watches.insert("/a", noop_callback());
        assert!(watch.is_active());

        assert_eq!(watches.remove(&watch), true);
        assert_eq!(watch.is_active(), false);
        assert!(watches.find(watch.token()).is_none());

        // a second removal finds nothing
        assert_eq!(watches.remove(&watch), false);
    }

    #[test]
    fn entries_walks_every_registration() {
        let rng = ScriptedRng { values: vec![1, 2, 3] };
        let mut watches = WatchList::new(Box::new(rng));

        watches.insert("/a", noop_callback());
        watches.insert("/b", noop_callback());
        watches.insert("/c", noop_callback());

        let mut nodes: Vec<String> = watches.entries()
            .iter()
            .map(|w| w.node().to_owned())
            .collect();
        nodes.sort();

        assert_eq!(nodes, vec!["/a", "/b", "/c"]);
        assert_eq!(watches.len(), 3);
    }
}
