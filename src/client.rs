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

use error::{Error, Result};
use path;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::VecDeque;
use std::fmt;
use std::str::{self, FromStr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use sync::{RequestLock, SuspendGate};
use transaction::{Transaction, TransactionStatus, ROOT_TRANSACTION};
use transport::Transport;
use watch::{Watch, WatchList};
use wire;

/// A decoded reply waiting for its caller.
struct StoredReply {
    header: wire::Header,
    body: Vec<u8>,
}

/// A decoded watch event waiting for the dispatcher.
///
/// The registry holds the only strong reference to the registration; an
/// event that outlives its watch simply fails to upgrade.
struct PendingEvent {
    watch: Weak<Watch>,
    vec: Vec<String>,
}

struct State {
    transport: Box<dyn Transport>,

    // Replies queued by the reader. Currently only one will ever be
    // outstanding, but nothing here depends on that.
    replies: Mutex<VecDeque<StoredReply>>,
    replies_waitq: Condvar,

    // One request at a time.
    request: RequestLock,

    // Protects transactions and watch state against save/restore.
    suspend: SuspendGate,

    // Registered watches, and pending watch callback events.
    watches: Mutex<WatchList>,
    events: Mutex<VecDeque<PendingEvent>>,
    events_waitq: Condvar,

    // Serializes all watch callbacks.
    dispatch: Mutex<()>,

    down: AtomicBool,
}

/// Client end of the store protocol.
///
/// Multiplexes one transport between any number of request threads and the
/// stream of watch events. Two worker threads are owned by the client: one
/// decodes incoming messages and one runs watch callbacks.
pub struct Client {
    state: Arc<State>,
    reader: Option<thread::JoinHandle<()>>,
    dispatcher: Option<thread::JoinHandle<()>>,
}

impl Client {
    /// Bring up the client over `transport` and spawn its workers.
    pub fn new<T: Transport + 'static>(transport: T) -> Result<Client> {
        let state = Arc::new(State {
            transport: Box::new(transport),
            replies: Mutex::new(VecDeque::new()),
            replies_waitq: Condvar::new(),
            request: RequestLock::new(),
            suspend: SuspendGate::new(),
            watches: Mutex::new(WatchList::new(Box::new(StdRng::from_entropy()))),
            events: Mutex::new(VecDeque::new()),
            events_waitq: Condvar::new(),
            dispatch: Mutex::new(()),
            down: AtomicBool::new(false),
        });

        let reader = {
            let state = state.clone();
            thread::Builder::new()
                .name(String::from("xenbus"))
                .spawn(move || read_loop(&state))
                .map_err(Error::Io)?
        };

        let dispatcher = {
            let state_for_dispatch = state.clone();
            match thread::Builder::new()
                .name(String::from("xenwatch"))
                .spawn(move || dispatch_loop(&state_for_dispatch)) {
                Ok(handle) => handle,
                Err(err) => {
                    state.transport.shutdown();
                    poison(&state);
                    let _ = reader.join();
                    return Err(Error::Io(err));
                }
            }
        };

        Ok(Client {
            state: state,
            reader: Some(reader),
            dispatcher: Some(dispatcher),
        })
    }

    /// Send one request and collect its reply payload.
    ///
    /// `parts` are written back to back after the header; the header length
    /// is their sum. A zero-length reply is a success. An `ERROR` reply is
    /// mapped through the mnemonic table. The reply's type is not required
    /// to match the request's.
    pub fn talk(&self, tx_id: wire::TxId, msg_type: u32, parts: &[&[u8]]) -> Result<Vec<u8>> {
        if msg_type == wire::XS_TRANSACTION_START {
            self.state.suspend.acquire_shared();
        }

        let result = self.request(tx_id, msg_type, parts);

        match msg_type {
            // the transaction never began, give the hold back
            wire::XS_TRANSACTION_START if result.is_err() => self.state.suspend.release_shared(),
            // drop the hold taken when the transaction started
            wire::XS_TRANSACTION_END => self.state.suspend.release_shared(),
            _ => {}
        }

        result
    }

    fn request(&self, tx_id: wire::TxId, msg_type: u32, parts: &[&[u8]]) -> Result<Vec<u8>> {
        let state = &*self.state;

        if state.down.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        let len = parts.iter().fold(0, |acc, part| acc + part.len());
        let header = wire::Header {
            msg_type: msg_type,
            req_id: 0,
            tx_id: tx_id,
            len: len as u32,
        };

        state.request.acquire();
        let outcome = self.send(&header, parts).and_then(|_| self.read_reply());
        state.request.release();

        let reply = outcome?;
        if reply.header.msg_type == wire::XS_ERROR {
            let mnemonic = wire::split(&reply.body)
                .first()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .unwrap_or_default();
            return Err(Error::from_mnemonic(&mnemonic,
                                            format!("request type {} failed", msg_type)));
        }

        Ok(reply.body)
    }

    fn send(&self, header: &wire::Header, parts: &[&[u8]]) -> Result<()> {
        self.state.transport.write_all(&header.to_vec())?;
        for part in parts {
            self.state.transport.write_all(part)?;
        }
        Ok(())
    }

    fn read_reply(&self) -> Result<StoredReply> {
        let state = &*self.state;
        let mut replies = state.replies.lock().unwrap();
        loop {
            if let Some(reply) = replies.pop_front() {
                return Ok(reply);
            }
            if state.down.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }
            replies = state.replies_waitq.wait(replies).unwrap();
        }
    }

    /// Simplified version of `talk`: single NUL-terminated string argument.
    fn single(&self, tx_id: wire::TxId, msg_type: u32, arg: &str) -> Result<Vec<u8>> {
        let mut field = arg.as_bytes().to_owned();
        field.push(b'\0');
        self.talk(tx_id, msg_type, &[&field])
    }

    /// List the entries under a directory.
    pub fn directory(&self,
                     tx_id: wire::TxId,
                     dir: &str,
                     node: &str)
                     -> Result<Vec<String>> {
        let body = self.single(tx_id, wire::XS_DIRECTORY, &path::join(dir, node))?;
        Ok(wire::split(&body)
            .iter()
            .map(|entry| String::from_utf8_lossy(entry).into_owned())
            .collect())
    }

    /// Check whether a path exists.
    pub fn exists(&self, tx_id: wire::TxId, dir: &str, node: &str) -> Result<bool> {
        match self.directory(tx_id, dir, node) {
            Ok(_) => Ok(true),
            Err(Error::ENOENT(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Get the value of a single file.
    pub fn read(&self, tx_id: wire::TxId, dir: &str, node: &str) -> Result<Vec<u8>> {
        self.single(tx_id, wire::XS_READ, &path::join(dir, node))
    }

    /// Write the value of a single file.
    pub fn write(&self,
                 tx_id: wire::TxId,
                 dir: &str,
                 node: &str,
                 value: &str)
                 -> Result<()> {
        let mut field = path::join(dir, node).into_bytes();
        field.push(b'\0');
        // the value is not NUL-terminated on the wire
        self.talk(tx_id, wire::XS_WRITE, &[&field, value.as_bytes()]).map(|_| ())
    }

    /// Create a new directory.
    pub fn mkdir(&self, tx_id: wire::TxId, dir: &str, node: &str) -> Result<()> {
        self.single(tx_id, wire::XS_MKDIR, &path::join(dir, node)).map(|_| ())
    }

    /// Destroy a file or directory (directories must be empty).
    pub fn rm(&self, tx_id: wire::TxId, dir: &str, node: &str) -> Result<()> {
        self.single(tx_id, wire::XS_RM, &path::join(dir, node)).map(|_| ())
    }

    /// Ask for the base path of a domain's subtree.
    pub fn get_domain_path(&self, dom_id: wire::DomainId) -> Result<String> {
        let body = self.single(ROOT_TRANSACTION,
                               wire::XS_GET_DOMAIN_PATH,
                               &format!("{}", dom_id))?;
        wire::split(&body)
            .first()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .ok_or_else(|| Error::EINVAL(String::from("empty domain path reply")))
    }

    /// Start a transaction: changes by others will not be seen during this
    /// transaction, and changes will not be visible to others until end.
    pub fn transaction_start(&self) -> Result<Transaction> {
        let body = self.single(ROOT_TRANSACTION, wire::XS_TRANSACTION_START, "")?;
        match Transaction::from_reply(&body) {
            Ok(transaction) => Ok(transaction),
            Err(err) => {
                // the request succeeded, so `talk` left the suspend hold in
                // place for a transaction we cannot identify
                self.state.suspend.release_shared();
                Err(err)
            }
        }
    }

    /// End a transaction, committing or abandoning its changes.
    pub fn transaction_end(&self,
                           transaction: Transaction,
                           status: TransactionStatus)
                           -> Result<()> {
        self.single(transaction.id(), wire::XS_TRANSACTION_END, status.wire_str()).map(|_| ())
    }

    /// Single read and parse.
    ///
    /// # Errors
    ///
    /// * `Error::EINVAL` if the value is not UTF-8 or does not parse as `T`
    pub fn read_parse<T: FromStr>(&self,
                                  tx_id: wire::TxId,
                                  dir: &str,
                                  node: &str)
                                  -> Result<T> {
        let value = self.read(tx_id, dir, node)?;
        let value = str::from_utf8(&value).map_err(|_| {
            Error::EINVAL(format!("value at {} is not UTF-8", path::join(dir, node)))
        })?;

        value.trim().parse::<T>().map_err(|_| {
            Error::EINVAL(format!("value {:?} at {} did not parse", value, path::join(dir, node)))
        })
    }

    /// Single format and write.
    ///
    /// # Errors
    ///
    /// * `Error::EINVAL` if the formatted value would not fit in a payload
    pub fn write_fmt(&self,
                     tx_id: wire::TxId,
                     dir: &str,
                     node: &str,
                     args: fmt::Arguments)
                     -> Result<()> {
        let value = fmt::format(args);
        if value.len() >= wire::XENSTORE_PAYLOAD_MAX {
            return Err(Error::EINVAL(format!("formatted value of {} bytes exceeds the payload \
                                              limit",
                                             value.len())));
        }

        self.write(tx_id, dir, node, &value)
    }

    /// Read a run of nodes under `dir`, feeding each value to its parser.
    ///
    /// Stops at the first read or parse failure.
    pub fn gather(&self,
                  tx_id: wire::TxId,
                  dir: &str,
                  fields: &mut [(&str, &mut dyn FnMut(&str) -> Result<()>)])
                  -> Result<()> {
        for field in fields.iter_mut() {
            let value = self.read(tx_id, dir, field.0)?;
            let value = str::from_utf8(&value).map_err(|_| {
                Error::EINVAL(format!("value at {} is not UTF-8", path::join(dir, field.0)))
            })?;
            (field.1)(value)?;
        }
        Ok(())
    }

    /// Emergency write.
    ///
    /// Pushes `print\0`, the caller's bytes and a final NUL straight at the
    /// store daemon and does not wait for an answer.
    pub fn debug_write(&self, bytes: &[u8]) -> Result<()> {
        let state = &*self.state;

        if state.down.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        let header = wire::Header {
            msg_type: wire::XS_DEBUG,
            req_id: 0,
            tx_id: 0,
            len: (b"print\0".len() + bytes.len() + 1) as u32,
        };

        state.request.acquire();
        let result: Result<()> = (|| {
            state.transport.write_all(&header.to_vec())?;
            state.transport.write_all(b"print\0")?;
            state.transport.write_all(bytes)?;
            state.transport.write_all(b"\0")?;
            Ok(())
        })();
        state.request.release();

        result
    }

    /// Register `callback` to run on every event the server fires for
    /// `node`. The returned record identifies the registration until it is
    /// passed to `unregister_watch`.
    pub fn register_watch<F>(&self, node: &str, callback: F) -> Result<Arc<Watch>>
        where F: Fn(&Watch, &[String]) + Send + Sync + 'static
    {
        let state = &*self.state;

        state.suspend.acquire_shared();

        let watch = {
            let mut watches = state.watches.lock().unwrap();
            watches.insert(node, Box::new(callback))
        };

        let result = self.watch_cmd(wire::XS_WATCH, watch.node(), watch.token());
        if result.is_err() {
            let mut watches = state.watches.lock().unwrap();
            watches.remove(&watch);
        }

        state.suspend.release_shared();

        result.map(|_| watch)
    }

    /// Drop a registration.
    ///
    /// A server failure is logged, not returned: the watch is gone from
    /// this client either way. When this returns, no pending event for the
    /// watch remains queued and no callback for it is in flight.
    ///
    /// Must not be called from inside a watch callback.
    pub fn unregister_watch(&self, watch: &Arc<Watch>) {
        let state = &*self.state;

        state.suspend.acquire_shared();

        let removed = {
            let mut watches = state.watches.lock().unwrap();
            watches.remove(watch)
        };

        if removed {
            if let Err(err) = self.watch_cmd(wire::XS_UNWATCH, watch.node(), watch.token()) {
                warn!("xenbus: failed to release watch {}: {}", watch.node(), err);
            }
        }

        state.suspend.release_shared();

        // Cancel pending watch events.
        {
            let mut events = state.events.lock().unwrap();
            events.retain(|event| {
                event.watch.upgrade().map_or(false, |w| !Arc::ptr_eq(&w, watch))
            });
        }

        // Wait out a callback that was already running for this watch.
        drop(state.dispatch.lock().unwrap());
    }

    /// Issue a `WATCH`/`UNWATCH` for a `(node, token)` pair. `EEXIST` means
    /// the server already has the registration, which is fine.
    fn watch_cmd(&self, msg_type: u32, node: &str, token: &str) -> Result<()> {
        let mut node_field = node.as_bytes().to_owned();
        node_field.push(b'\0');
        let mut token_field = token.as_bytes().to_owned();
        token_field.push(b'\0');

        match self.talk(ROOT_TRANSACTION, msg_type, &[&node_field, &token_field]) {
            Ok(_) => Ok(()),
            Err(Error::EEXIST(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Freeze the client ahead of a save/restore cycle.
    ///
    /// Waits for transactions and watch mutations to drain, then takes the
    /// request lock so nothing new reaches the wire.
    pub fn suspend(&self) {
        self.state.suspend.acquire_exclusive();
        self.state.request.acquire();
    }

    /// Thaw the client after a save/restore cycle and tell the server about
    /// every watch it may have forgotten.
    pub fn resume(&self) {
        let state = &*self.state;

        state.request.release();

        let watches = {
            let watches = state.watches.lock().unwrap();
            watches.entries()
        };
        for watch in watches {
            if let Err(err) = self.watch_cmd(wire::XS_WATCH, watch.node(), watch.token()) {
                warn!("xenbus: failed to re-establish watch {}: {}",
                      watch.node(),
                      err);
            }
        }

        state.suspend.release_exclusive();
    }

    /// Tear the client down: wake every blocked caller with
    /// `Error::Cancelled` and stop both workers. Also runs on drop.
    pub fn shutdown(&self) {
        let state = &*self.state;

        if state.down.swap(true, Ordering::SeqCst) {
            return;
        }

        state.transport.shutdown();

        {
            let _replies = state.replies.lock().unwrap();
            state.replies_waitq.notify_all();
        }
        {
            let _events = state.events.lock().unwrap();
            state.events_waitq.notify_all();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
    }
}

/// Decode messages off the transport until it fails or the client goes
/// down. The original keeps retrying forever; failing fast and cancelling
/// every caller gives them an error they can act on instead of a hang.
fn read_loop(state: &Arc<State>) {
    loop {
        if state.down.load(Ordering::SeqCst) {
            break;
        }
        if let Err(err) = process_msg(state) {
            if !state.down.load(Ordering::SeqCst) {
                error!("xenbus: error {} while reading message", err);
            }
            break;
        }
    }

    poison(state);
}

/// Read one message and route it to the reply queue or the event FIFO.
fn process_msg(state: &State) -> Result<()> {
    let mut header_bytes = [0u8; wire::HEADER_SIZE];
    state.transport.read_exact(&mut header_bytes)?;
    let header = wire::Header::parse(&header_bytes)?;

    if header.len() > wire::XENSTORE_PAYLOAD_MAX {
        return Err(Error::EINVAL(format!("oversized payload of {} bytes", header.len())));
    }

    let mut body = vec![0u8; header.len()];
    state.transport.read_exact(&mut body)?;

    if header.msg_type == wire::XS_WATCH_EVENT {
        deliver_event(state, body);
    } else {
        let mut replies = state.replies.lock().unwrap();
        replies.push_back(StoredReply {
            header: header,
            body: body,
        });
        state.replies_waitq.notify_one();
    }

    Ok(())
}

/// Queue a watch event for its registration, or drop it.
///
/// An event whose token is not registered is expected: the watch was
/// unregistered between the server firing and the event arriving.
fn deliver_event(state: &State, body: Vec<u8>) {
    let vec: Vec<String> = wire::split(&body)
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect();

    if vec.len() <= wire::XS_WATCH_TOKEN {
        warn!("xenbus: dropping watch event with only {} fields", vec.len());
        return;
    }

    let watches = state.watches.lock().unwrap();
    match watches.find(&vec[wire::XS_WATCH_TOKEN]) {
        Some(watch) => {
            let mut events = state.events.lock().unwrap();
            events.push_back(PendingEvent {
                watch: Arc::downgrade(&watch),
                vec: vec,
            });
            state.events_waitq.notify_one();
        }
        None => {
            debug!("xenbus: dropping event for unknown token {}",
                   vec[wire::XS_WATCH_TOKEN]);
        }
    }
}

/// Run watch callbacks, one at a time, in arrival order.
fn dispatch_loop(state: &Arc<State>) {
    loop {
        let event = {
            let mut events = state.events.lock().unwrap();
            loop {
                if let Some(event) = events.pop_front() {
                    break event;
                }
                if state.down.load(Ordering::SeqCst) {
                    return;
                }
                events = state.events_waitq.wait(events).unwrap();
            }
        };

        let _serialized = state.dispatch.lock().unwrap();
        if let Some(watch) = event.watch.upgrade() {
            // unregister may have raced the event out of the registry
            if watch.is_active() {
                watch.dispatch(&event.vec);
            }
        }
    }
}

/// Mark the client down and wake every waiter.
fn poison(state: &State) {
    state.down.store(true, Ordering::SeqCst);
    {
        let _replies = state.replies.lock().unwrap();
        state.replies_waitq.notify_all();
    }
    {
        let _events = state.events.lock().unwrap();
        state.events_waitq.notify_all();
    }
}
