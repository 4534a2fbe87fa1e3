//! # Console message router
//!
//! Owns every registered console, the four group tables, and the two
//! outbound queues (read-only and read-reply).
//!
//! ```text
//!  post_read_only ──► [read-only queue] ──┐
//!  post_read_reply ─► [read-reply list] ──┤
//!                                         ▼
//!                                     poll()   (at most one action)
//!                                1. deliver one read-only message
//!                                2. assign one read-reply message
//!                                3. take one input from a console
//!                                         │
//!                  ┌──────────────────────┼─────────────────────┐
//!                  ▼                      ▼                     ▼
//!              console A             console B             session X
//! ```
//!
//! The router lock is held only while a queue or table is read or changed,
//! never across a call into a console, so one slow console cannot stall
//! delivery to the others.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use exec_core::{EventBus, ExecError, ExecEvent, Pacer, Result};

use crate::group::{GroupTable, MessageGroup};
use crate::interface::{
    ConsoleInput, ConsoleInterface, ConsoleKind, ConsoleLogEntry, ConsoleLogKind, MessageId,
};
use crate::request::{self, Destination, Owner, ReadOnlyRequest, ReadReply, ReplyOutcome};
use crate::routing::RoutingId;

/// Unsolicited console input, handed to the keyin layer.
#[derive(Debug, Clone)]
pub struct KeyinRequest {
    pub routing: RoutingId,
    pub console: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// What a single [`ConsoleRouter::poll`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    DeliveredReadOnly,
    AssignedReadReply,
    Keyin,
    ReplyReceived,
}

impl PollOutcome {
    pub fn did_work(self) -> bool {
        !matches!(self, PollOutcome::Idle)
    }
}

/// Snapshot of router queues for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    pub consoles: usize,
    pub pending_read_only: usize,
    pub outstanding_read_reply: usize,
}

struct Registered {
    console: Arc<dyn ConsoleInterface>,
    name: String,
    kind: ConsoleKind,
}

#[derive(Default)]
struct RouterState {
    consoles: BTreeMap<RoutingId, Registered>,
    groups: GroupTable,
    main: Option<RoutingId>,
    next_system: u64,
    read_only: VecDeque<ReadOnlyRequest>,
    read_reply: Vec<Arc<ReadReply>>,
    next_seq: u64,
    keyin_tx: Option<mpsc::Sender<KeyinRequest>>,
}

impl RouterState {
    fn find(&self, console: &Arc<dyn ConsoleInterface>) -> Option<RoutingId> {
        self.consoles
            .iter()
            .find(|(_, r)| std::ptr::addr_eq(Arc::as_ptr(&r.console), Arc::as_ptr(console)))
            .map(|(id, _)| *id)
    }

    fn read_only_targets(&self, dest: &Destination) -> Vec<Arc<dyn ConsoleInterface>> {
        if let Some(reg) = dest.routing.and_then(|id| self.consoles.get(&id)) {
            return vec![Arc::clone(&reg.console)];
        }
        self.groups
            .read_only_targets(dest.group)
            .into_iter()
            .filter_map(|id| self.consoles.get(&id))
            .map(|reg| Arc::clone(&reg.console))
            .collect()
    }

    fn read_reply_target(&self, dest: &Destination) -> Option<(RoutingId, Arc<dyn ConsoleInterface>)> {
        let id = match dest.routing {
            Some(id) if self.consoles.contains_key(&id) => id,
            _ => self.groups.read_reply_target(dest.group)?,
        };
        self.consoles.get(&id).map(|reg| (id, Arc::clone(&reg.console)))
    }

    /// Console a group falls back to: the main console, else the lowest
    /// remaining system console.
    fn fallback(&self) -> Option<RoutingId> {
        self.main.or_else(|| {
            self.consoles
                .iter()
                .find(|(_, r)| r.kind == ConsoleKind::System)
                .map(|(id, _)| *id)
        })
    }

    fn enqueue(&mut self, destination: Destination, text: String, owner: Owner) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.read_only.push_back(ReadOnlyRequest {
            seq,
            destination,
            text,
            owner,
        });
    }
}

/// Routes console traffic between the executive and registered consoles.
pub struct ConsoleRouter {
    state: Mutex<RouterState>,
    running: AtomicBool,
    stopped: AtomicBool,
    next_message_id: AtomicU64,
    bus: EventBus,
}

impl ConsoleRouter {
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: Mutex::new(RouterState {
                next_system: RoutingId::MAIN.value() + 1,
                ..RouterState::default()
            }),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            next_message_id: AtomicU64::new(1),
            bus,
        }
    }

    /// Mark the executive as running; the main console becomes pinned.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Where unsolicited console input is forwarded.
    pub fn set_keyin_sender(&self, tx: mpsc::Sender<KeyinRequest>) {
        self.state.lock().keyin_tx = Some(tx);
    }

    // ── Registration ───────────────────────────────────────────

    /// Register a console. System consoles take sequential routing ids
    /// starting at [`RoutingId::MAIN`]; session consoles take a routing id
    /// derived from their name.
    pub fn register_console(
        &self,
        console: Arc<dyn ConsoleInterface>,
        is_main: bool,
    ) -> Result<RoutingId> {
        let name = console.name().to_string();
        let kind = console.kind();
        let mut state = self.state.lock();

        if self.stopped.load(Ordering::SeqCst) {
            return Err(ExecError::RouterStopped);
        }
        if state.find(&console).is_some() {
            return Err(ExecError::DuplicateConsole(name));
        }
        if state.consoles.values().any(|r| r.name.eq_ignore_ascii_case(&name)) {
            return Err(ExecError::DuplicateConsoleName(name));
        }

        let id = match kind {
            ConsoleKind::Session => {
                if is_main {
                    return Err(ExecError::invalid("console", "a session console cannot be main"));
                }
                let id = RoutingId::for_session(&name);
                if state.consoles.contains_key(&id) {
                    return Err(ExecError::DuplicateConsoleName(name));
                }
                id
            }
            ConsoleKind::System if is_main || state.main.is_none() => {
                if state.main.is_some() {
                    return Err(ExecError::invalid("console", "a main console is already registered"));
                }
                state.main = Some(RoutingId::MAIN);
                RoutingId::MAIN
            }
            ConsoleKind::System => {
                // Session ids are derived from names and may already sit on
                // the next sequential value.
                let mut id = RoutingId::new(state.next_system);
                while state.consoles.contains_key(&id) {
                    state.next_system += 1;
                    id = RoutingId::new(state.next_system);
                }
                state.next_system += 1;
                id
            }
        };

        if kind == ConsoleKind::System {
            state.groups.add_system_console(id);
        }
        state.consoles.insert(
            id,
            Registered {
                console,
                name: name.clone(),
                kind,
            },
        );
        drop(state);

        info!(console = %name, routing = %id, ?kind, "console registered");
        self.bus.publish(ExecEvent::ConsoleRegistered {
            name,
            routing: id.value(),
            system: kind == ConsoleKind::System,
        });
        Ok(id)
    }

    pub fn unregister_console(&self, console: &Arc<dyn ConsoleInterface>) -> Result<()> {
        let id = self
            .state
            .lock()
            .find(console)
            .ok_or_else(|| ExecError::ConsoleNotFound(console.name().to_string()))?;
        self.unregister_routing(id)
    }

    /// Remove a console. Groups it leaves empty, or whose read-reply console
    /// it was, fall back to the main console; read-replies displayed on it
    /// are reassigned on a later poll.
    pub fn unregister_routing(&self, id: RoutingId) -> Result<()> {
        let mut state = self.state.lock();
        let Some(reg) = state.consoles.get(&id) else {
            return Err(ExecError::ConsoleNotFound(id.to_string()));
        };
        let name = reg.name.clone();
        if state.main == Some(id) && self.is_running() {
            return Err(ExecError::MainConsoleInUse(name));
        }

        state.consoles.remove(&id);
        if state.main == Some(id) {
            state.main = None;
        }
        let fallback = state.fallback();
        let reassigned = state.groups.remove_console(id, fallback);

        for req in &state.read_reply {
            if req.unbind_from(id) {
                debug!(console = %name, text = req.text(), "read-reply unbound for reassignment");
            }
        }

        let fallback_name = fallback
            .and_then(|fb| state.consoles.get(&fb))
            .map(|r| r.name.clone());
        if let Some(ref to) = fallback_name {
            for group in &reassigned {
                state.enqueue(
                    Destination::group(*group),
                    format!("{group} MESSAGES REASSIGNED FROM {name} TO {to}"),
                    None,
                );
            }
        }
        drop(state);

        info!(console = %name, routing = %id, reassigned = reassigned.len(), "console unregistered");
        self.bus.publish(ExecEvent::ConsoleUnregistered {
            name,
            routing: id.value(),
        });
        if let Some(fb) = fallback {
            for group in reassigned {
                self.bus.publish(ExecEvent::GroupReassigned {
                    group: group.to_string(),
                    routing: fb.value(),
                });
            }
        }
        Ok(())
    }

    /// Designate `id` as the read-reply console of `group`.
    pub fn assign_read_reply(&self, group: MessageGroup, id: RoutingId) -> Result<()> {
        let mut state = self.state.lock();
        match state.consoles.get(&id) {
            Some(r) if r.kind == ConsoleKind::System => {
                state.groups.set_read_reply(group, id);
                Ok(())
            }
            Some(r) => Err(ExecError::invalid(
                "console",
                format!("{} is a session console", r.name),
            )),
            None => Err(ExecError::ConsoleNotFound(id.to_string())),
        }
    }

    /// Add `id` to the read-only consoles of `group`.
    pub fn add_read_only(&self, group: MessageGroup, id: RoutingId) -> Result<()> {
        let mut state = self.state.lock();
        if !state.consoles.contains_key(&id) {
            return Err(ExecError::ConsoleNotFound(id.to_string()));
        }
        state.groups.add_read_only(group, id);
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn main_console(&self) -> Option<RoutingId> {
        self.state.lock().main
    }

    pub fn routing_of(&self, name: &str) -> Option<RoutingId> {
        self.state
            .lock()
            .consoles
            .iter()
            .find(|(_, r)| r.name.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    pub fn console_names(&self) -> Vec<(RoutingId, String)> {
        self.state
            .lock()
            .consoles
            .iter()
            .map(|(id, r)| (*id, r.name.clone()))
            .collect()
    }

    pub fn read_only_consoles(&self, group: MessageGroup) -> Vec<RoutingId> {
        self.state.lock().groups.read_only_targets(group)
    }

    pub fn read_reply_console(&self, group: MessageGroup) -> Option<RoutingId> {
        self.state.lock().groups.read_reply_target(group)
    }

    pub fn stats(&self) -> RouterStats {
        let state = self.state.lock();
        RouterStats {
            consoles: state.consoles.len(),
            pending_read_only: state.read_only.len(),
            outstanding_read_reply: state.read_reply.len(),
        }
    }

    // ── Posting ────────────────────────────────────────────────

    pub fn post_read_only(&self, destination: Destination, text: impl Into<String>, owner: Owner) {
        self.state.lock().enqueue(destination, text.into(), owner);
    }

    /// Shorthand for a read-only message to the System group.
    pub fn notify_system(&self, text: impl Into<String>) {
        self.post_read_only(Destination::group(MessageGroup::System), text, None);
    }

    /// Queue a read-reply message. After [`shutdown`](Self::shutdown) the
    /// returned request is already cancelled.
    pub fn post_read_reply(
        &self,
        destination: Destination,
        text: impl Into<String>,
        max_reply_len: u8,
        owner: Owner,
    ) -> Arc<ReadReply> {
        let req = Arc::new(ReadReply::new(destination, text.into(), max_reply_len, owner));
        // Checked under the lock so a post cannot slip in behind shutdown's drain.
        let mut state = self.state.lock();
        if self.stopped.load(Ordering::SeqCst) {
            drop(state);
            req.cancel();
            return req;
        }
        state.read_reply.push(Arc::clone(&req));
        req
    }

    /// Post a read-reply and suspend the caller until one of `valid` is
    /// answered (case-insensitive). Other answers re-prompt. Returns the
    /// index of the answer, or `None` if the router shut down first.
    pub async fn post_read_reply_and_wait(
        &self,
        destination: Destination,
        prompt: &str,
        valid: &[&str],
        owner: Owner,
    ) -> Option<usize> {
        let max_len = valid.iter().map(|v| v.len()).max().unwrap_or(0).min(255) as u8;
        loop {
            let req = self.post_read_reply(destination, prompt, max_len, owner.clone());
            match req.wait().await {
                ReplyOutcome::Cancelled => return None,
                ReplyOutcome::Completed(answer) => {
                    let answer = answer.trim();
                    if let Some(i) = valid.iter().position(|v| v.eq_ignore_ascii_case(answer)) {
                        return Some(i);
                    }
                    debug!(answer, "reply not in the valid set, prompting again");
                }
            }
        }
    }

    // ── Polling ────────────────────────────────────────────────

    /// Do at most one unit of work: deliver a read-only message, else assign
    /// a read-reply message, else collect one input from a console.
    pub fn poll(&self) -> PollOutcome {
        if self.drain_read_only() {
            return PollOutcome::DeliveredReadOnly;
        }
        if self.assign_pending_read_reply() {
            return PollOutcome::AssignedReadReply;
        }
        self.poll_interfaces()
    }

    fn drain_read_only(&self) -> bool {
        let candidates: Vec<(u64, Vec<Arc<dyn ConsoleInterface>>, String)> = {
            let state = self.state.lock();
            state
                .read_only
                .iter()
                .map(|r| (r.seq, state.read_only_targets(&r.destination), r.text.clone()))
                .collect()
        };

        for (seq, targets, text) in candidates {
            let mut delivered = false;
            for console in &targets {
                if console.post_read_only(&text) {
                    delivered = true;
                }
            }
            if !delivered {
                // Left queued; the next poll tries it again.
                continue;
            }
            let removed = {
                let mut state = self.state.lock();
                state
                    .read_only
                    .iter()
                    .position(|r| r.seq == seq)
                    .and_then(|i| state.read_only.remove(i))
            };
            if let Some(req) = removed {
                request::record(
                    &req.owner,
                    ConsoleLogEntry::new(ConsoleLogKind::ReadOnly, req.destination.routing, req.text),
                );
            }
            return true;
        }
        false
    }

    fn assign_pending_read_reply(&self) -> bool {
        let pending: Vec<(Arc<ReadReply>, RoutingId, Arc<dyn ConsoleInterface>)> = {
            let state = self.state.lock();
            state
                .read_reply
                .iter()
                .filter(|r| r.is_unassigned())
                .filter_map(|r| {
                    state
                        .read_reply_target(&r.destination())
                        .map(|(id, c)| (Arc::clone(r), id, c))
                })
                .collect()
        };

        for (req, id, console) in pending {
            if !console.has_spare_capacity() {
                continue;
            }
            let message_id: MessageId = self.next_message_id.fetch_add(1, Ordering::SeqCst);
            if !console.post_read_reply(message_id, req.text(), req.max_reply_len()) {
                continue;
            }
            let bound = {
                let state = self.state.lock();
                state.consoles.contains_key(&id) && req.bind(id, message_id)
            };
            if !bound {
                console.cancel_read_reply(message_id);
                continue;
            }
            debug!(routing = %id, message_id, "read-reply assigned");
            request::record(
                req.owner(),
                ConsoleLogEntry::new(ConsoleLogKind::ReadReply, Some(id), req.text()),
            );
            return true;
        }
        false
    }

    fn poll_interfaces(&self) -> PollOutcome {
        let consoles: Vec<(RoutingId, String, Arc<dyn ConsoleInterface>)> = {
            let state = self.state.lock();
            state
                .consoles
                .iter()
                .map(|(id, r)| (*id, r.name.clone(), Arc::clone(&r.console)))
                .collect()
        };

        for (id, name, console) in consoles {
            match console.poll_input() {
                None => continue,
                Some(ConsoleInput::Unsolicited(text)) => {
                    self.forward_keyin(id, name, text);
                    return PollOutcome::Keyin;
                }
                Some(ConsoleInput::Reply { message_id, text }) => {
                    let req = {
                        let mut state = self.state.lock();
                        state
                            .read_reply
                            .iter()
                            .position(|r| r.is_assigned_to(id, message_id))
                            .map(|i| state.read_reply.remove(i))
                    };
                    match req {
                        Some(req) => {
                            request::record(
                                req.owner(),
                                ConsoleLogEntry::new(ConsoleLogKind::Reply, Some(id), text.clone()),
                            );
                            req.complete(text);
                        }
                        None => {
                            warn!(console = %name, message_id, "reply to unknown message discarded");
                        }
                    }
                    return PollOutcome::ReplyReceived;
                }
            }
        }
        PollOutcome::Idle
    }

    fn forward_keyin(&self, routing: RoutingId, console: String, text: String) {
        let tx = self.state.lock().keyin_tx.clone();
        let keyin = KeyinRequest {
            routing,
            console,
            text,
            received_at: Utc::now(),
        };
        match tx {
            Some(tx) => {
                if let Err(e) = tx.try_send(keyin) {
                    warn!(error = %e, "keyin dropped");
                }
            }
            None => {
                info!(console = %keyin.console, text = %keyin.text, "keyin received with no handler");
            }
        }
    }

    /// Poll until cancelled, sleeping only after a poll that did nothing.
    pub async fn run(self: Arc<Self>, pacer: Arc<dyn Pacer>, interval: Duration, token: CancellationToken) {
        info!(interval_ms = interval.as_millis() as u64, "console router started");
        while !token.is_cancelled() {
            if self.poll().did_work() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = pacer.pause(interval) => {}
            }
        }
        info!("console router loop stopped");
    }

    // ── Shutdown ───────────────────────────────────────────────

    /// Cancel every outstanding read-reply. Waiters wake immediately and
    /// consoles are told to withdraw what they display.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.set_running(false);

        let (outstanding, consoles, dropped) = {
            let mut state = self.state.lock();
            let outstanding: Vec<Arc<ReadReply>> = state.read_reply.drain(..).collect();
            let consoles: BTreeMap<RoutingId, Arc<dyn ConsoleInterface>> = state
                .consoles
                .iter()
                .map(|(id, r)| (*id, Arc::clone(&r.console)))
                .collect();
            (outstanding, consoles, state.read_only.len())
        };

        let mut cancelled = 0usize;
        for req in outstanding {
            if req.is_resolved() {
                continue;
            }
            cancelled += 1;
            if let Some((id, message_id)) = req.cancel() {
                if let Some(console) = consoles.get(&id) {
                    console.cancel_read_reply(message_id);
                }
            }
        }
        info!(cancelled, undelivered_read_only = dropped, "console router shut down");
    }
}
