//! Process-wide registry of recording identifiers this tool created.
//!
//! A session id or port id is tracked exactly while a locally-initiated
//! capture using it is active. Stale entries would mis-attribute a future
//! external session that reuses the same numeric id, so capture drivers
//! must untrack on every exit path.
//!
//! Ownership classification is a pure function over a [`LedgerView`] so
//! tests can construct ledger states directly.

use crate::rolling::RollingLog;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Snapshot of the ledger's tracked identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerView {
    pub session_ids: HashSet<i32>,
    pub port_ids: HashSet<i32>,
    pub owner_id: String,
}

/// Decides OWN vs EXTERNAL for one descriptor.
///
/// Any single matching identifier is sufficient: platform versions differ
/// in which descriptor fields they populate reliably, so the signals are
/// OR-combined. An unparsable port id (sentinel or garbage) is "no port
/// match", not an error. The owner comparison requires the locally
/// recorded owner id to be non-empty - otherwise descriptors with an
/// absent owner field would match an unset local owner.
pub fn is_own(view: &LedgerView, session_id: i32, port_id: &str, owner_id: &str) -> bool {
    let own_session = view.session_ids.contains(&session_id);
    let own_port = port_id
        .parse::<i32>()
        .map(|id| view.port_ids.contains(&id))
        .unwrap_or(false);
    let own_owner = !view.owner_id.is_empty() && owner_id == view.owner_id;

    own_session || own_port || own_owner
}

/// Concurrency-safe ledger handle.
///
/// One mutex guards the set pair and the owner scalar; capture drivers
/// mutate from their own threads while the classifier reads on platform
/// event delivery.
#[derive(Clone)]
pub struct SessionLedger {
    inner: Arc<Mutex<LedgerView>>,
    log: RollingLog,
}

impl SessionLedger {
    pub fn new(log: RollingLog) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerView::default())),
            log,
        }
    }

    /// Records the owning process identity. Called once at process start.
    pub fn set_owner_id(&self, owner_id: impl Into<String>) {
        let owner_id = owner_id.into();
        if let Ok(mut view) = self.inner.lock() {
            view.owner_id = owner_id.clone();
        }
        self.log.system(format!("Own owner id: {owner_id}"));
    }

    pub fn add_session(&self, session_id: i32) {
        if let Ok(mut view) = self.inner.lock() {
            view.session_ids.insert(session_id);
        }
        self.log.system(format!("Tracked own session ID: {session_id}"));
    }

    /// Idempotent; removing an untracked id is a no-op.
    pub fn remove_session(&self, session_id: i32) {
        if let Ok(mut view) = self.inner.lock() {
            view.session_ids.remove(&session_id);
        }
        self.log
            .system(format!("Untracked own session ID: {session_id}"));
    }

    pub fn add_port(&self, port_id: i32) {
        if let Ok(mut view) = self.inner.lock() {
            view.port_ids.insert(port_id);
        }
        self.log.system(format!("Tracked own port ID: {port_id}"));
    }

    /// Idempotent; removing an untracked id is a no-op.
    pub fn remove_port(&self, port_id: i32) {
        if let Ok(mut view) = self.inner.lock() {
            view.port_ids.remove(&port_id);
        }
        self.log.system(format!("Untracked own port ID: {port_id}"));
    }

    /// Classifies one descriptor against the current ledger state.
    pub fn classify(&self, session_id: i32, port_id: &str, owner_id: &str) -> bool {
        self.inner
            .lock()
            .map(|view| is_own(&view, session_id, port_id, owner_id))
            .unwrap_or(false)
    }

    /// Point-in-time copy of the tracked identifiers.
    pub fn view(&self) -> LedgerView {
        self.inner
            .lock()
            .map(|view| view.clone())
            .unwrap_or_default()
    }

    /// Formatted dump of the tracked identifiers, for the diagnostic log.
    pub fn debug_summary(&self) -> String {
        let view = self.view();
        let mut session_ids: Vec<i32> = view.session_ids.into_iter().collect();
        session_ids.sort_unstable();
        let mut port_ids: Vec<i32> = view.port_ids.into_iter().collect();
        port_ids.sort_unstable();

        format!(
            "Own tracking info:\n  Owner: {}\n  Session IDs: {:?}\n  Port IDs: {:?}",
            view.owner_id, session_ids, port_ids
        )
    }
}
