//! §4.1 Session Manager: owns the current session reference, drives keep-alive
//! driven reconnection, and publishes session lifecycle events.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use opcua::types::{ServerState, StatusCode};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{source_debug, source_error, source_warn};
use crate::diagnostics::DiagnosticsRegistry;
use crate::error::CoreError;
use crate::wire::{ReconnectDriver, WireClient, WireSession};

/// Monotonically increasing identity for the current session; advances exactly
/// when a reconnect installs a *new* session object (§4.1 step 2), never on a
/// same-session transport recovery.
pub type SessionGeneration = u64;

/// Published whenever the current session reference changes, or when a reconnect
/// attempt has finished (successfully or not), per §4.1/§5.
#[derive(Clone)]
pub enum SessionChangeEvent {
    /// `session` is `None` when a reconnect attempt failed outright (§4.1 Failure
    /// semantics); `is_new` is true only when the session object itself changed
    /// (as opposed to the same session recovering its transport).
    SessionChanged {
        session: Option<Arc<dyn WireSession>>,
        generation: SessionGeneration,
        is_new: bool,
    },
    /// Published unconditionally at the end of every reconnect attempt.
    ReconnectionCompleted,
}

/// Owns the single atomic session slot (§5) and the keep-alive-triggered
/// reconnect flow (§4.1).
pub struct SessionManager {
    client: Arc<dyn WireClient>,
    reconnect_driver: Arc<dyn ReconnectDriver>,
    diagnostics: Arc<DiagnosticsRegistry>,
    session_disposal_timeout: Duration,
    current: ArcSwapOption<dyn WireSession>,
    generation: AtomicU64,
    is_reconnecting: AtomicBool,
    disposed: AtomicBool,
    reconnect_guard: Mutex<()>,
    events: broadcast::Sender<SessionChangeEvent>,
}

impl SessionManager {
    pub fn new(
        client: Arc<dyn WireClient>,
        reconnect_driver: Arc<dyn ReconnectDriver>,
        diagnostics: Arc<DiagnosticsRegistry>,
        session_disposal_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            client,
            reconnect_driver,
            diagnostics,
            session_disposal_timeout,
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            is_reconnecting: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            reconnect_guard: Mutex::new(()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionChangeEvent> {
        self.events.subscribe()
    }

    /// Lock-free snapshot of the current session; per §4.1, callers must not cache
    /// this across an `await` point, since a reconnect may replace it.
    pub fn current(&self) -> Option<Arc<dyn WireSession>> {
        self.current.load_full()
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_reconnecting(&self) -> bool {
        self.is_reconnecting.load(Ordering::Acquire)
    }

    /// Select an endpoint for `server_url`, open a session bounded by
    /// `session_timeout`, install it as current and publish `SessionChanged` with
    /// `is_new=true` (§4.1 `create_session`).
    pub async fn create_session(
        &self,
        server_url: &str,
        session_timeout: Duration,
    ) -> Result<Arc<dyn WireSession>, CoreError> {
        let endpoints = self
            .client
            .get_server_endpoints(server_url)
            .await
            .map_err(CoreError::Connect)?;
        let endpoint = endpoints.into_iter().next().ok_or(CoreError::Connect(
            StatusCode::BadServerUriInvalid,
        ))?;

        let session = self
            .client
            .create_session(&endpoint, session_timeout)
            .await
            .map_err(CoreError::Connect)?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.current.store(Some(session.clone()));
        self.disposed.store(false, Ordering::Release);
        self.diagnostics.set_connected(Some(session.session_id()));
        source_debug!(generation, "session created");

        let _ = self.events.send(SessionChangeEvent::SessionChanged {
            session: Some(session.clone()),
            generation,
            is_new: true,
        });

        Ok(session)
    }

    /// Dispose the current session with a bounded timeout. Idempotent: a second
    /// call with nothing installed is a no-op.
    pub async fn close(&self) {
        self.disposed.store(true, Ordering::Release);
        if let Some(session) = self.current.swap(None) {
            self.diagnostics.set_disconnected();
            if let Err(status) = session.close(self.session_disposal_timeout).await {
                source_warn!(self.generation(), "session close failed (best-effort): {status}");
            }
        }
    }

    /// Keep-alive callback hook (§4.1). Ignores good status; on bad status with the
    /// server reporting `Unknown`/`Failed`, attempts a non-blocking reconnect
    /// hand-off. Must never suspend — spawns the actual reconnect work instead of
    /// awaiting it inline, matching the "fast callback" constraint in §5.
    pub fn on_keep_alive(
        self: &Arc<Self>,
        status: StatusCode,
        server_state: ServerState,
        cancel: CancellationToken,
    ) {
        if status.is_good() {
            return;
        }
        if !matches!(server_state, ServerState::Unknown | ServerState::Failed) {
            return;
        }

        let Some(_guard) = self.reconnect_guard.try_lock() else {
            // Contended: another keep-alive callback already triggered a reconnect.
            return;
        };
        if self.is_reconnecting.swap(true, Ordering::AcqRel) || self.disposed.load(Ordering::Acquire)
        {
            self.is_reconnecting.store(false, Ordering::Release);
            return;
        }
        self.diagnostics.set_reconnecting(true);
        self.diagnostics.record_reconnection_attempt();

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_reconnect(cancel).await });
    }

    async fn run_reconnect(&self, cancel: CancellationToken) {
        let generation = self.generation();
        let Some(old_session) = self.current.load_full() else {
            self.is_reconnecting.store(false, Ordering::Release);
            self.diagnostics.set_reconnecting(false);
            return;
        };

        match self.reconnect_driver.run(old_session.clone(), cancel).await {
            Some(new_session) => {
                let is_new = !Arc::ptr_eq(&old_session, &new_session);
                let generation = if is_new {
                    self.generation.fetch_add(1, Ordering::AcqRel) + 1
                } else {
                    generation
                };
                self.current.store(Some(new_session.clone()));
                self.disposed.store(false, Ordering::Release);
                self.diagnostics.set_connected(Some(new_session.session_id()));
                self.diagnostics.record_reconnection_success();

                let _ = self.events.send(SessionChangeEvent::SessionChanged {
                    session: Some(new_session),
                    generation,
                    is_new,
                });

                if is_new {
                    if let Err(status) = old_session.close(self.session_disposal_timeout).await {
                        source_warn!(generation, "old session disposal failed (best-effort): {status}");
                    }
                }
                source_debug!(generation, "reconnect succeeded (new_session={is_new})");
            }
            None => {
                self.current.store(None);
                self.diagnostics.set_disconnected();
                self.diagnostics.record_reconnection_failure();
                let _ = self.events.send(SessionChangeEvent::SessionChanged {
                    session: None,
                    generation,
                    is_new: false,
                });
                source_error!(generation, "reconnect failed, caller must restart from create_session");
            }
        }

        self.is_reconnecting.store(false, Ordering::Release);
        self.diagnostics.set_reconnecting(false);
        let _ = self.events.send(SessionChangeEvent::ReconnectionCompleted);
    }
}
