//! Per-connection request handling.
//!
//! A [`Connection`] owns one session and drives it through
//! idle ⇄ executing. Statements run one at a time on the blocking pool,
//! bounded by the execution timeout and observing a [`CancelToken`] that
//! `cancel`, timeout, and disconnect all trip. Frames leave through an
//! [`Outbound`] channel; a client that stops draining it past the send
//! timeout gets disconnected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use pql::{
    parse_str, CancelToken, ExecOutput, Executor, MetaCommand, Planner, QueryPlan, Registry, Row,
    Suggestion,
};

use crate::config::{Backend, ServerConfig};
use crate::session::{AccessMode, Session, SessionManager};
use crate::transport::framing;
use crate::types::*;

use super::meta;

/// Shared, cheaply cloneable entry point for every connection.
#[derive(Clone)]
pub struct ProtocolHandler {
    backend: Backend,
    sessions: Arc<SessionManager>,
    config: Arc<ServerConfig>,
}

impl ProtocolHandler {
    pub fn new(backend: Backend, config: ServerConfig) -> Self {
        let sessions = Arc::new(SessionManager::new(
            config.idle_timeout,
            config.max_session_age,
        ));
        Self {
            backend,
            sessions,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.backend.registry
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Lex, parse, and plan exactly one statement.
    pub fn compile(&self, pql: &str) -> ServerResult<QueryPlan> {
        let parsed = parse_str(pql);
        if !parsed.lex_errors.is_empty() {
            return Err(ServerError::from_lex_errors(&parsed.lex_errors));
        }
        if !parsed.parse_errors.is_empty() {
            return Err(ServerError::from_parse_errors(&parsed.parse_errors));
        }
        match parsed.statements.as_slice() {
            [statement] => Ok(Planner::new(&self.backend.registry).plan(statement)?),
            [] => Err(ServerError::Parse("expected a statement".to_string())),
            many => Err(ServerError::Parse(format!(
                "expected exactly one statement per request, found {}",
                many.len()
            ))),
        }
    }

    /// Completion candidates at byte offset `cursor`.
    pub fn complete(&self, pql: &str, cursor: usize) -> Vec<Suggestion> {
        pql::Completer::new(&self.backend.registry).complete(pql, cursor)
    }

    /// Open a connection on a new session, or resume `resume`.
    ///
    /// Announces the session with an unsolicited `session` frame.
    pub async fn connect(
        &self,
        resume: Option<&str>,
        requested: AccessMode,
        outbound: Outbound,
    ) -> ServerResult<Connection> {
        let session = match resume {
            Some(id) => {
                self.sessions
                    .update(id, |s| {
                        s.touch();
                        s.clone()
                    })
                    .await?
            }
            None => {
                self.sessions
                    .create(self.config.effective_mode(requested))
                    .await
            }
        };

        outbound
            .send(ServerEnvelope::session(&session.id, session.mode))
            .await;

        Ok(Connection {
            handler: self.clone(),
            session_id: session.id,
            mode: session.mode,
            outbound,
            inflight: None,
        })
    }
}

/// Sending half of a connection's bounded frame queue.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<ServerEnvelope>,
    send_timeout: Duration,
    stalled: Arc<Notify>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<ServerEnvelope>, send_timeout: Duration) -> Self {
        Self {
            tx,
            send_timeout,
            stalled: Arc::new(Notify::new()),
        }
    }

    /// Queue a frame, waiting up to the send timeout for space.
    ///
    /// Returns `false` if the frame was not queued; the connection is then
    /// signalled to close.
    pub async fn send(&self, envelope: ServerEnvelope) -> bool {
        match tokio::time::timeout(self.send_timeout, self.tx.send(envelope)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                tracing::debug!("outbound channel closed");
                self.stalled.notify_one();
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "client is not reading frames; closing connection"
                );
                self.stalled.notify_one();
                false
            }
        }
    }
}

/// What happens to a statement in flight when the client goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDisconnect {
    /// Trip the cancel token (WebSocket close).
    Cancel,
    /// Let it finish and flush its frames (stdin EOF).
    Drain,
}

/// Where a request stands relative to its terminal frame.
#[derive(Debug, Default)]
struct Progress {
    /// The terminal frame has been chosen; a later cancel cannot change it.
    finishing: AtomicBool,
    /// The terminal frame is queued.
    settled: AtomicBool,
}

struct InFlight {
    id: RequestId,
    cancel: CancelToken,
    cancelled: Arc<Notify>,
    progress: Arc<Progress>,
    task: JoinHandle<()>,
}

impl InFlight {
    fn is_running(&self) -> bool {
        !self.progress.settled.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    fn is_finishing(&self) -> bool {
        self.progress.finishing.load(Ordering::SeqCst)
    }

    /// Trip the cancel token. `false` if the terminal frame was already chosen.
    fn cancel(&self) -> bool {
        self.cancel.cancel();
        self.cancelled.notify_one();
        !self.is_finishing()
    }
}

/// Sends the frames of one request and records when its terminal frame
/// goes out.
struct Responder {
    outbound: Outbound,
    id: RequestId,
    cancel: CancelToken,
    progress: Arc<Progress>,
}

impl Responder {
    async fn send(&self, frame: ServerFrame) -> bool {
        if !frame.is_terminal() {
            return self
                .outbound
                .send(ServerEnvelope::new(self.id.clone(), frame))
                .await;
        }

        // Publish `finishing` before reading the token; `InFlight::cancel`
        // does the reverse, so one side always sees the other.
        self.progress.finishing.store(true, Ordering::SeqCst);
        let frame = match frame {
            ServerFrame::Done { .. } if self.cancel.is_cancelled() => {
                ServerError::Cancelled.to_frame(self.id.clone()).frame
            }
            other => other,
        };

        let sent = self
            .outbound
            .send(ServerEnvelope::new(self.id.clone(), frame))
            .await;
        if sent {
            self.progress.settled.store(true, Ordering::SeqCst);
        }
        sent
    }

    async fn fail(&self, error: ServerError) -> bool {
        self.send(error.to_frame(self.id.clone()).frame).await
    }
}

/// One client connection bound to one session.
pub struct Connection {
    handler: ProtocolHandler,
    session_id: String,
    mode: AccessMode,
    outbound: Outbound,
    inflight: Option<InFlight>,
}

impl Connection {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// `true` while a statement started on this connection is executing.
    pub fn is_executing(&self) -> bool {
        self.inflight.as_ref().is_some_and(InFlight::is_running)
    }

    /// Read messages until the client disconnects, the outbound queue
    /// stalls, or the session expires.
    pub async fn run<S>(mut self, mut inbound: S, on_disconnect: OnDisconnect)
    where
        S: Stream<Item = String> + Unpin,
    {
        let stalled = self.outbound.stalled.clone();
        loop {
            tokio::select! {
                _ = stalled.notified() => {
                    tracing::warn!(session = %self.session_id, "closing stalled connection");
                    self.shutdown(OnDisconnect::Cancel).await;
                    return;
                }
                next = inbound.next() => match next {
                    Some(text) => {
                        if text.trim().is_empty() {
                            continue;
                        }
                        if let Err(e) = self.handle_text(&text).await {
                            tracing::info!(session = %self.session_id, "closing connection: {e}");
                            self.shutdown(OnDisconnect::Cancel).await;
                            return;
                        }
                    }
                    None => {
                        tracing::debug!(session = %self.session_id, "client disconnected");
                        break;
                    }
                }
            }
        }
        self.shutdown(on_disconnect).await;
    }

    /// Handle one inbound text frame.
    ///
    /// Protocol faults are answered with an `error` frame and leave the
    /// connection usable. `Err` means the connection must close.
    pub async fn handle_text(&mut self, text: &str) -> ServerResult<()> {
        let (id, parsed) = framing::parse_message(text);
        let message = match parsed {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session = %self.session_id, "rejected frame: {e}");
                self.reply(e.to_frame(id)).await;
                return Ok(());
            }
        };

        tracing::debug!(session = %self.session_id, id = %id, kind = message.kind(), "request");

        if let Err(e) = self.handler.sessions.touch(&self.session_id).await {
            self.reply(e.to_frame(id)).await;
            return Err(e);
        }

        match message {
            ClientMessage::Ping {} => self.reply(ServerEnvelope::pong(id)).await,
            ClientMessage::Autocomplete { pql, cursor } => {
                let items = self.handler.complete(&pql, cursor.unwrap_or(pql.len()));
                self.reply(ServerEnvelope::new(id, ServerFrame::Completions { items }))
                    .await;
            }
            ClientMessage::Cancel {} => self.cancel(),
            ClientMessage::Execute { pql } => self.execute(id, pql).await,
        }
        Ok(())
    }

    async fn reply(&self, envelope: ServerEnvelope) {
        self.outbound.send(envelope).await;
    }

    fn cancel(&self) {
        match &self.inflight {
            Some(inflight) if inflight.is_running() => {
                if inflight.cancel() {
                    tracing::info!(session = %self.session_id, request = %inflight.id, "cancelling statement");
                } else {
                    tracing::debug!(
                        session = %self.session_id,
                        request = %inflight.id,
                        "cancel arrived after the statement completed"
                    );
                }
            }
            _ => tracing::debug!(session = %self.session_id, "cancel with nothing in flight"),
        }
    }

    /// Drop a statement that has finished or is sending its last frame,
    /// waiting for the latter. `true` while one is still running.
    async fn reap(&mut self) -> bool {
        let Some(inflight) = self.inflight.take() else {
            return false;
        };
        if !inflight.is_finishing() && !inflight.task.is_finished() {
            self.inflight = Some(inflight);
            return true;
        }
        self.join(inflight).await;
        false
    }

    async fn join(&self, inflight: InFlight) {
        if let Err(e) = inflight.task.await {
            tracing::error!(session = %self.session_id, "execution task panicked: {e}");
            let _ = self
                .handler
                .sessions
                .update(&self.session_id, Session::end_execution)
                .await;
        }
    }

    async fn busy(&self, id: RequestId) {
        tracing::warn!(session = %self.session_id, id = %id, "execute while busy");
        self.reply(ServerError::Busy.to_frame(id)).await;
    }

    async fn execute(&mut self, id: RequestId, pql: String) {
        if self.reap().await {
            self.busy(id).await;
            return;
        }

        // another connection may hold the session
        match self
            .handler
            .sessions
            .update(&self.session_id, |s| s.is_executing())
            .await
        {
            Ok(false) => {}
            Ok(true) => {
                self.busy(id).await;
                return;
            }
            Err(e) => {
                self.reply(e.to_frame(id)).await;
                return;
            }
        }

        let plan = match self.handler.compile(&pql) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::debug!(session = %self.session_id, code = e.code(), "statement rejected: {e}");
                self.reply(e.to_frame(id)).await;
                return;
            }
        };

        if plan.is_mutation() && !self.mode.allows_mutation() {
            self.reply(ServerError::ReadOnly(plan.kind().to_string()).to_frame(id))
                .await;
            return;
        }

        if let QueryPlan::Meta(command) = &plan {
            self.run_meta(id, command).await;
            return;
        }

        let default_batch = self.handler.config.batch_size;
        let claimed = self
            .handler
            .sessions
            .update(&self.session_id, |s| {
                if !s.begin_execution() {
                    return None;
                }
                s.record(pql.as_str());
                Some(meta::batch_size(s, default_batch))
            })
            .await;
        let batch = match claimed {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                self.busy(id).await;
                return;
            }
            Err(e) => {
                self.reply(e.to_frame(id)).await;
                return;
            }
        };

        let cancel = CancelToken::new();
        let cancelled = Arc::new(Notify::new());
        let progress = Arc::new(Progress::default());
        let responder = Responder {
            outbound: self.outbound.clone(),
            id: id.clone(),
            cancel: cancel.clone(),
            progress: progress.clone(),
        };
        let task = tokio::spawn(run_plan(
            self.handler.clone(),
            self.session_id.clone(),
            responder,
            plan,
            batch,
            cancelled.clone(),
        ));

        self.inflight = Some(InFlight {
            id,
            cancel,
            cancelled,
            progress,
            task,
        });
    }

    async fn run_meta(&mut self, id: RequestId, command: &MetaCommand) {
        let started = Instant::now();
        let registry = self.handler.backend.registry.clone();
        let default_batch = self.handler.config.batch_size;
        let result = self
            .handler
            .sessions
            .update(&self.session_id, |s| {
                meta::run(command, &registry, s).map(|out| (out, meta::batch_size(s, default_batch)))
            })
            .await
            .and_then(|r| r);

        match result {
            Ok((out, batch)) => {
                let reply = Reply {
                    entity: out.entity,
                    fields: Some(out.fields),
                    total: out.rows.len() as u64,
                    rows: out.rows,
                };
                let responder = Responder {
                    outbound: self.outbound.clone(),
                    id,
                    cancel: CancelToken::new(),
                    progress: Arc::default(),
                };
                stream_reply(&responder, reply, batch, started).await;
            }
            Err(e) => self.reply(e.to_frame(id)).await,
        }
    }

    async fn shutdown(&mut self, on_disconnect: OnDisconnect) {
        if let Some(inflight) = self.inflight.take() {
            if on_disconnect == OnDisconnect::Cancel && inflight.is_running() {
                inflight.cancel();
            }
            self.join(inflight).await;
        }
        tracing::debug!(session = %self.session_id, "connection closed");
    }
}

/// A result ready to stream as `meta`, `rows`..., `done`.
struct Reply {
    entity: String,
    fields: Option<Vec<String>>,
    total: u64,
    rows: Vec<Row>,
}

impl Reply {
    fn from_output(output: ExecOutput, plan_fields: Option<Vec<String>>) -> Self {
        let entity = output.entity().to_string();
        let total = output.total();
        let fields = match &output {
            ExecOutput::Count { .. } => None,
            ExecOutput::Deleted { .. } => Some(vec!["id".to_string(), "deleted".to_string()]),
            _ => plan_fields,
        };
        Self {
            entity,
            fields,
            total,
            rows: output.into_rows(),
        }
    }
}

/// Execute a data plan, stream its frames, then release the session.
/// Runs as its own task.
async fn run_plan(
    handler: ProtocolHandler,
    session_id: String,
    responder: Responder,
    plan: QueryPlan,
    batch: usize,
    cancelled: Arc<Notify>,
) {
    let started = Instant::now();
    let timeout = handler.config.execution_timeout;
    let dispatch = handler.backend.dispatch.clone();
    let plan_fields = plan.fields().map(<[String]>::to_vec);
    let kind = plan.kind();
    let id = responder.id.clone();
    let cancel = responder.cancel.clone();

    let token = cancel.clone();
    let work = tokio::task::spawn_blocking(move || Executor::new(&dispatch).execute(&plan, &token));

    let result = tokio::select! {
        _ = cancelled.notified() => Err(ServerError::Cancelled),
        joined = tokio::time::timeout(timeout, work) => match joined {
            Err(_) => {
                cancel.cancel();
                Err(ServerError::Timeout(timeout))
            }
            Ok(Err(e)) => Err(ServerError::Internal(format!("execution task failed: {e}"))),
            Ok(Ok(result)) => result.map_err(ServerError::from),
        },
    };
    let result = match result {
        Ok(_) if cancel.is_cancelled() => Err(ServerError::Cancelled),
        other => other,
    };

    match result {
        Ok(output) => {
            let reply = Reply::from_output(output, plan_fields);
            tracing::debug!(
                request = %id,
                plan = kind,
                total = reply.total,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "statement executed"
            );
            stream_reply(&responder, reply, batch, started).await;
        }
        Err(e) => {
            match &e {
                ServerError::Internal(_) => tracing::error!(request = %id, "{e}"),
                ServerError::Timeout(_) => tracing::warn!(request = %id, "{e}"),
                _ => tracing::debug!(request = %id, code = e.code(), "{e}"),
            }
            responder.fail(e).await;
        }
    }

    if let Err(e) = handler
        .sessions
        .update(&session_id, Session::end_execution)
        .await
    {
        tracing::debug!(session = %session_id, "session ended before its statement: {e}");
    }
}

/// Stream `meta`, then row batches, then `done`. A cancellation between
/// batches replaces the rest with a `cancelled` error.
async fn stream_reply(responder: &Responder, reply: Reply, batch: usize, started: Instant) -> bool {
    let meta = ServerFrame::Meta {
        entity: reply.entity,
        fields: reply.fields,
        total: Some(reply.total),
    };
    if !responder.send(meta).await {
        responder.cancel.cancel();
        return false;
    }

    for chunk in reply.rows.chunks(batch.max(1)) {
        if responder.cancel.is_cancelled() {
            return responder.fail(ServerError::Cancelled).await;
        }
        let frame = ServerFrame::Rows {
            rows: chunk.to_vec(),
        };
        if !responder.send(frame).await {
            responder.cancel.cancel();
            return false;
        }
    }

    responder
        .send(ServerFrame::Done {
            total: reply.total,
            elapsed: started.elapsed().as_millis() as u64,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> ProtocolHandler {
        ProtocolHandler::new(Backend::sample().unwrap(), ServerConfig::default())
    }

    #[test]
    fn test_compile_single_statement() {
        let plan = handler().compile("find lease where status = \"active\"").unwrap();
        assert_eq!(plan.kind(), "find");
    }

    #[test]
    fn test_compile_error_codes() {
        let h = handler();
        assert_eq!(h.compile("find lease where status = $").unwrap_err().code(), "lex_error");
        assert_eq!(h.compile("find lease where").unwrap_err().code(), "parse_error");
        assert_eq!(h.compile("find leese").unwrap_err().code(), "plan_error");
        assert_eq!(h.compile("").unwrap_err().code(), "parse_error");
        let err = h.compile("count lease count tenant").unwrap_err();
        assert!(err.to_string().contains("exactly one statement"));
    }

    #[test]
    fn test_reply_shapes() {
        let reply = Reply::from_output(
            ExecOutput::Count {
                entity: "lease".into(),
                count: 4,
            },
            None,
        );
        assert_eq!(reply.total, 4);
        assert!(reply.rows.is_empty());
        assert!(reply.fields.is_none());

        let reply = Reply::from_output(
            ExecOutput::Deleted {
                entity: "lease".into(),
                id: serde_json::json!("x"),
            },
            Some(vec!["status".into()]),
        );
        assert_eq!(reply.rows.len(), 1);
        assert_eq!(reply.fields.as_deref().map(<[String]>::len), Some(2));
    }

    fn responder(tx: mpsc::Sender<ServerEnvelope>, timeout: Duration) -> Responder {
        Responder {
            outbound: Outbound::new(tx, timeout),
            id: RequestId::Number(9),
            cancel: CancelToken::new(),
            progress: Arc::default(),
        }
    }

    fn done() -> ServerFrame {
        ServerFrame::Done { total: 1, elapsed: 0 }
    }

    #[tokio::test]
    async fn test_settles_only_after_terminal_frame_is_queued() {
        let (tx, mut rx) = mpsc::channel(4);
        let r = responder(tx, Duration::from_secs(1));

        assert!(r.send(ServerFrame::Rows { rows: Vec::new() }).await);
        assert!(!r.progress.finishing.load(Ordering::SeqCst));
        assert!(!r.progress.settled.load(Ordering::SeqCst));

        assert!(r.send(done()).await);
        assert!(r.progress.settled.load(Ordering::SeqCst));
        rx.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().frame, done());
    }

    #[tokio::test]
    async fn test_cancel_before_done_wins() {
        let (tx, mut rx) = mpsc::channel(4);
        let r = responder(tx, Duration::from_secs(1));
        r.cancel.cancel();

        assert!(r.send(done()).await);
        let env = rx.recv().await.unwrap();
        assert_eq!(env.id, RequestId::Number(9));
        assert!(matches!(env.frame, ServerFrame::Error { ref code, .. } if code == error_codes::CANCELLED));
    }

    #[tokio::test]
    async fn test_unsent_terminal_frame_is_not_settled() {
        let (tx, _rx) = mpsc::channel(1);
        let r = responder(tx, Duration::from_millis(20));
        assert!(r.send(ServerFrame::Rows { rows: Vec::new() }).await);

        assert!(!r.send(done()).await);
        assert!(r.progress.finishing.load(Ordering::SeqCst));
        assert!(!r.progress.settled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_outbound_stalls_when_full() {
        let (tx, _rx) = mpsc::channel(1);
        let out = Outbound::new(tx, Duration::from_millis(20));
        assert!(out.send(ServerEnvelope::pong(RequestId::Null)).await);
        assert!(!out.send(ServerEnvelope::pong(RequestId::Null)).await);
    }
}
