//! Conversation session manager.
//!
//! A [`ChatSession`] owns one transcript, the selected context, the input
//! draft and the context catalog. Sending is single-flight: while a request
//! is pending every further send is rejected without touching the
//! transcript, so replies can never arrive out of order.
//!
//! State sits behind a synchronous mutex that is only held between awaits,
//! which lets a session be shared as `Arc<ChatSession>` between a UI loop and
//! background tasks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::directory::ContextDirectory;
use crate::error::{GatewayError, UploadError};
use crate::gateway::{CompletionRequest, InferenceGateway};
use crate::message::{Message, Transcript};
use crate::upload::{UploadClient, UploadRequest};

/// Assistant turn recorded when the gateway call fails for any reason.
pub const FALLBACK_REPLY: &str = "Sorry, there was an error processing your request.";

/// Why a send was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyMessage,
    NoContext,
    Pending,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EmptyMessage => "message is empty",
            Self::NoContext => "no context selected",
            Self::Pending => "a request is already in flight",
        })
    }
}

/// Result of [`ChatSession::send_message`].
///
/// Precondition failures are reported here rather than as errors; the
/// transcript is untouched in that case.
#[derive(Debug)]
pub enum SendOutcome {
    /// The gateway answered and its reply was appended.
    Answered,
    /// The gateway failed; [`FALLBACK_REPLY`] was appended.
    Failed(GatewayError),
    /// Nothing happened.
    Rejected(RejectReason),
}

impl SendOutcome {
    /// Whether the transcript grew (user turn plus one assistant turn).
    pub fn was_sent(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

#[derive(Debug, Default)]
struct SessionState {
    transcript: Transcript,
    selected_context: Option<String>,
    pending: bool,
    draft: String,
    contexts: Vec<String>,
    contexts_loaded: bool,
    loads_in_flight: usize,
}

/// Point-in-time copy of the session, for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub started_at: DateTime<Utc>,
    pub transcript: Transcript,
    pub selected_context: Option<String>,
    pub pending: bool,
    pub draft: String,
    pub contexts: Vec<String>,
    pub loading_contexts: bool,
}

/// One conversation with the inference backend.
pub struct ChatSession {
    gateway: Arc<dyn InferenceGateway>,
    directory: Arc<dyn ContextDirectory>,
    started_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl ChatSession {
    pub fn new(gateway: Arc<dyn InferenceGateway>, directory: Arc<dyn ContextDirectory>) -> Self {
        Self {
            gateway,
            directory,
            started_at: Utc::now(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Start with a context already selected.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        self.select_context(context);
        self
    }

    // Every mutation is a single push or assignment, so a poisoned lock
    // still guards consistent state.
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Context selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the selected context. A blank id clears the selection.
    ///
    /// Ids are not checked against the catalog; an unknown id surfaces as a
    /// backend error on the next send.
    pub fn select_context(&self, context: impl Into<String>) {
        let context = context.into();
        let mut state = self.state();
        state.selected_context = if context.trim().is_empty() {
            None
        } else {
            Some(context)
        };
        tracing::debug!(context = ?state.selected_context, "Context selected");
    }

    pub fn selected_context(&self) -> Option<String> {
        self.state().selected_context.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Draft
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_draft(&self, text: impl Into<String>) {
        self.state().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    /// Send whatever is in the draft.
    pub async fn submit(&self) -> SendOutcome {
        let text = self.draft();
        self.send_message(&text).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    /// Send one message and record the reply.
    ///
    /// The transcript grows by exactly two entries unless the call is
    /// rejected. Gateway failures never escape: they are logged and recorded
    /// as [`FALLBACK_REPLY`].
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let request = {
            let mut state = self.state();

            if state.pending {
                return SendOutcome::Rejected(RejectReason::Pending);
            }
            let Some(context) = state.selected_context.clone() else {
                return SendOutcome::Rejected(RejectReason::NoContext);
            };
            if text.trim().is_empty() {
                return SendOutcome::Rejected(RejectReason::EmptyMessage);
            }

            state.transcript.push(Message::user(text));
            state.pending = true;
            CompletionRequest::new(context, text)
        };

        tracing::info!(context = %request.context, chars = text.len(), "Sending message");
        let result = self.gateway.complete(&request).await;

        let mut state = self.state();
        let outcome = match result {
            Ok(reply) => {
                state.transcript.push(Message::assistant(reply));
                SendOutcome::Answered
            }
            Err(e) => {
                tracing::warn!(error = %e, context = %request.context, "Gateway request failed");
                state.transcript.push(Message::assistant(FALLBACK_REPLY));
                SendOutcome::Failed(e)
            }
        };
        state.pending = false;
        state.draft.clear();
        outcome
    }

    pub fn is_pending(&self) -> bool {
        self.state().pending
    }

    pub fn transcript(&self) -> Transcript {
        self.state().transcript.clone()
    }

    pub fn transcript_len(&self) -> usize {
        self.state().transcript.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Context catalog
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch the selectable contexts once.
    ///
    /// On failure the catalog becomes empty. The loading flag clears once
    /// every overlapping load has finished, and nothing is retried.
    pub async fn load_contexts(&self) -> Vec<String> {
        self.state().loads_in_flight += 1;

        let contexts = match self.directory.list_contexts().await {
            Ok(contexts) => {
                tracing::debug!(count = contexts.len(), "Loaded contexts");
                contexts
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load contexts");
                Vec::new()
            }
        };

        let mut state = self.state();
        state.contexts = contexts.clone();
        state.contexts_loaded = true;
        state.loads_in_flight = state.loads_in_flight.saturating_sub(1);
        contexts
    }

    /// Reload the catalog, e.g. after an upload created a new context.
    pub async fn refresh_contexts(&self) -> Vec<String> {
        self.load_contexts().await
    }

    /// Load the catalog unless a load was already attempted.
    ///
    /// A failed load leaves an empty catalog here; only
    /// [`refresh_contexts`](Self::refresh_contexts) fetches again.
    pub async fn ensure_contexts(&self) -> Vec<String> {
        {
            let state = self.state();
            if state.contexts_loaded {
                return state.contexts.clone();
            }
        }
        self.load_contexts().await
    }

    pub fn contexts(&self) -> Vec<String> {
        self.state().contexts.clone()
    }

    pub fn is_loading_contexts(&self) -> bool {
        self.state().loads_in_flight > 0
    }

    /// Upload documents, then refresh the catalog when the backend accepted them.
    pub async fn upload_and_refresh(
        &self,
        client: &UploadClient,
        request: UploadRequest,
    ) -> Result<serde_json::Value, UploadError> {
        let response = client.upload(request).await?;
        self.refresh_contexts().await;
        Ok(response)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            started_at: self.started_at,
            transcript: state.transcript.clone(),
            selected_context: state.selected_context.clone(),
            pending: state.pending,
            draft: state.draft.clone(),
            contexts: state.contexts.clone(),
            loading_contexts: state.loads_in_flight > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticContextDirectory;
    use crate::error::DirectoryError;
    use crate::message::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};

    /// Gateway that replays a scripted list of results and records requests.
    #[derive(Default)]
    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<String, GatewayError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<Result<String, GatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceGateway for ScriptedGateway {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::MalformedBody("script exhausted".into())))
        }
    }

    /// Gateway that blocks until released, to observe the pending window.
    struct SlowGateway {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl InferenceGateway for SlowGateway {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, GatewayError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("slow reply".into())
        }
    }

    struct FailingDirectory;

    #[async_trait]
    impl ContextDirectory for FailingDirectory {
        async fn list_contexts(&self) -> Result<Vec<String>, DirectoryError> {
            Err(DirectoryError::Malformed("missing field `contexts`".into()))
        }
    }

    /// Directory that counts fetches and holds each one until a permit is added.
    struct GatedDirectory {
        calls: AtomicUsize,
        gate: Semaphore,
        fail: bool,
    }

    impl GatedDirectory {
        fn open(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(Semaphore::MAX_PERMITS),
                fail,
            })
        }

        fn closed() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                fail: false,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContextDirectory for GatedDirectory {
        async fn list_contexts(&self) -> Result<Vec<String>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            if self.fail {
                Err(DirectoryError::Status(500))
            } else {
                Ok(vec!["Physics".into()])
            }
        }
    }

    fn session_with(gateway: Arc<dyn InferenceGateway>) -> ChatSession {
        ChatSession::new(
            gateway,
            Arc::new(StaticContextDirectory::new(["AI Research", "Robotics"])),
        )
    }

    #[tokio::test]
    async fn test_send_success_appends_user_and_assistant() {
        let gateway = ScriptedGateway::new(vec![Ok("hi there".into())]);
        let session = session_with(gateway.clone());

        session.select_context("AI Research");
        let outcome = session.send_message("hello").await;

        assert!(matches!(outcome, SendOutcome::Answered));
        assert_eq!(
            session.transcript().as_slice(),
            &[Message::user("hello"), Message::assistant("hi there")]
        );
        assert!(!session.is_pending());
        assert_eq!(
            gateway.requests(),
            vec![CompletionRequest::new("AI Research", "hello")]
        );
    }

    #[tokio::test]
    async fn test_send_failure_appends_fallback() {
        let gateway = ScriptedGateway::new(vec![Err(GatewayError::Status {
            status: 500,
            body: "Internal Server Error".into(),
        })]);
        let session = session_with(gateway);

        session.select_context("AI Research");
        let outcome = session.send_message("hello").await;

        assert!(matches!(outcome, SendOutcome::Failed(ref e) if e.status() == Some(500)));
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.as_slice()[1], Message::assistant(FALLBACK_REPLY));
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn test_send_without_context_is_noop() {
        let gateway = ScriptedGateway::new(vec![]);
        let session = session_with(gateway.clone());

        for text in ["hello", "", "   "] {
            let outcome = session.send_message(text).await;
            assert!(matches!(outcome, SendOutcome::Rejected(RejectReason::NoContext)));
        }
        assert!(session.transcript().is_empty());
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_send_blank_text_is_noop() {
        let gateway = ScriptedGateway::new(vec![]);
        let session = session_with(gateway.clone()).with_context("Robotics");

        let outcome = session.send_message(" \t\n").await;
        assert!(matches!(outcome, SendOutcome::Rejected(RejectReason::EmptyMessage)));
        assert!(!outcome.was_sent());
        assert_eq!(session.transcript_len(), 0);
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_blank_context_clears_selection() {
        let session = session_with(ScriptedGateway::new(vec![]));
        session.select_context("Robotics");
        session.select_context("  ");
        assert!(session.selected_context().is_none());
    }

    #[tokio::test]
    async fn test_unknown_context_is_accepted() {
        let gateway = ScriptedGateway::new(vec![Err(GatewayError::Status {
            status: 404,
            body: "unknown context".into(),
        })]);
        let session = session_with(gateway);

        session.select_context("Not In Catalog");
        assert_eq!(session.selected_context().as_deref(), Some("Not In Catalog"));
        let outcome = session.send_message("hello").await;
        assert!(outcome.was_sent());
        assert_eq!(session.transcript().as_slice()[1].content(), FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_send_while_pending_is_noop() {
        let gateway = Arc::new(SlowGateway {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let session = Arc::new(session_with(gateway.clone()).with_context("AI Research"));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.send_message("first").await }
        });

        gateway.entered.notified().await;
        assert!(session.is_pending());

        let second = session.send_message("second").await;
        assert!(matches!(second, SendOutcome::Rejected(RejectReason::Pending)));
        assert_eq!(session.transcript_len(), 1);

        gateway.release.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, SendOutcome::Answered));

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.as_slice()[0], Message::user("first"));
        assert_eq!(transcript.as_slice()[1], Message::assistant("slow reply"));
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn test_transcript_order_follows_call_order() {
        let gateway = ScriptedGateway::new(vec![
            Ok("one".into()),
            Err(GatewayError::MalformedBody("bad".into())),
            Ok("three".into()),
        ]);
        let session = session_with(gateway).with_context("AI Research");

        for text in ["a", "b", "c"] {
            assert!(session.send_message(text).await.was_sent());
        }

        let pairs: Vec<(Role, String)> = session
            .transcript()
            .iter()
            .map(|m| (m.role(), m.content().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Role::User, "a".into()),
                (Role::Assistant, "one".into()),
                (Role::User, "b".into()),
                (Role::Assistant, FALLBACK_REPLY.into()),
                (Role::User, "c".into()),
                (Role::Assistant, "three".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_submit_sends_and_clears_draft() {
        let gateway = ScriptedGateway::new(vec![Ok("ok".into())]);
        let session = session_with(gateway).with_context("AI Research");

        session.set_draft("from the draft");
        assert!(matches!(session.submit().await, SendOutcome::Answered));
        assert_eq!(session.draft(), "");
        assert_eq!(session.transcript().as_slice()[0].content(), "from the draft");
    }

    #[tokio::test]
    async fn test_rejected_send_keeps_draft() {
        let session = session_with(ScriptedGateway::new(vec![]));
        session.set_draft("keep me");
        assert!(!session.submit().await.was_sent());
        assert_eq!(session.draft(), "keep me");
    }

    #[tokio::test]
    async fn test_load_contexts_success() {
        let session = session_with(ScriptedGateway::new(vec![]));
        assert!(!session.is_loading_contexts());

        let contexts = session.load_contexts().await;
        assert_eq!(contexts, vec!["AI Research", "Robotics"]);
        assert_eq!(session.contexts(), contexts);
        assert!(!session.is_loading_contexts());
    }

    #[tokio::test]
    async fn test_load_contexts_failure_degrades_to_empty() {
        let session = ChatSession::new(
            ScriptedGateway::new(vec![]),
            Arc::new(FailingDirectory),
        );

        let contexts = session.load_contexts().await;
        assert!(contexts.is_empty());
        assert!(session.contexts().is_empty());
        assert!(!session.is_loading_contexts());
    }

    #[tokio::test]
    async fn test_ensure_contexts_uses_cache() {
        let session = session_with(ScriptedGateway::new(vec![]));
        assert_eq!(session.ensure_contexts().await.len(), 2);
        assert_eq!(session.ensure_contexts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_retried_by_ensure() {
        let directory = GatedDirectory::open(true);
        let session = ChatSession::new(ScriptedGateway::new(vec![]), directory.clone());

        assert!(session.load_contexts().await.is_empty());
        assert!(session.ensure_contexts().await.is_empty());
        assert!(session.ensure_contexts().await.is_empty());
        assert_eq!(directory.calls(), 1);

        session.refresh_contexts().await;
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test]
    async fn test_ensure_loads_when_never_attempted() {
        let directory = GatedDirectory::open(false);
        let session = ChatSession::new(ScriptedGateway::new(vec![]), directory.clone());

        assert_eq!(session.ensure_contexts().await, vec!["Physics"]);
        assert_eq!(session.ensure_contexts().await, vec!["Physics"]);
        assert_eq!(directory.calls(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_loads_keep_loading_flag() {
        let directory = GatedDirectory::closed();
        let session = Arc::new(ChatSession::new(
            ScriptedGateway::new(vec![]),
            directory.clone(),
        ));

        let spawn_load = |session: Arc<ChatSession>| {
            tokio::spawn(async move { session.load_contexts().await })
        };
        let mut first = spawn_load(session.clone());
        let mut second = spawn_load(session.clone());

        while directory.calls() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(session.is_loading_contexts());

        directory.gate.add_permits(1);
        tokio::select! {
            _ = &mut first => {}
            _ = &mut second => {}
        }
        assert!(session.is_loading_contexts());
        assert!(session.snapshot().loading_contexts);

        directory.gate.add_permits(1);
        tokio::time::timeout(Duration::from_secs(1), async {
            while session.is_loading_contexts() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(session.contexts(), vec!["Physics"]);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_state() {
        let session = session_with(ScriptedGateway::new(vec![Ok("hey".into())]))
            .with_context("Robotics");
        session.send_message("yo").await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.selected_context.as_deref(), Some("Robotics"));
        assert_eq!(snapshot.transcript.len(), 2);
        assert!(!snapshot.pending);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["transcript"][1]["content"], "hey");
    }
}
