//! Chat session controller
//!
//! `ChatSession` owns the message list, the input buffer and the
//! [`SessionState`]. It is driven from a single UI task: user actions call
//! into it directly, and network replies and timers come back as
//! [`SessionEvent`]s that the UI loop hands to [`ChatSession::apply`].
//!
//! Background work runs on tokio tasks tied to the current session
//! generation. Showing the welcome screen cancels them all and bumps the
//! generation, so nothing scheduled before a reset can touch the new list.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ChatBackend, ChatRequest, ChatResponse};
use crate::error::Result;
use crate::render;
use crate::scroll::{ScrollTracker, NEAR_BOTTOM_THRESHOLD};
use crate::state::{Entry, Message, PendingFollowUp, RequestId, SessionState, View};

pub const DEFAULT_CHAT_ID: &str = "default";
pub const FOLLOW_UP_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub chat_id: String,
    pub follow_up_delay: Duration,
    pub near_bottom_threshold: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chat_id: DEFAULT_CHAT_ID.to_string(),
            follow_up_delay: FOLLOW_UP_DELAY,
            near_bottom_threshold: NEAR_BOTTOM_THRESHOLD,
        }
    }
}

/// What happened to a send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty or whitespace-only text; nothing rendered, nothing sent.
    Ignored,
    /// A request is still in flight; the input is left untouched.
    Busy,
    Sent(RequestId),
}

/// Completion of a background task, to be passed to [`ChatSession::apply`].
#[derive(Debug)]
pub struct SessionEvent {
    generation: u64,
    kind: EventKind,
}

#[derive(Debug)]
enum EventKind {
    Response {
        request: RequestId,
        query: String,
        result: Result<ChatResponse>,
    },
    FollowUpDue {
        content: String,
        follow_up_id: Option<String>,
        original_question: Option<String>,
    },
    /// A task that died without producing anything to show.
    Lost,
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    options: SessionOptions,
    state: SessionState,
    view: View,
    entries: Vec<Entry>,
    input: String,
    in_flight: Option<RequestId>,
    next_request: u64,
    generation: u64,
    outstanding: usize,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, options: SessionOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = SessionState::new(options.near_bottom_threshold);

        Self {
            backend,
            options,
            state,
            view: View::Welcome,
            entries: Vec::new(),
            input: String::new(),
            in_flight: None,
            next_request: 1,
            generation: 0,
            outstanding: 0,
            cancel: CancellationToken::new(),
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(Entry::as_message)
    }

    pub fn scroll(&self) -> &ScrollTracker {
        &self.state.scroll
    }

    pub fn scroll_mut(&mut self) -> &mut ScrollTracker {
        &mut self.state.scroll
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// True while a request is waiting for its reply.
    pub fn is_waiting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// True while any request or timer of this generation is still pending.
    pub fn has_pending_work(&self) -> bool {
        self.outstanding > 0
    }

    pub fn send_message(&mut self, text: &str) -> SendOutcome {
        let query = text.trim();
        if query.is_empty() {
            return SendOutcome::Ignored;
        }
        if let Some(request) = self.in_flight {
            debug!(%request, "send rejected, request still in flight");
            return SendOutcome::Busy;
        }

        self.view = View::Conversation;
        self.render_message(Message::user(query));

        let request_id = RequestId(self.next_request);
        self.next_request += 1;
        self.entries.push(Entry::Loading(request_id));
        self.state.scroll.request_bottom();

        // The pending follow-up is consumed here, whatever the outcome.
        let follow_up = self.state.follow_up.take();
        let request = ChatRequest {
            chat_id: self.options.chat_id.clone(),
            query: query.to_string(),
            follow_up_to: follow_up.as_ref().map(|f| f.id.clone()),
            original_question: follow_up.and_then(|f| f.original_question),
        };
        info!(
            request = %request_id,
            follow_up_to = ?request.follow_up_to,
            "dispatching chat request"
        );

        self.in_flight = Some(request_id);
        let backend = Arc::clone(&self.backend);
        let query = request.query.clone();
        self.spawn(
            async move {
                let result = backend.chat(&request).await;
                EventKind::Response {
                    request: request_id,
                    query: request.query,
                    result,
                }
            },
            move |err| EventKind::Response {
                request: request_id,
                query,
                result: Err(err.into()),
            },
        );

        SendOutcome::Sent(request_id)
    }

    /// Sends the input buffer, clearing it only when something was sent.
    pub fn submit_input(&mut self) -> SendOutcome {
        let text = self.input.clone();
        let outcome = self.send_message(&text);
        if matches!(outcome, SendOutcome::Sent(_)) {
            self.input.clear();
        }
        outcome
    }

    /// Preset question: fill the input and send it.
    pub fn ask_question(&mut self, question: &str) -> SendOutcome {
        self.set_input(question);
        self.submit_input()
    }

    /// Back to the welcome panel with a fresh state.
    pub fn show_welcome_screen(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        self.outstanding = 0;
        self.in_flight = None;
        self.entries.clear();
        self.state.reset();
        self.view = View::Welcome;
        info!(generation = self.generation, "session reset to welcome screen");
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }

    /// Applies a completed task. Returns false for events from before a reset.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        if event.generation != self.generation {
            debug!(
                event_generation = event.generation,
                generation = self.generation,
                "dropping stale session event"
            );
            return false;
        }
        self.outstanding = self.outstanding.saturating_sub(1);

        match event.kind {
            EventKind::Response {
                request,
                query,
                result,
            } => self.finish_request(request, query, result),
            EventKind::FollowUpDue {
                content,
                follow_up_id,
                original_question,
            } => {
                self.render_message(Message::follow_up(content, follow_up_id.clone()));
                // The newest follow-up replaces whatever was pending, even without an id.
                debug!(follow_up_id = ?follow_up_id, "follow-up shown");
                self.state.follow_up = follow_up_id.map(|id| PendingFollowUp {
                    id,
                    original_question,
                });
            }
            EventKind::Lost => {}
        }
        true
    }

    /// Applies events until no request or timer of this generation is left.
    pub async fn settle(&mut self) {
        while self.outstanding > 0 {
            match self.rx.recv().await {
                Some(event) => {
                    self.apply(event);
                }
                None => break,
            }
        }
    }

    pub fn render_html(&self) -> String {
        render::render_transcript(&self.entries).into_string()
    }

    fn render_message(&mut self, message: Message) {
        self.entries.push(Entry::Message(message));
        self.state.scroll.request_bottom();
    }

    fn remove_placeholder(&mut self, request: RequestId) {
        self.entries
            .retain(|entry| !matches!(entry, Entry::Loading(id) if *id == request));
    }

    fn finish_request(&mut self, request: RequestId, query: String, result: Result<ChatResponse>) {
        self.remove_placeholder(request);
        if self.in_flight == Some(request) {
            self.in_flight = None;
        }

        match result {
            Ok(ChatResponse {
                answer,
                sources,
                follow_up,
                follow_up_id,
                original_question,
            }) => {
                self.render_message(Message::assistant(answer, sources));

                // Empty strings count as absent
                let follow_up = follow_up.filter(|s| !s.is_empty());
                let follow_up_id = follow_up_id.filter(|s| !s.is_empty());

                if let Some(content) = follow_up {
                    let delay = self.options.follow_up_delay;
                    let original_question = original_question.or(Some(query));
                    debug!(?delay, follow_up_id = ?follow_up_id, "scheduling follow-up");
                    self.spawn(
                        async move {
                            tokio::time::sleep(delay).await;
                            EventKind::FollowUpDue {
                                content,
                                follow_up_id,
                                original_question,
                            }
                        },
                        |_| EventKind::Lost,
                    );
                }
            }
            Err(err) => {
                warn!(%request, error = %err, "chat request failed");
                self.entries.push(Entry::Error);
                self.state.scroll.request_bottom();
            }
        }
    }

    /// Runs `work` on its own task. Every task reports back exactly once
    /// unless cancelled; a panic is turned into an event by `recover`.
    fn spawn<F, R>(&mut self, work: F, recover: R)
    where
        F: Future<Output = EventKind> + Send + 'static,
        R: FnOnce(JoinError) -> EventKind + Send + 'static,
    {
        let token = self.cancel.clone();
        let tx = self.tx.clone();
        let generation = self.generation;
        self.outstanding += 1;

        tokio::spawn(async move {
            let mut task = tokio::spawn(work);
            let kind = tokio::select! {
                _ = token.cancelled() => {
                    task.abort();
                    return;
                }
                joined = &mut task => match joined {
                    Ok(kind) => kind,
                    Err(err) => {
                        warn!(error = %err, "session task failed");
                        recover(err)
                    }
                },
            };
            let _ = tx.send(SessionEvent { generation, kind });
        });
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::state::ChatRole;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a fixed script and records every request.
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<ChatResponse>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn with(replies: Vec<Result<ChatResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(answer("default reply")))
        }
    }

    fn answer(text: &str) -> ChatResponse {
        ChatResponse {
            answer: text.to_string(),
            ..Default::default()
        }
    }

    fn with_follow_up(text: &str, question: &str, id: &str) -> ChatResponse {
        ChatResponse {
            answer: text.to_string(),
            follow_up: Some(question.to_string()),
            follow_up_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    fn session(backend: Arc<ScriptedBackend>) -> ChatSession {
        ChatSession::new(backend, SessionOptions::default())
    }

    fn loading_count(session: &ChatSession) -> usize {
        session
            .entries()
            .iter()
            .filter(|e| matches!(e, Entry::Loading(_)))
            .count()
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let backend = ScriptedBackend::with(vec![]);
        let mut session = session(backend.clone());

        assert_eq!(session.send_message(""), SendOutcome::Ignored);
        assert_eq!(session.send_message("   \n\t"), SendOutcome::Ignored);

        assert!(session.entries().is_empty());
        assert_eq!(session.view(), View::Welcome);
        assert!(!session.has_pending_work());
        tokio::task::yield_now().await;
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_send_renders_user_then_assistant() {
        let backend = ScriptedBackend::with(vec![Ok(answer("Hi there"))]);
        let mut session = session(backend.clone());

        assert!(matches!(session.send_message("  Hello "), SendOutcome::Sent(_)));
        assert_eq!(session.view(), View::Conversation);
        assert_eq!(loading_count(&session), 1);

        session.settle().await;

        let messages: Vec<_> = session.messages().cloned().collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::user("Hello"));
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[1].content, "Hi there");
        assert_eq!(loading_count(&session), 0);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].chat_id, DEFAULT_CHAT_ID);
        assert_eq!(requests[0].query, "Hello");
        assert_eq!(requests[0].follow_up_to, None);
    }

    #[tokio::test]
    async fn test_failure_renders_single_error() {
        let backend = ScriptedBackend::with(vec![Err(ChatError::Status {
            status: 500,
            detail: None,
        })]);
        let mut session = session(backend);

        session.send_message("Hello");
        session.settle().await;

        assert_eq!(loading_count(&session), 0);
        let errors = session
            .entries()
            .iter()
            .filter(|e| matches!(e, Entry::Error))
            .count();
        assert_eq!(errors, 1);
        assert_eq!(session.messages().count(), 1);
        assert!(!session.is_waiting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_appears_after_delay() {
        let backend = ScriptedBackend::with(vec![Ok(with_follow_up(
            "Tuition is listed online.",
            "Did that help?",
            "f1",
        ))]);
        let mut session = session(backend);

        session.send_message("What are the tuition fees?");
        let event = session.next_event().await.unwrap();
        assert!(session.apply(event));
        assert_eq!(session.messages().count(), 2);
        assert!(session.has_pending_work());

        tokio::time::advance(Duration::from_millis(999)).await;
        tokio::task::yield_now().await;
        assert!(session.try_next_event().is_none());

        session.settle().await;
        let follow_up = session.messages().last().unwrap();
        assert!(follow_up.is_follow_up);
        assert_eq!(follow_up.content, "Did that help?");
        assert_eq!(follow_up.follow_up_id.as_deref(), Some("f1"));
        assert_eq!(session.state().current_follow_up_id(), Some("f1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_id_is_sent_exactly_once() {
        let backend = ScriptedBackend::with(vec![
            Ok(with_follow_up("Answer", "Did that help?", "f1")),
            Ok(answer("Glad to help")),
            Ok(answer("Anything else")),
        ]);
        let mut session = session(backend.clone());

        session.send_message("First");
        session.settle().await;

        session.send_message("yes");
        assert_eq!(session.state().current_follow_up_id(), None);
        session.settle().await;

        session.send_message("Third");
        session.settle().await;

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].follow_up_to, None);
        assert_eq!(requests[1].follow_up_to.as_deref(), Some("f1"));
        assert_eq!(requests[1].original_question.as_deref(), Some("First"));
        assert_eq!(requests[2].follow_up_to, None);
        assert_eq!(requests[2].original_question, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_original_question_is_preferred() {
        let mut reply = with_follow_up("Answer", "Undergraduate or graduate?", "f9");
        reply.original_question = Some("how do i apply".into());
        let backend = ScriptedBackend::with(vec![Ok(reply), Ok(answer("ok"))]);
        let mut session = session(backend.clone());

        session.send_message("How do I apply for admission?");
        session.settle().await;
        session.send_message("graduate");
        session.settle().await;

        let requests = backend.requests();
        assert_eq!(requests[1].original_question.as_deref(), Some("how do i apply"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_without_id_leaves_nothing_pending() {
        let reply = ChatResponse {
            answer: "Answer".into(),
            follow_up: Some("Anything else?".into()),
            ..Default::default()
        };
        let backend = ScriptedBackend::with(vec![Ok(reply)]);
        let mut session = session(backend);

        session.send_message("Hi");
        session.settle().await;

        assert!(session.messages().last().unwrap().is_follow_up);
        assert_eq!(session.state().current_follow_up_id(), None);
    }

    #[tokio::test]
    async fn test_busy_while_request_in_flight() {
        let backend = ScriptedBackend::with(vec![Ok(answer("one")), Ok(answer("two"))]);
        let mut session = session(backend.clone());

        assert!(matches!(session.send_message("one"), SendOutcome::Sent(_)));
        session.set_input("two");
        assert_eq!(session.submit_input(), SendOutcome::Busy);
        assert_eq!(session.input(), "two");

        session.settle().await;
        assert!(matches!(session.submit_input(), SendOutcome::Sent(_)));
        assert_eq!(session.input(), "");
        session.settle().await;

        assert_eq!(backend.requests().len(), 2);
        assert_eq!(session.messages().count(), 4);
    }

    #[tokio::test]
    async fn test_ask_question_sends_preset() {
        let backend = ScriptedBackend::with(vec![Ok(answer("Apply online"))]);
        let mut session = session(backend.clone());

        let outcome = session.ask_question("How do I apply for admission?");
        assert!(matches!(outcome, SendOutcome::Sent(_)));
        assert_eq!(session.input(), "");
        session.settle().await;

        assert_eq!(backend.requests()[0].query, "How do I apply for admission?");
    }

    #[tokio::test(start_paused = true)]
    async fn test_welcome_reset_cancels_pending_follow_up() {
        let backend = ScriptedBackend::with(vec![
            Ok(with_follow_up("Answer", "Did that help?", "f1")),
            Ok(answer("fresh")),
        ]);
        let mut session = session(backend.clone());

        session.send_message("First");
        let event = session.next_event().await.unwrap();
        session.apply(event);
        assert!(session.has_pending_work());

        session.show_welcome_screen();
        assert!(session.entries().is_empty());
        assert_eq!(session.view(), View::Welcome);
        assert_eq!(session.state().current_follow_up_id(), None);
        assert!(!session.has_pending_work());

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(session.try_next_event().is_none());
        assert!(session.entries().is_empty());

        session.send_message("Second");
        session.settle().await;
        assert_eq!(backend.requests()[1].follow_up_to, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_welcome_reset_clears_pending_id() {
        let backend = ScriptedBackend::with(vec![
            Ok(with_follow_up("Answer", "Did that help?", "f1")),
            Ok(answer("fresh")),
        ]);
        let mut session = session(backend.clone());

        session.send_message("First");
        session.settle().await;
        assert_eq!(session.state().current_follow_up_id(), Some("f1"));

        session.show_welcome_screen();
        assert_eq!(session.state().current_follow_up_id(), None);

        session.send_message("Second");
        session.settle().await;
        assert_eq!(backend.requests()[1].follow_up_to, None);
    }

    #[tokio::test]
    async fn test_stale_response_is_dropped_after_reset() {
        let backend = ScriptedBackend::with(vec![Ok(answer("late"))]);
        let mut session = session(backend);

        session.send_message("Hello");
        let stale = session.next_event().await.unwrap();
        session.show_welcome_screen();

        assert!(!session.apply(stale));
        assert!(session.entries().is_empty());
    }

    #[tokio::test]
    async fn test_rendering_requests_scroll_to_bottom() {
        let backend = ScriptedBackend::with(vec![Ok(answer("Hi"))]);
        let mut session = session(backend);

        assert!(!session.scroll().has_pending_request());
        session.send_message("Hello");
        assert!(session.scroll().has_pending_request());
    }

    #[tokio::test]
    async fn test_render_html_includes_messages() {
        let backend = ScriptedBackend::with(vec![Ok(ChatResponse {
            answer: "See [1]".into(),
            sources: Some(vec!["http://a".into()]),
            ..Default::default()
        })]);
        let mut session = session(backend);

        session.send_message("Hello");
        session.settle().await;

        let html = session.render_html();
        assert!(html.contains("user-message"));
        assert!(html.contains(r#"id="citation-1""#));
        assert!(!html.contains("Thinking"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_follow_up_fields_count_as_absent() {
        let backend = ScriptedBackend::with(vec![
            Ok(with_follow_up("A", "", "")),
            Ok(with_follow_up("B", "Did that help?", "")),
            Ok(answer("C")),
        ]);
        let mut session = session(backend.clone());

        session.send_message("q1");
        session.settle().await;
        let shown: Vec<_> = session
            .messages()
            .map(|m| (m.content.as_str(), m.is_follow_up))
            .collect();
        assert_eq!(shown, vec![("q1", false), ("A", false)]);
        assert_eq!(session.state().current_follow_up_id(), None);

        session.send_message("q2");
        session.settle().await;
        let follow_up = session.messages().last().unwrap();
        assert!(follow_up.is_follow_up);
        assert_eq!(follow_up.follow_up_id, None);
        assert_eq!(session.state().current_follow_up_id(), None);

        session.send_message("q3");
        session.settle().await;

        let requests = backend.requests();
        assert_eq!(requests[1].follow_up_to, None);
        assert_eq!(requests[1].original_question, None);
        assert_eq!(requests[2].follow_up_to, None);
        assert_eq!(requests[2].original_question, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newest_follow_up_replaces_pending_id() {
        let without_id = ChatResponse {
            answer: "Second answer".into(),
            follow_up: Some("Anything else?".into()),
            ..Default::default()
        };
        let backend = ScriptedBackend::with(vec![
            Ok(with_follow_up("First answer", "Did that help?", "f1")),
            Ok(without_id),
            Ok(answer("Third answer")),
        ]);
        let mut session = session(backend.clone());

        session.send_message("First");
        let event = session.next_event().await.unwrap();
        session.apply(event);

        // Second question goes out while the first follow-up timer is running
        tokio::time::advance(Duration::from_millis(500)).await;
        session.send_message("Second");
        session.settle().await;

        let labels: Vec<_> = session
            .messages()
            .filter(|m| m.is_follow_up)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(labels, vec!["Did that help?", "Anything else?"]);
        assert_eq!(session.state().current_follow_up_id(), None);

        session.send_message("Third");
        session.settle().await;
        assert_eq!(backend.requests()[2].follow_up_to, None);
    }

    struct PanickingBackend;

    #[async_trait]
    impl ChatBackend for PanickingBackend {
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse> {
            panic!("backend blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_backend_still_settles() {
        let mut session = ChatSession::new(Arc::new(PanickingBackend), SessionOptions::default());

        session.send_message("Hello");
        session.settle().await;

        assert!(!session.has_pending_work());
        assert!(!session.is_waiting());
        assert_eq!(loading_count(&session), 0);
        assert!(session.entries().iter().any(|e| matches!(e, Entry::Error)));
    }
}
