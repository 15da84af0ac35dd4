//! Agent Session Management
//!
//! Owns the conversation history and turns a question into a stream of chunks
//! produced by a background task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::ai::{AiProviderType, ChatModel};
use crate::models::error::{AgentError, Result};
use crate::models::{AgentMode, ChatChunk, Message};

/// Chunks buffered between the producer task and the consumer
const CHUNK_BUFFER: usize = 1;

/// Holds the session's running flag for the length of a turn
struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AgentError::SessionBusy)?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A conversation with one model
pub struct AgentSession {
    id: String,
    model: Arc<dyn ChatModel>,
    history: Arc<RwLock<Vec<Message>>>,
    running: Arc<AtomicBool>,
    mode: AgentMode,
    created_at: i64,
}

impl AgentSession {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model,
            history: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            mode: AgentMode::default(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn change_mode(&mut self, mode: AgentMode) {
        self.mode = mode;
    }

    pub fn provider_type(&self) -> AiProviderType {
        self.model.provider_type()
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Whether a turn is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a streamed turn.
    ///
    /// Text arrives as partial chunks in provider order, followed by one final
    /// chunk once the assistant reply is in the history. A provider error ends
    /// the stream without a final chunk; [`AskStream::finish`] returns it.
    pub async fn ask(&self, input: impl Into<String>) -> Result<AskStream> {
        let guard = RunningGuard::acquire(&self.running)?;
        let context = self.begin_turn(input.into()).await;

        tracing::info!("Session {} asking {}", self.id, self.model.provider_type());

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(stream_turn(
            self.model.clone(),
            self.history.clone(),
            context,
            tx,
            cancel.clone(),
            guard,
        ));

        Ok(AskStream {
            rx,
            _abandon: cancel.clone().drop_guard(),
            cancel,
            handle,
        })
    }

    /// Complete a turn without streaming
    pub async fn get_response(&self, input: impl Into<String>) -> Result<String> {
        let _guard = RunningGuard::acquire(&self.running)?;
        let context = self.begin_turn(input.into()).await;

        let content = self.model.complete(&context).await.map_err(|e| {
            tracing::warn!("Session {} completion failed: {}", self.id, e);
            e
        })?;

        self.history
            .write()
            .await
            .push(Message::assistant(content.clone()));
        Ok(content)
    }

    /// Conversation so far, without system prompts
    pub async fn history(&self) -> Vec<Message> {
        self.history
            .read()
            .await
            .iter()
            .filter(|m| !m.is_system())
            .cloned()
            .collect()
    }

    /// Forget the conversation; refused while a turn is running
    pub async fn reset(&self) -> Result<()> {
        let _guard = RunningGuard::acquire(&self.running)?;
        self.history.write().await.clear();
        tracing::debug!("Session {} history cleared", self.id);
        Ok(())
    }

    /// Record the user message and build the context sent to the model
    async fn begin_turn(&self, input: String) -> Vec<Message> {
        let mut history = self.history.write().await;
        history.push(Message::user(input));

        let mut context = Vec::with_capacity(history.len() + 1);
        context.push(Message::system(self.mode.system_prompt()));
        context.extend(history.iter().cloned());
        context
    }
}

/// Producer side of a streamed turn
async fn stream_turn(
    model: Arc<dyn ChatModel>,
    history: Arc<RwLock<Vec<Message>>>,
    context: Vec<Message>,
    tx: mpsc::Sender<ChatChunk>,
    cancel: CancellationToken,
    guard: RunningGuard,
) -> Result<String> {
    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        _ = tx.closed() => return Err(AgentError::Cancelled),
        result = model.stream_complete(&context) => result.map_err(|e| {
            tracing::warn!("Failed to start stream: {}", e);
            e
        })?,
    };

    let mut content = String::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            _ = tx.closed() => {
                tracing::debug!("Chunk receiver dropped, abandoning turn");
                return Err(AgentError::Cancelled);
            }
            next = stream.next() => next,
        };

        let fragment = match next {
            Some(Ok(fragment)) => fragment,
            Some(Err(e)) => {
                tracing::warn!("Stream failed after {} bytes: {}", content.len(), e);
                return Err(e);
            }
            None => break,
        };

        if fragment.is_empty() {
            continue;
        }

        content.push_str(&fragment);
        send_chunk(&tx, &cancel, ChatChunk::partial(fragment)).await?;
    }

    history.write().await.push(Message::assistant(content.clone()));
    drop(guard);

    tracing::info!("Turn finished with {} bytes", content.len());

    // The turn is complete; a consumer that already left only misses the marker
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tx.send(ChatChunk::final_chunk()) => {}
    }

    Ok(content)
}

async fn send_chunk(
    tx: &mpsc::Sender<ChatChunk>,
    cancel: &CancellationToken,
    chunk: ChatChunk,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        sent = tx.send(chunk) => sent.map_err(|_| {
            tracing::debug!("Chunk receiver dropped, abandoning turn");
            AgentError::Cancelled
        }),
    }
}

/// Consumer side of a streamed turn.
///
/// Dropping it cancels the turn.
pub struct AskStream {
    rx: mpsc::Receiver<ChatChunk>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<String>>,
    _abandon: DropGuard,
}

impl AskStream {
    /// Next chunk, or `None` once the producer has stopped
    pub async fn recv(&mut self) -> Option<ChatChunk> {
        self.rx.recv().await
    }

    /// Stop the turn; nothing further is added to the history
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this turn, for use from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the producer and return the full reply or its error.
    ///
    /// A turn still in progress is cancelled and its unread chunks discarded.
    pub async fn finish(self) -> Result<String> {
        let AskStream {
            rx, cancel, handle, ..
        } = self;
        cancel.cancel();
        drop(rx);
        handle
            .await
            .map_err(|e| AgentError::Internal(format!("Stream task failed: {}", e)))?
    }

    /// Drain every chunk, then finish
    pub async fn collect(mut self) -> Result<String> {
        while let Some(chunk) = self.rx.recv().await {
            if chunk.is_final {
                break;
            }
        }
        self.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::TextStream;
    use crate::models::MessageRole;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Model that replays fixed fragments and records what it was sent
    struct ScriptedModel {
        fragments: Vec<Result<String>>,
        hang: bool,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                hang: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn with_results(fragments: Vec<Result<String>>) -> Self {
            Self {
                fragments,
                hang: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        /// Never ends the stream after the scripted fragments
        fn hanging(fragments: &[&str]) -> Self {
            Self {
                hang: true,
                ..Self::new(fragments)
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn provider_type(&self) -> AiProviderType {
            AiProviderType::Ollama
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, messages: &[Message]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.fragments.iter().cloned().collect()
        }

        async fn stream_complete(&self, messages: &[Message]) -> Result<TextStream> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let fragments = stream::iter(self.fragments.clone());
            if self.hang {
                Ok(fragments.chain(stream::pending()).boxed())
            } else {
                Ok(fragments.boxed())
            }
        }
    }

    async fn drain(stream: &mut AskStream) -> Vec<ChatChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_chunks_arrive_in_order_then_final() {
        let session = AgentSession::new(Arc::new(ScriptedModel::new(&["Hel", "lo", " world"])));

        let mut stream = session.ask("hi").await.unwrap();
        let chunks = drain(&mut stream).await;

        assert_eq!(
            chunks,
            vec![
                ChatChunk::partial("Hel"),
                ChatChunk::partial("lo"),
                ChatChunk::partial(" world"),
                ChatChunk::final_chunk(),
            ]
        );
        assert_eq!(stream.finish().await.unwrap(), "Hello world");
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_list_files_turn() {
        let session = AgentSession::new(Arc::new(ScriptedModel::new(&["Run ", "`ls`"])));

        let mut stream = session.ask("list files").await.unwrap();
        let chunks = drain(&mut stream).await;

        assert_eq!(chunks.last(), Some(&ChatChunk::final_chunk()));
        let streamed: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(streamed, "Run `ls`");
        assert_eq!(stream.finish().await.unwrap(), streamed);

        let history = session.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], Message::assistant("Run `ls`"));
    }

    #[tokio::test]
    async fn test_history_records_one_assistant_message() {
        let session = AgentSession::new(Arc::new(ScriptedModel::new(&["a", "b"])));

        let reply = session.ask("first").await.unwrap().collect().await.unwrap();
        assert_eq!(reply, "ab");

        assert_eq!(
            session.history().await,
            vec![Message::user("first"), Message::assistant("ab")]
        );
    }

    #[tokio::test]
    async fn test_empty_fragments_are_skipped() {
        let session = AgentSession::new(Arc::new(ScriptedModel::new(&["a", "", "b"])));

        let mut stream = session.ask("hi").await.unwrap();
        let chunks = drain(&mut stream).await;

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.is_final || !c.content.is_empty()));
    }

    #[tokio::test]
    async fn test_context_starts_with_system_prompt() {
        let model = Arc::new(ScriptedModel::new(&["ok"]));
        let session = AgentSession::new(model.clone());

        session.ask("one").await.unwrap().collect().await.unwrap();
        session.ask("two").await.unwrap().collect().await.unwrap();

        let seen = model.seen.lock().unwrap();
        let context = &seen[1];
        assert_eq!(context[0].role, MessageRole::System);
        assert_eq!(context[0].content, AgentMode::Chat.system_prompt());
        assert_eq!(
            &context[1..],
            &[
                Message::user("one"),
                Message::assistant("ok"),
                Message::user("two")
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_error_ends_without_final_chunk() {
        let model = ScriptedModel::with_results(vec![
            Ok("par".to_string()),
            Err(AgentError::Provider("connection reset".to_string())),
        ]);
        let session = AgentSession::new(Arc::new(model));

        let mut stream = session.ask("hi").await.unwrap();
        let chunks = drain(&mut stream).await;

        assert_eq!(chunks, vec![ChatChunk::partial("par")]);
        assert!(matches!(stream.finish().await, Err(AgentError::Provider(_))));
        assert_eq!(session.history().await, vec![Message::user("hi")]);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_turns_are_rejected() {
        let session = AgentSession::new(Arc::new(ScriptedModel::hanging(&["thinking"])));

        let mut stream = session.ask("first").await.unwrap();
        assert_eq!(stream.recv().await, Some(ChatChunk::partial("thinking")));
        assert!(session.is_running());

        assert!(matches!(session.ask("second").await, Err(AgentError::SessionBusy)));
        assert!(matches!(
            session.get_response("second").await,
            Err(AgentError::SessionBusy)
        ));
        assert!(matches!(session.reset().await, Err(AgentError::SessionBusy)));

        stream.cancel();
        assert!(matches!(stream.finish().await, Err(AgentError::Cancelled)));
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_turn_appends_nothing() {
        let session = AgentSession::new(Arc::new(ScriptedModel::hanging(&["partial"])));

        let mut stream = session.ask("hi").await.unwrap();
        let token = stream.cancellation_token();
        assert!(stream.recv().await.is_some());

        token.cancel();
        assert_eq!(stream.recv().await, None);
        assert!(matches!(stream.finish().await, Err(AgentError::Cancelled)));
        assert_eq!(session.history().await, vec![Message::user("hi")]);

        let reply = session.get_response("again").await.unwrap();
        assert_eq!(reply, "partial");
    }

    #[tokio::test]
    async fn test_dropped_receiver_abandons_turn() {
        let session = AgentSession::new(Arc::new(ScriptedModel::new(&["1", "2", "3", "4", "5"])));

        let mut stream = session.ask("count").await.unwrap();
        assert!(stream.recv().await.is_some());

        let AskStream { rx, handle, .. } = stream;
        drop(rx);
        assert!(matches!(handle.await.unwrap(), Err(AgentError::Cancelled)));
        assert_eq!(session.history().await.len(), 1);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_dropped_stream_frees_session() {
        let session = AgentSession::new(Arc::new(ScriptedModel::hanging(&[])));

        drop(session.ask("first").await.unwrap());

        tokio::time::timeout(Duration::from_secs(1), async {
            while session.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(session.ask("again").await.is_ok());
    }

    #[tokio::test]
    async fn test_finish_mid_turn_returns_cancelled() {
        let session = AgentSession::new(Arc::new(ScriptedModel::hanging(&["a"])));

        let mut stream = session.ask("hi").await.unwrap();
        assert_eq!(stream.recv().await, Some(ChatChunk::partial("a")));

        let result = tokio::time::timeout(Duration::from_millis(500), stream.finish())
            .await
            .unwrap();
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert!(!session.is_running());
        assert_eq!(session.history().await, vec![Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_get_response_records_history() {
        let session = AgentSession::new(Arc::new(ScriptedModel::new(&["ls", " -la"])));

        let reply = session.get_response("list files").await.unwrap();
        assert_eq!(reply, "ls -la");
        assert_eq!(
            session.history().await,
            vec![Message::user("list files"), Message::assistant("ls -la")]
        );
    }

    #[tokio::test]
    async fn test_reset_clears_history_only() {
        let mut session = AgentSession::new(Arc::new(ScriptedModel::new(&["ok"])));
        let id = session.id().to_string();

        session.get_response("hi").await.unwrap();
        session.reset().await.unwrap();

        assert!(session.history().await.is_empty());
        assert_eq!(session.id(), id);

        session.change_mode(AgentMode::Chat);
        assert_eq!(session.mode(), AgentMode::Chat);
        assert_eq!(session.provider_type(), AiProviderType::Ollama);
        assert_eq!(session.model_name(), "scripted");
        assert!(session.created_at() > 0);
    }
}
