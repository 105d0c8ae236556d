// ABOUTME: Recording test doubles for the identity service and chat transport.
// ABOUTME: Support scripted failures and artificial latency for race tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ChatError, ChatResult};
use crate::transport::{ChatTransport, IdentityService, ThreadParticipant};

fn maybe_sleep(delay: &Mutex<Option<Duration>>) -> Option<Duration> {
    delay.lock().ok().and_then(|d| *d)
}

/// In-memory identity service that mints sequential identities.
pub struct MockIdentityService {
    counter: AtomicUsize,
    minted: Mutex<Vec<String>>,
    tokens: Mutex<Vec<String>>,
    fail_minting: AtomicBool,
    fail_tokens: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockIdentityService {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            minted: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            fail_minting: AtomicBool::new(false),
            fail_tokens: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    pub fn fail_minting(&self, fail: bool) {
        self.fail_minting.store(fail, Ordering::SeqCst);
    }

    pub fn fail_tokens(&self, fail: bool) {
        self.fail_tokens.store(fail, Ordering::SeqCst);
    }

    /// Artificial latency before each mint, to widen race windows in tests.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.delay.lock() {
            *d = Some(delay);
        }
    }

    pub fn mint_count(&self) -> usize {
        self.minted.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }
}

impl Default for MockIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityService for MockIdentityService {
    async fn create_identity(&self) -> ChatResult<String> {
        if let Some(delay) = maybe_sleep(&self.delay) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_minting.load(Ordering::SeqCst) {
            return Err(ChatError::identity("identity service unavailable"));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let identity = format!("8:mesh:{:04}", n);
        if let Ok(mut minted) = self.minted.lock() {
            minted.push(identity.clone());
        }
        Ok(identity)
    }

    async fn issue_chat_token(&self, transport_user_id: &str) -> ChatResult<String> {
        if self.fail_tokens.load(Ordering::SeqCst) {
            return Err(ChatError::identity("token issuance unavailable"));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let token = format!("tok-{}-{:04}", transport_user_id, n);
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.push(token.clone());
        }
        Ok(token)
    }
}

/// One recorded thread creation.
#[derive(Debug, Clone)]
pub struct CreatedThread {
    pub topic: String,
    pub participants: Vec<ThreadParticipant>,
}

/// One recorded message send.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub transport_thread_id: String,
    pub sender_display_name: String,
    pub body: String,
}

/// In-memory chat transport recording every call.
pub struct MockTransport {
    counter: AtomicUsize,
    created: Mutex<Vec<CreatedThread>>,
    sent: Mutex<Vec<SentMessage>>,
    typing: Mutex<Vec<String>>,
    read_receipts: Mutex<Vec<(String, String)>>,
    fail_create: AtomicBool,
    fail_send: AtomicBool,
    fail_typing: AtomicBool,
    fail_read_receipts: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            typing: Mutex::new(Vec::new()),
            read_receipts: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_typing: AtomicBool::new(false),
            fail_read_receipts: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn fail_typing(&self, fail: bool) {
        self.fail_typing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_read_receipts(&self, fail: bool) {
        self.fail_read_receipts.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.delay.lock() {
            *d = Some(delay);
        }
    }

    pub fn created_threads(&self) -> Vec<CreatedThread> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn typing_count(&self) -> usize {
        self.typing.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn read_receipts(&self) -> Vec<(String, String)> {
        self.read_receipts
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn create_thread(
        &self,
        _token: &str,
        topic: &str,
        participants: &[ThreadParticipant],
    ) -> ChatResult<String> {
        if let Some(delay) = maybe_sleep(&self.delay) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ChatError::transport("thread creation failed"));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut created) = self.created.lock() {
            created.push(CreatedThread {
                topic: topic.to_string(),
                participants: participants.to_vec(),
            });
        }
        Ok(format!("19:thread-{:04}", n))
    }

    async fn send_message(
        &self,
        _token: &str,
        transport_thread_id: &str,
        sender_display_name: &str,
        body: &str,
    ) -> ChatResult<String> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChatError::transport("message send failed"));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage {
                transport_thread_id: transport_thread_id.to_string(),
                sender_display_name: sender_display_name.to_string(),
                body: body.to_string(),
            });
        }
        Ok(format!("msg-{:04}", n))
    }

    async fn send_typing(&self, _token: &str, transport_thread_id: &str) -> ChatResult<()> {
        if self.fail_typing.load(Ordering::SeqCst) {
            return Err(ChatError::transport("typing notification failed"));
        }
        if let Ok(mut typing) = self.typing.lock() {
            typing.push(transport_thread_id.to_string());
        }
        Ok(())
    }

    async fn send_read_receipt(
        &self,
        _token: &str,
        transport_thread_id: &str,
        message_id: &str,
    ) -> ChatResult<()> {
        if self.fail_read_receipts.load(Ordering::SeqCst) {
            return Err(ChatError::transport("read receipt failed"));
        }
        if let Ok(mut receipts) = self.read_receipts.lock() {
            receipts.push((transport_thread_id.to_string(), message_id.to_string()));
        }
        Ok(())
    }
}
