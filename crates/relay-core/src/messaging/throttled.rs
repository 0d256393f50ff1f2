use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::{
        port::DeliveryPort,
        types::{
            Content, DeliveryCapabilities, InlineKeyboard, PaidOffer, PollContent, Reaction,
            SendOptions,
        },
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(35), // ~28/sec, under the 30/sec bot cap
            per_chat_min_interval: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// DeliveryPort decorator that paces outbound calls.
///
/// Fan-out to a large audience is a burst of sends; spacing them keeps the bot
/// under Telegram's flood limits. Calls are delayed, never retried.
pub struct ThrottledDelivery {
    inner: Arc<dyn DeliveryPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledDelivery {
    pub fn new(inner: Arc<dyn DeliveryPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = if self.cfg.per_chat_min_interval.is_zero() {
            Duration::ZERO
        } else {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl DeliveryPort for ThrottledDelivery {
    fn capabilities(&self) -> DeliveryCapabilities {
        self.inner.capabilities()
    }

    async fn send_copy(
        &self,
        to: UserId,
        content: &Content,
        opts: &SendOptions,
    ) -> Result<MessageId> {
        self.throttle_chat(to.0).await;
        self.inner.send_copy(to, content, opts).await
    }

    async fn send_paid(
        &self,
        to: UserId,
        offer: &PaidOffer,
        opts: &SendOptions,
    ) -> Result<MessageId> {
        self.throttle_chat(to.0).await;
        self.inner.send_paid(to, offer, opts).await
    }

    async fn post_poll(&self, chat: ChatId, poll: &PollContent) -> Result<MessageRef> {
        self.throttle_chat(chat.0).await;
        self.inner.post_poll(chat, poll).await
    }

    async fn forward(&self, to: UserId, from: MessageRef) -> Result<MessageId> {
        self.throttle_chat(to.0).await;
        self.inner.forward(to, from).await
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.edit_text(msg, text).await
    }

    async fn edit_caption(&self, msg: MessageRef, caption: &str) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.edit_caption(msg, caption).await
    }

    async fn replace_keyboard(&self, msg: MessageRef, keyboard: &InlineKeyboard) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.replace_keyboard(msg, keyboard).await
    }

    async fn set_reaction(&self, msg: MessageRef, reaction: &[Reaction]) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.set_reaction(msg, reaction).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.throttle_chat(msg.chat_id.0).await;
        self.inner.delete_message(msg).await
    }

    async fn send_notice(
        &self,
        to: UserId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        self.throttle_chat(to.0).await;
        self.inner.send_notice(to, text, keyboard).await
    }
}
