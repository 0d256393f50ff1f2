use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{
        Content, DeliveryCapabilities, InlineKeyboard, PaidOffer, PollContent, Reaction,
        SendOptions,
    },
    Result,
};

/// Transport port: "deliver content of kind T to recipient R with options" plus
/// the mutations applied to copies that were already delivered.
///
/// Every method reports failure through `Error::Delivery` so callers can count
/// and log it; implementations must not retry.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    fn capabilities(&self) -> DeliveryCapabilities;

    /// Send a copy of `content`. Renders every kind through one match.
    async fn send_copy(
        &self,
        to: UserId,
        content: &Content,
        opts: &SendOptions,
    ) -> Result<MessageId>;

    /// Send a purchase-gated photo.
    async fn send_paid(&self, to: UserId, offer: &PaidOffer, opts: &SendOptions)
        -> Result<MessageId>;

    /// Post a poll once to a shared surface (channel).
    async fn post_poll(&self, chat: ChatId, poll: &PollContent) -> Result<MessageRef>;

    async fn forward(&self, to: UserId, from: MessageRef) -> Result<MessageId>;

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;
    async fn edit_caption(&self, msg: MessageRef, caption: &str) -> Result<()>;
    async fn replace_keyboard(&self, msg: MessageRef, keyboard: &InlineKeyboard) -> Result<()>;
    async fn set_reaction(&self, msg: MessageRef, reaction: &[Reaction]) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// System notice to one participant (rejections, moderation notices).
    async fn send_notice(
        &self,
        to: UserId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef>;
}
