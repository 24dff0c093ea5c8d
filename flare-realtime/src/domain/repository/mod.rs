use async_trait::async_trait;
use flare_social_core::Result;

use crate::domain::model::{
    Conversation, Message, MessageDraft, Notification, PeerProfile, Reaction,
};

/// 私信仓储接口
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// 当前用户参与的全部会话
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>>;

    /// 原子地获取或创建两人之间的会话
    async fn get_or_create_conversation(&self, user_id: &str, peer_id: &str) -> Result<String>;

    /// 更新会话摘要（最后一条消息与时间）
    async fn touch_conversation(
        &self,
        conversation_id: &str,
        last_message: &str,
        last_message_at: &str,
    ) -> Result<()>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
    async fn insert_message(&self, draft: &MessageDraft) -> Result<Message>;

    /// 把发给 `receiver_id` 的消息标记为已读，返回影响行数
    async fn mark_read(&self, conversation_id: &str, receiver_id: &str) -> Result<u64>;

    /// 发给用户且未读的消息
    async fn unread_messages(&self, receiver_id: &str) -> Result<Vec<Message>>;

    async fn list_reactions(&self, message_ids: &[String]) -> Result<Vec<Reaction>>;
    async fn insert_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<Reaction>;
    async fn delete_reaction(&self, reaction_id: &str) -> Result<u64>;

    async fn get_profiles(&self, user_ids: &[String]) -> Result<Vec<PeerProfile>>;
}

/// 通知仓储接口
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn list_notifications(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>>;
    async fn mark_notification_read(&self, notification_id: &str) -> Result<u64>;
    async fn mark_all_read(&self, user_id: &str) -> Result<u64>;
    async fn delete_notification(&self, notification_id: &str) -> Result<u64>;
}
