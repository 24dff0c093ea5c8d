use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use flare_social_core::Result;
use flare_social_core::backend::{
    Backend, Filter, ProcedureCapability, QueryCapability, Row, SelectQuery, WriteCapability,
    from_row,
};

use crate::domain::model::{
    Conversation, Message, MessageDraft, Notification, PeerProfile, Reaction,
};
use crate::domain::repository::{ChatRepository, NotificationRepository};

const CONVERSATIONS: &str = "conversations";
const MESSAGES: &str = "messages";
const REACTIONS: &str = "message_reactions";
const PROFILES: &str = "profiles";
const NOTIFICATIONS: &str = "notifications";

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn decode_all<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

/// 基于后端协作接口的私信仓储
pub struct BackendChatRepository {
    backend: Arc<dyn Backend>,
}

impl BackendChatRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ChatRepository for BackendChatRepository {
    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let query = SelectQuery::from(CONVERSATIONS).eq("id", conversation_id);
        self.backend
            .select(&query)
            .await?
            .into_iter()
            .next()
            .map(from_row)
            .transpose()
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        // 参与者可能在任一列，分两次查询后合并
        let mut seen = HashSet::new();
        let mut conversations = Vec::new();
        for column in ["participant1_id", "participant2_id"] {
            let query = SelectQuery::from(CONVERSATIONS)
                .eq(column, user_id)
                .order_by("last_message_at", false);
            for conversation in decode_all::<Conversation>(self.backend.select(&query).await?)? {
                if seen.insert(conversation.id.clone()) {
                    conversations.push(conversation);
                }
            }
        }
        Ok(conversations)
    }

    async fn get_or_create_conversation(&self, user_id: &str, peer_id: &str) -> Result<String> {
        self.backend.get_or_create_conversation(user_id, peer_id).await
    }

    async fn touch_conversation(
        &self,
        conversation_id: &str,
        last_message: &str,
        last_message_at: &str,
    ) -> Result<()> {
        self.backend
            .update(
                CONVERSATIONS,
                &[Filter::eq("id", conversation_id)],
                row(json!({
                    "last_message": last_message,
                    "last_message_at": last_message_at,
                })),
            )
            .await?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let query = SelectQuery::from(MESSAGES)
            .eq("conversation_id", conversation_id)
            .order_by("created_at", true);
        decode_all(self.backend.select(&query).await?)
    }

    async fn insert_message(&self, draft: &MessageDraft) -> Result<Message> {
        let inserted = self
            .backend
            .insert(
                MESSAGES,
                row(json!({
                    "conversation_id": draft.conversation_id,
                    "sender_id": draft.sender_id,
                    "receiver_id": draft.receiver_id,
                    "content": draft.content,
                    "client_ref": draft.client_ref,
                    "read": false,
                })),
            )
            .await?;
        from_row(inserted)
    }

    async fn mark_read(&self, conversation_id: &str, receiver_id: &str) -> Result<u64> {
        self.backend
            .update(
                MESSAGES,
                &[
                    Filter::eq("conversation_id", conversation_id),
                    Filter::eq("receiver_id", receiver_id),
                    Filter::eq("read", false),
                ],
                row(json!({"read": true})),
            )
            .await
    }

    async fn unread_messages(&self, receiver_id: &str) -> Result<Vec<Message>> {
        let query = SelectQuery::from(MESSAGES)
            .eq("receiver_id", receiver_id)
            .eq("read", false);
        decode_all(self.backend.select(&query).await?)
    }

    async fn list_reactions(&self, message_ids: &[String]) -> Result<Vec<Reaction>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = SelectQuery::from(REACTIONS)
            .filter(Filter::any_of("message_id", message_ids.iter().cloned()))
            .order_by("created_at", true);
        decode_all(self.backend.select(&query).await?)
    }

    async fn insert_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<Reaction> {
        let inserted = self
            .backend
            .insert(
                REACTIONS,
                row(json!({"message_id": message_id, "user_id": user_id, "emoji": emoji})),
            )
            .await?;
        from_row(inserted)
    }

    async fn delete_reaction(&self, reaction_id: &str) -> Result<u64> {
        self.backend
            .delete(REACTIONS, &[Filter::eq("id", reaction_id)])
            .await
    }

    async fn get_profiles(&self, user_ids: &[String]) -> Result<Vec<PeerProfile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = SelectQuery::from(PROFILES).filter(Filter::any_of("id", user_ids.iter().cloned()));
        decode_all(self.backend.select(&query).await?)
    }
}

/// 基于后端协作接口的通知仓储
pub struct BackendNotificationRepository {
    backend: Arc<dyn Backend>,
}

impl BackendNotificationRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl NotificationRepository for BackendNotificationRepository {
    async fn list_notifications(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let query = SelectQuery::from(NOTIFICATIONS)
            .eq("user_id", user_id)
            .order_by("created_at", false)
            .range(0, limit.max(1) - 1);
        decode_all(self.backend.select(&query).await?)
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<u64> {
        self.backend
            .update(
                NOTIFICATIONS,
                &[Filter::eq("id", notification_id)],
                row(json!({"read": true})),
            )
            .await
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        self.backend
            .update(
                NOTIFICATIONS,
                &[Filter::eq("user_id", user_id), Filter::eq("read", false)],
                row(json!({"read": true})),
            )
            .await
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<u64> {
        self.backend
            .delete(NOTIFICATIONS, &[Filter::eq("id", notification_id)])
            .await
    }
}
