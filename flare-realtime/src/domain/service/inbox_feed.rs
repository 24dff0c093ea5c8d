use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use flare_social_core::backend::{ChangeEvent, row_str};
use flare_social_core::optimistic::ViewCell;
use flare_social_core::realtime::{
    ChangeHandler, ReconcileOutcome, contains_key, insert_unique, move_to_front, remove_by_key,
    update_by_key,
};

use super::{CONVERSATIONS, MESSAGES, decode};
use crate::domain::model::{
    Conversation, ConversationSummary, Message, compare_timestamps, sort_by_recency,
};
use crate::domain::repository::ChatRepository;

/// 收件箱同步
///
/// 新消息把所在会话移到表头并刷新摘要；未读按消息 ID 集合记录，
/// 同一事件重复到达不会重复计数。
pub struct InboxFeed {
    viewer_id: String,
    conversations: ViewCell<Vec<ConversationSummary>>,
    repo: Arc<dyn ChatRepository>,
}

impl InboxFeed {
    pub fn new<T: Into<String>>(
        viewer_id: T,
        conversations: ViewCell<Vec<ConversationSummary>>,
        repo: Arc<dyn ChatRepository>,
    ) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            conversations,
            repo,
        }
    }

    async fn insert_message(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(message) = decode::<Message>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        if message.sender_id != self.viewer_id && message.receiver_id != self.viewer_id {
            return ReconcileOutcome::Ignored;
        }
        let viewer_id = self.viewer_id.clone();
        self.conversations
            .update(move |list| {
                let conversation_id = message.conversation_id.clone();
                let found = update_by_key(list, &conversation_id, |summary| {
                    let newer = compare_timestamps(
                        message.created_at.as_deref(),
                        summary.conversation.last_message_at.as_deref(),
                    )
                    .is_ge();
                    if newer {
                        summary.conversation.last_message = Some(message.content.clone());
                        summary.conversation.last_message_at = message.created_at.clone();
                    }
                    if message.receiver_id == viewer_id && !message.read {
                        summary.unread.insert(message.id.clone());
                    }
                });
                if !found {
                    return ReconcileOutcome::Unmatched;
                }
                move_to_front(list, &conversation_id);
                sort_by_recency(list);
                ReconcileOutcome::Applied
            })
            .await
    }

    async fn update_message(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(message) = decode::<Message>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        if message.receiver_id != self.viewer_id {
            return ReconcileOutcome::Ignored;
        }
        self.conversations
            .update(move |list| {
                let found = update_by_key(list, &message.conversation_id, |summary| {
                    if message.read {
                        summary.unread.remove(&message.id);
                    } else {
                        summary.unread.insert(message.id.clone());
                    }
                });
                if found {
                    ReconcileOutcome::Applied
                } else {
                    ReconcileOutcome::Unmatched
                }
            })
            .await
    }

    async fn delete_message(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(id) = event.primary_key() else {
            return ReconcileOutcome::Ignored;
        };
        let parent = event.old.as_ref().and_then(|row| row_str(row, "conversation_id"));
        let removed = self
            .conversations
            .update(|list| match parent {
                Some(conversation_id) => list
                    .iter_mut()
                    .find(|s| s.conversation.id == conversation_id)
                    .is_some_and(|s| s.unread.remove(id)),
                None => list.iter_mut().any(|s| s.unread.remove(id)),
            })
            .await;
        if removed {
            ReconcileOutcome::Applied
        } else {
            ReconcileOutcome::Unmatched
        }
    }

    async fn insert_conversation(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(conversation) = decode::<Conversation>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        let Some(mut summary) = ConversationSummary::new(conversation, &self.viewer_id) else {
            return ReconcileOutcome::Ignored;
        };
        let known = self
            .conversations
            .read(|list| contains_key(list, &summary.conversation.id))
            .await;
        if known {
            return ReconcileOutcome::Duplicate;
        }

        match self.repo.get_profiles(std::slice::from_ref(&summary.peer_id)).await {
            Ok(mut profiles) => summary.peer = profiles.pop(),
            Err(err) => {
                warn!(peer_id = %summary.peer_id, error = %err, "peer profile lookup failed, showing conversation without it");
            }
        }

        self.conversations
            .update(move |list| {
                if !insert_unique(list, summary, true) {
                    return ReconcileOutcome::Duplicate;
                }
                sort_by_recency(list);
                ReconcileOutcome::Applied
            })
            .await
    }

    async fn update_conversation(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(incoming) = decode::<Conversation>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        self.conversations
            .update(move |list| {
                let id = incoming.id.clone();
                let found = update_by_key(list, &id, |summary| {
                    if compare_timestamps(incoming.last_activity(), summary.last_activity()).is_ge() {
                        summary.conversation = incoming;
                    } else {
                        debug!(conversation_id = %id, "stale conversation update dropped");
                    }
                });
                if !found {
                    return ReconcileOutcome::Unmatched;
                }
                sort_by_recency(list);
                ReconcileOutcome::Applied
            })
            .await
    }

    async fn delete_conversation(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(id) = event.primary_key() else {
            return ReconcileOutcome::Ignored;
        };
        let removed = self
            .conversations
            .update(|list| remove_by_key(list, id).is_some())
            .await;
        if removed {
            ReconcileOutcome::Applied
        } else {
            ReconcileOutcome::Unmatched
        }
    }
}

#[async_trait]
impl ChangeHandler for InboxFeed {
    async fn on_insert(&self, event: &ChangeEvent) -> ReconcileOutcome {
        match event.table.as_str() {
            MESSAGES => self.insert_message(event).await,
            CONVERSATIONS => self.insert_conversation(event).await,
            _ => ReconcileOutcome::Ignored,
        }
    }

    async fn on_update(&self, event: &ChangeEvent) -> ReconcileOutcome {
        match event.table.as_str() {
            MESSAGES => self.update_message(event).await,
            CONVERSATIONS => self.update_conversation(event).await,
            _ => ReconcileOutcome::Ignored,
        }
    }

    async fn on_delete(&self, event: &ChangeEvent) -> ReconcileOutcome {
        match event.table.as_str() {
            MESSAGES => self.delete_message(event).await,
            CONVERSATIONS => self.delete_conversation(event).await,
            _ => ReconcileOutcome::Ignored,
        }
    }
}
