use std::cmp::Ordering;

use async_trait::async_trait;
use tracing::debug;

use flare_social_core::backend::{ChangeEvent, row_str};
use flare_social_core::optimistic::{Reconciliation, ViewCell, reconcile_authoritative};
use flare_social_core::realtime::{
    ChangeHandler, ReconcileOutcome, contains_key, remove_by_key, update_by_key,
};

use super::{MESSAGES, REACTIONS, decode};
use crate::domain::model::{Message, Reaction, compare_timestamps};

/// 单个会话的消息与表情回应同步
///
/// 插入按主键去重，本人的临时消息按 `client_ref` 原位确认；
/// 更新在双方都带 `updated_at` 时按时间后写者胜出；
/// 表情回应的删除事件带 `message_id` 时直接定位，否则扫描全部消息。
pub struct ChatFeed {
    conversation_id: String,
    messages: ViewCell<Vec<Message>>,
}

impl ChatFeed {
    pub fn new<T: Into<String>>(conversation_id: T, messages: ViewCell<Vec<Message>>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages,
        }
    }

    async fn insert_message(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(message) = decode::<Message>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        if message.conversation_id != self.conversation_id {
            return ReconcileOutcome::Ignored;
        }
        self.messages
            .update(move |list| match reconcile_authoritative(list, &message) {
                Reconciliation::Duplicate => ReconcileOutcome::Duplicate,
                Reconciliation::Reconciled => ReconcileOutcome::Applied,
                Reconciliation::Unmatched => {
                    list.push(message);
                    ReconcileOutcome::Applied
                }
            })
            .await
    }

    async fn update_message(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(incoming) = decode::<Message>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        self.messages
            .update(move |list| {
                let Some(existing) = list.iter_mut().find(|m| m.id == incoming.id) else {
                    return ReconcileOutcome::Unmatched;
                };
                if existing.updated_at.is_some()
                    && incoming.updated_at.is_some()
                    && compare_timestamps(incoming.updated_at.as_deref(), existing.updated_at.as_deref())
                        == Ordering::Less
                {
                    debug!(message_id = %incoming.id, "stale message update dropped");
                    return ReconcileOutcome::Ignored;
                }
                existing.absorb(incoming);
                ReconcileOutcome::Applied
            })
            .await
    }

    async fn delete_message(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(id) = event.primary_key() else {
            return ReconcileOutcome::Ignored;
        };
        let removed = self
            .messages
            .update(|list| remove_by_key(list, id).is_some())
            .await;
        if removed {
            ReconcileOutcome::Applied
        } else {
            ReconcileOutcome::Unmatched
        }
    }

    async fn upsert_reaction(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(reaction) = decode::<Reaction>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        self.messages
            .update(move |list| {
                let Some(message) = list.iter_mut().find(|m| m.id == reaction.message_id) else {
                    return ReconcileOutcome::Unmatched;
                };
                if contains_key(&message.reactions, &reaction.id) {
                    let id = reaction.id.clone();
                    update_by_key(&mut message.reactions, &id, |r| *r = reaction);
                    return ReconcileOutcome::Duplicate;
                }
                message.reactions.push(reaction);
                ReconcileOutcome::Applied
            })
            .await
    }

    async fn delete_reaction(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(id) = event.primary_key() else {
            return ReconcileOutcome::Ignored;
        };
        let parent = event.old.as_ref().and_then(|row| row_str(row, "message_id"));
        let removed = self
            .messages
            .update(|list| match parent {
                Some(message_id) => list
                    .iter_mut()
                    .find(|m| m.id == message_id)
                    .and_then(|m| remove_by_key(&mut m.reactions, id))
                    .is_some(),
                None => {
                    debug!(reaction_id = id, "reaction delete without message_id, scanning messages");
                    list.iter_mut()
                        .any(|m| remove_by_key(&mut m.reactions, id).is_some())
                }
            })
            .await;
        if removed {
            ReconcileOutcome::Applied
        } else {
            ReconcileOutcome::Unmatched
        }
    }
}

#[async_trait]
impl ChangeHandler for ChatFeed {
    async fn on_insert(&self, event: &ChangeEvent) -> ReconcileOutcome {
        match event.table.as_str() {
            MESSAGES => self.insert_message(event).await,
            REACTIONS => self.upsert_reaction(event).await,
            _ => ReconcileOutcome::Ignored,
        }
    }

    async fn on_update(&self, event: &ChangeEvent) -> ReconcileOutcome {
        match event.table.as_str() {
            MESSAGES => self.update_message(event).await,
            REACTIONS => self.upsert_reaction(event).await,
            _ => ReconcileOutcome::Ignored,
        }
    }

    async fn on_delete(&self, event: &ChangeEvent) -> ReconcileOutcome {
        match event.table.as_str() {
            MESSAGES => self.delete_message(event).await,
            REACTIONS => self.delete_reaction(event).await,
            _ => ReconcileOutcome::Ignored,
        }
    }
}
