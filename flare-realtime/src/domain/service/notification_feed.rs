use async_trait::async_trait;

use flare_social_core::backend::ChangeEvent;
use flare_social_core::optimistic::ViewCell;
use flare_social_core::realtime::{
    ChangeHandler, ReconcileOutcome, insert_unique, remove_by_key, update_by_key,
};

use super::decode;
use crate::domain::model::{Notification, sort_newest_first};

/// 通知中心同步
pub struct NotificationFeed {
    viewer_id: String,
    items: ViewCell<Vec<Notification>>,
}

impl NotificationFeed {
    pub fn new<T: Into<String>>(viewer_id: T, items: ViewCell<Vec<Notification>>) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            items,
        }
    }
}

#[async_trait]
impl ChangeHandler for NotificationFeed {
    async fn on_insert(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(notification) = decode::<Notification>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        if notification.user_id != self.viewer_id {
            return ReconcileOutcome::Ignored;
        }
        self.items
            .update(move |list| {
                if !insert_unique(list, notification, true) {
                    return ReconcileOutcome::Duplicate;
                }
                sort_newest_first(list);
                ReconcileOutcome::Applied
            })
            .await
    }

    async fn on_update(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(notification) = decode::<Notification>(event.new.as_ref()) else {
            return ReconcileOutcome::Ignored;
        };
        self.items
            .update(move |list| {
                let id = notification.id.clone();
                if update_by_key(list, &id, |n| *n = notification) {
                    ReconcileOutcome::Applied
                } else {
                    ReconcileOutcome::Unmatched
                }
            })
            .await
    }

    async fn on_delete(&self, event: &ChangeEvent) -> ReconcileOutcome {
        let Some(id) = event.primary_key() else {
            return ReconcileOutcome::Ignored;
        };
        let removed = self.items.update(|list| remove_by_key(list, id).is_some()).await;
        if removed {
            ReconcileOutcome::Applied
        } else {
            ReconcileOutcome::Unmatched
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(id: &str, at: &str) -> flare_social_core::backend::Row {
        json!({
            "id": id,
            "user_id": "u1",
            "actor_id": "u2",
            "type": "like",
            "message": "bob liked your post",
            "read": false,
            "created_at": at,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn test_newest_notification_first_and_deduped() {
        let items = ViewCell::new(Vec::new());
        let feed = NotificationFeed::new("u1", items.clone());

        let older = ChangeEvent::insert("notifications", notification("n1", "2024-05-01T10:00:00.000000Z"));
        let newer = ChangeEvent::insert("notifications", notification("n2", "2024-05-02T10:00:00.000000Z"));
        assert_eq!(feed.on_insert(&older).await, ReconcileOutcome::Applied);
        assert_eq!(feed.on_insert(&newer).await, ReconcileOutcome::Applied);
        assert_eq!(feed.on_insert(&older).await, ReconcileOutcome::Duplicate);

        let ids: Vec<String> = items.snapshot().await.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n2", "n1"]);
    }

    #[tokio::test]
    async fn test_other_users_notifications_ignored() {
        let items = ViewCell::new(Vec::new());
        let feed = NotificationFeed::new("u9", items.clone());
        let event = ChangeEvent::insert("notifications", notification("n1", "2024-05-01T10:00:00.000000Z"));
        assert_eq!(feed.on_insert(&event).await, ReconcileOutcome::Ignored);
        assert!(items.snapshot().await.is_empty());
    }
}
