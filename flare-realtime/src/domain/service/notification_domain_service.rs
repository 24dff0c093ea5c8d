use std::sync::Arc;

use tracing::{debug, warn};

use flare_social_core::backend::{SubscriptionCapability, SubscriptionScope};
use flare_social_core::realtime::{ChangeHandler, remove_by_key, update_by_key};
use flare_social_core::session::SessionContext;
use flare_social_core::{ErrorCode, FlareError, Result};

use super::{NOTIFICATIONS, NotificationFeed};
use crate::domain::model::{NotificationCenter, sort_newest_first};
use crate::domain::repository::NotificationRepository;

/// 通知领域服务
pub struct NotificationDomainService {
    repo: Arc<dyn NotificationRepository>,
    feed: Arc<dyn SubscriptionCapability>,
    session: Arc<SessionContext>,
    limit: usize,
}

impl NotificationDomainService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        feed: Arc<dyn SubscriptionCapability>,
        session: Arc<SessionContext>,
        limit: usize,
    ) -> Self {
        Self {
            repo,
            feed,
            session,
            limit: limit.max(1),
        }
    }

    pub async fn notification_center(&self) -> Result<NotificationCenter> {
        let viewer = self.session.current().await?;
        Ok(NotificationCenter::new(viewer.user_id))
    }

    /// 打开通知中心：订阅本人通知后加载最近的通知
    pub async fn open(&self, center: &mut NotificationCenter) -> Result<bool> {
        let key = format!("notifications:{}", center.viewer_id);
        if center.listener.is_bound_to(&key) {
            return Ok(false);
        }

        let handler: Arc<dyn ChangeHandler> = Arc::new(NotificationFeed::new(
            center.viewer_id.clone(),
            center.items.clone(),
        ));
        center
            .listener
            .bind(
                &key,
                self.feed.as_ref(),
                vec![(
                    SubscriptionScope::filtered(NOTIFICATIONS, "user_id", center.viewer_id.as_str()),
                    handler,
                )],
            )
            .await?;

        match self.repo.list_notifications(&center.viewer_id, self.limit).await {
            Ok(mut items) => {
                sort_newest_first(&mut items);
                debug!(notifications = items.len(), "notifications loaded");
                center.items.set(items).await;
                Ok(true)
            }
            Err(err) => {
                center.listener.release();
                Err(err)
            }
        }
    }

    pub fn close(&self, center: &mut NotificationCenter) {
        center.close();
    }

    /// 标记单条通知为已读
    pub async fn mark_read(&self, center: &NotificationCenter, notification_id: &str) -> Result<()> {
        let updated = self.repo.mark_notification_read(notification_id).await?;
        if updated == 0 {
            return Err(FlareError::new(
                ErrorCode::NotFound,
                format!("notification not found: {notification_id}"),
            ));
        }
        center
            .items
            .update(|list| update_by_key(list, notification_id, |n| n.read = true))
            .await;
        Ok(())
    }

    /// 全部标记为已读
    pub async fn mark_all_read(&self, center: &NotificationCenter) -> Result<u64> {
        let updated = self.repo.mark_all_read(&center.viewer_id).await?;
        center
            .items
            .update(|list| list.iter_mut().for_each(|n| n.read = true))
            .await;
        debug!(updated, "notifications marked read");
        Ok(updated)
    }

    /// 删除通知；远程删除失败时本地列表保持不变
    pub async fn delete(&self, center: &NotificationCenter, notification_id: &str) -> Result<()> {
        if let Err(err) = self.repo.delete_notification(notification_id).await {
            warn!(notification_id, error = %err, "notification delete failed");
            return Err(err);
        }
        center
            .items
            .update(|list| remove_by_key(list, notification_id))
            .await;
        Ok(())
    }
}
