//! # 增强 Hook 实现
//!
//! 主操作成功后的积分奖励与通知写入。两者都跳过自我互动。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use flare_social_core::RewardConfig;
use flare_social_core::hooks::{EnrichmentEvent, EnrichmentHook, HookContext, HookOutcome};

use crate::domain::model::{NotificationDraft, NotificationKind};
use crate::domain::repository::EngagementRepository;

/// 积分奖励 Hook
///
/// 一个事件可能产生多笔积分；中途失败时记下已入账的部分，
/// 补偿重试只补发剩余的积分。
pub struct RewardPointsHook {
    repo: Arc<dyn EngagementRepository>,
    rewards: RewardConfig,
    applied: DashMap<String, Vec<String>>,
}

impl RewardPointsHook {
    pub const NAME: &'static str = "reward_points";

    pub fn new(repo: Arc<dyn EngagementRepository>, rewards: RewardConfig) -> Self {
        Self {
            repo,
            rewards,
            applied: DashMap::new(),
        }
    }

    fn fingerprint(event: &EnrichmentEvent) -> Option<String> {
        serde_json::to_string(event).ok()
    }

    /// 事件对应的积分变动：(用户, 积分, 原因)
    fn awards(&self, event: &EnrichmentEvent) -> Vec<(String, i64, &'static str)> {
        let foreign = !event.is_self_interaction();
        let mut awards = Vec::new();
        match event {
            EnrichmentEvent::Liked { owner_id, .. } if foreign => {
                awards.push((owner_id.clone(), self.rewards.like_received, "like_received"));
            }
            EnrichmentEvent::Unliked { owner_id, .. } if foreign && self.rewards.revoke_on_unlike => {
                awards.push((owner_id.clone(), -self.rewards.like_received, "like_revoked"));
            }
            EnrichmentEvent::Commented {
                actor_id, owner_id, ..
            } => {
                awards.push((actor_id.clone(), self.rewards.comment_written, "comment_written"));
                if foreign {
                    awards.push((owner_id.clone(), self.rewards.comment_received, "comment_received"));
                }
            }
            EnrichmentEvent::PostCreated { author_id, .. } => {
                awards.push((author_id.clone(), self.rewards.post_created, "post_created"));
            }
            EnrichmentEvent::Followed { followee_id, .. } if foreign => {
                awards.push((followee_id.clone(), self.rewards.follow_received, "follow_received"));
            }
            _ => {}
        }
        awards.retain(|(_, amount, _)| *amount != 0);
        awards
    }
}

#[async_trait]
impl EnrichmentHook for RewardPointsHook {
    async fn handle(&self, _ctx: &HookContext, event: &EnrichmentEvent) -> HookOutcome {
        let awards = self.awards(event);
        if awards.is_empty() {
            return HookOutcome::Skipped;
        }
        let fingerprint = Self::fingerprint(event);
        let mut done = fingerprint
            .as_ref()
            .and_then(|key| self.applied.remove(key))
            .map(|(_, done)| done)
            .unwrap_or_default();

        for (user_id, amount, reason) in awards {
            let award = format!("{reason}:{user_id}");
            if done.contains(&award) {
                debug!(user_id = %user_id, reason, "points already awarded, skipping");
                continue;
            }
            match self.repo.add_points(&user_id, amount, reason).await {
                Ok(total) => {
                    debug!(user_id = %user_id, amount, reason, total, "points awarded");
                    done.push(award);
                }
                Err(err) => {
                    if let Some(key) = fingerprint {
                        if !done.is_empty() {
                            self.applied.insert(key, done);
                        }
                    }
                    return HookOutcome::Failed(err);
                }
            }
        }
        HookOutcome::Completed
    }
}

/// 通知 Hook
pub struct NotificationHook {
    repo: Arc<dyn EngagementRepository>,
}

impl NotificationHook {
    pub const NAME: &'static str = "notification";

    pub fn new(repo: Arc<dyn EngagementRepository>) -> Self {
        Self { repo }
    }

    fn display_name(ctx: &HookContext) -> &str {
        ctx.attributes
            .get("username")
            .map(String::as_str)
            .unwrap_or(ctx.actor_id.as_str())
    }

    fn draft(ctx: &HookContext, event: &EnrichmentEvent) -> Option<NotificationDraft> {
        let name = Self::display_name(ctx);
        let (user_id, kind, post_id, message) = match event {
            EnrichmentEvent::Liked {
                owner_id, post_id, ..
            } => (
                owner_id,
                NotificationKind::Like,
                Some(post_id),
                format!("{name} liked your post"),
            ),
            EnrichmentEvent::Commented {
                owner_id,
                post_id,
                excerpt,
                ..
            } => (
                owner_id,
                NotificationKind::Comment,
                Some(post_id),
                format!("{name} commented: {excerpt}"),
            ),
            EnrichmentEvent::Followed { followee_id, .. } => (
                followee_id,
                NotificationKind::Follow,
                None,
                format!("{name} started following you"),
            ),
            EnrichmentEvent::PostPurchased {
                seller_id,
                post_id,
                price,
                ..
            } => (
                seller_id,
                NotificationKind::Purchase,
                Some(post_id),
                format!("{name} unlocked your post for {price} points"),
            ),
            _ => return None,
        };
        Some(NotificationDraft {
            user_id: user_id.clone(),
            actor_id: event.actor_id().to_string(),
            kind,
            post_id: post_id.cloned(),
            message,
        })
    }
}

#[async_trait]
impl EnrichmentHook for NotificationHook {
    async fn handle(&self, ctx: &HookContext, event: &EnrichmentEvent) -> HookOutcome {
        if event.is_self_interaction() {
            return HookOutcome::Skipped;
        }

        let result = match event {
            EnrichmentEvent::Unliked {
                actor_id,
                post_id,
                owner_id,
            } => self
                .repo
                .delete_notification(owner_id, actor_id, NotificationKind::Like, Some(post_id))
                .await
                .map(|_| ()),
            EnrichmentEvent::Unfollowed {
                follower_id,
                followee_id,
            } => self
                .repo
                .delete_notification(followee_id, follower_id, NotificationKind::Follow, None)
                .await
                .map(|_| ()),
            _ => match Self::draft(ctx, event) {
                Some(draft) => self.repo.insert_notification(&draft).await,
                None => return HookOutcome::Skipped,
            },
        };

        match result {
            Ok(()) => HookOutcome::Completed,
            Err(err) => HookOutcome::Failed(err),
        }
    }
}
