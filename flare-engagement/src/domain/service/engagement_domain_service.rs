use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use flare_social_core::backend::{Counter, PurchaseRequest, format_timestamp};
use flare_social_core::config::FlareSocialConfig;
use flare_social_core::gamification::level_progress;
use flare_social_core::hooks::{EnrichmentEvent, HookContext, HookDispatcher};
use flare_social_core::metrics::METRICS;
use flare_social_core::optimistic::{
    AppendController, AppendOutcome, InFlightRegistry, ToggleController, ToggleOutcome,
    ToggleState, ViewCell,
};
use flare_social_core::session::{AuthSession, SessionContext};
use flare_social_core::utils::{excerpt, extract_hashtags, new_temp_id};
use flare_social_core::{ErrorCode, FlareError, Result, ensure_valid};

use crate::domain::model::{
    AuthorSnapshot, Comment, CommentDraft, FeedItem, ImageUpload, PointTransaction, Post,
    PostDraft, PostRef, PremiumAccess, PremiumPostRef, ProfileView, PurchaseOutcome,
};
use crate::domain::repository::EngagementRepository;

/// 通知与事件中保留的评论摘要长度
const EXCERPT_CHARS: usize = 80;

/// 互动领域配置
#[derive(Debug, Clone)]
pub struct EngagementDomainConfig {
    pub media_bucket: String,
    pub page_size: usize,
}

impl EngagementDomainConfig {
    pub fn from_app_config(config: &FlareSocialConfig) -> Self {
        Self {
            media_bucket: config.media_bucket(),
            page_size: config.feed.page_size.max(1),
        }
    }
}

impl Default for EngagementDomainConfig {
    fn default() -> Self {
        Self::from_app_config(&FlareSocialConfig::default())
    }
}

/// 互动领域服务
///
/// 点赞、关注、评论、付费解锁与发帖。主操作走乐观变更控制器，
/// 成功后把积分与通知交给增强调度器，增强失败不会影响主操作结果。
pub struct EngagementDomainService {
    repo: Arc<dyn EngagementRepository>,
    session: Arc<SessionContext>,
    enrichment: HookDispatcher,
    likes: ToggleController,
    follows: ToggleController,
    comments: AppendController,
    purchases: Arc<InFlightRegistry>,
    config: EngagementDomainConfig,
}

impl EngagementDomainService {
    pub fn new(
        repo: Arc<dyn EngagementRepository>,
        session: Arc<SessionContext>,
        enrichment: HookDispatcher,
        config: EngagementDomainConfig,
    ) -> Self {
        Self {
            repo,
            session,
            enrichment,
            likes: ToggleController::new("like"),
            follows: ToggleController::new("follow"),
            comments: AppendController::new("comment"),
            purchases: InFlightRegistry::new(),
            config,
        }
    }

    pub fn enrichment(&self) -> &HookDispatcher {
        &self.enrichment
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// 点赞 / 取消点赞
    pub async fn toggle_like(
        &self,
        post: &PostRef,
        state: &ViewCell<ToggleState>,
    ) -> Result<ToggleOutcome> {
        let viewer = self.session.current().await?;
        let key = format!("like:{}", post.id);

        let outcome = self
            .likes
            .toggle(&key, state, |target| {
                self.write_like(&post.id, &viewer.user_id, target.active)
            })
            .await?;

        if let ToggleOutcome::Applied(confirmed) = outcome {
            let event = if confirmed.active {
                EnrichmentEvent::Liked {
                    actor_id: viewer.user_id.clone(),
                    post_id: post.id.clone(),
                    owner_id: post.owner_id.clone(),
                }
            } else {
                EnrichmentEvent::Unliked {
                    actor_id: viewer.user_id.clone(),
                    post_id: post.id.clone(),
                    owner_id: post.owner_id.clone(),
                }
            };
            self.enrich(&viewer, event).await;
        }
        Ok(outcome)
    }

    async fn write_like(&self, post_id: &str, user_id: &str, active: bool) -> Result<Option<u64>> {
        if active {
            self.repo.insert_like(post_id, user_id).await?;
            match self.repo.adjust_counter(Counter::PostLikes, post_id, 1).await {
                Ok(count) => Ok(Some(count.max(0) as u64)),
                Err(err) => {
                    if let Err(undo) = self.repo.delete_like(post_id, user_id).await {
                        warn!(post_id, user_id, error = %undo, "compensating like delete failed");
                    }
                    Err(err)
                }
            }
        } else {
            self.repo.delete_like(post_id, user_id).await?;
            match self.repo.adjust_counter(Counter::PostLikes, post_id, -1).await {
                Ok(count) => Ok(Some(count.max(0) as u64)),
                Err(err) => {
                    if let Err(undo) = self.repo.insert_like(post_id, user_id).await {
                        warn!(post_id, user_id, error = %undo, "compensating like insert failed");
                    }
                    Err(err)
                }
            }
        }
    }

    /// 关注 / 取消关注
    pub async fn toggle_follow(
        &self,
        profile_id: &str,
        state: &ViewCell<ToggleState>,
    ) -> Result<ToggleOutcome> {
        let viewer = self.session.current().await?;
        ensure_valid!(viewer.user_id != profile_id, "cannot follow yourself");
        let key = format!("follow:{profile_id}");

        let outcome = self
            .follows
            .toggle(&key, state, |target| {
                self.write_follow(&viewer.user_id, profile_id, target.active)
            })
            .await?;

        if let ToggleOutcome::Applied(confirmed) = outcome {
            let delta = if confirmed.active { 1 } else { -1 };
            if let Err(err) = self
                .repo
                .adjust_counter(Counter::ProfileFollowing, &viewer.user_id, delta)
                .await
            {
                warn!(user_id = %viewer.user_id, error = %err, "following counter update failed");
            }

            let event = if confirmed.active {
                EnrichmentEvent::Followed {
                    follower_id: viewer.user_id.clone(),
                    followee_id: profile_id.to_string(),
                }
            } else {
                EnrichmentEvent::Unfollowed {
                    follower_id: viewer.user_id.clone(),
                    followee_id: profile_id.to_string(),
                }
            };
            self.enrich(&viewer, event).await;
        }
        Ok(outcome)
    }

    async fn write_follow(
        &self,
        follower_id: &str,
        following_id: &str,
        active: bool,
    ) -> Result<Option<u64>> {
        let delta = if active {
            self.repo.insert_follow(follower_id, following_id).await?;
            1
        } else {
            self.repo.delete_follow(follower_id, following_id).await?;
            -1
        };
        match self
            .repo
            .adjust_counter(Counter::ProfileFollowers, following_id, delta)
            .await
        {
            Ok(count) => Ok(Some(count.max(0) as u64)),
            Err(err) => {
                let undo = if active {
                    self.repo.delete_follow(follower_id, following_id).await.map(|_| ())
                } else {
                    self.repo.insert_follow(follower_id, following_id).await
                };
                if let Err(undo) = undo {
                    warn!(follower_id, following_id, error = %undo, "compensating follow write failed");
                }
                Err(err)
            }
        }
    }

    /// 发表评论
    pub async fn comment(
        &self,
        post: &PostRef,
        content: &str,
        list: &ViewCell<Vec<Comment>>,
    ) -> Result<AppendOutcome<Comment>> {
        let content = content.trim();
        ensure_valid!(!content.is_empty(), "comment cannot be empty");
        let viewer = self.session.current().await?;
        let hashtags = extract_hashtags(content);
        let author = AuthorSnapshot::from(&viewer);

        let provisional = Comment {
            id: new_temp_id(),
            post_id: post.id.clone(),
            user_id: viewer.user_id.clone(),
            content: content.to_string(),
            hashtags: hashtags.clone(),
            created_at: Some(format_timestamp(Utc::now())),
            author: Some(author.clone()),
        };
        let draft = CommentDraft {
            post_id: post.id.clone(),
            user_id: viewer.user_id.clone(),
            content: content.to_string(),
            hashtags,
        };

        let key = format!("comment:{}", post.id);
        let outcome = self
            .comments
            .append(&key, list, provisional, |_| async {
                let mut saved = self.repo.insert_comment(&draft).await?;
                if saved.author.is_none() {
                    saved.author = Some(author.clone());
                }
                Ok(saved)
            })
            .await?;

        if let AppendOutcome::Confirmed(saved) = &outcome {
            if let Err(err) = self
                .repo
                .adjust_counter(Counter::PostComments, &post.id, 1)
                .await
            {
                warn!(post_id = %post.id, error = %err, "comments counter update failed");
            }
            self.enrich(
                &viewer,
                EnrichmentEvent::Commented {
                    actor_id: viewer.user_id.clone(),
                    post_id: post.id.clone(),
                    owner_id: post.owner_id.clone(),
                    comment_id: saved.id.clone(),
                    excerpt: excerpt(&saved.content, EXCERPT_CHARS),
                },
            )
            .await;
        }
        Ok(outcome)
    }

    /// 用积分解锁付费帖子
    ///
    /// 自购、重复解锁与余额不足在任何远程调用之前拒绝。通过校验后先在视图中
    /// 标记解锁并扣除余额，购买事务失败或返回 `success = false` 时恢复。
    pub async fn purchase(
        &self,
        post: &PremiumPostRef,
        access: &ViewCell<PremiumAccess>,
    ) -> Result<PurchaseOutcome> {
        let viewer = self.session.current().await?;
        ensure_valid!(viewer.user_id != post.owner_id, "cannot purchase your own post");
        ensure_valid!(post.price > 0, "post has no price");

        let previous = access.snapshot().await;
        if previous.unlocked {
            return Err(FlareError::new(
                ErrorCode::AlreadyExists,
                "post already unlocked",
            ));
        }
        if previous.balance < post.price {
            debug!(post_id = %post.id, balance = previous.balance, price = post.price, "purchase rejected locally");
            METRICS.record_mutation("purchase", "rejected");
            return Err(FlareError::new(
                ErrorCode::InsufficientPoints,
                format!(
                    "insufficient points: balance {}, price {}",
                    previous.balance, post.price
                ),
            ));
        }

        let key = format!("purchase:{}", post.id);
        let Some(_guard) = self.purchases.try_acquire(&key) else {
            debug!(key = %key, "purchase ignored, already in flight");
            METRICS.record_mutation("purchase", "skipped");
            return Ok(PurchaseOutcome::Skipped);
        };

        let predicted = PremiumAccess {
            unlocked: true,
            balance: previous.balance - post.price,
        };
        access.set(predicted).await;

        let request = PurchaseRequest {
            buyer_id: viewer.user_id.clone(),
            seller_id: post.owner_id.clone(),
            post_id: post.id.clone(),
            price: post.price,
        };
        let failure = match self.repo.purchase(&request).await {
            Ok(receipt) if receipt.success => {
                let balance = receipt.buyer_balance.unwrap_or(predicted.balance);
                access
                    .set(PremiumAccess {
                        unlocked: true,
                        balance,
                    })
                    .await;
                self.session.update_points(balance).await;
                METRICS.record_mutation("purchase", "applied");
                info!(post_id = %post.id, buyer_id = %viewer.user_id, price = post.price, balance, "premium post unlocked");

                self.enrich(
                    &viewer,
                    EnrichmentEvent::PostPurchased {
                        buyer_id: viewer.user_id.clone(),
                        seller_id: post.owner_id.clone(),
                        post_id: post.id.clone(),
                        price: post.price,
                    },
                )
                .await;
                return Ok(PurchaseOutcome::Unlocked { balance });
            }
            Ok(receipt) => FlareError::new(ErrorCode::ProcedureFailed, receipt.message),
            Err(err) => err,
        };

        access.set(previous).await;
        METRICS.record_mutation("purchase", "rolled_back");
        warn!(post_id = %post.id, error = %failure, "purchase failed, unlock rolled back");
        Err(failure)
    }

    /// 发帖（可附带图片）
    pub async fn create_post(
        &self,
        content: &str,
        image: Option<ImageUpload>,
        price: Option<i64>,
    ) -> Result<Post> {
        let viewer = self.session.current().await?;
        let content = content.trim();
        ensure_valid!(
            !content.is_empty() || image.is_some(),
            "post must have text or an image"
        );
        if let Some(price) = price {
            ensure_valid!(price > 0, "premium price must be positive");
        }

        let image_url = match image {
            Some(image) => Some(
                self.repo
                    .upload_image(&self.config.media_bucket, &viewer.user_id, image)
                    .await?,
            ),
            None => None,
        };

        let draft = PostDraft {
            user_id: viewer.user_id.clone(),
            content: content.to_string(),
            image_url,
            hashtags: extract_hashtags(content),
            is_premium: price.is_some(),
            price: price.unwrap_or(0),
        };
        let mut post = self.repo.insert_post(&draft).await?;
        post.author = Some(AuthorSnapshot::from(&viewer));
        info!(post_id = %post.id, user_id = %viewer.user_id, premium = post.is_premium, "post created");

        self.enrich(
            &viewer,
            EnrichmentEvent::PostCreated {
                author_id: viewer.user_id.clone(),
                post_id: post.id.clone(),
            },
        )
        .await;
        Ok(post)
    }

    /// 信息流分页，附带当前用户的点赞与解锁状态
    pub async fn feed(&self, page: usize) -> Result<Vec<FeedItem>> {
        let viewer = self.session.current().await?;
        let posts = self.repo.feed_page(page, self.config.page_size).await?;
        Ok(self.decorate(&viewer, posts).await)
    }

    /// 按话题标签搜索帖子
    pub async fn search_hashtag(&self, tag: &str) -> Result<Vec<FeedItem>> {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        ensure_valid!(!tag.is_empty(), "hashtag cannot be empty");
        let viewer = self.session.current().await?;
        let posts = self.repo.search_posts(&format!("%#{tag}%")).await?;
        let posts = posts
            .into_iter()
            .filter(|post| post.hashtags.is_empty() || post.hashtags.contains(&tag))
            .collect();
        Ok(self.decorate(&viewer, posts).await)
    }

    async fn decorate(&self, viewer: &AuthSession, posts: Vec<Post>) -> Vec<FeedItem> {
        let ids: Vec<String> = posts.iter().map(|post| post.id.clone()).collect();
        let (liked, purchased) = futures::join!(
            self.repo.liked_post_ids(&viewer.user_id, &ids),
            self.repo.purchased_post_ids(&viewer.user_id, &ids),
        );
        let liked = liked.unwrap_or_else(|err| {
            warn!(user_id = %viewer.user_id, error = %err, "like status unavailable, defaulting to not liked");
            HashSet::new()
        });
        let purchased = purchased.unwrap_or_else(|err| {
            warn!(user_id = %viewer.user_id, error = %err, "purchase status unavailable");
            HashSet::new()
        });

        posts
            .into_iter()
            .map(|post| {
                let unlocked = !post.is_premium
                    || post.user_id == viewer.user_id
                    || purchased.contains(&post.id);
                FeedItem {
                    liked: liked.contains(&post.id),
                    unlocked,
                    post,
                }
            })
            .collect()
    }

    pub async fn comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.repo.list_comments(post_id).await
    }

    /// 当前用户是否点赞了帖子；无法确认时视为未点赞
    pub async fn like_status(&self, post_id: &str) -> Result<bool> {
        let viewer = self.session.current().await?;
        match self.repo.has_liked(post_id, &viewer.user_id).await {
            Ok(liked) => Ok(liked),
            Err(err) => {
                warn!(post_id, error = %err, "like status unavailable, defaulting to not liked");
                Ok(false)
            }
        }
    }

    /// 资料页：资料 + 等级进度 + 关注状态
    pub async fn profile(&self, user_id: &str) -> Result<ProfileView> {
        let viewer = self.session.current().await?;
        let profile = self.repo.get_profile(user_id).await?.ok_or_else(|| {
            FlareError::new(ErrorCode::NotFound, format!("profile {user_id} not found"))
        })?;

        let is_following = if viewer.user_id == user_id {
            false
        } else {
            self.repo
                .is_following(&viewer.user_id, user_id)
                .await
                .unwrap_or_else(|err| {
                    warn!(user_id, error = %err, "follow status unavailable");
                    false
                })
        };

        if viewer.user_id == user_id && viewer.points != profile.points {
            self.session.update_points(profile.points).await;
        }

        Ok(ProfileView {
            level: level_progress(profile.points),
            is_following,
            profile,
        })
    }

    /// 当前用户的积分流水
    pub async fn point_history(&self, limit: usize) -> Result<Vec<PointTransaction>> {
        let viewer = self.session.current().await?;
        self.repo.point_history(&viewer.user_id, limit.max(1)).await
    }

    async fn enrich(&self, viewer: &AuthSession, event: EnrichmentEvent) {
        let ctx = HookContext::new(viewer.user_id.clone())
            .with_attribute("username", viewer.username.clone());
        if let Some(report) = self.enrichment.enrich(ctx, event).await {
            debug!(
                completed = report.completed.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                queued = report.queued,
                "enrichment dispatched"
            );
        }
    }
}
