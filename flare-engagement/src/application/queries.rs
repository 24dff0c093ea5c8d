/// 信息流查询
#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub page: usize,
}

/// 话题标签搜索
#[derive(Debug, Clone)]
pub struct HashtagQuery {
    pub tag: String,
}

/// 评论列表查询
#[derive(Debug, Clone)]
pub struct CommentsQuery {
    pub post_id: String,
}

/// 点赞状态查询
#[derive(Debug, Clone)]
pub struct LikeStatusQuery {
    pub post_id: String,
}

/// 资料页查询
#[derive(Debug, Clone)]
pub struct ProfileQuery {
    pub user_id: String,
}

/// 积分流水查询
#[derive(Debug, Clone)]
pub struct PointHistoryQuery {
    pub limit: usize,
}
