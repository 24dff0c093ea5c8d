use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use flare_social_core::optimistic::ListEntity;
use flare_social_core::realtime::Keyed;
use flare_social_core::utils::parse_timestamp;

mod screen;

pub use screen::{ChatScreen, InboxScreen, NotificationCenter};

/// 比较两个服务端时间戳；无法解析时按字符串比较，缺失视为最旧
pub fn compare_timestamps(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (parse_timestamp(a), parse_timestamp(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a.cmp(b),
        },
    }
}

/// 私信
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    /// 发送端生成的临时 ID，用于把实时事件与本地临时消息对应起来
    #[serde(default)]
    pub client_ref: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(skip)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// 用服务端的新版本覆盖可变字段，保留本地聚合的表情回应
    pub fn absorb(&mut self, newer: Message) {
        let reactions = std::mem::take(&mut self.reactions);
        *self = newer;
        self.reactions = reactions;
    }
}

impl Keyed for Message {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl ListEntity for Message {
    fn reconciles(&self, provisional: &Self) -> bool {
        match (&self.client_ref, &provisional.client_ref) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => {
                self.conversation_id == provisional.conversation_id
                    && self.sender_id == provisional.sender_id
                    && self.content == provisional.content
            }
        }
    }
}

/// 消息的表情回应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Keyed for Reaction {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// 新消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub client_ref: String,
}

/// 一对一会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participant1_id: String,
    pub participant2_id: String,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Conversation {
    pub fn involves(&self, user_id: &str) -> bool {
        self.participant1_id == user_id || self.participant2_id == user_id
    }

    /// 对方参与者
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        if self.participant1_id == user_id {
            Some(&self.participant2_id)
        } else if self.participant2_id == user_id {
            Some(&self.participant1_id)
        } else {
            None
        }
    }

    /// 排序用的最近活动时间
    pub fn last_activity(&self) -> Option<&str> {
        self.last_message_at.as_deref().or(self.created_at.as_deref())
    }
}

/// 对方资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 收件箱中的会话摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub peer_id: String,
    pub peer: Option<PeerProfile>,
    /// 发给当前用户且未读的消息
    pub unread: HashSet<String>,
}

impl ConversationSummary {
    pub fn new(conversation: Conversation, viewer_id: &str) -> Option<Self> {
        let peer_id = conversation.peer_of(viewer_id)?.to_string();
        Some(Self {
            conversation,
            peer_id,
            peer: None,
            unread: HashSet::new(),
        })
    }

    pub fn unread_count(&self) -> usize {
        self.unread.len()
    }

    pub fn last_activity(&self) -> Option<&str> {
        self.conversation.last_activity()
    }
}

impl Keyed for ConversationSummary {
    fn entity_id(&self) -> &str {
        &self.conversation.id
    }
}

/// 按最近活动时间倒序排列
pub fn sort_by_recency(list: &mut [ConversationSummary]) {
    list.sort_by(|a, b| compare_timestamps(b.last_activity(), a.last_activity()));
}

/// 通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Keyed for Notification {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// 最新的通知在前
pub fn sort_newest_first(list: &mut [Notification]) {
    list.sort_by(|a, b| compare_timestamps(b.created_at.as_deref(), a.created_at.as_deref()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(id: &str, at: Option<&str>) -> ConversationSummary {
        ConversationSummary::new(
            Conversation {
                id: id.into(),
                participant1_id: "u1".into(),
                participant2_id: "u2".into(),
                last_message: None,
                last_message_at: at.map(str::to_string),
                created_at: None,
            },
            "u1",
        )
        .unwrap()
    }

    #[test]
    fn test_recency_sort_puts_missing_timestamps_last() {
        let mut list = vec![
            conversation("a", Some("2024-05-01T10:00:00.000000Z")),
            conversation("b", None),
            conversation("c", Some("2024-05-02T10:00:00.000000Z")),
        ];
        sort_by_recency(&mut list);
        let ids: Vec<&str> = list.iter().map(|c| c.entity_id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(list[0].peer_id, "u2");
    }

    #[test]
    fn test_message_reconciles_by_client_ref() {
        let provisional = Message {
            id: "temp-1".into(),
            conversation_id: "c1".into(),
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
            content: "hey".into(),
            read: false,
            client_ref: Some("temp-1".into()),
            created_at: None,
            updated_at: None,
            reactions: vec![],
        };
        let mut confirmed = provisional.clone();
        confirmed.id = "m1".into();
        assert!(confirmed.reconciles(&provisional));

        confirmed.client_ref = Some("temp-2".into());
        assert!(!confirmed.reconciles(&provisional));
    }
}
