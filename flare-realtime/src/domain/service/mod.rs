pub mod chat_domain_service;
pub mod chat_feed;
pub mod inbox_feed;
pub mod notification_domain_service;
pub mod notification_feed;

use serde::de::DeserializeOwned;
use tracing::warn;

use flare_social_core::backend::{Row, from_row};

pub use chat_domain_service::ChatDomainService;
pub use chat_feed::ChatFeed;
pub use inbox_feed::InboxFeed;
pub use notification_domain_service::NotificationDomainService;
pub use notification_feed::NotificationFeed;

pub(crate) const MESSAGES: &str = "messages";
pub(crate) const REACTIONS: &str = "message_reactions";
pub(crate) const CONVERSATIONS: &str = "conversations";
pub(crate) const NOTIFICATIONS: &str = "notifications";

/// 解析事件行；格式不符的事件只记录日志并丢弃
pub(crate) fn decode<T: DeserializeOwned>(row: Option<&Row>) -> Option<T> {
    let row = row?.clone();
    match from_row(row) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, "malformed realtime row dropped");
            None
        }
    }
}
