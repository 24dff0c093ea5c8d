/// 打开会话查询：加载历史并开始实时同步
#[derive(Debug, Clone)]
pub struct OpenChatQuery {
    pub conversation_id: String,
}
