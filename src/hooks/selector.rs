use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{EnrichmentEvent, HookContext};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MatchRule {
    #[default]
    Any,
    Exact { values: HashSet<String> },
}

impl MatchRule {
    pub fn any() -> Self {
        MatchRule::Any
    }

    pub fn of<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        MatchRule::Exact {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            MatchRule::Any => true,
            MatchRule::Exact { values } => value.map(|val| values.contains(val)).unwrap_or(false),
        }
    }
}

/// 按事件类型与操作者筛选 Hook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookSelector {
    #[serde(default)]
    pub events: MatchRule,
    #[serde(default)]
    pub actors: MatchRule,
}

impl HookSelector {
    pub fn for_events<I, T>(events: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            events: MatchRule::of(events),
            actors: MatchRule::Any,
        }
    }

    pub fn matches(&self, ctx: &HookContext, event: &EnrichmentEvent) -> bool {
        self.events.matches(Some(event.kind())) && self.actors.matches(Some(ctx.actor_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_filters_by_event_kind() {
        let selector = HookSelector::for_events(["liked", "commented"]);
        let ctx = HookContext::new("u1");
        let liked = EnrichmentEvent::Liked {
            actor_id: "u1".into(),
            post_id: "p1".into(),
            owner_id: "u2".into(),
        };
        let created = EnrichmentEvent::PostCreated {
            author_id: "u1".into(),
            post_id: "p1".into(),
        };
        assert!(selector.matches(&ctx, &liked));
        assert!(!selector.matches(&ctx, &created));
        assert!(HookSelector::default().matches(&ctx, &created));
    }
}
