//! Pub/sub routing keys for change notifications.

use crate::entity::EntityKind;
use std::fmt;

/// Name of a change-notification channel.
///
/// Channels carry no persisted state; the name is purely a routing key:
/// - `changed<user_id>` carries the name of whichever kind changed for a user
/// - `<kind><user_id>` carries a hint for one kind of one user
/// - `<kind>` is the user-independent channel of a cache-relevant kind,
///   e.g. `definitions` whenever a definition is (re)computed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// The per-user channel that announces every change for `user_id`.
    pub fn changed(user_id: &str) -> Self {
        Self(format!("changed{user_id}"))
    }

    /// The per-user channel for a single entity kind.
    pub fn for_user(kind: EntityKind, user_id: &str) -> Self {
        Self(format!("{}{user_id}", kind.as_str()))
    }

    /// The user-independent channel of a cache-relevant entity kind.
    pub fn for_kind(kind: EntityKind) -> Self {
        Self(kind.as_str().to_string())
    }

    /// Returns the channel name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        assert_eq!(ChannelName::changed("42").as_str(), "changed42");
        assert_eq!(
            ChannelName::for_user(EntityKind::Cards, "42").as_str(),
            "cards42"
        );
        assert_eq!(
            ChannelName::for_kind(EntityKind::Definitions).as_str(),
            "definitions"
        );
    }
}
