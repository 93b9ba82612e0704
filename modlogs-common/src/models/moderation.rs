// File: modlogs-common/src/models/moderation.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four moderation event types the relay subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModerationAction {
    #[serde(rename = "channel.ban")]
    Ban,
    #[serde(rename = "channel.unban")]
    Unban,
    #[serde(rename = "channel.moderator.add")]
    ModeratorAdd,
    #[serde(rename = "channel.moderator.remove")]
    ModeratorRemove,
}

impl ModerationAction {
    pub const ALL: [ModerationAction; 4] = [
        ModerationAction::Ban,
        ModerationAction::Unban,
        ModerationAction::ModeratorAdd,
        ModerationAction::ModeratorRemove,
    ];

    /// Subscription version requested for every type.
    pub const VERSION: &'static str = "1";

    pub fn event_type(self) -> &'static str {
        match self {
            ModerationAction::Ban => "channel.ban",
            ModerationAction::Unban => "channel.unban",
            ModerationAction::ModeratorAdd => "channel.moderator.add",
            ModerationAction::ModeratorRemove => "channel.moderator.remove",
        }
    }
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

impl FromStr for ModerationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModerationAction::ALL
            .into_iter()
            .find(|a| a.event_type() == s)
            .ok_or_else(|| format!("unsupported event type: {s}"))
    }
}

/// Canonical moderation event, independent of the provider payload shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationEvent {
    pub broadcaster_id: String,
    pub broadcaster_name: String,
    pub moderator_id: Option<String>,
    pub moderator_name: Option<String>,
    pub target_user_name: String,
    pub reason: Option<String>,
    pub action: ModerationAction,
    /// Set only for timeouts.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ModerationEvent {
    /// Id of whoever performed the action: the moderator when known,
    /// otherwise the broadcaster.
    pub fn acting_user_id(&self) -> &str {
        self.moderator_id.as_deref().unwrap_or(&self.broadcaster_id)
    }

    pub fn acting_user_name(&self) -> &str {
        self.moderator_name.as_deref().unwrap_or(&self.broadcaster_name)
    }

    pub fn is_timeout(&self) -> bool {
        self.action == ModerationAction::Ban && self.expires_at.is_some()
    }

    /// Timeout length in whole seconds, rounded up, plus one.
    pub fn timeout_seconds(&self) -> Option<i64> {
        let expires_at = self.expires_at?;
        let millis = (expires_at - self.created_at).num_milliseconds();
        let secs = millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) != 0);
        Some(secs + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn event(expires_in_ms: Option<i64>) -> ModerationEvent {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ModerationEvent {
            broadcaster_id: "1".into(),
            broadcaster_name: "streamer".into(),
            moderator_id: None,
            moderator_name: None,
            target_user_name: "troll".into(),
            reason: None,
            action: ModerationAction::Ban,
            expires_at: expires_in_ms.map(|ms| created_at + Duration::milliseconds(ms)),
            created_at,
        }
    }

    #[test]
    fn test_event_type_round_trip() {
        for action in ModerationAction::ALL {
            assert_eq!(action.event_type().parse::<ModerationAction>(), Ok(action));
        }
        assert!("channel.follow".parse::<ModerationAction>().is_err());
    }

    #[test]
    fn test_timeout_seconds_adds_one() {
        assert_eq!(event(Some(600_000)).timeout_seconds(), Some(601));
    }

    #[test]
    fn test_timeout_seconds_rounds_up_fractions() {
        assert_eq!(event(Some(599_200)).timeout_seconds(), Some(601));
    }

    #[test]
    fn test_permanent_ban_has_no_duration() {
        let ev = event(None);
        assert!(!ev.is_timeout());
        assert_eq!(ev.timeout_seconds(), None);
    }

    #[test]
    fn test_acting_user_falls_back_to_broadcaster() {
        let mut ev = event(None);
        assert_eq!(ev.acting_user_id(), "1");
        ev.moderator_id = Some("42".into());
        ev.moderator_name = Some("mod".into());
        assert_eq!(ev.acting_user_id(), "42");
        assert_eq!(ev.acting_user_name(), "mod");
    }
}
