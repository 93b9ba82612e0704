// File: modlogs-core/src/platforms/twitch_eventsub/events.rs

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use modlogs_common::models::{ModerationAction, ModerationEvent};

/// Callback envelope shared by every webhook message type.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(default)]
    pub challenge: Option<String>,
    pub subscription: SubscriptionInfo,
    #[serde(default)]
    pub event: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl SubscriptionInfo {
    pub const AUTHORIZATION_REVOKED: &'static str = "authorization_revoked";

    pub fn is_authorization_revoked(&self) -> bool {
        self.status == Self::AUTHORIZATION_REVOKED
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unsupported event type: {0}")]
    UnsupportedType(String),

    #[error("malformed {kind} event: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing ends_at on a non-permanent ban")]
    MissingEndsAt,

    #[error("invalid ends_at timestamp: {0}")]
    InvalidEndsAt(String),
}

/// "channel.ban" event
#[derive(Debug, Clone, Deserialize)]
struct ChannelBan {
    broadcaster_user_name: String,
    user_name: String,
    reason: String,
    moderator_user_name: String,
    moderator_user_id: String,
    #[serde(default)]
    is_permanent: Option<bool>,
    #[serde(default)]
    ends_at: Option<String>,
}

/// "channel.unban" event
#[derive(Debug, Clone, Deserialize)]
struct ChannelUnban {
    broadcaster_user_name: String,
    user_name: String,
    moderator_user_name: String,
    moderator_user_id: String,
}

/// "channel.moderator.add" / "channel.moderator.remove" event
#[derive(Debug, Clone, Deserialize)]
struct ChannelModerator {
    broadcaster_user_name: String,
    user_name: String,
}

fn parse_event<T: DeserializeOwned>(
    action: ModerationAction,
    event: &serde_json::Value,
) -> Result<T, NormalizeError> {
    T::deserialize(event).map_err(|source| NormalizeError::Malformed {
        kind: action.event_type(),
        source,
    })
}

/// Builds the canonical event from a data notification.
///
/// `kind` is the subscription type, `streamer_id` the path
/// segment the delivery arrived on and `created_at` the verified message
/// timestamp.
pub fn normalize(
    kind: &str,
    streamer_id: &str,
    created_at: DateTime<Utc>,
    event: &serde_json::Value,
) -> Result<ModerationEvent, NormalizeError> {
    let action: ModerationAction = kind
        .parse()
        .map_err(|_| NormalizeError::UnsupportedType(kind.to_string()))?;

    let base = |broadcaster_name: String, target_user_name: String| ModerationEvent {
        broadcaster_id: streamer_id.to_string(),
        broadcaster_name,
        moderator_id: None,
        moderator_name: None,
        target_user_name,
        reason: None,
        action,
        expires_at: None,
        created_at,
    };

    match action {
        ModerationAction::Ban => {
            let ev: ChannelBan = parse_event(action, event)?;
            let expires_at = match ev.is_permanent {
                Some(false) => {
                    let raw = ev.ends_at.as_deref().ok_or(NormalizeError::MissingEndsAt)?;
                    let parsed = DateTime::parse_from_rfc3339(raw)
                        .map_err(|_| NormalizeError::InvalidEndsAt(raw.to_string()))?;
                    Some(parsed.with_timezone(&Utc))
                }
                _ => None,
            };
            Ok(ModerationEvent {
                moderator_id: Some(ev.moderator_user_id),
                moderator_name: Some(ev.moderator_user_name),
                reason: Some(ev.reason),
                expires_at,
                ..base(ev.broadcaster_user_name, ev.user_name)
            })
        }
        ModerationAction::Unban => {
            let ev: ChannelUnban = parse_event(action, event)?;
            Ok(ModerationEvent {
                moderator_id: Some(ev.moderator_user_id),
                moderator_name: Some(ev.moderator_user_name),
                ..base(ev.broadcaster_user_name, ev.user_name)
            })
        }
        ModerationAction::ModeratorAdd | ModerationAction::ModeratorRemove => {
            let ev: ChannelModerator = parse_event(action, event)?;
            Ok(base(ev.broadcaster_user_name, ev.user_name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ban_payload() -> serde_json::Value {
        json!({
            "user_id": "1234",
            "user_login": "cool_user",
            "user_name": "Cool_User",
            "broadcaster_user_id": "1337",
            "broadcaster_user_login": "cooler_user",
            "broadcaster_user_name": "Cooler_User",
            "moderator_user_id": "1339",
            "moderator_user_login": "mod_user",
            "moderator_user_name": "Mod_User",
            "reason": "Offensive language",
            "banned_at": "2024-05-01T12:00:00Z",
            "ends_at": "2024-05-01T12:10:00Z",
            "is_permanent": false
        })
    }

    #[test]
    fn test_timeout_is_normalized_with_expiry() {
        let ev = normalize("channel.ban", "1337", created_at(), &ban_payload()).unwrap();
        assert_eq!(ev.action, ModerationAction::Ban);
        assert_eq!(ev.broadcaster_name, "Cooler_User");
        assert_eq!(ev.target_user_name, "Cool_User");
        assert_eq!(ev.moderator_id.as_deref(), Some("1339"));
        assert_eq!(ev.reason.as_deref(), Some("Offensive language"));
        assert_eq!(ev.timeout_seconds(), Some(601));
        assert_eq!(ev.created_at, created_at());
    }

    #[test]
    fn test_permanent_ban_ignores_ends_at() {
        let mut payload = ban_payload();
        payload["is_permanent"] = json!(true);
        payload["ends_at"] = serde_json::Value::Null;
        let ev = normalize("channel.ban", "1337", created_at(), &payload).unwrap();
        assert!(ev.expires_at.is_none());
    }

    #[test]
    fn test_missing_moderator_name_is_rejected() {
        let mut payload = ban_payload();
        payload.as_object_mut().unwrap().remove("moderator_user_name");
        let err = normalize("channel.ban", "1337", created_at(), &payload).unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed { kind: "channel.ban", .. }));
    }

    #[test]
    fn test_timeout_without_ends_at_is_rejected() {
        let mut payload = ban_payload();
        payload.as_object_mut().unwrap().remove("ends_at");
        let err = normalize("channel.ban", "1337", created_at(), &payload).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingEndsAt));
    }

    #[test]
    fn test_moderator_events_need_only_names() {
        let payload = json!({"broadcaster_user_name": "Streamer", "user_name": "NewMod"});
        let ev = normalize("channel.moderator.add", "77", created_at(), &payload).unwrap();
        assert_eq!(ev.action, ModerationAction::ModeratorAdd);
        assert_eq!(ev.acting_user_id(), "77");
        assert_eq!(ev.acting_user_name(), "Streamer");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = normalize("channel.follow", "77", created_at(), &json!({})).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedType(_)));
    }
}
