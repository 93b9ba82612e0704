// File: modlogs-core/src/services/authorization.rs

/// The parts of a guild the permission check looks at.
#[derive(Debug, Clone, Default)]
pub struct GuildSnapshot {
    pub owner_id: String,
    pub roles: Vec<RoleSnapshot>,
}

#[derive(Debug, Clone)]
pub struct RoleSnapshot {
    pub id: String,
    /// Carries the Administrator permission.
    pub administrator: bool,
}

/// Whether `actor_id` may manage hooks in the guild: the owner, a configured
/// global admin, or a member holding an Administrator role.
pub fn is_authorized(
    actor_id: &str,
    guild: &GuildSnapshot,
    member_role_ids: &[String],
    admins: &[String],
) -> bool {
    if actor_id == guild.owner_id {
        return true;
    }
    if admins.iter().any(|a| a == actor_id) {
        return true;
    }
    guild
        .roles
        .iter()
        .filter(|r| r.administrator)
        .any(|r| member_role_ids.iter().any(|m| *m == r.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild() -> GuildSnapshot {
        GuildSnapshot {
            owner_id: "owner".into(),
            roles: vec![
                RoleSnapshot {
                    id: "r-admin".into(),
                    administrator: true,
                },
                RoleSnapshot {
                    id: "r-mod".into(),
                    administrator: false,
                },
            ],
        }
    }

    #[test]
    fn test_owner_is_authorized() {
        assert!(is_authorized("owner", &guild(), &[], &[]));
    }

    #[test]
    fn test_global_admin_is_authorized() {
        assert!(is_authorized("someone", &guild(), &[], &["someone".to_string()]));
    }

    #[test]
    fn test_administrator_role_is_required() {
        let g = guild();
        assert!(is_authorized("member", &g, &["r-admin".to_string()], &[]));
        assert!(!is_authorized("member", &g, &["r-mod".to_string()], &[]));
        assert!(!is_authorized("member", &g, &[], &[]));
    }

    #[test]
    fn test_unknown_role_ids_are_ignored() {
        assert!(!is_authorized("member", &guild(), &["r-gone".to_string()], &[]));
    }
}
