// File: modlogs-core/src/services/hook_commands.rs

use std::sync::Arc;

use tracing::{error, info};

use modlogs_common::models::{Hook, HookMode, HookUpsert};
use modlogs_common::traits::{CacheStore, HookRepository};

use crate::Error;
use crate::services::subscription_registry::SubscriptionRegistry;
use crate::services::user_service::UserService;

pub const INTERNAL_ERROR: &str = "Internal server error. Please try again later.";
pub const NOT_TEXT_CHANNEL: &str = "Logs can only be outputted into a text channel.";

/// `-1` lifts the per-guild hook limit.
pub const UNLIMITED_HOOKS: i64 = -1;

/// What a command answers with. Ephemeral replies are only shown to the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
    pub ephemeral: bool,
}

impl CommandReply {
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }

    fn internal(context: &str, err: &Error) -> Self {
        error!(error = %err, "{context}");
        Self::private(INTERNAL_ERROR)
    }
}

/// A channel picked in (or implied by) a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: String,
    pub is_text: bool,
}

impl ChannelRef {
    pub fn text(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_text: true,
        }
    }

    pub fn mention(&self) -> String {
        format!("<#{}>", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct AddHookRequest {
    pub guild_id: String,
    pub channel: ChannelRef,
    pub token: String,
    /// Absent means minimal.
    pub minimal: Option<bool>,
}

/// The operator-facing hook management commands, independent of how the
/// chat platform delivers them.
pub struct HookCommandService {
    hooks: Arc<dyn HookRepository>,
    cache: Arc<dyn CacheStore>,
    users: Arc<UserService>,
    registry: Arc<SubscriptionRegistry>,
    max_hooks_per_guild: i64,
    website_url: String,
}

impl HookCommandService {
    pub fn new(
        hooks: Arc<dyn HookRepository>,
        cache: Arc<dyn CacheStore>,
        users: Arc<UserService>,
        registry: Arc<SubscriptionRegistry>,
        max_hooks_per_guild: i64,
        website_url: impl Into<String>,
    ) -> Self {
        Self {
            hooks,
            cache,
            users,
            registry,
            max_hooks_per_guild,
            website_url: website_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn max_hooks_per_guild(&self) -> i64 {
        self.max_hooks_per_guild
    }

    pub async fn add(&self, req: AddHookRequest) -> CommandReply {
        if !req.channel.is_text {
            return CommandReply::private(NOT_TEXT_CHANNEL);
        }

        let user_id = match self.cache.consume_auth_code(req.token.trim()).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return CommandReply::private(
                    "The token you provided is expired or invalid. Please login again to make a new one.",
                );
            }
            Err(e) => return CommandReply::internal("Failed to read auth code", &e),
        };

        let user = match self.users.resolve_id(&user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return CommandReply::private("The specified broadcaster does not exist."),
            Err(e) => return CommandReply::internal("Failed to resolve broadcaster", &e),
        };

        let mode = match req.minimal {
            Some(false) => HookMode::Embed,
            _ => HookMode::Minimal,
        };
        let hook = Hook {
            guild_id: req.guild_id.clone(),
            channel_id: req.channel.id.clone(),
            streamer_id: user.id.clone(),
            mode,
        };

        let existing = match self
            .hooks
            .find_hook(&hook.guild_id, &hook.channel_id, &hook.streamer_id)
            .await
        {
            Ok(existing) => existing,
            Err(e) => return CommandReply::internal("Failed to look up hook", &e),
        };
        if existing.is_none() && self.max_hooks_per_guild != UNLIMITED_HOOKS {
            match self.hooks.count_for_guild(&hook.guild_id).await {
                Ok(count) if count >= self.max_hooks_per_guild => {
                    return CommandReply::private(format!(
                        "There are too many hooks in this discord. ({}/{})",
                        count, self.max_hooks_per_guild
                    ));
                }
                Ok(_) => {}
                Err(e) => return CommandReply::internal("Failed to count guild hooks", &e),
            }
        }

        match self.registry.register_hook(&hook).await {
            Ok(HookUpsert::Updated) => CommandReply::public(format!(
                "ModLogs hook updated for <https://twitch.tv/{}>, into {}",
                user.login,
                req.channel.mention()
            )),
            Ok(HookUpsert::Created) => {
                info!(guild = %hook.guild_id, channel = %hook.channel_id, streamer = %hook.streamer_id, "Hook added");
                CommandReply::public(format!(
                    "ModLogs hook added for <https://twitch.tv/{}>, into {}",
                    user.login,
                    req.channel.mention()
                ))
            }
            Err(e) => CommandReply::internal("Failed to register hook", &e),
        }
    }

    pub async fn list(&self, guild_id: &str, channel: Option<&ChannelRef>) -> CommandReply {
        if channel.is_some_and(|c| !c.is_text) {
            return CommandReply::private("Please select a valid channel.");
        }

        let hooks = match self
            .hooks
            .list_for_guild(guild_id, channel.map(|c| c.id.as_str()))
            .await
        {
            Ok(hooks) => hooks,
            Err(e) => return CommandReply::internal("Failed to list hooks", &e),
        };
        if hooks.is_empty() {
            return CommandReply::public("No hooks were found");
        }

        let mut streamer_ids: Vec<String> = Vec::new();
        for hook in &hooks {
            if !streamer_ids.contains(&hook.streamer_id) {
                streamer_ids.push(hook.streamer_id.clone());
            }
        }
        let users = match self.users.resolve_many(&streamer_ids).await {
            Ok(users) => users,
            Err(e) => return CommandReply::internal("Failed to resolve streamers", &e),
        };

        let lines: Vec<String> = streamer_ids
            .iter()
            .map(|id| {
                let channels: Vec<String> = hooks
                    .iter()
                    .filter(|h| &h.streamer_id == id)
                    .map(|h| {
                        let mode = match h.mode {
                            HookMode::Minimal => "minimal",
                            HookMode::Embed => "embed",
                        };
                        format!("<#{}> - {}", h.channel_id, mode)
                    })
                    .collect();
                let streamer = match users.iter().find(|u| &u.id == id) {
                    Some(u) => format!("<https://twitch.tv/{}>", u.login),
                    None => format!("`{id}`"),
                };
                format!("{} -> {}", streamer, channels.join(", "))
            })
            .collect();
        CommandReply::public(lines.join("\n"))
    }

    pub async fn delete(&self, guild_id: &str, broadcaster: &str, channel: Option<&ChannelRef>) -> CommandReply {
        if channel.is_some_and(|c| !c.is_text) {
            return CommandReply::private(NOT_TEXT_CHANNEL);
        }
        let channel_id = channel.map(|c| c.id.as_str());
        let broadcaster = broadcaster.trim();

        // The argument may already be a streamer id with rows.
        match self.registry.unregister_hooks(guild_id, broadcaster, channel_id).await {
            Ok(0) => {}
            Ok(removed) => return removed_reply(removed),
            Err(e) => return CommandReply::internal("Failed to delete hooks", &e),
        }

        let user = match self.users.resolve(broadcaster).await {
            Ok(Some(user)) => user,
            Ok(None) => return CommandReply::private("The specified user does not exist."),
            Err(e) => return CommandReply::internal("Failed to resolve broadcaster", &e),
        };
        match self.registry.unregister_hooks(guild_id, &user.id, channel_id).await {
            Ok(0) => CommandReply::private("That hook doesn't exist"),
            Ok(removed) => removed_reply(removed),
            Err(e) => CommandReply::internal("Failed to delete hooks", &e),
        }
    }

    pub async fn ignore(&self, guild_id: &str, needle: &str) -> CommandReply {
        if needle.trim().is_empty() {
            return CommandReply::private("Please enter a valid user.");
        }
        let user = match self.users.resolve(needle).await {
            Ok(Some(user)) => user,
            Ok(None) => return CommandReply::private("The specified user does not exist."),
            Err(e) => return CommandReply::internal("Failed to resolve user", &e),
        };
        match self.cache.add_ignored_user(guild_id, &user.id).await {
            Ok(true) => CommandReply::public(format!("Successfully ignored `{}`.", user.display_name)),
            Ok(false) => CommandReply::private(format!("`{}` is already ignored.", user.display_name)),
            Err(e) => CommandReply::internal("Failed to update ignore list", &e),
        }
    }

    pub async fn unignore(&self, guild_id: &str, needle: &str) -> CommandReply {
        if needle.trim().is_empty() {
            return CommandReply::private("Please enter a valid user.");
        }
        let user = match self.users.resolve(needle).await {
            Ok(Some(user)) => user,
            Ok(None) => return CommandReply::private("The specified user does not exist."),
            Err(e) => return CommandReply::internal("Failed to resolve user", &e),
        };
        match self.cache.remove_ignored_user(guild_id, &user.id).await {
            Ok(true) => CommandReply::private(format!("Successfully unignored `{}`.", user.display_name)),
            Ok(false) => CommandReply::private(format!("`{}` is not ignored.", user.display_name)),
            Err(e) => CommandReply::internal("Failed to update ignore list", &e),
        }
    }

    pub async fn ignored(&self, guild_id: &str) -> CommandReply {
        let ids = match self.cache.list_ignored_users(guild_id).await {
            Ok(ids) => ids,
            Err(e) => return CommandReply::internal("Failed to read ignore list", &e),
        };
        if ids.is_empty() {
            return CommandReply::private("There are no ignored users.");
        }
        let users = match self.users.resolve_many(&ids).await {
            Ok(users) => users,
            Err(e) => return CommandReply::internal("Failed to resolve ignored users", &e),
        };
        let names: Vec<String> = ids
            .iter()
            .map(|id| match users.iter().find(|u| &u.id == id) {
                Some(u) => u.display_name.clone(),
                None => id.clone(),
            })
            .collect();
        CommandReply::public(format!("Ignored Users: {}", names.join(", ")))
    }

    pub fn link(&self) -> CommandReply {
        CommandReply::public(format!(
            "This bot can be invited to a server by going to <{}/login>.",
            self.website_url
        ))
    }
}

fn removed_reply(removed: u64) -> CommandReply {
    if removed > 1 {
        CommandReply::public("The hooks have been removed.")
    } else {
        CommandReply::public("The hook has been removed.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::test_utils::{FakeTwitchApi, MemoryCacheStore, MemoryHookRepository, MemoryUserRepository};

    struct Fixture {
        svc: HookCommandService,
        hooks: Arc<MemoryHookRepository>,
        cache: Arc<MemoryCacheStore>,
        twitch: Arc<FakeTwitchApi>,
    }

    fn fixture(max_hooks: i64) -> Fixture {
        let hooks = Arc::new(MemoryHookRepository::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let twitch = Arc::new(FakeTwitchApi::new());
        let users = Arc::new(UserService::new(Arc::new(MemoryUserRepository::new()), twitch.clone()));
        let registry = Arc::new(SubscriptionRegistry::new(
            hooks.clone(),
            cache.clone(),
            twitch.clone(),
            "https://modlogs.example",
        ));
        let svc = HookCommandService::new(
            hooks.clone(),
            cache.clone(),
            users,
            registry,
            max_hooks,
            "https://modlogs.example/",
        );
        Fixture {
            svc,
            hooks,
            cache,
            twitch,
        }
    }

    async fn issue_code(f: &Fixture, code: &str, user_id: &str) {
        f.cache
            .store_auth_code(code, user_id, Duration::from_secs(300))
            .await
            .unwrap();
    }

    fn add_request(channel: &str, token: &str) -> AddHookRequest {
        AddHookRequest {
            guild_id: "g1".into(),
            channel: ChannelRef::text(channel),
            token: token.into(),
            minimal: None,
        }
    }

    #[tokio::test]
    async fn test_add_creates_hook_and_consumes_code() {
        let f = fixture(10);
        f.twitch.add_user("1001", "Streamer");
        issue_code(&f, "code-1", "1001").await;

        let reply = f.svc.add(add_request("c1", "code-1")).await;
        assert_eq!(
            reply,
            CommandReply::public("ModLogs hook added for <https://twitch.tv/streamer>, into <#c1>")
        );
        assert_eq!(f.hooks.all().len(), 1);
        assert_eq!(f.hooks.all()[0].mode, HookMode::Minimal);

        let again = f.svc.add(add_request("c2", "code-1")).await;
        assert!(again.ephemeral);
        assert!(again.content.contains("expired or invalid"));
    }

    #[tokio::test]
    async fn test_add_existing_hook_updates_mode() {
        let f = fixture(10);
        f.twitch.add_user("1001", "streamer");
        issue_code(&f, "a", "1001").await;
        issue_code(&f, "b", "1001").await;

        f.svc.add(add_request("c1", "a")).await;
        let mut req = add_request("c1", "b");
        req.minimal = Some(false);
        let reply = f.svc.add(req).await;

        assert!(reply.content.starts_with("ModLogs hook updated"));
        assert_eq!(f.hooks.all()[0].mode, HookMode::Embed);
    }

    #[tokio::test]
    async fn test_add_rejects_non_text_channel() {
        let f = fixture(10);
        let mut req = add_request("voice", "code");
        req.channel.is_text = false;
        assert_eq!(f.svc.add(req).await, CommandReply::private(NOT_TEXT_CHANNEL));
    }

    #[tokio::test]
    async fn test_add_enforces_guild_limit() {
        let f = fixture(1);
        f.twitch.add_user("1", "one");
        f.twitch.add_user("2", "two");
        issue_code(&f, "a", "1").await;
        issue_code(&f, "b", "2").await;

        f.svc.add(add_request("c1", "a")).await;
        let reply = f.svc.add(add_request("c1", "b")).await;
        assert_eq!(reply.content, "There are too many hooks in this discord. (1/1)");
        assert_eq!(f.hooks.all().len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_delete_by_login() {
        let f = fixture(UNLIMITED_HOOKS);
        f.twitch.add_user("1001", "streamer");
        issue_code(&f, "a", "1001").await;
        issue_code(&f, "b", "1001").await;
        f.svc.add(add_request("c1", "a")).await;
        f.svc.add(add_request("c2", "b")).await;

        let listed = f.svc.list("g1", None).await;
        assert_eq!(
            listed.content,
            "<https://twitch.tv/streamer> -> <#c1> - minimal, <#c2> - minimal"
        );

        let reply = f.svc.delete("g1", "Streamer", None).await;
        assert_eq!(reply.content, "The hooks have been removed.");
        assert!(f.hooks.all().is_empty());
        assert_eq!(f.cache.counter("1001"), 0);

        let missing = f.svc.delete("g1", "streamer", None).await;
        assert_eq!(missing, CommandReply::private("That hook doesn't exist"));
        assert_eq!(f.svc.list("g1", None).await.content, "No hooks were found");
    }

    #[tokio::test]
    async fn test_ignore_lifecycle() {
        let f = fixture(10);
        f.twitch.add_user("7", "NightBot");

        assert_eq!(
            f.svc.ignore("g1", "nightbot").await,
            CommandReply::public("Successfully ignored `NightBot`.")
        );
        assert!(f.svc.ignore("g1", "nightbot").await.content.contains("already ignored"));
        assert_eq!(f.svc.ignored("g1").await.content, "Ignored Users: NightBot");

        let reply = f.svc.unignore("g1", "7").await;
        assert_eq!(reply.content, "Successfully unignored `NightBot`.");
        assert_eq!(f.svc.ignored("g1").await.content, "There are no ignored users.");
        assert_eq!(
            f.svc.ignore("g1", "ghost").await.content,
            "The specified user does not exist."
        );
    }

    #[test]
    fn test_link_points_at_login() {
        let f = fixture(10);
        assert_eq!(
            f.svc.link().content,
            "This bot can be invited to a server by going to <https://modlogs.example/login>."
        );
    }
}
