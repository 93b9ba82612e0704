// File: modlogs-core/src/server/login.rs

use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{AppState, LoginConfig, json_status};
use crate::utils::random::random_token;

pub const STATE_COOKIE: &str = "crsf_token";
pub const SCOPES: &str = "channel:moderate moderation:read";

/// Lifetime of both the CSRF cookie and the one-time `/add` code.
pub const LOGIN_TTL: Duration = Duration::from_secs(300);

const STATE_BYTES: usize = 64;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub fn authorize_url(config: &LoginConfig, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        config.authorize_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(SCOPES),
        urlencoding::encode(state),
    )
}

fn state_cookie(config: &LoginConfig, value: String, max_age: Duration) -> Cookie<'static> {
    let mut cookie = Cookie::build((STATE_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.website_url.starts_with("https://"))
        .max_age(time::Duration::try_from(max_age).unwrap_or_default());
    if let Some(domain) = config.cookie_domain.clone().filter(|d| !d.is_empty()) {
        cookie = cookie.domain(domain);
    }
    cookie.build()
}

/// Starts the OAuth flow: sets the CSRF state cookie and redirects to Twitch.
pub async fn login(State(state): State<AppState>, jar: CookieJar) -> Response {
    let csrf = random_token(STATE_BYTES);
    let location = authorize_url(&state.login, &csrf);
    let jar = jar.add(state_cookie(&state.login, csrf, LOGIN_TTL));
    (jar, Redirect::to(&location)).into_response()
}

/// Finishes the OAuth flow and hands the user a one-time `/add` code.
pub async fn login_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(err) = query.error.as_deref() {
        warn!(error = err, description = ?query.error_description, "Twitch refused authorization");
        return json_status(StatusCode::BAD_REQUEST, "Authorization was denied by twitch.");
    }
    let Some(returned_state) = query.state.as_deref().filter(|s| !s.is_empty()) else {
        return json_status(
            StatusCode::BAD_REQUEST,
            "Invalid response from twitch, missing state parameter.",
        );
    };
    let Some(expected_state) = jar.get(STATE_COOKIE).map(|c| c.value()).filter(|s| !s.is_empty()) else {
        return json_status(StatusCode::BAD_REQUEST, "Invalid response from session store.");
    };
    if returned_state != expected_state {
        return json_status(
            StatusCode::BAD_REQUEST,
            "Invalid response from twitch, csrf_token token mismatch.",
        );
    }

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return json_status(
            StatusCode::BAD_REQUEST,
            "Invalid response from twitch, failed to convert code to access token.",
        );
    };
    let token = match state.twitch.exchange_code(code).await {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "Code exchange failed");
            return json_status(
                StatusCode::BAD_REQUEST,
                "Invalid response from twitch, failed to convert code to access token.",
            );
        }
    };

    let user = match state.twitch.get_token_user(&token.access_token).await {
        Ok(Some(user)) => user,
        Ok(None) | Err(_) => {
            return json_status(
                StatusCode::BAD_REQUEST,
                "Invalid response from twitch, failed to convert access token to user account.",
            );
        }
    };

    if let Err(e) = state.users.upsert_user(&user).await {
        error!(user = %user.id, error = %e, "Failed to save user");
        return json_status(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save user data.");
    }

    let auth_code = Uuid::new_v4().to_string();
    if let Err(e) = state.cache.store_auth_code(&auth_code, &user.id, LOGIN_TTL).await {
        error!(user = %user.id, error = %e, "Failed to store auth code");
        return json_status(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save temp secret.");
    }
    info!(user = %user.id, login = %user.login, "Issued hook token");

    let jar = jar.remove(state_cookie(&state.login, String::new(), Duration::ZERO));
    (jar, Html(success_page(&auth_code, &state.login.invite_url))).into_response()
}

fn success_page(auth_code: &str, invite_url: &str) -> String {
    format!(
        r#"<style>
.json-key {{ color: brown; }}
.json-value {{ color: green; }}
.json-string {{ color: teal; }}
</style><pre><code>{{
  <span class="json-key">"status"</span>: <span class="json-value">200</span>,
  <span class="json-key">"message"</span>: <span class="json-string">"Everything went as planned, invite the bot to your discord with the link below, then run the command in the channel the logs should go to. The command expires in 300 seconds."</span>,
  <span class="json-key">"command"</span>: <span class="json-string">"/add token: {auth_code}"</span>,
  <span class="json-key">"link"</span>: <a href="{invite_url}">{invite_url}</a>
}}</code></pre>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LoginConfig {
        LoginConfig {
            client_id: "cid".into(),
            redirect_uri: "https://modlogs.example/login/callback".into(),
            authorize_url: crate::server::AUTHORIZE_URL.into(),
            website_url: "https://modlogs.example".into(),
            invite_url: "https://discord.example/invite".into(),
            cookie_domain: Some("modlogs.example".into()),
        }
    }

    #[test]
    fn test_authorize_url_encodes_params() {
        let url = authorize_url(&config(), "abc");
        assert!(url.starts_with("https://id.twitch.tv/oauth2/authorize?client_id=cid&"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fmodlogs.example%2Flogin%2Fcallback"));
        assert!(url.contains("scope=channel%3Amoderate%20moderation%3Aread"));
        assert!(url.ends_with("&state=abc"));
    }

    #[test]
    fn test_state_cookie_attributes() {
        let cookie = state_cookie(&config(), "tok".into(), LOGIN_TTL);
        assert_eq!(cookie.name(), STATE_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(300)));
        assert_eq!(cookie.domain(), Some("modlogs.example"));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn test_plain_http_cookie_is_not_secure() {
        let mut config = config();
        config.website_url = "http://localhost:8080".into();
        config.cookie_domain = None;
        let rendered = state_cookie(&config, "tok".into(), LOGIN_TTL).to_string();
        assert!(!rendered.contains("Secure"));
        assert!(!rendered.contains("Domain"));
    }
}
