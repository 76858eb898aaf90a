use crate::config::CookieConfig;
use crate::session::{StoredTokens, TokenChange, TokenPair, TokenStore};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::{Mutex, PoisonError};

pub const ACCESS_COOKIE: &str = "access";
pub const REFRESH_COOKIE: &str = "refresh";

#[derive(Debug, Default)]
struct CookieState {
    tokens: StoredTokens,
    dirty: bool,
}

/// Token store seeded from the request's cookies. Mutations are collected and
/// written onto the response jar by [`CookieTokenStore::write_to`].
#[derive(Debug, Default)]
pub struct CookieTokenStore {
    state: Mutex<CookieState>,
}

impl CookieTokenStore {
    pub fn from_jar(jar: &CookieJar) -> Self {
        let read = |name: &str| {
            jar.get(name)
                .map(|cookie| cookie.value().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            state: Mutex::new(CookieState {
                tokens: StoredTokens {
                    access: read(ACCESS_COOKIE),
                    refresh: read(REFRESH_COOKIE),
                },
                dirty: false,
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CookieState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn apply(&self, change: TokenChange) {
        self.with_state(|state| {
            state.tokens.apply(change);
            state.dirty = true;
        });
    }

    /// Returns `jar` with the session's cookies set or removed. An untouched
    /// session leaves the jar as it came in.
    pub fn write_to(&self, jar: CookieJar, config: &CookieConfig) -> CookieJar {
        let (tokens, dirty) = self.with_state(|state| (state.tokens.clone(), state.dirty));
        if !dirty {
            return jar;
        }
        let jar = match tokens.access {
            Some(access) => jar.add(session_cookie(ACCESS_COOKIE, access, SameSite::Lax, config)),
            None => jar.remove(Cookie::build(ACCESS_COOKIE).path("/")),
        };
        match tokens.refresh {
            Some(refresh) => jar.add(session_cookie(
                REFRESH_COOKIE,
                refresh,
                SameSite::Strict,
                config,
            )),
            None => jar.remove(Cookie::build(REFRESH_COOKIE).path("/")),
        }
    }
}

fn session_cookie(
    name: &'static str,
    value: String,
    same_site: SameSite,
    config: &CookieConfig,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .path("/")
        .same_site(same_site)
        .secure(config.secure)
        .build()
}

impl TokenStore for CookieTokenStore {
    fn access_token(&self) -> Option<String> {
        self.with_state(|state| state.tokens.access.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.with_state(|state| state.tokens.refresh.clone())
    }

    fn store_pair(&self, pair: TokenPair) {
        self.apply(TokenChange::Pair(pair));
    }

    fn replace_access(&self, access: String) {
        self.apply(TokenChange::Access(access));
    }

    fn replace_refresh(&self, refresh: String) {
        self.apply(TokenChange::Refresh(refresh));
    }

    fn discard_access(&self) {
        self.apply(TokenChange::DiscardAccess);
    }

    fn clear(&self) {
        self.apply(TokenChange::Clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar_with(access: &str, refresh: &str) -> CookieJar {
        CookieJar::new()
            .add(Cookie::new(ACCESS_COOKIE, access.to_string()))
            .add(Cookie::new(REFRESH_COOKIE, refresh.to_string()))
    }

    #[test]
    fn reads_tokens_from_cookies() {
        let store = CookieTokenStore::from_jar(&jar_with("a1", "r1"));
        assert_eq!(store.access_token().as_deref(), Some("a1"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn untouched_session_leaves_jar_alone() {
        let store = CookieTokenStore::from_jar(&CookieJar::new());
        let jar = store.write_to(CookieJar::new(), &CookieConfig::default());
        assert_eq!(jar.iter().count(), 0);
    }

    #[test]
    fn refreshed_access_is_written_back() {
        let jar = jar_with("a1", "r1");
        let store = CookieTokenStore::from_jar(&jar);
        store.replace_access("a2".into());
        let jar = store.write_to(jar, &CookieConfig { secure: true });

        let access = jar.get(ACCESS_COOKIE).expect("access cookie");
        assert_eq!(access.value(), "a2");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(jar.get(REFRESH_COOKIE).map(|c| c.value()), Some("r1"));
    }

    #[test]
    fn cleared_session_removes_both_cookies() {
        let jar = jar_with("a1", "r1");
        let store = CookieTokenStore::from_jar(&jar);
        store.clear();
        let jar = store.write_to(jar, &CookieConfig::default());
        assert!(jar.get(ACCESS_COOKIE).is_none());
        assert!(jar.get(REFRESH_COOKIE).is_none());
    }
}
