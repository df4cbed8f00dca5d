use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Access/refresh token pair for one authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access: String,
    pub refresh: String,
}

/// Explicitly-scoped token store injected into [`crate::AmlakClient`].
///
/// The client reads the access token for every request and swaps the pair
/// after a refresh; a 403 clears the store, which is the client-side notion
/// of being logged out.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<Option<SessionTokens>>,
}

impl TokenStore {
    pub fn new(initial: Option<SessionTokens>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .expect("token store lock poisoned")
            .as_ref()
            .map(|tokens| tokens.access.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .read()
            .expect("token store lock poisoned")
            .as_ref()
            .map(|tokens| tokens.refresh.clone())
    }

    pub fn replace(&self, tokens: SessionTokens) {
        *self.inner.write().expect("token store lock poisoned") = Some(tokens);
    }

    pub fn clear(&self) {
        *self.inner.write().expect("token store lock poisoned") = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner
            .read()
            .expect("token store lock poisoned")
            .is_some()
    }
}
