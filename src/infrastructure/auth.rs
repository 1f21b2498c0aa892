use crate::config::AdminCredentials;
use crate::domain::ports::{Authenticator, Operator};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Authenticates the configured operator and keeps issued tokens in memory.
///
/// Tokens do not survive a restart; callers log in again on `Unauthenticated`.
#[derive(Clone)]
pub struct InMemoryAuthenticator {
    credentials: AdminCredentials,
    tokens: Arc<RwLock<HashMap<String, Operator>>>,
}

impl InMemoryAuthenticator {
    pub fn new(credentials: AdminCredentials) -> Self {
        Self {
            credentials,
            tokens: Arc::default(),
        }
    }

    /// Invalidates a token.
    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }
}

#[async_trait]
impl Authenticator for InMemoryAuthenticator {
    async fn login(&self, email: &str, password: &str) -> Result<String> {
        if !email.eq_ignore_ascii_case(&self.credentials.email)
            || password != self.credentials.password
        {
            tracing::warn!(email, "rejected operator login");
            return Err(CheckoutError::InvalidCredentials);
        }
        let token = Uuid::new_v4().simple().to_string();
        let operator = Operator {
            email: self.credentials.email.clone(),
        };
        self.tokens.write().await.insert(token.clone(), operator);
        Ok(token)
    }

    async fn verify(&self, token: &str) -> Result<Operator> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(CheckoutError::Unauthenticated);
        }
        self.tokens
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(CheckoutError::Unauthenticated)
    }
}
