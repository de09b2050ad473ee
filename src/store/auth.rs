use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::AuthError;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// A signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Receives the signed-in user every time it changes
///
/// Dropping the subscription unsubscribes.
pub struct AuthSubscription {
    rx: watch::Receiver<Option<AuthUser>>,
}

impl AuthSubscription {
    pub fn new(rx: watch::Receiver<Option<AuthUser>>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> Option<AuthUser> {
        self.rx.borrow().clone()
    }

    /// Wait for the next change; `None` once the provider is gone
    pub async fn changed(&mut self) -> Option<Option<AuthUser>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Authentication capability backing the remote store
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn register(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn logout(&self) -> Result<(), AuthError>;
    fn current_user(&self) -> Option<AuthUser>;
    fn on_auth_change(&self) -> AuthSubscription;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Firebase Authentication over the Identity Toolkit REST API
pub struct FirebaseAuth {
    client: Client,
    api_key: String,
    base_url: String,
    id_token: Mutex<Option<String>>,
    user_tx: watch::Sender<Option<AuthUser>>,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        let (user_tx, _) = watch::channel(None);
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: IDENTITY_TOOLKIT_URL.to_string(),
            id_token: Mutex::new(None),
            user_tx,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// ID token of the signed-in user, for authorizing store requests
    pub fn id_token(&self) -> Option<String> {
        self.id_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn password_call(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|wrapper| wrapper.error.message)
                .unwrap_or(body);
            return Err(if status.is_client_error() {
                AuthError::Rejected(message)
            } else {
                AuthError::Request(format!("HTTP {}: {}", status.as_u16(), message))
            });
        }

        let body: PasswordResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Request(format!("unexpected auth response: {}", e)))?;

        let user = AuthUser {
            uid: body.local_id,
            email: body.email.or_else(|| Some(email.to_string())),
        };

        *self.id_token.lock().unwrap_or_else(|e| e.into_inner()) = Some(body.id_token);
        self.user_tx.send_replace(Some(user.clone()));
        Ok(user)
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    async fn login(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let user = self.password_call("signInWithPassword", email, password).await?;
        info!("User signed in: {}", user.uid);
        Ok(user)
    }

    async fn register(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let user = self.password_call("signUp", email, password).await?;
        info!("User registered: {}", user.uid);
        Ok(user)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.id_token.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(user) = self.user_tx.send_replace(None) {
            info!("User signed out: {}", user.uid);
        } else {
            warn!("Sign-out requested with nobody signed in");
        }
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.user_tx.borrow().clone()
    }

    fn on_auth_change(&self) -> AuthSubscription {
        AuthSubscription::new(self.user_tx.subscribe())
    }
}
