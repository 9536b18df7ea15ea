//! Authenticated HTTP transport.
//!
//! Every request carries the current access token. A 401 triggers a token
//! refresh; concurrent 401s share one in-flight refresh and each retries
//! its request once with the new token. If the refresh fails, every
//! waiter gets [`ClientError::SessionExpired`], both tokens are cleared
//! and the session-expired hook runs once.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use shortlink_core::envelope::ApiResponse;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::token::{RefreshRequest, RefreshResponse, TokenStore};

/// New access token, or the refresh failure rendered as text. Shared
/// futures need a `Clone` output.
type RefreshOutcome = Result<String, String>;
type InflightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;
type SessionHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    tokens: Arc<dyn TokenStore>,
    on_session_expired: Option<SessionHook>,
    refresh: Arc<Mutex<Option<InflightRefresh>>>,
}

impl HttpClient {
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            tokens,
            on_session_expired: None,
            refresh: Arc::new(Mutex::new(None)),
        })
    }

    /// Install the callback run when the session cannot be refreshed
    /// (typically a redirect to the login page).
    pub fn with_session_expired(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ClientError> {
        self.request(Method::GET, path, &[], None::<&()>).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, ClientError> {
        self.request(Method::GET, path, query, None::<&()>).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiResponse<T>, ClientError> {
        self.request(Method::DELETE, path, &[], None::<&()>).await
    }

    pub async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<ApiResponse<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.url(path);
        let sent = self.tokens.access_token();
        let response = self.send(&method, &url, query, body, sent.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(response).await;
        }

        debug!(%method, path, "Request unauthorized");
        let token = self.refresh_access_token(sent.as_deref()).await?;

        let retried = self.send(&method, &url, query, body, Some(&token)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(%method, path, "Request unauthorized after token refresh");
            return Err(ClientError::Unauthorized);
        }
        decode(retried).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut request = self.http.request(method.clone(), url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Token to retry with after `sent` was rejected: join the in-flight
    /// refresh, or start one unless the stored token already moved on.
    async fn refresh_access_token(&self, sent: Option<&str>) -> Result<String, ClientError> {
        let inflight = {
            let mut slot = self.refresh.lock();
            match slot.as_ref() {
                Some(pending) if pending.peek().is_none() => pending.clone(),
                _ => {
                    // Checked under the lock, so a refresh that finished
                    // after `sent` went out is never repeated.
                    match self.tokens.access_token() {
                        Some(current) if sent != Some(current.as_str()) => return Ok(current),
                        // A refresh already failed and ended the session.
                        None if sent.is_some() => return Err(ClientError::SessionExpired),
                        _ => {}
                    }
                    let fresh = self.start_refresh().shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };

        let outcome = inflight.clone().await;

        {
            let mut slot = self.refresh.lock();
            if slot.as_ref().is_some_and(|f| f.ptr_eq(&inflight)) {
                *slot = None;
            }
        }

        outcome.map_err(|_| ClientError::SessionExpired)
    }

    fn start_refresh(&self) -> BoxFuture<'static, RefreshOutcome> {
        let http = self.http.clone();
        let url = self.config.refresh_url();
        let tokens = Arc::clone(&self.tokens);
        let hook = self.on_session_expired.clone();

        async move {
            match request_refresh(&http, &url, tokens.as_ref()).await {
                Ok(token) => {
                    tokens.set_access_token(token.clone());
                    info!("Access token refreshed");
                    Ok(token)
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, ending session");
                    tokens.clear();
                    if let Some(hook) = hook {
                        hook();
                    }
                    Err(e.to_string())
                }
            }
        }
        .boxed()
    }
}

async fn request_refresh(
    http: &reqwest::Client,
    url: &str,
    tokens: &dyn TokenStore,
) -> Result<String, ClientError> {
    let (Some(refresh_token), Some(tenant_id)) = (tokens.refresh_token(), tokens.tenant_id())
    else {
        return Err(ClientError::MissingCredentials);
    };

    let response = http
        .post(url)
        .bearer_auth(refresh_token)
        .json(&RefreshRequest { tenant_id })
        .send()
        .await?;
    let body: ApiResponse<RefreshResponse> = decode(response).await?;
    body.data
        .map(|data| data.access_token)
        .ok_or_else(|| ClientError::Decode("refresh response has no access token".into()))
}

/// Parse the envelope. A non-2xx status or a non-zero `code` is an
/// [`ClientError::Api`] carrying the envelope's message.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<ApiResponse<T>, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ApiResponse<IgnoredAny>>(&bytes)
            .map(|body| body.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        return Err(ClientError::Api { status, message });
    }

    let body: ApiResponse<T> =
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))?;
    if !body.is_success() {
        let status = u16::try_from(body.code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err(ClientError::Api {
            status,
            message: body.message,
        });
    }
    Ok(body)
}
