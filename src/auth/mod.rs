//! Email verification routes.
//!
//! - `POST /api/auth/verify`: `{token}` → marks the user verified and returns
//!   a signed session token.
//! - `POST /api/auth/resend-verification`: `{email}` → issues a fresh
//!   verification token and mails the link.
//!
//! Both handlers answer their own domain errors as `{ "error": message }`.
//! "Token tidak sah" covers both an unknown token and one that belongs to an
//! already verified user; the store does not distinguish the two.

mod email;
mod store;
mod token;

use std::sync::Arc;

use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{HandlerError, HandlerResult};
use crate::request::RequestContext;
use crate::response::Response;

pub use email::{EmailError, EmailMessage, EmailSender, LogEmailSender, MemoryOutbox};
pub use store::{MemoryUserStore, StoreError, User, UserStore};
pub use token::{Claims, JwtIssuer, TokenError, TokenIssuer};

pub const TOKEN_REQUIRED: &str = "Token diperlukan";
pub const TOKEN_INVALID: &str = "Token tidak sah";
pub const VERIFIED: &str = "Email berhasil diverifikasi";
pub const EMAIL_REQUIRED: &str = "Email diperlukan";
pub const EMAIL_UNKNOWN: &str = "Email tidak ditemukan atau sudah diverifikasi";
pub const VERIFICATION_SENT: &str = "Email verifikasi telah dikirim";
pub const SERVER_ERROR: &str = "Terjadi kesalahan pada server";

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResendRequest {
    #[serde(default)]
    email: Option<String>,
}

/// The collaborators behind the auth routes.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenIssuer>,
    email: Arc<dyn EmailSender>,
    app_url: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenIssuer>,
        email: Arc<dyn EmailSender>,
        app_url: impl Into<String>,
    ) -> Self {
        Self { users, tokens, email, app_url: app_url.into() }
    }

    /// `POST /api/auth/verify`.
    pub async fn verify(&self, ctx: RequestContext) -> HandlerResult {
        let token = match ctx.json::<VerifyRequest>() {
            Ok(VerifyRequest { token: Some(token) }) if !token.trim().is_empty() => token,
            _ => return Ok(reject(HandlerError::Validation(TOKEN_REQUIRED.into()))),
        };

        let user = match self.users.find_unverified_by_token(&token).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(reject(HandlerError::NotFound(TOKEN_INVALID.into()))),
            Err(e) => return Ok(server_error("user lookup failed", &e)),
        };

        // Another request may have spent or rotated the token since the lookup.
        let user = match self.users.mark_verified(&user.id, &token).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(reject(HandlerError::NotFound(TOKEN_INVALID.into()))),
            Err(e) => return Ok(server_error("marking user verified failed", &e)),
        };

        let session = match self.tokens.issue(&user.id, &user.email) {
            Ok(session) => session,
            Err(e) => return Ok(server_error("token issuing failed", &e)),
        };

        info!(user_id = %user.id, "email verified");
        Ok(Response::json(&json!({
            "success": true,
            "message": VERIFIED,
            "token": session,
        })))
    }

    /// `POST /api/auth/resend-verification`.
    pub async fn resend_verification(&self, ctx: RequestContext) -> HandlerResult {
        let email = match ctx.json::<ResendRequest>() {
            Ok(ResendRequest { email: Some(email) }) if !email.trim().is_empty() => email,
            _ => return Ok(reject(HandlerError::Validation(EMAIL_REQUIRED.into()))),
        };

        let user = match self.users.find_unverified_by_email(email.trim()).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(reject(HandlerError::NotFound(EMAIL_UNKNOWN.into()))),
            Err(e) => return Ok(server_error("user lookup failed", &e)),
        };

        let token = Uuid::new_v4().to_string();
        if let Err(e) = self.users.set_verification_token(&user.id, &token).await {
            return Ok(server_error("storing verification token failed", &e));
        }

        let message = self.verification_email(&user, &token);
        if let Err(e) = self.email.send(&message).await {
            return Ok(server_error("sending verification email failed", &e));
        }

        info!(user_id = %user.id, "verification email sent");
        Ok(Response::json(&json!({
            "success": true,
            "message": VERIFICATION_SENT,
        })))
    }

    fn verification_email(&self, user: &User, token: &str) -> EmailMessage {
        let link = format!("{}/verify?token={token}", self.app_url.trim_end_matches('/'));
        EmailMessage {
            to: user.email.clone(),
            subject: "Verifikasi email Anda".to_owned(),
            body: format!(
                "Halo {},\n\nKlik tautan berikut untuk memverifikasi email Anda:\n{link}\n",
                user.name
            ),
        }
    }
}

/// `{ "error": message }` with the status the error maps to.
fn reject(err: HandlerError) -> Response {
    Response::error(err.status(), err.to_string())
}

fn server_error(context: &str, e: &dyn std::error::Error) -> Response {
    error!("{context}: {e}");
    Response::error(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::method::Method;

    const SECRET: &str = "test-secret-key-for-jwt-testing-minimum-32-chars";

    struct Fixture {
        users: Arc<MemoryUserStore>,
        outbox: Arc<MemoryOutbox>,
        issuer: Arc<JwtIssuer>,
        service: AuthService,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserStore::default());
        users.insert(User::unverified("u1", "ani@example.com", "Ani", "abc-123"));
        let outbox = Arc::new(MemoryOutbox::default());
        let issuer = Arc::new(JwtIssuer::new(SECRET, chrono::Duration::minutes(60)));
        let service = AuthService::new(
            users.clone(),
            issuer.clone(),
            outbox.clone(),
            "https://app.example.com/",
        );
        Fixture { users, outbox, issuer, service }
    }

    fn post(body: serde_json::Value) -> RequestContext {
        RequestContext::new(Method::Post, "/").with_json(&body)
    }

    struct DownStore;

    #[async_trait]
    impl UserStore for DownStore {
        async fn find_unverified_by_token(&self, _: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable("db down".into()))
        }
        async fn find_unverified_by_email(&self, _: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable("db down".into()))
        }
        async fn mark_verified(&self, _: &str, _: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable("db down".into()))
        }
        async fn set_verification_token(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("db down".into()))
        }
    }

    /// Delegates to a [`MemoryUserStore`] but stalls before every
    /// `mark_verified`, so concurrent verifies all pass the lookup first.
    struct SlowStore(MemoryUserStore);

    #[async_trait]
    impl UserStore for SlowStore {
        async fn find_unverified_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
            self.0.find_unverified_by_token(token).await
        }
        async fn find_unverified_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.0.find_unverified_by_email(email).await
        }
        async fn mark_verified(&self, user_id: &str, token: &str) -> Result<Option<User>, StoreError> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.mark_verified(user_id, token).await
        }
        async fn set_verification_token(&self, user_id: &str, token: &str) -> Result<(), StoreError> {
            self.0.set_verification_token(user_id, token).await
        }
    }

    fn slow_service() -> (Arc<SlowStore>, AuthService) {
        let users = MemoryUserStore::default();
        users.insert(User::unverified("u1", "ani@example.com", "Ani", "abc-123"));
        let users = Arc::new(SlowStore(users));
        let service = AuthService::new(
            users.clone(),
            Arc::new(JwtIssuer::new(SECRET, chrono::Duration::minutes(60))),
            Arc::new(MemoryOutbox::default()),
            "http://localhost",
        );
        (users, service)
    }

    struct BouncingSender;

    #[async_trait]
    impl EmailSender for BouncingSender {
        async fn send(&self, _: &EmailMessage) -> Result<(), EmailError> {
            Err(EmailError::Delivery("smtp refused".into()))
        }
    }

    #[tokio::test]
    async fn verify_marks_the_user_and_returns_a_session_token() {
        let f = fixture();

        let res = f.service.verify(post(json!({ "token": "abc-123" }))).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::OK);
        let body = res.json_body();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], VERIFIED);

        let claims = f.issuer.verify(body["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "ani@example.com");

        let user = f.users.get("u1").unwrap();
        assert!(user.email_verified);
        assert_eq!(user.verification_token, None);
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let f = fixture();

        let res = f.service.verify(post(json!({ "token": "abc" }))).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.json_body(), json!({ "error": TOKEN_INVALID }));
    }

    #[tokio::test]
    async fn a_token_cannot_be_used_twice() {
        let f = fixture();
        f.service.verify(post(json!({ "token": "abc-123" }))).await.unwrap();

        let res = f.service.verify(post(json!({ "token": "abc-123" }))).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.json_body(), json!({ "error": TOKEN_INVALID }));
    }

    #[tokio::test]
    async fn concurrent_verifies_of_one_token_succeed_once() {
        let (_, service) = slow_service();

        let (first, second) = tokio::join!(
            service.verify(post(json!({ "token": "abc-123" }))),
            service.verify(post(json!({ "token": "abc-123" }))),
        );

        let mut statuses = [first.unwrap().status_code(), second.unwrap().status_code()];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);
    }

    #[tokio::test]
    async fn a_token_rotated_mid_verify_is_rejected() {
        let (users, service) = slow_service();

        let (verified, ()) = tokio::join!(service.verify(post(json!({ "token": "abc-123" }))), async {
            users.set_verification_token("u1", "fresh").await.unwrap();
        });

        let res = verified.unwrap();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.json_body(), json!({ "error": TOKEN_INVALID }));
        assert!(!users.0.get("u1").unwrap().email_verified);
    }

    #[test]
    fn rejections_carry_the_taxonomy_status() {
        let res = reject(HandlerError::NotFound(TOKEN_INVALID.into()));
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.json_body(), json!({ "error": TOKEN_INVALID }));

        let res = reject(HandlerError::Validation(TOKEN_REQUIRED.into()));
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_token_is_a_bad_request() {
        let f = fixture();

        for ctx in [
            post(json!({})),
            post(json!({ "token": "  " })),
            RequestContext::new(Method::Post, "/"),
            RequestContext::new(Method::Post, "/").with_body("not json"),
        ] {
            let res = f.service.verify(ctx).await.unwrap();
            assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
            assert_eq!(res.json_body(), json!({ "error": TOKEN_REQUIRED }));
        }
    }

    #[tokio::test]
    async fn store_failure_is_a_server_error() {
        let service = AuthService::new(
            Arc::new(DownStore),
            Arc::new(JwtIssuer::new(SECRET, chrono::Duration::minutes(60))),
            Arc::new(MemoryOutbox::default()),
            "http://localhost",
        );

        let res = service.verify(post(json!({ "token": "abc" }))).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.json_body(), json!({ "error": SERVER_ERROR }));
    }

    #[tokio::test]
    async fn resend_stores_a_new_token_and_mails_the_link() {
        let f = fixture();

        let res = f
            .service
            .resend_verification(post(json!({ "email": "ani@example.com" })))
            .await
            .unwrap();

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            res.json_body(),
            json!({ "success": true, "message": VERIFICATION_SENT })
        );

        let token = f.users.get("u1").unwrap().verification_token.unwrap();
        assert_ne!(token, "abc-123");

        let sent = f.outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ani@example.com");
        assert!(
            sent[0]
                .body
                .contains(&format!("https://app.example.com/verify?token={token}"))
        );
    }

    #[tokio::test]
    async fn resend_for_a_verified_or_unknown_address_is_rejected() {
        let f = fixture();
        f.service.verify(post(json!({ "token": "abc-123" }))).await.unwrap();

        for email in ["ani@example.com", "nobody@example.com"] {
            let res = f
                .service
                .resend_verification(post(json!({ "email": email })))
                .await
                .unwrap();
            assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
            assert_eq!(res.json_body(), json!({ "error": EMAIL_UNKNOWN }));
        }
        assert!(f.outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn resend_without_email_is_a_bad_request() {
        let f = fixture();

        let res = f.service.resend_verification(post(json!({}))).await.unwrap();

        assert_eq!(res.json_body(), json!({ "error": EMAIL_REQUIRED }));
    }

    #[tokio::test]
    async fn email_failure_is_a_server_error() {
        let users = Arc::new(MemoryUserStore::default());
        users.insert(User::unverified("u1", "ani@example.com", "Ani", "abc-123"));
        let service = AuthService::new(
            users,
            Arc::new(JwtIssuer::new(SECRET, chrono::Duration::minutes(60))),
            Arc::new(BouncingSender),
            "http://localhost",
        );

        let res = service
            .resend_verification(post(json!({ "email": "ani@example.com" })))
            .await
            .unwrap();

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.json_body(), json!({ "error": SERVER_ERROR }));
    }
}
