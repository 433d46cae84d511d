//! Bearer-token authentication for API routes.
//!
//! Every request outside the public allow-list must carry
//! `Authorization: Bearer <token>`. The token is verified by one of three
//! modes, chosen at startup from the environment:
//!
//! - `AUTH_JWT_SECRET` set: HS256 with the shared secret.
//! - `FIREBASE_PROJECT_ID` set: RS256 against Google's published JWKS, with
//!   audience and issuer pinned to the project.
//! - neither: startup fails, unless `[server] debug = true` and
//!   `AUTH_INSECURE=1` opt into unverified tokens for local development.
//!
//! The token subject becomes an [`Identity`] in the request extensions.

use super::error::ApiError;
use super::AppState;
use crate::config::Secrets;
use anyhow::{anyhow, Context, Result};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const MISSING_HEADER: &str = "Authorization header missing or invalid";
pub const INVALID_TOKEN: &str = "Invalid or expired token";

/// Reachable without a token.
const PUBLIC_PATHS: [&str; 4] = ["/", "/api/", "/api/health/", "/api-docs/"];

const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// The verified caller. `uid` is the identity-provider subject and is used
/// as the owner key for plants and activity rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub uid: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

pub enum TokenVerifier {
    SharedSecret(DecodingKey),
    Firebase(FirebaseVerifier),
    Insecure,
}

pub struct FirebaseVerifier {
    project_id: String,
    http: reqwest::Client,
    jwks: RwLock<Option<(Instant, JwkSet)>>,
}

impl TokenVerifier {
    /// Pick the verification mode from the environment secrets. A shared
    /// secret wins over a Firebase project id. Without either, only an
    /// explicit debug opt-in yields the unverified mode.
    pub fn from_secrets(secrets: &Secrets, debug: bool, http: reqwest::Client) -> Result<Self> {
        if let Some(secret) = &secrets.auth_jwt_secret {
            tracing::info!("token verification: HS256 shared secret");
            Ok(TokenVerifier::SharedSecret(DecodingKey::from_secret(secret.as_bytes())))
        } else if let Some(project_id) = &secrets.firebase_project_id {
            tracing::info!(project_id = %project_id, "token verification: Firebase JWKS");
            Ok(TokenVerifier::Firebase(FirebaseVerifier {
                project_id: project_id.clone(),
                http,
                jwks: RwLock::new(None),
            }))
        } else if debug && secrets.allow_insecure_auth {
            tracing::warn!(
                "AUTH_INSECURE set in debug mode: bearer tokens are accepted \
                 without signature verification"
            );
            Ok(TokenVerifier::Insecure)
        } else {
            Err(anyhow!(
                "no token verifier configured: set AUTH_JWT_SECRET or FIREBASE_PROJECT_ID \
                 (AUTH_INSECURE=1 is only honored with [server] debug = true)"
            ))
        }
    }

    pub fn shared_secret(secret: &str) -> Self {
        TokenVerifier::SharedSecret(DecodingKey::from_secret(secret.as_bytes()))
    }

    pub async fn verify(&self, token: &str) -> Result<Identity> {
        let claims = match self {
            TokenVerifier::SharedSecret(key) => {
                let mut validation = Validation::new(Algorithm::HS256);
                validation.validate_aud = false;
                decode::<Claims>(token, key, &validation)?.claims
            }
            TokenVerifier::Firebase(firebase) => firebase.verify(token).await?,
            TokenVerifier::Insecure => {
                let mut validation = Validation::new(Algorithm::HS256);
                validation.insecure_disable_signature_validation();
                validation.validate_exp = false;
                validation.validate_aud = false;
                validation.required_spec_claims.clear();
                decode::<Claims>(token, &DecodingKey::from_secret(b""), &validation)?.claims
            }
        };
        if claims.sub.trim().is_empty() {
            return Err(anyhow!("token has an empty subject"));
        }
        Ok(Identity { uid: claims.sub })
    }
}

impl FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or_else(|| anyhow!("token header has no kid"))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        Ok(decode::<Claims>(token, &key, &validation)?.claims)
    }

    /// Key for `kid`, refetching the key set when it is stale or does not
    /// contain the id (Google rotates keys).
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        {
            let cached = self.jwks.read().await;
            if let Some((fetched, jwks)) = cached.as_ref() {
                if fetched.elapsed() < JWKS_TTL {
                    if let Some(jwk) = jwks.find(kid) {
                        return Ok(DecodingKey::from_jwk(jwk)?);
                    }
                }
            }
        }

        let jwks: JwkSet = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("parsing Google JWKS")?;
        let key = jwks
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| anyhow!("no JWKS key with kid {}", kid));
        *self.jwks.write().await = Some((Instant::now(), jwks));
        key
    }
}

pub fn is_public(path: &str, extra: &[String]) -> bool {
    let path = path.trim_end_matches('/');
    PUBLIC_PATHS
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .any(|allowed| allowed.trim_end_matches('/') == path)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware: reject unauthenticated requests, attach [`Identity`] otherwise.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    if is_public(req.uri().path(), &state.config.server.public_paths) {
        return next.run(req).await;
    }
    let Some(token) = bearer_token(req.headers()) else {
        return ApiError::Unauthorized(MISSING_HEADER).into_response();
    };
    match state.auth.verify(token).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "bearer token rejected");
            ApiError::Unauthorized(INVALID_TOKEN).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + exp_offset;
        encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": sub, "exp": exp, "aud": "plantkeeper-app"}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn shared_secret_accepts_valid_token() {
        let verifier = TokenVerifier::shared_secret("s3cret");
        let identity = verifier.verify(&token("s3cret", "uid-123", 600)).await.unwrap();
        assert_eq!(identity.uid, "uid-123");
    }

    #[tokio::test]
    async fn shared_secret_rejects_wrong_key_and_expired() {
        let verifier = TokenVerifier::shared_secret("s3cret");
        assert!(verifier.verify(&token("other", "uid-123", 600)).await.is_err());
        assert!(verifier.verify(&token("s3cret", "uid-123", -3600)).await.is_err());
        assert!(verifier.verify("not-a-jwt").await.is_err());
    }

    #[tokio::test]
    async fn insecure_mode_skips_signature_and_expiry() {
        let verifier = TokenVerifier::Insecure;
        let identity = verifier
            .verify(&token("whatever", "dev-user", -3600))
            .await
            .unwrap();
        assert_eq!(identity.uid, "dev-user");
    }

    #[tokio::test]
    async fn empty_subject_is_rejected() {
        let verifier = TokenVerifier::shared_secret("s3cret");
        assert!(verifier.verify(&token("s3cret", " ", 600)).await.is_err());
    }

    fn http() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[test]
    fn missing_secrets_refuse_to_build_a_verifier() {
        assert!(TokenVerifier::from_secrets(&Secrets::default(), false, http()).is_err());
        assert!(TokenVerifier::from_secrets(&Secrets::default(), true, http()).is_err());
        let opt_in = Secrets {
            allow_insecure_auth: true,
            ..Secrets::default()
        };
        assert!(TokenVerifier::from_secrets(&opt_in, false, http()).is_err());
        assert!(matches!(
            TokenVerifier::from_secrets(&opt_in, true, http()),
            Ok(TokenVerifier::Insecure)
        ));
    }

    #[tokio::test]
    async fn shared_secret_from_env_rejects_forged_token() {
        let secrets = Secrets {
            auth_jwt_secret: Some("s3cret".to_string()),
            allow_insecure_auth: true,
            ..Secrets::default()
        };
        let verifier = TokenVerifier::from_secrets(&secrets, true, http()).unwrap();
        assert!(verifier.verify(&token("attacker-key", "victim-uid", 600)).await.is_err());
        assert!(verifier.verify(&token("s3cret", "victim-uid", -3600)).await.is_err());
    }

    #[test]
    fn allow_list_ignores_trailing_slash() {
        assert!(is_public("/", &[]));
        assert!(is_public("/api/health/", &[]));
        assert!(is_public("/api/health", &[]));
        assert!(is_public("/api-docs/", &[]));
        assert!(!is_public("/api/plants/", &[]));
        assert!(!is_public("/metrics", &[]));
        assert!(is_public("/metrics", &["/metrics".to_string()]));
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
