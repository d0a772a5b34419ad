//! JWT 身份校验。
//!
//! 凭证由外部身份服务签发（HS256，声明 `{id, name?, email?, exp}`），
//! 这里只做校验。对调用方所有失败统一为 `Unauthenticated`；
//! 具体原因（缺失/格式错误/过期）只进内部日志。

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use serde::Deserialize;

use application::{AuthError, Identity, IdentityVerifier};

#[derive(Debug, Deserialize)]
struct Claims {
    id: String,
    name: Option<String>,
    email: Option<String>,
}

pub struct JwtIdentityVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            tracing::debug!(cause = "missing", "credential rejected");
            return Err(AuthError::Unauthenticated);
        }
        match decode::<Claims>(credential, &self.decoding_key, &self.validation) {
            Ok(data) => {
                let claims = data.claims;
                if claims.id.is_empty() {
                    tracing::debug!(cause = "empty subject", "credential rejected");
                    return Err(AuthError::Unauthenticated);
                }
                Ok(Identity::new(claims.id, claims.name, claims.email))
            }
            Err(err) => {
                let cause = match err.kind() {
                    ErrorKind::ExpiredSignature => "expired",
                    ErrorKind::InvalidSignature => "bad signature",
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => "malformed",
                    _ => "invalid",
                };
                tracing::debug!(cause, "credential rejected");
                Err(AuthError::Unauthenticated)
            }
        }
    }
}
