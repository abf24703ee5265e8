use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::broker::session::SessionIdentity;
use crate::error::AppError;

/// Decodes an already-issued bearer credential. Issuance, refresh, and
/// storage of credentials belong to an external collaborator (spec.md §1);
/// this module only ever verifies what that collaborator signed, matching
/// `JWT_SECRET` in spec.md §6.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Decode a bearer token into a user identity. Absence or invalidity is the
/// caller's job to handle by downgrading to anonymous (§6 "Handshake") —
/// this function reports the distinction spec.md §7 requires between an
/// expired and merely-invalid credential via `AppError::AuthRequired`'s
/// `code`.
pub fn verify_token(token: &str, secret: &str) -> Result<String, AppError> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => Ok(data.claims.sub),
        Err(e) if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature) => {
            Err(AppError::AuthRequired {
                code: Some("TOKEN_EXPIRED"),
            })
        }
        Err(_) => Err(AppError::AuthRequired { code: None }),
    }
}

/// Extract an identity from an optional bearer token, downgrading silently
/// to anonymous on absence or invalidity rather than failing the handshake
/// (§6 "absence or invalidity downgrades to anonymous").
pub fn identity_from_optional_token(token: Option<&str>, secret: Option<&str>) -> SessionIdentity {
    match (token, secret) {
        (Some(t), Some(secret)) => match verify_token(t, secret) {
            Ok(user_id) => SessionIdentity::authenticated(user_id),
            Err(_) => SessionIdentity::anonymous(),
        },
        _ => SessionIdentity::anonymous(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, exp: usize, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_yields_user_id() {
        let secret = "s3cret";
        let future = (chrono::Utc::now().timestamp() + 3600) as usize;
        let token = token_for("user_1", future, secret);
        assert_eq!(verify_token(&token, secret).unwrap(), "user_1");
    }

    #[test]
    fn expired_token_reports_token_expired_code() {
        let secret = "s3cret";
        let past = (chrono::Utc::now().timestamp() - 3600) as usize;
        let token = token_for("user_1", past, secret);
        match verify_token(&token, secret) {
            Err(AppError::AuthRequired { code: Some("TOKEN_EXPIRED") }) => {}
            other => panic!("expected TOKEN_EXPIRED, got {other:?}"),
        }
    }

    #[test]
    fn missing_token_downgrades_to_anonymous() {
        let identity = identity_from_optional_token(None, Some("s3cret"));
        assert!(!identity.is_authenticated());
    }

    #[test]
    fn invalid_token_downgrades_to_anonymous() {
        let identity = identity_from_optional_token(Some("garbage"), Some("s3cret"));
        assert!(!identity.is_authenticated());
    }
}
