use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};

use crate::{JwtClaims, TokenValidationError, validate_claims};

/// Turns a bearer token into verified claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 validator over a shared secret.
///
/// The claims carry their own `issued_at`/`expires_at` window, so the library's
/// `exp` handling is switched off and `validate_claims` does the time checks.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenValidationError::InvalidSignature,
                _ => TokenValidationError::Malformed(e.to_string()),
            }
        })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use vevurn_core::UserId;

    use crate::Role;

    fn token(secret: &[u8], claims: &JwtClaims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            roles: vec![Role::MANAGER],
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn valid_token_round_trips_claims() {
        let now = Utc::now();
        let c = claims(now);
        let validator = Hs256JwtValidator::new(b"till-secret");
        assert_eq!(validator.validate(&token(b"till-secret", &c), now).unwrap(), c);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let validator = Hs256JwtValidator::new(b"till-secret");
        assert_eq!(
            validator.validate(&token(b"other", &claims(now)), now),
            Err(TokenValidationError::InvalidSignature)
        );
        assert!(matches!(
            validator.validate("not-a-jwt", now),
            Err(TokenValidationError::Malformed(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let validator = Hs256JwtValidator::new(b"till-secret");
        let t = token(b"till-secret", &claims(now));
        assert_eq!(
            validator.validate(&t, now + Duration::hours(1)),
            Err(TokenValidationError::Expired)
        );
    }
}
