use crate::models::Claims;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

pub fn generate_access_token(uid: &str, secret: &str, ttl: usize) -> Result<(String, Claims), Error> {
    let claims = Claims {
        sub: uid.to_string(),
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}
