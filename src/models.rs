use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Access-token claims. `sub` is the anonymous session uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub jti: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignInResponse {
    #[schema(example = "eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9...")]
    pub token: String,
    #[schema(example = "3f6c2b4e-9d2a-4c4f-8a51-2b7d0e6f1a90")]
    pub uid: String,
    /// Seconds until the token expires.
    #[schema(example = 43200)]
    pub expires_in: usize,
}
