use serde::{Deserialize, Serialize};

/// Current authenticated user, as vouched for by the identity service
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,  // expiration time
    #[serde(default)]
    pub iat: usize, // issued at
}
