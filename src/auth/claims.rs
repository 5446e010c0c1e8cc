use serde::{Deserialize, Serialize};

/// JWT payload. `email` is the only identity claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>, // expires at (unix timestamp), only with a configured TTL
}
