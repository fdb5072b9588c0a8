use chrono::{TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub auth: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct JWT {
    key_enc: EncodingKey,
    key_dec: DecodingKey,
    duration: TimeDelta,
}

impl JWT {
    pub fn new(secret: String, duration: TimeDelta) -> Self {
        Self {
            duration,
            key_enc: EncodingKey::from_secret(secret.as_ref()),
            key_dec: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn create_by_login(&self, user_id: &str) -> Result<String, String> {
        let claims = Claims {
            sub: user_id.to_string(),
            auth: user_id.to_string(),
            exp: (Utc::now() + self.duration).timestamp() as usize,
            iat: Utc::now().timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.key_enc).map_err(|err| err.to_string())
    }

    pub fn decode(&self, token: &str) -> Result<Claims, String> {
        decode::<Claims>(token, &self.key_dec, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|err| err.to_string())
    }
}
