use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::Deserialize;
use validator::Validate;

use crate::database::client::Db;
use crate::entities::user_entity::{User, UserCreate, UserDbService};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::utils::jwt::JWT;

#[derive(Debug, Deserialize, Validate)]
pub struct AuthRegisterInput {
    #[validate(length(min = 3, message = "Min 3 characters for username"))]
    pub username: String,
    #[validate(length(min = 8, message = "Min 8 characters for password"))]
    pub password: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AuthLoginInput {
    #[validate(length(min = 3, message = "Min 3 characters for username"))]
    pub username: String,
    #[validate(length(min = 8, message = "Min 8 characters for password"))]
    pub password: String,
}

pub struct AuthService<'a> {
    users_repository: UserDbService<'a>,
    ctx: &'a Ctx,
    jwt: &'a JWT,
    starting_credits: i64,
}

impl<'a> AuthService<'a> {
    pub fn new(db: &'a Db, ctx: &'a Ctx, jwt: &'a JWT, starting_credits: i64) -> Self {
        Self {
            users_repository: UserDbService { db, ctx },
            ctx,
            jwt,
            starting_credits,
        }
    }

    pub async fn register(&self, input: AuthRegisterInput) -> CtxResult<(User, String)> {
        input.validate().map_err(|e| self.ctx.to_ctx_error(e.into()))?;

        let password_hash = hash_password(&input.password)
            .map_err(|source| self.ctx.to_ctx_error(AppError::Generic { description: source }))?;

        let user = self
            .users_repository
            .create(UserCreate {
                username: input.username,
                password_hash,
                full_name: input.full_name,
                skills: input.skills,
                credits: self.starting_credits,
            })
            .await?;

        let token = self.token_for(&user)?;
        Ok((user, token))
    }

    pub async fn login(&self, input: AuthLoginInput) -> CtxResult<(User, String)> {
        input.validate().map_err(|e| self.ctx.to_ctx_error(e.into()))?;

        let user = self
            .users_repository
            .get_by_username(&input.username)
            .await
            .map_err(|_| self.ctx.to_ctx_error(AppError::AuthenticationFail))?;

        verify_password(&input.password, &user.password_hash)
            .map_err(|_| self.ctx.to_ctx_error(AppError::AuthenticationFail))?;

        let token = self.token_for(&user)?;
        Ok((user, token))
    }

    fn token_for(&self, user: &User) -> CtxResult<String> {
        let user_id = user.id.as_ref().ok_or_else(|| {
            self.ctx.to_ctx_error(AppError::Generic {
                description: "user record without id".to_string(),
            })
        })?;
        self.jwt
            .create_by_login(&user_id.to_raw())
            .map_err(|source| self.ctx.to_ctx_error(AppError::Generic { description: source }))
    }
}

fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| e.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> Result<(), String> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| e.to_string())?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|e| e.to_string())
}
