//! `POST /auth/login` — exchanges a username/password for a bearer JWT.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use conduit_config::verify_password;
use conduit_core::GatewayError;
use serde::{Deserialize, Serialize};

use crate::auth::{session_secret, JwtManager};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    admin: bool,
}

pub async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> ApiResult<Json<LoginResponse>> {
    let user = state.config.get_user(&req.username).await?.ok_or(GatewayError::Unauthenticated)?;
    if user.disabled || !verify_password(&req.password, &user.hashed_password) {
        return Err(GatewayError::Unauthenticated.into());
    }
    let token = JwtManager::new(session_secret()).issue(&user.username, user.admin)?;
    Ok(Json(LoginResponse { token, admin: user.admin }))
}
