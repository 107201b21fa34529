use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::jwt::verify_token;
use crate::error::AppError;
use crate::models::user::UserRole;
use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn require_teacher(&self) -> Result<(), AppError> {
        if self.role == UserRole::Teacher {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_student(&self) -> Result<(), AppError> {
        if self.role == UserRole::Student {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let token_data = verify_token(token, &state.config)?;

    let auth_user = AuthUser {
        id: token_data.claims.sub,
        role: token_data.claims.role,
    };

    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}
