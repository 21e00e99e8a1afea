//! REST endpoints for account registration, login and user listing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::auth::{jwt, password};
use crate::state::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserSummary,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct DeletedUser {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub message: String,
    pub deleted_user: DeletedUser,
}

// --- Handlers ---

/// POST /register
/// Create a new account. Username and email are unique; the password is
/// bcrypt-hashed before it touches the database.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, (StatusCode, String)> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Username cannot be empty".to_string()));
    }
    if req.password.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Password cannot be empty".to_string()));
    }

    let db = state.db.clone();
    let display_name = req.display_name.clone();
    let email = req.email.clone();
    let plaintext = req.password.clone();
    let uname = username.clone();

    let result = tokio::task::spawn_blocking(move || {
        // bcrypt is deliberately slow; keep it off the async workers
        let password_hash = password::hash_password(&plaintext)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hash: {}", e)))?;

        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {}", e)))?;

        let taken: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1",
                rusqlite::params![uname],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if taken {
            return Err((StatusCode::BAD_REQUEST, "Username already exists".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (username, display_name, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![uname, display_name, email, password_hash, now],
        )
        // Unique email collisions land here
        .map_err(|_| (StatusCode::BAD_REQUEST, "Error creating user".to_string()))?;

        Ok((conn.last_insert_rowid(), uname))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    let (user_id, username) = result;
    tracing::info!("User registered: {} (id {})", username, user_id);

    Ok(Json(RegisterResponse {
        message: "User created successfully".to_string(),
        user: UserSummary {
            id: user_id,
            username,
        },
    }))
}

/// POST /login
/// Verify credentials and issue an access token. A missing user and a wrong
/// password are indistinguishable to the caller.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    let db = state.db.clone();
    let username = req.username.clone();
    let plaintext = req.password.clone();

    let verified = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE username = ?1",
                rusqlite::params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        // bcrypt verify stays inside the blocking task too
        match row {
            Some((user_id, hash)) if password::verify_password(&plaintext, &hash) => {
                Ok(Some(user_id))
            }
            _ => Ok::<_, StatusCode>(None),
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let Some(user_id) = verified else {
        tracing::warn!(username = %req.username, "Login rejected: invalid credentials");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let access_token = jwt::issue_access_token(
        &state.jwt_secret,
        user_id,
        &req.username,
        state.access_token_expire_minutes,
    )
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    tracing::info!(user_id, username = %req.username, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// GET /me
/// The authenticated user's own profile. 401 if the account vanished after
/// the token was issued.
pub async fn me(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<MeResponse>, StatusCode> {
    let user_id = claims.user_id()?;
    let db = state.db.clone();

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        conn.query_row(
            "SELECT id, username, display_name FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok(MeResponse {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                })
            },
        )
        .map_err(|_| StatusCode::UNAUTHORIZED)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(result))
}

/// GET /users
/// Public directory of registered users (id + username only).
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UsersResponse>, StatusCode> {
    let db = state.db.clone();

    let users = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut stmt = conn
            .prepare("SELECT id, username FROM users ORDER BY id")
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let users: Vec<UserSummary> = stmt
            .query_map([], |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, StatusCode>(users)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(UsersResponse { users }))
}

/// DELETE /users/{user_id}
/// Delete an account. Only the account owner may delete it. Participant
/// rows follow via FK cascade; sent messages stay and render with an
/// unknown sender.
pub async fn delete_user(
    State(state): State<AppState>,
    claims: Claims,
    Path(user_id): Path<i64>,
) -> Result<Json<DeleteUserResponse>, StatusCode> {
    if claims.user_id()? != user_id {
        return Err(StatusCode::FORBIDDEN);
    }

    let db = state.db.clone();
    let username = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let username: String = conn
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                rusqlite::params![user_id],
                |row| row.get(0),
            )
            .map_err(|_| StatusCode::NOT_FOUND)?;

        conn.execute(
            "DELETE FROM users WHERE id = ?1",
            rusqlite::params![user_id],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(username)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    tracing::info!(user_id, username = %username, "User deleted their account");

    Ok(Json(DeleteUserResponse {
        message: "User deleted successfully".to_string(),
        deleted_user: DeletedUser { username },
    }))
}
