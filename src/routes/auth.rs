use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::{prelude::*, PgConnection};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    activity::ActivityEntry,
    auth::{password, AuthenticatedUser, ClientInfo},
    error::{AppError, AppResult},
    models::{NewRefreshToken, NewRoleAssignment, NewUser, RefreshToken, User},
    policy::Role,
    schema::{refresh_tokens, role_assignments, users},
    state::AppState,
};

use crate::schema::refresh_tokens::dsl as refresh_dsl;

const REFRESH_COOKIE_NAME: &str = "refresh_token";

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_SUSPENDED: &str = "suspended";
pub const STATUS_DELETED: &str = "deleted";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub email: String,
    pub status: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("email", "email must be a valid address"));
    }
    if payload.password.len() < 8 {
        return Err(AppError::validation(
            "password",
            "password must be at least 8 characters",
        ));
    }

    let mut conn = state.db()?;

    let existing: Option<User> = users::table
        .filter(users::email.eq(&email))
        .first(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(AppError::validation("email", "email is already registered"));
    }

    let password_hash = password::hash_password(&payload.password)?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash,
        status: STATUS_ACTIVE.to_string(),
    };

    conn.transaction::<(), diesel::result::Error, _>(|conn| {
        diesel::insert_into(users::table)
            .values(&new_user)
            .execute(conn)?;
        diesel::insert_into(role_assignments::table)
            .values(&NewRoleAssignment {
                id: Uuid::new_v4(),
                user_id: new_user.id,
                role: Role::User.as_str().to_string(),
                company_id: None,
            })
            .execute(conn)?;
        Ok(())
    })?;

    state.activity.record(
        ActivityEntry::new("register", "user")
            .user(new_user.id)
            .entity(new_user.id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: new_user.id,
            email,
            status: STATUS_ACTIVE.to_string(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let mut conn = state.db()?;

    let user: User = match users::table
        .filter(users::email.eq(payload.email.trim().to_lowercase()))
        .first(&mut conn)
        .optional()?
    {
        Some(user) => user,
        None => return Err(AppError::unauthorized()),
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    match user.status.as_str() {
        STATUS_ACTIVE => {}
        STATUS_SUSPENDED => return Err(AppError::forbidden("Account is suspended")),
        STATUS_PENDING => return Err(AppError::forbidden("Account is pending activation")),
        // deleted accounts are indistinguishable from unknown ones
        _ => return Err(AppError::unauthorized()),
    }

    let (role, company_id) = primary_role(&mut conn, user.id)?;

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, role, company_id)
        .map_err(AppError::from)?;

    let now = Utc::now();
    let refresh_value = generate_refresh_token();
    let refresh_hash = hash_refresh_token(&refresh_value);
    let refresh_expires_at = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    let new_refresh = NewRefreshToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        token_hash: refresh_hash,
        issued_at: now,
        expires_at: refresh_expires_at,
    };

    diesel::insert_into(refresh_tokens::table)
        .values(&new_refresh)
        .execute(&mut conn)?;

    state.activity.record(
        ActivityEntry::new("login", "user")
            .user(user.id)
            .entity(user.id)
            .request_meta(client.ip_address, client.user_agent),
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(&state, &refresh_value, refresh_expires_at)?,
    );

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
        }),
    ))
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let refresh_value = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let hashed = hash_refresh_token(refresh_value);
    let mut conn = state.db()?;
    let now = Utc::now();

    let token = match refresh_dsl::refresh_tokens
        .filter(refresh_dsl::token_hash.eq(&hashed))
        .filter(refresh_dsl::revoked_at.is_null())
        .filter(refresh_dsl::expires_at.gt(now))
        .first::<RefreshToken>(&mut conn)
    {
        Ok(token) => token,
        Err(diesel::result::Error::NotFound) => return Err(AppError::unauthorized()),
        Err(err) => return Err(AppError::from(err)),
    };

    diesel::update(refresh_dsl::refresh_tokens.filter(refresh_dsl::id.eq(token.id)))
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let user: User = users::table
        .find(token.user_id)
        .first(&mut conn)
        .map_err(AppError::from)?;

    if user.status != STATUS_ACTIVE {
        return Err(AppError::unauthorized());
    }

    let (role, company_id) = primary_role(&mut conn, user.id)?;

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, role, company_id)
        .map_err(AppError::from)?;

    let new_refresh_value = generate_refresh_token();
    let new_refresh_hash = hash_refresh_token(&new_refresh_value);
    let new_refresh_expires = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    let new_refresh = NewRefreshToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        token_hash: new_refresh_hash,
        issued_at: now,
        expires_at: new_refresh_expires,
    };

    diesel::insert_into(refresh_tokens::table)
        .values(&new_refresh)
        .execute(&mut conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(&state, &new_refresh_value, new_refresh_expires)?,
    );

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut conn = state.db()?;
    let now = Utc::now();
    let mut rows_affected = 0;

    if let Some(cookies) = jar {
        if let Some(value) = cookies.get(REFRESH_COOKIE_NAME) {
            let hashed = hash_refresh_token(value);
            rows_affected = diesel::update(
                refresh_dsl::refresh_tokens
                    .filter(refresh_dsl::token_hash.eq(hashed))
                    .filter(refresh_dsl::user_id.eq(user.user_id))
                    .filter(refresh_dsl::revoked_at.is_null()),
            )
            .set((
                refresh_dsl::revoked_at.eq(now),
                refresh_dsl::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .unwrap_or(0);
        }
    }

    if rows_affected == 0 {
        let _ = diesel::update(
            refresh_dsl::refresh_tokens
                .filter(refresh_dsl::user_id.eq(user.user_id))
                .filter(refresh_dsl::revoked_at.is_null()),
        )
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn);
    }

    state.activity.record(
        ActivityEntry::new("logout", "user")
            .user(user.user_id)
            .entity(user.user_id)
            .request_meta(client.ip_address, client.user_agent),
    );

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_refresh_cookie(&state)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

/// The caller's active role: the highest-precedence assignment, carrying its
/// company scope.
pub fn primary_role(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> AppResult<(Role, Option<Uuid>)> {
    let assignments: Vec<(String, Option<Uuid>)> = role_assignments::table
        .filter(role_assignments::user_id.eq(user_id))
        .select((role_assignments::role, role_assignments::company_id))
        .load(conn)?;

    assignments
        .into_iter()
        .filter_map(|(role, company_id)| role.parse::<Role>().ok().map(|role| (role, company_id)))
        .max_by_key(|(role, _)| *role)
        .ok_or_else(|| AppError::internal(format!("user {user_id} has no role assignments")))
}

fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn build_refresh_cookie(
    state: &AppState,
    token: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<HeaderValue> {
    let max_age = ChronoDuration::days(state.config.refresh_token_expiry_days).num_seconds();

    let mut parts = vec![format!("{}={}", REFRESH_COOKIE_NAME, token)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push(format!("Max-Age={}", max_age));
    parts.push(format!("Expires={}", expires_at.to_rfc2822()));
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }

    HeaderValue::from_str(&parts.join("; "))
        .map_err(|err| AppError::internal(format!("invalid refresh cookie: {err}")))
}

fn build_clear_refresh_cookie(state: &AppState) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{}=", REFRESH_COOKIE_NAME)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }

    HeaderValue::from_str(&parts.join("; "))
        .map_err(|err| AppError::internal(format!("invalid refresh cookie: {err}")))
}
