pub mod health;
pub use self::health::health;

pub mod user_register;
pub use self::user_register::register;

pub mod user_login;
pub use self::user_login::login;

pub mod turnstile;
pub mod upload;

// common functions for the handlers
use axum::http::{header::AUTHORIZATION, HeaderMap};
use regex::Regex;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use ulid::Ulid;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

pub fn valid_password(password: &str) -> bool {
    // minimum of 6 characters
    password.chars().count() >= 6
}

/// Extract the session token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

pub async fn user_exists(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
    let query = "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS exists";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(email)
        .fetch_one(pool)
        .instrument(span)
        .await
    {
        Ok(row) => Ok(row.get("exists")),
        Err(e) => Err(e),
    }
}

/// Create a user record; password hashing stays in the store layer (pgcrypto).
pub async fn create_user(pool: &PgPool, email: &str, password: &str) -> Result<(), sqlx::Error> {
    let query = "INSERT INTO users (email, password) VALUES ($1, crypt($2, gen_salt('bf')))";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(password)
        .execute(pool)
        .instrument(span)
        .await
        .map(|_| ())
}

/// Compare submitted credentials against the stored hash inside the store
/// layer; unknown users and bad passwords are indistinguishable.
pub async fn check_credentials(
    pool: &PgPool,
    email: &str,
    password: &str,
) -> Result<bool, sqlx::Error> {
    let query = "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND password = crypt($2, password)) AS valid";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(email)
        .bind(password)
        .fetch_one(pool)
        .instrument(span)
        .await
    {
        Ok(row) => Ok(row.get("valid")),
        Err(e) => Err(e),
    }
}

/// Issue a session token for a signed-in user.
pub async fn issue_session(pool: &PgPool, email: &str) -> Result<String, sqlx::Error> {
    let token = Ulid::new().to_string();

    let query = "INSERT INTO sessions (token, email) VALUES ($1, $2)";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&token)
        .bind(email)
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(token)
}

/// Resolve a session token to its user, if the session exists.
pub async fn session_email(pool: &PgPool, token: &str) -> Result<Option<String>, sqlx::Error> {
    let query = "SELECT email FROM sessions WHERE token = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    Ok(row.map(|row| row.get("email")))
}
