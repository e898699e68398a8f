//! # Parley (chat gateway)
//!
//! `parley` is the server-side gateway for a chat web application. It owns the
//! authentication request flow and image-attachment uploads:
//!
//! - **Login / register** (`POST /user/login`, `POST /user/register`): form
//!   submissions are schema-validated, gated on a bot-challenge verification,
//!   and only then checked against the user store. Each submission resolves to
//!   exactly one terminal status (`success`, `failed`, `invalid_data`, and for
//!   registration `user_exists`).
//! - **Challenge proxy** (`POST /api/turnstile`): forwards client-issued
//!   challenge tokens to the remote siteverify endpoint together with the
//!   shared secret and a caller-generated idempotency key.
//! - **Attachment upload** (`POST /files/upload`): validates size and content
//!   type, checks the aggregate bucket usage against the configured quota, and
//!   stores the file under a collision-resistant key.
//!
//! Configuration is parsed once at startup into [`cli::globals::GlobalArgs`]
//! and passed by reference into every component; nothing reads the process
//! environment at call sites.

pub mod cli;
pub mod parley;
pub mod storage;
pub mod turnstile;
