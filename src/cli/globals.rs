use secrecy::SecretString;

/// Shared runtime configuration, built once in `cli::dispatch` and passed by
/// reference into the server, the challenge verifier and the storage client.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    /// Public base URL of the application, used to reach the internal
    /// `/api/turnstile` proxy and as the allowed CORS origin.
    pub app_url: String,
    pub turnstile_secret: SecretString,
    /// Remote siteverify endpoint the proxy forwards tokens to.
    pub siteverify_url: String,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_token: SecretString,
    /// Domain serving uploaded objects, used to derive public URLs.
    pub storage_public_domain: String,
    /// Quota ceiling for the whole bucket, in bytes.
    pub storage_limit_bytes: u64,
}

/// Convert the env-configured quota from gigabytes to bytes.
#[must_use]
pub const fn gigabytes(gb: u64) -> u64 {
    gb.saturating_mul(1024 * 1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_gigabytes() {
        assert_eq!(gigabytes(0), 0);
        assert_eq!(gigabytes(1), 1_073_741_824);
        assert_eq!(gigabytes(2), 2_147_483_648);
        // saturates instead of overflowing
        assert_eq!(gigabytes(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_global_args() {
        let args = GlobalArgs {
            app_url: "https://chat.example.com".to_string(),
            turnstile_secret: SecretString::from("0x-secret".to_string()),
            siteverify_url: "https://verifier.example.com/siteverify".to_string(),
            storage_endpoint: "https://storage.example.com".to_string(),
            storage_bucket: "attachments".to_string(),
            storage_token: SecretString::default(),
            storage_public_domain: "files.example.com".to_string(),
            storage_limit_bytes: gigabytes(1),
        };

        assert_eq!(args.app_url, "https://chat.example.com");
        assert_eq!(args.turnstile_secret.expose_secret(), "0x-secret");
        assert_eq!(args.storage_token.expose_secret(), "");
        assert_eq!(args.storage_limit_bytes, 1_073_741_824);

        // secrets must not leak through Debug
        let debug = format!("{args:?}");
        assert!(!debug.contains("0x-secret"));
    }
}
