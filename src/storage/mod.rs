//! Object-store client for attachment uploads.
//!
//! Talks to an S3-compatible gateway: bearer-token auth, `ListObjectsV2`
//! style XML listings and plain `PUT` uploads. Quota accounting sums object
//! sizes across the whole bucket one listing page at a time, so the check is
//! O(number of objects) and concurrent uploads can race past it; the ceiling
//! is advisory, not transactional.

use crate::{cli::globals::GlobalArgs, parley::APP_USER_AGENT};
use anyhow::{anyhow, Result};
use rand::Rng;
use reqwest::Client;
use secrecy::ExposeSecret;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, instrument};

/// Attachments are capped at 5 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Accepted attachment content types.
pub const ALLOWED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One page of a bucket listing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub sizes: Vec<u64>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Check size and content-type constraints; all violations join into a
/// single human-readable message.
pub fn validate_file(size: u64, content_type: &str) -> Result<(), String> {
    let mut violations = Vec::new();

    if size > MAX_UPLOAD_BYTES {
        violations.push("File size should be less than 5MB");
    }

    if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
        violations.push("File type should be JPEG or PNG");
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations.join(", "))
    }
}

/// Generate a storage key decoupled from the user-supplied filename:
/// `<millisecond timestamp>-<6-char base36 suffix>.<original extension>`.
#[must_use]
pub fn unique_key(original_name: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());

    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    // "photo.final.png" keeps "png"; names without a dot keep the whole name,
    // matching the original-filename split semantics
    let extension = original_name.rsplit('.').next().unwrap_or_default();

    format!("{timestamp}-{suffix}.{extension}")
}

/// Public URL for an uploaded object.
#[must_use]
pub fn public_url(globals: &GlobalArgs, key: &str) -> String {
    format!("https://{}/{key}", globals.storage_public_domain)
}

fn bucket_url(globals: &GlobalArgs) -> String {
    format!("{}/{}", globals.storage_endpoint, globals.storage_bucket)
}

/// Aggregate bucket usage in bytes, following continuation tokens until the
/// listing is exhausted.
#[instrument(skip(globals))]
pub async fn current_usage(globals: &GlobalArgs) -> Result<u64> {
    let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

    let mut total: u64 = 0;
    let mut continuation_token: Option<String> = None;

    loop {
        let page = list_page(&client, globals, continuation_token.as_deref()).await?;

        total += page.sizes.iter().sum::<u64>();

        if !page.is_truncated {
            break;
        }

        match page.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    debug!("Bucket usage: {} bytes", total);

    Ok(total)
}

async fn list_page(
    client: &Client,
    globals: &GlobalArgs,
    continuation_token: Option<&str>,
) -> Result<ListPage> {
    let mut query: Vec<(&str, &str)> = vec![("list-type", "2")];

    if let Some(token) = continuation_token {
        query.push(("continuation-token", token));
    }

    let response = client
        .get(bucket_url(globals))
        .query(&query)
        .bearer_auth(globals.storage_token.expose_secret())
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();

        error!("Error listing bucket: {}", status);

        return Err(anyhow!("{status}"));
    }

    Ok(parse_list_page(&response.text().await?))
}

/// Upload one object, preserving content type and the original filename as
/// metadata. A single attempt; the caller maps failure to its own response.
#[instrument(skip(globals, body))]
pub async fn put_object(
    globals: &GlobalArgs,
    key: &str,
    body: Vec<u8>,
    content_type: &str,
    original_name: &str,
) -> Result<()> {
    let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

    let response = client
        .put(format!("{}/{key}", bucket_url(globals)))
        .bearer_auth(globals.storage_token.expose_secret())
        .header("Content-Type", content_type)
        .header("x-amz-meta-original-name", original_name)
        .body(body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();

        error!("Error uploading object {}: {}", key, status);

        return Err(anyhow!("{status}"));
    }

    Ok(())
}

/// Minimal `ListBucketResult` reader; only `Size`, `IsTruncated` and
/// `NextContinuationToken` matter for the usage scan.
fn parse_list_page(xml: &str) -> ListPage {
    ListPage {
        sizes: tag_values(xml, "Size")
            .iter()
            .filter_map(|value| value.parse().ok())
            .collect(),
        is_truncated: tag_values(xml, "IsTruncated")
            .first()
            .is_some_and(|value| *value == "true"),
        next_continuation_token: tag_values(xml, "NextContinuationToken")
            .first()
            .map(ToString::to_string),
    }
}

fn tag_values<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let mut values = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        rest = &rest[start + open.len()..];

        let Some(end) = rest.find(&close) else {
            break;
        };

        values.push(rest[..end].trim());
        rest = &rest[end + close.len()..];
    }

    values
}
