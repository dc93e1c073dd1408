use std::path::PathBuf;

use anyhow::Context as _;

use crate::model::WordPressCredentials;
use crate::store::{read_json, remove_if_exists, validate_record_id, write_json_atomic};

/// Per-site WordPress credentials, kept apart from the site records so that
/// listing sites never touches secrets.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: base_dir.into().join("credentials"),
        }
    }

    fn path(&self, site_id: &str) -> anyhow::Result<PathBuf> {
        validate_record_id(site_id)?;
        Ok(self.dir.join(format!("{site_id}.json")))
    }

    pub async fn save(&self, site_id: &str, creds: &WordPressCredentials) -> anyhow::Result<()> {
        validate_credentials(creds)?;
        let path = self.path(site_id)?;
        write_json_atomic(&path, creds)
            .await
            .with_context(|| format!("save credentials for site {site_id}"))?;
        tracing::debug!(site_id, "saved credentials");
        Ok(())
    }

    pub async fn get(&self, site_id: &str) -> anyhow::Result<Option<WordPressCredentials>> {
        let path = self.path(site_id)?;
        read_json(&path)
            .await
            .with_context(|| format!("load credentials for site {site_id}"))
    }

    pub async fn delete(&self, site_id: &str) -> anyhow::Result<bool> {
        let path = self.path(site_id)?;
        remove_if_exists(&path).await
    }
}

pub fn validate_credentials(creds: &WordPressCredentials) -> anyhow::Result<()> {
    let url = creds.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("site url must start with http:// or https://: {url:?}");
    }
    let parsed = url::Url::parse(url).with_context(|| format!("parse site url: {url}"))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        anyhow::bail!("site url has no host: {url:?}");
    }
    if creds.username.trim().is_empty() {
        anyhow::bail!("username is required");
    }
    if creds.application_password.trim().is_empty() {
        anyhow::bail!("application password is required");
    }
    Ok(())
}
