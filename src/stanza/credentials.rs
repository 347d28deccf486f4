use anyhow::{Context, Result};

use super::{ENV_PREFIX, SecretKeySelector, Stanza};
use crate::error::BridgeError;

/// Looks up secret values referenced by the stanza. Implemented by the host,
/// which knows where secrets live.
pub trait SecretResolver {
    fn resolve(&self, selector: &SecretKeySelector) -> Result<String>;
}

impl<F> SecretResolver for F
where
    F: Fn(&SecretKeySelector) -> Result<String>,
{
    fn resolve(&self, selector: &SecretKeySelector) -> Result<String> {
        self(selector)
    }
}

fn resolve_optional(
    resolver: &dyn SecretResolver,
    selector: Option<&SecretKeySelector>,
) -> Result<Option<String>> {
    let Some(selector) = selector else {
        return Ok(None);
    };
    let value = resolver
        .resolve(selector)
        .with_context(|| format!("can't read key {} of secret {}", selector.key, selector.name))?;
    Ok(Some(value))
}

/// Credential variables for every repository, numbered the same way as the
/// encoded stanza: S3 repositories first, then Azure.
pub fn credentials_env(stanza: &Stanza, resolver: &dyn SecretResolver) -> Result<Vec<String>> {
    let mut env = Vec::new();
    let mut ordinal = 0usize;

    for repo in &stanza.s3_repositories {
        ordinal += 1;
        let prefix = format!("{}REPO{}_", ENV_PREFIX, ordinal);
        if let Some(cipher) = &repo.cipher
            && let Some(pass) = resolve_optional(resolver, cipher.pass_reference.as_ref())?
        {
            env.push(format!("{}CIPHER_PASS={}", prefix, pass));
        }
        let secret_ref = repo.secret_ref.as_ref();
        if let Some(key) =
            resolve_optional(resolver, secret_ref.and_then(|s| s.access_key_id.as_ref()))?
        {
            env.push(format!("{}S3_KEY={}", prefix, key));
        }
        if let Some(secret) =
            resolve_optional(resolver, secret_ref.and_then(|s| s.secret_access_key.as_ref()))?
        {
            env.push(format!("{}S3_KEY_SECRET={}", prefix, secret));
        }
        env.push(format!("{}TYPE=s3", prefix));
    }

    for repo in &stanza.azure_repositories {
        ordinal += 1;
        let prefix = format!("{}REPO{}_", ENV_PREFIX, ordinal);
        if let Some(cipher) = &repo.cipher
            && let Some(pass) = resolve_optional(resolver, cipher.pass_reference.as_ref())?
        {
            env.push(format!("{}CIPHER_PASS={}", prefix, pass));
        }
        let key_ref = repo.secret_ref.as_ref().and_then(|s| s.key_reference.as_ref());
        if let Some(key) = resolve_optional(resolver, key_ref)? {
            env.push(format!("{}AZURE_KEY={}", prefix, key));
        }
        env.push(format!("{}TYPE=azure", prefix));
    }

    Ok(env)
}

/// `PGBACKREST_REPO=<n>` for a user supplied repository number. Repository
/// `1` is always accepted so a single implicit repository keeps working.
pub fn selected_repository_env(stanza: &Stanza, selected: &str) -> Result<String, BridgeError> {
    let available = stanza.repository_count();
    let invalid = || BridgeError::InvalidRepository {
        selected: selected.to_string(),
        available,
    };
    let index: usize = selected.trim().parse().map_err(|_| invalid())?;
    if index == 0 || (index != 1 && index > available) {
        return Err(invalid());
    }
    Ok(format!("{}REPO={}", ENV_PREFIX, index))
}
