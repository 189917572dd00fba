//! Command implementations.
//!
//! Each command writes its result to the given writer so output can be
//! captured in tests.

use std::io::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;
use lkp_core::{EntityName, Namespace, TokenManager, TokenStore, issue_key};

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print the composed access key for a service/user pair.
pub async fn key<M>(manager: &M, service: &str, user: &str, out: &mut impl Write) -> Result<()>
where
    M: TokenManager + ?Sized,
{
    let key = issue_key(manager, service, user)
        .await
        .with_context(|| format!("Failed to issue key for {}/{}", service, user))?;
    writeln!(out, "{}", key.expose())?;
    Ok(())
}

/// Print the token for one entity, creating it if needed.
pub async fn token<M>(
    manager: &M,
    namespace: Namespace,
    name: &str,
    out: &mut impl Write,
) -> Result<()>
where
    M: TokenManager + ?Sized,
{
    let token = manager
        .get_or_create(namespace, &EntityName::new(name))
        .await
        .with_context(|| format!("Failed to issue {} token for '{}'", namespace, name))?;
    writeln!(out, "{}", token.as_str())?;
    Ok(())
}

/// Print the token for one entity if it exists.
///
/// Returns `false` when the entity has no registration.
pub async fn lookup<M>(
    manager: &M,
    namespace: Namespace,
    name: &str,
    out: &mut impl Write,
) -> Result<bool>
where
    M: TokenManager + ?Sized,
{
    let found = manager
        .lookup(namespace, &EntityName::new(name))
        .await
        .with_context(|| format!("Failed to look up {} '{}'", namespace, name))?;

    match found {
        Some(token) => {
            writeln!(out, "{}", token.as_str())?;
            Ok(true)
        }
        None => {
            tracing::info!("No {} registered as '{}'", namespace, name);
            Ok(false)
        }
    }
}

/// Print every registration in a namespace.
pub async fn list<S>(
    store: &S,
    namespace: Namespace,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()>
where
    S: TokenStore + ?Sized,
{
    let registrations = store
        .list(namespace)
        .await
        .with_context(|| format!("Failed to list {} registrations", namespace))?;

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &registrations)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for reg in &registrations {
                writeln!(out, "{}\t{}", reg.entity_name, reg.token.as_str())?;
            }
        }
    }
    Ok(())
}
