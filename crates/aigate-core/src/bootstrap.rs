use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use aigate_common::{PrincipalId, QuotaKind, QuotaWindowSpec};
use aigate_provider_core::AdapterRegistry;
use aigate_provider_impl::{AnthropicAdapter, GeminiAdapter, OpenAiAdapter};
use aigate_router::{Router, RouteTable, RouterConfig};
use aigate_storage::{InMemoryStore, SeaOrmStore, Store};

use crate::bus::StreamingEventBus;
use crate::gateway::{Gateway, ModelRoute};
use crate::quota::QuotaEnforcer;
use crate::state::{AppState, SecretLookup};
use crate::trace::TraceStore;
use crate::usage::UsageSink;

/// Command-line/environment surface (§6). Every field is `Option` so clap's
/// CLI-over-env precedence can be distinguished from "unset" and overlaid
/// onto file-based route/quota config the same way the teacher overlays
/// CLI/ENV onto its DB-stored global config.
#[derive(Debug, Clone, Parser)]
#[command(name = "aigate", version, about = "Multi-provider AI gateway")]
pub struct CliArgs {
    /// Storage DSN. Omit for the zero-configuration in-memory store.
    #[arg(long, env = "AIGATE_DSN")]
    pub dsn: Option<String>,

    /// Bind host.
    #[arg(long, env = "AIGATE_HOST")]
    pub host: Option<String>,

    /// Bind port.
    #[arg(long, env = "AIGATE_PORT")]
    pub port: Option<String>,

    /// Admin key (plaintext). Only its hash is ever persisted or kept
    /// resident.
    #[arg(long, env = "AIGATE_ADMIN_KEY")]
    pub admin_key: Option<String>,

    /// Path to the route table + quota config JSON file (§6 persisted
    /// state: the route table and per-principal quota windows are this
    /// core's own config, not the external admin collaborator's).
    #[arg(long, env = "AIGATE_ROUTES_PATH")]
    pub routes_path: Option<String>,

    /// Retry budget R (§4.2 default 2).
    #[arg(long, env = "AIGATE_RETRY_BUDGET")]
    pub retry_budget: Option<String>,

    /// Per-attempt ceiling in seconds.
    #[arg(long, env = "AIGATE_PER_ATTEMPT_CEILING_SECS")]
    pub per_attempt_ceiling_secs: Option<String>,

    /// Usage Sink ring buffer capacity (default 2000).
    #[arg(long, env = "AIGATE_USAGE_BUFFER_CAPACITY")]
    pub usage_buffer_capacity: Option<String>,

    /// Whether the Usage Sink writes synchronously before acknowledging.
    #[arg(long, env = "AIGATE_USAGE_DURABLE")]
    pub usage_durable: Option<String>,

    /// Trace Store per-request cap (default 500).
    #[arg(long, env = "AIGATE_TRACE_PER_REQUEST_CAP")]
    pub trace_per_request_cap: Option<String>,

    /// Trace Store global ring capacity (default 4000).
    #[arg(long, env = "AIGATE_TRACE_GLOBAL_RING")]
    pub trace_global_ring: Option<String>,
}

/// One entry of the route/quota config file named by `--routes-path`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RouteConfigEntry {
    pub declared_model: String,
    pub target_proto: aigate_transform::Proto,
    pub candidates: Vec<aigate_common::Candidate>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
pub struct PrincipalQuotaEntry {
    pub principal: PrincipalId,
    pub windows: Vec<QuotaWindowSpec>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
pub struct RoutesFile {
    #[serde(default)]
    pub routes: Vec<RouteConfigEntry>,
    #[serde(default)]
    pub quotas: Vec<PrincipalQuotaEntry>,
}

pub struct Bootstrap {
    pub storage: Arc<dyn Store>,
    pub state: Arc<AppState>,
    pub registry: Arc<AdapterRegistry>,
    pub args: CliArgs,
}

pub async fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    bootstrap(CliArgs::parse()).await
}

pub async fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let dsn = sanitize_optional_env_value(args.dsn.clone());
    let admin_key = sanitize_optional_env_value(args.admin_key.clone());
    let retry_budget = parse_u32_env_value(args.retry_budget.clone(), "AIGATE_RETRY_BUDGET")?.unwrap_or(2);
    let per_attempt_ceiling_secs =
        parse_u64_env_value(args.per_attempt_ceiling_secs.clone(), "AIGATE_PER_ATTEMPT_CEILING_SECS")?.unwrap_or(30);
    let usage_capacity =
        parse_usize_env_value(args.usage_buffer_capacity.clone(), "AIGATE_USAGE_BUFFER_CAPACITY")?.unwrap_or(2000);
    let usage_durable = parse_bool_env_value(args.usage_durable.clone(), "AIGATE_USAGE_DURABLE")?.unwrap_or(true);
    let trace_per_request_cap =
        parse_usize_env_value(args.trace_per_request_cap.clone(), "AIGATE_TRACE_PER_REQUEST_CAP")?.unwrap_or(500);
    let trace_global_ring =
        parse_usize_env_value(args.trace_global_ring.clone(), "AIGATE_TRACE_GLOBAL_RING")?.unwrap_or(4000);

    let storage: Arc<dyn Store> = match &dsn {
        Some(dsn) => Arc::new(SeaOrmStore::connect(dsn).await.context("connect storage")?),
        None => Arc::new(InMemoryStore::new()),
    };

    let registry = Arc::new(build_registry());

    let routes_file = match &args.routes_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("read routes file {path}"))?;
            serde_json::from_str::<RoutesFile>(&raw).with_context(|| format!("parse routes file {path}"))?
        }
        None => RoutesFile::default(),
    };

    let mut route_table = RouteTable::new();
    let mut model_routes = HashMap::new();
    for entry in &routes_file.routes {
        route_table.set_route(entry.declared_model.clone(), entry.candidates.clone());
        model_routes.insert(
            entry.declared_model.clone(),
            ModelRoute { candidate_count: entry.candidates.len(), target_proto: entry.target_proto },
        );
    }

    let router = Arc::new(Router::new(
        registry.clone(),
        route_table,
        |_provider| aigate_common::BreakerParams::default(),
        RouterConfig { retry_budget, per_attempt_ceiling: std::time::Duration::from_secs(per_attempt_ceiling_secs) },
    ));

    let quota = Arc::new(QuotaEnforcer::new(storage.clone()));
    let now = crate::quota::unix_now();
    for entry in &routes_file.quotas {
        let config: crate::quota::PrincipalQuotaConfig =
            entry.windows.iter().map(|spec| (spec.kind, *spec)).collect();
        quota.configure_principal(&entry.principal, &config, now);
    }

    let usage = Arc::new(UsageSink::with_capacity(storage.clone(), usage_durable, usage_capacity));
    let trace = Arc::new(TraceStore::with_capacity(storage.clone(), trace_per_request_cap, trace_global_ring));
    let bus = Arc::new(StreamingEventBus::new());

    let gateway = Gateway::new(router, model_routes, quota.clone(), usage.clone(), trace.clone(), bus.clone());

    let admin_key_hash = admin_key.as_deref().map(hash_admin_key);
    let secrets: SecretLookup = Arc::new(move |name: &str| {
        if name == "admin_key_hash" {
            admin_key_hash.clone()
        } else {
            None
        }
    });

    let state = Arc::new(AppState::new(gateway, quota, usage, trace, bus, secrets));

    Ok(Bootstrap { storage, state, registry, args })
}

/// Adapters are registered by name from the route file's candidates; actual
/// credentials/base URLs come from the external secrets collaborator
/// (§9), so this only wires up the three wire families with placeholder
/// clients. Callers that need real upstream calls replace these via
/// `AdapterRegistry::register` after bootstrap returns.
fn build_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    let client = wreq::Client::builder().build().expect("default wreq client builds");
    registry.register(Arc::new(OpenAiAdapter::new(
        "openai",
        client.clone(),
        "https://api.openai.com",
        String::new(),
    )));
    registry.register(Arc::new(AnthropicAdapter::new(
        "anthropic",
        client.clone(),
        "https://api.anthropic.com",
        String::new(),
    )));
    registry.register(Arc::new(GeminiAdapter::new(
        "gemini",
        client,
        "https://generativelanguage.googleapis.com",
        String::new(),
    )));
    registry
}

fn hash_admin_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

fn sanitize_optional_env_value(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() || (trimmed.starts_with("${") && trimmed.ends_with('}')) {
        return None;
    }
    Some(trimmed)
}

fn parse_u32_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u32>> {
    let Some(raw) = sanitize_optional_env_value(value) else { return Ok(None) };
    Ok(Some(raw.parse::<u32>().with_context(|| format!("invalid {env_name} value: {raw}"))?))
}

fn parse_u64_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u64>> {
    let Some(raw) = sanitize_optional_env_value(value) else { return Ok(None) };
    Ok(Some(raw.parse::<u64>().with_context(|| format!("invalid {env_name} value: {raw}"))?))
}

fn parse_usize_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<usize>> {
    let Some(raw) = sanitize_optional_env_value(value) else { return Ok(None) };
    Ok(Some(raw.parse::<usize>().with_context(|| format!("invalid {env_name} value: {raw}"))?))
}

fn parse_bool_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<bool>> {
    let Some(raw) = sanitize_optional_env_value(value) else { return Ok(None) };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(anyhow::anyhow!("invalid {env_name} value: {raw}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstraps_with_in_memory_store_and_no_routes_file() {
        let bootstrap = bootstrap(CliArgs {
            dsn: None,
            host: None,
            port: None,
            admin_key: Some("s3cr3t".to_string()),
            routes_path: None,
            retry_budget: None,
            per_attempt_ceiling_secs: None,
            usage_buffer_capacity: None,
            usage_durable: None,
            trace_per_request_cap: None,
            trace_global_ring: None,
        })
        .await
        .unwrap();

        assert!((bootstrap.state.secrets)("admin_key_hash").is_some());
        assert!((bootstrap.state.secrets)("unknown").is_none());
    }
}
