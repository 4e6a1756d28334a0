//! One [`ResourceHandler`] per resource kind.
//!
//! Handler bodies are written against `anyhow::Result<Render>` and converted to
//! an [`Outcome`] once, in [`finish`]: [`CommandError`] becomes a usage or
//! argument failure, [`ApiError`] a not-found or remote failure.

use anyhow::Result;
use hicloud_api::types::IpTarget;
use hicloud_api::{ApiError, ApiResult, CloudApi};
use hicloud_console::{
    Candidate, ErrorKind, IdCache, IdEntry, LookupError, Outcome, Render, ResourceHandler,
    ResourceKind,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

pub mod backup;
pub mod batch;
pub mod config_cmd;
pub mod firewall;
pub mod floating_ip;
pub mod image;
pub mod iso;
pub mod keys;
pub mod load_balancer;
pub mod location;
pub mod metrics;
pub mod network;
pub mod pricing;
pub mod primary_ip;
pub mod project;
pub mod snapshot;
pub mod vm;
pub mod volume;

/// Local failures raised by handler bodies.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    /// A confirmation asked from inside the handler was declined.
    #[error("operation cancelled")]
    Cancelled,
}

/// API tokens per project key.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    tokens: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(tokens: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    pub fn token(&self, project: &str) -> Option<&str> {
        self.tokens.get(project).map(String::as_str)
    }
}

/// Everything the handlers share.
#[derive(Clone)]
pub struct HandlerContext {
    pub api: Rc<CloudApi>,
    pub credentials: Rc<Credentials>,
    /// Configuration file the session was started from, if any.
    pub config_path: Option<PathBuf>,
}

/// Registration order is the order of `help` and of command completion.
pub fn all_handlers(ctx: &HandlerContext) -> Vec<Box<dyn ResourceHandler>> {
    let api = &ctx.api;
    vec![
        Box::new(vm::VmHandler::new(api.clone())),
        Box::new(snapshot::SnapshotHandler::new(api.clone())),
        Box::new(backup::BackupHandler::new(api.clone())),
        Box::new(image::ImageHandler::new(api.clone())),
        Box::new(iso::IsoHandler::new(api.clone())),
        Box::new(volume::VolumeHandler::new(api.clone())),
        Box::new(network::NetworkHandler::new(api.clone())),
        Box::new(firewall::FirewallHandler::new(api.clone())),
        Box::new(floating_ip::FloatingIpHandler::new(api.clone())),
        Box::new(primary_ip::PrimaryIpHandler::new(api.clone())),
        Box::new(load_balancer::LoadBalancerHandler::new(api.clone())),
        Box::new(keys::KeysHandler::new(api.clone())),
        Box::new(location::LocationHandler::new(api.clone())),
        Box::new(location::DatacenterHandler::new(api.clone())),
        Box::new(metrics::MetricsHandler::new(api.clone())),
        Box::new(pricing::PricingHandler::new(api.clone())),
        Box::new(project::ProjectHandler::new(api.clone(), ctx.credentials.clone())),
        Box::new(config_cmd::ConfigHandler::new(
            ctx.config_path.clone(),
            ctx.credentials.clone(),
        )),
        Box::new(batch::BatchHandler::new(api.clone())),
    ]
}

// ============================================================================
// Result plumbing
// ============================================================================

pub fn finish(result: Result<Render>) -> Outcome {
    let err = match result {
        Ok(render) => return Outcome::Success(render),
        Err(e) => e,
    };
    if let Some(cmd) = err.downcast_ref::<CommandError>() {
        let kind = match cmd {
            CommandError::Usage(_) => ErrorKind::Usage,
            CommandError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CommandError::NotFound(_) => ErrorKind::NotFound,
            CommandError::Cancelled => return Outcome::Cancelled,
        };
        return Outcome::failure(kind, cmd.to_string());
    }
    if let Some(api) = err.downcast_ref::<ApiError>() {
        let kind = if api.is_not_found() {
            ErrorKind::NotFound
        } else {
            ErrorKind::Remote
        };
        return Outcome::failure(kind, format!("{err:#}"));
    }
    Outcome::failure(ErrorKind::Internal, format!("{err:#}"))
}

/// Shape check run before any confirmation prompt; the error is shown as the
/// command's outcome.
pub fn precheck(result: Result<(), CommandError>) -> Result<(), Outcome> {
    result.map_err(|e| finish(Err(e.into())))
}

/// Turn a remote 404 on a single resource into `"<what> <id> not found"`.
pub fn found<T>(result: ApiResult<T>, what: &str, id: u64) -> Result<T> {
    match result {
        Ok(v) => Ok(v),
        Err(ApiError::NotFound(_)) => Err(CommandError::NotFound(format!("{what} {id} not found")).into()),
        Err(e) => Err(e.into()),
    }
}

/// Parse a positive integer id.
pub fn parse_id(raw: &str, what: &str) -> Result<u64, CommandError> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(CommandError::InvalidArgument(format!(
            "Invalid {what} ID: {raw} (must be a positive integer)"
        ))),
    }
}

/// `enable` / `disable` as a bool.
pub fn parse_toggle(raw: &str) -> Result<bool, CommandError> {
    match raw {
        "enable" => Ok(true),
        "disable" => Ok(false),
        other => Err(CommandError::InvalidArgument(format!(
            "Expected 'enable' or 'disable', got '{other}'"
        ))),
    }
}

/// Ids given either as one comma separated token or as several tokens.
/// Returns the valid ids and the tokens that were not ids.
pub fn parse_id_list(args: &[String]) -> (Vec<u64>, Vec<String>) {
    let parts: Vec<&str> = match args {
        [single] if single.contains(',') => single.split(',').collect(),
        many => many.iter().map(String::as_str).collect(),
    };
    let mut ids = Vec::new();
    let mut invalid = Vec::new();
    for part in parts.into_iter().map(str::trim).filter(|p| !p.is_empty()) {
        match parse_id(part, "server") {
            Ok(id) => ids.push(id),
            Err(_) => invalid.push(part.to_string()),
        }
    }
    (ids, invalid)
}

/// `ipv4` / `ipv6`.
pub fn parse_ip_type(raw: &str) -> Result<&'static str, CommandError> {
    match raw {
        "ipv4" => Ok("ipv4"),
        "ipv6" => Ok("ipv6"),
        other => Err(CommandError::InvalidArgument(format!(
            "Expected 'ipv4' or 'ipv6', got '{other}'"
        ))),
    }
}

/// A numeric target is a server id, anything else a location or datacenter name.
pub fn ip_target(raw: &str) -> IpTarget {
    match parse_id(raw, "VM") {
        Ok(id) => IpTarget::Server(id),
        Err(_) => IpTarget::Place(raw.to_string()),
    }
}

/// Confirmation for `dns <id> <ip> [ptr|reset]` on an IP resource.
pub fn dns_prompt(what: &str, args: &[String]) -> Option<String> {
    match args {
        [id, address] => Some(format!("Reset reverse DNS for {address} on {what} {id}?")),
        [id, address, ptr] if ptr == "reset" => {
            Some(format!("Reset reverse DNS for {address} on {what} {id}?"))
        }
        [id, address, ptr] => Some(format!("Set reverse DNS for {address} to {ptr} on {what} {id}?")),
        _ => None,
    }
}

/// Trailing free text joined back into one string.
pub fn rest(args: &[String]) -> Option<String> {
    (!args.is_empty()).then(|| args.join(" "))
}

pub fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

pub fn or_dash<S: AsRef<str>>(value: Option<S>) -> String {
    match value {
        Some(v) if !v.as_ref().is_empty() => v.as_ref().to_string(),
        _ => "-".to_string(),
    }
}

/// `2024-03-01T12:00:00+00:00` → `2024-03-01 12:00`.
pub fn short_date(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => or_dash(Some(raw)),
    }
}

// ============================================================================
// Completion helpers
// ============================================================================

/// List endpoint backing each completable resource kind.
pub fn fetch_ids(api: &CloudApi, kind: ResourceKind) -> ApiResult<Vec<IdEntry>> {
    let entries = match kind {
        ResourceKind::Server => api
            .list_servers()?
            .into_iter()
            .map(|s| IdEntry::new(s.id, s.name))
            .collect(),
        ResourceKind::Snapshot | ResourceKind::Backup | ResourceKind::Image => {
            let filter = match kind {
                ResourceKind::Snapshot => Some("snapshot"),
                ResourceKind::Backup => Some("backup"),
                _ => None,
            };
            api.list_images(filter)?
                .iter()
                .map(|i| IdEntry::new(i.id, i.label()))
                .collect()
        }
        ResourceKind::Iso => api
            .list_isos()?
            .into_iter()
            .map(|i| IdEntry::new(i.id, i.name))
            .collect(),
        ResourceKind::Volume => api
            .list_volumes()?
            .into_iter()
            .map(|v| IdEntry::new(v.id, v.name))
            .collect(),
        ResourceKind::Network => api
            .list_networks()?
            .into_iter()
            .map(|n| IdEntry::new(n.id, n.name))
            .collect(),
        ResourceKind::Firewall => api
            .list_firewalls()?
            .into_iter()
            .map(|f| IdEntry::new(f.id, f.name))
            .collect(),
        ResourceKind::FloatingIp => api
            .list_floating_ips()?
            .into_iter()
            .map(|f| IdEntry::new(f.id, f.ip))
            .collect(),
        ResourceKind::PrimaryIp => api
            .list_primary_ips()?
            .into_iter()
            .map(|p| IdEntry::new(p.id, p.ip))
            .collect(),
        ResourceKind::LoadBalancer => api
            .list_load_balancers()?
            .into_iter()
            .map(|l| IdEntry::new(l.id, l.name))
            .collect(),
        ResourceKind::SshKey => api
            .list_ssh_keys()?
            .into_iter()
            .map(|k| IdEntry::new(k.id, k.name))
            .collect(),
        ResourceKind::Location => api
            .list_locations()?
            .into_iter()
            .map(|l| IdEntry::new(l.id, l.name))
            .collect(),
        ResourceKind::Datacenter => api
            .list_datacenters()?
            .into_iter()
            .map(|d| IdEntry::new(d.id, d.name))
            .collect(),
    };
    Ok(entries)
}

/// Id candidates for `kind`, served from the cache when fresh.
pub fn id_candidates(
    cache: &mut IdCache,
    api: &CloudApi,
    kind: ResourceKind,
) -> Result<Vec<Candidate>, LookupError> {
    let entries = cache.lookup_or_fetch(kind, || {
        fetch_ids(api, kind).map_err(|e| LookupError::Unavailable(e.to_string()))
    })?;
    Ok(entries
        .iter()
        .map(|e| Candidate::labelled(e.id.clone(), &e.label))
        .collect())
}

/// Names rather than ids, for arguments the API takes by name.
pub fn name_candidates(
    cache: &mut IdCache,
    api: &CloudApi,
    kind: ResourceKind,
) -> Result<Vec<Candidate>, LookupError> {
    let entries = cache.lookup_or_fetch(kind, || {
        fetch_ids(api, kind).map_err(|e| LookupError::Unavailable(e.to_string()))
    })?;
    Ok(entries.into_iter().map(|e| Candidate::word(e.label)).collect())
}

pub fn words(items: &[&str]) -> Vec<Candidate> {
    items.iter().map(|w| Candidate::word(*w)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("42", "VM").expect("id"), 42);
        for bad in ["0", "-1", "abc", "4.2", ""] {
            assert!(parse_id(bad, "VM").is_err(), "{bad:?}");
        }
    }

    #[test]
    fn numeric_ip_targets_are_servers() {
        assert_eq!(ip_target("42"), IpTarget::Server(42));
        assert_eq!(ip_target("fsn1"), IpTarget::Place("fsn1".into()));
        assert_eq!(rest(&[]), None);
        assert_eq!(rest(&["a".into(), "b".into()]).as_deref(), Some("a b"));
    }

    #[test]
    fn id_lists_accept_commas_or_separate_tokens() {
        let (ids, bad) = parse_id_list(&["1,2,x,3".to_string()]);
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(bad, vec!["x"]);

        let (ids, bad) = parse_id_list(&["4".to_string(), "5".to_string()]);
        assert_eq!(ids, vec![4, 5]);
        assert!(bad.is_empty());
    }

    #[test]
    fn finish_classifies_errors() {
        let usage = finish(Err(CommandError::Usage("vm info <id>".into()).into()));
        assert_eq!(usage, Outcome::failure(ErrorKind::Usage, "vm info <id>"));

        let missing = finish(Err(ApiError::NotFound("servers/9".into()).into()));
        assert!(matches!(missing, Outcome::Failure { kind: ErrorKind::NotFound, .. }));

        let remote = finish(Err(ApiError::Network("connection refused".into()).into()));
        assert!(matches!(remote, Outcome::Failure { kind: ErrorKind::Remote, .. }));

        assert_eq!(finish(Err(CommandError::Cancelled.into())), Outcome::Cancelled);
        assert!(matches!(
            finish(Err(anyhow!("boom"))),
            Outcome::Failure { kind: ErrorKind::Internal, .. }
        ));
    }

    #[test]
    fn found_names_the_missing_resource() {
        let err = found::<()>(Err(ApiError::NotFound("x".into())), "Server", 9).unwrap_err();
        assert_eq!(err.to_string(), "Server 9 not found");
    }

    #[test]
    fn dates_are_shortened() {
        assert_eq!(short_date("2024-03-01T12:34:56+00:00"), "2024-03-01 12:34");
        assert_eq!(short_date(""), "-");
    }

    proptest::proptest! {
        #[test]
        fn comma_and_token_forms_agree(ids in proptest::collection::vec(1u64..100_000, 1..8)) {
            let joined = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
            let separate: Vec<String> = ids.iter().map(u64::to_string).collect();
            let (from_commas, bad) = parse_id_list(&[joined]);
            proptest::prop_assert!(bad.is_empty());
            proptest::prop_assert_eq!(&from_commas, &ids);
            proptest::prop_assert_eq!(parse_id_list(&separate).0, ids);
        }
    }
}
