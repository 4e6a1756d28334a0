//! Resource records as returned by the API.
//!
//! Every struct is `#[serde(default)]` so partially populated payloads (and
//! fields the API adds later) never fail decoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Protection {
    pub delete: bool,
    pub rebuild: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceRef {
    pub id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Location {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub country: String,
    pub city: String,
    pub network_zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Datacenter {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Price {
    pub net: String,
    pub gross: String,
}

impl Price {
    pub fn gross_amount(&self) -> f64 {
        self.gross.trim().parse().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocationPrice {
    pub location: String,
    pub price_hourly: Price,
    pub price_monthly: Price,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerType {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub cores: u32,
    pub memory: f64,
    pub disk: u64,
    pub architecture: String,
    pub prices: Vec<LocationPrice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Ipv4 {
    pub ip: String,
    pub blocked: bool,
    pub dns_ptr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Ipv6 {
    pub ip: String,
    pub blocked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PublicNet {
    pub ipv4: Option<Ipv4>,
    pub ipv6: Option<Ipv6>,
    pub floating_ips: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Server {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub created: String,
    pub server_type: ServerType,
    pub datacenter: Datacenter,
    pub public_net: PublicNet,
    pub image: Option<Image>,
    pub iso: Option<Iso>,
    pub backup_window: Option<String>,
    pub volumes: Vec<u64>,
    pub protection: Protection,
    pub labels: BTreeMap<String, String>,
}

impl Server {
    pub fn ipv4(&self) -> &str {
        self.public_net
            .ipv4
            .as_ref()
            .map(|v| v.ip.as_str())
            .unwrap_or("-")
    }

    pub fn ipv6(&self) -> &str {
        self.public_net
            .ipv6
            .as_ref()
            .map(|v| v.ip.as_str())
            .unwrap_or("-")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CreatedFrom {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Image {
    pub id: u64,
    pub name: Option<String>,
    pub description: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub status: String,
    pub created: String,
    pub created_from: Option<CreatedFrom>,
    pub bound_to: Option<u64>,
    pub image_size: Option<f64>,
    pub disk_size: f64,
    pub os_flavor: String,
    pub os_version: Option<String>,
    pub protection: Protection,
}

impl Image {
    /// Display name: `name` for system images, `description` otherwise.
    pub fn label(&self) -> &str {
        match self.name.as_deref() {
            Some(n) if !n.is_empty() => n,
            _ => &self.description,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Iso {
    pub id: u64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub iso_type: String,
    pub architecture: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Volume {
    pub id: u64,
    pub name: String,
    pub size: u64,
    pub server: Option<u64>,
    pub location: Location,
    pub linux_device: String,
    pub status: String,
    pub format: Option<String>,
    pub created: String,
    pub protection: Protection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Subnet {
    #[serde(rename = "type")]
    pub subnet_type: String,
    pub ip_range: String,
    pub network_zone: String,
    pub gateway: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Network {
    pub id: u64,
    pub name: String,
    pub ip_range: String,
    pub subnets: Vec<Subnet>,
    pub servers: Vec<u64>,
    pub created: String,
    pub protection: Protection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FirewallRule {
    pub direction: String,
    pub protocol: String,
    pub port: Option<String>,
    pub source_ips: Vec<String>,
    pub destination_ips: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppliedTo {
    #[serde(rename = "type")]
    pub kind: String,
    pub server: Option<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Firewall {
    pub id: u64,
    pub name: String,
    pub rules: Vec<FirewallRule>,
    pub applied_to: Vec<AppliedTo>,
    pub created: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FloatingIp {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub ip: String,
    #[serde(rename = "type")]
    pub ip_type: String,
    pub server: Option<u64>,
    pub home_location: Location,
    pub blocked: bool,
    pub protection: Protection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PrimaryIp {
    pub id: u64,
    pub name: String,
    pub ip: String,
    #[serde(rename = "type")]
    pub ip_type: String,
    pub assignee_id: Option<u64>,
    pub assignee_type: String,
    pub datacenter: Datacenter,
    pub auto_delete: bool,
    pub blocked: bool,
    pub protection: Protection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerType {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub max_targets: u32,
    pub prices: Vec<LocationPrice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Algorithm {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LbTarget {
    #[serde(rename = "type")]
    pub kind: String,
    pub server: Option<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LbPublicNet {
    pub enabled: bool,
    pub ipv4: Ipv4,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancer {
    pub id: u64,
    pub name: String,
    pub algorithm: Algorithm,
    pub load_balancer_type: LoadBalancerType,
    pub location: Location,
    pub public_net: LbPublicNet,
    pub targets: Vec<LbTarget>,
    pub services: Vec<LbService>,
    pub protection: Protection,
}

/// One listener of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LbService {
    pub protocol: String,
    pub listen_port: u16,
    pub destination_port: u16,
    pub proxyprotocol: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SshKey {
    pub id: u64,
    pub name: String,
    pub fingerprint: String,
    pub public_key: String,
    pub created: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Action {
    pub id: u64,
    pub command: String,
    pub status: String,
    pub progress: u32,
    pub error: Option<ActionError>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeSeries {
    /// `(unix timestamp, value)` pairs; the API sends values as strings.
    pub values: Vec<(f64, String)>,
}

impl TimeSeries {
    pub fn numbers(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter_map(|(_, v)| v.trim().parse::<f64>().ok())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Metrics {
    pub start: String,
    pub end: String,
    pub step: f64,
    pub time_series: BTreeMap<String, TimeSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TypePricing {
    pub id: u64,
    pub name: String,
    pub prices: Vec<LocationPrice>,
}

impl TypePricing {
    /// Monthly gross price of the first listed location.
    pub fn monthly_gross(&self) -> f64 {
        self.prices
            .first()
            .map(|p| p.price_monthly.gross_amount())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VolumePricing {
    pub price_per_gb_month: Price,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FloatingIpPricing {
    pub price_monthly: Price,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Pricing {
    pub currency: String,
    pub vat_rate: String,
    pub server_types: Vec<TypePricing>,
    pub load_balancer_types: Vec<TypePricing>,
    pub volume: VolumePricing,
    pub floating_ip: FloatingIpPricing,
}

/// Parameters for `POST /servers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateServer {
    pub name: String,
    pub server_type: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<u64>,
    pub start_after_create: bool,
}

/// Parameters for `POST /floating_ips` and `POST /primary_ips`.
///
/// An address either goes to a server right away or is parked at a place:
/// a location for floating IPs, a datacenter for primary IPs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIp {
    pub name: String,
    /// `ipv4` or `ipv6`.
    pub ip_type: String,
    pub target: IpTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpTarget {
    Server(u64),
    Place(String),
}
