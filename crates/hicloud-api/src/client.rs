//! Typed operations over a [`Transport`].

use crate::error::{ApiError, ApiResult};
use crate::transport::{Method, Transport};
use crate::types::*;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::rc::Rc;
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://api.hetzner.cloud/v1";

const ACTION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const ACTION_TIMEOUT: Duration = Duration::from_secs(300);

pub struct CloudApi {
    transport: Rc<dyn Transport>,
    poll_interval: Duration,
    action_timeout: Duration,
}

impl CloudApi {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self {
            transport,
            poll_interval: ACTION_POLL_INTERVAL,
            action_timeout: ACTION_TIMEOUT,
        }
    }

    pub fn with_action_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.action_timeout = timeout;
        self
    }

    pub fn set_token(&self, token: &str) {
        self.transport.set_token(token);
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn call(&self, method: Method, path: &str, body: Option<&Value>) -> ApiResult<Value> {
        self.transport.request(method, path, body)
    }

    fn field<T: DeserializeOwned>(value: Value, key: &str, path: &str) -> ApiResult<T> {
        let inner = match value {
            Value::Object(mut map) => map.remove(key),
            _ => None,
        }
        .ok_or_else(|| ApiError::Decode(format!("{path}: missing `{key}` in response")))?;
        serde_json::from_value(inner).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }

    fn get<T: DeserializeOwned>(&self, path: &str, key: &str) -> ApiResult<T> {
        let v = self.call(Method::Get, path, None)?;
        Self::field(v, key, path)
    }

    /// Issue a write and block until every action it spawned has finished.
    fn act(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<Value> {
        let resp = self.call(method, path, body.as_ref())?;
        for id in action_ids(&resp) {
            self.wait_for_action(id)?;
        }
        Ok(resp)
    }

    /// Poll `actions/{id}` until it succeeds, fails or the timeout expires.
    pub fn wait_for_action(&self, id: u64) -> ApiResult<Action> {
        let started = Instant::now();
        loop {
            let action: Action = self.get(&format!("actions/{id}"), "action")?;
            match action.status.as_str() {
                "success" => return Ok(action),
                "error" => {
                    let message = action
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(ApiError::ActionFailed { id, message });
                }
                _ => {}
            }
            if started.elapsed() >= self.action_timeout {
                return Err(ApiError::Timeout(id));
            }
            tracing::debug!(id, progress = action.progress, "waiting for action");
            std::thread::sleep(self.poll_interval);
        }
    }

    // ========================================================================
    // Servers
    // ========================================================================

    pub fn list_servers(&self) -> ApiResult<Vec<Server>> {
        self.get("servers", "servers")
    }

    pub fn get_server(&self, id: u64) -> ApiResult<Server> {
        self.get(&format!("servers/{id}"), "server")
    }

    pub fn create_server(&self, params: &CreateServer) -> ApiResult<Server> {
        let body = serde_json::to_value(params).map_err(|e| ApiError::Decode(e.to_string()))?;
        let resp = self.act(Method::Post, "servers", Some(body))?;
        Self::field(resp, "server", "servers")
    }

    pub fn delete_server(&self, id: u64) -> ApiResult<()> {
        self.act(Method::Delete, &format!("servers/{id}"), None)
            .map(drop)
    }

    pub fn power_on(&self, id: u64) -> ApiResult<()> {
        self.server_action(id, "poweron", json!({}))
    }

    /// Graceful ACPI shutdown.
    pub fn shutdown(&self, id: u64) -> ApiResult<()> {
        self.server_action(id, "shutdown", json!({}))
    }

    pub fn power_off(&self, id: u64) -> ApiResult<()> {
        self.server_action(id, "poweroff", json!({}))
    }

    /// Shutdown, or a hard power off when the shutdown request is refused.
    pub fn stop_server(&self, id: u64) -> ApiResult<()> {
        match self.shutdown(id) {
            Err(e) if !e.is_not_found() => {
                tracing::warn!(server = id, error = %e, "shutdown refused, powering off");
                self.power_off(id)
            }
            other => other,
        }
    }

    pub fn reboot(&self, id: u64) -> ApiResult<()> {
        self.server_action(id, "reboot", json!({}))
    }

    pub fn rename_server(&self, id: u64, name: &str) -> ApiResult<Server> {
        let path = format!("servers/{id}");
        let resp = self.call(Method::Put, &path, Some(&json!({ "name": name })))?;
        Self::field(resp, "server", &path)
    }

    pub fn change_server_type(&self, id: u64, server_type: &str, upgrade_disk: bool) -> ApiResult<()> {
        self.server_action(
            id,
            "change_type",
            json!({ "server_type": server_type, "upgrade_disk": upgrade_disk }),
        )
    }

    pub fn rebuild_server(&self, id: u64, image: &str) -> ApiResult<()> {
        self.server_action(id, "rebuild", json!({ "image": image }))
    }

    pub fn create_image(&self, server: u64, description: Option<&str>, kind: &str) -> ApiResult<Image> {
        let mut body = json!({ "type": kind });
        if let Some(desc) = description {
            body["description"] = json!(desc);
        }
        let path = format!("servers/{server}/actions/create_image");
        let resp = self.act(Method::Post, &path, Some(body))?;
        Self::field(resp, "image", &path)
    }

    pub fn enable_backup(&self, id: u64, window: Option<&str>) -> ApiResult<()> {
        let mut body = json!({});
        if let Some(window) = window {
            body["backup_window"] = json!(window);
        }
        self.server_action(id, "enable_backup", body)
    }

    pub fn disable_backup(&self, id: u64) -> ApiResult<()> {
        self.server_action(id, "disable_backup", json!({}))
    }

    pub fn attach_iso(&self, server: u64, iso: u64) -> ApiResult<()> {
        self.server_action(server, "attach_iso", json!({ "iso": iso.to_string() }))
    }

    pub fn detach_iso(&self, server: u64) -> ApiResult<()> {
        self.server_action(server, "detach_iso", json!({}))
    }

    pub fn attach_to_network(&self, server: u64, network: u64, ip: Option<&str>) -> ApiResult<()> {
        let mut body = json!({ "network": network });
        if let Some(ip) = ip {
            body["ip"] = json!(ip);
        }
        self.server_action(server, "attach_to_network", body)
    }

    pub fn detach_from_network(&self, server: u64, network: u64) -> ApiResult<()> {
        self.server_action(server, "detach_from_network", json!({ "network": network }))
    }

    pub fn list_server_types(&self) -> ApiResult<Vec<ServerType>> {
        self.get("server_types", "server_types")
    }

    pub fn server_metrics(
        &self,
        id: u64,
        kind: &str,
        start: &str,
        end: &str,
        step: Option<u64>,
    ) -> ApiResult<Metrics> {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("type", kind);
        query.append_pair("start", start);
        query.append_pair("end", end);
        if let Some(step) = step {
            query.append_pair("step", &step.to_string());
        }
        self.get(&format!("servers/{id}/metrics?{}", query.finish()), "metrics")
    }

    fn server_action(&self, id: u64, action: &str, body: Value) -> ApiResult<()> {
        self.act(Method::Post, &format!("servers/{id}/actions/{action}"), Some(body))
            .map(drop)
    }

    // ========================================================================
    // Images and ISOs
    // ========================================================================

    /// `kind` is `snapshot`, `backup`, `system` or `app`; `None` lists all.
    pub fn list_images(&self, kind: Option<&str>) -> ApiResult<Vec<Image>> {
        match kind {
            Some(kind) => self.get(&format!("images?type={kind}"), "images"),
            None => self.get("images", "images"),
        }
    }

    pub fn get_image(&self, id: u64) -> ApiResult<Image> {
        self.get(&format!("images/{id}"), "image")
    }

    pub fn update_image(&self, id: u64, description: &str) -> ApiResult<Image> {
        let path = format!("images/{id}");
        let resp = self.call(Method::Put, &path, Some(&json!({ "description": description })))?;
        Self::field(resp, "image", &path)
    }

    /// Register an image from a disk image URL. The response carries either
    /// the image or only its id.
    pub fn import_image(&self, name: &str, url: &str, description: Option<&str>) -> ApiResult<u64> {
        let mut body = json!({ "name": name, "url": url });
        if let Some(desc) = description {
            body["description"] = json!(desc);
        }
        let resp = self.act(Method::Post, "images", Some(body))?;
        resp.pointer("/image/id")
            .or_else(|| resp.get("image_id"))
            .and_then(Value::as_u64)
            .ok_or_else(|| ApiError::Decode("images: missing image id in response".to_string()))
    }

    pub fn delete_image(&self, id: u64) -> ApiResult<()> {
        self.call(Method::Delete, &format!("images/{id}"), None)
            .map(drop)
    }

    pub fn list_isos(&self) -> ApiResult<Vec<Iso>> {
        self.get("isos", "isos")
    }

    pub fn get_iso(&self, id: u64) -> ApiResult<Iso> {
        self.get(&format!("isos/{id}"), "iso")
    }

    // ========================================================================
    // Volumes
    // ========================================================================

    pub fn list_volumes(&self) -> ApiResult<Vec<Volume>> {
        self.get("volumes", "volumes")
    }

    pub fn get_volume(&self, id: u64) -> ApiResult<Volume> {
        self.get(&format!("volumes/{id}"), "volume")
    }

    pub fn create_volume(&self, name: &str, size: u64, location: &str) -> ApiResult<Volume> {
        let body = json!({
            "name": name,
            "size": size,
            "location": location,
            "format": "ext4",
            "automount": false,
        });
        let resp = self.act(Method::Post, "volumes", Some(body))?;
        Self::field(resp, "volume", "volumes")
    }

    pub fn delete_volume(&self, id: u64) -> ApiResult<()> {
        self.call(Method::Delete, &format!("volumes/{id}"), None)
            .map(drop)
    }

    pub fn attach_volume(&self, id: u64, server: u64, automount: bool) -> ApiResult<()> {
        self.volume_action(id, "attach", json!({ "server": server, "automount": automount }))
    }

    pub fn detach_volume(&self, id: u64) -> ApiResult<()> {
        self.volume_action(id, "detach", json!({}))
    }

    pub fn resize_volume(&self, id: u64, size: u64) -> ApiResult<()> {
        self.volume_action(id, "resize", json!({ "size": size }))
    }

    pub fn set_volume_protection(&self, id: u64, delete: bool) -> ApiResult<()> {
        self.volume_action(id, "change_protection", json!({ "delete": delete }))
    }

    fn volume_action(&self, id: u64, action: &str, body: Value) -> ApiResult<()> {
        self.act(Method::Post, &format!("volumes/{id}/actions/{action}"), Some(body))
            .map(drop)
    }

    // ========================================================================
    // Networks and firewalls
    // ========================================================================

    pub fn list_networks(&self) -> ApiResult<Vec<Network>> {
        self.get("networks", "networks")
    }

    pub fn get_network(&self, id: u64) -> ApiResult<Network> {
        self.get(&format!("networks/{id}"), "network")
    }

    pub fn create_network(&self, name: &str, ip_range: &str) -> ApiResult<Network> {
        let resp = self.call(
            Method::Post,
            "networks",
            Some(&json!({ "name": name, "ip_range": ip_range })),
        )?;
        Self::field(resp, "network", "networks")
    }

    pub fn rename_network(&self, id: u64, name: &str) -> ApiResult<Network> {
        let path = format!("networks/{id}");
        let resp = self.call(Method::Put, &path, Some(&json!({ "name": name })))?;
        Self::field(resp, "network", &path)
    }

    pub fn delete_network(&self, id: u64) -> ApiResult<()> {
        self.call(Method::Delete, &format!("networks/{id}"), None)
            .map(drop)
    }

    pub fn add_subnet(&self, id: u64, ip_range: &str, zone: &str) -> ApiResult<()> {
        let body = json!({ "type": "cloud", "ip_range": ip_range, "network_zone": zone });
        self.act(Method::Post, &format!("networks/{id}/actions/add_subnet"), Some(body))
            .map(drop)
    }

    pub fn set_network_protection(&self, id: u64, delete: bool) -> ApiResult<()> {
        self.act(
            Method::Post,
            &format!("networks/{id}/actions/change_protection"),
            Some(json!({ "delete": delete })),
        )
        .map(drop)
    }

    pub fn list_firewalls(&self) -> ApiResult<Vec<Firewall>> {
        self.get("firewalls", "firewalls")
    }

    pub fn get_firewall(&self, id: u64) -> ApiResult<Firewall> {
        self.get(&format!("firewalls/{id}"), "firewall")
    }

    /// A new firewall without rules; servers can be applied at creation.
    pub fn create_firewall(&self, name: &str, servers: &[u64]) -> ApiResult<Firewall> {
        let mut body = json!({ "name": name });
        if !servers.is_empty() {
            body["apply_to"] = Value::Array(server_refs(servers));
        }
        let resp = self.act(Method::Post, "firewalls", Some(body))?;
        Self::field(resp, "firewall", "firewalls")
    }

    pub fn rename_firewall(&self, id: u64, name: &str) -> ApiResult<Firewall> {
        let path = format!("firewalls/{id}");
        let resp = self.call(Method::Put, &path, Some(&json!({ "name": name })))?;
        Self::field(resp, "firewall", &path)
    }

    pub fn delete_firewall(&self, id: u64) -> ApiResult<()> {
        self.call(Method::Delete, &format!("firewalls/{id}"), None)
            .map(drop)
    }

    pub fn apply_firewall(&self, id: u64, servers: &[u64]) -> ApiResult<()> {
        self.firewall_resources(id, "apply_to_resources", servers)
    }

    pub fn remove_firewall(&self, id: u64, servers: &[u64]) -> ApiResult<()> {
        self.firewall_resources(id, "remove_from_resources", servers)
    }

    fn firewall_resources(&self, id: u64, action: &str, servers: &[u64]) -> ApiResult<()> {
        let targets = server_refs(servers);
        let key = if action == "apply_to_resources" {
            "apply_to"
        } else {
            "remove_from"
        };
        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), Value::Array(targets));
        self.act(
            Method::Post,
            &format!("firewalls/{id}/actions/{action}"),
            Some(Value::Object(body)),
        )
        .map(drop)
    }

    // ========================================================================
    // Floating and primary IPs
    // ========================================================================

    pub fn list_floating_ips(&self) -> ApiResult<Vec<FloatingIp>> {
        self.get("floating_ips", "floating_ips")
    }

    pub fn get_floating_ip(&self, id: u64) -> ApiResult<FloatingIp> {
        self.get(&format!("floating_ips/{id}"), "floating_ip")
    }

    pub fn create_floating_ip(&self, params: &CreateIp, description: Option<&str>) -> ApiResult<FloatingIp> {
        let mut body = json!({ "name": params.name, "type": params.ip_type });
        match &params.target {
            IpTarget::Server(id) => body["server"] = json!(id),
            IpTarget::Place(location) => body["home_location"] = json!(location),
        }
        if let Some(desc) = description {
            body["description"] = json!(desc);
        }
        let resp = self.act(Method::Post, "floating_ips", Some(body))?;
        Self::field(resp, "floating_ip", "floating_ips")
    }

    pub fn update_floating_ip(&self, id: u64, name: &str, description: Option<&str>) -> ApiResult<FloatingIp> {
        let path = format!("floating_ips/{id}");
        let mut body = json!({ "name": name });
        if let Some(desc) = description {
            body["description"] = json!(desc);
        }
        let resp = self.call(Method::Put, &path, Some(&body))?;
        Self::field(resp, "floating_ip", &path)
    }

    /// `None` resets the reverse DNS entry of `ip`.
    pub fn change_floating_ip_dns(&self, id: u64, ip: &str, ptr: Option<&str>) -> ApiResult<()> {
        self.ip_action("floating_ips", id, "change_dns_ptr", json!({ "ip": ip, "dns_ptr": ptr }))
    }

    pub fn assign_floating_ip(&self, id: u64, server: u64) -> ApiResult<()> {
        self.ip_action("floating_ips", id, "assign", json!({ "server": server }))
    }

    pub fn unassign_floating_ip(&self, id: u64) -> ApiResult<()> {
        self.ip_action("floating_ips", id, "unassign", json!({}))
    }

    pub fn set_floating_ip_protection(&self, id: u64, delete: bool) -> ApiResult<()> {
        self.ip_action("floating_ips", id, "change_protection", json!({ "delete": delete }))
    }

    pub fn delete_floating_ip(&self, id: u64) -> ApiResult<()> {
        self.call(Method::Delete, &format!("floating_ips/{id}"), None)
            .map(drop)
    }

    pub fn list_primary_ips(&self) -> ApiResult<Vec<PrimaryIp>> {
        self.get("primary_ips", "primary_ips")
    }

    pub fn get_primary_ip(&self, id: u64) -> ApiResult<PrimaryIp> {
        self.get(&format!("primary_ips/{id}"), "primary_ip")
    }

    pub fn create_primary_ip(&self, params: &CreateIp, auto_delete: bool) -> ApiResult<PrimaryIp> {
        let mut body = json!({
            "name": params.name,
            "type": params.ip_type,
            "assignee_type": "server",
            "auto_delete": auto_delete,
        });
        match &params.target {
            IpTarget::Server(id) => body["assignee_id"] = json!(id),
            IpTarget::Place(datacenter) => body["datacenter"] = json!(datacenter),
        }
        let resp = self.act(Method::Post, "primary_ips", Some(body))?;
        Self::field(resp, "primary_ip", "primary_ips")
    }

    pub fn update_primary_ip(&self, id: u64, name: &str, auto_delete: Option<bool>) -> ApiResult<PrimaryIp> {
        let path = format!("primary_ips/{id}");
        let mut body = json!({ "name": name });
        if let Some(auto_delete) = auto_delete {
            body["auto_delete"] = json!(auto_delete);
        }
        let resp = self.call(Method::Put, &path, Some(&body))?;
        Self::field(resp, "primary_ip", &path)
    }

    pub fn change_primary_ip_dns(&self, id: u64, ip: &str, ptr: Option<&str>) -> ApiResult<()> {
        self.ip_action("primary_ips", id, "change_dns_ptr", json!({ "ip": ip, "dns_ptr": ptr }))
    }

    pub fn assign_primary_ip(&self, id: u64, server: u64) -> ApiResult<()> {
        self.ip_action(
            "primary_ips",
            id,
            "assign",
            json!({ "assignee_id": server, "assignee_type": "server" }),
        )
    }

    pub fn unassign_primary_ip(&self, id: u64) -> ApiResult<()> {
        self.ip_action("primary_ips", id, "unassign", json!({}))
    }

    pub fn set_primary_ip_protection(&self, id: u64, delete: bool) -> ApiResult<()> {
        self.ip_action("primary_ips", id, "change_protection", json!({ "delete": delete }))
    }

    pub fn delete_primary_ip(&self, id: u64) -> ApiResult<()> {
        self.call(Method::Delete, &format!("primary_ips/{id}"), None)
            .map(drop)
    }

    fn ip_action(&self, collection: &str, id: u64, action: &str, body: Value) -> ApiResult<()> {
        self.act(
            Method::Post,
            &format!("{collection}/{id}/actions/{action}"),
            Some(body),
        )
        .map(drop)
    }

    // ========================================================================
    // Load balancers
    // ========================================================================

    pub fn list_load_balancers(&self) -> ApiResult<Vec<LoadBalancer>> {
        self.get("load_balancers", "load_balancers")
    }

    pub fn get_load_balancer(&self, id: u64) -> ApiResult<LoadBalancer> {
        self.get(&format!("load_balancers/{id}"), "load_balancer")
    }

    pub fn create_load_balancer(&self, name: &str, lb_type: &str, location: &str) -> ApiResult<LoadBalancer> {
        let body = json!({
            "name": name,
            "load_balancer_type": lb_type,
            "location": location,
            "public_interface": true,
        });
        let resp = self.act(Method::Post, "load_balancers", Some(body))?;
        Self::field(resp, "load_balancer", "load_balancers")
    }

    pub fn list_load_balancer_types(&self) -> ApiResult<Vec<LoadBalancerType>> {
        self.get("load_balancer_types", "load_balancer_types")
    }

    pub fn delete_load_balancer(&self, id: u64) -> ApiResult<()> {
        self.call(Method::Delete, &format!("load_balancers/{id}"), None)
            .map(drop)
    }

    pub fn change_lb_algorithm(&self, id: u64, algorithm: &str) -> ApiResult<()> {
        self.lb_action(id, "change_algorithm", json!({ "type": algorithm }))
    }

    pub fn add_lb_target(&self, id: u64, server: u64) -> ApiResult<()> {
        self.lb_action(
            id,
            "add_target",
            json!({ "type": "server", "server": { "id": server } }),
        )
    }

    pub fn remove_lb_target(&self, id: u64, server: u64) -> ApiResult<()> {
        self.lb_action(
            id,
            "remove_target",
            json!({ "type": "server", "server": { "id": server } }),
        )
    }

    pub fn add_lb_service(&self, id: u64, service: &LbService) -> ApiResult<()> {
        let body = serde_json::to_value(service).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.lb_action(id, "add_service", body)
    }

    pub fn delete_lb_service(&self, id: u64, listen_port: u16) -> ApiResult<()> {
        self.lb_action(id, "delete_service", json!({ "listen_port": listen_port }))
    }

    fn lb_action(&self, id: u64, action: &str, body: Value) -> ApiResult<()> {
        self.act(
            Method::Post,
            &format!("load_balancers/{id}/actions/{action}"),
            Some(body),
        )
        .map(drop)
    }

    // ========================================================================
    // Keys, locations, datacenters, pricing
    // ========================================================================

    pub fn list_ssh_keys(&self) -> ApiResult<Vec<SshKey>> {
        self.get("ssh_keys", "ssh_keys")
    }

    pub fn get_ssh_key(&self, id: u64) -> ApiResult<SshKey> {
        self.get(&format!("ssh_keys/{id}"), "ssh_key")
    }

    pub fn delete_ssh_key(&self, id: u64) -> ApiResult<()> {
        self.call(Method::Delete, &format!("ssh_keys/{id}"), None)
            .map(drop)
    }

    pub fn list_locations(&self) -> ApiResult<Vec<Location>> {
        self.get("locations", "locations")
    }

    pub fn get_location(&self, id: u64) -> ApiResult<Location> {
        self.get(&format!("locations/{id}"), "location")
    }

    pub fn list_datacenters(&self) -> ApiResult<Vec<Datacenter>> {
        self.get("datacenters", "datacenters")
    }

    pub fn get_datacenter(&self, id: u64) -> ApiResult<Datacenter> {
        self.get(&format!("datacenters/{id}"), "datacenter")
    }

    pub fn get_pricing(&self) -> ApiResult<Pricing> {
        self.get("pricing", "pricing")
    }
}

fn server_refs(servers: &[u64]) -> Vec<Value> {
    servers
        .iter()
        .map(|s| json!({ "type": "server", "server": { "id": s } }))
        .collect()
}

/// Ids of the `action` / `actions` a write response reports.
fn action_ids(resp: &Value) -> Vec<u64> {
    let mut ids = Vec::new();
    if let Some(id) = resp.pointer("/action/id").and_then(Value::as_u64) {
        ids.push(id);
    }
    if let Some(actions) = resp.get("actions").and_then(Value::as_array) {
        ids.extend(actions.iter().filter_map(|a| a.get("id").and_then(Value::as_u64)));
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn api(mock: &Rc<MockTransport>) -> CloudApi {
        CloudApi::new(mock.clone()).with_action_polling(Duration::ZERO, Duration::from_secs(5))
    }

    #[test]
    fn list_servers_unwraps_the_collection_key() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Get,
            "servers",
            json!({ "servers": [{ "id": 1, "name": "a" }, { "id": 2, "name": "b" }] }),
        ));
        let servers = api(&mock).list_servers().expect("list");
        assert_eq!(servers.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn missing_collection_key_is_a_decode_error() {
        let mock = Rc::new(MockTransport::new().with(Method::Get, "volumes", json!({})));
        let err = api(&mock).list_volumes().unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn actions_are_awaited_after_a_write() {
        let mock = Rc::new(
            MockTransport::new()
                .with(
                    Method::Post,
                    "servers/5/actions/poweron",
                    json!({ "action": { "id": 77, "status": "running" } }),
                )
                .with(
                    Method::Get,
                    "actions/77",
                    json!({ "action": { "id": 77, "status": "success", "progress": 100 } }),
                ),
        );
        api(&mock).power_on(5).expect("power on");
        assert_eq!(mock.calls_to(Method::Get, "actions/77"), 1);
    }

    #[test]
    fn failed_action_surfaces_its_message() {
        let mock = Rc::new(
            MockTransport::new()
                .with(
                    Method::Post,
                    "volumes/3/actions/detach",
                    json!({ "action": { "id": 9 } }),
                )
                .with(
                    Method::Get,
                    "actions/9",
                    json!({ "action": { "id": 9, "status": "error", "error": { "code": "x", "message": "volume busy" } } }),
                ),
        );
        let err = api(&mock).detach_volume(3).unwrap_err();
        assert_eq!(err.to_string(), "action 9 failed: volume busy");
    }

    #[test]
    fn running_action_times_out() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Get,
            "actions/4",
            json!({ "action": { "id": 4, "status": "running" } }),
        ));
        let api = CloudApi::new(mock.clone()).with_action_polling(Duration::ZERO, Duration::ZERO);
        assert!(matches!(api.wait_for_action(4), Err(ApiError::Timeout(4))));
    }

    #[test]
    fn firewall_apply_waits_for_every_action() {
        let mock = Rc::new(
            MockTransport::new()
                .with(
                    Method::Post,
                    "firewalls/2/actions/apply_to_resources",
                    json!({ "actions": [{ "id": 10 }, { "id": 11 }] }),
                )
                .with(Method::Get, "actions/10", json!({ "action": { "id": 10, "status": "success" } }))
                .with(Method::Get, "actions/11", json!({ "action": { "id": 11, "status": "success" } })),
        );
        api(&mock).apply_firewall(2, &[7, 8]).expect("apply");
        let post = &mock.calls()[0];
        let body = post.body.as_ref().expect("body");
        assert_eq!(body["apply_to"].as_array().map(Vec::len), Some(2));
        assert_eq!(mock.read_calls(), 2);
    }

    #[test]
    fn metrics_query_is_url_encoded() {
        let path = "servers/1/metrics?type=cpu&start=2024-01-01T00%3A00%3A00%2B00%3A00&end=2024-01-01T01%3A00%3A00%2B00%3A00&step=60";
        let mock = Rc::new(MockTransport::new().with(
            Method::Get,
            path,
            json!({ "metrics": { "step": 60.0, "time_series": {} } }),
        ));
        let metrics = api(&mock)
            .server_metrics(
                1,
                "cpu",
                "2024-01-01T00:00:00+00:00",
                "2024-01-01T01:00:00+00:00",
                Some(60),
            )
            .expect("metrics");
        assert_eq!(metrics.step, 60.0);
    }

    #[test]
    fn refused_shutdown_falls_back_to_power_off() {
        let mock = Rc::new(MockTransport::new());
        mock.fail(Method::Post, "servers/5/actions/shutdown", 409, "conflict");
        api(&mock).stop_server(5).expect("stop");
        assert_eq!(mock.calls_to(Method::Post, "servers/5/actions/poweroff"), 1);

        let mock = Rc::new(MockTransport::new());
        mock.fail(Method::Post, "servers/6/actions/shutdown", 404, "server not found");
        assert!(api(&mock).stop_server(6).unwrap_err().is_not_found());
        assert_eq!(mock.calls_to(Method::Post, "servers/6/actions/poweroff"), 0);
    }

    #[test]
    fn floating_ip_targets_a_server_or_a_location() {
        let mock = Rc::new(MockTransport::new().with(
            Method::Post,
            "floating_ips",
            json!({ "floating_ip": { "id": 3, "ip": "203.0.113.9" } }),
        ));
        let params = CreateIp {
            name: "front".into(),
            ip_type: "ipv4".into(),
            target: IpTarget::Place("fsn1".into()),
        };
        let ip = api(&mock).create_floating_ip(&params, None).expect("create");
        assert_eq!(ip.id, 3);
        let body = mock.calls()[0].body.clone().expect("body");
        assert_eq!(body["home_location"], "fsn1");
        assert!(body.get("server").is_none());
    }

    #[test]
    fn dns_reset_sends_null() {
        let mock = Rc::new(MockTransport::new());
        api(&mock).change_primary_ip_dns(4, "198.51.100.1", None).expect("dns");
        let call = &mock.calls()[0];
        assert_eq!(call.path, "primary_ips/4/actions/change_dns_ptr");
        assert_eq!(call.body.as_ref().expect("body")["dns_ptr"], Value::Null);
    }

    #[test]
    fn import_accepts_either_id_shape() {
        let mock = Rc::new(MockTransport::new().with(Method::Post, "images", json!({ "image_id": 99 })));
        assert_eq!(api(&mock).import_image("img", "https://example.com/a.raw", None).expect("import"), 99);

        mock.respond(Method::Post, "images", json!({ "image": { "id": 88 } }));
        assert_eq!(api(&mock).import_image("img", "https://example.com/a.raw", None).expect("import"), 88);

        mock.respond(Method::Post, "images", json!({}));
        assert!(matches!(
            api(&mock).import_image("img", "https://example.com/a.raw", None),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn set_token_reaches_the_transport() {
        let mock = Rc::new(MockTransport::new());
        api(&mock).set_token("abc");
        assert_eq!(mock.token(), "abc");
    }
}
