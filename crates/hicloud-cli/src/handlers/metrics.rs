//! `metrics`: CPU, network and disk statistics of a server.
//!
//! The resolution of each query follows the requested window: short windows
//! are sampled finely, long windows coarsely, so the API never returns more
//! points than a summary needs.

use super::{finish, found, id_candidates, parse_id, words, CommandError};
use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hicloud_api::types::Metrics;
use hicloud_api::CloudApi;
use hicloud_console::{
    Candidate, CommandNode, Details, ExecContext, IdCache, LookupError, Outcome, Render,
    ResourceHandler, ResourceKind, SubcommandSpec, Table,
};
use std::rc::Rc;

const DEFAULT_CPU_HOURS: u32 = 24;
const DEFAULT_DAYS: u32 = 7;
const MAX_HOURS: u32 = 24 * 365;
const MAX_DAYS: u32 = 365;
/// Width of the CPU bar at 100%.
const BAR_WIDTH: f64 = 51.0;

/// Sample step in seconds for a CPU window of `hours`.
pub fn cpu_step(hours: u32) -> u64 {
    match hours {
        0..=6 => 60,
        7..=48 => 300,
        _ => 3600,
    }
}

/// Sample step in seconds for a network or disk window of `days`.
pub fn daily_step(days: u32) -> u64 {
    match days {
        0..=1 => 300,
        2..=7 => 3600,
        _ => 86_400,
    }
}

pub fn human_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

struct Stats {
    avg: f64,
    min: f64,
    max: f64,
    sum: f64,
    samples: usize,
}

fn stats(values: &[f64]) -> Option<Stats> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(Stats {
        avg: sum / values.len() as f64,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        sum,
        samples: values.len(),
    })
}

fn series(metrics: &Metrics, key: &str) -> Vec<f64> {
    metrics.time_series.get(key).map(|s| s.numbers()).unwrap_or_default()
}

fn cpu_bar(avg: f64) -> String {
    let len = ((avg.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH) as usize;
    [
        "  0%  10%  20%  30%  40%  50%  60%  70%  80%  90% 100%".to_string(),
        "  |    |    |    |    |    |    |    |    |    |    |".to_string(),
        format!("  {}> {avg:.1}% (avg)", "=".repeat(len)),
    ]
    .join("\n")
}

/// `--<name>=N` with `1 <= N <= max`; `default` when absent.
fn window_option(args: &[String], name: &str, default: u32, max: u32) -> Result<u32, CommandError> {
    let prefix = format!("--{name}=");
    let mut value = default;
    for arg in args {
        let Some(raw) = arg.strip_prefix(&prefix) else {
            return Err(CommandError::Usage(format!("Unknown option '{arg}', expected {prefix}N")));
        };
        value = match raw.parse::<u32>() {
            Ok(n) if (1..=max).contains(&n) => n,
            _ => {
                return Err(CommandError::InvalidArgument(format!(
                    "Invalid {name} value: {raw} (must be 1-{max})"
                )))
            }
        };
    }
    Ok(value)
}

pub struct MetricsHandler {
    api: Rc<CloudApi>,
    now: fn() -> DateTime<Utc>,
}

impl MetricsHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api, now: Utc::now }
    }

    /// Replace the wall clock used to compute query windows.
    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    fn fetch(&self, vm: u64, kind: &str, window: Duration, step: u64) -> Result<Metrics> {
        let end = (self.now)();
        let start = end - window;
        let metrics = self.api.server_metrics(
            vm,
            kind,
            &start.to_rfc3339_opts(SecondsFormat::Secs, true),
            &end.to_rfc3339_opts(SecondsFormat::Secs, true),
            Some(step),
        )?;
        tracing::debug!(vm, kind, step, series = metrics.time_series.len(), "fetched metrics");
        Ok(metrics)
    }

    fn list(&self, raw: &str) -> Result<Render> {
        let vm = parse_id(raw, "VM")?;
        let server = found(self.api.get_server(vm), "VM", vm)?;
        let mut table = Table::new(["Metric", "Description", "Usage"])
            .titled(format!("Available metrics for VM '{}' (ID: {vm})", server.name));
        table.row(["cpu", "CPU utilization over time", "metrics cpu <vm> [--hours=N]"]);
        table.row(["traffic", "Network traffic (in/out)", "metrics traffic <vm> [--days=N]"]);
        table.row(["disk", "Disk operations and throughput", "metrics disk <vm> [--days=N]"]);
        Ok(Render::Table(table))
    }

    fn cpu(&self, raw: &str, options: &[String]) -> Result<Render> {
        let vm = parse_id(raw, "VM")?;
        let hours = window_option(options, "hours", DEFAULT_CPU_HOURS, MAX_HOURS)?;
        let server = found(self.api.get_server(vm), "VM", vm)?;
        let metrics = self.fetch(vm, "cpu", Duration::hours(i64::from(hours)), cpu_step(hours))?;

        let Some(s) = stats(&series(&metrics, "cpu")) else {
            return Ok(Render::message(format!("No CPU metrics available for VM {vm}")));
        };
        let details = Details::new(format!(
            "CPU metrics for VM '{}' (ID: {vm}), last {hours} hours",
            server.name
        ))
        .field("Average", format!("{:.1}%", s.avg))
        .field("Min", format!("{:.1}%", s.min))
        .field("Max", format!("{:.1}%", s.max))
        .field("Samples", s.samples);
        Ok(Render::Sequence(vec![Render::Details(details), Render::message(cpu_bar(s.avg))]))
    }

    fn traffic(&self, raw: &str, options: &[String]) -> Result<Render> {
        let vm = parse_id(raw, "VM")?;
        let days = window_option(options, "days", DEFAULT_DAYS, MAX_DAYS)?;
        let server = found(self.api.get_server(vm), "VM", vm)?;
        let step = daily_step(days);
        let metrics = self.fetch(vm, "network", Duration::days(i64::from(days)), step)?;
        let step = if metrics.step > 0.0 { metrics.step } else { step as f64 };

        let rx = stats(&series(&metrics, "network.0.bandwidth.in"));
        let tx = stats(&series(&metrics, "network.0.bandwidth.out"));
        let (Some(rx), Some(tx)) = (rx, tx) else {
            return Ok(Render::message(format!("No network metrics available for VM {vm}")));
        };
        let rx_pps = stats(&series(&metrics, "network.0.pps.in")).map_or(0.0, |s| s.avg);
        let tx_pps = stats(&series(&metrics, "network.0.pps.out")).map_or(0.0, |s| s.avg);

        Ok(Render::Details(
            Details::new(format!(
                "Network traffic for VM '{}' (ID: {vm}), last {days} days",
                server.name
            ))
            .field("Total received", human_bytes(rx.sum * step))
            .field("Total sent", human_bytes(tx.sum * step))
            .field("Avg packets in", format!("{rx_pps:.1} pps"))
            .field("Avg packets out", format!("{tx_pps:.1} pps")),
        ))
    }

    fn disk(&self, raw: &str, options: &[String]) -> Result<Render> {
        let vm = parse_id(raw, "VM")?;
        let days = window_option(options, "days", DEFAULT_DAYS, MAX_DAYS)?;
        let server = found(self.api.get_server(vm), "VM", vm)?;
        let step = daily_step(days);
        let metrics = self.fetch(vm, "disk", Duration::days(i64::from(days)), step)?;
        let step = if metrics.step > 0.0 { metrics.step } else { step as f64 };

        let read_iops = stats(&series(&metrics, "disk.0.iops.read"));
        let write_iops = stats(&series(&metrics, "disk.0.iops.write"));
        let (Some(read_iops), Some(write_iops)) = (read_iops, write_iops) else {
            return Ok(Render::message(format!("No disk metrics available for VM {vm}")));
        };
        let read_bytes = stats(&series(&metrics, "disk.0.bandwidth.read")).map_or(0.0, |s| s.sum);
        let write_bytes = stats(&series(&metrics, "disk.0.bandwidth.write")).map_or(0.0, |s| s.sum);

        Ok(Render::Details(
            Details::new(format!(
                "Disk metrics for VM '{}' (ID: {vm}), last {days} days",
                server.name
            ))
            .field("Avg read IOPS", format!("{:.1}", read_iops.avg))
            .field("Avg write IOPS", format!("{:.1}", write_iops.avg))
            .field("Peak read IOPS", format!("{:.1}", read_iops.max))
            .field("Peak write IOPS", format!("{:.1}", write_iops.max))
            .field("Total read", human_bytes(read_bytes * step))
            .field("Total written", human_bytes(write_bytes * step)),
        ))
    }
}

impl ResourceHandler for MetricsHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("metrics", "Show server metrics")
            .sub(
                SubcommandSpec::new("list", "metrics list <vm>")
                    .exactly(1)
                    .summary("List the metrics available for a VM"),
            )
            .sub(
                SubcommandSpec::new("cpu", "metrics cpu <vm> [--hours=N]")
                    .args(1, Some(2))
                    .summary("CPU utilization (default: 24 hours)"),
            )
            .sub(
                SubcommandSpec::new("traffic", "metrics traffic <vm> [--days=N]")
                    .args(1, Some(2))
                    .summary("Network traffic (default: 7 days)"),
            )
            .sub(
                SubcommandSpec::new("disk", "metrics disk <vm> [--days=N]")
                    .args(1, Some(2))
                    .summary("Disk activity (default: 7 days)"),
            )
    }

    fn execute(&self, _ctx: &mut ExecContext<'_>, sub: &str, args: &[String]) -> Outcome {
        finish(match (sub, args) {
            ("list", [vm]) => self.list(vm),
            ("cpu", [vm, options @ ..]) => self.cpu(vm, options),
            ("traffic", [vm, options @ ..]) => self.traffic(vm, options),
            ("disk", [vm, options @ ..]) => self.disk(vm, options),
            _ => Err(CommandError::Usage(format!("Unknown metrics subcommand: {sub}")).into()),
        })
    }

    fn complete(
        &self,
        cache: &mut IdCache,
        sub: &str,
        arg_index: usize,
        _args: &[String],
    ) -> Result<Vec<Candidate>, LookupError> {
        match (sub, arg_index) {
            (_, 0) => id_candidates(cache, &self.api, ResourceKind::Server),
            ("cpu", 1) => Ok(words(&["--hours=1", "--hours=6", "--hours=24", "--hours=168"])),
            ("traffic" | "disk", 1) => Ok(words(&["--days=1", "--days=7", "--days=30"])),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{api, run};
    use chrono::TimeZone;
    use hicloud_api::{Method, MockTransport};
    use hicloud_console::ErrorKind;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("valid time")
    }

    fn mock() -> Rc<MockTransport> {
        Rc::new(MockTransport::new().with(
            Method::Get,
            "servers/42",
            json!({ "server": { "id": 42, "name": "web-1" } }),
        ))
    }

    fn handler(mock: &Rc<MockTransport>) -> MetricsHandler {
        MetricsHandler::new(api(mock)).with_clock(fixed_now)
    }

    #[test]
    fn steps_follow_the_window() {
        assert_eq!(cpu_step(1), 60);
        assert_eq!(cpu_step(6), 60);
        assert_eq!(cpu_step(24), 300);
        assert_eq!(cpu_step(48), 300);
        assert_eq!(cpu_step(49), 3600);
        assert_eq!(daily_step(1), 300);
        assert_eq!(daily_step(7), 3600);
        assert_eq!(daily_step(30), 86_400);
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(human_bytes(512.0), "512.00 B");
        assert_eq!(human_bytes(1_080_000.0), "1.03 MB");
        assert_eq!(human_bytes(3.0 * 1024.0 * 1024.0 * 1024.0), "3.00 GB");
    }

    #[test]
    fn cpu_reports_avg_min_max_and_bar() {
        let mock = mock();
        mock.respond(
            Method::Get,
            "servers/42/metrics?type=cpu&start=2024-02-29T12%3A00%3A00Z&end=2024-03-01T12%3A00%3A00Z&step=300",
            json!({ "metrics": { "step": 300.0, "time_series": {
                "cpu": { "values": [[1709200000, "10"], [1709200300, "30"], [1709200600, "20"]] }
            } } }),
        );
        let text = run(&handler(&mock), "cpu", &["42"], &[]).text();
        assert!(text.contains("last 24 hours"), "{text}");
        assert!(text.contains("20.0%"));
        assert!(text.contains("10.0%"));
        assert!(text.contains("30.0%"));
        assert!(text.contains("==========> 20.0% (avg)"));
    }

    #[test]
    fn cpu_hours_option_changes_window_and_step() {
        let mock = mock();
        mock.respond(
            Method::Get,
            "servers/42/metrics?type=cpu&start=2024-03-01T10%3A00%3A00Z&end=2024-03-01T12%3A00%3A00Z&step=60",
            json!({ "metrics": { "step": 60.0, "time_series": {} } }),
        );
        let run = run(&handler(&mock), "cpu", &["42", "--hours=2"], &[]);
        assert_eq!(run.outcome, Outcome::message("No CPU metrics available for VM 42"));
    }

    #[test]
    fn bad_options_are_rejected_before_any_call() {
        let mock = mock();
        let h = handler(&mock);
        let bad = run(&h, "cpu", &["42", "--hours=abc"], &[]);
        assert!(matches!(bad.outcome, Outcome::Failure { kind: ErrorKind::InvalidArgument, .. }));
        let unknown = run(&h, "traffic", &["42", "--hours=2"], &[]);
        assert!(matches!(unknown.outcome, Outcome::Failure { kind: ErrorKind::Usage, .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn traffic_totals_scale_by_step() {
        let mock = mock();
        mock.respond(
            Method::Get,
            "servers/42/metrics?type=network&start=2024-02-23T12%3A00%3A00Z&end=2024-03-01T12%3A00%3A00Z&step=3600",
            json!({ "metrics": { "step": 3600.0, "time_series": {
                "network.0.bandwidth.in": { "values": [[0, "100"], [3600, "200"]] },
                "network.0.bandwidth.out": { "values": [[0, "0"], [3600, "0"]] },
                "network.0.pps.in": { "values": [[0, "4"], [3600, "6"]] },
                "network.0.pps.out": { "values": [[0, "1"], [3600, "1"]] }
            } } }),
        );
        let text = run(&handler(&mock), "traffic", &["42"], &[]).text();
        assert!(text.contains("1.03 MB"), "{text}");
        assert!(text.contains("0.00 B"));
        assert!(text.contains("5.0 pps"));
    }

    #[test]
    fn disk_reports_iops_and_totals() {
        let mock = mock();
        mock.respond(
            Method::Get,
            "servers/42/metrics?type=disk&start=2024-02-29T12%3A00%3A00Z&end=2024-03-01T12%3A00%3A00Z&step=300",
            json!({ "metrics": { "step": 300.0, "time_series": {
                "disk.0.iops.read": { "values": [[0, "2"], [300, "4"]] },
                "disk.0.iops.write": { "values": [[0, "8"], [300, "12"]] },
                "disk.0.bandwidth.read": { "values": [[0, "1024"], [300, "1024"]] },
                "disk.0.bandwidth.write": { "values": [[0, "0"], [300, "0"]] }
            } } }),
        );
        let text = run(&handler(&mock), "disk", &["42", "--days=1"], &[]).text();
        assert!(text.contains("Avg read IOPS"), "{text}");
        assert!(text.contains("3.0"));
        assert!(text.contains("10.0"));
        assert!(text.contains("600.00 KB"));
    }
}
