//! `pricing`: the price list and a monthly estimate for the active project.

use super::{finish, CommandError};
use anyhow::Result;
use hicloud_api::types::{LocationPrice, TypePricing};
use hicloud_api::CloudApi;
use hicloud_console::{
    CommandNode, Details, ExecContext, Outcome, Render, ResourceHandler, SubcommandSpec, Table,
};
use std::rc::Rc;

const VOLUME_EXAMPLES_GB: [u64; 4] = [10, 50, 100, 500];

/// Monthly gross price at `location`, falling back to the first listed one.
fn monthly_at(prices: &[LocationPrice], location: &str) -> f64 {
    prices
        .iter()
        .find(|p| p.location == location)
        .or_else(|| prices.first())
        .map_or(0.0, |p| p.price_monthly.gross_amount())
}

fn type_price(types: &[TypePricing], name: &str, location: &str) -> Option<f64> {
    types
        .iter()
        .find(|t| t.name == name)
        .map(|t| monthly_at(&t.prices, location))
}

pub struct PricingHandler {
    api: Rc<CloudApi>,
}

impl PricingHandler {
    pub fn new(api: Rc<CloudApi>) -> Self {
        Self { api }
    }

    fn list(&self) -> Result<Render> {
        let pricing = self.api.get_pricing()?;
        let server_types = self.api.list_server_types()?;
        let cur = &pricing.currency;

        let mut servers = Table::new(["Type", "Cores", "Memory", "Disk", "Monthly", "Hourly"])
            .titled(format!("Server Types ({cur}, incl. VAT)"));
        for t in &server_types {
            let (monthly, hourly) = t.prices.first().map_or((0.0, 0.0), |p| {
                (p.price_monthly.gross_amount(), p.price_hourly.gross_amount())
            });
            servers.row([
                t.name.clone(),
                t.cores.to_string(),
                format!("{} GB", t.memory),
                format!("{} GB", t.disk),
                format!("{monthly:.2}"),
                format!("{hourly:.4}"),
            ]);
        }

        let per_gb = pricing.volume.price_per_gb_month.gross_amount();
        let mut volumes = Details::new("Volumes").field("Per GB", format!("{per_gb:.2} {cur}/month"));
        for gb in VOLUME_EXAMPLES_GB {
            volumes.push(format!("{gb} GB"), format!("{:.2} {cur}/month", gb as f64 * per_gb));
        }

        let floating = Details::new("Floating IPs").field(
            "Per IP",
            format!("{:.2} {cur}/month", pricing.floating_ip.price_monthly.gross_amount()),
        );

        let mut lbs = Table::new(["Type", "Monthly"]).titled("Load Balancer Types");
        for t in &pricing.load_balancer_types {
            lbs.row([t.name.clone(), format!("{:.2}", t.monthly_gross())]);
        }

        Ok(Render::Sequence(vec![
            Render::Table(servers),
            Render::Details(volumes),
            Render::Details(floating),
            Render::Table(lbs),
        ]))
    }

    fn calculate(&self, project: &str) -> Result<Render> {
        let pricing = self.api.get_pricing()?;
        let cur = &pricing.currency;

        let servers = self.api.list_servers()?;
        let server_cost: f64 = servers
            .iter()
            .map(|s| {
                type_price(&pricing.server_types, &s.server_type.name, &s.datacenter.location.name)
                    .unwrap_or_else(|| {
                        tracing::warn!(server = s.id, server_type = %s.server_type.name, "no price for server type");
                        0.0
                    })
            })
            .sum();

        let volumes = self.api.list_volumes()?;
        let per_gb = pricing.volume.price_per_gb_month.gross_amount();
        let volume_cost: f64 = volumes.iter().map(|v| v.size as f64 * per_gb).sum();

        let floating_ips = self.api.list_floating_ips()?;
        let floating_cost = floating_ips.len() as f64 * pricing.floating_ip.price_monthly.gross_amount();

        let lbs = self.api.list_load_balancers()?;
        let lb_cost: f64 = lbs
            .iter()
            .filter_map(|lb| {
                type_price(&pricing.load_balancer_types, &lb.load_balancer_type.name, &lb.location.name)
            })
            .sum();

        let mut table = Table::new(["Resource Type", "Count", "Monthly"])
            .titled(format!("Estimated Monthly Costs for Project '{project}'"));
        table.row(["Servers".to_string(), servers.len().to_string(), format!("{server_cost:.2} {cur}")]);
        table.row(["Volumes".to_string(), volumes.len().to_string(), format!("{volume_cost:.2} {cur}")]);
        table.row([
            "Floating IPs".to_string(),
            floating_ips.len().to_string(),
            format!("{floating_cost:.2} {cur}"),
        ]);
        table.row(["Load Balancers".to_string(), lbs.len().to_string(), format!("{lb_cost:.2} {cur}")]);

        let total = server_cost + volume_cost + floating_cost + lb_cost;
        let totals = Details::new("Totals")
            .field("Monthly", format!("{total:.2} {cur}"))
            .field("Yearly", format!("{:.2} {cur}", total * 12.0))
            .field("Daily average", format!("{:.2} {cur}", total / 30.0));
        Ok(Render::Sequence(vec![Render::Table(table), Render::Details(totals)]))
    }
}

impl ResourceHandler for PricingHandler {
    fn describe(&self) -> CommandNode {
        CommandNode::new("pricing", "Show prices and estimate costs")
            .sub(SubcommandSpec::new("list", "pricing list").summary("Show the price list"))
            .sub(
                SubcommandSpec::new("calculate", "pricing calculate")
                    .summary("Estimate monthly costs of the active project"),
            )
    }

    fn execute(&self, ctx: &mut ExecContext<'_>, sub: &str, _args: &[String]) -> Outcome {
        finish(match sub {
            "list" => self.list(),
            "calculate" => {
                let project = ctx.session.active_project().name.clone();
                self.calculate(&project)
            }
            _ => Err(CommandError::Usage(format!("Unknown pricing subcommand: {sub}")).into()),
        })
    }
}
