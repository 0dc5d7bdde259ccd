//! Built-in logistics scripts: forwarder ranking and route cost savings.

use std::collections::BTreeMap;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CovenantResult;
use crate::script::{ScriptDefinition, ScriptInputs};

pub const FWD_EFFICIENCY_ID: &str = "mo-fwd-efficiency-v1";
pub const COST_SAVER_ID: &str = "mo-cost-saver-v7";

/// Minimum saving, in percent of the current method's average cost, worth flagging.
const SAVINGS_THRESHOLD_PCT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderShipment {
    pub forwarder: String,
    /// Days.
    pub delivery_time: f64,
    pub cost: f64,
    pub on_time: bool,
    #[serde(default)]
    pub route: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderRanking {
    pub name: String,
    pub avg_delivery_time: f64,
    pub avg_cost: f64,
    pub on_time_percentage: f64,
    pub total_shipments: usize,
    /// Lower is better.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwarderReport {
    pub top: ForwarderRanking,
    pub rankings: Vec<ForwarderRanking>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    Air,
    Sea,
    Road,
    Rail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteShipment {
    pub route: String,
    pub method: ShippingMethod,
    pub cost: f64,
    /// Kilograms.
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsOpportunity {
    pub route: String,
    pub current_method: ShippingMethod,
    pub current_avg_cost: f64,
    pub suggested_method: ShippingMethod,
    pub suggested_avg_cost: f64,
    pub potential_savings: f64,
    pub savings_percentage: f64,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Rank forwarders by `0.4·avgDelivery + 0.3·avgCost + 0.3·(100 - onTime%)`.
pub fn rank_forwarders(shipments: &[ForwarderShipment]) -> Option<ForwarderReport> {
    let mut by_forwarder: BTreeMap<&str, Vec<&ForwarderShipment>> = BTreeMap::new();
    for shipment in shipments {
        by_forwarder
            .entry(shipment.forwarder.as_str())
            .or_default()
            .push(shipment);
    }

    let mut rankings: Vec<ForwarderRanking> = by_forwarder
        .into_iter()
        .map(|(name, group)| {
            let total = group.len();
            let avg_delivery_time = mean(group.iter().map(|s| s.delivery_time));
            let avg_cost = mean(group.iter().map(|s| s.cost));
            let on_time = group.iter().filter(|s| s.on_time).count();
            let on_time_percentage = on_time as f64 / total as f64 * 100.0;
            ForwarderRanking {
                name: name.to_string(),
                avg_delivery_time,
                avg_cost,
                on_time_percentage,
                total_shipments: total,
                score: avg_delivery_time * 0.4 + avg_cost * 0.3 + (100.0 - on_time_percentage) * 0.3,
            }
        })
        .collect();

    rankings.sort_by(|a, b| a.score.total_cmp(&b.score));
    let top = rankings.first()?.clone();
    Some(ForwarderReport { top, rankings })
}

/// Per route, compare each method's average cost against the most-used
/// method and flag the cheaper ones. Highest savings first.
pub fn detect_savings(shipments: &[RouteShipment], historical: &[RouteShipment]) -> Vec<SavingsOpportunity> {
    let mut by_route: BTreeMap<&str, BTreeMap<ShippingMethod, Vec<f64>>> = BTreeMap::new();
    for shipment in shipments.iter().chain(historical) {
        by_route
            .entry(shipment.route.as_str())
            .or_default()
            .entry(shipment.method)
            .or_default()
            .push(shipment.cost);
    }

    let mut opportunities = Vec::new();
    for (route, methods) in by_route {
        if methods.len() < 2 {
            continue;
        }

        // Ties go to the first method in declaration order.
        let Some((current_method, current_costs)) = methods
            .iter()
            .fold(None::<(&ShippingMethod, &Vec<f64>)>, |best, candidate| match best {
                Some(b) if b.1.len() >= candidate.1.len() => Some(b),
                _ => Some(candidate),
            })
        else {
            continue;
        };
        let current_avg_cost = mean(current_costs.iter().copied());
        if current_avg_cost <= 0.0 {
            continue;
        }

        for (method, costs) in &methods {
            if method == current_method {
                continue;
            }
            let avg_cost = mean(costs.iter().copied());
            let potential_savings = current_avg_cost - avg_cost;
            let savings_percentage = potential_savings / current_avg_cost * 100.0;
            if savings_percentage > SAVINGS_THRESHOLD_PCT {
                opportunities.push(SavingsOpportunity {
                    route: route.to_string(),
                    current_method: *current_method,
                    current_avg_cost,
                    suggested_method: *method,
                    suggested_avg_cost: avg_cost,
                    potential_savings,
                    savings_percentage,
                });
            }
        }
    }

    opportunities.sort_by(|a, b| b.savings_percentage.total_cmp(&a.savings_percentage));
    opportunities
}

fn decode<T: serde::de::DeserializeOwned>(inputs: &ScriptInputs, name: &str) -> anyhow::Result<T> {
    let value = inputs.get(name).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).with_context(|| format!("invalid `{name}` input"))
}

fn method_name(method: ShippingMethod) -> &'static str {
    match method {
        ShippingMethod::Air => "air",
        ShippingMethod::Sea => "sea",
        ShippingMethod::Road => "road",
        ShippingMethod::Rail => "rail",
    }
}

pub fn forwarder_efficiency_script() -> CovenantResult<ScriptDefinition> {
    ScriptDefinition::builder(FWD_EFFICIENCY_ID, "Forwarder Efficiency Ranker", "onCalculateResults")
        .inputs(["shipmentData"])
        .strict_scan(true)
        .source(
            "MoScript covenant: group shipmentData by forwarder, execute the weighted \
             ranking and seal the soulprint of the leader under the covenant.",
        )
        .sync_logic(|inputs| {
            let shipments: Vec<ForwarderShipment> = decode(&inputs, "shipmentData")?;
            let Some(report) = rank_forwarders(&shipments) else {
                bail!("shipmentData contains no shipments");
            };
            Ok(serde_json::to_value(report)?)
        })
        .voice_line(|result| {
            let top = &result["top"];
            format!(
                "After scouring every shipment, the data speaks: {} leads the pack, part cheetah, part calculator. \
                 {:.1}% on-time delivery, {:.1} days average.",
                top["name"].as_str().unwrap_or("nobody"),
                top["onTimePercentage"].as_f64().unwrap_or(0.0),
                top["avgDeliveryTime"].as_f64().unwrap_or(0.0),
            )
        })
        .build()
}

pub fn cost_saver_script() -> CovenantResult<ScriptDefinition> {
    ScriptDefinition::builder(COST_SAVER_ID, "Cost Optimization Oracle", "onMonthlyTrendUpdate")
        .inputs(["shipmentData", "historical"])
        .strict_scan(true)
        .source(
            "MoScript covenant: merge shipmentData with historical records, execute a \
             per-route method comparison and flag savings under the covenant soulprint.",
        )
        .sync_logic(|inputs| {
            let shipments: Vec<RouteShipment> = decode(&inputs, "shipmentData")?;
            let historical: Option<Vec<RouteShipment>> = decode(&inputs, "historical")?;
            let opportunities = detect_savings(&shipments, historical.as_deref().unwrap_or(&[]));
            Ok(serde_json::to_value(opportunities)?)
        })
        .voice_line(|result| {
            let top: Option<SavingsOpportunity> = result
                .as_array()
                .and_then(|items| items.first())
                .and_then(|first| serde_json::from_value(first.clone()).ok());
            match top {
                None => "All routes optimized. Either you're brilliant, or the bar is very low.".to_string(),
                Some(top) => format!(
                    "Ka-ching! A {:.0}% drop spotted on {} if you swap to {}. That's ${:.2} saved per shipment.",
                    top.savings_percentage,
                    top.route,
                    method_name(top.suggested_method),
                    top.potential_savings,
                ),
            }
        })
        .build()
}

/// Every built-in script, ready for registration.
pub fn builtin_scripts() -> CovenantResult<Vec<ScriptDefinition>> {
    Ok(vec![forwarder_efficiency_script()?, cost_saver_script()?])
}
