//! Dashboard analytics derived from a fetched forest: time buckets, stage
//! funnel, revenue forecast and per-partner performance.

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    EngineError, Money,
    aggregate::{ConversionStats, DealMetrics, all_deals, bucket_by, count_by},
    model::{Deal, PartnerNode, RecordKind},
    status::{StatusTone, known_statuses, tone_for},
    util::{collate, fold_key},
};

/// Calendar month, ordered chronologically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// Month of a timestamp as seen in `tz`.
    #[must_use]
    pub fn of(ts: DateTime<Utc>, tz: Tz) -> Self {
        let local = ts.with_timezone(&tz);
        Self {
            year: local.year(),
            month: local.month(),
        }
    }

    #[must_use]
    pub fn of_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Short chart label, e.g. `Mar 2024`.
    #[must_use]
    pub fn label(self) -> String {
        const NAMES: [&str; 12] = [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ];
        let index = usize::try_from(self.month.saturating_sub(1)).unwrap_or(0);
        let name = NAMES.get(index).copied().unwrap_or("???");
        format!("{name} {}", self.year)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidField(format!("invalid month: {s}"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

/// One point of a monthly series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthPoint {
    pub month: MonthKey,
    pub label: String,
    pub count: usize,
    pub value: Money,
}

/// One stage of the deal funnel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBucket {
    pub stage: String,
    pub count: usize,
    pub value: Money,
    pub tone: StatusTone,
}

/// Deals grouped by creation month, oldest first. Deals without a creation
/// time are left out; months without deals are not emitted.
pub fn deals_by_month(deals: &[&Deal], tz: Tz) -> Vec<MonthPoint> {
    let mut points: Vec<MonthPoint> = bucket_by(deals.iter().copied(), |deal| {
        deal.created_time.map(|ts| MonthKey::of(ts, tz))
    })
    .into_iter()
    .map(|(month, deals)| MonthPoint {
        month,
        label: month.label(),
        count: deals.len(),
        value: deals.iter().map(|deal| deal.expected_revenue).sum(),
    })
    .collect();
    points.sort_by_key(|point| point.month);
    points
}

/// Expected revenue of still-open deals by closing month, oldest first.
pub fn revenue_forecast(deals: &[&Deal]) -> Vec<MonthPoint> {
    let mut points: Vec<MonthPoint> = bucket_by(
        deals.iter().copied().filter(|deal| deal.is_open()),
        |deal| deal.closing_date.map(MonthKey::of_date),
    )
    .into_iter()
    .map(|(month, deals)| MonthPoint {
        month,
        label: month.label(),
        count: deals.len(),
        value: deals.iter().map(|deal| deal.expected_revenue).sum(),
    })
    .collect();
    points.sort_by_key(|point| point.month);
    points
}

/// Deal counts and values per stage. Known stages keep pipeline order,
/// unknown ones follow alphabetically.
pub fn stage_funnel(deals: &[&Deal]) -> Vec<StageBucket> {
    let known: Vec<&str> = known_statuses(RecordKind::Deal).collect();
    let rank = |stage: &str| {
        let key = fold_key(stage);
        known.iter().position(|known| *known == key)
    };

    let mut buckets: Vec<StageBucket> = bucket_by(deals.iter().copied(), |deal| {
        let stage = deal.stage.trim();
        Some(if stage.is_empty() {
            crate::aggregate::UNSPECIFIED_STATUS.to_string()
        } else {
            stage.to_string()
        })
    })
    .into_iter()
    .map(|(stage, deals)| StageBucket {
        tone: tone_for(RecordKind::Deal, &stage),
        count: deals.len(),
        value: deals.iter().map(|deal| deal.expected_revenue).sum(),
        stage,
    })
    .collect();

    buckets.sort_by(|a, b| match (rank(&a.stage), rank(&b.stage)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| collate(&a.stage, &b.stage)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => collate(&a.stage, &b.stage),
    });
    buckets
}

/// Status counts for chart series, most frequent first.
pub fn status_distribution(statuses: &[&str], kind: RecordKind) -> Vec<StageBucket> {
    let mut buckets: Vec<StageBucket> = count_by(statuses.iter().copied(), |status| {
        Some(status.trim().to_string())
    })
    .into_iter()
    .map(|(stage, count)| StageBucket {
        tone: tone_for(kind, &stage),
        count,
        value: Money::ZERO,
        stage,
    })
    .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| collate(&a.stage, &b.stage)));
    buckets
}

/// Rolled-up performance of one partner and its sub-partners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerPerformance {
    pub partner_id: String,
    pub name: String,
    pub partner_path: String,
    pub partner_level: usize,
    pub leads: usize,
    pub contacts: usize,
    pub deals: DealMetrics,
    pub conversion: ConversionStats,
}

impl PartnerPerformance {
    #[must_use]
    pub fn export_record(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Partner".into(), Value::String(self.name.clone()));
        map.insert("Partner Path".into(), Value::String(self.partner_path.clone()));
        map.insert("Level".into(), Value::from(self.partner_level));
        map.insert("Leads".into(), Value::from(self.leads));
        map.insert("Contacts".into(), Value::from(self.contacts));
        map.insert("Deals".into(), Value::from(self.deals.deal_count));
        map.insert("Won".into(), Value::from(self.deals.won_count));
        map.insert(
            "Win Rate %".into(),
            Value::String(format!("{:.1}", self.deals.win_rate())),
        );
        map.insert(
            "Total Value".into(),
            Value::String(self.deals.total_value.to_string()),
        );
        map.insert(
            "Average Value".into(),
            Value::String(self.deals.average_value().to_string()),
        );
        map.insert(
            "Conversion %".into(),
            Value::String(format!("{:.1}", self.conversion.rate())),
        );
        map
    }
}

/// One performance row per partner, pre-order, each rolled up over its
/// subtree. `partner_path` lists strict ancestors, like partner table rows.
pub fn partner_performance(forest: &[PartnerNode], separator: &str) -> Vec<PartnerPerformance> {
    struct Totals {
        leads: usize,
        contacts: usize,
        deals: DealMetrics,
        conversion: ConversionStats,
    }

    fn visit<'a>(
        node: &'a PartnerNode,
        separator: &str,
        ancestors: &mut Vec<&'a str>,
        rows: &mut Vec<PartnerPerformance>,
    ) -> Totals {
        let index = rows.len();
        rows.push(PartnerPerformance {
            partner_id: node.id.clone(),
            name: node.name.clone(),
            partner_path: ancestors.join(separator),
            partner_level: ancestors.len(),
            leads: 0,
            contacts: 0,
            deals: DealMetrics::default(),
            conversion: ConversionStats::default(),
        });

        let mut totals = Totals {
            leads: node.records.leads.len(),
            contacts: node.records.contacts.len(),
            deals: node.records.all_deals().sum(),
            conversion: ConversionStats::of(&node.records.contacts),
        };

        ancestors.push(&node.name);
        for child in &node.children {
            let child_totals = visit(child, separator, ancestors, rows);
            totals.leads += child_totals.leads;
            totals.contacts += child_totals.contacts;
            totals.deals = totals.deals + child_totals.deals;
            totals.conversion = totals.conversion + child_totals.conversion;
        }
        ancestors.pop();

        if let Some(row) = rows.get_mut(index) {
            row.leads = totals.leads;
            row.contacts = totals.contacts;
            row.deals = totals.deals;
            row.conversion = totals.conversion;
        }
        totals
    }

    let mut rows = Vec::new();
    let mut ancestors = Vec::new();
    for root in forest {
        visit(root, separator, &mut ancestors, &mut rows);
    }
    rows
}

/// Everything the dashboard shows, computed from one contact forest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealDashboard {
    pub deals: DealMetrics,
    pub conversion: ConversionStats,
    pub funnel: Vec<StageBucket>,
    pub forecast: Vec<MonthPoint>,
    pub by_month: Vec<MonthPoint>,
}

pub fn deal_dashboard(forest: &[PartnerNode], tz: Tz) -> DealDashboard {
    let deals = all_deals(forest);
    let contacts = crate::aggregate::all_records(forest, RecordKind::Contact);
    DealDashboard {
        deals: deals.iter().copied().sum(),
        conversion: ConversionStats::of(&contacts),
        funnel: stage_funnel(&deals),
        forecast: revenue_forecast(&deals),
        by_month: deals_by_month(&deals, tz),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn deal(id: &str, stage: &str, minor: i64) -> Deal {
        Deal {
            id: id.to_string(),
            name: id.to_string(),
            stage: stage.to_string(),
            stage_history: Vec::new(),
            expected_revenue: Money::new(minor),
            closing_date: None,
            created_time: None,
            owner: None,
        }
    }

    #[test]
    fn month_keys_sort_chronologically_not_lexically() {
        let mut months: Vec<MonthKey> = ["2024-10", "2023-12", "2024-2"]
            .iter()
            .map(|raw| raw.parse().unwrap())
            .collect();
        months.sort();
        let labels: Vec<_> = months.iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["2023-12", "2024-02", "2024-10"]);
        assert!("2024-13".parse::<MonthKey>().is_err());
    }

    #[test]
    fn month_truncation_honours_time_zone() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 31, 23, 30, 0).unwrap();
        assert_eq!(MonthKey::of(ts, chrono_tz::UTC).month, 1);
        assert_eq!(MonthKey::of(ts, chrono_tz::Europe::Rome).month, 2);
    }

    #[test]
    fn deals_without_dates_are_not_bucketed() {
        let mut dated = deal("d1", "Qualification", 100);
        dated.created_time = Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
        let undated = deal("d2", "Qualification", 100);
        let points = deals_by_month(&[&dated, &undated], chrono_tz::UTC);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].count, 1);
        assert_eq!(points[0].label, "Mar 2024");
    }

    #[test]
    fn forecast_only_counts_open_deals() {
        let mut open = deal("d1", "Negotiation/Review", 500);
        open.closing_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let mut won = deal("d2", "Closed Won", 900);
        won.closing_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let points = revenue_forecast(&[&open, &won]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, Money::new(500));
    }

    #[test]
    fn funnel_keeps_pipeline_order_then_unknown() {
        let deals = [
            deal("d1", "Closed Won", 1),
            deal("d2", "Mystery", 1),
            deal("d3", "Qualification", 1),
            deal("d4", "Qualification", 1),
        ];
        let refs: Vec<&Deal> = deals.iter().collect();
        let funnel = stage_funnel(&refs);
        let stages: Vec<_> = funnel.iter().map(|b| (b.stage.as_str(), b.count)).collect();
        assert_eq!(
            stages,
            vec![("Qualification", 2), ("Closed Won", 1), ("Mystery", 1)]
        );
        assert_eq!(funnel[2].tone, StatusTone::Neutral);
    }
}
