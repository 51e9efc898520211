//! Normalization of backend hierarchy documents into the canonical forest.
//!
//! The backend answers with slightly different shapes depending on the
//! endpoint and version: a bare array of root nodes, `{ "data": [...] }`,
//! `{ "data": { "data": [...] } }` or a single root object. Field names vary
//! as well (`Sub_Partners` vs `subPartners`, `Lead_Status` vs `status`, ...).
//! Everything is mapped here, once, before any flattening or aggregation runs.
//!
//! Normalization never fails. Malformed parts contribute nothing and leave a
//! warning in [`Normalized::warnings`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::{
    Money,
    model::{AttachedRecords, Deal, OwnerRef, PartnerNode, Record, RecordKind, StageTransition},
};

/// Warning attached when the top-level shape is not recognized at all.
pub const UNPARSEABLE: &str = "could not parse data";

/// Maximum wrapper depth for `{ data: { data: ... } }` envelopes.
const MAX_ENVELOPE_DEPTH: usize = 3;

const ID_KEYS: &[&str] = &["id", "Id", "ID", "_id"];
const PARTNER_NAME_KEYS: &[&str] = &["name", "Name", "Partner_Name", "Account_Name", "Full_Name"];
const CHILDREN_KEYS: &[&str] = &["Sub_Partners", "subPartners", "sub_partners", "children"];
const PHONE_KEYS: &[&str] = &["Phone_Number", "phoneNumber", "phone_number", "Phone", "phone", "Mobile"];
const EMAIL_KEYS: &[&str] = &["Email", "email"];
const OWNER_KEYS: &[&str] = &["Owner", "owner"];
const CREATED_KEYS: &[&str] = &["Created_Time", "createdTime", "created_time", "created_at"];
const RECORD_NAME_KEYS: &[&str] = &["Full_Name", "name", "Name", "Deal_Name", "dealName"];
const STAGE_HISTORY_KEYS: &[&str] = &["Stage_History", "stageHistory", "stage_history"];
const REVENUE_KEYS: &[&str] = &["Expected_Revenue", "expectedRevenue", "expected_revenue", "Amount", "amount"];
const CLOSING_KEYS: &[&str] = &["Closing_Date", "closingDate", "closing_date"];
const CHANGED_AT_KEYS: &[&str] = &["Changed_Time", "changedAt", "changed_at", "Modified_Time", "Last_Activity_Time"];

/// Field mapping for one record kind.
#[derive(Clone, Copy, Debug)]
pub struct KindAdapter {
    pub kind: RecordKind,
    /// Keys under which a node lists its records of this kind.
    pub bucket_keys: &'static [&'static str],
    /// Keys holding the status, most specific first.
    pub status_keys: &'static [&'static str],
}

const LEAD_ADAPTER: KindAdapter = KindAdapter {
    kind: RecordKind::Lead,
    bucket_keys: &["Leads", "leads"],
    status_keys: &["Lead_Status", "leadStatus", "Status", "status"],
};

const CONTACT_ADAPTER: KindAdapter = KindAdapter {
    kind: RecordKind::Contact,
    bucket_keys: &["Contacts", "contacts"],
    status_keys: &["Contact_Status", "contactStatus", "Status", "status"],
};

const DEAL_ADAPTER: KindAdapter = KindAdapter {
    kind: RecordKind::Deal,
    bucket_keys: &["Deals", "deals"],
    status_keys: &["Stage", "stage", "Status", "status"],
};

impl KindAdapter {
    #[must_use]
    pub const fn for_kind(kind: RecordKind) -> KindAdapter {
        match kind {
            RecordKind::Lead => LEAD_ADAPTER,
            RecordKind::Contact => CONTACT_ADAPTER,
            RecordKind::Deal => DEAL_ADAPTER,
        }
    }

    fn status(&self, map: &Map<String, Value>) -> String {
        string_field(map, self.status_keys).unwrap_or_default()
    }
}

/// Result of normalizing one backend document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normalized {
    pub forest: Vec<PartnerNode>,
    pub warnings: Vec<String>,
}

impl Normalized {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Maps any known backend envelope into the canonical forest.
pub fn normalize(value: &Value) -> Normalized {
    let mut out = Normalized::default();

    let Some(roots) = unwrap_envelope(value, 0) else {
        if !value.is_null() {
            out.warnings.push(UNPARSEABLE.to_string());
            tracing::warn!("hierarchy document has an unknown shape");
        }
        return out;
    };

    for (index, root) in roots.into_iter().enumerate() {
        let path = format!("[{index}]");
        if let Some(node) = parse_node(root, &path, &mut out.warnings) {
            out.forest.push(node);
        }
    }

    if !out.warnings.is_empty() {
        tracing::warn!(
            count = out.warnings.len(),
            "hierarchy normalization skipped malformed entries"
        );
    }
    out
}

/// Parses a JSON body and normalizes it; a body that is not JSON yields an
/// empty forest with the [`UNPARSEABLE`] warning.
pub fn normalize_str(body: &str) -> Normalized {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => normalize(&value),
        Err(err) => {
            tracing::warn!("hierarchy document is not JSON: {err}");
            Normalized {
                forest: Vec::new(),
                warnings: vec![UNPARSEABLE.to_string()],
            }
        }
    }
}

fn unwrap_envelope(value: &Value, depth: usize) -> Option<Vec<&Value>> {
    if depth > MAX_ENVELOPE_DEPTH {
        return None;
    }
    match value {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(map) => {
            if let Some(data) = map.get("data") {
                return unwrap_envelope(data, depth + 1);
            }
            looks_like_node(map).then(|| vec![value])
        }
        _ => None,
    }
}

fn looks_like_node(map: &Map<String, Value>) -> bool {
    ID_KEYS.iter().any(|key| map.contains_key(*key))
}

fn parse_node(value: &Value, path: &str, warnings: &mut Vec<String>) -> Option<PartnerNode> {
    let Some(map) = value.as_object() else {
        warnings.push(format!("{path}: partner is not an object"));
        return None;
    };
    let Some(id) = id_field(map) else {
        warnings.push(format!("{path}: partner without id skipped"));
        return None;
    };
    let name = string_field(map, PARTNER_NAME_KEYS).unwrap_or_else(|| id.clone());

    let mut records = AttachedRecords::default();
    for kind in [RecordKind::Lead, RecordKind::Contact] {
        let adapter = KindAdapter::for_kind(kind);
        for (index, item) in list_field(map, adapter.bucket_keys, path, warnings)
            .iter()
            .enumerate()
        {
            let item_path = format!("{path}.{}[{index}]", kind.as_str());
            if let Some(record) = parse_record(item, &adapter, &item_path, warnings) {
                records.push(record);
            }
        }
    }
    for (index, item) in list_field(map, DEAL_ADAPTER.bucket_keys, path, warnings)
        .iter()
        .enumerate()
    {
        if let Some(deal) = parse_deal(item, &format!("{path}.deal[{index}]"), warnings) {
            records.deals.push(deal);
        }
    }

    let children = list_field(map, CHILDREN_KEYS, path, warnings)
        .iter()
        .enumerate()
        .filter_map(|(index, child)| parse_node(child, &format!("{path}.{index}"), warnings))
        .collect();

    Some(PartnerNode {
        id,
        name,
        email: string_field(map, EMAIL_KEYS),
        phone_number: string_field(map, PHONE_KEYS),
        children,
        records,
    })
}

fn parse_record(
    value: &Value,
    adapter: &KindAdapter,
    path: &str,
    warnings: &mut Vec<String>,
) -> Option<Record> {
    let Some(map) = value.as_object() else {
        warnings.push(format!("{path}: record is not an object"));
        return None;
    };
    let Some(id) = id_field(map) else {
        warnings.push(format!("{path}: record without id skipped"));
        return None;
    };

    let deals = if adapter.kind == RecordKind::Contact {
        list_field(map, DEAL_ADAPTER.bucket_keys, path, warnings)
            .iter()
            .enumerate()
            .filter_map(|(index, deal)| parse_deal(deal, &format!("{path}.deal[{index}]"), warnings))
            .collect()
    } else {
        Vec::new()
    };

    Some(Record {
        name: record_name(map).unwrap_or_else(|| id.clone()),
        id,
        kind: adapter.kind,
        phone_number: string_field(map, PHONE_KEYS),
        email: string_field(map, EMAIL_KEYS),
        status: adapter.status(map),
        owner: owner_field(map),
        created_time: time_field(map, CREATED_KEYS),
        deals,
    })
}

fn parse_deal(value: &Value, path: &str, warnings: &mut Vec<String>) -> Option<Deal> {
    let Some(map) = value.as_object() else {
        warnings.push(format!("{path}: deal is not an object"));
        return None;
    };
    let Some(id) = id_field(map) else {
        warnings.push(format!("{path}: deal without id skipped"));
        return None;
    };

    let stage_history = list_field(map, STAGE_HISTORY_KEYS, path, warnings)
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            let stage = string_field(entry, DEAL_ADAPTER.status_keys)?;
            Some(StageTransition {
                stage,
                changed_at: time_field(entry, CHANGED_AT_KEYS),
            })
        })
        .collect();

    let expected_revenue = match money_field(map, REVENUE_KEYS) {
        Ok(value) => value,
        Err(raw) => {
            warnings.push(format!("{path}: unreadable deal value {raw}"));
            Money::ZERO
        }
    };

    Some(Deal {
        name: record_name(map).unwrap_or_else(|| id.clone()),
        id,
        stage: DEAL_ADAPTER.status(map),
        stage_history,
        expected_revenue,
        closing_date: date_field(map, CLOSING_KEYS),
        created_time: time_field(map, CREATED_KEYS),
        owner: owner_field(map),
    })
}

fn first<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| map.get(*key).filter(|value| !value.is_null()))
}

/// Returns the list stored under `keys`. A present but non-list value is
/// treated as empty and reported.
fn list_field<'a>(
    map: &'a Map<String, Value>,
    keys: &[&str],
    path: &str,
    warnings: &mut Vec<String>,
) -> &'a [Value] {
    match first(map, keys) {
        None => &[],
        Some(Value::Array(items)) => items,
        Some(_) => {
            warnings.push(format!("{path}: {} is not a list", keys[0]));
            &[]
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(scalar_string)
}

fn id_field(map: &Map<String, Value>) -> Option<String> {
    string_field(map, ID_KEYS)
}

fn record_name(map: &Map<String, Value>) -> Option<String> {
    if let Some(name) = string_field(map, RECORD_NAME_KEYS) {
        return Some(name);
    }
    let first_name = string_field(map, &["First_Name", "firstName"]);
    let last_name = string_field(map, &["Last_Name", "lastName"]);
    match (first_name, last_name) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

fn owner_field(map: &Map<String, Value>) -> Option<OwnerRef> {
    let owner = first(map, OWNER_KEYS)?.as_object()?;
    let id = id_field(owner)?;
    let name = string_field(owner, &["name", "Name", "full_name"]).unwrap_or_else(|| id.clone());
    Some(OwnerRef { id, name })
}

fn money_field(map: &Map<String, Value>, keys: &[&str]) -> Result<Money, String> {
    let Some(value) = first(map, keys) else {
        return Ok(Money::ZERO);
    };
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(Money::from_major)
            .ok_or_else(|| n.to_string()),
        Value::String(s) if s.trim().is_empty() => Ok(Money::ZERO),
        Value::String(s) => s.parse::<Money>().map_err(|_| s.clone()),
        other => Err(other.to_string()),
    }
}

fn time_field(map: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    match first(map, keys)? {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn date_field(map: &Map<String, Value>, keys: &[&str]) -> Option<NaiveDate> {
    let raw = first(map, keys)?.as_str()?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|ts| ts.date_naive()))
}

/// Parses the timestamp formats the backend is known to emit. Anything else
/// is treated as missing.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_nodes() -> Value {
        json!([{
            "id": "p1",
            "Name": "Alice",
            "Phone_Number": "+391234567",
            "Leads": [
                { "id": "l1", "Full_Name": "Lead One", "Lead_Status": "Qualified",
                  "Owner": { "id": "p1", "name": "Alice" },
                  "Created_Time": "2024-03-01T10:00:00+01:00" }
            ],
            "Sub_Partners": [
                { "id": 7, "name": "Bob", "subPartners": [] }
            ]
        }])
    }

    #[test]
    fn accepts_every_known_envelope() {
        let bare = normalize(&sample_nodes());
        let wrapped = normalize(&json!({ "data": sample_nodes() }));
        let double = normalize(&json!({ "data": { "data": sample_nodes() } }));

        assert!(bare.is_clean());
        assert_eq!(bare.forest.len(), 1);
        assert_eq!(bare, wrapped);
        assert_eq!(bare, double);
    }

    #[test]
    fn single_root_object_is_a_forest_of_one() {
        let normalized = normalize(&json!({ "data": { "id": "p1", "name": "Solo" } }));
        assert_eq!(normalized.forest.len(), 1);
        assert_eq!(normalized.forest[0].name, "Solo");
    }

    #[test]
    fn maps_aliased_fields() {
        let normalized = normalize(&sample_nodes());
        let root = &normalized.forest[0];
        assert_eq!(root.phone_number.as_deref(), Some("+391234567"));
        assert_eq!(root.children[0].id, "7");

        let lead = &root.records.leads[0];
        assert_eq!(lead.status, "Qualified");
        assert_eq!(lead.owner.as_ref().map(|o| o.id.as_str()), Some("p1"));
        assert_eq!(
            lead.created_time.map(|t| t.to_rfc3339()),
            Some("2024-03-01T09:00:00+00:00".to_string())
        );
    }

    #[test]
    fn malformed_parts_degrade_with_warnings() {
        let normalized = normalize(&json!([
            { "id": "p1", "name": "Alice",
              "Sub_Partners": "oops",
              "Leads": [ { "Full_Name": "No id" }, { "id": "l2", "name": "Ok" }, 42 ] },
            "not a node",
            { "name": "No id partner" }
        ]));

        assert_eq!(normalized.forest.len(), 1);
        let root = &normalized.forest[0];
        assert!(root.children.is_empty());
        assert_eq!(root.records.leads.len(), 1);
        assert_eq!(normalized.warnings.len(), 5);
    }

    #[test]
    fn unknown_shape_is_reported_not_raised() {
        let normalized = normalize(&json!({ "message": "ok" }));
        assert!(normalized.forest.is_empty());
        assert_eq!(normalized.warnings, vec![UNPARSEABLE.to_string()]);

        let garbage = normalize_str("<html>");
        assert!(garbage.forest.is_empty());
        assert!(!garbage.is_clean());
    }

    #[test]
    fn contact_deals_are_parsed() {
        let normalized = normalize(&json!([{
            "id": "p1", "name": "Alice",
            "Contacts": [{
                "id": "c1", "First_Name": "Carla", "Last_Name": "Rossi",
                "Contact_Status": "Active",
                "Deals": [
                    { "id": "d1", "Deal_Name": "Big", "Stage": "Closed Won",
                      "Expected_Revenue": 1500.5, "Closing_Date": "2024-05-31",
                      "Stage_History": [ { "Stage": "Qualification", "Changed_Time": "2024-04-01" } ] },
                    { "id": "d2", "Stage": "Negotiation", "Amount": "200,00" }
                ]
            }]
        }]));

        let contact = &normalized.forest[0].records.contacts[0];
        assert_eq!(contact.name, "Carla Rossi");
        assert_eq!(contact.deals.len(), 2);
        assert_eq!(contact.deals[0].expected_revenue, Money::new(150_050));
        assert_eq!(contact.deals[0].stage_history.len(), 1);
        assert_eq!(contact.deals[1].expected_revenue, Money::new(20_000));
        assert_eq!(
            contact.deals[0].closing_date,
            NaiveDate::from_ymd_opt(2024, 5, 31)
        );
    }

    #[test]
    fn timestamps_accept_backend_formats() {
        assert!(parse_timestamp("2024-01-02T03:04:05Z").is_some());
        assert!(parse_timestamp("2024-01-02 03:04:05").is_some());
        assert!(parse_timestamp("2024-01-02").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
