use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub mod session {
    use super::*;

    /// Identity decoded from the bearer token.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SessionView {
        pub subject: String,
        pub phone_number: Option<String>,
        pub expires_at: DateTime<Utc>,
    }
}

pub mod query {
    use engine::{EngineError, Filter, ResultEngine, Sort, SortDirection, SortField};

    use super::*;

    /// Query string accepted by every `/rows` and `/export` endpoint.
    ///
    /// Multi-valued filters are comma separated: `?status=New,Qualified`.
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RowsQuery {
        pub search: Option<String>,
        pub status: Option<String>,
        pub owner: Option<String>,
        pub partner: Option<String>,
        /// Inclusive lower bound on the creation day (UTC).
        pub from: Option<NaiveDate>,
        /// Inclusive upper bound on the creation day (UTC).
        pub to: Option<NaiveDate>,
        pub sort: Option<String>,
        /// `asc` or `desc`, ascending when absent.
        pub dir: Option<String>,
        /// Refetch from the backend before projecting.
        #[serde(default)]
        pub refresh: bool,
    }

    fn split_list(raw: Option<&str>) -> std::collections::BTreeSet<String> {
        raw.map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
    }

    impl RowsQuery {
        pub fn filter(&self) -> ResultEngine<Filter> {
            if let (Some(from), Some(to)) = (self.from, self.to)
                && from > to
            {
                return Err(EngineError::InvalidField(format!(
                    "date range is empty: {from} > {to}"
                )));
            }

            Ok(Filter {
                search: self
                    .search
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string),
                statuses: split_list(self.status.as_deref()),
                owners: split_list(self.owner.as_deref()),
                partners: split_list(self.partner.as_deref()),
                created_from: self.from.map(|day| day.and_time(NaiveTime::MIN).and_utc()),
                created_to: self.to.and_then(|day| {
                    day.and_hms_milli_opt(23, 59, 59, 999)
                        .map(|end| end.and_utc())
                }),
            })
        }

        pub fn sort(&self) -> ResultEngine<Option<Sort>> {
            let Some(field) = self.sort.as_deref().filter(|s| !s.trim().is_empty()) else {
                return Ok(None);
            };
            let field: SortField = field.parse()?;
            let direction = match self.dir.as_deref() {
                Some(dir) => dir.parse()?,
                None => SortDirection::Ascending,
            };
            Ok(Some(Sort::new(field, direction)))
        }
    }
}

pub mod rows {
    use engine::{FilterOptions, FlatRow};

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RowsResponse {
        pub rows: Vec<FlatRow>,
        /// Rows before filtering, overlay included.
        pub total: usize,
        pub filtered: usize,
        pub warnings: Vec<String>,
        pub options: FilterOptions,
        pub fetched_at: Option<DateTime<Utc>>,
    }
}

pub mod tree {
    use engine::{RecordKind, TreeNode};

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TreeResponse {
        pub kind: RecordKind,
        pub nodes: Vec<TreeNode>,
        pub warnings: Vec<String>,
    }
}

pub mod summary {
    use engine::{DealMetrics, RecordKind, StatusTone};

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct StatusCount {
        pub status: String,
        pub count: usize,
        pub tone: StatusTone,
        pub color: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct OwnerCount {
        pub owner_id: String,
        pub owner_name: Option<String>,
        pub count: usize,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SummaryResponse {
        pub kind: RecordKind,
        pub total_records: usize,
        pub total_partners: usize,
        pub by_status: Vec<StatusCount>,
        pub by_owner: Vec<OwnerCount>,
        pub deals: DealMetrics,
        /// Percentage of contacts with at least one deal.
        pub conversion_rate: f64,
        pub warnings: Vec<String>,
    }
}

pub mod dashboard {
    use engine::{DealDashboard, StageBucket};

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DashboardResponse {
        pub total_partners: usize,
        pub total_contacts: usize,
        pub conversion_rate: f64,
        pub win_rate: f64,
        pub average_deal_value: String,
        pub contact_statuses: Vec<StageBucket>,
        pub deals: DealDashboard,
        pub warnings: Vec<String>,
    }
}

pub mod performance {
    use engine::PartnerPerformance;

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PerformanceResponse {
        pub partners: Vec<PartnerPerformance>,
        pub warnings: Vec<String>,
    }
}

pub mod forms {
    use super::*;

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PartnerNew {
        pub name: String,
        pub email: Option<String>,
        pub phone_number: Option<String>,
        /// Parent partner; a root partner when absent.
        pub parent_id: Option<String>,
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LeadNew {
        pub name: String,
        pub email: Option<String>,
        pub phone_number: Option<String>,
        pub status: Option<String>,
        pub partner_id: String,
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ContactNew {
        pub name: String,
        pub email: Option<String>,
        pub phone_number: Option<String>,
        pub status: Option<String>,
        pub partner_id: String,
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DealNew {
        pub name: String,
        pub stage: Option<String>,
        /// Decimal amount, `.` or `,` as separator.
        pub expected_revenue: Option<String>,
        pub closing_date: Option<NaiveDate>,
        pub contact_id: Option<String>,
        pub partner_id: String,
    }

    /// Returned by the portal after a successful create.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Created {
        pub id: String,
    }
}

#[cfg(test)]
mod tests {
    use super::query::RowsQuery;
    use engine::{SortDirection, SortField};

    #[test]
    fn rows_query_splits_lists_and_bounds_days() {
        let query = RowsQuery {
            search: Some("  ".to_string()),
            status: Some("New, Qualified,,".to_string()),
            from: "2024-03-01".parse().ok(),
            to: "2024-03-31".parse().ok(),
            ..RowsQuery::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.search, None);
        assert_eq!(filter.statuses.len(), 2);
        assert!(filter.statuses.contains("Qualified"));
        assert_eq!(
            filter.created_to.unwrap().to_rfc3339(),
            "2024-03-31T23:59:59.999+00:00"
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let query = RowsQuery {
            from: "2024-04-01".parse().ok(),
            to: "2024-03-01".parse().ok(),
            ..RowsQuery::default()
        };
        assert!(query.filter().is_err());
    }

    #[test]
    fn sort_defaults_to_ascending() {
        let query = RowsQuery {
            sort: Some("partnerPath".to_string()),
            ..RowsQuery::default()
        };
        let sort = query.sort().unwrap().unwrap();
        assert_eq!(sort.field, SortField::PartnerPath);
        assert_eq!(sort.direction, SortDirection::Ascending);

        let bad = RowsQuery {
            sort: Some("name".to_string()),
            dir: Some("sideways".to_string()),
            ..RowsQuery::default()
        };
        assert!(bad.sort().is_err());
    }

    #[test]
    fn forms_use_camel_case() {
        let form: super::forms::LeadNew = serde_json::from_str(
            r#"{ "name": "Ann", "phoneNumber": "+391234567", "partnerId": "p1" }"#,
        )
        .unwrap();
        assert_eq!(form.phone_number.as_deref(), Some("+391234567"));
        assert_eq!(form.partner_id, "p1");
    }
}
