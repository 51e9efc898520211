//! Filter and sort projection over flat rows.
//!
//! A [`Filter`] is a conjunction of independent dimensions; inside a set
//! dimension (statuses, owners, partners) any member matches. An empty or
//! unset dimension matches every row. Sorting is stable, so projecting an
//! already projected list returns it unchanged.

use std::{cmp::Ordering, collections::BTreeSet, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    EngineError,
    flatten::FlatRow,
    util::{collate, digits, fold_key, fold_text},
};

/// Row predicate. Set members are compared case-insensitively.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    /// Substring searched in name, email and phone.
    pub search: Option<String>,
    pub statuses: BTreeSet<String>,
    /// Owner ids or owner names.
    pub owners: BTreeSet<String>,
    /// Owning partner names or ids.
    pub partners: BTreeSet<String>,
    /// Inclusive lower bound on the creation time.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the creation time.
    pub created_to: Option<DateTime<Utc>>,
}

impl Filter {
    /// `true` when no dimension is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.search.as_deref().is_none_or(|s| s.trim().is_empty())
            && self.statuses.is_empty()
            && self.owners.is_empty()
            && self.partners.is_empty()
            && self.created_from.is_none()
            && self.created_to.is_none()
    }

    /// Folds the filter once so per-row checks only compare prepared keys.
    fn compile(&self) -> CompiledFilter {
        let fold_set = |set: &BTreeSet<String>| -> BTreeSet<String> {
            set.iter()
                .map(|value| fold_text(value))
                .filter(|value| !value.is_empty())
                .collect()
        };
        let search = self
            .search
            .as_deref()
            .map(fold_text)
            .filter(|s| !s.is_empty());
        let search_digits = search
            .as_deref()
            .map(digits)
            .filter(|d| !d.is_empty() && search.as_deref().is_some_and(is_phone_like));
        CompiledFilter {
            search,
            search_digits,
            statuses: fold_set(&self.statuses),
            owners: fold_set(&self.owners),
            partners: fold_set(&self.partners),
            created_from: self.created_from,
            created_to: self.created_to,
        }
    }

    /// Tests a single row.
    #[must_use]
    pub fn matches(&self, row: &FlatRow) -> bool {
        self.compile().matches(row)
    }
}

fn is_phone_like(query: &str) -> bool {
    query
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.'))
}

struct CompiledFilter {
    search: Option<String>,
    search_digits: Option<String>,
    statuses: BTreeSet<String>,
    owners: BTreeSet<String>,
    partners: BTreeSet<String>,
    created_from: Option<DateTime<Utc>>,
    created_to: Option<DateTime<Utc>>,
}

impl CompiledFilter {
    fn matches(&self, row: &FlatRow) -> bool {
        self.matches_search(row)
            && Self::matches_set(&self.statuses, [Some(row.status.as_str())])
            && Self::matches_set(
                &self.owners,
                [row.owner_id.as_deref(), row.owner_name.as_deref()],
            )
            && Self::matches_set(
                &self.partners,
                [row.partner_name.as_deref(), row.partner_id.as_deref()],
            )
            && self.matches_range(row)
    }

    fn matches_search(&self, row: &FlatRow) -> bool {
        let Some(query) = &self.search else {
            return true;
        };
        let text_hit = [
            Some(row.name.as_str()),
            row.email.as_deref(),
            row.phone_number.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| fold_text(field).contains(query.as_str()));
        if text_hit {
            return true;
        }
        match (&self.search_digits, row.phone_number.as_deref()) {
            (Some(wanted), Some(phone)) => digits(phone).contains(wanted.as_str()),
            _ => false,
        }
    }

    fn matches_set<const N: usize>(set: &BTreeSet<String>, values: [Option<&str>; N]) -> bool {
        if set.is_empty() {
            return true;
        }
        values
            .into_iter()
            .flatten()
            .any(|value| set.contains(&fold_text(value)))
    }

    fn matches_range(&self, row: &FlatRow) -> bool {
        if self.created_from.is_none() && self.created_to.is_none() {
            return true;
        }
        let Some(created) = row.created_time else {
            return false;
        };
        self.created_from.is_none_or(|from| created >= from)
            && self.created_to.is_none_or(|to| created <= to)
    }
}

/// Column a projection can sort by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Name,
    Email,
    Phone,
    Status,
    Owner,
    Partner,
    PartnerPath,
    PartnerLevel,
    CreatedTime,
    DealCount,
    DealValue,
}

impl FromStr for SortField {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_key(s).replace(' ', "").as_str() {
            "name" => Ok(Self::Name),
            "email" => Ok(Self::Email),
            "phone" | "phonenumber" => Ok(Self::Phone),
            "status" | "stage" => Ok(Self::Status),
            "owner" | "ownername" => Ok(Self::Owner),
            "partner" | "partnername" => Ok(Self::Partner),
            "partnerpath" | "path" => Ok(Self::PartnerPath),
            "partnerlevel" | "level" => Ok(Self::PartnerLevel),
            "created" | "createdtime" | "createdat" => Ok(Self::CreatedTime),
            "deals" | "dealcount" => Ok(Self::DealCount),
            "value" | "dealvalue" => Ok(Self::DealValue),
            _ => Err(EngineError::InvalidField(format!("unknown sort field: {s}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

impl FromStr for SortDirection {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "ascend" => Ok(Self::Ascending),
            "desc" | "descending" | "descend" => Ok(Self::Descending),
            other => Err(EngineError::InvalidField(format!(
                "unknown sort direction: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Sort {
    #[must_use]
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Field comparison, then direction.
    #[must_use]
    pub fn compare(&self, a: &FlatRow, b: &FlatRow) -> Ordering {
        let text = |x: Option<&str>, y: Option<&str>| collate(x.unwrap_or(""), y.unwrap_or(""));
        let ordering = match self.field {
            SortField::Name => collate(&a.name, &b.name),
            SortField::Email => text(a.email.as_deref(), b.email.as_deref()),
            SortField::Phone => text(a.phone_number.as_deref(), b.phone_number.as_deref()),
            SortField::Status => collate(&a.status, &b.status),
            SortField::Owner => text(a.owner_name.as_deref(), b.owner_name.as_deref()),
            SortField::Partner => text(a.partner_name.as_deref(), b.partner_name.as_deref()),
            SortField::PartnerPath => collate(&a.partner_path, &b.partner_path),
            SortField::PartnerLevel => a.partner_level.cmp(&b.partner_level),
            // `None < Some(_)`: missing dates sort as the lowest value.
            SortField::CreatedTime => a.created_time.cmp(&b.created_time),
            SortField::DealCount => a.deal_count.cmp(&b.deal_count),
            SortField::DealValue => a.deal_value.cmp(&b.deal_value),
        };
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Filters then sorts rows. Pure: the input is left untouched.
pub fn project(rows: &[FlatRow], filter: &Filter, sort: Option<&Sort>) -> Vec<FlatRow> {
    let compiled = filter.compile();
    let mut out: Vec<FlatRow> = rows
        .iter()
        .filter(|row| compiled.matches(row))
        .cloned()
        .collect();
    if let Some(sort) = sort {
        out.sort_by(|a, b| sort.compare(a, b));
    }
    out
}

/// Distinct values offered by the filter pickers of a table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub statuses: Vec<String>,
    pub owners: Vec<String>,
    pub partners: Vec<String>,
}

impl FilterOptions {
    pub fn from_rows(rows: &[FlatRow]) -> Self {
        fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
            let mut seen = BTreeSet::new();
            let mut out: Vec<String> = Vec::new();
            for value in values {
                let value = value.trim();
                if value.is_empty() || !seen.insert(fold_text(value)) {
                    continue;
                }
                out.push(value.to_string());
            }
            out.sort_by(|a, b| collate(a, b));
            out
        }

        Self {
            statuses: distinct(rows.iter().map(|row| row.status.as_str())),
            owners: distinct(rows.iter().filter_map(|row| row.owner_name.as_deref())),
            partners: distinct(rows.iter().filter_map(|row| row.partner_name.as_deref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{Money, flatten::RowSource};

    fn row(id: &str, name: &str, status: &str) -> FlatRow {
        FlatRow {
            id: id.to_string(),
            source: RowSource::Lead,
            name: name.to_string(),
            email: None,
            phone_number: None,
            status: status.to_string(),
            owner_id: None,
            owner_name: None,
            created_time: None,
            partner_id: Some("p".to_string()),
            partner_name: Some("Alice".to_string()),
            partner_path: "Alice".to_string(),
            partner_level: 0,
            deal_count: 0,
            deal_value: Money::ZERO,
            pending: false,
        }
    }

    #[test]
    fn search_matches_name_email_and_phone() {
        let mut with_email = row("1", "Zed", "New");
        with_email.email = Some("Zed@Example.com".to_string());
        let mut with_phone = row("2", "Yan", "New");
        with_phone.phone_number = Some("+39 333-123 4567".to_string());
        let rows = vec![with_email, with_phone, row("3", "Émile", "New")];

        let search = |q: &str| {
            let filter = Filter {
                search: Some(q.to_string()),
                ..Filter::default()
            };
            project(&rows, &filter, None)
                .into_iter()
                .map(|r| r.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(search("example.COM"), vec!["1"]);
        assert_eq!(search("3331234"), vec!["2"]);
        assert_eq!(search("emile"), vec!["3"]);
        assert_eq!(search("   ").len(), 3);
    }

    #[test]
    fn date_range_is_inclusive_and_bounds_are_independent() {
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        let rows: Vec<FlatRow> = (1..=3)
            .map(|d| {
                let mut r = row(&d.to_string(), "x", "New");
                r.created_time = Some(day(d));
                r
            })
            .chain(std::iter::once(row("none", "x", "New")))
            .collect();

        let only_from = Filter {
            created_from: Some(day(2)),
            ..Filter::default()
        };
        assert_eq!(project(&rows, &only_from, None).len(), 2);

        let closed = Filter {
            created_from: Some(day(1)),
            created_to: Some(day(1)),
            ..Filter::default()
        };
        assert_eq!(project(&rows, &closed, None).len(), 1);
    }

    #[test]
    fn missing_dates_sort_lowest() {
        let mut dated = row("dated", "a", "New");
        dated.created_time = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let undated = row("undated", "b", "New");
        let sort = Sort::new(SortField::CreatedTime, SortDirection::Ascending);
        let sorted = project(&[dated, undated], &Filter::default(), Some(&sort));
        assert_eq!(sorted[0].id, "undated");
    }

    #[test]
    fn sort_field_and_direction_parse() {
        assert_eq!("createdTime".parse::<SortField>().unwrap(), SortField::CreatedTime);
        assert_eq!("partner_path".parse::<SortField>().unwrap(), SortField::PartnerPath);
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Descending);
        assert!("sideways".parse::<SortDirection>().is_err());
        assert_eq!(SortDirection::Ascending.toggled(), SortDirection::Descending);
    }

    #[test]
    fn status_filter_ignores_case_but_not_punctuation() {
        let rows = vec![
            row("1", "a", "Pre-Qualified"),
            row("2", "b", "pre-qualified"),
            row("3", "c", "Pre Qualified"),
            row("4", "d", "Prequalified"),
        ];
        let filter = Filter {
            statuses: ["PRE-QUALIFIED".to_string()].into(),
            ..Filter::default()
        };
        let ids: Vec<_> = project(&rows, &filter, None)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);

        let options = FilterOptions::from_rows(&rows);
        assert_eq!(options.statuses.len(), 4);
    }

    #[test]
    fn filter_options_are_distinct_and_sorted() {
        let rows = vec![row("1", "a", "new"), row("2", "b", "New"), row("3", "c", "Lost")];
        let options = FilterOptions::from_rows(&rows);
        assert_eq!(options.statuses, vec!["Lost", "new"]);
        assert_eq!(options.partners, vec!["Alice"]);
    }
}
