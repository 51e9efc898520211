//! Hierarchy aggregation and view-projection engine.
//!
//! The backend delivers partners as a nested document: partners own
//! sub-partners, and every level carries its own leads, contacts and deals.
//! This crate turns such a document into what the portal renders:
//!
//! - [`normalize`] maps every known response envelope into a canonical
//!   [`PartnerNode`] forest;
//! - [`flatten`] produces table rows annotated with their partner path;
//! - [`aggregate`] rolls counts and deal metrics up the tree;
//! - [`project`] filters and sorts rows;
//! - [`to_delimited_text`] exports rows as CSV;
//! - [`Workspace`] keeps a fetched snapshot next to optimistic rows.
//!
//! Everything is synchronous and free of I/O.

pub use aggregate::{
    Aggregate, ConversionStats, DealMetrics, NodeMetrics, aggregate, all_deals, all_records,
    bucket_by, count_by,
};
pub use analytics::{
    DealDashboard, MonthKey, MonthPoint, PartnerPerformance, StageBucket, deal_dashboard,
    deals_by_month, partner_performance, revenue_forecast, stage_funnel, status_distribution,
};
pub use error::EngineError;
pub use export::{
    ExportOptions, export_file_name, rows_to_records, to_delimited_text, to_delimited_text_with,
};
pub use flatten::{DEFAULT_SEPARATOR, FlatRow, RowSource, RowView, flatten};
pub use model::{
    AttachedRecords, Deal, OwnerRef, PartnerNode, Record, RecordKind, StageTransition, Tracked,
};
pub use money::Money;
pub use normalize::{KindAdapter, Normalized, UNPARSEABLE, normalize, normalize_str};
pub use projection::{Filter, FilterOptions, Sort, SortDirection, SortField, project};
pub use status::{StatusTone, tone_for};
pub use tree::{TreeNode, tree_view};
pub use workspace::{Draft, FetchTicket, Snapshot, Workspace};

pub mod aggregate;
pub mod analytics;
mod error;
pub mod export;
pub mod flatten;
pub mod model;
mod money;
pub mod normalize;
pub mod projection;
pub mod status;
pub mod tree;
mod util;
pub mod workspace;

pub type ResultEngine<T> = Result<T, EngineError>;
