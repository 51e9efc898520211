use std::{collections::BTreeSet, fmt::Write as _, path::PathBuf, time::Duration};

use backend_client::BackendClient;
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine::{
    Aggregate, DEFAULT_SEPARATOR, Filter, FlatRow, PartnerNode, PartnerPerformance, RecordKind,
    RowView, Sort, SortDirection, SortField, aggregate, deal_dashboard, flatten, normalize,
    partner_performance, project, to_delimited_text, tone_for,
};

use crate::error::{AppError, Result};

mod error;

#[derive(Parser, Debug)]
#[command(name = "channelhub_cli")]
#[command(about = "Flatten, summarize and export partner hierarchies")]
struct Cli {
    /// Log level for diagnostics on stderr.
    #[arg(long, env = "CHANNELHUB_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flattened table rows as CSV.
    Rows(RowsArgs),
    /// Roll-up counts for a record kind.
    Summary(SummaryArgs),
    /// Per-partner deal performance as CSV.
    Performance(PerformanceArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Partner,
    Lead,
    Contact,
    Deal,
}

impl From<Kind> for RowView {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Partner => RowView::Partners,
            Kind::Lead => RowView::Records(RecordKind::Lead),
            Kind::Contact => RowView::Records(RecordKind::Contact),
            Kind::Deal => RowView::Records(RecordKind::Deal),
        }
    }
}

/// Where the hierarchy document comes from.
#[derive(Args, Debug)]
struct Source {
    /// JSON file holding a backend response.
    #[arg(long, conflicts_with = "base_url")]
    input: Option<PathBuf>,
    /// Backend base URL.
    #[arg(long, env = "CHANNELHUB_BASE_URL")]
    base_url: Option<String>,
    /// Bearer token forwarded to the backend.
    #[arg(long, env = "CHANNELHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long, default_value_t = 15)]
    timeout_secs: u64,
    /// Separator between partner names in paths.
    #[arg(long, default_value = DEFAULT_SEPARATOR)]
    separator: String,
}

#[derive(Args, Debug)]
struct RowsArgs {
    #[arg(long, value_enum)]
    kind: Kind,
    #[command(flatten)]
    source: Source,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    status: Vec<String>,
    #[arg(long)]
    owner: Vec<String>,
    #[arg(long)]
    partner: Vec<String>,
    /// First creation day to include (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last creation day to include (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    desc: bool,
    /// Write to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    #[arg(long, value_enum)]
    kind: Kind,
    #[command(flatten)]
    source: Source,
    /// IANA zone for monthly buckets.
    #[arg(long, default_value = "UTC")]
    timezone: Tz,
}

#[derive(Args, Debug)]
struct PerformanceArgs {
    #[command(flatten)]
    source: Source,
    #[arg(long)]
    output: Option<PathBuf>,
}

async fn load(source: &Source, view: RowView) -> Result<Vec<PartnerNode>> {
    let body = match (&source.input, &source.base_url) {
        (Some(path), _) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        (None, Some(base_url)) => {
            let token = source
                .token
                .as_deref()
                .ok_or_else(|| AppError::Usage("--token is required with --base-url".to_string()))?;
            BackendClient::new(base_url, Duration::from_secs(source.timeout_secs))?
                .hierarchy(token, view)
                .await?
        }
        (None, None) => {
            return Err(AppError::Usage(
                "either --input or --base-url is required".to_string(),
            ));
        }
    };

    let normalized = normalize(&body);
    for warning in &normalized.warnings {
        tracing::warn!("{warning}");
    }
    Ok(normalized.forest)
}

fn write_output(output: Option<&PathBuf>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!(path = %path.display(), "export written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

impl RowsArgs {
    fn filter(&self) -> Filter {
        let set = |values: &[String]| values.iter().cloned().collect::<BTreeSet<_>>();
        Filter {
            search: self.search.clone(),
            statuses: set(&self.status),
            owners: set(&self.owner),
            partners: set(&self.partner),
            created_from: self.from.map(|day| day.and_time(NaiveTime::MIN).and_utc()),
            created_to: self
                .to
                .and_then(|day| day.and_hms_milli_opt(23, 59, 59, 999))
                .map(|end| end.and_utc()),
        }
    }

    fn sort(&self) -> Result<Option<Sort>> {
        let direction = if self.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        self.sort
            .as_deref()
            .map(|field| -> Result<Sort> {
                Ok(Sort::new(field.parse::<SortField>()?, direction))
            })
            .transpose()
    }
}

fn rows_csv(forest: &[PartnerNode], args: &RowsArgs) -> Result<String> {
    let rows = flatten(forest, args.kind.into(), &args.source.separator);
    let rows = project(&rows, &args.filter(), args.sort()?.as_ref());
    let records: Vec<_> = rows.iter().map(FlatRow::export_record).collect();
    Ok(to_delimited_text(&records)?)
}

fn render_summary(kind: RecordKind, agg: &Aggregate, forest: &[PartnerNode], tz: Tz) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", kind.plural_label(), agg.total_records);
    let _ = writeln!(out, "Partners: {}", agg.total_nodes);

    let mut statuses: Vec<_> = agg.by_status.iter().collect();
    statuses.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (status, count) in statuses {
        let tone = tone_for(kind, status);
        let _ = writeln!(out, "  {status:<28} {count:>6}  ({tone:?})");
    }

    let deals = deal_dashboard(forest, tz);
    let _ = writeln!(
        out,
        "Deals: {} (won {}, lost {}, open {})",
        deals.deals.deal_count, deals.deals.won_count, deals.deals.lost_count, deals.deals.open_count
    );
    let _ = writeln!(
        out,
        "Total value: {}  Average: {}  Win rate: {:.1}%",
        deals.deals.total_value,
        deals.deals.average_value(),
        deals.deals.win_rate()
    );
    if kind == RecordKind::Contact {
        let _ = writeln!(out, "Conversion: {:.1}%", agg.conversion.rate());
    }
    for point in &deals.by_month {
        let _ = writeln!(out, "  {:<10} {:>4}  {}", point.label, point.count, point.value);
    }
    out
}

fn performance_csv(forest: &[PartnerNode], separator: &str) -> Result<String> {
    let records: Vec<_> = partner_performance(forest, separator)
        .iter()
        .map(PartnerPerformance::export_record)
        .collect();
    Ok(to_delimited_text(&records)?)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Rows(args) => {
            let forest = load(&args.source, args.kind.into()).await?;
            let text = rows_csv(&forest, &args)?;
            write_output(args.output.as_ref(), &text)
        }
        Command::Summary(args) => {
            let kind = match RowView::from(args.kind) {
                RowView::Records(kind) => kind,
                RowView::Partners => {
                    return Err(AppError::Usage(
                        "summary needs a record kind: lead, contact or deal".to_string(),
                    ));
                }
            };
            let forest = load(&args.source, args.kind.into()).await?;
            let agg = aggregate(&forest, kind);
            print!("{}", render_summary(kind, &agg, &forest, args.timezone));
            Ok(())
        }
        Command::Performance(args) => {
            let forest = load(&args.source, RowView::Partners).await?;
            let text = performance_csv(&forest, &args.source.separator)?;
            write_output(args.output.as_ref(), &text)
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(format!(
            "channelhub_cli={level},backend_client={level},engine={level}",
            level = cli.log_level
        ))
        .init();

    run(cli).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use engine::Record;

    use super::*;

    fn forest() -> Vec<PartnerNode> {
        let mut won = Record::new(RecordKind::Contact, "c1", "Carl");
        won.status = "Active".to_string();
        won.deals.push(engine::Deal {
            id: "d1".to_string(),
            name: "Big".to_string(),
            stage: "Closed Won".to_string(),
            stage_history: Vec::new(),
            expected_revenue: engine::Money::new(50_000),
            closing_date: None,
            created_time: None,
            owner: None,
        });
        vec![
            PartnerNode::new("p1", "Alice")
                .with_record(won)
                .with_child(
                    PartnerNode::new("p2", "Bob")
                        .with_record(Record::new(RecordKind::Contact, "c2", "Cleo")),
                ),
        ]
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("channelhub_cli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn rows_command_filters_and_sorts() {
        let cli = parse(&[
            "rows", "--kind", "contact", "--input", "x.json", "--sort", "name", "--desc",
        ]);
        let Command::Rows(args) = cli.command else {
            panic!("expected rows");
        };
        let csv = rows_csv(&forest(), &args).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("c2,Cleo"));
        assert!(lines[1].contains("Alice > Bob"));
    }

    #[test]
    fn empty_selection_is_an_error() {
        let cli = parse(&["rows", "--kind", "lead", "--input", "x.json"]);
        let Command::Rows(args) = cli.command else {
            panic!("expected rows");
        };
        assert!(matches!(
            rows_csv(&forest(), &args),
            Err(AppError::Engine(engine::EngineError::NothingToExport))
        ));
    }

    #[test]
    fn input_and_base_url_conflict() {
        let res = Cli::try_parse_from([
            "channelhub_cli",
            "performance",
            "--input",
            "x.json",
            "--base-url",
            "http://crm.local",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn summary_mentions_conversion_for_contacts() {
        let forest = forest();
        let agg = aggregate(&forest, RecordKind::Contact);
        let text = render_summary(RecordKind::Contact, &agg, &forest, Tz::UTC);
        assert!(text.starts_with("Contacts: 2\nPartners: 2\n"));
        assert!(text.contains("Conversion: 50.0%"));
        assert!(text.contains("Win rate: 100.0%"));
    }

    #[test]
    fn performance_rows_roll_up() {
        let csv = performance_csv(&forest(), " / ").unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("Alice,,0,0,2,1,1,100.0,500.00"));
        assert!(lines[2].starts_with("Bob,Alice,1,"));
    }
}
