//! `repokit` CLI entry-point.
//!
//! Seeds an in-memory medicine catalog and drives it through the
//! repository / unit-of-work layer. Available sub-commands:
//! - `list`   : one page of medicines, filtered and sorted.
//! - `show`   : a single medicine by id.
//! - `by-form`: raw query for one dosage form.
//! - `stats`  : counts and expiry bounds.
//! - `retire` : delete a medicine by id and commit.

mod catalog;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use memstore::InMemorySession;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uow::{
    CancellationSignal, Include, OrderBy, PageRequest, PagedList, Predicate, QueryOptions,
    RepoError, RepoResult, UnitOfWork, UnitOfWorkConfig, DEFAULT_PAGE_SIZE,
};

use crate::catalog::{Manufacturer, Medicine};

#[derive(Parser)]
#[command(
    name = "repokit",
    about = "Generic repository and unit of work over an in-memory catalog",
    version
)]
struct Cli {
    /// Log filter, e.g. `info` or `uow=debug`. `RUST_LOG` takes precedence.
    #[arg(long, env = "REPOKIT_LOG", default_value = "info", global = true)]
    log_level: String,

    /// Number of medicines to seed.
    #[arg(long, env = "REPOKIT_SEED", default_value_t = 40, global = true)]
    seed: usize,

    /// Page size used when a command does not pass `--page-size`.
    #[arg(long, env = "REPOKIT_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE, global = true)]
    default_page_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List one page of medicines.
    List {
        /// Zero-based page index.
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
        /// Case-insensitive search in the medicine name.
        #[arg(long)]
        search: Option<String>,
        /// Only medicines made by this manufacturer id.
        #[arg(long)]
        manufacturer: Option<String>,
        /// Only medicines expiring before this date (YYYY-MM-DD).
        #[arg(long)]
        expires_before: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = SortKey::Name)]
        sort: SortKey,
        /// Include discontinued medicines.
        #[arg(long)]
        all: bool,
        /// Print names only.
        #[arg(long)]
        names_only: bool,
    },
    /// Show one medicine.
    Show { id: String },
    /// List medicines of one dosage form through a raw query.
    ByForm { form: String },
    /// Catalog statistics.
    Stats,
    /// Delete a medicine and commit.
    Retire { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortKey {
    Name,
    Expiration,
    Id,
}

impl SortKey {
    fn ordering(self) -> OrderBy<Medicine> {
        match self {
            Self::Name => OrderBy::asc(|m: &Medicine| m.name.clone()),
            // Undated medicines sort last.
            Self::Expiration => {
                OrderBy::asc(|m: &Medicine| (m.expiration_date.is_none(), m.expiration_date))
                    .then(OrderBy::asc(|m: &Medicine| m.id.clone()))
            }
            Self::Id => OrderBy::asc(|m: &Medicine| m.id.clone()),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Report {
    Page(PagedList<Medicine>),
    Names(PagedList<String>),
    One(Option<Medicine>),
    Rows(Vec<Medicine>),
    Stats {
        active: usize,
        discontinued: usize,
        expired: usize,
        earliest_expiry: Option<NaiveDate>,
        latest_expiry: Option<NaiveDate>,
        per_manufacturer: BTreeMap<String, usize>,
    },
    Retired {
        id: String,
        found: bool,
        affected: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid --log-level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = UnitOfWorkConfig {
        label: "repokit".to_string(),
        default_page_size: cli.default_page_size,
    };
    let mut uow = UnitOfWork::with_config(catalog::open(cli.seed), config);
    info!("seeded {} medicine(s)", cli.seed);

    let cancel = CancellationSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling pending reads");
            on_interrupt.cancel();
        }
    });

    let result = run(&mut uow, cli.command, &cancel).await;
    let report = uow.complete(result).context("command failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(
    uow: &mut UnitOfWork<InMemorySession>,
    command: Command,
    cancel: &CancellationSignal,
) -> RepoResult<Report> {
    let medicines = uow.get_repository::<Medicine>()?;

    match command {
        Command::List {
            page,
            page_size,
            search,
            manufacturer,
            expires_before,
            sort,
            all,
            names_only,
        } => {
            let mut options = QueryOptions::new()
                .include(Include::all::<Medicine>())
                .order_by(sort.ordering())
                .ignore_filters(all);
            if let Some(needle) = search {
                let by_name = Predicate::contains_text(|m: &Medicine| m.name.clone(), needle);
                options = options.predicate(by_name);
            }
            if let Some(maker) = manufacturer {
                options = options.filter(move |m: &Medicine| {
                    m.manufacturer_id.as_deref() == Some(maker.as_str())
                });
            }
            if let Some(date) = expires_before {
                options = options
                    .filter(move |m: &Medicine| m.expiration_date.is_some_and(|d| d < date));
            }

            let page = match page_size {
                Some(size) => PageRequest::new(page, size),
                None => medicines.page(page),
            };
            if names_only {
                let names = medicines
                    .get_paged_list_projected(|m: &Medicine| m.name.clone(), options, page, cancel)
                    .await?;
                Ok(Report::Names(names))
            } else {
                Ok(Report::Page(medicines.get_paged_list(options, page, cancel).await?))
            }
        }

        Command::Show { id } => Ok(Report::One(medicines.find_by_id(&id, cancel).await?)),

        Command::ByForm { form } => {
            let rows = medicines
                .from_sql(catalog::BY_DOSAGE_FORM, &[json!(form)], cancel)
                .await?;
            Ok(Report::Rows(rows))
        }

        Command::Stats => {
            let today = Utc::now().date_naive();
            let dated = || Some(Predicate::new(|m: &Medicine| m.expiration_date.is_some()));

            let discontinued = medicines.find(
                QueryOptions::new()
                    .ignore_filters(true)
                    .filter(|m: &Medicine| m.discontinued),
            );
            let expired =
                Predicate::new(move |m: &Medicine| m.expiration_date.is_some_and(|d| d < today));

            let mut per_manufacturer = BTreeMap::new();
            let manufacturers = uow.get_repository::<Manufacturer>()?;
            for maker in manufacturers.list_all(false, cancel).await? {
                let id = maker.id.clone();
                let made = Predicate::new(move |m: &Medicine| {
                    m.manufacturer_id.as_deref() == Some(id.as_str())
                });
                per_manufacturer.insert(maker.name, medicines.count(Some(made), cancel).await?);
            }

            let expiry = |m: &Medicine| m.expiration_date;
            let earliest = medicines.min(expiry, dated(), cancel).await;
            let latest = medicines.max(expiry, dated(), cancel).await;

            Ok(Report::Stats {
                active: medicines.count(None, cancel).await?,
                discontinued: medicines.fetch(&discontinued, cancel).await?.len(),
                expired: medicines.count(Some(expired), cancel).await?,
                earliest_expiry: or_empty(earliest)?.flatten(),
                latest_expiry: or_empty(latest)?.flatten(),
                per_manufacturer,
            })
        }

        Command::Retire { id } => {
            let found = medicines.delete_by_key(&id, cancel).await?;
            let affected = uow.commit().await?;
            Ok(Report::Retired { id, found, affected })
        }
    }
}

/// Treat an aggregate over an empty set as "no value".
fn or_empty<T>(result: RepoResult<T>) -> RepoResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RepoError::EmptyAggregate { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}
