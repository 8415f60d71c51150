//! Loads a whole GTFS feed into the database
//!
//! The load runs in a single transaction: either every file of the feed is
//! upserted, or nothing is.

use crate::config::{LoaderConfig, DEFAULT_BATCH_SIZE};
use crate::feed::FeedSource;
use crate::records::read_records;
use crate::schema::{Table, CLEAR_ORDER, LOAD_ORDER};
use crate::store;
use crate::Error;
use chrono::{DateTime, Duration, Local};
use log::{error, info};
use rusqlite::Connection;
use std::fmt;
use std::path::Path;

/// Allows to parameterize how the loader behaves
///
/// ```
/// let options = gtfs_loader::LoadOptions::default().with_batch_size(100);
/// let mut loader = gtfs_loader::GtfsLoader::open_in_memory(options)?;
/// let mut feed = gtfs_loader::FeedSource::open("fixtures/basic")?;
/// let summary = loader.load_all(&mut feed, false)?;
/// assert_eq!(4, summary.stats_for("stops.txt").unwrap().records_processed);
/// # Ok::<(), gtfs_loader::Error>(())
/// ```
#[derive(Derivative, Debug, Clone, PartialEq)]
#[derivative(Default)]
pub struct LoadOptions {
    /// Maximum number of rows in one INSERT statement
    #[derivative(Default(value = "DEFAULT_BATCH_SIZE"))]
    pub batch_size: usize,
    /// Enforce the foreign keys between tables
    #[derivative(Default(value = "true"))]
    pub foreign_keys: bool,
}

impl LoadOptions {
    /// Rows per INSERT statement, at least 1
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Do not check the references between the tables
    ///
    /// Useful for partial feeds whose parents are not all present.
    pub fn without_foreign_keys(mut self) -> Self {
        self.foreign_keys = false;
        self
    }
}

impl From<&LoaderConfig> for LoadOptions {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            batch_size: config.load.batch_size,
            foreign_keys: config.database.foreign_keys,
        }
    }
}

/// Number of records read from a file and rows changed by its upsert
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    /// Records read from the file
    pub records_processed: usize,
    /// Rows inserted or updated
    pub records_affected: usize,
}

/// Outcome of [GtfsLoader::load_all]
#[derive(Debug, Clone)]
pub struct LoadSummary {
    /// Start of [GtfsLoader::load_all], before validation
    pub start_time: DateTime<Local>,
    /// Commit of the load
    pub end_time: DateTime<Local>,
    /// `end_time - start_time`
    pub duration: Duration,
    /// Number of files that had records
    pub files_processed: usize,
    /// Records read from every file
    pub total_records: usize,
    /// Rows inserted or updated in every table
    pub total_affected: usize,
    /// Statistics by file name, in load order
    pub file_stats: Vec<(String, FileStats)>,
    /// Optional files absent from the feed
    pub skipped_files: Vec<String>,
    /// sha256 of the archive when the feed is a zip file
    pub sha256: Option<String>,
}

impl LoadSummary {
    /// Statistics of a file, `None` if it was absent or had no records
    pub fn stats_for(&self, file_name: &str) -> Option<&FileStats> {
        self.file_stats
            .iter()
            .find(|(name, _)| name == file_name)
            .map(|(_, stats)| stats)
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "=== GTFS Load Summary ===")?;
        writeln!(
            f,
            "Duration: {:.2} seconds",
            self.duration.num_milliseconds() as f64 / 1000.0
        )?;
        writeln!(f, "Files processed: {}", self.files_processed)?;
        writeln!(f, "Records processed: {}", self.total_records)?;
        writeln!(f, "Records affected: {}", self.total_affected)?;
        writeln!(f)?;
        write!(f, "=== File Details ===")?;
        for (file_name, stats) in &self.file_stats {
            write!(
                f,
                "\n{}: {} processed, {} affected",
                file_name, stats.records_processed, stats.records_affected
            )?;
        }
        Ok(())
    }
}

/// Reads one GTFS file of the feed and upserts it into `table`
///
/// Returns `None` when the file is absent or has no records. A missing
/// required file is an [Error::MissingFiles].
pub fn load_file(
    conn: &Connection,
    feed: &mut FeedSource,
    table: &'static Table,
    batch_size: usize,
) -> Result<Option<FileStats>, Error> {
    info!("Loading {}...", table.file_name);
    let reader = match feed.read_file(table.file_name)? {
        Some(reader) => reader,
        None if table.required => {
            return Err(Error::MissingFiles(vec![table.file_name.to_owned()]))
        }
        None => {
            info!("Optional file {} not found, skipping", table.file_name);
            return Ok(None);
        }
    };

    let parsed = read_records(reader, table.file_name, table)?;
    if parsed.records.is_empty() {
        return Ok(None);
    }
    let batch = parsed.into_batch(table);
    let records_affected = store::upsert_batch(conn, &batch, batch_size)?;
    Ok(Some(FileStats {
        records_processed: batch.len(),
        records_affected,
    }))
}

/// Materializes GTFS feeds into a SQLite database
pub struct GtfsLoader {
    conn: Connection,
    options: LoadOptions,
}

impl GtfsLoader {
    /// Wraps a connection, creating the GTFS tables if needed
    pub fn new(conn: Connection, options: LoadOptions) -> Result<Self, Error> {
        store::prepare(&conn, options.foreign_keys)?;
        Ok(Self { conn, options })
    }

    /// Opens (or creates) the SQLite database at `path`
    pub fn open<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Self, Error> {
        let conn = store::open(path, options.foreign_keys)?;
        Ok(Self { conn, options })
    }

    /// Loads into a fresh in-memory database
    pub fn open_in_memory(options: LoadOptions) -> Result<Self, Error> {
        let conn = store::open_in_memory(options.foreign_keys)?;
        Ok(Self { conn, options })
    }

    /// Opens the database of a configuration, once its overrides are applied
    pub fn from_config(config: &LoaderConfig) -> Result<Self, Error> {
        config.validate()?;
        Self::open(&config.database.path, LoadOptions::from(config))
    }

    /// Connection to the database, to query the loaded tables
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Options given at creation
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Gives back the connection
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Checks that every required file is in the feed
    pub fn validate_files(feed: &FeedSource) -> Result<(), Error> {
        let missing = feed.missing_required();
        if !missing.is_empty() {
            error!("Missing required GTFS files: {:?}", missing);
            return Err(Error::MissingFiles(missing));
        }
        info!("GTFS directory validation passed: {}", feed);
        Ok(())
    }

    /// Loads a single file in its own transaction
    pub fn load_file(
        &mut self,
        feed: &mut FeedSource,
        table: &'static Table,
    ) -> Result<Option<FileStats>, Error> {
        let tx = self.conn.transaction()?;
        let stats = load_file(&tx, feed, table, self.options.batch_size)?;
        tx.commit()?;
        Ok(stats)
    }

    /// Deletes the rows of every GTFS table, children first
    ///
    /// Each table is cleared in its own statement. Returns the number of
    /// rows deleted.
    pub fn clear_all(&mut self) -> Result<usize, Error> {
        info!("Clearing existing GTFS data...");
        let mut cleared = 0;
        for table in CLEAR_ORDER.iter() {
            cleared += store::clear_table(&self.conn, table).map_err(|e| {
                error!("Error clearing {}: {}", table.name, e);
                e
            })?;
        }
        Ok(cleared)
    }

    /// Validates the feed, optionally clears the tables, then loads every
    /// file present in dependency order
    ///
    /// Nothing is written when validation fails. A database error while
    /// loading rolls back every file of the feed.
    pub fn load_all(
        &mut self,
        feed: &mut FeedSource,
        clear_existing: bool,
    ) -> Result<LoadSummary, Error> {
        let start_time = Local::now();
        Self::validate_files(feed)?;

        let (file_stats, skipped_files) =
            self.clear_and_load(feed, clear_existing).map_err(|e| {
                error!("GTFS load failed: {}", e);
                e
            })?;

        let end_time = Local::now();
        let summary = LoadSummary {
            start_time,
            end_time,
            duration: end_time - start_time,
            files_processed: file_stats.len(),
            total_records: file_stats.iter().map(|(_, s)| s.records_processed).sum(),
            total_affected: file_stats.iter().map(|(_, s)| s.records_affected).sum(),
            file_stats,
            skipped_files,
            sha256: feed.sha256().map(str::to_owned),
        };
        info!("GTFS load completed successfully in {}", summary.duration);
        info!("Total records processed: {}", summary.total_records);
        info!("Total records affected: {}", summary.total_affected);
        Ok(summary)
    }

    #[allow(clippy::type_complexity)]
    fn clear_and_load(
        &mut self,
        feed: &mut FeedSource,
        clear_existing: bool,
    ) -> Result<(Vec<(String, FileStats)>, Vec<String>), Error> {
        if clear_existing {
            self.clear_all()?;
        }

        let tx = self.conn.transaction()?;
        let mut file_stats = Vec::new();
        let mut skipped_files = Vec::new();
        for table in LOAD_ORDER.iter() {
            if !feed.contains(table.file_name) {
                skipped_files.push(table.file_name.to_owned());
            }
            if let Some(stats) = load_file(&tx, feed, table, self.options.batch_size)? {
                file_stats.push((table.file_name.to_owned(), stats));
            }
        }
        // deferred foreign keys are checked here
        tx.commit()?;
        Ok((file_stats, skipped_files))
    }
}
