//! Module for the error management
use thiserror::Error;

/// An error that can occur when loading GTFS data.
#[derive(Error, Debug)]
pub enum Error {
    /// Some required files are not in the feed
    #[error("Missing required GTFS files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),
    /// The path is neither a file nor a directory
    #[error("Could not read GTFS: {0} is neither a file nor a directory")]
    NotFileNorDirectory(String),
    /// Generic Input/Output error while reading a file
    #[error("impossible to read file")]
    IO(#[from] std::io::Error),
    /// Impossible to read a file
    #[error("impossible to read '{file_name}'")]
    NamedFileIO {
        /// The file name that could not be read
        file_name: String,
        /// The initial error that caused the unability to read the file
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Impossible to fetch the remote archive
    #[cfg(feature = "read-url")]
    #[error("impossible to remotely access file")]
    Fetch(#[from] reqwest::Error),
    /// Impossible to read a CSV file, the csv error knows the faulty record
    #[error("impossible to read csv file '{file_name}'")]
    CSVError {
        /// File name that could not be parsed as CSV
        file_name: String,
        /// The initial error by the csv library
        #[source]
        source: csv::Error,
    },
    /// Error when trying to unzip the GTFS archive
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// A statement on a GTFS table failed
    #[error("database error on table '{table}': {source}")]
    Database {
        /// SQL table of the statement
        table: String,
        /// The error reported by SQLite
        #[source]
        source: rusqlite::Error,
    },
    /// Error of the database connection or of a transaction
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// The configuration could not be read or is invalid
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn on_table(table: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
        move |source| Error::Database {
            table: table.to_owned(),
            source,
        }
    }
}
