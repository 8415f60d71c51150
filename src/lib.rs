/*! Loads [GTFS](https://gtfs.org/) static feeds into a SQLite database

Each GTFS file, fares v2 included, is parsed and upserted into its own table.
Loading the same feed twice leaves the tables unchanged, and a feed that
fails to load leaves them as they were.

```
let mut loader = gtfs_loader::GtfsLoader::open_in_memory(Default::default())?;
let mut feed = gtfs_loader::FeedSource::open("fixtures/basic")?;
let summary = loader.load_all(&mut feed, false)?;
println!("{}", summary);
# Ok::<(), gtfs_loader::Error>(())
```

The values are converted according to the column they are loaded into; see
[schema] for the tables and [coerce] for the conversions.
*/
#![warn(missing_docs)]

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate serde_derive;

pub mod coerce;
pub mod config;
pub mod error;
pub mod feed;
pub mod loader;
pub mod records;
pub mod schema;
pub mod store;

pub use config::LoaderConfig;
pub use error::Error;
pub use feed::FeedSource;
pub use loader::{FileStats, GtfsLoader, LoadOptions, LoadSummary};
