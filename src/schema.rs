//! Static description of the GTFS tables
//!
//! Every GTFS file maps to one table. The descriptor gives, for each column,
//! the semantic type used to coerce the csv values, and the constraints used
//! to create the table and to build the upsert statements.

use itertools::Itertools;
use std::fmt;

/// How a raw csv value is converted before being stored
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Whole number, `"3.0"` is accepted
    Integer,
    /// Fixed point number, used for amounts of money
    Decimal,
    /// Floating point number, used for coordinates and distances
    Float,
    /// `YYYYMMDD` in the feed
    Date,
    /// `HH:MM:SS` in the feed, hours can be greater than 24
    Time,
    /// Kept as is, trimmed
    Text,
}

impl ColumnType {
    /// SQL type used in the `CREATE TABLE` statement.
    ///
    /// Decimals get a NUMERIC affinity, so amounts compare and sort as numbers.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Decimal => "DECIMAL(10,2)",
            ColumnType::Float => "REAL",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A column of a GTFS table, named as the csv header
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Column {
    /// Name of the column, and of the csv field
    pub name: &'static str,
    /// Conversion of the raw values
    pub column_type: ColumnType,
    /// Part of the primary key, which implies `not_null`
    pub primary_key: bool,
    /// Rows without a value are rejected by the database
    pub not_null: bool,
    /// SQL literal used when the column is absent from the feed
    pub default: Option<&'static str>,
    /// `(table, column)` this column refers to
    pub references: Option<(&'static str, &'static str)>,
}

impl Column {
    const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Column {
            name,
            column_type,
            primary_key: false,
            not_null: false,
            default: None,
            references: None,
        }
    }

    const fn key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    const fn default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    const fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some((table, column));
        self
    }

    fn definition(&self) -> String {
        let mut def = format!("\"{}\" {}", self.name, self.column_type.sql_type());
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }
}

const fn integer(name: &'static str) -> Column {
    Column::new(name, ColumnType::Integer)
}

const fn decimal(name: &'static str) -> Column {
    Column::new(name, ColumnType::Decimal)
}

const fn float(name: &'static str) -> Column {
    Column::new(name, ColumnType::Float)
}

const fn date(name: &'static str) -> Column {
    Column::new(name, ColumnType::Date)
}

const fn time(name: &'static str) -> Column {
    Column::new(name, ColumnType::Time)
}

const fn text(name: &'static str) -> Column {
    Column::new(name, ColumnType::Text)
}

/// A GTFS file and the table it is loaded into
#[derive(Debug, PartialEq, Eq)]
pub struct Table {
    /// Name of the SQL table
    pub name: &'static str,
    /// Name of the file in the feed
    pub file_name: &'static str,
    /// A feed without this file is rejected
    pub required: bool,
    /// Columns in the order of the `CREATE TABLE` statement
    pub columns: &'static [Column],
}

impl Table {
    /// Column with the given csv header
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns of the primary key, the conflict target of the upserts
    pub fn primary_key(&self) -> impl Iterator<Item = &'static Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Columns updated when a row already exists
    pub fn non_key_columns(&self) -> impl Iterator<Item = &'static Column> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Tables this one has a foreign key to, itself excluded
    pub fn dependencies(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .filter_map(|c| c.references.map(|(table, _)| table))
            .filter(move |t| *t != self.name)
            .unique()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement of the table
    ///
    /// Foreign keys are deferred to the end of the transaction: a feed is
    /// loaded in several statements and a stop can be listed before its
    /// parent station.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(Column::definition).collect();
        parts.push(format!(
            "PRIMARY KEY ({})",
            self.primary_key().map(|c| format!("\"{}\"", c.name)).join(", ")
        ));
        for column in self.columns {
            if let Some((table, parent)) = column.references {
                parts.push(format!(
                    "FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"{}\") DEFERRABLE INITIALLY DEFERRED",
                    column.name, table, parent
                ));
            }
        }
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n)",
            self.name,
            parts.join(",\n    ")
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// `agency.txt`, the transit agencies
pub static AGENCY: Table = Table {
    name: "gtfs_agency",
    file_name: "agency.txt",
    required: true,
    columns: &[
        text("agency_id").key(),
        text("agency_name").not_null(),
        text("agency_url").not_null(),
        text("agency_timezone").not_null(),
        text("agency_lang"),
        text("agency_phone"),
        text("agency_fare_url"),
    ],
};

/// `stops.txt`, stops and stations
pub static STOPS: Table = Table {
    name: "gtfs_stops",
    file_name: "stops.txt",
    required: true,
    columns: &[
        text("stop_id").key(),
        text("stop_code"),
        text("stop_name").not_null(),
        text("stop_desc"),
        float("stop_lat").not_null(),
        float("stop_lon").not_null(),
        text("zone_id"),
        text("stop_url"),
        integer("location_type").default("0"),
        text("parent_station").references("gtfs_stops", "stop_id"),
        text("stop_timezone"),
        integer("wheelchair_boarding").default("0"),
    ],
};

/// `routes.txt`
pub static ROUTES: Table = Table {
    name: "gtfs_routes",
    file_name: "routes.txt",
    required: true,
    columns: &[
        text("route_id").key(),
        text("agency_id")
            .not_null()
            .references("gtfs_agency", "agency_id"),
        text("route_short_name"),
        text("route_long_name").not_null(),
        text("route_desc"),
        integer("route_type").not_null(),
        text("route_url"),
        text("route_color").default("'FFFFFF'"),
        text("route_text_color").default("'000000'"),
        integer("route_sort_order"),
        text("network_id"),
    ],
};

/// `calendar.txt`, the weekly service patterns
pub static CALENDAR: Table = Table {
    name: "gtfs_calendar",
    file_name: "calendar.txt",
    required: true,
    columns: &[
        text("service_id").key(),
        integer("monday").not_null(),
        integer("tuesday").not_null(),
        integer("wednesday").not_null(),
        integer("thursday").not_null(),
        integer("friday").not_null(),
        integer("saturday").not_null(),
        integer("sunday").not_null(),
        date("start_date").not_null(),
        date("end_date").not_null(),
    ],
};

/// `calendar_dates.txt`, service exceptions
pub static CALENDAR_DATES: Table = Table {
    name: "gtfs_calendar_dates",
    file_name: "calendar_dates.txt",
    required: false,
    columns: &[
        text("service_id")
            .key()
            .references("gtfs_calendar", "service_id"),
        date("date").key(),
        integer("exception_type").not_null(),
    ],
};

// shape_id is not unique in gtfs_shapes, so it cannot be a foreign key target
/// `trips.txt`
pub static TRIPS: Table = Table {
    name: "gtfs_trips",
    file_name: "trips.txt",
    required: true,
    columns: &[
        text("trip_id").key(),
        text("route_id")
            .not_null()
            .references("gtfs_routes", "route_id"),
        text("service_id")
            .not_null()
            .references("gtfs_calendar", "service_id"),
        text("trip_headsign"),
        text("trip_short_name"),
        integer("direction_id"),
        text("block_id"),
        text("shape_id"),
        integer("wheelchair_accessible").default("0"),
        integer("bikes_allowed").default("0"),
    ],
};

/// `stop_times.txt`, the arrival and departure of each trip at its stops
pub static STOP_TIMES: Table = Table {
    name: "gtfs_stop_times",
    file_name: "stop_times.txt",
    required: true,
    columns: &[
        text("trip_id").key().references("gtfs_trips", "trip_id"),
        time("arrival_time").not_null(),
        time("departure_time").not_null(),
        text("stop_id")
            .not_null()
            .references("gtfs_stops", "stop_id"),
        integer("stop_sequence").key(),
        text("stop_headsign"),
        integer("pickup_type").default("0"),
        integer("drop_off_type").default("0"),
        float("shape_dist_traveled"),
        integer("timepoint").default("1"),
    ],
};

/// `shapes.txt`, the points of the vehicle paths
pub static SHAPES: Table = Table {
    name: "gtfs_shapes",
    file_name: "shapes.txt",
    required: false,
    columns: &[
        text("shape_id").key(),
        float("shape_pt_lat").key(),
        float("shape_pt_lon").key(),
        integer("shape_pt_sequence").key(),
        float("shape_dist_traveled"),
    ],
};

/// `feed_info.txt`
pub static FEED_INFO: Table = Table {
    name: "gtfs_feed_info",
    file_name: "feed_info.txt",
    required: false,
    columns: &[
        text("feed_publisher_name").key(),
        text("feed_publisher_url").not_null(),
        text("feed_lang").not_null(),
        date("feed_start_date"),
        date("feed_end_date"),
        text("feed_version"),
        text("feed_contact_email"),
        text("feed_contact_url"),
    ],
};

/// `fare_media.txt` (fares v2)
pub static FARE_MEDIA: Table = Table {
    name: "gtfs_fare_media",
    file_name: "fare_media.txt",
    required: false,
    columns: &[
        text("fare_media_id").key(),
        text("fare_media_name"),
        integer("fare_media_type").not_null(),
    ],
};

/// `rider_categories.txt` (fares v2)
pub static RIDER_CATEGORIES: Table = Table {
    name: "gtfs_rider_categories",
    file_name: "rider_categories.txt",
    required: false,
    columns: &[
        text("rider_category_id").key(),
        text("rider_category_name"),
        integer("is_default_fare_category").default("0"),
        integer("min_age"),
        integer("max_age"),
        text("eligibility_url"),
    ],
};

/// `fare_products.txt` (fares v2), with the amounts as decimals
pub static FARE_PRODUCTS: Table = Table {
    name: "gtfs_fare_products",
    file_name: "fare_products.txt",
    required: false,
    columns: &[
        text("fare_product_id").key(),
        text("fare_product_name"),
        text("rider_category_id").references("gtfs_rider_categories", "rider_category_id"),
        text("fare_media_id").references("gtfs_fare_media", "fare_media_id"),
        decimal("amount").not_null(),
        text("currency").not_null(),
    ],
};

/// `timeframes.txt` (fares v2)
pub static TIMEFRAMES: Table = Table {
    name: "gtfs_timeframes",
    file_name: "timeframes.txt",
    required: false,
    columns: &[
        text("timeframe_group_id").key(),
        time("start_time").key(),
        time("end_time").key(),
        // not a foreign key: calendar is cleared before timeframes
        text("service_id").not_null(),
    ],
};

// timeframe_group_id is not unique in gtfs_timeframes, so the timeframe
// columns are plain text
/// `fare_leg_rules.txt` (fares v2)
pub static FARE_LEG_RULES: Table = Table {
    name: "gtfs_fare_leg_rules",
    file_name: "fare_leg_rules.txt",
    required: false,
    columns: &[
        text("leg_group_id").key(),
        text("network_id"),
        text("fare_product_id")
            .key()
            .references("gtfs_fare_products", "fare_product_id"),
        text("from_timeframe_group_id").key(),
        text("to_timeframe_group_id"),
    ],
};

/// `fare_transfer_rules.txt` (fares v2)
pub static FARE_TRANSFER_RULES: Table = Table {
    name: "gtfs_fare_transfer_rules",
    file_name: "fare_transfer_rules.txt",
    required: false,
    columns: &[
        text("from_leg_group_id").key(),
        text("to_leg_group_id").key(),
        text("fare_product_id").references("gtfs_fare_products", "fare_product_id"),
        integer("transfer_count"),
        integer("duration_limit"),
        integer("duration_limit_type"),
        integer("fare_transfer_type"),
    ],
};

/// All the tables, in the order the files are listed by the GTFS reference
pub static TABLES: [&Table; 15] = [
    &AGENCY,
    &STOPS,
    &ROUTES,
    &CALENDAR,
    &CALENDAR_DATES,
    &TRIPS,
    &STOP_TIMES,
    &SHAPES,
    &FEED_INFO,
    &FARE_MEDIA,
    &RIDER_CATEGORIES,
    &FARE_PRODUCTS,
    &TIMEFRAMES,
    &FARE_LEG_RULES,
    &FARE_TRANSFER_RULES,
];

/// Referenced tables come before the tables referencing them
pub static LOAD_ORDER: [&Table; 15] = [
    &FEED_INFO,
    &AGENCY,
    &STOPS,
    &SHAPES,
    &ROUTES,
    &CALENDAR,
    &CALENDAR_DATES,
    &TRIPS,
    &STOP_TIMES,
    &FARE_MEDIA,
    &RIDER_CATEGORIES,
    &FARE_PRODUCTS,
    &TIMEFRAMES,
    &FARE_LEG_RULES,
    &FARE_TRANSFER_RULES,
];

/// Referencing tables come before the tables they reference
pub static CLEAR_ORDER: [&Table; 15] = [
    &FARE_TRANSFER_RULES,
    &FARE_LEG_RULES,
    &STOP_TIMES,
    &TRIPS,
    &CALENDAR_DATES,
    &CALENDAR,
    &ROUTES,
    &STOPS,
    &SHAPES,
    &FARE_PRODUCTS,
    &TIMEFRAMES,
    &RIDER_CATEGORIES,
    &FARE_MEDIA,
    &AGENCY,
    &FEED_INFO,
];

/// Files that must be present in every feed
pub fn required_files() -> impl Iterator<Item = &'static str> {
    TABLES.iter().filter(|t| t.required).map(|t| t.file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[&Table], name: &str) -> usize {
        order
            .iter()
            .position(|t| t.name == name)
            .unwrap_or_else(|| panic!("{} is not in the order", name))
    }

    #[test]
    fn orders_cover_every_table_once() {
        for order in &[&LOAD_ORDER, &CLEAR_ORDER] {
            let names: Vec<_> = order.iter().map(|t| t.name).unique().collect();
            assert_eq!(TABLES.len(), names.len());
            for table in TABLES.iter() {
                assert!(names.contains(&table.name));
            }
        }
    }

    #[test]
    fn orders_respect_foreign_keys() {
        for table in TABLES.iter() {
            for parent in table.dependencies() {
                assert!(
                    position(&LOAD_ORDER, parent) < position(&LOAD_ORDER, table.name),
                    "{} must be loaded before {}",
                    parent,
                    table.name
                );
                assert!(
                    position(&CLEAR_ORDER, table.name) < position(&CLEAR_ORDER, parent),
                    "{} must be cleared before {}",
                    table.name,
                    parent
                );
            }
        }
    }

    #[test]
    fn required_files() {
        let required: Vec<_> = super::required_files().collect();
        assert_eq!(
            vec![
                "agency.txt",
                "stops.txt",
                "routes.txt",
                "calendar.txt",
                "trips.txt",
                "stop_times.txt"
            ],
            required
        );
    }

    #[test]
    fn primary_keys() {
        let keys = |t: &Table| t.primary_key().map(|c| c.name).collect::<Vec<_>>();
        assert_eq!(vec!["trip_id", "stop_sequence"], keys(&STOP_TIMES));
        assert_eq!(
            vec![
                "shape_id",
                "shape_pt_lat",
                "shape_pt_lon",
                "shape_pt_sequence"
            ],
            keys(&SHAPES)
        );
        assert_eq!(vec!["stop_id"], keys(&STOPS));
        for table in TABLES.iter() {
            assert!(table.primary_key().next().is_some(), "{} has no key", table);
        }
    }

    #[test]
    fn create_sql() {
        let sql = CALENDAR_DATES.create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"gtfs_calendar_dates\""));
        assert!(sql.contains("\"date\" DATE NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (\"service_id\", \"date\")"));
        assert!(sql.contains(
            "FOREIGN KEY (\"service_id\") REFERENCES \"gtfs_calendar\" (\"service_id\")"
        ));
        assert!(ROUTES
            .create_sql()
            .contains("\"route_color\" TEXT DEFAULT 'FFFFFF'"));
    }

    #[test]
    fn column_lookup() {
        assert_eq!(
            Some(ColumnType::Decimal),
            FARE_PRODUCTS.column("amount").map(|c| c.column_type)
        );
        assert_eq!(None, STOPS.column("platform_code"));
    }
}
