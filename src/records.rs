//! Reading of the csv GTFS files

use crate::coerce::{coerce, Value};
use crate::schema::{Column, Table};
use crate::Error;
use log::info;
use std::io::{BufRead, BufReader, Read};

const BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// The content of a GTFS file, with the values converted for its table
#[derive(Debug, Default)]
pub struct ParsedFile {
    /// Cleaned header names; columns unknown to the table are kept
    pub headers: Vec<String>,
    /// One value per header for each row
    pub records: Vec<Vec<Value>>,
}

/// Rows restricted to the columns of a table
#[derive(Debug)]
pub struct Batch {
    /// Destination of the rows
    pub table: &'static Table,
    /// Columns present in the file, each listed once
    pub columns: Vec<&'static Column>,
    /// One value per column for each row
    pub rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// The file had no records
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn clean_header(header: &str) -> String {
    header.replace('\u{feff}', "").trim().to_owned()
}

/// Reads a csv GTFS file and converts each value according to the column of `table`
///
/// A leading byte order mark is skipped. Values that cannot be converted are
/// null, only an unreadable file is an error.
pub fn read_records<T: Read>(
    reader: T,
    file_name: &str,
    table: &Table,
) -> Result<ParsedFile, Error> {
    let mut reader = BufReader::new(reader);
    let starts_with_bom = reader
        .fill_buf()
        .map_err(|e| Error::NamedFileIO {
            file_name: file_name.to_owned(),
            source: Box::new(e),
        })?
        .starts_with(BOM);
    if starts_with_bom {
        reader.consume(BOM.len());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let raw_headers = reader
        .headers()
        .map_err(|e| Error::CSVError {
            file_name: file_name.to_owned(),
            source: e,
        })?
        .clone();

    // index in the csv record of each kept header
    let kept: Vec<(usize, String)> = raw_headers
        .iter()
        .map(clean_header)
        .enumerate()
        .filter(|(_, h)| !h.is_empty())
        .collect();
    let column_types: Vec<_> = kept
        .iter()
        .map(|(_, h)| table.column(h).map(|c| c.column_type))
        .collect();

    let mut parsed = ParsedFile {
        headers: kept.iter().map(|(_, h)| h.clone()).collect(),
        records: Vec::new(),
    };
    if kept.is_empty() {
        return Ok(parsed);
    }

    for rec in reader.records() {
        let r = rec.map_err(|e| Error::CSVError {
            file_name: file_name.to_owned(),
            source: e,
        })?;
        let values = kept
            .iter()
            .zip(&column_types)
            .map(|((i, _), column_type)| coerce(r.get(*i).unwrap_or(""), *column_type))
            .collect();
        parsed.records.push(values);
    }

    info!("Read {} records from {}", parsed.records.len(), file_name);
    Ok(parsed)
}

impl ParsedFile {
    /// Keeps only the values of the columns that exist in `table`
    ///
    /// When a header is repeated, its last occurrence wins.
    pub fn into_batch(self, table: &'static Table) -> Batch {
        let mut projection: Vec<(usize, &'static Column)> = Vec::new();
        for (i, header) in self.headers.iter().enumerate() {
            if let Some(column) = table.column(header) {
                match projection.iter_mut().find(|(_, c)| c.name == column.name) {
                    Some(existing) => existing.0 = i,
                    None => projection.push((i, column)),
                }
            }
        }

        let rows = if projection.is_empty() {
            Vec::new()
        } else {
            self.records
                .into_iter()
                .map(|mut record| {
                    projection
                        .iter()
                        .map(|(i, _)| std::mem::take(&mut record[*i]))
                        .collect()
                })
                .collect()
        };

        Batch {
            table,
            columns: projection.into_iter().map(|(_, c)| c).collect(),
            rows,
        }
    }
}
