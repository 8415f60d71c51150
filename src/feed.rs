//! Access to the files of a GTFS feed

use crate::schema;
use crate::Error;
use sha2::digest::Digest;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

/// Anything a zip archive can be read from
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Where the GTFS files are read from
///
/// Either a directory holding the `.txt` files, or a zip archive. In an
/// archive the files can be in a sub-directory.
pub enum FeedSource {
    /// Directory of `.txt` files
    Directory(PathBuf),
    /// Zip archive, read from a file, a download or any reader
    Archive {
        /// The opened archive
        archive: zip::ZipArchive<Box<dyn ReadSeek>>,
        /// GTFS file name to index in the archive
        file_mapping: HashMap<&'static str, usize>,
        /// sha256 sum of the archive
        sha256: String,
    },
}

impl FeedSource {
    /// Reads from an url (if starts with `"http"`), or a local path (either a directory or zipped file)
    ///
    /// To read from an url, build with read-url feature
    #[cfg(feature = "read-url")]
    pub fn new(gtfs: &str) -> Result<Self, Error> {
        if gtfs.starts_with("http") {
            Self::from_url(gtfs)
        } else {
            Self::open(gtfs)
        }
    }

    /// Reads from a local path, either a directory or zipped file
    #[cfg(not(feature = "read-url"))]
    pub fn new(gtfs: &str) -> Result<Self, Error> {
        Self::open(gtfs)
    }

    /// Opens a local zip archive or local directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let p = path.as_ref();
        if p.is_file() {
            let reader = File::open(p).map_err(|e| Error::NamedFileIO {
                file_name: format!("{}", p.display()),
                source: Box::new(e),
            })?;
            Self::from_reader(std::io::BufReader::new(reader))
        } else if p.is_dir() {
            Ok(FeedSource::Directory(p.to_path_buf()))
        } else {
            Err(Error::NotFileNorDirectory(format!("{}", p.display())))
        }
    }

    /// Downloads a zip archive
    ///
    /// The library must be built with the read-url feature
    #[cfg(feature = "read-url")]
    pub fn from_url<U: reqwest::IntoUrl>(url: U) -> Result<Self, Error> {
        let mut res = reqwest::blocking::get(url)?.error_for_status()?;
        let mut body = Vec::new();
        res.read_to_end(&mut body)?;
        Self::from_reader(std::io::Cursor::new(body))
    }

    /// Reads a zip archive from any object implementing [std::io::Read] and [std::io::Seek]
    pub fn from_reader<T: Read + Seek + 'static>(mut reader: T) -> Result<Self, Error> {
        let mut hasher = Sha256::new();
        std::io::copy(&mut reader, &mut hasher)?;
        let hash = hasher.finalize();
        reader.rewind()?;

        let boxed: Box<dyn ReadSeek> = Box::new(reader);
        let mut archive = zip::ZipArchive::new(boxed)?;
        let mut file_mapping = HashMap::new();
        for i in 0..archive.len() {
            let archive_file = archive.by_index(i)?;
            let path = Path::new(archive_file.name());
            for table in schema::TABLES.iter() {
                if path.file_name() == Some(std::ffi::OsStr::new(table.file_name)) {
                    file_mapping.insert(table.file_name, i);
                    break;
                }
            }
        }

        Ok(FeedSource::Archive {
            archive,
            file_mapping,
            sha256: format!("{:x}", hash),
        })
    }

    /// The feed holds `file_name`
    pub fn contains(&self, file_name: &str) -> bool {
        match self {
            FeedSource::Directory(p) => p.join(file_name).exists(),
            FeedSource::Archive { file_mapping, .. } => file_mapping.contains_key(file_name),
        }
    }

    /// Required files absent from the feed
    pub fn missing_required(&self) -> Vec<String> {
        schema::required_files()
            .filter(|f| !self.contains(f))
            .map(|f| f.to_owned())
            .collect()
    }

    /// Opens a file of the feed, `None` if it is not present
    pub fn read_file(&mut self, file_name: &str) -> Result<Option<Box<dyn Read + '_>>, Error> {
        let named_err = |e: Box<dyn std::error::Error + Send + Sync>| Error::NamedFileIO {
            file_name: file_name.to_owned(),
            source: e,
        };
        match self {
            FeedSource::Directory(p) => {
                let path = p.join(file_name);
                if !path.exists() {
                    return Ok(None);
                }
                let file = File::open(path).map_err(|e| named_err(Box::new(e)))?;
                Ok(Some(Box::new(file)))
            }
            FeedSource::Archive {
                archive,
                file_mapping,
                ..
            } => match file_mapping.get(file_name) {
                None => Ok(None),
                Some(i) => {
                    let file = archive.by_index(*i).map_err(|e| named_err(Box::new(e)))?;
                    Ok(Some(Box::new(file)))
                }
            },
        }
    }

    /// sha256 sum of the archive, `None` for a directory
    pub fn sha256(&self) -> Option<&str> {
        match self {
            FeedSource::Directory(_) => None,
            FeedSource::Archive { sha256, .. } => Some(sha256),
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeedSource::Directory(p) => write!(f, "{}", p.display()),
            FeedSource::Archive { sha256, .. } => write!(f, "zip archive {}", sha256),
        }
    }
}
