use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use bookshelf_core::{parse_row, Book, ParseError, RecordStore, StoreError};
use tempfile::NamedTempFile;
use tracing::debug;

/// Book records kept in one headerless CSV file: `Id,Name,Author,Year`.
#[derive(Debug, Clone)]
pub struct CsvFileStore {
    path: PathBuf,
}

impl CsvFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, err: &impl Display) -> StoreError {
        StoreError::Read(format!("{}: {err}", self.path.display()))
    }

    fn write_error(&self, err: &impl Display) -> StoreError {
        StoreError::Write(format!("{}: {err}", self.path.display()))
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl RecordStore for CsvFileStore {
    /// A file that does not exist yet loads as an empty store.
    fn load(&self) -> Result<Vec<Book>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "data file missing, loading empty store");
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.read_error(&err)),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let mut books = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|err| match err.kind() {
                csv::ErrorKind::Utf8 { err: utf8, .. } => StoreError::Parse(
                    ParseError::InvalidUtf8 { row: index + 1, column: utf8.field() + 1 },
                ),
                _ => self.read_error(&err),
            })?;
            let fields = record.iter().collect::<Vec<_>>();
            books.push(parse_row(index + 1, &fields)?);
        }

        debug!(path = %self.path.display(), records = books.len(), "loaded data file");
        Ok(books)
    }

    /// Written to a temporary sibling file, synced, then renamed over the
    /// target. An existing file keeps its permissions.
    fn save(&self, books: &[Book]) -> Result<(), StoreError> {
        let dir = self.parent_dir();
        fs::create_dir_all(dir).map_err(|err| self.write_error(&err))?;

        let mut temp = NamedTempFile::new_in(dir).map_err(|err| self.write_error(&err))?;
        {
            let mut writer = csv::Writer::from_writer(&mut temp);
            for book in books {
                writer.write_record(book.to_row()).map_err(|err| self.write_error(&err))?;
            }
            writer.flush().map_err(|err| self.write_error(&err))?;
        }
        match fs::metadata(&self.path) {
            Ok(existing) => temp
                .as_file()
                .set_permissions(existing.permissions())
                .map_err(|err| self.write_error(&err))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(self.write_error(&err)),
        }
        temp.as_file().sync_all().map_err(|err| self.write_error(&err))?;
        temp.persist(&self.path).map_err(|err| self.write_error(&err.error))?;

        debug!(path = %self.path.display(), records = books.len(), "saved data file");
        Ok(())
    }
}
