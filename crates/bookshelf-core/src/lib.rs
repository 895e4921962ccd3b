use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Number of columns in one persisted book row.
pub const FIELDS_PER_ROW: usize = 4;

/// Malformed persisted data. Any one of these aborts the whole load.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ParseError {
    #[error("row {row}: expected {expected} fields, found {found}")]
    FieldCount { row: usize, expected: usize, found: usize },
    #[error("row {row}: cannot convert {field} to an integer: {value:?}")]
    NotAnInteger { row: usize, field: BookField, value: String },
    #[error("row {row}: field {column} is not valid UTF-8")]
    InvalidUtf8 { row: usize, column: usize },
}

impl ParseError {
    /// 1-based row number the error was found on.
    #[must_use]
    pub fn row(&self) -> usize {
        match self {
            Self::FieldCount { row, .. }
            | Self::NotAnInteger { row, .. }
            | Self::InvalidUtf8 { row, .. } => *row,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    Parse,
    Read,
    Write,
    IdSpaceExhausted,
}

impl StoreErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Read => "read",
            Self::Write => "write",
            Self::IdSpaceExhausted => "id_space_exhausted",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("read error: {0}")]
    Read(String),
    #[error("write error: {0}")]
    Write(String),
    #[error("no Id left above {max}")]
    IdSpaceExhausted { max: BookId },
}

impl StoreError {
    #[must_use]
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            Self::Parse(_) => StoreErrorKind::Parse,
            Self::Read(_) => StoreErrorKind::Read,
            Self::Write(_) => StoreErrorKind::Write,
            Self::IdSpaceExhausted { .. } => StoreErrorKind::IdSpaceExhausted,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BookId(pub u64);

impl Display for BookId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookId {
    type Err = ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.parse::<u64>().map(Self)
    }
}

/// Columns of a persisted row, in file order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum BookField {
    Id,
    Name,
    Author,
    Year,
}

impl BookField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Name => "Name",
            Self::Author => "Author",
            Self::Year => "Year",
        }
    }

    /// Zero-based column index.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Id => 0,
            Self::Name => 1,
            Self::Author => 2,
            Self::Year => 3,
        }
    }
}

impl Display for BookField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct Book {
    pub id: BookId,
    pub name: String,
    pub author: String,
    pub year: i64,
}

impl Book {
    #[must_use]
    pub fn new(id: BookId, draft: BookDraft) -> Self {
        Self { id, name: draft.name, author: draft.author, year: draft.year }
    }

    /// Render the persisted row: `Id, Name, Author, Year`, integers in base 10.
    #[must_use]
    pub fn to_row(&self) -> [String; FIELDS_PER_ROW] {
        [self.id.to_string(), self.name.clone(), self.author.clone(), self.year.to_string()]
    }
}

/// Caller-supplied fields of a create or update.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct BookDraft {
    pub name: String,
    pub author: String,
    pub year: i64,
}

impl BookDraft {
    #[must_use]
    pub fn new(name: impl Into<String>, author: impl Into<String>, year: i64) -> Self {
        Self { name: name.into(), author: author.into(), year }
    }
}

/// Whole-dataset persistence. Every operation loads the full sequence and,
/// when it mutates, saves the full sequence back.
pub trait RecordStore: Send + Sync {
    /// Load every record in stored order.
    ///
    /// # Errors
    /// Returns [`StoreError::Parse`] for malformed rows and [`StoreError::Read`]
    /// when the backing source cannot be read.
    fn load(&self) -> Result<Vec<Book>, StoreError>;

    /// Replace the stored dataset with `books`.
    ///
    /// # Errors
    /// Returns [`StoreError::Write`] when the dataset cannot be persisted.
    fn save(&self, books: &[Book]) -> Result<(), StoreError>;
}

/// Decode one row. `row` is the 1-based row number used in errors.
///
/// # Errors
/// Returns [`ParseError`] when the row does not have exactly four fields or
/// when Year or Id is not an integer.
pub fn parse_row<S: AsRef<str>>(row: usize, fields: &[S]) -> Result<Book, ParseError> {
    if fields.len() != FIELDS_PER_ROW {
        return Err(ParseError::FieldCount {
            row,
            expected: FIELDS_PER_ROW,
            found: fields.len(),
        });
    }

    let field = move |column: BookField| fields[column.index()].as_ref();
    let not_an_integer = |column: BookField| ParseError::NotAnInteger {
        row,
        field: column,
        value: field(column).to_string(),
    };

    let year = field(BookField::Year)
        .parse::<i64>()
        .map_err(|_| not_an_integer(BookField::Year))?;
    let id = field(BookField::Id)
        .parse::<BookId>()
        .map_err(|_| not_an_integer(BookField::Id))?;

    Ok(Book {
        id,
        name: field(BookField::Name).to_string(),
        author: field(BookField::Author).to_string(),
        year,
    })
}

/// Decode rows in order. The first malformed row fails the whole sequence.
///
/// # Errors
/// Returns the [`ParseError`] of the first malformed row.
pub fn parse_rows<I, R>(rows: I) -> Result<Vec<Book>, ParseError>
where
    I: IntoIterator<Item = R>,
    R: AsRef<[String]>,
{
    rows.into_iter().enumerate().map(|(index, row)| parse_row(index + 1, row.as_ref())).collect()
}

#[must_use]
pub fn find_by_id(books: &[Book], id: BookId) -> Option<&Book> {
    books.iter().find(|book| book.id == id)
}

/// Highest existing Id plus one, or 1 for an empty store.
///
/// # Errors
/// Returns [`StoreError::IdSpaceExhausted`] when a record already holds
/// `u64::MAX`.
pub fn next_id(books: &[Book]) -> Result<BookId, StoreError> {
    match books.iter().map(|book| book.id).max() {
        None => Ok(BookId(1)),
        Some(max) => {
            max.0.checked_add(1).map(BookId).ok_or(StoreError::IdSpaceExhausted { max })
        }
    }
}

/// Append a new record with the next Id and return it.
///
/// # Errors
/// Returns [`StoreError::IdSpaceExhausted`] when no larger Id exists; `books`
/// is left untouched.
pub fn append(books: &mut Vec<Book>, draft: BookDraft) -> Result<Book, StoreError> {
    let book = Book::new(next_id(books)?, draft);
    books.push(book.clone());
    Ok(book)
}

/// Overwrite every record whose Id matches, keeping the Id. Returns how many
/// records were replaced; zero leaves the store untouched.
pub fn replace(books: &mut [Book], id: BookId, draft: &BookDraft) -> usize {
    let mut replaced = 0;
    for book in books.iter_mut().filter(|book| book.id == id) {
        *book = Book::new(id, draft.clone());
        replaced += 1;
    }
    replaced
}

/// Remove the first record whose Id matches, keeping the order of the rest.
pub fn delete(books: &mut Vec<Book>, id: BookId) -> Option<Book> {
    let index = books.iter().position(|book| book.id == id)?;
    Some(books.remove(index))
}

/// Row-backed [`RecordStore`] kept in memory. Rows go through the same
/// [`parse_rows`] as the file store, so malformed rows can be seeded.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<Vec<String>>>,
    reject_writes: AtomicBool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows: Mutex::new(rows), reject_writes: AtomicBool::new(false) }
    }

    #[must_use]
    pub fn with_books(books: &[Book]) -> Self {
        Self::from_rows(books.iter().map(|book| book.to_row().to_vec()).collect())
    }

    /// Make subsequent saves fail with [`StoreError::Write`].
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Snapshot of the stored rows.
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<String>> {
        match self.rows.lock() {
            Ok(rows) => rows.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RecordStore for InMemoryStore {
    fn load(&self) -> Result<Vec<Book>, StoreError> {
        let rows = self.rows.lock().map_err(|_| StoreError::Read("lock poisoned".to_string()))?;
        Ok(parse_rows(rows.iter())?)
    }

    fn save(&self, books: &[Book]) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("in-memory store is read-only".to_string()));
        }
        let mut rows =
            self.rows.lock().map_err(|_| StoreError::Write("lock poisoned".to_string()))?;
        *rows = books.iter().map(|book| book.to_row().to_vec()).collect();
        Ok(())
    }
}
