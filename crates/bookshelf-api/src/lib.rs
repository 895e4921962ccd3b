use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bookshelf_core::RecordStore;
pub use bookshelf_core::{Book, BookDraft, BookId, StoreError, StoreErrorKind};
use bookshelf_store_csv::CsvFileStore;
use tracing::{debug, info};

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Book operations over a [`RecordStore`]. Each call loads the whole dataset,
/// applies one operation, and saves it back while holding a lock shared by
/// every clone of this value.
#[derive(Debug)]
pub struct BookshelfApi<S> {
    store: Arc<S>,
    lock: Arc<Mutex<()>>,
}

impl<S> Clone for BookshelfApi<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), lock: Arc::clone(&self.lock) }
    }
}

impl BookshelfApi<CsvFileStore> {
    /// Operations backed by the CSV file at `path`.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(CsvFileStore::new(path))
    }
}

impl<S: RecordStore> BookshelfApi<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store: Arc::new(store), lock: Arc::new(Mutex::new(())) }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    // The guarded value is `()`, so a panic in another holder leaves nothing to repair.
    fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// List every book in stored order.
    ///
    /// # Errors
    /// Returns an error when the dataset cannot be read or is malformed.
    pub fn list(&self) -> Result<Vec<Book>, StoreError> {
        let _guard = self.exclusive();
        let books = self.store.load()?;
        debug!(count = books.len(), "listed books");
        Ok(books)
    }

    /// Look up one book. `Ok(None)` means no book has this Id.
    ///
    /// # Errors
    /// Returns an error when the dataset cannot be read or is malformed.
    pub fn get(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        let _guard = self.exclusive();
        let books = self.store.load()?;
        Ok(bookshelf_core::find_by_id(&books, id).cloned())
    }

    /// Add a book under the next free Id and return it.
    ///
    /// # Errors
    /// Returns an error when the dataset cannot be loaded or saved, or when
    /// the highest stored Id is already `u64::MAX`.
    pub fn create(&self, draft: BookDraft) -> Result<Book, StoreError> {
        let _guard = self.exclusive();
        let mut books = self.store.load()?;
        let book = bookshelf_core::append(&mut books, draft)?;
        self.store.save(&books)?;
        info!(id = %book.id, name = %book.name, "created book");
        Ok(book)
    }

    /// Overwrite every book with this Id. Returns how many were replaced;
    /// zero is a no-op, not an error.
    ///
    /// # Errors
    /// Returns an error when the dataset cannot be loaded or saved.
    pub fn update(&self, id: BookId, draft: BookDraft) -> Result<usize, StoreError> {
        let _guard = self.exclusive();
        let mut books = self.store.load()?;
        let replaced = bookshelf_core::replace(&mut books, id, &draft);
        self.store.save(&books)?;
        info!(%id, replaced, "updated book");
        Ok(replaced)
    }

    /// Remove the first book with this Id and return it, if there was one.
    ///
    /// # Errors
    /// Returns an error when the dataset cannot be loaded or saved.
    pub fn delete(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        let _guard = self.exclusive();
        let mut books = self.store.load()?;
        let removed = bookshelf_core::delete(&mut books, id);
        self.store.save(&books)?;
        info!(%id, removed = removed.is_some(), "deleted book");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use bookshelf_core::InMemoryStore;

    use super::*;

    fn unique_temp_data_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("bookshelf-api-{}", ulid::Ulid::new()))
            .join("books.csv")
    }

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(ToString::to_string).collect()
    }

    fn seeded_api() -> BookshelfApi<InMemoryStore> {
        BookshelfApi::new(InMemoryStore::from_rows(vec![
            row(&["1", "Dune", "Frank Herbert", "1965"]),
            row(&["5", "The Hobbit", "J.R.R. Tolkien", "1937"]),
        ]))
    }

    // Test IDs: TAPI-001
    #[test]
    fn create_assigns_max_based_id_and_persists() -> Result<(), StoreError> {
        let api = seeded_api();
        let created = api.create(BookDraft::new("Emma", "Jane Austen", 1815))?;
        assert_eq!(created.id, BookId(6));
        assert_eq!(api.store().rows()[2], row(&["6", "Emma", "Jane Austen", "1815"]));
        Ok(())
    }

    // Test IDs: TAPI-002
    #[test]
    fn get_distinguishes_found_from_missing() -> Result<(), StoreError> {
        let api = seeded_api();
        assert_eq!(api.get(BookId(5))?.map(|book| book.name), Some("The Hobbit".to_string()));
        assert_eq!(api.get(BookId(2))?, None);
        Ok(())
    }

    // Test IDs: TAPI-003
    #[test]
    fn update_and_delete_report_misses_without_changing_data() -> Result<(), StoreError> {
        let api = seeded_api();
        let before = api.store().rows();
        assert_eq!(api.update(BookId(9), BookDraft::new("X", "Y", 2000))?, 0);
        assert_eq!(api.delete(BookId(9))?, None);
        assert_eq!(api.store().rows(), before);
        Ok(())
    }

    // Test IDs: TAPI-004
    #[test]
    fn update_then_delete_round_trip() -> Result<(), StoreError> {
        let api = seeded_api();
        assert_eq!(api.update(BookId(1), BookDraft::new("X", "Y", 2000))?, 1);
        assert_eq!(api.store().rows()[0], row(&["1", "X", "Y", "2000"]));

        let removed = api.delete(BookId(1))?;
        assert_eq!(removed.map(|book| book.name), Some("X".to_string()));
        assert_eq!(api.list()?.iter().map(|book| book.id).collect::<Vec<_>>(), vec![BookId(5)]);
        Ok(())
    }

    // Test IDs: TAPI-005
    #[test]
    fn malformed_data_fails_only_the_operation() {
        let api = BookshelfApi::new(InMemoryStore::from_rows(vec![
            row(&["1", "Dune", "Frank Herbert", "1965"]),
            row(&["two", "Emma", "Jane Austen", "1815"]),
        ]));
        let before = api.store().rows();

        for result in [
            api.list().map(|_| ()),
            api.create(BookDraft::new("A", "B", 1)).map(|_| ()),
            api.delete(BookId(1)).map(|_| ()),
        ] {
            assert_eq!(result.err().map(|err| err.kind()), Some(StoreErrorKind::Parse));
        }
        assert_eq!(api.store().rows(), before);
    }

    // Test IDs: TAPI-006
    #[test]
    fn write_failure_surfaces_as_write_error() {
        let api = seeded_api();
        api.store().reject_writes(true);
        let err = api.create(BookDraft::new("Emma", "Jane Austen", 1815)).err();
        assert_eq!(err.map(|err| err.kind()), Some(StoreErrorKind::Write));
        assert_eq!(api.store().rows().len(), 2);
    }

    // Test IDs: TAPI-009
    #[test]
    fn create_fails_when_max_id_is_taken() {
        let max = u64::MAX.to_string();
        let api =
            BookshelfApi::new(InMemoryStore::from_rows(vec![row(&[max.as_str(), "A", "B", "1"])]));
        let err = api.create(BookDraft::new("C", "D", 2)).err();
        assert_eq!(err.map(|err| err.kind()), Some(StoreErrorKind::IdSpaceExhausted));
        assert_eq!(api.store().rows(), vec![row(&[max.as_str(), "A", "B", "1"])]);
    }

    // Test IDs: TAPI-007
    #[test]
    fn concurrent_creates_never_reuse_an_id() -> Result<(), StoreError> {
        let api = BookshelfApi::new(InMemoryStore::new());
        let workers = (0..8)
            .map(|worker| {
                let api = api.clone();
                thread::spawn(move || {
                    (0..10)
                        .map(|index| {
                            api.create(BookDraft::new(format!("w{worker}-{index}"), "tester", 2000))
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect::<Vec<_>>();

        for worker in workers {
            match worker.join() {
                Ok(result) => {
                    result?;
                }
                Err(_) => panic!("worker thread panicked"),
            }
        }

        let mut ids = api.list()?.into_iter().map(|book| book.id.0).collect::<Vec<_>>();
        ids.sort_unstable();
        assert_eq!(ids, (1..=80).collect::<Vec<_>>());
        Ok(())
    }

    // Test IDs: TAPI-008
    #[test]
    fn csv_backed_api_starts_empty_and_persists() -> Result<(), StoreError> {
        let path = unique_temp_data_path();
        let api = BookshelfApi::open(path.clone());
        assert!(api.list()?.is_empty());

        let created = api.create(BookDraft::new("Dune", "Herbert", 1965))?;
        assert_eq!(created.id, BookId(1));

        let reopened = BookshelfApi::open(path.clone());
        assert_eq!(reopened.get(BookId(1))?, Some(created));

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
        Ok(())
    }
}
