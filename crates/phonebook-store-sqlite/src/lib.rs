#![allow(clippy::missing_errors_doc)]

mod connection;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use phonebook_core::{
    validate_number, Contact, ContactId, ContactRepository, NewContact, PhonebookError,
};
use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};
use ulid::Ulid;

pub use connection::{ConnectionString, StoreLocation};

const CONTACTS_MIGRATION_VERSION: i64 = 1;

const SCHEMA_CONTACTS_V1: &str = r"
CREATE TABLE IF NOT EXISTS contacts (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL CHECK (length(name) >= 3),
  number TEXT NOT NULL CHECK (length(number) >= 8)
);

CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(name);
";

/// Contact store backed by a single SQLite connection.
///
/// The connection is opened once and shared; every repository call takes the
/// lock for its whole duration. Call [`SqliteContactStore::close`] on shutdown.
pub struct SqliteContactStore {
    conn: Mutex<Connection>,
}

impl SqliteContactStore {
    pub fn open(connection: &ConnectionString) -> Result<Self> {
        let conn = match &connection.location {
            StoreLocation::Memory => {
                Connection::open_in_memory().context("failed to open in-memory sqlite database")?
            }
            StoreLocation::File(path) => Connection::open(path).with_context(|| {
                format!("failed to open sqlite database at {}", path.display())
            })?,
        };

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        info!(
            store = %connection,
            app_name = connection.app_name.as_deref().unwrap_or("-"),
            "opened contact store"
        );
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&ConnectionString::parse(":memory:")?)
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )
        .context("failed to ensure schema_migrations exists")?;

        conn.execute_batch(SCHEMA_CONTACTS_V1).context("failed to apply contacts schema")?;

        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| anyhow!(err.to_string()))?;
        let applied = conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![CONTACTS_MIGRATION_VERSION, now],
            )
            .context("failed to register contacts schema migration")?;
        if applied > 0 {
            info!(version = CONTACTS_MIGRATION_VERSION, "applied contacts schema migration");
        }

        Ok(())
    }

    /// Closes the underlying connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<()> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, err)| err)
            .context("failed to close sqlite database")?;
        debug!("closed contact store");
        Ok(())
    }
}

impl ContactRepository for SqliteContactStore {
    fn list(&self) -> Result<Vec<Contact>, PhonebookError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, name, number FROM contacts ORDER BY rowid ASC")
            .map_err(storage_error)?;
        let rows = stmt.query_map([], parse_contact_row).map_err(storage_error)?;
        collect_rows(rows)
    }

    fn get(&self, id: ContactId) -> Result<Option<Contact>, PhonebookError> {
        let conn = self.conn.lock();
        find_contact(&conn, id)
    }

    fn create(&self, input: &NewContact) -> Result<Contact, PhonebookError> {
        let input = NewContact::new(&input.name, &input.number);
        input.validate()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_error)?;

        let taken = tx
            .query_row("SELECT 1 FROM contacts WHERE name = ?1 LIMIT 1", params![input.name], |_| {
                Ok(())
            })
            .optional()
            .map_err(storage_error)?
            .is_some();
        if taken {
            return Err(PhonebookError::DuplicateName(input.name));
        }

        let contact = Contact { id: ContactId::generate(), name: input.name, number: input.number };
        tx.execute(
            "INSERT INTO contacts(id, name, number) VALUES (?1, ?2, ?3)",
            params![contact.id.to_string(), contact.name, contact.number],
        )
        .map_err(storage_error)?;
        tx.commit().map_err(storage_error)?;

        debug!(id = %contact.id, name = %contact.name, "created contact");
        Ok(contact)
    }

    fn update_number(
        &self,
        id: ContactId,
        number: &str,
    ) -> Result<Option<Contact>, PhonebookError> {
        let number = number.trim();
        validate_number(number)?;

        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE contacts SET number = ?2 WHERE id = ?1",
                params![id.to_string(), number],
            )
            .map_err(storage_error)?;
        if changed == 0 {
            return Ok(None);
        }

        debug!(%id, "updated contact number");
        find_contact(&conn, id)
    }

    fn delete(&self, id: ContactId) -> Result<bool, PhonebookError> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM contacts WHERE id = ?1", params![id.to_string()])
            .map_err(storage_error)?;
        Ok(removed > 0)
    }

    fn count(&self) -> Result<usize, PhonebookError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .map_err(storage_error)?;
        usize::try_from(count).map_err(|err| PhonebookError::Storage(err.to_string()))
    }
}

fn find_contact(conn: &Connection, id: ContactId) -> Result<Option<Contact>, PhonebookError> {
    conn.query_row(
        "SELECT id, name, number FROM contacts WHERE id = ?1",
        params![id.to_string()],
        parse_contact_row,
    )
    .optional()
    .map_err(storage_error)
}

fn parse_contact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let raw_id: String = row.get(0)?;
    Ok(Contact { id: parse_contact_id(&raw_id)?, name: row.get(1)?, number: row.get(2)? })
}

fn parse_contact_id(raw: &str) -> rusqlite::Result<ContactId> {
    let parsed = Ulid::from_string(raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid ULID: {raw}"),
            )),
        )
    })?;

    Ok(ContactId(parsed))
}

#[allow(clippy::needless_pass_by_value)]
fn storage_error(err: rusqlite::Error) -> PhonebookError {
    PhonebookError::Storage(err.to_string())
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>, PhonebookError> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row.map_err(storage_error)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(inner) => inner,
            None => panic!("expected Some(..), got None"),
        }
    }

    fn fixture_store() -> SqliteContactStore {
        let store = must(SqliteContactStore::open_in_memory());
        must(store.migrate());
        store
    }

    fn ada() -> NewContact {
        NewContact::new("Ada Lovelace", "39-44-5323523")
    }

    #[test]
    fn migrate_is_idempotent() {
        let store = fixture_store();
        must(store.migrate());
        let versions: i64 = must(store.conn.lock().query_row(
            "SELECT COUNT(*) FROM schema_migrations",
            [],
            |row| row.get(0),
        ));
        assert_eq!(versions, 1);
    }

    #[test]
    fn create_then_get_round_trips_through_sqlite() {
        let store = fixture_store();
        let created = must(store.create(&ada()));
        let fetched = must_some(must(store.get(created.id)));
        assert_eq!(fetched, created);
        assert_eq!(must(store.count()), 1);
    }

    #[test]
    fn list_preserves_insertion_order() {
        let store = fixture_store();
        for (name, number) in [
            ("Arto Hellas", "040-123456"),
            ("Dan Abramov", "12-43-234345"),
            ("Mary Poppendieck", "39-23-6423122"),
        ] {
            must(store.create(&NewContact::new(name, number)));
        }
        let names: Vec<String> =
            must(store.list()).into_iter().map(|contact| contact.name).collect();
        assert_eq!(names, ["Arto Hellas", "Dan Abramov", "Mary Poppendieck"]);
    }

    #[test]
    fn duplicate_name_is_rejected_and_original_untouched() {
        let store = fixture_store();
        let original = must(store.create(&ada()));
        match store.create(&NewContact::new("Ada Lovelace", "040-999999")) {
            Err(PhonebookError::DuplicateName(name)) => assert_eq!(name, "Ada Lovelace"),
            other => panic!("expected duplicate name, got {other:?}"),
        }
        assert_eq!(must(store.list()), vec![original]);
    }

    #[test]
    fn create_validates_before_touching_storage() {
        let store = fixture_store();
        assert!(matches!(
            store.create(&NewContact::new("Al", "040-123456")),
            Err(PhonebookError::Validation(_))
        ));
        assert!(matches!(
            store.create(&NewContact::new("Alan Turing", "123456")),
            Err(PhonebookError::Validation(_))
        ));
        assert_eq!(must(store.count()), 0);
    }

    #[test]
    fn update_number_changes_only_the_number() {
        let store = fixture_store();
        let created = must(store.create(&ada()));
        let updated = must_some(must(store.update_number(created.id, "39-44-9999999")));
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Ada Lovelace");
        assert_eq!(updated.number, "39-44-9999999");

        assert!(matches!(
            store.update_number(created.id, "nope"),
            Err(PhonebookError::Validation(_))
        ));
        assert!(must(store.update_number(ContactId::generate(), "39-44-9999999")).is_none());
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let store = fixture_store();
        let created = must(store.create(&ada()));
        assert!(must(store.delete(created.id)));
        assert!(!must(store.delete(created.id)));
        assert!(must(store.get(created.id)).is_none());
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!("phonebook-store-{}.sqlite3", Ulid::new()));
        let connection = must(ConnectionString::parse(&path.to_string_lossy()));
        assert_eq!(connection.location, StoreLocation::File(path.clone()));

        let store = must(SqliteContactStore::open(&connection));
        must(store.migrate());
        let created = must(store.create(&ada()));
        must(store.close());

        let reopened = must(SqliteContactStore::open(&connection));
        must(reopened.migrate());
        assert_eq!(must(reopened.get(created.id)), Some(created));
        must(reopened.close());

        let _ = std::fs::remove_file(&path);
    }
}
