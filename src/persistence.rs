//! Durable band storage
//!
//! `BandRepository` is the seam the dispatcher talks to; `SqliteBandRepository`
//! implements it on top of a single SQLite connection. Every call maps to
//! one statement, and absent optional values are stored as NULL.

use crate::error::{BandHubError, Result};
use crate::model::{Album, Band, BandFields, Coordinates, MusicGenre};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

/// Durable CRUD over bands with owner attribution
pub trait BandRepository {
    /// Read every stored band, ordered by id
    fn fetch_all(&self) -> Result<Vec<Band>>;

    /// Store a new band and return its generated id
    fn insert(&self, fields: &BandFields, creation_date: DateTime<Utc>, owner: &str) -> Result<i64>;

    fn delete_by_id(&self, id: i64) -> Result<()>;

    /// Overwrite the mutable fields of band `id`
    fn update_by_id(&self, id: i64, fields: &BandFields) -> Result<()>;

    /// Delete all bands owned by `owner`, returning how many were removed
    fn delete_all_by_owner(&self, owner: &str) -> Result<usize>;

    /// False when the band does not exist or belongs to someone else
    fn is_owner(&self, id: i64, username: &str) -> Result<bool>;
}

/// Reject anything that is not a plain SQL identifier
pub(crate) fn check_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(BandHubError::Persistence(format!(
            "invalid table name '{}'",
            name
        )))
    }
}

/// Columns exactly as read from a row, before conversion into a `Band`
struct BandRow {
    id: i64,
    name: String,
    x: f64,
    y: f64,
    creation_date: DateTime<Utc>,
    number_of_participants: i64,
    albums_count: i64,
    description: Option<String>,
    genre: Option<String>,
    best_album_name: Option<String>,
    best_album_tracks: Option<i64>,
    best_album_length: Option<i64>,
    best_album_sales: Option<f64>,
    owner: String,
}

impl BandRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            x: row.get("x")?,
            y: row.get("y")?,
            creation_date: row.get("creation_date")?,
            number_of_participants: row.get("number_of_participants")?,
            albums_count: row.get("albums_count")?,
            description: row.get("description")?,
            genre: row.get("genre")?,
            best_album_name: row.get("best_album_name")?,
            best_album_tracks: row.get("best_album_tracks")?,
            best_album_length: row.get("best_album_length")?,
            best_album_sales: row.get("best_album_sales")?,
            owner: row.get("owner")?,
        })
    }

    fn into_band(self) -> Result<Band> {
        let genre = match self.genre {
            Some(genre) => Some(genre.parse::<MusicGenre>().map_err(|_| {
                BandHubError::Persistence(format!(
                    "band {} has unknown genre '{}' in the database",
                    self.id, genre
                ))
            })?),
            None => None,
        };

        let best_album = match self.best_album_name {
            Some(name) => {
                let tracks = self.best_album_tracks.ok_or_else(|| {
                    BandHubError::Persistence(format!(
                        "band {} has a best album without a track count",
                        self.id
                    ))
                })?;
                Some(Album {
                    name,
                    tracks,
                    length: self.best_album_length,
                    sales: self.best_album_sales,
                })
            }
            None => None,
        };

        Ok(Band {
            id: self.id,
            name: self.name,
            coordinates: Coordinates {
                x: self.x,
                y: self.y,
            },
            creation_date: self.creation_date,
            number_of_participants: self.number_of_participants,
            albums_count: self.albums_count,
            description: self.description,
            genre,
            best_album,
            owner_username: self.owner,
        })
    }
}

/// SQLite-backed band repository
pub struct SqliteBandRepository {
    conn: Connection,
    table: String,
}

impl SqliteBandRepository {
    /// Open (or create) the database file and make sure the table exists
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), table, "opened band database");
        Self::with_connection(conn, table)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        check_table_name(table)?;
        let repository = Self {
            conn,
            table: table.to_string(),
        };
        repository.create_table_if_not_exists()?;
        Ok(repository)
    }

    fn create_table_if_not_exists(&self) -> Result<()> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    x REAL NOT NULL,
                    y REAL NOT NULL,
                    creation_date TEXT NOT NULL,
                    number_of_participants INTEGER NOT NULL CHECK (number_of_participants > 0),
                    albums_count INTEGER NOT NULL CHECK (albums_count >= 0),
                    description TEXT,
                    genre TEXT,
                    best_album_name TEXT,
                    best_album_tracks INTEGER,
                    best_album_length INTEGER,
                    best_album_sales REAL,
                    owner TEXT NOT NULL
                )",
                self.table
            ),
            [],
        )?;
        Ok(())
    }
}

impl BandRepository for SqliteBandRepository {
    fn fetch_all(&self) -> Result<Vec<Band>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY id", self.table))?;
        let rows = stmt
            .query_map([], BandRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(BandRow::into_band).collect()
    }

    fn insert(&self, fields: &BandFields, creation_date: DateTime<Utc>, owner: &str) -> Result<i64> {
        let album = fields.best_album.as_ref();
        self.conn.execute(
            &format!(
                "INSERT INTO {} (name, x, y, creation_date, number_of_participants, albums_count,
                    description, genre, best_album_name, best_album_tracks, best_album_length,
                    best_album_sales, owner)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                self.table
            ),
            params![
                fields.name,
                fields.coordinates.x,
                fields.coordinates.y,
                creation_date,
                fields.number_of_participants,
                fields.albums_count,
                fields.description,
                fields.genre.map(|g| g.as_str()),
                album.map(|a| a.name.as_str()),
                album.map(|a| a.tracks),
                album.and_then(|a| a.length),
                album.and_then(|a| a.sales),
                owner,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, owner, "inserted band");
        Ok(id)
    }

    fn delete_by_id(&self, id: i64) -> Result<()> {
        let deleted = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table),
            params![id],
        )?;
        if deleted == 0 {
            return Err(BandHubError::NotFound(format!("band {} does not exist", id)));
        }
        Ok(())
    }

    fn update_by_id(&self, id: i64, fields: &BandFields) -> Result<()> {
        let album = fields.best_album.as_ref();
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET name = ?1, x = ?2, y = ?3, number_of_participants = ?4,
                    albums_count = ?5, description = ?6, genre = ?7, best_album_name = ?8,
                    best_album_tracks = ?9, best_album_length = ?10, best_album_sales = ?11
                 WHERE id = ?12",
                self.table
            ),
            params![
                fields.name,
                fields.coordinates.x,
                fields.coordinates.y,
                fields.number_of_participants,
                fields.albums_count,
                fields.description,
                fields.genre.map(|g| g.as_str()),
                album.map(|a| a.name.as_str()),
                album.map(|a| a.tracks),
                album.and_then(|a| a.length),
                album.and_then(|a| a.sales),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(BandHubError::NotFound(format!("band {} does not exist", id)));
        }
        Ok(())
    }

    fn delete_all_by_owner(&self, owner: &str) -> Result<usize> {
        let deleted = self.conn.execute(
            &format!("DELETE FROM {} WHERE owner = ?1", self.table),
            params![owner],
        )?;
        Ok(deleted)
    }

    fn is_owner(&self, id: i64, username: &str) -> Result<bool> {
        let owner: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT owner FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner.as_deref() == Some(username))
    }
}
