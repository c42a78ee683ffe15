//! Band records and their validation rules
//!
//! `BandDraft` is what clients send; it is untrusted until `validate`
//! turns it into `BandFields`. A stored `Band` is the validated fields plus
//! the server-assigned id, creation date and owner.

use crate::error::{BandHubError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of genres. Declaration order defines genre ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MusicGenre {
    ProgressiveRock,
    HipHop,
    PsychedelicCloudRap,
    Soul,
    PostPunk,
}

impl MusicGenre {
    pub const ALL: [MusicGenre; 5] = [
        MusicGenre::ProgressiveRock,
        MusicGenre::HipHop,
        MusicGenre::PsychedelicCloudRap,
        MusicGenre::Soul,
        MusicGenre::PostPunk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MusicGenre::ProgressiveRock => "PROGRESSIVE_ROCK",
            MusicGenre::HipHop => "HIP_HOP",
            MusicGenre::PsychedelicCloudRap => "PSYCHEDELIC_CLOUD_RAP",
            MusicGenre::Soul => "SOUL",
            MusicGenre::PostPunk => "POST_PUNK",
        }
    }
}

impl fmt::Display for MusicGenre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MusicGenre {
    type Err = BandHubError;

    fn from_str(s: &str) -> Result<Self> {
        MusicGenre::ALL
            .iter()
            .copied()
            .find(|genre| genre.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = MusicGenre::ALL.iter().map(|g| g.as_str()).collect();
                BandHubError::Validation(format!(
                    "genre must be one of {}, got '{}'",
                    allowed.join(", "),
                    s
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    pub tracks: i64,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default)]
    pub sales: Option<f64>,
}

impl Album {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BandHubError::Validation(
                "bestAlbum.name must not be empty".to_string(),
            ));
        }
        if self.tracks <= 0 {
            return Err(BandHubError::Validation(
                "bestAlbum.tracks must be greater than 0".to_string(),
            ));
        }
        if matches!(self.length, Some(length) if length <= 0) {
            return Err(BandHubError::Validation(
                "bestAlbum.length must be greater than 0".to_string(),
            ));
        }
        if matches!(self.sales, Some(sales) if !(sales.is_finite() && sales > 0.0)) {
            return Err(BandHubError::Validation(
                "bestAlbum.sales must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Band data as received from a client, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandDraft {
    pub name: String,
    pub coordinates: Coordinates,
    pub number_of_participants: i64,
    pub albums_count: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub best_album: Option<Album>,
}

impl BandDraft {
    pub fn new(name: impl Into<String>, x: f64, y: f64, participants: i64, albums: i64) -> Self {
        Self {
            name: name.into(),
            coordinates: Coordinates { x, y },
            number_of_participants: participants,
            albums_count: albums,
            description: None,
            genre: None,
            best_album: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_genre(mut self, genre: MusicGenre) -> Self {
        self.genre = Some(genre.as_str().to_string());
        self
    }

    pub fn with_best_album(mut self, album: Album) -> Self {
        self.best_album = Some(album);
        self
    }

    /// Check every field constraint, naming the first one violated.
    pub fn validate(self) -> Result<BandFields> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(BandHubError::Validation("name must not be empty".to_string()));
        }
        if !(self.coordinates.x.is_finite() && self.coordinates.y.is_finite()) {
            return Err(BandHubError::Validation(
                "coordinates must be finite numbers".to_string(),
            ));
        }
        if self.number_of_participants <= 0 {
            return Err(BandHubError::Validation(
                "numberOfParticipants must be greater than 0".to_string(),
            ));
        }
        if self.albums_count < 0 {
            return Err(BandHubError::Validation(
                "albumsCount must not be negative".to_string(),
            ));
        }
        let genre = self.genre.as_deref().map(MusicGenre::from_str).transpose()?;
        if let Some(album) = &self.best_album {
            album.validate()?;
        }

        Ok(BandFields {
            name,
            coordinates: self.coordinates,
            number_of_participants: self.number_of_participants,
            albums_count: self.albums_count,
            description: self.description,
            genre,
            best_album: self.best_album,
        })
    }
}

/// The user-editable part of a band, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct BandFields {
    pub name: String,
    pub coordinates: Coordinates,
    pub number_of_participants: i64,
    pub albums_count: i64,
    pub description: Option<String>,
    pub genre: Option<MusicGenre>,
    pub best_album: Option<Album>,
}

impl BandFields {
    fn sort_key(&self) -> (i64, i64) {
        (self.number_of_participants, self.albums_count)
    }

    /// Whether a not-yet-stored band would order strictly before `band`.
    ///
    /// A new band will receive an id larger than any existing one, so it
    /// loses every tie on the primary keys.
    pub fn precedes(&self, band: &Band) -> bool {
        self.sort_key() < band.sort_key()
    }

    /// Whether a not-yet-stored band would order after `band`, ties included.
    pub fn follows(&self, band: &Band) -> bool {
        self.sort_key() >= band.sort_key()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub id: i64,
    pub name: String,
    pub coordinates: Coordinates,
    pub creation_date: DateTime<Utc>,
    pub number_of_participants: i64,
    pub albums_count: i64,
    pub description: Option<String>,
    pub genre: Option<MusicGenre>,
    pub best_album: Option<Album>,
    pub owner_username: String,
}

impl Band {
    pub fn from_fields(
        id: i64,
        creation_date: DateTime<Utc>,
        owner_username: impl Into<String>,
        fields: BandFields,
    ) -> Self {
        Self {
            id,
            name: fields.name,
            coordinates: fields.coordinates,
            creation_date,
            number_of_participants: fields.number_of_participants,
            albums_count: fields.albums_count,
            description: fields.description,
            genre: fields.genre,
            best_album: fields.best_album,
            owner_username: owner_username.into(),
        }
    }

    /// Replace the mutable fields; id, creation date and owner are kept.
    pub fn apply(&mut self, fields: BandFields) {
        self.name = fields.name;
        self.coordinates = fields.coordinates;
        self.number_of_participants = fields.number_of_participants;
        self.albums_count = fields.albums_count;
        self.description = fields.description;
        self.genre = fields.genre;
        self.best_album = fields.best_album;
    }

    fn sort_key(&self) -> (i64, i64) {
        (self.number_of_participants, self.albums_count)
    }

    /// Total order used by add_if_min / add_if_max: participants, then albums, then id.
    pub fn ordering(&self, other: &Band) -> std::cmp::Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.id.cmp(&other.id))
    }
}
