//! Data models for tripsync
//!
//! Defines the trip record and its four child collections: flights, hotels,
//! activities and restaurants. The `Entity` trait lets the store and the sync
//! engine treat all five uniformly, while `EntityType` drives every
//! collection-specific decision through an exhaustive match.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::identity::Identity;
use crate::storage::error::{StorageError, StorageResult};

/// Trip field listing the identities allowed to access the trip
pub const ACCESS_FIELD: &str = "shared_with";

/// The five record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Trip,
    Flight,
    Hotel,
    Activity,
    Restaurant,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Trip,
        EntityType::Flight,
        EntityType::Hotel,
        EntityType::Activity,
        EntityType::Restaurant,
    ];

    /// Collections nested under a trip
    pub const CHILDREN: [EntityType; 4] = [
        EntityType::Flight,
        EntityType::Hotel,
        EntityType::Activity,
        EntityType::Restaurant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Trip => "trip",
            EntityType::Flight => "flight",
            EntityType::Hotel => "hotel",
            EntityType::Activity => "activity",
            EntityType::Restaurant => "restaurant",
        }
    }

    /// Collection name, used both as the local table and the remote path segment
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::Trip => "trips",
            EntityType::Flight => "flights",
            EntityType::Hotel => "hotels",
            EntityType::Activity => "activities",
            EntityType::Restaurant => "restaurants",
        }
    }

    /// Whether records of this type live under a parent trip
    pub fn is_child(&self) -> bool {
        !matches!(self, EntityType::Trip)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity type name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown entity type: '{0}'")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    /// Accepts both the singular name and the collection name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle || t.collection() == needle)
            .ok_or_else(|| UnknownEntityType(s.to_string()))
    }
}

/// Bookkeeping fields shared by every record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordMeta {
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Identity that made the last change
    #[serde(default)]
    pub updated_by: String,
}

impl RecordMeta {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            updated_by: String::new(),
        }
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A record type stored locally and synced remotely
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TYPE: EntityType;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Parent trip, `None` for trips themselves
    fn trip_id(&self) -> Option<&str>;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Domain-specific checks, run before anything is written or queued
    fn validate_fields(&self) -> StorageResult<()>;

    /// Stamp the record as changed by `identity` at `at`
    fn stamp(&mut self, identity: &Identity, at: DateTime<Utc>) {
        let meta = self.meta_mut();
        meta.updated_at = at;
        meta.updated_by = identity.as_str().to_string();
    }

    /// Full validation: id shape, parent reference and domain fields
    fn validate(&self) -> StorageResult<()> {
        validate_id(self.id())?;
        if Self::TYPE.is_child() {
            match self.trip_id() {
                Some(trip_id) => validate_id(trip_id)?,
                None => {
                    return Err(StorageError::Validation(format!(
                        "{} '{}' has no trip_id",
                        Self::TYPE,
                        self.id()
                    )))
                }
            }
        }
        self.validate_fields()
    }
}

/// Ids become remote path segments, so they must be non-blank and slash-free
pub fn validate_id(id: &str) -> StorageResult<()> {
    if id.trim().is_empty() {
        return Err(StorageError::Validation("id must not be empty".to_string()));
    }
    if id.contains('/') {
        return Err(StorageError::Validation(format!(
            "id '{}' must not contain '/'",
            id
        )));
    }
    Ok(())
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn require_non_blank(entity: EntityType, field: &str, value: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::Validation(format!(
            "{} {} must not be empty",
            entity, field
        )));
    }
    Ok(())
}

fn require_ordered<T: PartialOrd + fmt::Display>(
    entity: EntityType,
    what: &str,
    start: Option<&T>,
    end: Option<&T>,
) -> StorageResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(StorageError::Validation(format!(
                "{} {} ends ({}) before it starts ({})",
                entity, what, end, start
            )));
        }
    }
    Ok(())
}

/// A planned trip; the parent of every other record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Identities with access to this trip
    #[serde(default)]
    pub shared_with: Vec<String>,
    /// Soft-delete marker; set remotely when a trip is deleted
    #[serde(default)]
    pub deleted: bool,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Trip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            destination: None,
            start_date: None,
            end_date: None,
            notes: None,
            shared_with: Vec::new(),
            deleted: false,
            meta: RecordMeta::new(),
        }
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(name)
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn is_shared_with(&self, identity: &str) -> bool {
        self.shared_with.iter().any(|s| s == identity)
    }

    /// Add an identity to the access list; returns false if already present
    pub fn grant(&mut self, identity: &str) -> bool {
        if self.is_shared_with(identity) {
            return false;
        }
        self.shared_with.push(identity.to_string());
        true
    }
}

impl Entity for Trip {
    const TYPE: EntityType = EntityType::Trip;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn trip_id(&self) -> Option<&str> {
        None
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn validate_fields(&self) -> StorageResult<()> {
        require_non_blank(Self::TYPE, "name", &self.name)?;
        require_ordered(
            Self::TYPE,
            "date range",
            self.start_date.as_ref(),
            self.end_date.as_ref(),
        )
    }
}

/// A flight leg belonging to a trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub trip_id: String,
    #[serde(default)]
    pub airline: Option<String>,
    pub flight_number: String,
    #[serde(default)]
    pub departure_airport: Option<String>,
    #[serde(default)]
    pub arrival_airport: Option<String>,
    #[serde(default)]
    pub departs_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub arrives_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confirmation: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Flight {
    pub fn new(trip_id: impl Into<String>, flight_number: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            trip_id: trip_id.into(),
            airline: None,
            flight_number: flight_number.into(),
            departure_airport: None,
            arrival_airport: None,
            departs_at: None,
            arrives_at: None,
            confirmation: None,
            notes: None,
            meta: RecordMeta::new(),
        }
    }

    pub fn with_route(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.departure_airport = Some(from.into());
        self.arrival_airport = Some(to.into());
        self
    }

    pub fn with_times(
        mut self,
        departs_at: Option<DateTime<Utc>>,
        arrives_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.departs_at = departs_at;
        self.arrives_at = arrives_at;
        self
    }
}

impl Entity for Flight {
    const TYPE: EntityType = EntityType::Flight;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn trip_id(&self) -> Option<&str> {
        Some(&self.trip_id)
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn validate_fields(&self) -> StorageResult<()> {
        require_non_blank(Self::TYPE, "flight_number", &self.flight_number)?;
        require_ordered(
            Self::TYPE,
            "schedule",
            self.departs_at.as_ref(),
            self.arrives_at.as_ref(),
        )
    }
}

/// A hotel stay belonging to a trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hotel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub trip_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub check_in: Option<NaiveDate>,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    #[serde(default)]
    pub confirmation: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Hotel {
    pub fn new(trip_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            trip_id: trip_id.into(),
            name: name.into(),
            address: None,
            check_in: None,
            check_out: None,
            confirmation: None,
            notes: None,
            meta: RecordMeta::new(),
        }
    }

    pub fn with_stay(mut self, check_in: Option<NaiveDate>, check_out: Option<NaiveDate>) -> Self {
        self.check_in = check_in;
        self.check_out = check_out;
        self
    }
}

impl Entity for Hotel {
    const TYPE: EntityType = EntityType::Hotel;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn trip_id(&self) -> Option<&str> {
        Some(&self.trip_id)
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn validate_fields(&self) -> StorageResult<()> {
        require_non_blank(Self::TYPE, "name", &self.name)?;
        require_ordered(
            Self::TYPE,
            "stay",
            self.check_in.as_ref(),
            self.check_out.as_ref(),
        )
    }
}

/// Something to do during a trip; ordered by `position` within the trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub trip_id: String,
    pub name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Activity {
    pub fn new(trip_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            trip_id: trip_id.into(),
            name: name.into(),
            date: None,
            time: None,
            location: None,
            notes: None,
            position: 0,
            meta: RecordMeta::new(),
        }
    }

    pub fn with_id(
        id: impl Into<String>,
        trip_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ..Self::new(trip_id, name)
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

impl Entity for Activity {
    const TYPE: EntityType = EntityType::Activity;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn trip_id(&self) -> Option<&str> {
        Some(&self.trip_id)
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn validate_fields(&self) -> StorageResult<()> {
        require_non_blank(Self::TYPE, "name", &self.name)?;
        if self.position < 0 {
            return Err(StorageError::Validation(format!(
                "activity position must not be negative (got {})",
                self.position
            )));
        }
        Ok(())
    }
}

/// A restaurant reservation or idea belonging to a trip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Restaurant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub trip_id: String,
    pub name: String,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub reservation_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Restaurant {
    pub fn new(trip_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            trip_id: trip_id.into(),
            name: name.into(),
            cuisine: None,
            address: None,
            reservation_at: None,
            notes: None,
            meta: RecordMeta::new(),
        }
    }
}

impl Entity for Restaurant {
    const TYPE: EntityType = EntityType::Restaurant;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn trip_id(&self) -> Option<&str> {
        Some(&self.trip_id)
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn validate_fields(&self) -> StorageResult<()> {
        require_non_blank(Self::TYPE, "name", &self.name)
    }
}

/// A trip together with everything planned under it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Itinerary {
    pub trip: Trip,
    pub flights: Vec<Flight>,
    pub hotels: Vec<Hotel>,
    pub activities: Vec<Activity>,
    pub restaurants: Vec<Restaurant>,
}

impl Itinerary {
    /// Number of child records across all four collections
    pub fn item_count(&self) -> usize {
        self.flights.len() + self.hotels.len() + self.activities.len() + self.restaurants.len()
    }
}
