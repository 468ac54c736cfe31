//! Data collaborators behind the function handlers.
//!
//! The handlers only see these traits. [`memory`] provides in-process
//! implementations used by the local server and the tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BackendError;

/// Result type for collaborator calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A shelter listing pets for adoption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelter {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
}

/// A pet row as stored by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: i64,
    pub shelter_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub pet_type: String,
    pub breed: String,
    pub age: u32,
    pub size: String,
    pub distance: f64,
    pub image_url: String,
    pub description: String,
    pub traits: Vec<String>,
    pub status: String,
    pub adoption_fee: f64,
    pub created_at: DateTime<Utc>,
}

/// A pet joined with its shelter.
#[derive(Debug, Clone, PartialEq)]
pub struct ShelteredPet {
    pub pet: Pet,
    pub shelter: Shelter,
}

/// Coarse age bands used by the listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeGroup {
    /// Two years or younger
    Young,
    /// Between two and seven years, inclusive
    Adult,
    /// Older than seven years
    Senior,
}

impl AgeGroup {
    /// Parse a query value; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "young" => Some(AgeGroup::Young),
            "adult" => Some(AgeGroup::Adult),
            "senior" => Some(AgeGroup::Senior),
            _ => None,
        }
    }

    /// Whether `age` falls in this band.
    pub fn contains(&self, age: u32) -> bool {
        match self {
            AgeGroup::Young => age <= 2,
            AgeGroup::Adult => (2..=7).contains(&age),
            AgeGroup::Senior => age > 7,
        }
    }
}

/// Filter for the available-pets listing. String fields are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PetFilter {
    pub species: Option<String>,
    pub size: Option<String>,
    pub age: Option<AgeGroup>,
}

impl PetFilter {
    /// Whether `pet` passes every set criterion.
    pub fn matches(&self, pet: &Pet) -> bool {
        self.species.as_deref().map_or(true, |s| pet.pet_type == s)
            && self.size.as_deref().map_or(true, |s| pet.size == s)
            && self.age.map_or(true, |group| group.contains(pet.age))
    }
}

/// A favorite row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: String,
    pub pet_id: i64,
    pub mode: String,
    pub created_at: DateTime<Utc>,
}

/// A favorite joined with the pet it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct FavoritePet {
    pub favorite: Favorite,
    pub pet: Pet,
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
}

/// Read access to adoptable pets.
#[async_trait]
pub trait PetCatalog: Send + Sync {
    /// Pets with status `available` matching `filter`, newest first.
    async fn available_pets(&self, filter: &PetFilter) -> BackendResult<Vec<ShelteredPet>>;
}

/// Per-user favorites storage.
#[async_trait]
pub trait FavoritesRepository: Send + Sync {
    /// The user's favorites, newest first.
    async fn list(&self, user_id: &str) -> BackendResult<Vec<FavoritePet>>;

    /// Add a favorite. Fails with [`BackendError::Duplicate`] if the user
    /// already saved this pet.
    async fn add(&self, user_id: &str, pet_id: i64, mode: &str) -> BackendResult<Favorite>;

    /// Remove a favorite. Removing a missing favorite is not an error.
    async fn remove(&self, user_id: &str, pet_id: i64) -> BackendResult<()>;
}

/// Verifies bearer tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// The user owning `token`, or `None` if the token is not valid.
    async fn verify(&self, token: &str) -> BackendResult<Option<User>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_groups() {
        assert!(AgeGroup::Young.contains(0));
        assert!(AgeGroup::Young.contains(2));
        assert!(!AgeGroup::Young.contains(3));
        assert!(AgeGroup::Adult.contains(2));
        assert!(AgeGroup::Adult.contains(7));
        assert!(!AgeGroup::Adult.contains(8));
        assert!(AgeGroup::Senior.contains(8));
        assert!(!AgeGroup::Senior.contains(7));
    }

    #[test]
    fn test_age_group_parse() {
        assert_eq!(AgeGroup::parse("senior"), Some(AgeGroup::Senior));
        assert_eq!(AgeGroup::parse("ancient"), None);
    }
}
