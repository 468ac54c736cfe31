//! In-process implementations of the data collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    BackendResult, Favorite, FavoritePet, FavoritesRepository, Pet, PetCatalog, PetFilter,
    Shelter, ShelteredPet, TokenVerifier, User,
};
use crate::error::BackendError;

/// Pet catalog held in memory.
#[derive(Debug, Default)]
pub struct MemoryPetCatalog {
    shelters: RwLock<HashMap<i64, Shelter>>,
    pets: RwLock<Vec<Pet>>,
}

impl MemoryPetCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a shelter.
    pub fn add_shelter(&self, shelter: Shelter) {
        self.shelters.write().insert(shelter.id, shelter);
    }

    /// Add a pet.
    pub fn add_pet(&self, pet: Pet) {
        self.pets.write().push(pet);
    }

    /// Look up a pet by id, whatever its status.
    pub fn pet(&self, id: i64) -> Option<Pet> {
        self.pets.read().iter().find(|p| p.id == id).cloned()
    }

    /// A catalog with a handful of demo records.
    pub fn with_demo_data() -> Self {
        let catalog = Self::new();
        let now = Utc::now();

        catalog.add_shelter(Shelter {
            id: 1,
            name: "Riverside Animal Rescue".to_string(),
            phone: "(555) 010-2000".to_string(),
            address: "12 Mill Road".to_string(),
            city: "Portland".to_string(),
            state: "OR".to_string(),
        });
        catalog.add_shelter(Shelter {
            id: 2,
            name: "Hillcrest Humane Society".to_string(),
            phone: "(555) 010-3000".to_string(),
            address: "400 Summit Ave".to_string(),
            city: "Salem".to_string(),
            state: "OR".to_string(),
        });

        let demo = [
            (1, 1, "Biscuit", "dog", "Beagle", 1, "small", 2.5, "available", 150.0, 1),
            (2, 1, "Juniper", "cat", "Domestic Shorthair", 4, "medium", 2.5, "available", 90.0, 2),
            (3, 2, "Atlas", "dog", "Great Dane", 9, "large", 11.0, "available", 75.0, 3),
            (4, 2, "Pepper", "rabbit", "Holland Lop", 2, "small", 11.0, "adopted", 40.0, 4),
        ];
        for (id, shelter_id, name, pet_type, breed, age, size, distance, status, fee, days_ago) in
            demo
        {
            catalog.add_pet(Pet {
                id,
                shelter_id,
                name: name.to_string(),
                pet_type: pet_type.to_string(),
                breed: breed.to_string(),
                age,
                size: size.to_string(),
                distance,
                image_url: format!("https://images.example.org/pets/{}.jpg", id),
                description: format!("{} is looking for a home.", name),
                traits: vec!["friendly".to_string()],
                status: status.to_string(),
                adoption_fee: fee,
                created_at: now - Duration::days(days_ago),
            });
        }

        catalog
    }
}

#[async_trait]
impl PetCatalog for MemoryPetCatalog {
    async fn available_pets(&self, filter: &PetFilter) -> BackendResult<Vec<ShelteredPet>> {
        let shelters = self.shelters.read();
        let mut pets: Vec<ShelteredPet> = self
            .pets
            .read()
            .iter()
            .filter(|pet| pet.status == "available" && filter.matches(pet))
            .map(|pet| -> BackendResult<ShelteredPet> {
                let shelter = shelters.get(&pet.shelter_id).cloned().ok_or_else(|| {
                    BackendError::Unavailable(format!(
                        "pet {} references missing shelter {}",
                        pet.id, pet.shelter_id
                    ))
                })?;
                Ok(ShelteredPet {
                    pet: pet.clone(),
                    shelter,
                })
            })
            .collect::<BackendResult<_>>()?;

        pets.sort_by(|a, b| b.pet.created_at.cmp(&a.pet.created_at));
        Ok(pets)
    }
}

/// Favorites held in memory, joined against a [`MemoryPetCatalog`].
#[derive(Debug)]
pub struct MemoryFavorites {
    catalog: Arc<MemoryPetCatalog>,
    favorites: RwLock<Vec<Favorite>>,
}

impl MemoryFavorites {
    /// Create an empty favorites store over `catalog`.
    pub fn new(catalog: Arc<MemoryPetCatalog>) -> Self {
        Self {
            catalog,
            favorites: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FavoritesRepository for MemoryFavorites {
    async fn list(&self, user_id: &str) -> BackendResult<Vec<FavoritePet>> {
        let mut favorites: Vec<FavoritePet> = self
            .favorites
            .read()
            .iter()
            .rev()
            .filter(|fav| fav.user_id == user_id)
            .filter_map(|fav| {
                self.catalog.pet(fav.pet_id).map(|pet| FavoritePet {
                    favorite: fav.clone(),
                    pet,
                })
            })
            .collect();

        favorites.sort_by(|a, b| b.favorite.created_at.cmp(&a.favorite.created_at));
        Ok(favorites)
    }

    async fn add(&self, user_id: &str, pet_id: i64, mode: &str) -> BackendResult<Favorite> {
        let mut favorites = self.favorites.write();
        if favorites
            .iter()
            .any(|fav| fav.user_id == user_id && fav.pet_id == pet_id)
        {
            return Err(BackendError::Duplicate(format!(
                "user {} already saved pet {}",
                user_id, pet_id
            )));
        }

        let favorite = Favorite {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            pet_id,
            mode: mode.to_string(),
            created_at: Utc::now(),
        };
        favorites.push(favorite.clone());
        Ok(favorite)
    }

    async fn remove(&self, user_id: &str, pet_id: i64) -> BackendResult<()> {
        self.favorites
            .write()
            .retain(|fav| !(fav.user_id == user_id && fav.pet_id == pet_id));
        Ok(())
    }
}

/// Token verifier backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, User>,
}

impl StaticTokenVerifier {
    /// Create a verifier that accepts no tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as belonging to `user`.
    pub fn with_token(mut self, token: impl Into<String>, user: User) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> BackendResult<Option<User>> {
        Ok(self.tokens.get(token).cloned())
    }
}
