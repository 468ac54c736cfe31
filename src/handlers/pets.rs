//! Available-pets listing.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, instrument};

use super::{cors_headers, preflight, respond};
use crate::backend::{AgeGroup, PetCatalog, PetFilter, ShelteredPet};
use crate::function::{FunctionEvent, FunctionHandler, HandlerResult};

/// A pet as presented to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PetListing {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub pet_type: String,
    pub breed: String,
    pub age: u32,
    pub size: String,
    pub distance: String,
    pub image: String,
    pub description: String,
    pub traits: Vec<String>,
    pub shelter: String,
    pub phone: String,
    pub address: String,
    pub fee: String,
}

impl From<ShelteredPet> for PetListing {
    fn from(ShelteredPet { pet, shelter }: ShelteredPet) -> Self {
        Self {
            id: pet.id,
            name: pet.name,
            pet_type: pet.pet_type,
            breed: pet.breed,
            age: pet.age,
            size: pet.size,
            distance: format!("{} miles", pet.distance),
            image: pet.image_url,
            description: pet.description,
            traits: pet.traits,
            shelter: shelter.name,
            phone: shelter.phone,
            address: format!("{}, {}, {}", shelter.address, shelter.city, shelter.state),
            fee: format!("${}", pet.adoption_fee),
        }
    }
}

/// Lists adoptable pets, optionally filtered by species, size and age band.
pub struct PetsHandler {
    catalog: Arc<dyn PetCatalog>,
    cors: HeaderMap,
}

impl PetsHandler {
    pub fn new(catalog: Arc<dyn PetCatalog>) -> Self {
        Self {
            catalog,
            cors: cors_headers("GET, POST, OPTIONS", "Content-Type"),
        }
    }

    fn filter_from(event: &FunctionEvent) -> PetFilter {
        PetFilter {
            species: event.query_param("species").map(str::to_lowercase),
            size: event.query_param("size").map(str::to_lowercase),
            age: event.query_param("age").and_then(AgeGroup::parse),
        }
    }
}

#[async_trait]
impl FunctionHandler for PetsHandler {
    #[instrument(skip_all, fields(method = %event.method))]
    async fn handle(&self, event: FunctionEvent) -> HandlerResult {
        if event.method == Method::OPTIONS {
            return Ok(preflight(&self.cors));
        }

        let filter = Self::filter_from(&event);
        debug!(?filter, "Listing available pets");

        match self.catalog.available_pets(&filter).await {
            Ok(pets) => {
                let listings: Vec<PetListing> = pets.into_iter().map(PetListing::from).collect();
                respond(StatusCode::OK, &listings, &self.cors)
            }
            Err(e) => {
                error!(error = %e, "Error fetching pets");
                respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({ "error": "Failed to fetch pets", "message": e.to_string() }),
                    &self.cors,
                )
            }
        }
    }
}
