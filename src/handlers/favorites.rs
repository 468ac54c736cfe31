//! Per-user favorites: list, add and remove.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use super::{cors_headers, preflight, respond};
use crate::backend::{FavoritesRepository, TokenVerifier, User};
use crate::error::{BackendError, HandlerError};
use crate::function::{FunctionEvent, FunctionHandler, HandlerResult};

/// Mode recorded when a client does not pick one.
const DEFAULT_MODE: &str = "adopt";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddFavoriteRequest {
    pet_id: i64,
    #[serde(default)]
    mode: Option<String>,
}

/// Manages the authenticated user's saved pets.
pub struct FavoritesHandler {
    favorites: Arc<dyn FavoritesRepository>,
    verifier: Arc<dyn TokenVerifier>,
    cors: HeaderMap,
}

impl FavoritesHandler {
    pub fn new(favorites: Arc<dyn FavoritesRepository>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            favorites,
            verifier,
            cors: cors_headers("GET, POST, DELETE, OPTIONS", "Content-Type, Authorization"),
        }
    }

    /// Resolve the caller, or the 401 to send back.
    async fn authenticate(&self, event: &FunctionEvent) -> Result<User, HandlerResult> {
        let Some(auth) = event.header(AUTHORIZATION.as_str()) else {
            return Err(respond(
                StatusCode::UNAUTHORIZED,
                &json!({ "error": "Unauthorized" }),
                &self.cors,
            ));
        };

        let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();
        match self.verifier.verify(token).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(self.invalid_token()),
            Err(e) => {
                warn!(error = %e, "Token verification failed");
                Err(self.invalid_token())
            }
        }
    }

    fn invalid_token(&self) -> HandlerResult {
        respond(
            StatusCode::UNAUTHORIZED,
            &json!({ "error": "Invalid token" }),
            &self.cors,
        )
    }

    async fn list(&self, user: &User) -> HandlerResult {
        let favorites = self.favorites.list(&user.id).await?;

        let body = favorites
            .into_iter()
            .map(|entry| -> serde_json::Result<Value> {
                let mut pet = serde_json::to_value(&entry.pet)?;
                if let Value::Object(fields) = &mut pet {
                    fields.insert("favoriteId".to_string(), json!(entry.favorite.id));
                    fields.insert("mode".to_string(), json!(entry.favorite.mode));
                }
                Ok(pet)
            })
            .collect::<Result<Vec<Value>, serde_json::Error>>()?;

        respond(StatusCode::OK, &body, &self.cors)
    }

    async fn add(&self, user: &User, event: &FunctionEvent) -> HandlerResult {
        let request: AddFavoriteRequest =
            match serde_json::from_str(event.body.as_deref().unwrap_or_default()) {
                Ok(request) => request,
                Err(e) => {
                    debug!(error = %e, "Rejecting malformed favorite");
                    return respond(
                        StatusCode::BAD_REQUEST,
                        &json!({ "error": "Invalid request body", "message": e.to_string() }),
                        &self.cors,
                    );
                }
            };
        let mode = request.mode.as_deref().unwrap_or(DEFAULT_MODE);

        match self.favorites.add(&user.id, request.pet_id, mode).await {
            Ok(favorite) => respond(StatusCode::CREATED, &favorite, &self.cors),
            Err(BackendError::Duplicate(_)) => respond(
                StatusCode::CONFLICT,
                &json!({ "error": "Already in favorites" }),
                &self.cors,
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, user: &User, event: &FunctionEvent) -> HandlerResult {
        let Some(pet_id) = event
            .last_path_segment()
            .and_then(|segment| segment.parse::<i64>().ok())
        else {
            return respond(
                StatusCode::BAD_REQUEST,
                &json!({ "error": "Invalid pet id" }),
                &self.cors,
            );
        };

        self.favorites.remove(&user.id, pet_id).await?;
        respond(
            StatusCode::OK,
            &json!({ "message": "Removed from favorites" }),
            &self.cors,
        )
    }

    async fn dispatch(&self, event: FunctionEvent) -> HandlerResult {
        let user = match self.authenticate(&event).await {
            Ok(user) => user,
            Err(response) => return response,
        };

        match event.method {
            Method::GET => self.list(&user).await,
            Method::POST => self.add(&user, &event).await,
            Method::DELETE => self.remove(&user, &event).await,
            _ => respond(
                StatusCode::METHOD_NOT_ALLOWED,
                &json!({ "error": "Method not allowed" }),
                &self.cors,
            ),
        }
    }

    fn internal_error(&self, err: &HandlerError) -> HandlerResult {
        respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "error": "Internal server error", "message": err.to_string() }),
            &self.cors,
        )
    }
}

#[async_trait]
impl FunctionHandler for FavoritesHandler {
    #[instrument(skip_all, fields(method = %event.method, path = %event.path))]
    async fn handle(&self, event: FunctionEvent) -> HandlerResult {
        if event.method == Method::OPTIONS {
            return Ok(preflight(&self.cors));
        }

        match self.dispatch(event).await {
            Ok(response) => Ok(response),
            Err(e) => {
                error!(error = %e, "Error in favorites");
                self.internal_error(&e)
            }
        }
    }
}

impl std::fmt::Debug for FavoritesHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesHandler").finish_non_exhaustive()
    }
}
