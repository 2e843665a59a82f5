//! # Catalog Routes
//!
//! Menu and inventory master data: categories, products with their recipes,
//! ingredients and stock locations. These call the repositories directly;
//! the only business rules are field validation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use bistro_core::validation::{
    validate_amount_cents, validate_name, validate_optional_text, validate_price_cents,
    validate_search_query, validate_sku, validate_stock_quantity,
};
use bistro_core::{Category, Ingredient, Location, LocationKind, Product, RecipeLine, Unit};
use bistro_db::{new_id, ProductFilter};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

const MAX_DESCRIPTION: usize = 500;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(deactivate_product),
        )
        .route("/products/{id}/availability", put(set_availability))
        .route("/products/{id}/recipe", get(get_recipe).put(set_recipe))
        .route("/ingredients", get(list_ingredients).post(create_ingredient))
        .route(
            "/ingredients/{id}",
            get(get_ingredient)
                .put(update_ingredient)
                .delete(deactivate_ingredient),
        )
        .route("/locations", get(list_locations).post(create_location))
        .route("/locations/{id}", get(get_location).put(update_location))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CategoryRequest {
    fn validate(&self) -> ApiResult<()> {
        validate_name("name", &self.name)?;
        validate_optional_text("description", self.description.as_deref(), MAX_DESCRIPTION)?;
        Ok(())
    }
}

async fn list_categories(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.db.categories().list(query.include_inactive).await?))
}

async fn get_category(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Category>> {
    let category = state
        .db
        .categories()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category", &id))?;
    Ok(Json(category))
}

async fn create_category(
    State(state): State<SharedState>,
    Json(request): Json<CategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    request.validate()?;
    let now = Utc::now();
    let category = Category {
        id: new_id(),
        name: request.name.trim().to_string(),
        description: request.description,
        sort_order: request.sort_order,
        is_active: request.is_active,
        created_at: now,
        updated_at: now,
    };
    let created = state.db.categories().insert(&category).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_category(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<CategoryRequest>,
) -> ApiResult<Json<Category>> {
    request.validate()?;
    let existing = state
        .db
        .categories()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category", &id))?;

    let updated = state
        .db
        .categories()
        .update(&Category {
            name: request.name.trim().to_string(),
            description: request.description,
            sort_order: request.sort_order,
            is_active: request.is_active,
            updated_at: Utc::now(),
            ..existing
        })
        .await?;
    Ok(Json(updated))
}

async fn delete_category(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.categories().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub price_cents: i64,
    pub cost_cents: Option<i64>,
    #[serde(default = "default_true")]
    pub vat_applicable: bool,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub track_inventory: bool,
}

impl ProductRequest {
    fn validate(&self) -> ApiResult<()> {
        validate_sku(&self.sku)?;
        validate_name("name", &self.name)?;
        validate_optional_text("description", self.description.as_deref(), MAX_DESCRIPTION)?;
        validate_price_cents(self.price_cents)?;
        if let Some(cost) = self.cost_cents {
            validate_amount_cents("cost_cents", cost)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipeLineRequest {
    pub ingredient_id: String,
    /// Base units (g, ml, pieces) per portion.
    pub quantity: i64,
}

async fn list_products(
    State(state): State<SharedState>,
    Query(mut filter): Query<ProductFilter>,
) -> ApiResult<Json<Vec<Product>>> {
    if let Some(search) = filter.search.take() {
        filter.search = Some(validate_search_query(&search)?);
    }
    Ok(Json(state.db.products().list(&filter).await?))
}

async fn get_product(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    let product = state
        .db
        .products()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", &id))?;
    Ok(Json(product))
}

async fn create_product(
    State(state): State<SharedState>,
    Json(request): Json<ProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    request.validate()?;
    let now = Utc::now();
    let product = Product {
        id: new_id(),
        sku: request.sku.trim().to_string(),
        name: request.name.trim().to_string(),
        description: request.description,
        category_id: request.category_id,
        price_cents: request.price_cents,
        cost_cents: request.cost_cents,
        vat_applicable: request.vat_applicable,
        is_available: request.is_available,
        track_inventory: request.track_inventory,
        is_active: true,
        created_at: now,
        updated_at: now,
        sync_version: 1,
    };
    let created = state.db.products().insert(&product).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_product(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ProductRequest>,
) -> ApiResult<Json<Product>> {
    request.validate()?;
    let existing = state
        .db
        .products()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", &id))?;

    let updated = state
        .db
        .products()
        .update(&Product {
            sku: request.sku.trim().to_string(),
            name: request.name.trim().to_string(),
            description: request.description,
            category_id: request.category_id,
            price_cents: request.price_cents,
            cost_cents: request.cost_cents,
            vat_applicable: request.vat_applicable,
            is_available: request.is_available,
            track_inventory: request.track_inventory,
            ..existing
        })
        .await?;
    Ok(Json(updated))
}

async fn deactivate_product(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.products().deactivate(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_availability(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<AvailabilityRequest>,
) -> ApiResult<Json<Product>> {
    let product = state
        .db
        .products()
        .set_availability(&id, request.is_available)
        .await?;
    info!(id = %id, available = request.is_available, "Product availability changed");
    Ok(Json(product))
}

async fn get_recipe(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RecipeLine>>> {
    if state.db.products().get_by_id(&id).await?.is_none() {
        return Err(ApiError::not_found("Product", &id));
    }
    Ok(Json(state.db.products().recipe(&id).await?))
}

async fn set_recipe(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(lines): Json<Vec<RecipeLineRequest>>,
) -> ApiResult<Json<Vec<RecipeLine>>> {
    let mut pairs: Vec<(String, i64)> = Vec::with_capacity(lines.len());
    for line in lines {
        validate_stock_quantity(line.quantity)?;
        if pairs.iter().any(|(ing, _)| *ing == line.ingredient_id) {
            return Err(ApiError::validation(format!(
                "ingredient {} appears twice in the recipe",
                line.ingredient_id
            )));
        }
        if !state.db.ingredients().exists(&line.ingredient_id).await? {
            return Err(ApiError::not_found("Ingredient", &line.ingredient_id));
        }
        pairs.push((line.ingredient_id, line.quantity));
    }

    Ok(Json(state.db.products().set_recipe(&id, &pairs).await?))
}

// =============================================================================
// Ingredients
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientRequest {
    pub name: String,
    pub unit: Unit,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub unit_cost_cents: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl IngredientRequest {
    fn validate(&self) -> ApiResult<()> {
        validate_name("name", &self.name)?;
        validate_amount_cents("reorder_level", self.reorder_level)?;
        validate_amount_cents("unit_cost_cents", self.unit_cost_cents)?;
        Ok(())
    }
}

async fn list_ingredients(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Ingredient>>> {
    Ok(Json(state.db.ingredients().list(query.include_inactive).await?))
}

async fn get_ingredient(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Ingredient>> {
    let ingredient = state
        .db
        .ingredients()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ingredient", &id))?;
    Ok(Json(ingredient))
}

async fn create_ingredient(
    State(state): State<SharedState>,
    Json(request): Json<IngredientRequest>,
) -> ApiResult<(StatusCode, Json<Ingredient>)> {
    request.validate()?;
    let now = Utc::now();
    let ingredient = Ingredient {
        id: new_id(),
        name: request.name.trim().to_string(),
        unit: request.unit,
        reorder_level: request.reorder_level,
        unit_cost_cents: request.unit_cost_cents,
        is_active: request.is_active,
        created_at: now,
        updated_at: now,
    };
    let created = state.db.ingredients().insert(&ingredient).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_ingredient(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<IngredientRequest>,
) -> ApiResult<Json<Ingredient>> {
    request.validate()?;
    let existing = state
        .db
        .ingredients()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ingredient", &id))?;

    let updated = state
        .db
        .ingredients()
        .update(&Ingredient {
            name: request.name.trim().to_string(),
            unit: request.unit,
            reorder_level: request.reorder_level,
            unit_cost_cents: request.unit_cost_cents,
            is_active: request.is_active,
            updated_at: Utc::now(),
            ..existing
        })
        .await?;
    Ok(Json(updated))
}

async fn deactivate_ingredient(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.ingredients().deactivate(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Locations
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LocationRequest {
    pub name: String,
    pub kind: LocationKind,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

async fn list_locations(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Location>>> {
    Ok(Json(state.db.locations().list(query.include_inactive).await?))
}

async fn get_location(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Location>> {
    let location = state
        .db
        .locations()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Location", &id))?;
    Ok(Json(location))
}

async fn create_location(
    State(state): State<SharedState>,
    Json(request): Json<LocationRequest>,
) -> ApiResult<(StatusCode, Json<Location>)> {
    validate_name("name", &request.name)?;
    let location = Location {
        id: new_id(),
        name: request.name.trim().to_string(),
        kind: request.kind,
        is_active: request.is_active,
        created_at: Utc::now(),
    };
    let created = state.db.locations().insert(&location).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_location(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<LocationRequest>,
) -> ApiResult<Json<Location>> {
    validate_name("name", &request.name)?;
    let existing = state
        .db
        .locations()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Location", &id))?;

    let updated = state
        .db
        .locations()
        .update(&Location {
            name: request.name.trim().to_string(),
            kind: request.kind,
            is_active: request.is_active,
            ..existing
        })
        .await?;
    Ok(Json(updated))
}

fn default_true() -> bool {
    true
}
