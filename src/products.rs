use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::db::DbConnection;
use crate::error::ApiError;
use crate::history::{record_search, ClientIp};
use crate::locations::{country_currency, display_names, validate_hierarchy, DisplayNames};
use crate::models::{
    listing_slug, validate_listing_name, validate_phone, validate_price_minor, ListingStatus,
    NewProduct, Product, ProductChangeset,
};
use crate::ratings::{product_rating_summaries, RatingSummary};
use crate::schema::products;
use crate::search::{paginate, rank, run_product_search, SearchParams};
use crate::AppState;

const CONDITIONS: [&str; 3] = ["new", "used", "refurbished"];

/// Promotion surcharge stored on every new listing, charged on top of the
/// base listing fee when promotion was requested.
const DEFAULT_PROMOTION_FEE_MINOR: i64 = 1000;

/// Public representation of a product: row fields plus display names
/// derived from the location/category FK chain and the on-demand rating
/// summary.
#[derive(Debug, Serialize)]
pub struct ProductView {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub featured_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    pub price_minor: i64,
    pub original_price_minor: Option<i64>,
    pub currency: String,
    pub is_negotiable: bool,
    pub country: String,
    pub state: String,
    pub city: String,
    pub address_details: Option<String>,
    pub category: String,
    pub tags: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: String,
    pub status: String,
    pub provider_phone: String,
    pub provider_email: Option<String>,
    pub provider_whatsapp: Option<String>,
    pub is_paid: bool,
    pub is_promoted: bool,
    pub is_featured: bool,
    pub views_count: i32,
    pub favorites_count: i32,
    pub average_rating: Option<f64>,
    pub rating_count: i64,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProductView {
    pub fn build(p: Product, summary: RatingSummary, names: &DisplayNames) -> Self {
        ProductView {
            country: names.country(p.country_id),
            state: names.state(p.state_id),
            city: names.city(p.city_id),
            category: names.category(p.category_id),
            id: p.id,
            user_id: p.user_id,
            name: p.name,
            slug: p.slug,
            description: p.description,
            featured_image_url: p.featured_image_url,
            gallery_image_urls: p.gallery_image_urls,
            price_minor: p.price_minor,
            original_price_minor: p.original_price_minor,
            currency: p.currency,
            is_negotiable: p.is_negotiable,
            address_details: p.address_details,
            tags: p.tags,
            brand: p.brand,
            model: p.model,
            condition: p.condition,
            status: p.status,
            provider_phone: p.provider_phone,
            provider_email: p.provider_email,
            provider_whatsapp: p.provider_whatsapp,
            is_paid: p.is_paid,
            is_promoted: p.is_promoted,
            is_featured: p.is_featured,
            views_count: p.views_count,
            favorites_count: p.favorites_count,
            average_rating: summary.average,
            rating_count: summary.count,
            created_at: p.created_at,
            published_at: p.published_at,
            expires_at: p.expires_at,
        }
    }
}

fn load_product(conn: &mut DbConnection, product_id: i32) -> Result<Product, ApiError> {
    products::table
        .find(product_id)
        .first::<Product>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))
}

/// Loads a product the caller is allowed to mutate.
pub fn load_owned_product(
    conn: &mut DbConnection,
    product_id: i32,
    user_id: i32,
) -> Result<Product, ApiError> {
    let product = load_product(conn, product_id)?;
    if product.user_id != user_id {
        return Err(ApiError::Forbidden(
            "You do not have permission to modify this product".to_string(),
        ));
    }
    Ok(product)
}

fn single_view(conn: &mut DbConnection, product: Product) -> Result<ProductView, ApiError> {
    let summary = product_rating_summaries(conn, &[product.id])?
        .remove(&product.id)
        .unwrap_or(RatingSummary::EMPTY);
    let names = display_names(
        conn,
        &[product.country_id],
        &[product.state_id],
        &[product.city_id],
        &[product.category_id],
    )?;
    Ok(ProductView::build(product, summary, &names))
}

/// Public product search, same filter contract as the home page.
pub async fn list_products(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    client_ip: ClientIp,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ProductView>>, ApiError> {
    let filters = params.normalized();
    let mut conn = state.pool.get()?;

    let ranked = run_product_search(&mut conn, &filters)?;
    if filters.search.is_some() {
        record_search(
            &mut conn,
            user.as_ref().map(|u| u.id),
            &client_ip,
            &filters,
            "product",
            ranked.len() as i32,
        )?;
    }

    let page = paginate(ranked, filters.page, state.config.page_size);
    let names = {
        let country_ids: Vec<i32> = page.iter().map(|(p, _)| p.country_id).collect();
        let state_ids: Vec<i32> = page.iter().map(|(p, _)| p.state_id).collect();
        let city_ids: Vec<i32> = page.iter().map(|(p, _)| p.city_id).collect();
        let category_ids: Vec<i32> = page.iter().map(|(p, _)| p.category_id).collect();
        display_names(&mut conn, &country_ids, &state_ids, &city_ids, &category_ids)?
    };
    Ok(Json(
        page.into_iter()
            .map(|(p, s)| ProductView::build(p, s, &names))
            .collect(),
    ))
}

/// Product detail. Unpublished products are only visible to their owner;
/// every successful read bumps the view counter.
pub async fn get_product(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(product_id): Path<i32>,
) -> Result<Json<ProductView>, ApiError> {
    let mut conn = state.pool.get()?;
    let product = load_product(&mut conn, product_id)?;

    let is_owner = user.as_ref().map(|u| u.id) == Some(product.user_id);
    if product.status != ListingStatus::Published.as_str() && !is_owner {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }

    diesel::update(products::table.find(product_id))
        .set(products::views_count.eq(products::views_count + 1))
        .execute(&mut conn)?;

    let product = load_product(&mut conn, product_id)?;
    Ok(Json(single_view(&mut conn, product)?))
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub featured_image_url: Option<String>,
    #[serde(default)]
    pub gallery_image_urls: Vec<String>,
    pub price_minor: i64,
    pub original_price_minor: Option<i64>,
    pub currency: Option<String>,
    #[serde(default = "default_true")]
    pub is_negotiable: bool,
    pub country_id: i32,
    pub state_id: i32,
    pub city_id: i32,
    pub address_details: Option<String>,
    pub category_id: i32,
    pub tags: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: Option<String>,
    pub provider_phone: String,
    pub provider_email: Option<String>,
    pub provider_whatsapp: Option<String>,
    #[serde(default)]
    pub promote: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Creates a product in `pending` status; it becomes visible once the
/// listing fee is verified as paid.
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateProductRequest>,
) -> Result<Json<ProductView>, ApiError> {
    let name = validate_listing_name(&req.name)?;
    validate_price_minor(req.price_minor)?;
    validate_phone(&req.provider_phone)?;
    let condition = match req.condition.as_deref() {
        None => "new".to_string(),
        Some(c) if CONDITIONS.contains(&c) => c.to_string(),
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "Unknown product condition: {other}"
            )))
        }
    };

    let mut conn = state.pool.get()?;
    validate_hierarchy(&mut conn, req.country_id, req.state_id, req.city_id)?;
    let currency = match req.currency {
        Some(c) if !c.trim().is_empty() => c.trim().to_uppercase(),
        _ => country_currency(&mut conn, req.country_id)?.unwrap_or_else(|| "NGN".to_string()),
    };

    let now = Utc::now();
    let new_product = NewProduct {
        user_id: user.id,
        slug: listing_slug(&name),
        name,
        description: req.description,
        featured_image_url: req.featured_image_url,
        gallery_image_urls: req.gallery_image_urls,
        price_minor: req.price_minor,
        original_price_minor: req.original_price_minor,
        currency,
        is_negotiable: req.is_negotiable,
        country_id: req.country_id,
        state_id: req.state_id,
        city_id: req.city_id,
        address_details: req.address_details,
        category_id: req.category_id,
        tags: req.tags,
        brand: req.brand,
        model: req.model,
        condition,
        status: ListingStatus::Pending.as_str().to_string(),
        provider_phone: req.provider_phone,
        provider_email: req.provider_email,
        provider_whatsapp: req.provider_whatsapp,
        is_promoted: req.promote,
        promotion_fee_minor: DEFAULT_PROMOTION_FEE_MINOR,
        meta_title: req.meta_title,
        meta_description: req.meta_description,
        created_at: now,
        updated_at: now,
        expires_at: req.expires_at,
    };

    let product = diesel::insert_into(products::table)
        .values(&new_product)
        .get_result::<Product>(&mut conn)?;
    info!("user {} created product {} ({})", user.id, product.id, product.slug);
    Ok(Json(single_view(&mut conn, product)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub featured_image_url: Option<String>,
    pub gallery_image_urls: Option<Vec<String>>,
    pub price_minor: Option<i64>,
    pub original_price_minor: Option<i64>,
    pub is_negotiable: Option<bool>,
    pub address_details: Option<String>,
    pub tags: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: Option<String>,
    pub provider_phone: Option<String>,
    pub provider_email: Option<String>,
    pub provider_whatsapp: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
    user: AuthUser,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductView>, ApiError> {
    let name = req.name.as_deref().map(validate_listing_name).transpose()?;
    if let Some(price) = req.price_minor {
        validate_price_minor(price)?;
    }
    if let Some(phone) = &req.provider_phone {
        validate_phone(phone)?;
    }
    if let Some(condition) = &req.condition {
        if !CONDITIONS.contains(&condition.as_str()) {
            return Err(ApiError::Validation(format!(
                "Unknown product condition: {condition}"
            )));
        }
    }

    let mut conn = state.pool.get()?;
    load_owned_product(&mut conn, product_id, user.id)?;

    let changes = ProductChangeset {
        name,
        description: req.description,
        featured_image_url: req.featured_image_url,
        gallery_image_urls: req.gallery_image_urls,
        price_minor: req.price_minor,
        original_price_minor: req.original_price_minor,
        is_negotiable: req.is_negotiable,
        address_details: req.address_details,
        tags: req.tags,
        brand: req.brand,
        model: req.model,
        condition: req.condition,
        provider_phone: req.provider_phone,
        provider_email: req.provider_email,
        provider_whatsapp: req.provider_whatsapp,
        meta_title: req.meta_title,
        meta_description: req.meta_description,
        updated_at: Some(Utc::now()),
    };
    let product = diesel::update(products::table.find(product_id))
        .set(&changes)
        .get_result::<Product>(&mut conn)?;
    Ok(Json(single_view(&mut conn, product)?))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.pool.get()?;
    load_owned_product(&mut conn, product_id, user.id)?;
    diesel::delete(products::table.find(product_id)).execute(&mut conn)?;
    info!("user {} deleted product {}", user.id, product_id);
    Ok(Json(json!({ "deleted": true })))
}

/// All of the caller's products regardless of status.
pub async fn my_products(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ProductView>>, ApiError> {
    let mut conn = state.pool.get()?;
    let mut rows = products::table
        .filter(products::user_id.eq(user.id))
        .load::<Product>(&mut conn)?;
    rank(&mut rows);

    let ids: Vec<i32> = rows.iter().map(|p| p.id).collect();
    let summaries = product_rating_summaries(&mut conn, &ids)?;
    let country_ids: Vec<i32> = rows.iter().map(|p| p.country_id).collect();
    let state_ids: Vec<i32> = rows.iter().map(|p| p.state_id).collect();
    let city_ids: Vec<i32> = rows.iter().map(|p| p.city_id).collect();
    let category_ids: Vec<i32> = rows.iter().map(|p| p.category_id).collect();
    let names = display_names(&mut conn, &country_ids, &state_ids, &city_ids, &category_ids)?;

    Ok(Json(
        rows.into_iter()
            .map(|p| {
                let summary = summaries.get(&p.id).copied().unwrap_or(RatingSummary::EMPTY);
                ProductView::build(p, summary, &names)
            })
            .collect(),
    ))
}
