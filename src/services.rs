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
    listing_slug, validate_email, validate_listing_name, validate_phone, validate_price_minor,
    ListingStatus, NewService, Service, ServiceChangeset,
};
use crate::ratings::{service_rating_summaries, RatingSummary};
use crate::schema::services;
use crate::search::{paginate, rank, run_service_search, SearchParams};
use crate::AppState;

const EXPERIENCE_LEVELS: [&str; 5] = [
    "beginner",
    "intermediate",
    "experienced",
    "expert",
    "master",
];
const DEFAULT_PROMOTION_FEE_MINOR: i64 = 1000;
const PRICE_TYPES: [&str; 7] = [
    "fixed",
    "hourly",
    "daily",
    "weekly",
    "monthly",
    "project",
    "negotiable",
];

#[derive(Debug, Serialize)]
pub struct ServiceView {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub featured_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    pub country: String,
    pub state: String,
    pub city: String,
    pub serves_remote: bool,
    pub service_radius_km: Option<i32>,
    pub category: String,
    pub tags: Option<String>,
    pub provider_name: String,
    pub provider_title: Option<String>,
    pub provider_bio: Option<String>,
    pub provider_expertise: String,
    pub provider_experience: String,
    pub provider_certifications: Option<String>,
    pub provider_languages: Option<String>,
    pub provider_email: String,
    pub provider_phone: String,
    pub provider_whatsapp: Option<String>,
    pub provider_website: Option<String>,
    pub starting_price_minor: Option<i64>,
    pub max_price_minor: Option<i64>,
    pub currency: String,
    pub price_type: String,
    pub status: String,
    pub response_time: Option<String>,
    pub availability: Option<String>,
    pub is_paid: bool,
    pub is_promoted: bool,
    pub is_featured: bool,
    pub is_verified: bool,
    pub views_count: i32,
    pub contacts_count: i32,
    pub average_rating: Option<f64>,
    pub rating_count: i64,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ServiceView {
    pub fn build(s: Service, summary: RatingSummary, names: &DisplayNames) -> Self {
        ServiceView {
            country: names.country(s.country_id),
            state: names.state(s.state_id),
            city: names.city(s.city_id),
            category: names.category(s.category_id),
            id: s.id,
            user_id: s.user_id,
            name: s.name,
            slug: s.slug,
            description: s.description,
            featured_image_url: s.featured_image_url,
            gallery_image_urls: s.gallery_image_urls,
            serves_remote: s.serves_remote,
            service_radius_km: s.service_radius_km,
            tags: s.tags,
            provider_name: s.provider_name,
            provider_title: s.provider_title,
            provider_bio: s.provider_bio,
            provider_expertise: s.provider_expertise,
            provider_experience: s.provider_experience,
            provider_certifications: s.provider_certifications,
            provider_languages: s.provider_languages,
            provider_email: s.provider_email,
            provider_phone: s.provider_phone,
            provider_whatsapp: s.provider_whatsapp,
            provider_website: s.provider_website,
            starting_price_minor: s.starting_price_minor,
            max_price_minor: s.max_price_minor,
            currency: s.currency,
            price_type: s.price_type,
            status: s.status,
            response_time: s.response_time,
            availability: s.availability,
            is_paid: s.is_paid,
            is_promoted: s.is_promoted,
            is_featured: s.is_featured,
            is_verified: s.is_verified,
            views_count: s.views_count,
            contacts_count: s.contacts_count,
            average_rating: summary.average,
            rating_count: summary.count,
            created_at: s.created_at,
            published_at: s.published_at,
            expires_at: s.expires_at,
        }
    }
}

fn load_service(conn: &mut DbConnection, service_id: i32) -> Result<Service, ApiError> {
    services::table
        .find(service_id)
        .first::<Service>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Service not found".to_string()))
}

pub fn load_owned_service(
    conn: &mut DbConnection,
    service_id: i32,
    user_id: i32,
) -> Result<Service, ApiError> {
    let service = load_service(conn, service_id)?;
    if service.user_id != user_id {
        return Err(ApiError::Forbidden(
            "You do not have permission to modify this service".to_string(),
        ));
    }
    Ok(service)
}

fn single_view(conn: &mut DbConnection, service: Service) -> Result<ServiceView, ApiError> {
    let summary = service_rating_summaries(conn, &[service.id])?
        .remove(&service.id)
        .unwrap_or(RatingSummary::EMPTY);
    let names = display_names(
        conn,
        &[service.country_id],
        &[service.state_id],
        &[service.city_id],
        &[service.category_id],
    )?;
    Ok(ServiceView::build(service, summary, &names))
}

fn batch_views(
    conn: &mut DbConnection,
    items: Vec<(Service, RatingSummary)>,
) -> Result<Vec<ServiceView>, ApiError> {
    let country_ids: Vec<i32> = items.iter().map(|(s, _)| s.country_id).collect();
    let state_ids: Vec<i32> = items.iter().map(|(s, _)| s.state_id).collect();
    let city_ids: Vec<i32> = items.iter().map(|(s, _)| s.city_id).collect();
    let category_ids: Vec<i32> = items.iter().map(|(s, _)| s.category_id).collect();
    let names = display_names(conn, &country_ids, &state_ids, &city_ids, &category_ids)?;
    Ok(items
        .into_iter()
        .map(|(s, r)| ServiceView::build(s, r, &names))
        .collect())
}

pub async fn list_services(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    client_ip: ClientIp,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ServiceView>>, ApiError> {
    let filters = params.normalized();
    let mut conn = state.pool.get()?;

    let ranked = run_service_search(&mut conn, &filters)?;
    if filters.search.is_some() {
        record_search(
            &mut conn,
            user.as_ref().map(|u| u.id),
            &client_ip,
            &filters,
            "service",
            ranked.len() as i32,
        )?;
    }

    let page = paginate(ranked, filters.page, state.config.page_size);
    Ok(Json(batch_views(&mut conn, page)?))
}

pub async fn get_service(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(service_id): Path<i32>,
) -> Result<Json<ServiceView>, ApiError> {
    let mut conn = state.pool.get()?;
    let service = load_service(&mut conn, service_id)?;

    let is_owner = user.as_ref().map(|u| u.id) == Some(service.user_id);
    if service.status != ListingStatus::Published.as_str() && !is_owner {
        return Err(ApiError::NotFound("Service not found".to_string()));
    }

    diesel::update(services::table.find(service_id))
        .set(services::views_count.eq(services::views_count + 1))
        .execute(&mut conn)?;

    let service = load_service(&mut conn, service_id)?;
    Ok(Json(single_view(&mut conn, service)?))
}

/// Records that a caller asked for the provider's contact details.
pub async fn contact_service(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.pool.get()?;
    let service = load_service(&mut conn, service_id)?;
    diesel::update(services::table.find(service.id))
        .set(services::contacts_count.eq(services::contacts_count + 1))
        .execute(&mut conn)?;
    info!("user {} contacted service {}", user.id, service_id);
    Ok(Json(json!({ "detail": "Contact recorded" })))
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: String,
    pub featured_image_url: Option<String>,
    #[serde(default)]
    pub gallery_image_urls: Vec<String>,
    pub country_id: i32,
    pub state_id: i32,
    pub city_id: i32,
    #[serde(default)]
    pub serves_remote: bool,
    pub service_radius_km: Option<i32>,
    pub category_id: i32,
    pub tags: Option<String>,
    pub provider_name: String,
    pub provider_title: Option<String>,
    pub provider_bio: Option<String>,
    pub provider_expertise: String,
    pub provider_experience: Option<String>,
    pub provider_certifications: Option<String>,
    pub provider_languages: Option<String>,
    pub provider_email: String,
    pub provider_phone: String,
    pub provider_whatsapp: Option<String>,
    pub provider_website: Option<String>,
    pub starting_price_minor: Option<i64>,
    pub max_price_minor: Option<i64>,
    pub currency: Option<String>,
    pub price_type: Option<String>,
    pub response_time: Option<String>,
    pub availability: Option<String>,
    #[serde(default)]
    pub promote: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn validate_price_range(
    starting: Option<i64>,
    max: Option<i64>,
) -> Result<(), ApiError> {
    if let Some(price) = starting {
        validate_price_minor(price)?;
    }
    if let Some(price) = max {
        validate_price_minor(price)?;
    }
    if let (Some(starting), Some(max)) = (starting, max) {
        if max < starting {
            return Err(ApiError::Validation(
                "Maximum price cannot be below the starting price".to_string(),
            ));
        }
    }
    Ok(())
}

pub async fn create_service(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateServiceRequest>,
) -> Result<Json<ServiceView>, ApiError> {
    let name = validate_listing_name(&req.name)?;
    validate_phone(&req.provider_phone)?;
    let provider_email = validate_email(&req.provider_email)?;
    validate_price_range(req.starting_price_minor, req.max_price_minor)?;
    let provider_experience = match req.provider_experience.as_deref() {
        None => "beginner".to_string(),
        Some(level) if EXPERIENCE_LEVELS.contains(&level) => level.to_string(),
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "Unknown experience level: {other}"
            )))
        }
    };
    let price_type = match req.price_type.as_deref() {
        None => "negotiable".to_string(),
        Some(kind) if PRICE_TYPES.contains(&kind) => kind.to_string(),
        Some(other) => {
            return Err(ApiError::Validation(format!("Unknown price type: {other}")))
        }
    };

    let mut conn = state.pool.get()?;
    validate_hierarchy(&mut conn, req.country_id, req.state_id, req.city_id)?;
    let currency = match req.currency {
        Some(c) if !c.trim().is_empty() => c.trim().to_uppercase(),
        _ => country_currency(&mut conn, req.country_id)?.unwrap_or_else(|| "NGN".to_string()),
    };

    let now = Utc::now();
    let new_service = NewService {
        user_id: user.id,
        slug: listing_slug(&name),
        name,
        description: req.description,
        featured_image_url: req.featured_image_url,
        gallery_image_urls: req.gallery_image_urls,
        country_id: req.country_id,
        state_id: req.state_id,
        city_id: req.city_id,
        serves_remote: req.serves_remote,
        service_radius_km: req.service_radius_km,
        category_id: req.category_id,
        tags: req.tags,
        provider_name: req.provider_name,
        provider_title: req.provider_title,
        provider_bio: req.provider_bio,
        provider_expertise: req.provider_expertise,
        provider_experience,
        provider_certifications: req.provider_certifications,
        provider_languages: req.provider_languages,
        provider_email,
        provider_phone: req.provider_phone,
        provider_whatsapp: req.provider_whatsapp,
        provider_website: req.provider_website,
        starting_price_minor: req.starting_price_minor,
        max_price_minor: req.max_price_minor,
        currency,
        price_type,
        status: ListingStatus::Pending.as_str().to_string(),
        response_time: req.response_time,
        availability: req.availability,
        is_promoted: req.promote,
        promotion_fee_minor: DEFAULT_PROMOTION_FEE_MINOR,
        meta_title: req.meta_title,
        meta_description: req.meta_description,
        created_at: now,
        updated_at: now,
        expires_at: req.expires_at,
    };

    let service = diesel::insert_into(services::table)
        .values(&new_service)
        .get_result::<Service>(&mut conn)?;
    info!("user {} created service {} ({})", user.id, service.id, service.slug);
    Ok(Json(single_view(&mut conn, service)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub featured_image_url: Option<String>,
    pub gallery_image_urls: Option<Vec<String>>,
    pub serves_remote: Option<bool>,
    pub service_radius_km: Option<i32>,
    pub tags: Option<String>,
    pub provider_name: Option<String>,
    pub provider_title: Option<String>,
    pub provider_bio: Option<String>,
    pub provider_expertise: Option<String>,
    pub provider_experience: Option<String>,
    pub provider_certifications: Option<String>,
    pub provider_languages: Option<String>,
    pub provider_email: Option<String>,
    pub provider_phone: Option<String>,
    pub provider_whatsapp: Option<String>,
    pub provider_website: Option<String>,
    pub starting_price_minor: Option<i64>,
    pub max_price_minor: Option<i64>,
    pub price_type: Option<String>,
    pub response_time: Option<String>,
    pub availability: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
    user: AuthUser,
    Json(req): Json<UpdateServiceRequest>,
) -> Result<Json<ServiceView>, ApiError> {
    let name = req.name.as_deref().map(validate_listing_name).transpose()?;
    if let Some(phone) = &req.provider_phone {
        validate_phone(phone)?;
    }
    let provider_email = req.provider_email.as_deref().map(validate_email).transpose()?;
    if let Some(level) = &req.provider_experience {
        if !EXPERIENCE_LEVELS.contains(&level.as_str()) {
            return Err(ApiError::Validation(format!(
                "Unknown experience level: {level}"
            )));
        }
    }
    if let Some(kind) = &req.price_type {
        if !PRICE_TYPES.contains(&kind.as_str()) {
            return Err(ApiError::Validation(format!("Unknown price type: {kind}")));
        }
    }

    let mut conn = state.pool.get()?;
    let current = load_owned_service(&mut conn, service_id, user.id)?;
    validate_price_range(
        req.starting_price_minor.or(current.starting_price_minor),
        req.max_price_minor.or(current.max_price_minor),
    )?;

    let changes = ServiceChangeset {
        name,
        description: req.description,
        featured_image_url: req.featured_image_url,
        gallery_image_urls: req.gallery_image_urls,
        serves_remote: req.serves_remote,
        service_radius_km: req.service_radius_km,
        tags: req.tags,
        provider_name: req.provider_name,
        provider_title: req.provider_title,
        provider_bio: req.provider_bio,
        provider_expertise: req.provider_expertise,
        provider_experience: req.provider_experience,
        provider_certifications: req.provider_certifications,
        provider_languages: req.provider_languages,
        provider_email,
        provider_phone: req.provider_phone,
        provider_whatsapp: req.provider_whatsapp,
        provider_website: req.provider_website,
        starting_price_minor: req.starting_price_minor,
        max_price_minor: req.max_price_minor,
        price_type: req.price_type,
        response_time: req.response_time,
        availability: req.availability,
        meta_title: req.meta_title,
        meta_description: req.meta_description,
        updated_at: Some(Utc::now()),
    };
    let service = diesel::update(services::table.find(service_id))
        .set(&changes)
        .get_result::<Service>(&mut conn)?;
    Ok(Json(single_view(&mut conn, service)?))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.pool.get()?;
    load_owned_service(&mut conn, service_id, user.id)?;
    diesel::delete(services::table.find(service_id)).execute(&mut conn)?;
    info!("user {} deleted service {}", user.id, service_id);
    Ok(Json(json!({ "deleted": true })))
}

pub async fn my_services(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ServiceView>>, ApiError> {
    let mut conn = state.pool.get()?;
    let mut rows = services::table
        .filter(services::user_id.eq(user.id))
        .load::<Service>(&mut conn)?;
    rank(&mut rows);

    let ids: Vec<i32> = rows.iter().map(|s| s.id).collect();
    let summaries = service_rating_summaries(&mut conn, &ids)?;
    let items: Vec<(Service, RatingSummary)> = rows
        .into_iter()
        .map(|s| {
            let summary = summaries.get(&s.id).copied().unwrap_or(RatingSummary::EMPTY);
            (s, summary)
        })
        .collect();
    Ok(Json(batch_views(&mut conn, items)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_range_rejects_inverted_bounds() {
        assert!(validate_price_range(Some(5_000), Some(2_000)).is_err());
        assert!(validate_price_range(Some(2_000), Some(5_000)).is_ok());
        assert!(validate_price_range(Some(2_000), None).is_ok());
        assert!(validate_price_range(None, None).is_ok());
    }

    #[test]
    fn price_range_rejects_non_positive_values() {
        assert!(validate_price_range(Some(0), None).is_err());
        assert!(validate_price_range(None, Some(-1)).is_err());
    }
}
