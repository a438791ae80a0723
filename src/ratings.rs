use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::auth::AuthUser;
use crate::db::DbConnection;
use crate::error::ApiError;
use crate::models::{
    NewProductRating, NewServiceRating, ProductRating, ProductRatingChangeset, ServiceRating,
    ServiceRatingChangeset,
};
use crate::schema::{product_ratings, products, service_ratings, services};
use crate::AppState;

/// Aggregate over a listing's active ratings. `average: None` is the
/// "no ratings yet" sentinel and is distinct from an average of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
}

impl RatingSummary {
    pub const EMPTY: RatingSummary = RatingSummary {
        average: None,
        count: 0,
    };

    /// True when the listing clears a minimum-rating filter. Unrated
    /// listings never clear a threshold.
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.average.map_or(false, |avg| avg >= threshold)
    }
}

/// Arithmetic mean rounded to one decimal place, recomputed on every read.
pub fn summarize(scores: &[f64]) -> RatingSummary {
    if scores.is_empty() {
        return RatingSummary::EMPTY;
    }
    let sum: f64 = scores.iter().sum();
    let average = (sum / scores.len() as f64 * 10.0).round() / 10.0;
    RatingSummary {
        average: Some(average),
        count: scores.len() as i64,
    }
}

/// Groups (listing id, score) pairs into per-listing summaries.
pub fn summaries_by_listing(pairs: &[(i32, f64)]) -> HashMap<i32, RatingSummary> {
    let mut grouped: HashMap<i32, Vec<f64>> = HashMap::new();
    for (listing_id, score) in pairs {
        grouped.entry(*listing_id).or_default().push(*score);
    }
    grouped
        .into_iter()
        .map(|(listing_id, scores)| (listing_id, summarize(&scores)))
        .collect()
}

pub fn product_rating_summaries(
    conn: &mut DbConnection,
    product_ids: &[i32],
) -> Result<HashMap<i32, RatingSummary>, ApiError> {
    let pairs = product_ratings::table
        .filter(product_ratings::product_id.eq_any(product_ids))
        .filter(product_ratings::is_active.eq(true))
        .select((product_ratings::product_id, product_ratings::rating))
        .load::<(i32, f64)>(conn)?;
    Ok(summaries_by_listing(&pairs))
}

pub fn service_rating_summaries(
    conn: &mut DbConnection,
    service_ids: &[i32],
) -> Result<HashMap<i32, RatingSummary>, ApiError> {
    let pairs = service_ratings::table
        .filter(service_ratings::service_id.eq_any(service_ids))
        .filter(service_ratings::is_active.eq(true))
        .select((service_ratings::service_id, service_ratings::rating))
        .load::<(i32, f64)>(conn)?;
    Ok(summaries_by_listing(&pairs))
}

/// Ratings are half-point steps between 1.0 and 5.0 inclusive.
pub fn validate_rating_value(value: f64) -> Result<(), ApiError> {
    if !(1.0..=5.0).contains(&value) {
        return Err(ApiError::Validation(
            "Rating must be between 1.0 and 5.0".to_string(),
        ));
    }
    let doubled = value * 2.0;
    if (doubled - doubled.round()).abs() > f64::EPSILON {
        return Err(ApiError::Validation(
            "Rating must be in half-point steps".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ProductRatingRequest {
    pub rating: f64,
    pub review_title: Option<String>,
    pub review: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    #[serde(default = "default_true")]
    pub would_recommend: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServiceRatingRequest {
    pub rating: f64,
    pub review_title: Option<String>,
    pub review: Option<String>,
    pub communication_rating: Option<f64>,
    pub quality_rating: Option<f64>,
    pub timeliness_rating: Option<f64>,
    #[serde(default = "default_true")]
    pub would_recommend: bool,
    #[serde(default = "default_true")]
    pub would_hire_again: bool,
}

fn default_true() -> bool {
    true
}

pub async fn list_product_ratings(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
) -> Result<Json<Vec<ProductRating>>, ApiError> {
    let mut conn = state.pool.get()?;
    let rows = product_ratings::table
        .filter(product_ratings::product_id.eq(product_id))
        .filter(product_ratings::is_active.eq(true))
        .order(product_ratings::created_at.desc())
        .load::<ProductRating>(&mut conn)?;
    Ok(Json(rows))
}

/// Submits or replaces the caller's rating for a product. One row per
/// (user, product); a resubmission overwrites the previous fields in place.
pub async fn submit_product_rating(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
    user: AuthUser,
    Json(req): Json<ProductRatingRequest>,
) -> Result<Json<ProductRating>, ApiError> {
    validate_rating_value(req.rating)?;
    let mut conn = state.pool.get()?;
    let now = Utc::now();

    let saved = conn.transaction::<_, ApiError, _>(|conn| {
        let exists = products::table
            .filter(products::id.eq(product_id))
            .count()
            .get_result::<i64>(conn)?;
        if exists == 0 {
            return Err(ApiError::NotFound("Product not found".to_string()));
        }

        let new_rating = NewProductRating {
            product_id,
            user_id: user.id,
            rating: req.rating,
            review_title: req.review_title.clone(),
            review: req.review.clone(),
            pros: req.pros.clone(),
            cons: req.cons.clone(),
            would_recommend: req.would_recommend,
            created_at: now,
            updated_at: now,
        };
        let replacement = ProductRatingChangeset {
            rating: req.rating,
            review_title: req.review_title.clone(),
            review: req.review.clone(),
            pros: req.pros.clone(),
            cons: req.cons.clone(),
            would_recommend: req.would_recommend,
            updated_at: now,
        };
        diesel::insert_into(product_ratings::table)
            .values(&new_rating)
            .on_conflict((product_ratings::product_id, product_ratings::user_id))
            .do_update()
            .set(&replacement)
            .execute(conn)?;

        Ok(product_ratings::table
            .filter(product_ratings::product_id.eq(product_id))
            .filter(product_ratings::user_id.eq(user.id))
            .first::<ProductRating>(conn)?)
    })?;

    info!("user {} rated product {}: {}", user.id, product_id, req.rating);
    Ok(Json(saved))
}

pub async fn list_service_ratings(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> Result<Json<Vec<ServiceRating>>, ApiError> {
    let mut conn = state.pool.get()?;
    let rows = service_ratings::table
        .filter(service_ratings::service_id.eq(service_id))
        .filter(service_ratings::is_active.eq(true))
        .order(service_ratings::created_at.desc())
        .load::<ServiceRating>(&mut conn)?;
    Ok(Json(rows))
}

pub async fn submit_service_rating(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
    user: AuthUser,
    Json(req): Json<ServiceRatingRequest>,
) -> Result<Json<ServiceRating>, ApiError> {
    validate_rating_value(req.rating)?;
    for sub in [
        req.communication_rating,
        req.quality_rating,
        req.timeliness_rating,
    ]
    .into_iter()
    .flatten()
    {
        validate_rating_value(sub)?;
    }
    let mut conn = state.pool.get()?;
    let now = Utc::now();

    let saved = conn.transaction::<_, ApiError, _>(|conn| {
        let exists = services::table
            .filter(services::id.eq(service_id))
            .count()
            .get_result::<i64>(conn)?;
        if exists == 0 {
            return Err(ApiError::NotFound("Service not found".to_string()));
        }

        let new_rating = NewServiceRating {
            service_id,
            user_id: user.id,
            rating: req.rating,
            review_title: req.review_title.clone(),
            review: req.review.clone(),
            communication_rating: req.communication_rating,
            quality_rating: req.quality_rating,
            timeliness_rating: req.timeliness_rating,
            would_recommend: req.would_recommend,
            would_hire_again: req.would_hire_again,
            created_at: now,
            updated_at: now,
        };
        let replacement = ServiceRatingChangeset {
            rating: req.rating,
            review_title: req.review_title.clone(),
            review: req.review.clone(),
            communication_rating: req.communication_rating,
            quality_rating: req.quality_rating,
            timeliness_rating: req.timeliness_rating,
            would_recommend: req.would_recommend,
            would_hire_again: req.would_hire_again,
            updated_at: now,
        };
        diesel::insert_into(service_ratings::table)
            .values(&new_rating)
            .on_conflict((service_ratings::service_id, service_ratings::user_id))
            .do_update()
            .set(&replacement)
            .execute(conn)?;

        Ok(service_ratings::table
            .filter(service_ratings::service_id.eq(service_id))
            .filter(service_ratings::user_id.eq(user.id))
            .first::<ServiceRating>(conn)?)
    })?;

    info!("user {} rated service {}: {}", user.id, service_id, req.rating);
    Ok(Json(saved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_three_four_five_is_exactly_four() {
        let summary = summarize(&[3.0, 4.0, 5.0]);
        assert_eq!(summary.average, Some(4.0));
        assert_eq!(summary.count, 3);
    }

    #[test]
    fn no_ratings_yields_the_sentinel_not_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.average, None);
        assert_eq!(summary.count, 0);
        assert_ne!(summary.average, Some(0.0));
    }

    #[test]
    fn threshold_excludes_just_below_and_includes_exact() {
        let below = summarize(&[3.9]);
        let exact = summarize(&[4.0]);
        assert!(!below.meets_threshold(4.0));
        assert!(exact.meets_threshold(4.0));
    }

    #[test]
    fn unrated_listing_never_meets_a_threshold() {
        assert!(!RatingSummary::EMPTY.meets_threshold(0.5));
        assert!(!RatingSummary::EMPTY.meets_threshold(5.0));
    }

    #[test]
    fn summaries_group_by_listing() {
        let pairs = vec![(1, 4.0), (1, 5.0), (2, 2.0)];
        let summaries = summaries_by_listing(&pairs);
        assert_eq!(summaries[&1].average, Some(4.5));
        assert_eq!(summaries[&1].count, 2);
        assert_eq!(summaries[&2].average, Some(2.0));
    }

    #[test]
    fn rating_values_outside_range_are_rejected() {
        assert!(validate_rating_value(0.5).is_err());
        assert!(validate_rating_value(5.5).is_err());
        assert!(validate_rating_value(1.0).is_ok());
        assert!(validate_rating_value(5.0).is_ok());
    }

    #[test]
    fn rating_values_off_the_half_step_grid_are_rejected() {
        assert!(validate_rating_value(3.7).is_err());
        assert!(validate_rating_value(3.5).is_ok());
    }
}
