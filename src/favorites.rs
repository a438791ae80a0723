use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::Serialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::db::DbConnection;
use crate::error::ApiError;
use crate::models::{ItemType, NewUserFavorite, UserFavorite};
use crate::schema::{products, services, user_favorites};
use crate::AppState;

/// Toggles one (user, item_type, item_id) favorite. The unique constraint
/// plus `on_conflict_do_nothing` keeps the operation idempotent even when
/// two toggles race.
fn toggle(
    conn: &mut DbConnection,
    user_id: i32,
    item_type: ItemType,
    item_id: i32,
) -> Result<bool, ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        let exists = match item_type {
            ItemType::Product => products::table
                .filter(products::id.eq(item_id))
                .count()
                .get_result::<i64>(conn)?,
            ItemType::Service => services::table
                .filter(services::id.eq(item_id))
                .count()
                .get_result::<i64>(conn)?,
        };
        if exists == 0 {
            return Err(ApiError::NotFound(format!(
                "{} not found",
                match item_type {
                    ItemType::Product => "Product",
                    ItemType::Service => "Service",
                }
            )));
        }

        let removed = diesel::delete(
            user_favorites::table
                .filter(user_favorites::user_id.eq(user_id))
                .filter(user_favorites::item_type.eq(item_type.as_str()))
                .filter(user_favorites::item_id.eq(item_id)),
        )
        .execute(conn)?;

        let favorited = if removed == 0 {
            diesel::insert_into(user_favorites::table)
                .values(&NewUserFavorite {
                    user_id,
                    item_type: item_type.as_str().to_string(),
                    item_id,
                    created_at: Utc::now(),
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
            true
        } else {
            false
        };

        // Products carry a denormalized favorites counter.
        if item_type == ItemType::Product {
            let delta = if favorited { 1 } else { -1 };
            diesel::update(products::table.find(item_id))
                .set(products::favorites_count.eq(products::favorites_count + delta))
                .execute(conn)?;
        }

        Ok(favorited)
    })
}

pub async fn toggle_product_favorite(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.pool.get()?;
    let favorited = toggle(&mut conn, user.id, ItemType::Product, product_id)?;
    info!(
        "user {} {} product {}",
        user.id,
        if favorited { "favorited" } else { "unfavorited" },
        product_id
    );
    Ok(Json(json!({ "favorited": favorited })))
}

pub async fn toggle_service_favorite(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.pool.get()?;
    let favorited = toggle(&mut conn, user.id, ItemType::Service, service_id)?;
    Ok(Json(json!({ "favorited": favorited })))
}

#[derive(Debug, Serialize)]
pub struct FavoriteEntry {
    pub id: i32,
    pub item_type: String,
    pub item_id: i32,
    pub name: String,
    pub created_at: chrono::DateTime<Utc>,
}

/// The caller's favorites, newest first, with the listing name resolved.
pub async fn list_favorites(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<FavoriteEntry>>, ApiError> {
    let mut conn = state.pool.get()?;
    let rows = user_favorites::table
        .filter(user_favorites::user_id.eq(user.id))
        .order(user_favorites::created_at.desc())
        .load::<UserFavorite>(&mut conn)?;

    let product_ids: Vec<i32> = rows
        .iter()
        .filter(|f| f.item_type == ItemType::Product.as_str())
        .map(|f| f.item_id)
        .collect();
    let service_ids: Vec<i32> = rows
        .iter()
        .filter(|f| f.item_type == ItemType::Service.as_str())
        .map(|f| f.item_id)
        .collect();

    let product_names: std::collections::HashMap<i32, String> = products::table
        .filter(products::id.eq_any(&product_ids))
        .select((products::id, products::name))
        .load::<(i32, String)>(&mut conn)?
        .into_iter()
        .collect();
    let service_names: std::collections::HashMap<i32, String> = services::table
        .filter(services::id.eq_any(&service_ids))
        .select((services::id, services::name))
        .load::<(i32, String)>(&mut conn)?
        .into_iter()
        .collect();

    Ok(Json(
        rows.into_iter()
            .map(|f| {
                let name = if f.item_type == ItemType::Product.as_str() {
                    product_names.get(&f.item_id).cloned()
                } else {
                    service_names.get(&f.item_id).cloned()
                }
                .unwrap_or_default();
                FavoriteEntry {
                    id: f.id,
                    item_type: f.item_type,
                    item_id: f.item_id,
                    name,
                    created_at: f.created_at,
                }
            })
            .collect(),
    ))
}
