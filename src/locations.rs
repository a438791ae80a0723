use axum::extract::{Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::db::DbConnection;
use crate::error::ApiError;
use crate::models::{City, Country, NewLocationCacheEntry, State as StateRow};
use crate::schema::{categories, cities, countries, location_cache, states};
use crate::AppState;

const COUNTRIES_CACHE_KEY: &str = "countries_active";
const CACHE_TTL_HOURS: i64 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct CountrySummary {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub flag_emoji: Option<String>,
    pub phone_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StateSummary {
    pub id: i32,
    pub name: String,
    pub code: Option<String>,
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct CitySummary {
    pub id: i32,
    pub name: String,
    pub is_capital: bool,
    pub is_major_city: bool,
}

/// Reads a non-expired entry from the memoization table.
pub fn cache_get(
    conn: &mut DbConnection,
    key: &str,
) -> Result<Option<serde_json::Value>, ApiError> {
    let entry = location_cache::table
        .filter(location_cache::cache_key.eq(key))
        .filter(location_cache::expires_at.gt(Utc::now()))
        .select(location_cache::cache_data)
        .first::<serde_json::Value>(conn)
        .optional()?;
    Ok(entry)
}

/// Writes (or overwrites) a cache entry. Stale rows are replaced in place,
/// never reaped.
pub fn cache_put(
    conn: &mut DbConnection,
    key: &str,
    data: serde_json::Value,
    ttl_hours: i64,
) -> Result<(), ApiError> {
    let now = Utc::now();
    let entry = NewLocationCacheEntry {
        cache_key: key.to_string(),
        cache_data: data,
        expires_at: now + Duration::hours(ttl_hours),
        created_at: now,
    };
    diesel::insert_into(location_cache::table)
        .values(&entry)
        .on_conflict(location_cache::cache_key)
        .do_update()
        .set((
            location_cache::cache_data.eq(&entry.cache_data),
            location_cache::expires_at.eq(entry.expires_at),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn active_countries(conn: &mut DbConnection) -> Result<Vec<CountrySummary>, ApiError> {
    if let Some(cached) = cache_get(conn, COUNTRIES_CACHE_KEY)? {
        if let Ok(parsed) = serde_json::from_value::<Vec<CountrySummary>>(cached) {
            return Ok(parsed);
        }
    }

    let rows = countries::table
        .filter(countries::is_active.eq(true))
        .order((countries::sort_order.asc(), countries::name.asc()))
        .load::<Country>(conn)?;
    let summaries: Vec<CountrySummary> = rows
        .into_iter()
        .map(|c| CountrySummary {
            id: c.id,
            name: c.name,
            code: c.code,
            flag_emoji: c.flag_emoji,
            phone_code: c.phone_code,
        })
        .collect();

    cache_put(
        conn,
        COUNTRIES_CACHE_KEY,
        serde_json::to_value(&summaries).unwrap_or_else(|_| json!([])),
        CACHE_TTL_HOURS,
    )?;
    Ok(summaries)
}

pub async fn list_countries(
    State(state): State<AppState>,
) -> Result<Json<Vec<CountrySummary>>, ApiError> {
    let mut conn = state.pool.get()?;
    Ok(Json(active_countries(&mut conn)?))
}

#[derive(Debug, Deserialize)]
pub struct StatesQuery {
    pub country: i32,
}

pub async fn list_states(
    State(state): State<AppState>,
    Query(query): Query<StatesQuery>,
) -> Result<Json<Vec<StateSummary>>, ApiError> {
    let mut conn = state.pool.get()?;
    let rows = states::table
        .filter(states::country_id.eq(query.country))
        .filter(states::is_active.eq(true))
        .order((states::sort_order.asc(), states::name.asc()))
        .load::<StateRow>(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|s| StateSummary {
                id: s.id,
                name: s.name,
                code: s.code,
                kind: s.kind,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CitiesQuery {
    pub state: i32,
}

pub async fn list_cities(
    State(state): State<AppState>,
    Query(query): Query<CitiesQuery>,
) -> Result<Json<Vec<CitySummary>>, ApiError> {
    let mut conn = state.pool.get()?;
    let rows = cities::table
        .filter(cities::state_id.eq(query.state))
        .filter(cities::is_active.eq(true))
        .order((cities::sort_order.asc(), cities::name.asc()))
        .load::<City>(&mut conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|c| CitySummary {
                id: c.id,
                name: c.name,
                is_capital: c.is_capital,
                is_major_city: c.is_major_city,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct HierarchyQuery {
    pub city_id: Option<i32>,
    pub state_id: Option<i32>,
    pub country_id: Option<i32>,
}

/// Resolves the most specific location supplied into its full chain.
pub async fn location_hierarchy(
    State(state): State<AppState>,
    Query(query): Query<HierarchyQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.pool.get()?;

    if let Some(city_id) = query.city_id {
        let city = cities::table
            .filter(cities::id.eq(city_id))
            .filter(cities::is_active.eq(true))
            .first::<City>(&mut conn)
            .optional()?;
        if let Some(city) = city {
            let parent_state = states::table.find(city.state_id).first::<StateRow>(&mut conn)?;
            let country = countries::table
                .find(city.country_id)
                .first::<Country>(&mut conn)?;
            return Ok(Json(json!({
                "country": { "id": country.id, "name": country.name, "code": country.code },
                "state": { "id": parent_state.id, "name": parent_state.name, "code": parent_state.code },
                "city": { "id": city.id, "name": city.name },
            })));
        }
    }

    if let Some(state_id) = query.state_id {
        let row = states::table
            .filter(states::id.eq(state_id))
            .filter(states::is_active.eq(true))
            .first::<StateRow>(&mut conn)
            .optional()?;
        if let Some(row) = row {
            let country = countries::table
                .find(row.country_id)
                .first::<Country>(&mut conn)?;
            return Ok(Json(json!({
                "country": { "id": country.id, "name": country.name, "code": country.code },
                "state": { "id": row.id, "name": row.name, "code": row.code },
                "city": null,
            })));
        }
    }

    if let Some(country_id) = query.country_id {
        let country = countries::table
            .filter(countries::id.eq(country_id))
            .filter(countries::is_active.eq(true))
            .first::<Country>(&mut conn)
            .optional()?;
        if let Some(country) = country {
            return Ok(Json(json!({
                "country": { "id": country.id, "name": country.name, "code": country.code },
                "state": null,
                "city": null,
            })));
        }
    }

    Err(ApiError::NotFound("No valid location found".to_string()))
}

/// Checks that the city belongs to the state and the state to the country.
/// Listing writes call this before persisting the FK chain.
pub fn validate_hierarchy(
    conn: &mut DbConnection,
    country_id: i32,
    state_id: i32,
    city_id: i32,
) -> Result<(), ApiError> {
    let matched = cities::table
        .inner_join(states::table)
        .filter(cities::id.eq(city_id))
        .filter(cities::state_id.eq(state_id))
        .filter(cities::country_id.eq(country_id))
        .filter(cities::is_active.eq(true))
        .filter(states::country_id.eq(country_id))
        .filter(states::is_active.eq(true))
        .count()
        .get_result::<i64>(conn)?;
    if matched == 0 {
        info!(
            "rejected location chain country={} state={} city={}",
            country_id, state_id, city_id
        );
        return Err(ApiError::Validation("Invalid location hierarchy".to_string()));
    }
    Ok(())
}

/// Looks up the ISO currency code for a country, used to default a new
/// listing's currency.
pub fn country_currency(conn: &mut DbConnection, country_id: i32) -> Result<Option<String>, ApiError> {
    let code = countries::table
        .find(country_id)
        .select(countries::currency_code)
        .first::<Option<String>>(conn)
        .optional()?
        .flatten();
    Ok(code)
}

/// Batch id→name maps for building listing responses without per-row joins.
#[derive(Debug, Default)]
pub struct DisplayNames {
    pub countries: HashMap<i32, String>,
    pub states: HashMap<i32, String>,
    pub cities: HashMap<i32, String>,
    pub categories: HashMap<i32, String>,
}

impl DisplayNames {
    pub fn country(&self, id: i32) -> String {
        self.countries.get(&id).cloned().unwrap_or_default()
    }

    pub fn state(&self, id: i32) -> String {
        self.states.get(&id).cloned().unwrap_or_default()
    }

    pub fn city(&self, id: i32) -> String {
        self.cities.get(&id).cloned().unwrap_or_default()
    }

    pub fn category(&self, id: i32) -> String {
        self.categories.get(&id).cloned().unwrap_or_default()
    }
}

pub fn display_names(
    conn: &mut DbConnection,
    country_ids: &[i32],
    state_ids: &[i32],
    city_ids: &[i32],
    category_ids: &[i32],
) -> Result<DisplayNames, ApiError> {
    let countries_map = countries::table
        .filter(countries::id.eq_any(country_ids))
        .select((countries::id, countries::name))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .collect();
    let states_map = states::table
        .filter(states::id.eq_any(state_ids))
        .select((states::id, states::name))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .collect();
    let cities_map = cities::table
        .filter(cities::id.eq_any(city_ids))
        .select((cities::id, cities::name))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .collect();
    let categories_map = categories::table
        .filter(categories::id.eq_any(category_ids))
        .select((categories::id, categories::name))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .collect();
    Ok(DisplayNames {
        countries: countries_map,
        states: states_map,
        cities: cities_map,
        categories: categories_map,
    })
}
