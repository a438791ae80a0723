use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::Json;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::db::DbConnection;
use crate::error::ApiError;
use crate::models::NewSearchRecord;
use crate::schema::search_history;
use crate::search::SearchFilters;
use crate::AppState;

/// Caller address for anonymous search attribution: first X-Forwarded-For
/// hop when present, else the peer socket address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

pub fn first_forwarded_hop(header: &str) -> Option<String> {
    header
        .split(',')
        .next()
        .map(|hop| hop.trim().to_string())
        .filter(|hop| !hop.is_empty())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(first_forwarded_hop);
        if forwarded.is_some() {
            return Ok(ClientIp(forwarded));
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());
        Ok(ClientIp(peer))
    }
}

/// Appends one row to the search log. Append-only: nothing in this service
/// ever updates or deletes history rows.
pub fn record_search(
    conn: &mut DbConnection,
    user_id: Option<i32>,
    client_ip: &ClientIp,
    filters: &SearchFilters,
    search_type: &str,
    results_count: i32,
) -> Result<(), ApiError> {
    let record = NewSearchRecord {
        user_id,
        search_term: filters.search.clone().unwrap_or_default(),
        category: filters.category.clone(),
        country: filters.country.clone(),
        state: filters.state.clone(),
        city: filters.city.clone(),
        search_type: search_type.to_string(),
        results_count,
        ip_address: client_ip.0.clone(),
        created_at: Utc::now(),
    };
    diesel::insert_into(search_history::table)
        .values(&record)
        .execute(conn)?;
    Ok(())
}

#[derive(Debug, PartialEq, Serialize)]
pub struct TrendingTerm {
    pub search_term: String,
    pub search_count: i64,
    pub avg_results: f64,
}

/// Repeated terms with a positive average result count, most searched
/// first; ties broken alphabetically so the output is stable.
pub fn trending_terms(rows: &[(String, i32)], limit: usize) -> Vec<TrendingTerm> {
    let mut grouped: HashMap<&str, (i64, i64)> = HashMap::new();
    for (term, results) in rows {
        let entry = grouped.entry(term.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += *results as i64;
    }

    let mut trending: Vec<TrendingTerm> = grouped
        .into_iter()
        .filter(|(_, (count, total_results))| *count > 1 && *total_results > 0)
        .map(|(term, (count, total_results))| TrendingTerm {
            search_term: term.to_string(),
            search_count: count,
            avg_results: total_results as f64 / count as f64,
        })
        .collect();
    trending.sort_by(|a, b| {
        b.search_count
            .cmp(&a.search_count)
            .then_with(|| a.search_term.cmp(&b.search_term))
    });
    trending.truncate(limit);
    trending
}

const TRENDING_LIMIT: usize = 20;

/// Trending search terms over the last seven days.
pub async fn trending_searches(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.pool.get()?;
    let week_ago = Utc::now() - Duration::days(7);
    let rows = search_history::table
        .filter(search_history::created_at.ge(week_ago))
        .filter(search_history::search_term.ne(""))
        .select((search_history::search_term, search_history::results_count))
        .load::<(String, i32)>(&mut conn)?;
    let trending = trending_terms(&rows, TRENDING_LIMIT);
    Ok(Json(json!({
        "trending_searches": trending,
        "period": "7 days",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_takes_the_first_hop() {
        assert_eq!(
            first_forwarded_hop("203.0.113.9, 10.0.0.1"),
            Some("203.0.113.9".to_string())
        );
        assert_eq!(first_forwarded_hop(""), None);
        assert_eq!(first_forwarded_hop(" , 10.0.0.1"), None);
    }

    #[test]
    fn trending_requires_repeats_and_results() {
        let rows = vec![
            ("phones".to_string(), 5),
            ("phones".to_string(), 3),
            ("plumber".to_string(), 2),
            ("ghost".to_string(), 0),
            ("ghost".to_string(), 0),
        ];
        let trending = trending_terms(&rows, 10);
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].search_term, "phones");
        assert_eq!(trending[0].search_count, 2);
        assert!((trending[0].avg_results - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn trending_orders_by_count_then_term() {
        let rows = vec![
            ("b".to_string(), 1),
            ("b".to_string(), 1),
            ("a".to_string(), 1),
            ("a".to_string(), 1),
            ("c".to_string(), 1),
            ("c".to_string(), 1),
            ("c".to_string(), 1),
        ];
        let trending = trending_terms(&rows, 2);
        let terms: Vec<&str> = trending.iter().map(|t| t.search_term.as_str()).collect();
        assert_eq!(terms, vec!["c", "a"]);
    }
}
