use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::auth::MaybeAuthUser;
use crate::db::DbConnection;
use crate::error::ApiError;
use crate::history::{record_search, ClientIp};
use crate::locations::{display_names, DisplayNames};
use crate::models::{ListingStatus, Product, Service};
use crate::products::ProductView;
use crate::ratings::{product_rating_summaries, service_rating_summaries, RatingSummary};
use crate::schema::{categories, cities, countries, products, services, states};
use crate::services::ServiceView;
use crate::AppState;

/// Raw query parameters accepted by every listing search endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub rating: Option<f64>,
    pub page: Option<i64>,
}

/// Normalized filter set: trimmed, with empty strings collapsed to "no
/// constraint" so `?country=` behaves like an absent parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub search: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub rating: Option<f64>,
    pub page: i64,
}

impl SearchParams {
    pub fn normalized(self) -> SearchFilters {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        SearchFilters {
            search: clean(self.search),
            category: clean(self.category),
            country: clean(self.country),
            state: clean(self.state),
            city: clean(self.city),
            rating: self.rating,
            page: self.page.unwrap_or(1).max(1),
        }
    }
}

/// Escapes ILIKE metacharacters so user input matches literally.
fn ilike_escape(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Case-insensitive substring pattern.
fn contains_pattern(term: &str) -> String {
    format!("%{}%", ilike_escape(term))
}

/// Case-insensitive exact-match pattern (ILIKE without wildcards).
fn exact_pattern(term: &str) -> String {
    ilike_escape(term)
}

/// Anything orderable by the public listing ranking.
pub trait Rankable {
    fn promoted(&self) -> bool;
    fn created(&self) -> DateTime<Utc>;
    fn row_id(&self) -> i32;
}

impl Rankable for Product {
    fn promoted(&self) -> bool {
        self.is_promoted
    }
    fn created(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn row_id(&self) -> i32 {
        self.id
    }
}

impl Rankable for Service {
    fn promoted(&self) -> bool {
        self.is_promoted
    }
    fn created(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn row_id(&self) -> i32 {
        self.id
    }
}

/// Deterministic public ordering: promoted listings first, then newest
/// first, with the id as a final tie-breaker.
pub fn rank<T: Rankable>(items: &mut [T]) {
    items.sort_by(|a, b| {
        b.promoted()
            .cmp(&a.promoted())
            .then_with(|| b.created().cmp(&a.created()))
            .then_with(|| b.row_id().cmp(&a.row_id()))
    });
}

/// One page of an already-ranked result set (1-based page numbers).
pub fn paginate<T>(items: Vec<T>, page: i64, per_page: i64) -> Vec<T> {
    let start = ((page - 1).max(0) * per_page) as usize;
    items.into_iter().skip(start).take(per_page as usize).collect()
}

/// Distinct facet values from both listing kinds, deduplicated and sorted.
pub fn merged_distinct(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    a.extend(b);
    a.sort();
    a.dedup();
    a
}

fn country_ids_matching(conn: &mut DbConnection, name: &str) -> Result<Vec<i32>, ApiError> {
    Ok(countries::table
        .filter(countries::name.ilike(exact_pattern(name)))
        .select(countries::id)
        .load::<i32>(conn)?)
}

fn state_ids_matching(conn: &mut DbConnection, name: &str) -> Result<Vec<i32>, ApiError> {
    Ok(states::table
        .filter(states::name.ilike(exact_pattern(name)))
        .select(states::id)
        .load::<i32>(conn)?)
}

fn city_ids_matching(conn: &mut DbConnection, name: &str) -> Result<Vec<i32>, ApiError> {
    Ok(cities::table
        .filter(cities::name.ilike(exact_pattern(name)))
        .select(cities::id)
        .load::<i32>(conn)?)
}

/// Location and category name filters resolved to id sets. An empty set
/// means the filter matched nothing and the search must return no rows.
struct ResolvedFilters {
    category_ids: Option<Vec<i32>>,
    country_ids: Option<Vec<i32>>,
    state_ids: Option<Vec<i32>>,
    city_ids: Option<Vec<i32>>,
}

fn resolve_filters(
    conn: &mut DbConnection,
    filters: &SearchFilters,
) -> Result<ResolvedFilters, ApiError> {
    let category_ids = match &filters.category {
        Some(name) => Some(
            crate::categories::resolve_category_filter(conn, name)?.unwrap_or_default(),
        ),
        None => None,
    };
    let country_ids = match &filters.country {
        Some(name) => Some(country_ids_matching(conn, name)?),
        None => None,
    };
    let state_ids = match &filters.state {
        Some(name) => Some(state_ids_matching(conn, name)?),
        None => None,
    };
    let city_ids = match &filters.city {
        Some(name) => Some(city_ids_matching(conn, name)?),
        None => None,
    };
    Ok(ResolvedFilters {
        category_ids,
        country_ids,
        state_ids,
        city_ids,
    })
}

/// Published products passing every SQL-expressible filter, unranked.
fn product_candidates(
    conn: &mut DbConnection,
    filters: &SearchFilters,
    resolved: &ResolvedFilters,
) -> Result<Vec<Product>, ApiError> {
    let mut query = products::table
        .filter(products::status.eq(ListingStatus::Published.as_str()))
        .filter(
            products::expires_at
                .is_null()
                .or(products::expires_at.gt(Utc::now())),
        )
        .into_boxed();

    if let Some(term) = &filters.search {
        let pattern = contains_pattern(term);
        query = query.filter(
            products::name
                .ilike(pattern.clone())
                .or(products::description.ilike(pattern.clone()))
                .or(products::brand.ilike(pattern)),
        );
    }
    if let Some(ids) = &resolved.category_ids {
        query = query.filter(products::category_id.eq_any(ids.clone()));
    }
    if let Some(ids) = &resolved.country_ids {
        query = query.filter(products::country_id.eq_any(ids.clone()));
    }
    if let Some(ids) = &resolved.state_ids {
        query = query.filter(products::state_id.eq_any(ids.clone()));
    }
    if let Some(ids) = &resolved.city_ids {
        query = query.filter(products::city_id.eq_any(ids.clone()));
    }

    Ok(query.load::<Product>(conn)?)
}

fn service_candidates(
    conn: &mut DbConnection,
    filters: &SearchFilters,
    resolved: &ResolvedFilters,
) -> Result<Vec<Service>, ApiError> {
    let mut query = services::table
        .filter(services::status.eq(ListingStatus::Published.as_str()))
        .filter(
            services::expires_at
                .is_null()
                .or(services::expires_at.gt(Utc::now())),
        )
        .into_boxed();

    if let Some(term) = &filters.search {
        let pattern = contains_pattern(term);
        query = query.filter(
            services::name
                .ilike(pattern.clone())
                .or(services::description.ilike(pattern.clone()))
                .or(services::provider_name.ilike(pattern)),
        );
    }
    if let Some(ids) = &resolved.category_ids {
        query = query.filter(services::category_id.eq_any(ids.clone()));
    }
    if let Some(ids) = &resolved.country_ids {
        query = query.filter(services::country_id.eq_any(ids.clone()));
    }
    if let Some(ids) = &resolved.state_ids {
        query = query.filter(services::state_id.eq_any(ids.clone()));
    }
    if let Some(ids) = &resolved.city_ids {
        query = query.filter(services::city_id.eq_any(ids.clone()));
    }

    Ok(query.load::<Service>(conn)?)
}

/// Filters by minimum average rating, then ranks. Returns the full ranked
/// set together with each listing's rating summary; callers paginate.
fn apply_rating_and_rank<T: Rankable>(
    mut items: Vec<T>,
    summaries: std::collections::HashMap<i32, RatingSummary>,
    min_rating: Option<f64>,
) -> Vec<(T, RatingSummary)> {
    if let Some(threshold) = min_rating {
        items.retain(|item| {
            summaries
                .get(&item.row_id())
                .copied()
                .unwrap_or(RatingSummary::EMPTY)
                .meets_threshold(threshold)
        });
    }
    rank(&mut items);
    items
        .into_iter()
        .map(|item| {
            let summary = summaries
                .get(&item.row_id())
                .copied()
                .unwrap_or(RatingSummary::EMPTY);
            (item, summary)
        })
        .collect()
}

pub fn run_product_search(
    conn: &mut DbConnection,
    filters: &SearchFilters,
) -> Result<Vec<(Product, RatingSummary)>, ApiError> {
    let resolved = resolve_filters(conn, filters)?;
    let candidates = product_candidates(conn, filters, &resolved)?;
    let ids: Vec<i32> = candidates.iter().map(|p| p.id).collect();
    let summaries = product_rating_summaries(conn, &ids)?;
    Ok(apply_rating_and_rank(candidates, summaries, filters.rating))
}

pub fn run_service_search(
    conn: &mut DbConnection,
    filters: &SearchFilters,
) -> Result<Vec<(Service, RatingSummary)>, ApiError> {
    let resolved = resolve_filters(conn, filters)?;
    let candidates = service_candidates(conn, filters, &resolved)?;
    let ids: Vec<i32> = candidates.iter().map(|s| s.id).collect();
    let summaries = service_rating_summaries(conn, &ids)?;
    Ok(apply_rating_and_rank(candidates, summaries, filters.rating))
}

/// Distinct category/location names observed across all listings; a faceted
/// search hint, not an index.
#[derive(Debug, Serialize)]
pub struct FilterOptions {
    pub categories: Vec<String>,
    pub countries: Vec<String>,
    pub states: Vec<String>,
    pub cities: Vec<String>,
}

pub fn filter_options(conn: &mut DbConnection) -> Result<FilterOptions, ApiError> {
    let product_categories = products::table
        .inner_join(categories::table)
        .select(categories::name)
        .distinct()
        .load::<String>(conn)?;
    let service_categories = services::table
        .inner_join(categories::table)
        .select(categories::name)
        .distinct()
        .load::<String>(conn)?;
    let product_countries = products::table
        .inner_join(countries::table)
        .select(countries::name)
        .distinct()
        .load::<String>(conn)?;
    let service_countries = services::table
        .inner_join(countries::table)
        .select(countries::name)
        .distinct()
        .load::<String>(conn)?;
    let product_states = products::table
        .inner_join(states::table)
        .select(states::name)
        .distinct()
        .load::<String>(conn)?;
    let service_states = services::table
        .inner_join(states::table)
        .select(states::name)
        .distinct()
        .load::<String>(conn)?;
    let product_cities = products::table
        .inner_join(cities::table)
        .select(cities::name)
        .distinct()
        .load::<String>(conn)?;
    let service_cities = services::table
        .inner_join(cities::table)
        .select(cities::name)
        .distinct()
        .load::<String>(conn)?;

    Ok(FilterOptions {
        categories: merged_distinct(product_categories, service_categories),
        countries: merged_distinct(product_countries, service_countries),
        states: merged_distinct(product_states, service_states),
        cities: merged_distinct(product_cities, service_cities),
    })
}

fn load_product_names(
    conn: &mut DbConnection,
    items: &[(Product, RatingSummary)],
) -> Result<DisplayNames, ApiError> {
    let country_ids: Vec<i32> = items.iter().map(|(p, _)| p.country_id).collect();
    let state_ids: Vec<i32> = items.iter().map(|(p, _)| p.state_id).collect();
    let city_ids: Vec<i32> = items.iter().map(|(p, _)| p.city_id).collect();
    let category_ids: Vec<i32> = items.iter().map(|(p, _)| p.category_id).collect();
    display_names(conn, &country_ids, &state_ids, &city_ids, &category_ids)
}

fn load_service_names(
    conn: &mut DbConnection,
    items: &[(Service, RatingSummary)],
) -> Result<DisplayNames, ApiError> {
    let country_ids: Vec<i32> = items.iter().map(|(s, _)| s.country_id).collect();
    let state_ids: Vec<i32> = items.iter().map(|(s, _)| s.state_id).collect();
    let city_ids: Vec<i32> = items.iter().map(|(s, _)| s.city_id).collect();
    let category_ids: Vec<i32> = items.iter().map(|(s, _)| s.category_id).collect();
    display_names(conn, &country_ids, &state_ids, &city_ids, &category_ids)
}

#[derive(Debug, Serialize)]
pub struct AppliedFilters {
    pub search: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub rating: Option<f64>,
}

impl From<&SearchFilters> for AppliedFilters {
    fn from(f: &SearchFilters) -> Self {
        AppliedFilters {
            search: f.search.clone(),
            category: f.category.clone(),
            country: f.country.clone(),
            state: f.state.clone(),
            city: f.city.clone(),
            rating: f.rating,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TotalResults {
    pub products: i64,
    pub services: i64,
}

#[derive(Debug, Serialize)]
pub struct HomePageResponse {
    pub promoted_products: Vec<ProductView>,
    pub promoted_services: Vec<ServiceView>,
    pub products: Vec<ProductView>,
    pub services: Vec<ServiceView>,
    pub filter_options: FilterOptions,
    pub applied_filters: AppliedFilters,
    pub total_results: TotalResults,
}

const PROMOTED_PREVIEW_LIMIT: usize = 10;

/// Composite home view: independently capped product and service result
/// sets, promoted previews, and facet metadata.
pub async fn home_page(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    client_ip: ClientIp,
    Query(params): Query<SearchParams>,
) -> Result<Json<HomePageResponse>, ApiError> {
    let filters = params.normalized();
    let mut conn = state.pool.get()?;
    let per_page = state.config.page_size;

    let ranked_products = run_product_search(&mut conn, &filters)?;
    let ranked_services = run_service_search(&mut conn, &filters)?;
    let total = TotalResults {
        products: ranked_products.len() as i64,
        services: ranked_services.len() as i64,
    };

    // Browsing the home page unfiltered is not a search; only record when a
    // term was supplied.
    if filters.search.is_some() {
        record_search(
            &mut conn,
            user.as_ref().map(|u| u.id),
            &client_ip,
            &filters,
            "both",
            (total.products + total.services) as i32,
        )?;
    }

    let product_names = load_product_names(&mut conn, &ranked_products)?;
    let service_names = load_service_names(&mut conn, &ranked_services)?;

    let promoted_products = ranked_products
        .iter()
        .filter(|(p, _)| p.is_promoted)
        .take(PROMOTED_PREVIEW_LIMIT)
        .map(|(p, s)| ProductView::build(p.clone(), *s, &product_names))
        .collect();
    let promoted_services = ranked_services
        .iter()
        .filter(|(s, _)| s.is_promoted)
        .take(PROMOTED_PREVIEW_LIMIT)
        .map(|(s, r)| ServiceView::build(s.clone(), *r, &service_names))
        .collect();

    let products_page = paginate(ranked_products, filters.page, per_page)
        .into_iter()
        .map(|(p, s)| ProductView::build(p, s, &product_names))
        .collect();
    let services_page = paginate(ranked_services, filters.page, per_page)
        .into_iter()
        .map(|(s, r)| ServiceView::build(s, r, &service_names))
        .collect();

    Ok(Json(HomePageResponse {
        promoted_products,
        promoted_services,
        products: products_page,
        services: services_page,
        filter_options: filter_options(&mut conn)?,
        applied_filters: AppliedFilters::from(&filters),
        total_results: total,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub rating: Option<f64>,
    pub page: Option<i64>,
    pub kind: Option<String>,
}

impl SearchQuery {
    fn into_params(self) -> (SearchParams, Option<String>) {
        let SearchQuery {
            search,
            category,
            country,
            state,
            city,
            rating,
            page,
            kind,
        } = self;
        (
            SearchParams {
                search,
                category,
                country,
                state,
                city,
                rating,
                page,
            },
            kind,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub products: Vec<ProductView>,
    pub services: Vec<ServiceView>,
    pub applied_filters: AppliedFilters,
    pub total_results: TotalResults,
}

/// Dedicated search endpoint; always appends to the search history, even
/// for filter-only searches.
pub async fn search_listings(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    client_ip: ClientIp,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let (params, kind) = query.into_params();
    let kind = match kind.as_deref() {
        None | Some("both") | Some("") => "both",
        Some("product") => "product",
        Some("service") => "service",
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "Unknown listing kind: {other}"
            )))
        }
    };
    let filters = params.normalized();
    let mut conn = state.pool.get()?;
    let per_page = state.config.page_size;

    let ranked_products = if kind != "service" {
        run_product_search(&mut conn, &filters)?
    } else {
        Vec::new()
    };
    let ranked_services = if kind != "product" {
        run_service_search(&mut conn, &filters)?
    } else {
        Vec::new()
    };
    let total = TotalResults {
        products: ranked_products.len() as i64,
        services: ranked_services.len() as i64,
    };

    record_search(
        &mut conn,
        user.as_ref().map(|u| u.id),
        &client_ip,
        &filters,
        kind,
        (total.products + total.services) as i32,
    )?;

    let product_names = load_product_names(&mut conn, &ranked_products)?;
    let service_names = load_service_names(&mut conn, &ranked_services)?;

    let products_page = paginate(ranked_products, filters.page, per_page)
        .into_iter()
        .map(|(p, s)| ProductView::build(p, s, &product_names))
        .collect();
    let services_page = paginate(ranked_services, filters.page, per_page)
        .into_iter()
        .map(|(s, r)| ServiceView::build(s, r, &service_names))
        .collect();

    Ok(Json(SearchResponse {
        products: products_page,
        services: services_page,
        applied_filters: AppliedFilters::from(&filters),
        total_results: total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq)]
    struct Item {
        id: i32,
        promoted: bool,
        created: DateTime<Utc>,
    }

    impl Rankable for Item {
        fn promoted(&self) -> bool {
            self.promoted
        }
        fn created(&self) -> DateTime<Utc> {
            self.created
        }
        fn row_id(&self) -> i32 {
            self.id
        }
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    fn item(id: i32, promoted: bool, ts: i64) -> Item {
        Item {
            id,
            promoted,
            created: at(ts),
        }
    }

    #[test]
    fn promoted_listings_sort_before_everything_else() {
        let mut items = vec![
            item(1, false, 300),
            item(2, true, 100),
            item(3, false, 200),
            item(4, true, 50),
        ];
        rank(&mut items);
        let ids: Vec<i32> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
    }

    #[test]
    fn ties_break_by_recency_then_id() {
        let mut items = vec![item(1, false, 100), item(2, false, 100), item(3, false, 200)];
        rank(&mut items);
        let ids: Vec<i32> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn ranking_is_deterministic_for_identical_input() {
        let build = || {
            vec![
                item(5, true, 10),
                item(9, false, 10),
                item(2, true, 10),
                item(7, false, 99),
            ]
        };
        let mut a = build();
        let mut b = build();
        rank(&mut a);
        rank(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn rating_threshold_drops_unrated_and_below_threshold_items() {
        let items = vec![item(1, false, 10), item(2, false, 20), item(3, false, 30)];
        let mut summaries = HashMap::new();
        summaries.insert(1, crate::ratings::summarize(&[3.5, 4.5])); // 4.0
        summaries.insert(2, crate::ratings::summarize(&[3.5, 4.0])); // 3.8
                                                                     // item 3 has no ratings
        let kept = apply_rating_and_rank(items, summaries, Some(4.0));
        let ids: Vec<i32> = kept.iter().map(|(i, _)| i.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(kept[0].1.average, Some(4.0));
    }

    #[test]
    fn without_threshold_unrated_items_survive_with_the_sentinel() {
        let items = vec![item(1, false, 10)];
        let kept = apply_rating_and_rank(items, HashMap::new(), None);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].1, RatingSummary::EMPTY);
    }

    #[test]
    fn promotion_wins_for_every_filter_combination() {
        // Promoted items must lead regardless of which subset survives
        // filtering; emulate a few survivor sets.
        for survivors in [vec![1, 2], vec![1, 2, 3], vec![2, 3]] {
            let mut items: Vec<Item> = vec![
                item(1, false, 500),
                item(2, true, 1),
                item(3, false, 400),
            ]
            .into_iter()
            .filter(|i| survivors.contains(&i.id))
            .collect();
            rank(&mut items);
            assert_eq!(items[0].id, 2);
        }
    }

    #[test]
    fn pagination_is_one_based_and_capped() {
        let items: Vec<i32> = (1..=25).collect();
        assert_eq!(paginate(items.clone(), 1, 10), (1..=10).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), 3, 10), (21..=25).collect::<Vec<_>>());
        assert!(paginate(items, 4, 10).is_empty());
    }

    #[test]
    fn params_normalize_blank_strings_to_no_constraint() {
        let params = SearchParams {
            search: Some("  phones ".to_string()),
            category: Some(String::new()),
            country: Some("  ".to_string()),
            state: None,
            city: Some("Lagos".to_string()),
            rating: None,
            page: Some(0),
        };
        let filters = params.normalized();
        assert_eq!(filters.search.as_deref(), Some("phones"));
        assert_eq!(filters.category, None);
        assert_eq!(filters.country, None);
        assert_eq!(filters.city.as_deref(), Some("Lagos"));
        assert_eq!(filters.page, 1);
    }

    #[test]
    fn ilike_patterns_escape_metacharacters() {
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(exact_pattern("Lagos"), "Lagos");
    }

    #[test]
    fn facet_merge_dedups_and_sorts() {
        let merged = merged_distinct(
            vec!["Lagos".to_string(), "Abuja".to_string()],
            vec!["Lagos".to_string(), "Kano".to_string()],
        );
        assert_eq!(merged, vec!["Abuja", "Kano", "Lagos"]);
    }
}
