use axum::extract::{Path, State};
use axum::Json;
use diesel::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::db::DbConnection;
use crate::error::ApiError;
use crate::models::Category;
use crate::schema::categories;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub kind: String,
    pub parent_id: Option<i32>,
    pub icon: Option<String>,
    pub is_featured: bool,
}

impl From<Category> for CategorySummary {
    fn from(c: Category) -> Self {
        CategorySummary {
            id: c.id,
            name: c.name,
            slug: c.slug,
            kind: c.kind,
            parent_id: c.parent_id,
            icon: c.icon,
            is_featured: c.is_featured,
        }
    }
}

fn load_active(conn: &mut DbConnection) -> Result<Vec<Category>, ApiError> {
    Ok(categories::table
        .filter(categories::is_active.eq(true))
        .order((categories::sort_order.asc(), categories::name.asc()))
        .load::<Category>(conn)?)
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategorySummary>>, ApiError> {
    let mut conn = state.pool.get()?;
    let rows = load_active(&mut conn)?;
    Ok(Json(rows.into_iter().map(CategorySummary::from).collect()))
}

pub async fn root_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategorySummary>>, ApiError> {
    let mut conn = state.pool.get()?;
    let rows = categories::table
        .filter(categories::is_active.eq(true))
        .filter(categories::parent_id.is_null())
        .order((categories::sort_order.asc(), categories::name.asc()))
        .load::<Category>(&mut conn)?;
    Ok(Json(rows.into_iter().map(CategorySummary::from).collect()))
}

pub async fn subcategories(
    State(state): State<AppState>,
    Path(category_id): Path<i32>,
) -> Result<Json<Vec<CategorySummary>>, ApiError> {
    let mut conn = state.pool.get()?;
    let exists = categories::table
        .filter(categories::id.eq(category_id))
        .filter(categories::is_active.eq(true))
        .count()
        .get_result::<i64>(&mut conn)?;
    if exists == 0 {
        return Err(ApiError::NotFound("Category not found".to_string()));
    }
    let rows = categories::table
        .filter(categories::is_active.eq(true))
        .filter(categories::parent_id.eq(category_id))
        .order((categories::sort_order.asc(), categories::name.asc()))
        .load::<Category>(&mut conn)?;
    Ok(Json(rows.into_iter().map(CategorySummary::from).collect()))
}

/// Collects `root` and every descendant from a flat (id, parent_id) list.
/// Guards against cycles so a corrupted tree cannot loop forever.
pub fn collect_subtree(nodes: &[(i32, Option<i32>)], root: i32) -> Vec<i32> {
    let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
    for (id, parent) in nodes {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*id);
        }
    }

    let mut collected = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        collected.push(id);
        if let Some(kids) = children.get(&id) {
            stack.extend(kids.iter().copied());
        }
    }
    collected
}

/// Resolves a category name filter to the matching category plus all of its
/// descendants. `None` means the name matched nothing (so the search should
/// return no results rather than ignore the filter).
pub fn resolve_category_filter(
    conn: &mut DbConnection,
    name: &str,
) -> Result<Option<Vec<i32>>, ApiError> {
    let all = load_active(conn)?;
    let root = all
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .map(|c| c.id);
    let Some(root) = root else {
        return Ok(None);
    };
    let nodes: Vec<(i32, Option<i32>)> = all.iter().map(|c| (c.id, c.parent_id)).collect();
    Ok(Some(collect_subtree(&nodes, root)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_includes_all_descendants() {
        let nodes = vec![
            (1, None),
            (2, Some(1)),
            (3, Some(1)),
            (4, Some(2)),
            (5, None),
        ];
        let mut ids = collect_subtree(&nodes, 1);
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn subtree_of_leaf_is_itself() {
        let nodes = vec![(1, None), (2, Some(1))];
        assert_eq!(collect_subtree(&nodes, 2), vec![2]);
    }

    #[test]
    fn subtree_survives_a_cycle() {
        let nodes = vec![(1, Some(2)), (2, Some(1))];
        let mut ids = collect_subtree(&nodes, 1);
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }
}
