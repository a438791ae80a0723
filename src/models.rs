use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

use crate::schema::{
    categories, cities, countries, location_cache, payment_references, product_ratings, products,
    search_history, service_ratings, services, states, user_favorites,
};

/// Listing lifecycle. New listings start `Pending` and become `Published`
/// only once the listing fee has been verified as paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Draft,
    Pending,
    Published,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Draft => "draft",
            ListingStatus::Pending => "pending",
            ListingStatus::Published => "published",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(ListingStatus::Draft),
            "pending" => Some(ListingStatus::Pending),
            "published" => Some(ListingStatus::Published),
            _ => None,
        }
    }
}

/// Which kind of listing an operation targets. Favorites and payment
/// references are tagged unions over this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Product,
    Service,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Product => "product",
            ItemType::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "product" => Some(ItemType::Product),
            "service" => Some(ItemType::Service),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = countries)]
pub struct Country {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub phone_code: Option<String>,
    pub currency_code: Option<String>,
    pub currency_symbol: Option<String>,
    pub flag_emoji: Option<String>,
    pub continent: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = states)]
pub struct State {
    pub id: i32,
    pub name: String,
    pub country_id: i32,
    pub code: Option<String>,
    pub kind: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = cities)]
pub struct City {
    pub id: i32,
    pub name: String,
    pub state_id: i32,
    pub country_id: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub population: Option<i32>,
    pub timezone: Option<String>,
    pub is_capital: bool,
    pub is_major_city: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = categories)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub kind: String,
    pub parent_id: Option<i32>,
    pub icon: Option<String>,
    pub image_url: Option<String>,
    pub is_featured: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = products)]
pub struct Product {
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
    pub country_id: i32,
    pub state_id: i32,
    pub city_id: i32,
    pub address_details: Option<String>,
    pub category_id: i32,
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
    pub promotion_fee_minor: i64,
    pub views_count: i32,
    pub favorites_count: i32,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = products)]
pub struct NewProduct {
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
    pub country_id: i32,
    pub state_id: i32,
    pub city_id: i32,
    pub address_details: Option<String>,
    pub category_id: i32,
    pub tags: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: String,
    pub status: String,
    pub provider_phone: String,
    pub provider_email: Option<String>,
    pub provider_whatsapp: Option<String>,
    pub is_promoted: bool,
    pub promotion_fee_minor: i64,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Owner-editable product fields; everything payment- or counter-related is
/// deliberately absent.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = products)]
pub struct ProductChangeset {
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
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = services)]
pub struct Service {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub featured_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    pub country_id: i32,
    pub state_id: i32,
    pub city_id: i32,
    pub serves_remote: bool,
    pub service_radius_km: Option<i32>,
    pub category_id: i32,
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
    pub promotion_fee_minor: i64,
    pub views_count: i32,
    pub contacts_count: i32,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = services)]
pub struct NewService {
    pub user_id: i32,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub featured_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    pub country_id: i32,
    pub state_id: i32,
    pub city_id: i32,
    pub serves_remote: bool,
    pub service_radius_km: Option<i32>,
    pub category_id: i32,
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
    pub is_promoted: bool,
    pub promotion_fee_minor: i64,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = services)]
pub struct ServiceChangeset {
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
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = product_ratings)]
pub struct ProductRating {
    pub id: i32,
    pub product_id: i32,
    pub user_id: i32,
    pub rating: f64,
    pub review_title: Option<String>,
    pub review: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    pub would_recommend: bool,
    pub is_active: bool,
    pub is_verified_purchase: bool,
    pub helpful_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = product_ratings)]
pub struct NewProductRating {
    pub product_id: i32,
    pub user_id: i32,
    pub rating: f64,
    pub review_title: Option<String>,
    pub review: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    pub would_recommend: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = product_ratings)]
pub struct ProductRatingChangeset {
    pub rating: f64,
    pub review_title: Option<String>,
    pub review: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    pub would_recommend: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = service_ratings)]
pub struct ServiceRating {
    pub id: i32,
    pub service_id: i32,
    pub user_id: i32,
    pub rating: f64,
    pub review_title: Option<String>,
    pub review: Option<String>,
    pub communication_rating: Option<f64>,
    pub quality_rating: Option<f64>,
    pub timeliness_rating: Option<f64>,
    pub would_recommend: bool,
    pub would_hire_again: bool,
    pub is_active: bool,
    pub is_verified_customer: bool,
    pub helpful_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_ratings)]
pub struct NewServiceRating {
    pub service_id: i32,
    pub user_id: i32,
    pub rating: f64,
    pub review_title: Option<String>,
    pub review: Option<String>,
    pub communication_rating: Option<f64>,
    pub quality_rating: Option<f64>,
    pub timeliness_rating: Option<f64>,
    pub would_recommend: bool,
    pub would_hire_again: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = service_ratings)]
pub struct ServiceRatingChangeset {
    pub rating: f64,
    pub review_title: Option<String>,
    pub review: Option<String>,
    pub communication_rating: Option<f64>,
    pub quality_rating: Option<f64>,
    pub timeliness_rating: Option<f64>,
    pub would_recommend: bool,
    pub would_hire_again: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = user_favorites)]
pub struct UserFavorite {
    pub id: i32,
    pub user_id: i32,
    pub item_type: String,
    pub item_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_favorites)]
pub struct NewUserFavorite {
    pub user_id: i32,
    pub item_type: String,
    pub item_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = search_history)]
pub struct NewSearchRecord {
    pub user_id: Option<i32>,
    pub search_term: String,
    pub category: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub search_type: String,
    pub results_count: i32,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = location_cache)]
pub struct NewLocationCacheEntry {
    pub cache_key: String,
    pub cache_data: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = payment_references)]
pub struct PaymentReference {
    pub id: i32,
    pub reference: String,
    pub item_type: String,
    pub item_id: i32,
    pub user_id: i32,
    pub purpose: String,
    pub amount_minor: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payment_references)]
pub struct NewPaymentReference {
    pub reference: String,
    pub item_type: String,
    pub item_id: i32,
    pub user_id: i32,
    pub purpose: String,
    pub amount_minor: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Lowercases, strips punctuation, and joins words with hyphens.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_was_hyphen = true;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Slug for a new listing: slugified name plus a random suffix so two
/// listings with the same name never collide.
pub fn listing_slug(name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", slugify(name), &suffix[..8])
}

pub fn validate_listing_name(name: &str) -> Result<String, ApiError> {
    let trimmed = name.trim();
    if trimmed.chars().count() < 3 {
        return Err(ApiError::Validation(
            "Name must be at least 3 characters long".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_price_minor(price_minor: i64) -> Result<(), ApiError> {
    if price_minor <= 0 {
        return Err(ApiError::Validation(
            "Price must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Optional leading `+`, then 9 to 15 digits.
pub fn validate_phone(phone: &str) -> Result<(), ApiError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let valid = (9..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    if !valid {
        return Err(ApiError::Validation(
            "Phone number must be valid".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<String, ApiError> {
    let trimmed = email.trim();
    if !trimmed.contains('@') || trimmed.starts_with('@') || trimmed.ends_with('@') {
        return Err(ApiError::Validation(
            "Enter a valid email address".to_string(),
        ));
    }
    Ok(trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_strips_punctuation() {
        assert_eq!(slugify("Fresh Mangoes!"), "fresh-mangoes");
        assert_eq!(slugify("  A  B  "), "a-b");
        assert_eq!(slugify("Déjà Vu"), "déjà-vu");
    }

    #[test]
    fn listing_slugs_are_unique_per_call() {
        let a = listing_slug("Garden Chairs");
        let b = listing_slug("Garden Chairs");
        assert!(a.starts_with("garden-chairs-"));
        assert_ne!(a, b);
    }

    #[test]
    fn listing_names_must_have_three_characters() {
        assert!(validate_listing_name("  ab ").is_err());
        assert_eq!(validate_listing_name(" rug ").unwrap(), "rug");
    }

    #[test]
    fn prices_must_be_positive() {
        assert!(validate_price_minor(0).is_err());
        assert!(validate_price_minor(-500).is_err());
        assert!(validate_price_minor(1).is_ok());
    }

    #[test]
    fn phone_numbers_are_nine_to_fifteen_digits() {
        assert!(validate_phone("+2348012345678").is_ok());
        assert!(validate_phone("080123456").is_ok());
        assert!(validate_phone("12345678").is_err());
        assert!(validate_phone("+234-801-234").is_err());
    }

    #[test]
    fn emails_need_a_local_part_and_domain() {
        assert_eq!(
            validate_email(" Seller@Example.COM ").unwrap(),
            "seller@example.com"
        );
        assert!(validate_email("nope").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn listing_status_round_trips() {
        for status in [
            ListingStatus::Draft,
            ListingStatus::Pending,
            ListingStatus::Published,
        ] {
            assert_eq!(ListingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ListingStatus::parse("sold"), None);
    }

    #[test]
    fn item_type_round_trips() {
        assert_eq!(ItemType::parse("product"), Some(ItemType::Product));
        assert_eq!(ItemType::parse("service"), Some(ItemType::Service));
        assert_eq!(ItemType::parse("both"), None);
        assert_eq!(ItemType::Service.as_str(), "service");
    }
}
