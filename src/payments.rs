use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{
    ItemType, ListingStatus, NewPaymentReference, PaymentReference, Product, Service,
};
use crate::products::load_owned_product;
use crate::schema::{payment_references, products, services};
use crate::services::load_owned_service;
use crate::AppState;

const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// What a gateway reference was charged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentPurpose {
    /// Base listing fee; verification publishes the listing.
    Listing,
    /// Promotion fee for an already-published listing.
    Promotion,
}

impl PaymentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPurpose::Listing => "listing",
            PaymentPurpose::Promotion => "promotion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "listing" => Some(PaymentPurpose::Listing),
            "promotion" => Some(PaymentPurpose::Promotion),
            _ => None,
        }
    }
}

/// Total charge for publishing: the flat base fee, plus the item's stored
/// promotion fee when promotion was requested at creation time.
pub fn listing_fee_minor(base_fee_minor: i64, promoted: bool, promotion_fee_minor: i64) -> i64 {
    if promoted {
        base_fee_minor + promotion_fee_minor
    } else {
        base_fee_minor
    }
}

/// Promotion charge: a daily rate over the promotion window.
pub fn promotion_fee_minor(daily_fee_minor: i64, duration_days: i64) -> i64 {
    daily_fee_minor * duration_days
}

/// The base listing fee is charged once; re-initiating payment for an
/// already-paid item is a conflict, no matter how often it is attempted.
fn ensure_unpaid(is_paid: bool) -> Result<(), ApiError> {
    if is_paid {
        return Err(ApiError::Conflict(
            "This listing has already been paid for".to_string(),
        ));
    }
    Ok(())
}

/// Identifies the charged item inside the gateway transaction; round-trips
/// through the gateway as opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub item_type: String,
    pub item_id: i32,
    pub user_id: i32,
    pub purpose: String,
    pub amount_minor: i64,
}

#[derive(Debug, Serialize)]
struct InitiateBody<'a> {
    amount: i64,
    email: &'a str,
    callback_url: &'a str,
    metadata: &'a PaymentMetadata,
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct InitiatedPayment {
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifiedTransaction {
    pub status: String,
    pub amount: Option<i64>,
    pub metadata: Option<PaymentMetadata>,
}

impl VerifiedTransaction {
    pub fn succeeded(&self) -> bool {
        self.status == "success"
    }
}

/// Thin client for the hosted payment gateway. Every call carries the
/// secret key as a Bearer header and a bounded timeout; a timeout is a
/// gateway error like any other.
#[derive(Clone)]
pub struct PaymentGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl PaymentGateway {
    pub fn new(base_url: &str, secret_key: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(GATEWAY_TIMEOUT).build()?;
        Ok(PaymentGateway {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    pub async fn initiate(
        &self,
        amount_minor: i64,
        email: &str,
        callback_url: &str,
        metadata: &PaymentMetadata,
    ) -> Result<InitiatedPayment, ApiError> {
        let body = InitiateBody {
            amount: amount_minor,
            email,
            callback_url,
            metadata,
        };
        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(format!("initialization request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ApiError::Gateway(format!(
                "initialization rejected with HTTP {}",
                response.status()
            )));
        }
        let envelope: GatewayEnvelope<InitiatedPayment> = response
            .json()
            .await
            .map_err(|e| ApiError::Gateway(format!("malformed initialization response: {e}")))?;
        if !envelope.status {
            return Err(ApiError::Gateway(
                envelope
                    .message
                    .unwrap_or_else(|| "initialization declined".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| ApiError::Gateway("initialization response missing data".to_string()))
    }

    pub async fn verify(&self, reference: &str) -> Result<VerifiedTransaction, ApiError> {
        let response = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(format!("verification request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ApiError::Gateway(format!(
                "verification rejected with HTTP {}",
                response.status()
            )));
        }
        let envelope: GatewayEnvelope<VerifiedTransaction> = response
            .json()
            .await
            .map_err(|e| ApiError::Gateway(format!("malformed verification response: {e}")))?;
        if !envelope.status {
            return Err(ApiError::Gateway(
                envelope
                    .message
                    .unwrap_or_else(|| "verification declined".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| ApiError::Gateway("verification response missing data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub item_type: String,
    pub item_id: i32,
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub authorization_url: String,
    pub reference: String,
    pub amount_minor: i64,
    pub item_type: String,
    pub item_id: i32,
    pub callback_url: String,
}

enum OwnedItem {
    Product(Product),
    Service(Service),
}

impl OwnedItem {
    fn is_paid(&self) -> bool {
        match self {
            OwnedItem::Product(p) => p.is_paid,
            OwnedItem::Service(s) => s.is_paid,
        }
    }

    fn is_promoted(&self) -> bool {
        match self {
            OwnedItem::Product(p) => p.is_promoted,
            OwnedItem::Service(s) => s.is_promoted,
        }
    }

    fn is_published(&self) -> bool {
        let status = match self {
            OwnedItem::Product(p) => &p.status,
            OwnedItem::Service(s) => &s.status,
        };
        status == ListingStatus::Published.as_str()
    }

    fn promotion_fee_minor(&self) -> i64 {
        match self {
            OwnedItem::Product(p) => p.promotion_fee_minor,
            OwnedItem::Service(s) => s.promotion_fee_minor,
        }
    }
}

fn parse_item_type(value: &str) -> Result<ItemType, ApiError> {
    ItemType::parse(value).ok_or_else(|| {
        ApiError::Validation("item_type must be \"product\" or \"service\"".to_string())
    })
}

fn load_owned_item(
    conn: &mut crate::db::DbConnection,
    item_type: ItemType,
    item_id: i32,
    user_id: i32,
) -> Result<OwnedItem, ApiError> {
    match item_type {
        ItemType::Product => Ok(OwnedItem::Product(load_owned_product(conn, item_id, user_id)?)),
        ItemType::Service => Ok(OwnedItem::Service(load_owned_service(conn, item_id, user_id)?)),
    }
}

fn record_reference(
    conn: &mut crate::db::DbConnection,
    reference: &str,
    item_type: ItemType,
    item_id: i32,
    user_id: i32,
    purpose: PaymentPurpose,
    amount_minor: i64,
) -> Result<(), ApiError> {
    diesel::insert_into(payment_references::table)
        .values(&NewPaymentReference {
            reference: reference.to_string(),
            item_type: item_type.as_str().to_string(),
            item_id,
            user_id,
            purpose: purpose.as_str().to_string(),
            amount_minor,
            status: "initiated".to_string(),
            created_at: Utc::now(),
        })
        .execute(conn)?;
    Ok(())
}

/// Starts the base listing payment. Re-initiating for an already-paid item
/// is a conflict; nothing is charged twice.
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<Json<InitiatePaymentResponse>, ApiError> {
    let item_type = parse_item_type(&req.item_type)?;
    let mut conn = state.pool.get()?;
    let item = load_owned_item(&mut conn, item_type, req.item_id, user.id)?;
    ensure_unpaid(item.is_paid())?;

    let amount_minor = listing_fee_minor(
        state.config.base_listing_fee_minor,
        item.is_promoted(),
        item.promotion_fee_minor(),
    );
    let callback_url = state.config.payment_callback_url();
    let metadata = PaymentMetadata {
        item_type: item_type.as_str().to_string(),
        item_id: req.item_id,
        user_id: user.id,
        purpose: PaymentPurpose::Listing.as_str().to_string(),
        amount_minor,
    };

    let initiated = state
        .gateway
        .initiate(amount_minor, &user.email, &callback_url, &metadata)
        .await?;

    record_reference(
        &mut conn,
        &initiated.reference,
        item_type,
        req.item_id,
        user.id,
        PaymentPurpose::Listing,
        amount_minor,
    )?;

    // Drafts move to pending once a payment is underway.
    match item_type {
        ItemType::Product => {
            diesel::update(
                products::table
                    .filter(products::id.eq(req.item_id))
                    .filter(products::status.eq(ListingStatus::Draft.as_str())),
            )
            .set(products::status.eq(ListingStatus::Pending.as_str()))
            .execute(&mut conn)?;
        }
        ItemType::Service => {
            diesel::update(
                services::table
                    .filter(services::id.eq(req.item_id))
                    .filter(services::status.eq(ListingStatus::Draft.as_str())),
            )
            .set(services::status.eq(ListingStatus::Pending.as_str()))
            .execute(&mut conn)?;
        }
    }

    info!(
        "initiated listing payment: {} {} for user {} ({} minor units, ref {})",
        item_type.as_str(),
        req.item_id,
        user.id,
        amount_minor,
        initiated.reference
    );
    Ok(Json(InitiatePaymentResponse {
        authorization_url: initiated.authorization_url,
        reference: initiated.reference,
        amount_minor,
        item_type: item_type.as_str().to_string(),
        item_id: req.item_id,
        callback_url,
    }))
}

const DEFAULT_PROMOTION_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct PromoteItemRequest {
    pub item_type: String,
    pub item_id: i32,
    pub duration_days: Option<i64>,
}

/// Starts a promotion payment for an already-published listing.
pub async fn promote_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PromoteItemRequest>,
) -> Result<Json<InitiatePaymentResponse>, ApiError> {
    let item_type = parse_item_type(&req.item_type)?;
    let duration_days = req.duration_days.unwrap_or(DEFAULT_PROMOTION_DAYS);
    if duration_days <= 0 {
        return Err(ApiError::Validation(
            "Promotion duration must be at least one day".to_string(),
        ));
    }

    let mut conn = state.pool.get()?;
    let item = load_owned_item(&mut conn, item_type, req.item_id, user.id)?;

    if !item.is_paid() || !item.is_published() {
        return Err(ApiError::Validation(
            "Only published and paid listings can be promoted".to_string(),
        ));
    }
    if item.is_promoted() {
        return Err(ApiError::Conflict(
            "This listing is already promoted".to_string(),
        ));
    }

    let amount_minor = promotion_fee_minor(state.config.daily_promotion_fee_minor, duration_days);
    let callback_url = state.config.payment_callback_url();
    let metadata = PaymentMetadata {
        item_type: item_type.as_str().to_string(),
        item_id: req.item_id,
        user_id: user.id,
        purpose: PaymentPurpose::Promotion.as_str().to_string(),
        amount_minor,
    };

    let initiated = state
        .gateway
        .initiate(amount_minor, &user.email, &callback_url, &metadata)
        .await?;

    record_reference(
        &mut conn,
        &initiated.reference,
        item_type,
        req.item_id,
        user.id,
        PaymentPurpose::Promotion,
        amount_minor,
    )?;

    info!(
        "initiated promotion payment: {} {} for user {} ({} days, ref {})",
        item_type.as_str(),
        req.item_id,
        user.id,
        duration_days,
        initiated.reference
    );
    Ok(Json(InitiatePaymentResponse {
        authorization_url: initiated.authorization_url,
        reference: initiated.reference,
        amount_minor,
        item_type: item_type.as_str().to_string(),
        item_id: req.item_id,
        callback_url,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    pub item_type: String,
    pub item_id: i32,
    pub item_name: Option<String>,
    pub amount_minor: i64,
    pub reference: String,
}

fn load_ledger_entry(
    conn: &mut crate::db::DbConnection,
    reference: &str,
) -> Result<PaymentReference, ApiError> {
    payment_references::table
        .filter(payment_references::reference.eq(reference))
        .first::<PaymentReference>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Unknown payment reference".to_string()))
}

/// Applies a successful payment to the item named by the ledger entry.
/// Runs inside one transaction: the listing flags and the ledger row flip
/// together or not at all.
fn apply_success(
    conn: &mut crate::db::DbConnection,
    entry: &PaymentReference,
) -> Result<String, ApiError> {
    let item_type = ItemType::parse(&entry.item_type)
        .ok_or_else(|| ApiError::Gateway("ledger entry has an unknown item type".to_string()))?;
    let purpose = PaymentPurpose::parse(&entry.purpose)
        .ok_or_else(|| ApiError::Gateway("ledger entry has an unknown purpose".to_string()))?;
    let now = Utc::now();

    conn.transaction::<_, ApiError, _>(|conn| {
        let name = match (item_type, purpose) {
            (ItemType::Product, PaymentPurpose::Listing) => {
                let product = diesel::update(products::table.find(entry.item_id))
                    .set((
                        products::is_paid.eq(true),
                        products::status.eq(ListingStatus::Published.as_str()),
                        products::published_at.eq(now),
                        products::updated_at.eq(now),
                    ))
                    .get_result::<Product>(conn)?;
                product.name
            }
            (ItemType::Product, PaymentPurpose::Promotion) => {
                let product = diesel::update(products::table.find(entry.item_id))
                    .set((products::is_promoted.eq(true), products::updated_at.eq(now)))
                    .get_result::<Product>(conn)?;
                product.name
            }
            (ItemType::Service, PaymentPurpose::Listing) => {
                let service = diesel::update(services::table.find(entry.item_id))
                    .set((
                        services::is_paid.eq(true),
                        services::status.eq(ListingStatus::Published.as_str()),
                        services::published_at.eq(now),
                        services::updated_at.eq(now),
                    ))
                    .get_result::<Service>(conn)?;
                service.name
            }
            (ItemType::Service, PaymentPurpose::Promotion) => {
                let service = diesel::update(services::table.find(entry.item_id))
                    .set((services::is_promoted.eq(true), services::updated_at.eq(now)))
                    .get_result::<Service>(conn)?;
                service.name
            }
        };

        diesel::update(payment_references::table.find(entry.id))
            .set((
                payment_references::status.eq("success"),
                payment_references::consumed_at.eq(now),
            ))
            .execute(conn)?;

        Ok(name)
    })
}

/// Verifies a gateway reference. The reference must have been issued by
/// this service (the ledger is checked first); a reference that was already
/// consumed returns the recorded success without touching anything again,
/// which makes duplicate callback delivery harmless.
pub async fn verify_payment(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let reference = query.reference.trim().to_string();
    if reference.is_empty() {
        return Err(ApiError::Validation(
            "No payment reference provided".to_string(),
        ));
    }

    let mut conn = state.pool.get()?;
    let entry = load_ledger_entry(&mut conn, &reference)?;

    if entry.status == "success" {
        return Ok(Json(VerifyResponse {
            success: true,
            message: "Payment already verified".to_string(),
            item_type: entry.item_type,
            item_id: entry.item_id,
            item_name: None,
            amount_minor: entry.amount_minor,
            reference,
        }));
    }

    let transaction = state.gateway.verify(&reference).await?;

    // The gateway echoes the metadata we embedded at initiation; a mismatch
    // against the ledger means the reference is not ours to consume.
    if let Some(metadata) = &transaction.metadata {
        if metadata.user_id != entry.user_id || metadata.item_id != entry.item_id {
            return Err(ApiError::Forbidden(
                "Payment verification failed: metadata mismatch".to_string(),
            ));
        }
    }

    if !transaction.succeeded() {
        diesel::update(payment_references::table.find(entry.id))
            .set(payment_references::status.eq("failed"))
            .execute(&mut conn)?;
        warn!(
            "payment not successful for reference {} (gateway status: {})",
            reference, transaction.status
        );
        return Ok(Json(VerifyResponse {
            success: false,
            message: format!("Payment not successful (status: {})", transaction.status),
            item_type: entry.item_type,
            item_id: entry.item_id,
            item_name: None,
            amount_minor: entry.amount_minor,
            reference,
        }));
    }

    let item_name = apply_success(&mut conn, &entry)?;
    info!(
        "payment verified: {} {} published/promoted via ref {}",
        entry.item_type, entry.item_id, reference
    );
    Ok(Json(VerifyResponse {
        success: true,
        message: "Payment successful".to_string(),
        item_type: entry.item_type,
        item_id: entry.item_id,
        item_name: Some(item_name),
        amount_minor: entry.amount_minor,
        reference,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusQuery {
    pub item_type: String,
    pub item_id: i32,
}

/// Owner-only view of an item's payment state.
pub async fn payment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PaymentStatusQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item_type = parse_item_type(&query.item_type)?;
    let mut conn = state.pool.get()?;
    let item = load_owned_item(&mut conn, item_type, query.item_id, user.id)?;

    let value = match &item {
        OwnedItem::Product(p) => serde_json::json!({
            "item_type": "product",
            "item_id": p.id,
            "item_name": p.name,
            "is_paid": p.is_paid,
            "status": p.status,
            "is_promoted": p.is_promoted,
            "promotion_fee_minor": p.promotion_fee_minor,
            "published_at": p.published_at,
            "created_at": p.created_at,
        }),
        OwnedItem::Service(s) => serde_json::json!({
            "item_type": "service",
            "item_id": s.id,
            "item_name": s.name,
            "is_paid": s.is_paid,
            "status": s.status,
            "is_promoted": s.is_promoted,
            "promotion_fee_minor": s.promotion_fee_minor,
            "published_at": s.published_at,
            "created_at": s.created_at,
        }),
    };
    Ok(Json(value))
}

#[derive(Debug, Serialize)]
pub struct PaymentHistorySummary {
    pub total_payments: i64,
    pub total_amount_minor: i64,
}

/// Count and sum of successfully consumed references.
pub fn summarize_history(rows: &[PaymentReference]) -> PaymentHistorySummary {
    let successful: Vec<&PaymentReference> =
        rows.iter().filter(|r| r.status == "success").collect();
    PaymentHistorySummary {
        total_payments: successful.len() as i64,
        total_amount_minor: successful.iter().map(|r| r.amount_minor).sum(),
    }
}

/// The caller's payment ledger, newest first.
pub async fn payment_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.pool.get()?;
    let rows = payment_references::table
        .filter(payment_references::user_id.eq(user.id))
        .order(payment_references::created_at.desc())
        .load::<PaymentReference>(&mut conn)?;
    let summary = summarize_history(&rows);
    Ok(Json(serde_json::json!({
        "summary": summary,
        "payments": rows,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn listing_fee_adds_promotion_only_when_requested() {
        assert_eq!(listing_fee_minor(100_000, false, 1_000), 100_000);
        assert_eq!(listing_fee_minor(100_000, true, 1_000), 101_000);
    }

    #[test]
    fn promotion_fee_scales_with_duration() {
        assert_eq!(promotion_fee_minor(5_000, 30), 150_000);
        assert_eq!(promotion_fee_minor(5_000, 1), 5_000);
    }

    #[test]
    fn only_the_literal_success_status_succeeds() {
        for (status, expected) in [
            ("success", true),
            ("failed", false),
            ("abandoned", false),
            ("Success", false),
            ("", false),
        ] {
            let tx = VerifiedTransaction {
                status: status.to_string(),
                amount: None,
                metadata: None,
            };
            assert_eq!(tx.succeeded(), expected, "status {status:?}");
        }
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let metadata = PaymentMetadata {
            item_type: "service".to_string(),
            item_id: 7,
            user_id: 3,
            purpose: "promotion".to_string(),
            amount_minor: 150_000,
        };
        let value = serde_json::to_value(&metadata).unwrap();
        let back: PaymentMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back.item_id, 7);
        assert_eq!(back.user_id, 3);
        assert_eq!(back.purpose, "promotion");
    }

    #[test]
    fn gateway_envelope_parses_the_wire_shape() {
        let raw = r#"{
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "amount": 101000,
                "metadata": {
                    "item_type": "product",
                    "item_id": 12,
                    "user_id": 4,
                    "purpose": "listing",
                    "amount_minor": 101000
                }
            }
        }"#;
        let envelope: GatewayEnvelope<VerifiedTransaction> = serde_json::from_str(raw).unwrap();
        assert!(envelope.status);
        let tx = envelope.data.unwrap();
        assert!(tx.succeeded());
        assert_eq!(tx.amount, Some(101_000));
        assert_eq!(tx.metadata.unwrap().item_id, 12);
    }

    #[test]
    fn history_sums_only_consumed_references() {
        let at = |ts| Utc.timestamp_opt(ts, 0).unwrap();
        let row = |status: &str, amount: i64| PaymentReference {
            id: 1,
            reference: "ref".to_string(),
            item_type: "product".to_string(),
            item_id: 1,
            user_id: 1,
            purpose: "listing".to_string(),
            amount_minor: amount,
            status: status.to_string(),
            created_at: at(0),
            consumed_at: None,
        };
        let rows = vec![
            row("success", 100_000),
            row("success", 150_000),
            row("failed", 100_000),
            row("initiated", 100_000),
        ];
        let summary = summarize_history(&rows);
        assert_eq!(summary.total_payments, 2);
        assert_eq!(summary.total_amount_minor, 250_000);
    }

    #[test]
    fn repaying_a_paid_item_conflicts_every_time() {
        for _ in 0..2 {
            let err = ensure_unpaid(true).unwrap_err();
            assert_eq!(
                err.status_code(),
                axum::http::StatusCode::CONFLICT
            );
        }
        assert!(ensure_unpaid(false).is_ok());
    }

    #[test]
    fn payment_purpose_round_trips() {
        assert_eq!(
            PaymentPurpose::parse("listing"),
            Some(PaymentPurpose::Listing)
        );
        assert_eq!(
            PaymentPurpose::parse("promotion"),
            Some(PaymentPurpose::Promotion)
        );
        assert_eq!(PaymentPurpose::parse("refund"), None);
    }
}
