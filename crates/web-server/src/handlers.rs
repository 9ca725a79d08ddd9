use crate::{AppState, error::AppError, session::Session};
use axum::{
    Form, Json,
    extract::{Path, Query, State},
};
use chrono::NaiveDate;
use core_types::{CampaignStatus, PaymentMethod, QueryLogEntry, ReportResult, Row, UserRole};
use database::campaigns::{self, CampaignChanges, CampaignFilter, NewCampaign};
use database::catalog::ParamDefault;
use database::donations::{self, DonationReceipt, DonationRequest};
use database::reports::{self, REPORTS};
use database::users::{self, NewUser, UserChanges};
use database::{LoggerStats, ParamKind, PlatformStatistics, categories, query_log};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

// --- Form and query-string parsing ---------------------------------------------
//
// Browsers submit every field as text and send blank inputs as empty strings, so fields
// are taken as `Option<String>` and parsed here with the field name in the error.

fn optional<T>(name: &str, value: &Option<String>) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| AppError::BadRequest(format!("Invalid {name}: {e}"))),
    }
}

fn required<T>(name: &str, value: &Option<String>) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    optional(name, value)?.ok_or_else(|| AppError::BadRequest(format!("Missing field: {name}")))
}

fn optional_date(name: &str, value: &Option<String>) -> Result<Option<NaiveDate>, AppError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Invalid {name}: expected YYYY-MM-DD"))),
    }
}

/// Checkbox semantics: present and one of `1`, `true`, `on`, `yes` means set.
fn flag(value: &Option<String>) -> Option<bool> {
    value.as_deref().map(|raw| {
        matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        )
    })
}

fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The envelope of every write endpoint.
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WriteResponse {
    fn success(message: impl Into<String>, id: Option<u64>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
            id,
            data: None,
        })
    }
}

// --- Health and statistics -----------------------------------------------------

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub database: bool,
    pub query_log: LoggerStats,
}

/// # GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let database = state.pool.acquire().await.is_ok();
    Json(Health {
        status: if database { "ok" } else { "degraded" },
        database,
        query_log: state.logger.stats(),
    })
}

/// # GET /api/stats
pub async fn platform_statistics(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<PlatformStatistics>, AppError> {
    let ctx = state.context(&session, "dashboard");
    Ok(Json(reports::platform_statistics(&ctx).await?))
}

// --- Reports -------------------------------------------------------------------

/// # GET /api/reports
/// The catalog: every report with its parameters and defaults.
pub async fn list_reports() -> Json<Vec<Value>> {
    let catalog = REPORTS
        .iter()
        .map(|report| {
            let params: Vec<Value> = report
                .params
                .iter()
                .map(|p| {
                    let kind = match p.kind {
                        ParamKind::Int { min, max } => json!({ "type": "integer", "min": min, "max": max }),
                        ParamKind::Text { max_len } => json!({ "type": "text", "max_len": max_len }),
                        ParamKind::Date => json!({ "type": "date" }),
                    };
                    let default = match p.default {
                        ParamDefault::Required => json!("required"),
                        ParamDefault::Null => Value::Null,
                        ParamDefault::Int(v) => json!(v),
                    };
                    json!({ "name": p.name, "kind": kind, "default": default })
                })
                .collect();
            json!({ "name": report.name, "title": report.title, "params": params })
        })
        .collect();
    Json(catalog)
}

/// # GET /api/reports/:name
pub async fn run_report(
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ReportResult>, AppError> {
    let ctx = state.context(&session, "reports");
    let raw = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    Ok(Json(reports::run(&ctx, &name, raw).await?))
}

// --- Campaigns -----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CampaignQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl CampaignQuery {
    fn filter(&self) -> Result<CampaignFilter, AppError> {
        Ok(CampaignFilter {
            status: optional::<CampaignStatus>("status", &self.status)?,
            category_id: optional("category", &self.category)?,
            search: text(&self.search),
            limit: optional("limit", &self.limit)?,
            offset: optional("offset", &self.offset)?,
        })
    }
}

/// # GET /api/campaigns
pub async fn list_campaigns(
    Query(query): Query<CampaignQuery>,
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ReportResult>, AppError> {
    let filter = query.filter()?;
    let ctx = state.context(&session, "campaigns");
    Ok(Json(campaigns::list_campaigns(&ctx, &filter).await?))
}

#[derive(Debug, Serialize)]
pub struct CampaignDetails {
    pub campaign: Row,
    pub comments: ReportResult,
}

/// # GET /api/campaigns/:id
pub async fn get_campaign(
    Path(campaign_id): Path<u64>,
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<CampaignDetails>, AppError> {
    let ctx = state.context(&session, "campaign_details");
    let campaign = campaigns::get_campaign(&ctx, campaign_id).await?;
    let comments = campaigns::campaign_comments(&ctx, campaign_id).await?;
    Ok(Json(CampaignDetails { campaign, comments }))
}

/// # GET /api/campaigns/:id/rewards
pub async fn campaign_rewards(
    Path(campaign_id): Path<u64>,
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ReportResult>, AppError> {
    let ctx = state.context(&session, "campaign_rewards");
    Ok(Json(campaigns::campaign_rewards(&ctx, campaign_id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CampaignForm {
    pub action: String,
    pub campaign_id: Option<String>,
    pub campaign_title: Option<String>,
    pub description: Option<String>,
    pub goal_amount: Option<String>,
    pub creator_id: Option<String>,
    pub category_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub featured: Option<String>,
    pub image_url: Option<String>,
}

impl CampaignForm {
    fn new_campaign(&self) -> Result<NewCampaign, AppError> {
        Ok(NewCampaign {
            title: required::<String>("campaign_title", &self.campaign_title)?,
            description: text(&self.description),
            goal_amount: required::<Decimal>("goal_amount", &self.goal_amount)?,
            creator_id: required("creator_id", &self.creator_id)?,
            category_id: optional("category_id", &self.category_id)?,
            start_date: optional_date("start_date", &self.start_date)?
                .ok_or_else(|| AppError::BadRequest("Missing field: start_date".to_string()))?,
            end_date: optional_date("end_date", &self.end_date)?
                .ok_or_else(|| AppError::BadRequest("Missing field: end_date".to_string()))?,
            status: optional::<CampaignStatus>("status", &self.status)?
                .unwrap_or(CampaignStatus::Draft),
            image_url: text(&self.image_url),
        })
    }

    fn changes(&self) -> Result<CampaignChanges, AppError> {
        Ok(CampaignChanges {
            title: text(&self.campaign_title),
            description: text(&self.description),
            goal_amount: optional("goal_amount", &self.goal_amount)?,
            category_id: optional("category_id", &self.category_id)?,
            start_date: optional_date("start_date", &self.start_date)?,
            end_date: optional_date("end_date", &self.end_date)?,
            status: optional("status", &self.status)?,
            featured: flag(&self.featured),
            image_url: text(&self.image_url),
        })
    }
}

/// # POST /api/campaigns
pub async fn campaign_action(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<CampaignForm>,
) -> Result<Json<WriteResponse>, AppError> {
    let ctx = state.context(&session, "campaigns");
    match form.action.as_str() {
        "create" => {
            let id = campaigns::create_campaign(&ctx, &form.new_campaign()?).await?;
            Ok(WriteResponse::success("Campaign created successfully!", Some(id)))
        }
        "update" => {
            let id = required("campaign_id", &form.campaign_id)?;
            campaigns::update_campaign(&ctx, id, &form.changes()?).await?;
            Ok(WriteResponse::success("Campaign updated successfully!", Some(id)))
        }
        "delete" => {
            let id = required("campaign_id", &form.campaign_id)?;
            campaigns::delete_campaign(&ctx, id).await?;
            Ok(WriteResponse::success("Campaign deleted successfully!", Some(id)))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {other}"))),
    }
}

// --- Users ---------------------------------------------------------------------

/// # GET /api/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ReportResult>, AppError> {
    let ctx = state.context(&session, "users");
    Ok(Json(
        reports::run_with(&ctx, &reports::USER_DIRECTORY, Default::default()).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct UserForm {
    pub action: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub user_role: Option<String>,
    pub account_balance: Option<String>,
    pub is_active: Option<String>,
}

impl UserForm {
    fn new_user(&self) -> Result<NewUser, AppError> {
        Ok(NewUser {
            username: required("username", &self.username)?,
            email: required("email", &self.email)?,
            password: required("password", &self.password)?,
            full_name: required("full_name", &self.full_name)?,
            role: optional::<UserRole>("user_role", &self.user_role)?.unwrap_or(UserRole::Donor),
            account_balance: optional("account_balance", &self.account_balance)?
                .unwrap_or(Decimal::ZERO),
        })
    }

    fn changes(&self) -> Result<UserChanges, AppError> {
        Ok(UserChanges {
            full_name: text(&self.full_name),
            email: text(&self.email),
            role: optional("user_role", &self.user_role)?,
            account_balance: optional("account_balance", &self.account_balance)?,
            is_active: flag(&self.is_active),
        })
    }
}

/// # POST /api/users
pub async fn user_action(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<UserForm>,
) -> Result<Json<WriteResponse>, AppError> {
    let ctx = state.context(&session, "users");
    match form.action.as_str() {
        "create" => {
            let id = users::create_user(&ctx, &form.new_user()?).await?;
            Ok(WriteResponse::success("User created successfully!", Some(id)))
        }
        "update" => {
            let id = required("user_id", &form.user_id)?;
            users::update_user(&ctx, id, &form.changes()?).await?;
            Ok(WriteResponse::success("User updated successfully!", Some(id)))
        }
        "delete" => {
            let id = required("user_id", &form.user_id)?;
            users::delete_user(&ctx, id).await?;
            Ok(WriteResponse::success("User deleted successfully!", Some(id)))
        }
        other => Err(AppError::BadRequest(format!("Unknown action: {other}"))),
    }
}

// --- Categories ----------------------------------------------------------------

/// # GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ReportResult>, AppError> {
    let ctx = state.context(&session, "categories");
    Ok(Json(categories::list_categories(&ctx).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryForm {
    pub action: String,
    pub category_name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

/// # POST /api/categories
pub async fn category_action(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<CategoryForm>,
) -> Result<Json<WriteResponse>, AppError> {
    if form.action != "create" {
        return Err(AppError::BadRequest(format!("Unknown action: {}", form.action)));
    }
    let name: String = required("category_name", &form.category_name)?;
    let ctx = state.context(&session, "categories");
    let id = categories::create_category(
        &ctx,
        &name,
        form.description.as_deref(),
        form.icon.as_deref(),
    )
    .await?;
    Ok(WriteResponse::success("Category created successfully!", Some(id)))
}

// --- Donations -----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct DonationQuery {
    pub campaign_id: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// # GET /api/donations
pub async fn list_donations(
    Query(query): Query<DonationQuery>,
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ReportResult>, AppError> {
    let campaign_id: Option<u64> = optional("campaign_id", &query.campaign_id)?;
    let limit = optional("limit", &query.limit)?;
    let offset = optional("offset", &query.offset)?;
    let ctx = state.context(&session, "donations");
    let result = match campaign_id {
        Some(id) => donations::donations_for_campaign(&ctx, id, limit).await?,
        None => donations::list_donations(&ctx, limit, offset).await?,
    };
    Ok(Json(result))
}

/// # GET /api/donors
pub async fn active_donors(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ReportResult>, AppError> {
    let ctx = state.context(&session, "donations");
    Ok(Json(donations::active_donors(&ctx).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DonationForm {
    pub action: String,
    pub campaign_id: Option<String>,
    pub donor_id: Option<String>,
    pub amount: Option<String>,
    pub payment_method: Option<String>,
    pub is_anonymous: Option<String>,
    pub message: Option<String>,
    pub reward_id: Option<String>,
}

impl DonationForm {
    fn request(&self) -> Result<DonationRequest, AppError> {
        Ok(DonationRequest {
            campaign_id: required("campaign_id", &self.campaign_id)?,
            donor_id: required("donor_id", &self.donor_id)?,
            amount: required("amount", &self.amount)?,
            payment_method: required::<PaymentMethod>("payment_method", &self.payment_method)?,
            is_anonymous: flag(&self.is_anonymous).unwrap_or(false),
            message: text(&self.message),
            reward_id: optional("reward_id", &self.reward_id)?,
        })
    }
}

/// # POST /api/donations
pub async fn donation_action(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<DonationForm>,
) -> Result<Json<WriteResponse>, AppError> {
    if form.action != "donate" {
        return Err(AppError::BadRequest(format!("Unknown action: {}", form.action)));
    }
    let request = form.request()?;
    let ctx = state.context(&session, "donations");
    let receipt: DonationReceipt = donations::process_donation(&ctx, &request).await?;
    let message = match &receipt.reward {
        donations::RewardClaim::Failed { reason, .. } => {
            format!("Donation processed successfully, but the reward could not be claimed: {reason}")
        }
        _ => "Donation processed successfully!".to_string(),
    };
    Ok(Json(WriteResponse {
        status: "success",
        message,
        id: Some(receipt.donation_id),
        data: serde_json::to_value(&receipt).ok(),
    }))
}

// --- Query log -----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub q: Option<String>,
    pub limit: Option<String>,
}

impl LogQuery {
    fn limit(&self) -> Result<u32, AppError> {
        Ok(optional::<u32>("limit", &self.limit)?.unwrap_or(50).clamp(1, 500))
    }
}

/// # GET /api/query-log
pub async fn recent_queries(
    Query(query): Query<LogQuery>,
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<QueryLogEntry>>, AppError> {
    let limit = query.limit()?;
    let ctx = state.context(&session, "query_log");
    Ok(Json(query_log::recent(&ctx, limit).await?))
}

#[derive(Debug, Serialize)]
pub struct QueryLogStats {
    pub by_type: ReportResult,
    pub by_caller: ReportResult,
    pub logger: LoggerStats,
}

/// # GET /api/query-log/stats
pub async fn query_stats(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<QueryLogStats>, AppError> {
    let ctx = state.context(&session, "query_log");
    Ok(Json(QueryLogStats {
        by_type: query_log::stats_by_type(&ctx).await?,
        by_caller: query_log::stats_by_caller(&ctx).await?,
        logger: state.logger.stats(),
    }))
}

/// # GET /api/query-log/search
pub async fn search_queries(
    Query(query): Query<LogQuery>,
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<QueryLogEntry>>, AppError> {
    let limit = query.limit()?;
    let term = query.q.clone().unwrap_or_default();
    let ctx = state.context(&session, "query_log");
    Ok(Json(query_log::search(&ctx, &term, limit).await?))
}
