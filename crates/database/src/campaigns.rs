use crate::builder::{QueryBuilder, UpdateBuilder, like_pattern};
use crate::error::DbError;
use crate::executor::RequestContext;
use crate::statement::Statement;
use chrono::NaiveDate;
use core_types::{CampaignStatus, QueryKind, ReportResult, Row};
use rust_decimal::Decimal;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

pub const UPDATABLE_COLUMNS: &[&str] = &[
    "campaign_title",
    "description",
    "goal_amount",
    "category_id",
    "start_date",
    "end_date",
    "status",
    "featured",
    "image_url",
];

/// Optional filters of the campaign listing. Every field narrows the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignFilter {
    pub status: Option<CampaignStatus>,
    pub category_id: Option<u64>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl CampaignFilter {
    pub fn statement(&self) -> Statement {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(like_pattern);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        QueryBuilder::new("SELECT * FROM Campaign_Progress")
            .filter_opt("status = :status", "status", self.status.map(|s| s.as_str()))
            .filter_opt("category_id = :category_id", "category_id", self.category_id)
            .filter_opt("campaign_title LIKE :search", "search", search)
            .order_by("created_at DESC, campaign_id DESC")
            .paginate(limit, self.offset.unwrap_or(0))
            .build()
    }
}

pub async fn list_campaigns(
    ctx: &RequestContext,
    filter: &CampaignFilter,
) -> Result<ReportResult, DbError> {
    Ok(ctx.fetch_all(&filter.statement()).await?)
}

fn search_statement(term: &str, limit: u32) -> Result<Statement, DbError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(DbError::invalid("q", "search term must not be empty"));
    }
    Ok(Statement::new(
        "SELECT c.campaign_id, c.campaign_title, c.description, c.goal_amount, c.current_amount, \
                c.status, u.full_name AS creator_name, cat.category_name, \
                MATCH(c.campaign_title, c.description) AGAINST (:term IN NATURAL LANGUAGE MODE) AS relevance \
         FROM Campaigns c \
         INNER JOIN Users u ON c.creator_id = u.user_id \
         LEFT JOIN Categories cat ON c.category_id = cat.category_id \
         WHERE MATCH(c.campaign_title, c.description) AGAINST (:term IN NATURAL LANGUAGE MODE) \
            OR c.campaign_title LIKE :pattern \
            OR c.description LIKE :pattern \
         ORDER BY relevance DESC, c.campaign_id DESC \
         LIMIT :limit",
    )
    .bind("term", term)
    .bind("pattern", like_pattern(term))
    .bind("limit", limit.clamp(1, MAX_PAGE_SIZE)))
}

/// Full-text search over titles and descriptions, falling back to substring matches.
pub async fn search_campaigns(
    ctx: &RequestContext,
    term: &str,
    limit: u32,
) -> Result<ReportResult, DbError> {
    Ok(ctx.fetch_all(&search_statement(term, limit)?).await?)
}

/// One campaign with creator, category and engagement counters.
pub async fn get_campaign(ctx: &RequestContext, campaign_id: u64) -> Result<Row, DbError> {
    let stmt = Statement::new(
        "SELECT c.*, \
                u.username AS creator_username, \
                u.full_name AS creator_name, \
                cat.category_name, \
                ROUND((c.current_amount / c.goal_amount) * 100, 2) AS completion_percentage, \
                (SELECT COUNT(*) FROM Comments WHERE campaign_id = c.campaign_id) AS comment_count, \
                (SELECT COUNT(*) FROM Campaign_Favorites WHERE campaign_id = c.campaign_id) AS favorite_count, \
                (SELECT COUNT(*) FROM Donations \
                  WHERE campaign_id = c.campaign_id AND status = 'completed') AS donation_count \
         FROM Campaigns c \
         INNER JOIN Users u ON c.creator_id = u.user_id \
         LEFT JOIN Categories cat ON c.category_id = cat.category_id \
         WHERE c.campaign_id = :campaign_id",
    )
    .bind("campaign_id", campaign_id);
    ctx.fetch_optional(&stmt)
        .await?
        .ok_or(DbError::NotFound("campaign"))
}

/// Comments of a campaign, top-level threads first, each with its reply count.
pub async fn campaign_comments(
    ctx: &RequestContext,
    campaign_id: u64,
) -> Result<ReportResult, DbError> {
    let stmt = Statement::new(
        "SELECT cm.comment_id, cm.parent_comment_id, cm.content, cm.comment_date, \
                u.username, u.full_name, \
                (SELECT COUNT(*) FROM Comments r WHERE r.parent_comment_id = cm.comment_id) AS reply_count \
         FROM Comments cm \
         INNER JOIN Users u ON cm.user_id = u.user_id \
         WHERE cm.campaign_id = :campaign_id \
         ORDER BY cm.parent_comment_id IS NOT NULL, cm.parent_comment_id, cm.comment_date",
    )
    .bind("campaign_id", campaign_id);
    Ok(ctx.fetch_all(&stmt).await?)
}

pub async fn campaign_rewards(
    ctx: &RequestContext,
    campaign_id: u64,
) -> Result<ReportResult, DbError> {
    let stmt = Statement::new(
        "SELECT reward_id, title, description, min_amount, max_backers, current_backers, \
                is_available, estimated_delivery, \
                CASE WHEN max_backers IS NULL THEN NULL \
                     ELSE max_backers - current_backers END AS remaining_slots \
         FROM Rewards \
         WHERE campaign_id = :campaign_id \
         ORDER BY min_amount, reward_id",
    )
    .bind("campaign_id", campaign_id);
    Ok(ctx.fetch_all(&stmt).await?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub title: String,
    pub description: Option<String>,
    pub goal_amount: Decimal,
    pub creator_id: u64,
    pub category_id: Option<u64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: CampaignStatus,
    pub image_url: Option<String>,
}

impl NewCampaign {
    fn statement(&self) -> Result<Statement, DbError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DbError::invalid("campaign_title", "must not be empty"));
        }
        Ok(Statement::new(
            "INSERT INTO Campaigns \
             (campaign_title, description, goal_amount, creator_id, category_id, \
              start_date, end_date, status, image_url) \
             VALUES (:campaign_title, :description, :goal_amount, :creator_id, :category_id, \
                     :start_date, :end_date, :status, :image_url)",
        )
        .bind("campaign_title", title)
        .bind("description", self.description.clone())
        .bind("goal_amount", self.goal_amount)
        .bind("creator_id", self.creator_id)
        .bind("category_id", self.category_id)
        .bind("start_date", self.start_date)
        .bind("end_date", self.end_date)
        .bind("status", self.status.as_str())
        .bind("image_url", self.image_url.clone())
        .tagged(QueryKind::Insert))
    }
}

/// Creates a campaign and returns its id. Goal and date rules are enforced by the schema.
pub async fn create_campaign(ctx: &RequestContext, campaign: &NewCampaign) -> Result<u64, DbError> {
    let outcome = ctx.fetch(&campaign.statement()?).await?;
    let campaign_id = outcome
        .last_insert_id
        .ok_or(DbError::NotFound("inserted campaign id"))?;
    tracing::info!(campaign_id, creator_id = campaign.creator_id, "Created campaign");
    Ok(campaign_id)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub goal_amount: Option<Decimal>,
    pub category_id: Option<u64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<CampaignStatus>,
    pub featured: Option<bool>,
    pub image_url: Option<String>,
}

impl CampaignChanges {
    fn statement(&self, campaign_id: u64) -> Result<Statement, DbError> {
        UpdateBuilder::new("Campaigns", UPDATABLE_COLUMNS)
            .set_opt("campaign_title", self.title.as_deref().map(str::trim))?
            .set_opt("description", self.description.clone())?
            .set_opt("goal_amount", self.goal_amount)?
            .set_opt("category_id", self.category_id)?
            .set_opt("start_date", self.start_date)?
            .set_opt("end_date", self.end_date)?
            .set_opt("status", self.status.map(|s| s.as_str()))?
            .set_opt("featured", self.featured)?
            .set_opt("image_url", self.image_url.clone())?
            .build("campaign_id", campaign_id)
    }
}

/// Applies a partial update. Fails with `NotFound` when no such campaign exists.
pub async fn update_campaign(
    ctx: &RequestContext,
    campaign_id: u64,
    changes: &CampaignChanges,
) -> Result<(), DbError> {
    let stmt = changes.statement(campaign_id)?;
    let outcome = ctx.fetch(&stmt).await?;
    if outcome.rows_affected == 0 {
        // MySQL reports zero for an unchanged row too, so confirm the row exists.
        get_campaign(ctx, campaign_id).await?;
    }
    tracing::info!(campaign_id, "Updated campaign");
    Ok(())
}

pub async fn delete_campaign(ctx: &RequestContext, campaign_id: u64) -> Result<(), DbError> {
    let outcome = ctx
        .fetch(
            &Statement::new("DELETE FROM Campaigns WHERE campaign_id = :campaign_id")
                .bind("campaign_id", campaign_id),
        )
        .await?;
    if outcome.rows_affected == 0 {
        return Err(DbError::NotFound("campaign"));
    }
    tracing::info!(campaign_id, "Deleted campaign");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::SqlValue;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_filter_lists_the_first_page() {
        let compiled = CampaignFilter::default().statement().compile().unwrap();
        assert!(!compiled.sql.contains("WHERE"));
        assert_eq!(compiled.values, [SqlValue::Int(20), SqlValue::Int(0)]);
    }

    #[test]
    fn filters_narrow_the_listing() {
        let filter = CampaignFilter {
            status: Some(CampaignStatus::Active),
            category_id: Some(3),
            search: Some("  solar  ".to_string()),
            limit: Some(500),
            offset: Some(40),
        };
        let stmt = filter.statement();
        assert_eq!(
            stmt.template(),
            "SELECT * FROM Campaign_Progress \
             WHERE status = :status AND category_id = :category_id AND campaign_title LIKE :search \
             ORDER BY created_at DESC, campaign_id DESC LIMIT :limit OFFSET :offset"
        );
        assert_eq!(stmt.params().get("search"), Some(&SqlValue::from("%solar%")));
        assert_eq!(stmt.params().get("limit"), Some(&SqlValue::Int(100)));
    }

    #[test]
    fn blank_search_is_ignored_by_the_listing() {
        let filter = CampaignFilter {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(filter.statement().params().get("search").is_none());
    }

    #[test]
    fn search_binds_the_term_and_never_inlines_it() {
        let hostile = "' OR '1'='1";
        let stmt = search_statement(hostile, 10).unwrap();
        let compiled = stmt.compile().unwrap();
        assert!(!compiled.sql.contains(hostile));
        assert_eq!(compiled.values.len(), 5);
        assert_eq!(compiled.values[0], SqlValue::from(hostile));

        assert!(search_statement("  ", 10).is_err());
    }

    #[test]
    fn new_campaign_binds_every_column() {
        let campaign = NewCampaign {
            title: " Solar school ".to_string(),
            description: None,
            goal_amount: dec!(5000),
            creator_id: 2,
            category_id: Some(1),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            status: CampaignStatus::Draft,
            image_url: None,
        };
        let stmt = campaign.statement().unwrap();
        assert_eq!(stmt.params().get("campaign_title"), Some(&SqlValue::from("Solar school")));
        assert_eq!(stmt.params().get("description"), Some(&SqlValue::Null));
        assert_eq!(stmt.query_kind(), QueryKind::Insert);
        assert!(stmt.compile().is_ok());

        let untitled = NewCampaign {
            title: String::new(),
            ..campaign
        };
        assert!(untitled.statement().is_err());
    }

    #[test]
    fn changes_touch_only_supplied_columns() {
        let changes = CampaignChanges {
            status: Some(CampaignStatus::Active),
            featured: Some(true),
            ..Default::default()
        };
        let stmt = changes.statement(9).unwrap();
        assert_eq!(
            stmt.template(),
            "UPDATE Campaigns SET status = :status, featured = :featured \
             WHERE campaign_id = :campaign_id"
        );
        assert!(CampaignChanges::default().statement(9).is_err());
    }
}
