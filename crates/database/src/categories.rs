use crate::error::DbError;
use crate::executor::RequestContext;
use crate::statement::Statement;
use core_types::ReportResult;

pub const DEFAULT_ICON: &str = "fa-folder";

/// Every category with its campaign count and total raised, alphabetically.
pub async fn list_categories(ctx: &RequestContext) -> Result<ReportResult, DbError> {
    let stmt = Statement::new(
        "SELECT cat.category_id, cat.category_name, cat.description, cat.icon, \
                COUNT(c.campaign_id) AS campaign_count, \
                COALESCE(SUM(c.current_amount), 0) AS total_raised \
         FROM Categories cat \
         LEFT JOIN Campaigns c ON cat.category_id = c.category_id \
         GROUP BY cat.category_id, cat.category_name, cat.description, cat.icon \
         ORDER BY cat.category_name",
    );
    Ok(ctx.fetch_all(&stmt).await?)
}

fn create_statement(name: &str, description: Option<&str>, icon: Option<&str>) -> Result<Statement, DbError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::invalid("category_name", "must not be empty"));
    }
    let icon = icon
        .map(str::trim)
        .filter(|icon| !icon.is_empty())
        .unwrap_or(DEFAULT_ICON);
    Ok(Statement::new(
        "INSERT INTO Categories (category_name, description, icon) \
         VALUES (:category_name, :description, :icon)",
    )
    .bind("category_name", name)
    .bind("description", description.map(str::trim).filter(|d| !d.is_empty()))
    .bind("icon", icon))
}

/// Creates a category and returns its id. Names are unique.
pub async fn create_category(
    ctx: &RequestContext,
    name: &str,
    description: Option<&str>,
    icon: Option<&str>,
) -> Result<u64, DbError> {
    let outcome = ctx.fetch(&create_statement(name, description, icon)?).await?;
    let category_id = outcome
        .last_insert_id
        .ok_or(DbError::NotFound("inserted category id"))?;
    tracing::info!(category_id, name = name.trim(), "Created category");
    Ok(category_id)
}
