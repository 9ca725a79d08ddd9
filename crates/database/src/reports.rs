//! Report definitions and typed accessors for the ones with a fixed contract.
//!
//! Every report is a single read-only statement. Aggregation, ranking, windowing and
//! rollups are computed by MySQL; this module only names the statements, declares their
//! parameters and interprets a few well-known result shapes.

use crate::catalog::{ParamSpec, ReportDefinition};
use crate::error::DbError;
use crate::executor::RequestContext;
use crate::statement::Params;
use core_types::{ReportResult, Row, SqlValue};
use rust_decimal::Decimal;
use serde::Serialize;

pub const ALL_CATEGORIES: &str = "ALL CATEGORIES";
pub const ALL_STATUSES: &str = "ALL STATUSES";
pub const ALL_DAYS: &str = "ALL DAYS";
pub const ALL_METHODS: &str = "ALL METHODS";

const MAX_LIMIT: i64 = 500;
const MAX_ID: i64 = i32::MAX as i64;

pub const PLATFORM_STATISTICS: ReportDefinition = ReportDefinition {
    name: "platform-statistics",
    title: "Platform statistics",
    caller: "dashboard",
    params: &[],
    sql: "SELECT
    (SELECT COUNT(*) FROM Users) AS total_users,
    (SELECT COUNT(*) FROM Campaigns) AS total_campaigns,
    (SELECT COUNT(*) FROM Campaigns WHERE status = 'active') AS active_campaigns,
    (SELECT COUNT(*) FROM Campaigns WHERE status = 'completed') AS completed_campaigns,
    (SELECT COALESCE(SUM(amount), 0) FROM Donations WHERE status = 'completed') AS total_funds_raised,
    (SELECT COUNT(*) FROM Donations WHERE status = 'completed') AS total_donations,
    (SELECT COALESCE(AVG(amount), 0) FROM Donations WHERE status = 'completed') AS avg_donation,
    (SELECT COUNT(DISTINCT donor_id) FROM Donations WHERE status = 'completed') AS unique_donors,
    (SELECT COUNT(*) FROM Categories) AS total_categories,
    (SELECT COUNT(*) FROM Campaigns WHERE current_amount >= goal_amount) AS funded_campaigns,
    (SELECT COALESCE(SUM(current_amount >= goal_amount) / NULLIF(COUNT(*), 0), 0)
       FROM Campaigns) AS success_rate",
};

pub const TOP_DONORS: ReportDefinition = ReportDefinition {
    name: "top-donors",
    title: "Top donors by completed donations",
    caller: "dashboard",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 10)],
    sql: "SELECT user_id, username, full_name, donation_count, total_donated, avg_donation,
       last_donation_date
FROM Top_Donors
ORDER BY total_donated DESC
LIMIT :limit",
};

pub const CATEGORY_STATUS_ROLLUP: ReportDefinition = ReportDefinition {
    name: "category-status-rollup",
    title: "Campaigns by category and status, with subtotals",
    caller: "analytics",
    params: &[],
    sql: "SELECT
    CASE WHEN GROUPING(cat.category_name) = 1 THEN 'ALL CATEGORIES'
         ELSE COALESCE(cat.category_name, 'Uncategorized') END AS category,
    CASE WHEN GROUPING(c.status) = 1 THEN 'ALL STATUSES' ELSE c.status END AS status,
    COUNT(*) AS campaign_count,
    SUM(c.goal_amount) AS total_goals,
    SUM(c.current_amount) AS total_raised,
    AVG(c.current_amount) AS avg_raised,
    ROUND(AVG((c.current_amount / c.goal_amount) * 100), 2) AS avg_completion_pct
FROM Campaigns c
LEFT JOIN Categories cat ON c.category_id = cat.category_id
GROUP BY cat.category_name, c.status WITH ROLLUP",
};

pub const DONATION_RUNNING_TOTALS: ReportDefinition = ReportDefinition {
    name: "donation-running-totals",
    title: "Donations with per-campaign running totals",
    caller: "donations",
    params: &[
        ParamSpec::optional_int("campaign_id", 1, MAX_ID),
        ParamSpec::int("limit", 1, MAX_LIMIT, 50),
    ],
    sql: "SELECT
    d.donation_id,
    d.campaign_id,
    c.campaign_title,
    d.amount,
    d.donation_date,
    d.payment_method,
    d.is_anonymous,
    CASE WHEN d.is_anonymous = 1 THEN 'Anonymous Donor' ELSE u.full_name END AS donor_name,
    SUM(d.amount) OVER (
        PARTITION BY d.campaign_id
        ORDER BY d.donation_date, d.donation_id
        ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
    ) AS running_total,
    ROW_NUMBER() OVER (
        PARTITION BY d.campaign_id
        ORDER BY d.amount DESC, d.donation_id
    ) AS donation_rank,
    AVG(d.amount) OVER (PARTITION BY d.campaign_id) AS campaign_avg_donation
FROM Donations d
INNER JOIN Campaigns c ON d.campaign_id = c.campaign_id
INNER JOIN Users u ON d.donor_id = u.user_id
WHERE d.status = 'completed'
  AND (:campaign_id IS NULL OR d.campaign_id = :campaign_id)
ORDER BY d.donation_date DESC, d.donation_id DESC
LIMIT :limit",
};

pub const CAMPAIGN_PERFORMANCE: ReportDefinition = ReportDefinition {
    name: "campaign-performance",
    title: "Campaign performance and funding stage",
    caller: "analytics",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 15)],
    sql: "WITH Campaign_Stats AS (
    SELECT
        c.campaign_id,
        c.campaign_title,
        COALESCE(cat.category_name, 'Uncategorized') AS category,
        c.goal_amount,
        c.current_amount,
        c.created_at,
        COUNT(d.donation_id) AS donation_count,
        AVG(d.amount) AS avg_donation,
        MAX(d.amount) AS max_donation,
        MIN(d.amount) AS min_donation
    FROM Campaigns c
    LEFT JOIN Categories cat ON c.category_id = cat.category_id
    LEFT JOIN Donations d ON c.campaign_id = d.campaign_id AND d.status = 'completed'
    GROUP BY c.campaign_id, c.campaign_title, cat.category_name
),
Donor_Engagement AS (
    SELECT
        campaign_id,
        COUNT(DISTINCT donor_id) AS unique_donors,
        COUNT(CASE WHEN is_anonymous = 1 THEN 1 END) AS anonymous_count,
        COUNT(CASE WHEN is_anonymous = 0 THEN 1 END) AS public_count
    FROM Donations
    WHERE status = 'completed'
    GROUP BY campaign_id
)
SELECT
    cs.*,
    COALESCE(de.unique_donors, 0) AS unique_donors,
    COALESCE(de.anonymous_count, 0) AS anonymous_count,
    COALESCE(de.public_count, 0) AS public_count,
    ROUND((cs.current_amount / cs.goal_amount) * 100, 2) AS completion_percentage,
    CASE
        WHEN cs.current_amount >= cs.goal_amount THEN 'Fully Funded'
        WHEN cs.current_amount >= cs.goal_amount * 0.75 THEN 'Almost There'
        WHEN cs.current_amount >= cs.goal_amount * 0.5 THEN 'Halfway'
        WHEN cs.current_amount >= cs.goal_amount * 0.25 THEN 'Getting Started'
        ELSE 'Just Launched'
    END AS funding_stage
FROM Campaign_Stats cs
LEFT JOIN Donor_Engagement de ON cs.campaign_id = de.campaign_id
ORDER BY cs.current_amount DESC, cs.campaign_id
LIMIT :limit",
};

pub const ACTIVE_CAMPAIGN_RANKING: ReportDefinition = ReportDefinition {
    name: "active-campaign-ranking",
    title: "Active campaigns ranked by progress",
    caller: "analytics",
    params: &[],
    sql: "WITH DonationStats AS (
    SELECT campaign_id,
           COUNT(*) AS donation_count,
           SUM(amount) AS total_raised,
           AVG(amount) AS avg_donation
    FROM Donations
    WHERE status = 'completed'
    GROUP BY campaign_id
),
CampaignRanking AS (
    SELECT c.campaign_id,
           c.campaign_title,
           c.goal_amount,
           COALESCE(ds.total_raised, 0) AS current_amount,
           COALESCE(ds.donation_count, 0) AS donations,
           ROUND((COALESCE(ds.total_raised, 0) / c.goal_amount) * 100, 2) AS progress_pct,
           RANK() OVER (ORDER BY COALESCE(ds.total_raised, 0) / c.goal_amount DESC) AS progress_rank
    FROM Campaigns c
    LEFT JOIN DonationStats ds ON c.campaign_id = ds.campaign_id
    WHERE c.status = 'active'
)
SELECT * FROM CampaignRanking
ORDER BY progress_rank, campaign_id",
};

pub const DONATION_TRENDS_ROLLUP: ReportDefinition = ReportDefinition {
    name: "donation-trends-rollup",
    title: "Daily donations by payment method, with subtotals",
    caller: "analytics",
    params: &[ParamSpec::int("days", 1, 3650, 30)],
    sql: "SELECT
    CASE WHEN GROUPING(t.donation_day) = 1 THEN 'ALL DAYS'
         ELSE DATE_FORMAT(t.donation_day, '%Y-%m-%d') END AS donation_day,
    CASE WHEN GROUPING(t.payment_method) = 1 THEN 'ALL METHODS'
         ELSE t.payment_method END AS payment_method,
    COUNT(*) AS transaction_count,
    SUM(t.amount) AS total_amount
FROM (
    SELECT DATE(donation_date) AS donation_day, payment_method, amount
    FROM Donations
    WHERE status = 'completed'
      AND donation_date >= DATE_SUB(CURDATE(), INTERVAL :days DAY)
) t
GROUP BY t.donation_day, t.payment_method WITH ROLLUP",
};

pub const DONATION_PERIOD_TRENDS: ReportDefinition = ReportDefinition {
    name: "donation-period-trends",
    title: "Donation totals per day, week and month",
    caller: "analytics",
    params: &[],
    sql: "SELECT
    'Daily' AS period_type,
    DATE_FORMAT(donation_date, '%Y-%m-%d') AS period_value,
    COUNT(*) AS donation_count,
    SUM(amount) AS total_amount,
    AVG(amount) AS avg_amount
FROM Donations
WHERE status = 'completed'
  AND donation_date >= DATE_SUB(CURDATE(), INTERVAL 30 DAY)
GROUP BY DATE_FORMAT(donation_date, '%Y-%m-%d')

UNION ALL

SELECT
    'Weekly' AS period_type,
    DATE_FORMAT(donation_date, '%x-W%v') AS period_value,
    COUNT(*) AS donation_count,
    SUM(amount) AS total_amount,
    AVG(amount) AS avg_amount
FROM Donations
WHERE status = 'completed'
  AND donation_date >= DATE_SUB(CURDATE(), INTERVAL 12 WEEK)
GROUP BY DATE_FORMAT(donation_date, '%x-W%v')

UNION ALL

SELECT
    'Monthly' AS period_type,
    DATE_FORMAT(donation_date, '%Y-%m') AS period_value,
    COUNT(*) AS donation_count,
    SUM(amount) AS total_amount,
    AVG(amount) AS avg_amount
FROM Donations
WHERE status = 'completed'
  AND donation_date >= DATE_SUB(CURDATE(), INTERVAL 12 MONTH)
GROUP BY DATE_FORMAT(donation_date, '%Y-%m')

ORDER BY period_type, period_value DESC",
};

pub const CATEGORY_BREAKDOWN: ReportDefinition = ReportDefinition {
    name: "category-breakdown",
    title: "Campaign outcomes per category",
    caller: "analytics",
    params: &[],
    sql: "SELECT
    COALESCE(cat.category_name, 'Uncategorized') AS category,
    COUNT(*) AS total_campaigns,
    SUM(CASE WHEN c.status = 'active' THEN 1 ELSE 0 END) AS active_count,
    SUM(CASE WHEN c.status = 'completed' THEN 1 ELSE 0 END) AS completed_count,
    SUM(CASE WHEN c.status = 'cancelled' THEN 1 ELSE 0 END) AS cancelled_count,
    SUM(CASE WHEN c.current_amount >= c.goal_amount THEN 1 ELSE 0 END) AS funded_count,
    SUM(CASE WHEN c.current_amount < c.goal_amount * 0.25 THEN 1 ELSE 0 END) AS struggling_count,
    SUM(CASE WHEN c.current_amount >= c.goal_amount THEN c.current_amount ELSE 0 END) AS overfunded_amount,
    ROUND(AVG(CASE WHEN c.status = 'active'
                   THEN (c.current_amount / c.goal_amount) * 100 END), 2) AS avg_active_completion
FROM Campaigns c
LEFT JOIN Categories cat ON c.category_id = cat.category_id
GROUP BY cat.category_name
ORDER BY total_campaigns DESC, category",
};

pub const HIGH_PERFORMING_CATEGORIES: ReportDefinition = ReportDefinition {
    name: "high-performing-categories",
    title: "Categories above funding thresholds",
    caller: "analytics",
    params: &[
        ParamSpec::int("min_campaigns", 1, 10_000, 2),
        ParamSpec::int("min_total", 0, 1_000_000_000, 10_000),
        ParamSpec::int("min_average", 0, 1_000_000_000, 5_000),
    ],
    sql: "SELECT
    COALESCE(cat.category_name, 'Uncategorized') AS category,
    COUNT(*) AS campaign_count,
    SUM(c.current_amount) AS total_raised,
    AVG(c.current_amount) AS avg_raised,
    MAX(c.current_amount) AS max_raised,
    COUNT(DISTINCT c.creator_id) AS unique_creators
FROM Campaigns c
LEFT JOIN Categories cat ON c.category_id = cat.category_id
GROUP BY cat.category_name
HAVING COUNT(*) >= :min_campaigns
   AND SUM(c.current_amount) > :min_total
   AND AVG(c.current_amount) > :min_average
ORDER BY SUM(c.current_amount) DESC",
};

pub const CAMPAIGN_PROGRESS: ReportDefinition = ReportDefinition {
    name: "campaign-progress",
    title: "Campaigns closest to their goal",
    caller: "analytics",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 10)],
    sql: "SELECT * FROM Campaign_Progress
ORDER BY completion_percentage DESC, campaign_id
LIMIT :limit",
};

pub const USER_STATISTICS: ReportDefinition = ReportDefinition {
    name: "user-statistics",
    title: "Most engaged users",
    caller: "analytics",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 10)],
    sql: "SELECT * FROM User_Statistics
WHERE total_donated > 0 OR total_funds_raised > 0
ORDER BY total_donated DESC, user_id
LIMIT :limit",
};

pub const ACTIVE_CAMPAIGNS: ReportDefinition = ReportDefinition {
    name: "active-campaigns",
    title: "Newest active campaigns",
    caller: "dashboard",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 6)],
    sql: "SELECT * FROM Active_Campaigns_Summary ORDER BY campaign_id DESC LIMIT :limit",
};

pub const RECENT_DONATIONS: ReportDefinition = ReportDefinition {
    name: "recent-donations",
    title: "Latest completed donations",
    caller: "dashboard",
    params: &[
        ParamSpec::optional_date("since"),
        ParamSpec::int("limit", 1, MAX_LIMIT, 10),
    ],
    sql: "SELECT d.donation_id, d.amount, d.donation_date, c.campaign_title,
       CASE WHEN d.is_anonymous = 1 THEN 'Anonymous' ELSE u.full_name END AS donor_name
FROM Donations d
INNER JOIN Campaigns c ON d.campaign_id = c.campaign_id
INNER JOIN Users u ON d.donor_id = u.user_id
WHERE d.status = 'completed'
  AND (:since IS NULL OR d.donation_date >= :since)
ORDER BY d.donation_date DESC, d.donation_id DESC
LIMIT :limit",
};

pub const PAYMENT_METHOD_STATS: ReportDefinition = ReportDefinition {
    name: "payment-method-stats",
    title: "Donations per payment method",
    caller: "donations",
    params: &[],
    sql: "SELECT
    payment_method,
    COUNT(*) AS donation_count,
    SUM(amount) AS total_amount,
    AVG(amount) AS avg_amount,
    SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed_count,
    SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END) AS pending_count,
    SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed_count,
    SUM(CASE WHEN status = 'refunded' THEN 1 ELSE 0 END) AS refunded_count
FROM Donations
GROUP BY payment_method
ORDER BY total_amount DESC",
};

pub const DONOR_CREATOR_LEADERBOARD: ReportDefinition = ReportDefinition {
    name: "donor-creator-leaderboard",
    title: "Top donors and campaign creators",
    caller: "donations",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 10)],
    sql: "SELECT
    u.user_id,
    u.full_name,
    'Top Donor' AS user_type,
    COALESCE(SUM(d.amount), 0) AS total_amount,
    COUNT(d.donation_id) AS transaction_count
FROM Users u
LEFT JOIN Donations d ON u.user_id = d.donor_id AND d.status = 'completed'
WHERE u.user_role = 'donor'
GROUP BY u.user_id, u.full_name
HAVING total_amount > 0

UNION

SELECT
    u.user_id,
    u.full_name,
    'Campaign Creator' AS user_type,
    COALESCE(SUM(c.current_amount), 0) AS total_amount,
    COUNT(c.campaign_id) AS transaction_count
FROM Users u
LEFT JOIN Campaigns c ON u.user_id = c.creator_id
WHERE u.user_role = 'campaigner'
GROUP BY u.user_id, u.full_name
HAVING total_amount > 0

ORDER BY total_amount DESC
LIMIT :limit",
};

pub const DONATION_AUDIT_LOG: ReportDefinition = ReportDefinition {
    name: "donation-audit-log",
    title: "Donation audit trail",
    caller: "donations",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 10)],
    sql: "SELECT * FROM Donation_Audit_Log ORDER BY performed_at DESC, audit_id DESC LIMIT :limit",
};

pub const CAMPAIGN_STATUS_SUMMARY: ReportDefinition = ReportDefinition {
    name: "campaign-status-summary",
    title: "Campaign totals per status",
    caller: "campaigns",
    params: &[],
    sql: "SELECT
    c.status,
    COUNT(*) AS campaign_count,
    SUM(c.goal_amount) AS total_goal,
    SUM(c.current_amount) AS total_raised,
    AVG(c.current_amount / c.goal_amount * 100) AS avg_progress
FROM Campaigns c
GROUP BY c.status
HAVING campaign_count > 0
ORDER BY campaign_count DESC",
};

pub const TOP_CATEGORIES: ReportDefinition = ReportDefinition {
    name: "top-categories",
    title: "Categories that raised the most",
    caller: "campaigns",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 5)],
    sql: "SELECT
    cat.category_id,
    cat.category_name,
    cat.icon,
    COUNT(DISTINCT c.campaign_id) AS campaign_count,
    COALESCE(SUM(c.current_amount), 0) AS total_raised,
    COALESCE(AVG(c.current_amount / c.goal_amount * 100), 0) AS avg_success_rate
FROM Categories cat
LEFT JOIN Campaigns c ON cat.category_id = c.category_id
GROUP BY cat.category_id, cat.category_name, cat.icon
HAVING campaign_count > 0
ORDER BY total_raised DESC
LIMIT :limit",
};

pub const MOST_FAVORITED_CAMPAIGNS: ReportDefinition = ReportDefinition {
    name: "most-favorited-campaigns",
    title: "Most favorited campaigns",
    caller: "campaigns",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 5)],
    sql: "SELECT
    c.campaign_id,
    c.campaign_title,
    c.goal_amount,
    c.current_amount,
    u.username AS creator_name,
    COUNT(cf.user_id) AS favorite_count,
    (SELECT COUNT(*) FROM Donations WHERE campaign_id = c.campaign_id) AS donation_count
FROM Campaigns c
LEFT JOIN Campaign_Favorites cf ON c.campaign_id = cf.campaign_id
LEFT JOIN Users u ON c.creator_id = u.user_id
GROUP BY c.campaign_id, c.campaign_title, c.goal_amount, c.current_amount, u.username
HAVING favorite_count > 0
ORDER BY favorite_count DESC
LIMIT :limit",
};

pub const USER_DIRECTORY: ReportDefinition = ReportDefinition {
    name: "user-directory",
    title: "All users with activity and tiers",
    caller: "users",
    params: &[],
    sql: "SELECT
    u.user_id,
    u.username,
    u.email,
    u.full_name,
    u.user_role,
    u.account_balance,
    u.is_active,
    u.created_at,
    (SELECT COUNT(*) FROM Campaigns WHERE creator_id = u.user_id) AS campaigns_created,
    (SELECT COUNT(*) FROM Donations
      WHERE donor_id = u.user_id AND status = 'completed') AS donations_made,
    (SELECT COALESCE(SUM(amount), 0) FROM Donations
      WHERE donor_id = u.user_id AND status = 'completed') AS total_donated,
    CASE WHEN u.is_active = TRUE THEN 'Active' ELSE 'Inactive' END AS account_status,
    CASE
        WHEN u.account_balance >= 10000 THEN 'Premium'
        WHEN u.account_balance >= 5000 THEN 'Gold'
        WHEN u.account_balance >= 1000 THEN 'Silver'
        ELSE 'Basic'
    END AS account_tier
FROM Users u
ORDER BY u.created_at DESC, u.user_id DESC",
};

pub const ROLE_STATISTICS: ReportDefinition = ReportDefinition {
    name: "role-statistics",
    title: "Users and balances per role",
    caller: "users",
    params: &[],
    sql: "SELECT
    user_role,
    COUNT(*) AS user_count,
    SUM(account_balance) AS total_balance,
    AVG(account_balance) AS avg_balance,
    MAX(account_balance) AS max_balance,
    SUM(CASE WHEN is_active = TRUE THEN 1 ELSE 0 END) AS active_count,
    SUM(CASE WHEN is_active = FALSE THEN 1 ELSE 0 END) AS inactive_count
FROM Users
GROUP BY user_role
HAVING COUNT(*) > 0
ORDER BY user_count DESC",
};

pub const USER_AUDIT_HISTORY: ReportDefinition = ReportDefinition {
    name: "user-audit-history",
    title: "User change history",
    caller: "users",
    params: &[
        ParamSpec::optional_int("user_id", 1, MAX_ID),
        ParamSpec::optional_text("action", 20),
        ParamSpec::int("limit", 1, MAX_LIMIT, 20),
    ],
    sql: "SELECT ual.*, u.username, u.full_name
FROM User_Audit_Log ual
LEFT JOIN Users u ON ual.user_id = u.user_id
WHERE (:user_id IS NULL OR ual.user_id = :user_id)
  AND (:action IS NULL OR ual.action_type = :action)
ORDER BY ual.changed_at DESC, ual.audit_id DESC
LIMIT :limit",
};

pub const REWARD_OVERVIEW: ReportDefinition = ReportDefinition {
    name: "reward-overview",
    title: "Campaigns offering rewards",
    caller: "rewards",
    params: &[],
    sql: "SELECT
    c.campaign_id,
    c.campaign_title,
    c.goal_amount,
    c.current_amount,
    c.status,
    COUNT(DISTINCT r.reward_id) AS total_rewards,
    COUNT(DISTINCT CASE WHEN r.is_available = 1 THEN r.reward_id END) AS available_rewards,
    MIN(r.min_amount) AS lowest_reward,
    MAX(r.min_amount) AS highest_reward
FROM Campaigns c
LEFT JOIN Rewards r ON c.campaign_id = r.campaign_id
WHERE c.status IN ('active', 'completed')
GROUP BY c.campaign_id
HAVING total_rewards > 0
ORDER BY c.status = 'active' DESC, c.created_at DESC",
};

pub const REWARD_CLAIMS: ReportDefinition = ReportDefinition {
    name: "reward-claims",
    title: "Latest reward claims",
    caller: "rewards",
    params: &[ParamSpec::int("limit", 1, MAX_LIMIT, 20)],
    sql: "SELECT
    dr.donor_id,
    dr.reward_id,
    dr.donation_id,
    dr.claimed_at,
    dr.fulfillment_status,
    u.username,
    u.full_name,
    r.title AS reward_title,
    c.campaign_title,
    d.amount AS donation_amount,
    r.min_amount AS required_amount
FROM Donor_Rewards dr
INNER JOIN Users u ON dr.donor_id = u.user_id
INNER JOIN Rewards r ON dr.reward_id = r.reward_id
INNER JOIN Campaigns c ON r.campaign_id = c.campaign_id
INNER JOIN Donations d ON dr.donation_id = d.donation_id
ORDER BY dr.claimed_at DESC
LIMIT :limit",
};

pub const REWARD_STATISTICS: ReportDefinition = ReportDefinition {
    name: "reward-statistics",
    title: "Reward totals",
    caller: "rewards",
    params: &[],
    sql: "SELECT
    COUNT(DISTINCT r.reward_id) AS total_rewards,
    COUNT(DISTINCT CASE WHEN r.is_available = 1 THEN r.reward_id END) AS available_rewards,
    COUNT(DISTINCT CASE WHEN r.is_available = 0 THEN r.reward_id END) AS full_rewards,
    SUM(r.current_backers) AS total_backers,
    COUNT(DISTINCT dr.donor_id) AS unique_donors,
    AVG(r.min_amount) AS avg_min_amount,
    MIN(r.min_amount) AS lowest_min_amount,
    MAX(r.min_amount) AS highest_min_amount
FROM Rewards r
LEFT JOIN Donor_Rewards dr ON r.reward_id = dr.reward_id",
};

/// Every report, in display order.
pub static REPORTS: &[ReportDefinition] = &[
    PLATFORM_STATISTICS,
    TOP_DONORS,
    ACTIVE_CAMPAIGNS,
    RECENT_DONATIONS,
    CATEGORY_STATUS_ROLLUP,
    CAMPAIGN_PERFORMANCE,
    ACTIVE_CAMPAIGN_RANKING,
    DONATION_TRENDS_ROLLUP,
    DONATION_PERIOD_TRENDS,
    CATEGORY_BREAKDOWN,
    HIGH_PERFORMING_CATEGORIES,
    CAMPAIGN_PROGRESS,
    USER_STATISTICS,
    DONATION_RUNNING_TOTALS,
    PAYMENT_METHOD_STATS,
    DONOR_CREATOR_LEADERBOARD,
    DONATION_AUDIT_LOG,
    CAMPAIGN_STATUS_SUMMARY,
    TOP_CATEGORIES,
    MOST_FAVORITED_CAMPAIGNS,
    USER_DIRECTORY,
    ROLE_STATISTICS,
    USER_AUDIT_HISTORY,
    REWARD_OVERVIEW,
    REWARD_CLAIMS,
    REWARD_STATISTICS,
];

pub fn find(name: &str) -> Option<&'static ReportDefinition> {
    REPORTS.iter().find(|r| r.name == name)
}

/// Runs a report with typed parameters.
pub async fn run_with(
    ctx: &RequestContext,
    report: &ReportDefinition,
    params: Params,
) -> Result<ReportResult, DbError> {
    let params = report.validate(params)?;
    Ok(ctx.fetch_all(&report.statement(params)).await?)
}

/// Runs a report by name with raw string parameters.
pub async fn run<'a, I>(ctx: &RequestContext, name: &str, raw: I) -> Result<ReportResult, DbError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let report = find(name).ok_or_else(|| DbError::UnknownReport(name.to_string()))?;
    let params = report.parse(raw)?;
    Ok(ctx.fetch_all(&report.statement(params)).await?)
}

/// The single row of the platform statistics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformStatistics {
    pub total_users: i64,
    pub total_campaigns: i64,
    pub active_campaigns: i64,
    pub completed_campaigns: i64,
    pub funded_campaigns: i64,
    pub total_funds_raised: Decimal,
    pub total_donations: i64,
    pub avg_donation: Decimal,
    pub unique_donors: i64,
    pub total_categories: i64,
    /// Funded campaigns over all campaigns, in `[0, 1]`. Zero when there are no campaigns.
    pub success_rate: Decimal,
}

impl PlatformStatistics {
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            total_users: row.i64("total_users")?,
            total_campaigns: row.i64("total_campaigns")?,
            active_campaigns: row.i64("active_campaigns")?,
            completed_campaigns: row.i64("completed_campaigns")?,
            funded_campaigns: row.i64("funded_campaigns")?,
            total_funds_raised: row.decimal_or_zero("total_funds_raised")?,
            total_donations: row.i64("total_donations")?,
            avg_donation: row.decimal_or_zero("avg_donation")?,
            unique_donors: row.i64("unique_donors")?,
            total_categories: row.i64("total_categories")?,
            success_rate: row.decimal_or_zero("success_rate")?,
        })
    }
}

pub async fn platform_statistics(ctx: &RequestContext) -> Result<PlatformStatistics, DbError> {
    let result = run_with(ctx, &PLATFORM_STATISTICS, Params::new()).await?;
    let row = result
        .first()
        .ok_or(DbError::NotFound("platform statistics row"))?;
    PlatformStatistics::from_row(row)
}

/// Up to `limit` donors, highest completed total first. Tie order is unspecified.
pub async fn top_donors(ctx: &RequestContext, limit: u32) -> Result<ReportResult, DbError> {
    run_with(ctx, &TOP_DONORS, Params::new().bind("limit", limit)).await
}

pub async fn category_status_rollup(ctx: &RequestContext) -> Result<ReportResult, DbError> {
    run_with(ctx, &CATEGORY_STATUS_ROLLUP, Params::new()).await
}

/// Completed donations annotated with per-campaign window aggregates, newest first.
pub async fn donation_running_totals(
    ctx: &RequestContext,
    campaign_id: Option<u64>,
    limit: u32,
) -> Result<ReportResult, DbError> {
    let params = Params::new()
        .bind("campaign_id", campaign_id)
        .bind("limit", limit);
    run_with(ctx, &DONATION_RUNNING_TOTALS, params).await
}

/// Where a row of a two-level rollup sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupLevel {
    Detail,
    Subtotal,
    GrandTotal,
}

impl RollupLevel {
    /// Classifies a row by the sentinels in its outer and inner grouping columns.
    pub fn classify(outer: &SqlValue, inner: &SqlValue, outer_sentinel: &str, inner_sentinel: &str) -> Self {
        let outer_total = outer.as_str() == Some(outer_sentinel);
        let inner_total = inner.as_str() == Some(inner_sentinel);
        match (outer_total, inner_total) {
            (true, _) => RollupLevel::GrandTotal,
            (false, true) => RollupLevel::Subtotal,
            (false, false) => RollupLevel::Detail,
        }
    }

    /// For rows of `category-status-rollup`.
    pub fn of_category_status(row: &Row) -> Self {
        Self::classify(
            row.get("category").unwrap_or(&SqlValue::Null),
            row.get("status").unwrap_or(&SqlValue::Null),
            ALL_CATEGORIES,
            ALL_STATUSES,
        )
    }

    /// For rows of `donation-trends-rollup`.
    pub fn of_day_method(row: &Row) -> Self {
        Self::classify(
            row.get("donation_day").unwrap_or(&SqlValue::Null),
            row.get("payment_method").unwrap_or(&SqlValue::Null),
            ALL_DAYS,
            ALL_METHODS,
        )
    }

    pub fn is_total(&self) -> bool {
        !matches!(self, RollupLevel::Detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParamDefault;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    #[test]
    fn report_names_are_unique() {
        let names: HashSet<_> = REPORTS.iter().map(|r| r.name).collect();
        assert_eq!(names.len(), REPORTS.len());
    }

    #[test]
    fn every_report_compiles_with_its_defaults() {
        for report in REPORTS {
            assert!(
                report.params.iter().all(|p| p.default != ParamDefault::Required),
                "{} has a required parameter",
                report.name
            );
            let params = report.parse([]).unwrap();
            let compiled = report.statement(params).compile();
            assert!(compiled.is_ok(), "{} failed to compile: {:?}", report.name, compiled.err());
        }
    }

    #[test]
    fn every_report_is_read_only() {
        for report in REPORTS {
            assert!(
                crate::statement::returns_rows(report.sql),
                "{} does not return rows",
                report.name
            );
        }
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(find("top-donors").map(|r| r.name), Some("top-donors"));
        assert!(find("drop-everything").is_none());
    }

    #[test]
    fn recent_donations_filter_by_an_optional_date() {
        let params = RECENT_DONATIONS.parse([("since", "2024-05-01")]).unwrap();
        assert_eq!(
            params.get("since"),
            Some(&SqlValue::Date(chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
        );
        assert!(RECENT_DONATIONS.statement(params).compile().is_ok());
        assert!(RECENT_DONATIONS.parse([("since", "last week")]).is_err());
    }

    #[test]
    fn audit_history_filters_by_action() {
        let params = USER_AUDIT_HISTORY.parse([("action", "UPDATE")]).unwrap();
        assert_eq!(params.get("action"), Some(&SqlValue::from("UPDATE")));
        assert_eq!(
            USER_AUDIT_HISTORY.parse([]).unwrap().get("action"),
            Some(&SqlValue::Null)
        );
        let too_long = "X".repeat(21);
        assert!(USER_AUDIT_HISTORY.parse([("action", too_long.as_str())]).is_err());
    }

    #[test]
    fn rollup_rows_are_classified_by_sentinels() {
        let detail = Row::new().with("category", "Arts").with("status", "active");
        let subtotal = Row::new().with("category", "Arts").with("status", ALL_STATUSES);
        let total = Row::new()
            .with("category", ALL_CATEGORIES)
            .with("status", ALL_STATUSES);

        assert_eq!(RollupLevel::of_category_status(&detail), RollupLevel::Detail);
        assert_eq!(RollupLevel::of_category_status(&subtotal), RollupLevel::Subtotal);
        assert_eq!(RollupLevel::of_category_status(&total), RollupLevel::GrandTotal);
        assert!(RollupLevel::GrandTotal.is_total());
    }

    #[test]
    fn day_method_rollup_uses_its_own_sentinels() {
        let subtotal = Row::new()
            .with("donation_day", "2024-05-01")
            .with("payment_method", ALL_METHODS);
        let total = Row::new()
            .with("donation_day", ALL_DAYS)
            .with("payment_method", ALL_METHODS);
        assert_eq!(RollupLevel::of_day_method(&subtotal), RollupLevel::Subtotal);
        assert_eq!(RollupLevel::of_day_method(&total), RollupLevel::GrandTotal);
    }

    #[test]
    fn null_aggregates_read_as_zero() {
        // What the server sends for AVG/SUM over no rows when a COALESCE is missing.
        let row = Row::new()
            .with("total_users", 0_i64)
            .with("total_campaigns", 0_i64)
            .with("active_campaigns", 0_i64)
            .with("completed_campaigns", 0_i64)
            .with("total_funds_raised", SqlValue::Null)
            .with("total_donations", 0_i64)
            .with("avg_donation", SqlValue::Null)
            .with("unique_donors", 0_i64)
            .with("total_categories", 6_i64)
            .with("funded_campaigns", dec!(0))
            .with("success_rate", SqlValue::Null);

        let stats = PlatformStatistics::from_row(&row).unwrap();
        assert_eq!(stats.avg_donation, Decimal::ZERO);
        assert_eq!(stats.success_rate, Decimal::ZERO);
        assert_eq!(stats.total_categories, 6);
    }

    #[test]
    fn success_rate_guards_against_an_empty_campaign_set() {
        let sql = PLATFORM_STATISTICS.sql;
        assert!(sql.contains("NULLIF(COUNT(*), 0)"));
        assert!(sql.contains("COALESCE(SUM(current_amount >= goal_amount)"));
    }

    #[test]
    fn missing_statistics_column_is_a_shape_error() {
        let err = PlatformStatistics::from_row(&Row::new()).unwrap_err();
        assert!(matches!(err, DbError::ResultShape(_)));
    }
}
