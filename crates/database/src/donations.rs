//! Donation processing and donation listings.
//!
//! A donation moves money between two rows, so it runs as one transaction that locks the
//! campaign and the donor, records the donation and its audit row, and adjusts both
//! balances. A reward claim is attempted afterwards in a transaction of its own.

use crate::error::DbError;
use crate::executor::{RequestContext, TransactionContext};
use crate::statement::Statement;
use core_types::{CampaignStatus, PaymentMethod, ReportResult, Row};
use rust_decimal::Decimal;
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct DonationRequest {
    pub campaign_id: u64,
    pub donor_id: u64,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub reward_id: Option<u64>,
}

/// Outcome of the optional reward claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RewardClaim {
    NotRequested,
    Claimed { reward_id: u64 },
    Failed { reward_id: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonationReceipt {
    pub donation_id: u64,
    pub campaign_id: u64,
    pub donor_id: u64,
    pub amount: Decimal,
    pub campaign_total: Decimal,
    pub donor_balance: Decimal,
    pub reward: RewardClaim,
}

/// The locked campaign row.
#[derive(Debug, Clone, PartialEq)]
struct CampaignLock {
    status: CampaignStatus,
    current_amount: Decimal,
}

impl CampaignLock {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            status: row.text("status")?.parse()?,
            current_amount: row.decimal_or_zero("current_amount")?,
        })
    }
}

/// The locked donor row.
#[derive(Debug, Clone, PartialEq)]
struct DonorLock {
    is_active: bool,
    balance: Decimal,
}

impl DonorLock {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            is_active: row.i64("is_active")? != 0,
            balance: row.decimal_or_zero("account_balance")?,
        })
    }
}

/// Business rules of a donation, checked against the locked rows.
fn admit(
    campaign: Option<&CampaignLock>,
    donor: Option<&DonorLock>,
    amount: Decimal,
) -> Result<(), DbError> {
    let campaign = campaign.ok_or_else(|| DbError::Rejected("Campaign not found".to_string()))?;
    if !campaign.status.accepts_donations() {
        return Err(DbError::Rejected(format!(
            "Campaign is {} and not accepting donations",
            campaign.status
        )));
    }
    let donor = donor.ok_or_else(|| DbError::Rejected("Donor not found".to_string()))?;
    if !donor.is_active {
        return Err(DbError::Rejected("Donor account is inactive".to_string()));
    }
    if donor.balance < amount {
        return Err(DbError::Rejected(format!(
            "Insufficient balance: {} available, {} requested",
            donor.balance, amount
        )));
    }
    Ok(())
}

async fn lock_row(
    tx: &mut TransactionContext<'_>,
    stmt: Statement,
) -> Result<Option<Row>, DbError> {
    Ok(tx.fetch_optional(&stmt).await?)
}

/// Records a completed donation. Business rejections roll back and surface as
/// [`DbError::Rejected`]; a failed reward claim is reported in the receipt only.
pub async fn process_donation(
    ctx: &RequestContext,
    request: &DonationRequest,
) -> Result<DonationReceipt, DbError> {
    if request.amount <= Decimal::ZERO {
        return Err(DbError::invalid("amount", "must be greater than zero"));
    }

    let mut tx = ctx.begin().await?;

    let campaign = lock_row(
        &mut tx,
        Statement::new(
            "SELECT status, current_amount FROM Campaigns \
             WHERE campaign_id = :campaign_id FOR UPDATE",
        )
        .bind("campaign_id", request.campaign_id),
    )
    .await?
    .map(|row| CampaignLock::from_row(&row))
    .transpose()?;

    let donor = lock_row(
        &mut tx,
        Statement::new(
            "SELECT is_active, account_balance FROM Users \
             WHERE user_id = :donor_id FOR UPDATE",
        )
        .bind("donor_id", request.donor_id),
    )
    .await?
    .map(|row| DonorLock::from_row(&row))
    .transpose()?;

    if let Err(err) = admit(campaign.as_ref(), donor.as_ref(), request.amount) {
        tx.rollback().await?;
        tracing::info!(
            campaign_id = request.campaign_id,
            donor_id = request.donor_id,
            reason = %err,
            "Donation rejected"
        );
        return Err(err);
    }

    let inserted = tx
        .fetch(
            &Statement::new(
                "INSERT INTO Donations \
                 (campaign_id, donor_id, amount, payment_method, status, is_anonymous, message) \
                 VALUES (:campaign_id, :donor_id, :amount, :payment_method, 'completed', \
                         :is_anonymous, :message)",
            )
            .bind("campaign_id", request.campaign_id)
            .bind("donor_id", request.donor_id)
            .bind("amount", request.amount)
            .bind("payment_method", request.payment_method.as_str())
            .bind("is_anonymous", request.is_anonymous)
            .bind("message", request.message.clone()),
        )
        .await?;
    let donation_id = inserted
        .last_insert_id
        .ok_or(DbError::NotFound("inserted donation id"))?;

    tx.fetch(
        &Statement::new(
            "UPDATE Campaigns SET current_amount = current_amount + :amount \
             WHERE campaign_id = :campaign_id",
        )
        .bind("amount", request.amount)
        .bind("campaign_id", request.campaign_id),
    )
    .await?;

    tx.fetch(
        &Statement::new(
            "UPDATE Users SET account_balance = account_balance - :amount \
             WHERE user_id = :donor_id",
        )
        .bind("amount", request.amount)
        .bind("donor_id", request.donor_id),
    )
    .await?;

    tx.fetch(
        &Statement::new(
            "INSERT INTO Donation_Audit_Log \
             (donation_id, campaign_id, donor_id, action_type, amount, old_status, new_status) \
             VALUES (:donation_id, :campaign_id, :donor_id, 'INSERT', :amount, NULL, 'completed')",
        )
        .bind("donation_id", donation_id)
        .bind("campaign_id", request.campaign_id)
        .bind("donor_id", request.donor_id)
        .bind("amount", request.amount),
    )
    .await?;

    tx.commit().await?;

    // Both rows were locked, so these are the committed values.
    let campaign_total = campaign.map(|c| c.current_amount).unwrap_or_default() + request.amount;
    let donor_balance = donor.map(|d| d.balance).unwrap_or_default() - request.amount;

    tracing::info!(
        donation_id,
        campaign_id = request.campaign_id,
        donor_id = request.donor_id,
        amount = %request.amount,
        "Donation completed"
    );

    let reward = match request.reward_id {
        None => RewardClaim::NotRequested,
        Some(reward_id) => match claim_reward(ctx, request, donation_id, reward_id).await {
            Ok(()) => RewardClaim::Claimed { reward_id },
            Err(err) => {
                tracing::warn!(donation_id, reward_id, error = %err, "Reward claim failed");
                RewardClaim::Failed {
                    reward_id,
                    reason: err.to_string(),
                }
            }
        },
    };

    Ok(DonationReceipt {
        donation_id,
        campaign_id: request.campaign_id,
        donor_id: request.donor_id,
        amount: request.amount,
        campaign_total,
        donor_balance,
        reward,
    })
}

#[derive(Debug, Clone, PartialEq)]
struct RewardLock {
    campaign_id: u64,
    min_amount: Decimal,
    max_backers: Option<i64>,
    current_backers: i64,
    is_available: bool,
}

impl RewardLock {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        let max_backers = match row.get("max_backers") {
            Some(value) if !value.is_null() => Some(row.i64("max_backers")?),
            _ => None,
        };
        Ok(Self {
            campaign_id: row.u64("campaign_id")?,
            min_amount: row.decimal_or_zero("min_amount")?,
            max_backers,
            current_backers: row.i64("current_backers")?,
            is_available: row.i64("is_available")? != 0,
        })
    }

    fn admit(&self, campaign_id: u64, amount: Decimal) -> Result<(), DbError> {
        if self.campaign_id != campaign_id {
            return Err(DbError::Rejected(
                "Reward belongs to a different campaign".to_string(),
            ));
        }
        if amount < self.min_amount {
            return Err(DbError::Rejected(format!(
                "Reward requires a donation of at least {}",
                self.min_amount
            )));
        }
        let full = self
            .max_backers
            .is_some_and(|max| self.current_backers >= max);
        if !self.is_available || full {
            return Err(DbError::Rejected("Reward is no longer available".to_string()));
        }
        Ok(())
    }
}

async fn claim_reward(
    ctx: &RequestContext,
    request: &DonationRequest,
    donation_id: u64,
    reward_id: u64,
) -> Result<(), DbError> {
    let mut tx = ctx.begin().await?;

    let reward = lock_row(
        &mut tx,
        Statement::new(
            "SELECT campaign_id, min_amount, max_backers, current_backers, is_available \
             FROM Rewards WHERE reward_id = :reward_id FOR UPDATE",
        )
        .bind("reward_id", reward_id),
    )
    .await?
    .ok_or_else(|| DbError::Rejected("Reward not found".to_string()))?;
    RewardLock::from_row(&reward)?.admit(request.campaign_id, request.amount)?;

    tx.fetch(
        &Statement::new(
            "INSERT INTO Donor_Rewards (donor_id, reward_id, donation_id, fulfillment_status) \
             VALUES (:donor_id, :reward_id, :donation_id, 'pending')",
        )
        .bind("donor_id", request.donor_id)
        .bind("reward_id", reward_id)
        .bind("donation_id", donation_id),
    )
    .await?;

    // Assignments run left to right, so availability sees the incremented count.
    tx.fetch(
        &Statement::new(
            "UPDATE Rewards SET current_backers = current_backers + 1, \
                    is_available = (max_backers IS NULL OR current_backers < max_backers) \
             WHERE reward_id = :reward_id",
        )
        .bind("reward_id", reward_id),
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

fn page(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// All donations, newest first. Anonymous donors are masked.
pub async fn list_donations(
    ctx: &RequestContext,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<ReportResult, DbError> {
    let stmt = Statement::new(
        "SELECT d.donation_id, d.campaign_id, d.donor_id, d.amount, d.donation_date, \
                d.payment_method, d.status, d.is_anonymous, d.message, \
                c.campaign_title, \
                CASE WHEN d.is_anonymous = 1 THEN 'Anonymous' ELSE u.full_name END AS display_name \
         FROM Donations d \
         INNER JOIN Campaigns c ON d.campaign_id = c.campaign_id \
         INNER JOIN Users u ON d.donor_id = u.user_id \
         ORDER BY d.donation_date DESC, d.donation_id DESC \
         LIMIT :limit OFFSET :offset",
    )
    .bind("limit", page(limit))
    .bind("offset", offset.unwrap_or(0));
    Ok(ctx.fetch_all(&stmt).await?)
}

/// Completed donations of one campaign, newest first.
pub async fn donations_for_campaign(
    ctx: &RequestContext,
    campaign_id: u64,
    limit: Option<u32>,
) -> Result<ReportResult, DbError> {
    let stmt = Statement::new(
        "SELECT d.donation_id, d.amount, d.donation_date, d.payment_method, d.message, \
                CASE WHEN d.is_anonymous = 1 THEN 'Anonymous' ELSE u.full_name END AS display_name \
         FROM Donations d \
         INNER JOIN Users u ON d.donor_id = u.user_id \
         WHERE d.campaign_id = :campaign_id AND d.status = 'completed' \
         ORDER BY d.donation_date DESC, d.donation_id DESC \
         LIMIT :limit",
    )
    .bind("campaign_id", campaign_id)
    .bind("limit", page(limit));
    Ok(ctx.fetch_all(&stmt).await?)
}

/// Active donor accounts with their balance, for the donation form.
pub async fn active_donors(ctx: &RequestContext) -> Result<ReportResult, DbError> {
    let stmt = Statement::new(
        "SELECT user_id, username, full_name, account_balance \
         FROM Users \
         WHERE user_role = 'donor' AND is_active = TRUE \
         ORDER BY full_name, user_id",
    );
    Ok(ctx.fetch_all(&stmt).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_campaign() -> CampaignLock {
        CampaignLock {
            status: CampaignStatus::Active,
            current_amount: dec!(250.00),
        }
    }

    fn donor(balance: Decimal) -> DonorLock {
        DonorLock {
            is_active: true,
            balance,
        }
    }

    fn rejection(result: Result<(), DbError>) -> String {
        match result {
            Err(DbError::Rejected(reason)) => reason,
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[test]
    fn donation_within_balance_is_admitted() {
        assert!(admit(Some(&open_campaign()), Some(&donor(dec!(100))), dec!(100)).is_ok());
    }

    #[test]
    fn missing_rows_are_rejected() {
        let reason = rejection(admit(None, Some(&donor(dec!(100))), dec!(10)));
        assert_eq!(reason, "Campaign not found");
        let reason = rejection(admit(Some(&open_campaign()), None, dec!(10)));
        assert_eq!(reason, "Donor not found");
    }

    #[test]
    fn inactive_campaigns_and_donors_are_rejected() {
        let draft = CampaignLock {
            status: CampaignStatus::Draft,
            ..open_campaign()
        };
        let reason = rejection(admit(Some(&draft), Some(&donor(dec!(100))), dec!(10)));
        assert!(reason.contains("draft"));

        let inactive = DonorLock {
            is_active: false,
            balance: dec!(100),
        };
        assert!(admit(Some(&open_campaign()), Some(&inactive), dec!(10)).is_err());
    }

    #[test]
    fn overdraft_is_rejected() {
        let reason = rejection(admit(Some(&open_campaign()), Some(&donor(dec!(99.99))), dec!(100)));
        assert!(reason.starts_with("Insufficient balance"));
    }

    #[test]
    fn reward_rules() {
        let reward = RewardLock {
            campaign_id: 4,
            min_amount: dec!(50),
            max_backers: Some(2),
            current_backers: 1,
            is_available: true,
        };
        assert!(reward.admit(4, dec!(50)).is_ok());
        assert!(reward.admit(5, dec!(50)).is_err());
        assert!(reward.admit(4, dec!(49.99)).is_err());

        let full = RewardLock {
            current_backers: 2,
            ..reward.clone()
        };
        assert!(full.admit(4, dec!(50)).is_err());

        let unlimited = RewardLock {
            max_backers: None,
            current_backers: 1_000,
            ..reward
        };
        assert!(unlimited.admit(4, dec!(50)).is_ok());
    }

    #[test]
    fn reward_rows_decode_nullable_capacity() {
        let row = Row::new()
            .with("campaign_id", 4_i64)
            .with("min_amount", dec!(25.00))
            .with("max_backers", core_types::SqlValue::Null)
            .with("current_backers", 3_i64)
            .with("is_available", true);
        let reward = RewardLock::from_row(&row).unwrap();
        assert_eq!(reward.max_backers, None);
        assert!(reward.is_available);
    }

    #[test]
    fn receipt_reports_the_claim_outcome() {
        let claim = RewardClaim::Failed {
            reward_id: 3,
            reason: "Reward is no longer available".to_string(),
        };
        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reward_id"], 3);
        assert_eq!(serde_json::to_value(RewardClaim::NotRequested).unwrap()["status"], "not_requested");
    }
}
