use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::DatabaseService;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{StoreError, SurveyStore};
use crate::domains::identity::Identity;
use crate::domains::rewards::models::{NewRedemption, RedemptionMetadata, RewardRedemption};
use crate::domains::survey::models::{AnswerMap, NewSurveyResponse, SurveyResponse};

/// PostgreSQL store over the `survey` schema.
#[derive(Clone)]
pub struct PgSurveyStore {
    pool: PgPool,
}

impl PgSurveyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn from_service(service: DatabaseService) -> Self {
        Self::new(service.into_pool())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> shared::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Survey schema migrations applied");
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn identity_from_row(row: &PgRow, user_column: &str) -> Result<Identity, sqlx::Error> {
    Ok(Identity::new(
        row.try_get::<String, _>("fingerprint_id")?,
        row.try_get::<Option<String>, _>(user_column)?,
    ))
}

fn response_from_row(row: &PgRow) -> Result<SurveyResponse, sqlx::Error> {
    let Json(response_data): Json<AnswerMap> = row.try_get("response_data")?;
    Ok(SurveyResponse {
        id: row.try_get("id")?,
        campaign_id: row.try_get("campaign_id")?,
        identity: identity_from_row(row, "user_id")?,
        profile_role: row.try_get("profile_role")?,
        response_data,
        is_test: row.try_get("is_test")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn redemption_from_row(row: &PgRow) -> Result<RewardRedemption, sqlx::Error> {
    let Json(metadata): Json<RedemptionMetadata> = row.try_get("metadata")?;
    Ok(RewardRedemption {
        id: row.try_get("id")?,
        campaign_id: row.try_get("campaign_id")?,
        identity: identity_from_row(row, "profile_id")?,
        reward_id: row.try_get("reward_id")?,
        lucky_number: row.try_get("lucky_number")?,
        redemption_code: row.try_get("redemption_code")?,
        contact_whatsapp: row.try_get("contact_whatsapp")?,
        contact_email: row.try_get("contact_email")?,
        metadata,
    })
}

const RESPONSE_COLUMNS: &str =
    "id, campaign_id, user_id, fingerprint_id, profile_role, response_data, is_test, created_at";

const REDEMPTION_COLUMNS: &str = "id, reward_id, campaign_id, profile_id, fingerprint_id, \
     redemption_code, lucky_number, contact_whatsapp, contact_email, metadata";

#[async_trait]
impl SurveyStore for PgSurveyStore {
    async fn find_response(
        &self,
        campaign_id: Uuid,
        identity: &Identity,
    ) -> Result<Option<SurveyResponse>, StoreError> {
        let query = format!(
            "SELECT {} FROM survey.responses \
             WHERE campaign_id = $1 \
               AND (fingerprint_id = $2 OR ($3::text IS NOT NULL AND user_id = $3)) \
             ORDER BY created_at \
             LIMIT 1",
            RESPONSE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(campaign_id)
            .bind(&identity.fingerprint_id)
            .bind(&identity.user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Error looking up survey response: {}", e);
                e
            })?;

        Ok(row.as_ref().map(response_from_row).transpose()?)
    }

    async fn insert_response(&self, response: NewSurveyResponse) -> Result<SurveyResponse, StoreError> {
        let query = format!(
            "INSERT INTO survey.responses \
                (campaign_id, user_id, fingerprint_id, profile_role, response_data, is_test) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {}",
            RESPONSE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(response.campaign_id)
            .bind(&response.identity.user_id)
            .bind(&response.identity.fingerprint_id)
            .bind(&response.profile_role)
            .bind(Json(&response.response_data))
            .bind(response.is_test)
            .fetch_one(&self.pool)
            .await?;

        let stored = response_from_row(&row)?;
        debug!(response_id = %stored.id, campaign_id = %stored.campaign_id, "Survey response inserted");
        Ok(stored)
    }

    async fn find_redemption(
        &self,
        campaign_id: Uuid,
        identity: &Identity,
    ) -> Result<Option<RewardRedemption>, StoreError> {
        let query = format!(
            "SELECT {} FROM survey.reward_redemptions \
             WHERE campaign_id = $1 \
               AND (fingerprint_id = $2 OR ($3::text IS NOT NULL AND profile_id = $3)) \
             ORDER BY created_at \
             LIMIT 1",
            REDEMPTION_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(campaign_id)
            .bind(&identity.fingerprint_id)
            .bind(&identity.user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Error looking up reward redemption: {}", e);
                e
            })?;

        Ok(row.as_ref().map(redemption_from_row).transpose()?)
    }

    async fn insert_redemption(
        &self,
        redemption: NewRedemption,
    ) -> Result<RewardRedemption, StoreError> {
        // Lucky numbers are max + 1 within the campaign; a concurrent insert
        // that computed the same value fails on the lucky number index.
        let query = format!(
            "INSERT INTO survey.reward_redemptions \
                (id, reward_id, campaign_id, profile_id, fingerprint_id, redemption_code, \
                 lucky_number, contact_whatsapp, contact_email, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, \
                 CASE WHEN $7::boolean THEN ( \
                     SELECT COALESCE(MAX(lucky_number), 0) + 1 \
                     FROM survey.reward_redemptions WHERE campaign_id = $3 \
                 ) END, \
                 $8, $9, $10) \
             RETURNING {}",
            REDEMPTION_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(redemption.id)
            .bind(redemption.reward_id)
            .bind(redemption.campaign_id)
            .bind(&redemption.identity.user_id)
            .bind(&redemption.identity.fingerprint_id)
            .bind(&redemption.redemption_code)
            .bind(redemption.assign_lucky_number)
            .bind(&redemption.contact_whatsapp)
            .bind(&redemption.contact_email)
            .bind(Json(&redemption.metadata))
            .fetch_one(&self.pool)
            .await?;

        let stored = redemption_from_row(&row)?;
        debug!(
            redemption_id = %stored.id,
            campaign_id = %stored.campaign_id,
            lucky_number = ?stored.lucky_number,
            "Reward redemption inserted"
        );
        Ok(stored)
    }
}
