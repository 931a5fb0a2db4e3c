//! Saga log for multi-entity transfers that commit step by step.
//!
//! A saga records every step it intends to run, marks each one applied as it
//! commits, and marks it compensated when a rollback undoes it. A saga left in
//! `pending` (process died mid-run) or `compensation_failed` is surfaced by
//! [`unsettled`] for manual reconciliation.

use crate::{
    db::{
        models::{generate_id, now_timestamp},
        DbPool,
    },
    error::Result,
};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Intended,
    Applied,
    Compensated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStep {
    pub name: String,
    pub state: StepState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStatus {
    Pending,
    Completed,
    Compensated,
    CompensationFailed,
}

impl SagaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Pending => "pending",
            SagaStatus::Completed => "completed",
            SagaStatus::Compensated => "compensated",
            SagaStatus::CompensationFailed => "compensation_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SagaRecord {
    pub id: String,
    pub kind: String,
    pub reference: String,
    pub status: String,
    pub steps: Json<Vec<SagaStep>>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct Saga {
    record: SagaRecord,
}

impl Saga {
    /// Builds the in-memory log without persisting it.
    fn planned(kind: &str, reference: &str, steps: &[&str]) -> Self {
        let now = now_timestamp();
        Self {
            record: SagaRecord {
                id: generate_id("saga"),
                kind: kind.to_string(),
                reference: reference.to_string(),
                status: SagaStatus::Pending.as_str().to_string(),
                steps: Json(
                    steps
                        .iter()
                        .map(|name| SagaStep {
                            name: name.to_string(),
                            state: StepState::Intended,
                        })
                        .collect(),
                ),
                error: None,
                created_at: now.clone(),
                updated_at: now,
            },
        }
    }

    /// Persists a new saga with every step in the `intended` state.
    pub async fn begin(pool: &DbPool, kind: &str, reference: &str, steps: &[&str]) -> Result<Self> {
        let saga = Self::planned(kind, reference, steps);
        let record = &saga.record;

        sqlx::query(
            "INSERT INTO ledger_sagas (id, kind, reference, status, steps, error, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.kind)
        .bind(&record.reference)
        .bind(&record.status)
        .bind(&record.steps)
        .bind(&record.error)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .execute(pool)
        .await?;

        Ok(saga)
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn reference(&self) -> &str {
        &self.record.reference
    }

    pub fn record(&self) -> &SagaRecord {
        &self.record
    }

    /// Applied steps, most recent first: the order compensation must run in.
    pub fn applied_steps(&self) -> Vec<String> {
        self.record
            .steps
            .iter()
            .rev()
            .filter(|step| step.state == StepState::Applied)
            .map(|step| step.name.clone())
            .collect()
    }

    fn set_state(&mut self, name: &str, state: StepState) {
        if let Some(step) = self.record.steps.iter_mut().find(|step| step.name == name) {
            step.state = state;
        }
        self.record.updated_at = now_timestamp();
    }

    pub async fn mark_applied(&mut self, pool: &DbPool, name: &str) -> Result<()> {
        self.set_state(name, StepState::Applied);
        self.persist(pool).await
    }

    pub async fn mark_compensated(&mut self, pool: &DbPool, name: &str) -> Result<()> {
        self.set_state(name, StepState::Compensated);
        self.persist(pool).await
    }

    pub async fn finish(
        &mut self,
        pool: &DbPool,
        status: SagaStatus,
        error: Option<String>,
    ) -> Result<()> {
        self.record.status = status.as_str().to_string();
        self.record.error = error;
        self.record.updated_at = now_timestamp();
        self.persist(pool).await
    }

    async fn persist(&self, pool: &DbPool) -> Result<()> {
        sqlx::query(
            "UPDATE ledger_sagas SET status = ?, steps = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&self.record.status)
        .bind(&self.record.steps)
        .bind(&self.record.error)
        .bind(&self.record.updated_at)
        .bind(&self.record.id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

/// Sagas that were interrupted or could not be compensated.
pub async fn unsettled(pool: &DbPool) -> Result<Vec<SagaRecord>> {
    let records = sqlx::query_as::<_, SagaRecord>(
        "SELECT * FROM ledger_sagas
         WHERE status IN (?, ?)
         ORDER BY created_at DESC",
    )
    .bind(SagaStatus::Pending.as_str())
    .bind(SagaStatus::CompensationFailed.as_str())
    .fetch_all(pool)
    .await?;

    Ok(records)
}
