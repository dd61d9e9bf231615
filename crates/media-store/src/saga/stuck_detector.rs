//! Stuck-saga detector (spec.md section 4.3): the second background
//! loop that guarantees every saga eventually reaches a terminal status,
//! independent of whether its collaborators ever respond.

use chrono::Utc;
use diesel::prelude::*;
use media_core::{CoreError, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::db::session::DbPool;
use crate::saga::registry::SagaRegistry;
use crate::saga::types::{SagaRow, SagaStatus, StepStatus};
use crate::schema::{saga_steps, sagas};

pub struct StuckSagaDetector {
    pool: DbPool,
    registry: Arc<SagaRegistry>,
    check_interval: Duration,
    stuck_threshold: chrono::Duration,
}

impl StuckSagaDetector {
    pub fn new(pool: DbPool, registry: Arc<SagaRegistry>, check_interval: Duration, stuck_threshold: Duration) -> Self {
        Self {
            pool,
            registry,
            check_interval,
            stuck_threshold: chrono::Duration::from_std(stuck_threshold).unwrap_or(chrono::Duration::seconds(300)),
        }
    }

    pub async fn run(self) {
        loop {
            match self.sweep().await {
                Ok(count) if count > 0 => tracing::warn!(count, "stuck-saga detector forced sagas to failed"),
                Ok(_) => tracing::debug!("stuck-saga detector: nothing stuck"),
                Err(e) => tracing::warn!(error = %e, "stuck-saga detector sweep failed"),
            }
            tokio::time::sleep(self.check_interval).await;
        }
    }

    /// One sweep. Returns the number of sagas forced to `failed`.
    pub async fn sweep(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.stuck_threshold;
        let mut conn = self.pool.get().map_err(CoreError::from)?;

        let stuck: Vec<SagaRow> = sagas::table
            .filter(
                sagas::status
                    .eq(SagaStatus::InProgress.to_string())
                    .or(sagas::status.eq(SagaStatus::Compensating.to_string())),
            )
            .filter(sagas::updated_at.lt(cutoff))
            .select(SagaRow::as_select())
            .load(&mut conn)
            .map_err(CoreError::from)?;

        let mut forced = 0usize;
        for saga in stuck {
            let status: SagaStatus = saga.status.parse()?;
            if status == SagaStatus::Compensating {
                self.retry_compensation_once(&saga).await;
            }
            self.force_failed(saga.id)?;
            forced += 1;
        }
        Ok(forced)
    }

    /// "If compensating: retry compensation once, then force
    /// status = failed" (spec.md section 4.3).
    async fn retry_compensation_once(&self, saga: &SagaRow) {
        let Some(def) = self.registry.get(&saga.saga_type) else { return };
        let mut conn = match self.pool.get() {
            Ok(c) => c,
            Err(_) => return,
        };

        let failed_steps: Vec<(uuid::Uuid, String)> = match saga_steps::table
            .filter(saga_steps::saga_id.eq(saga.id))
            .filter(saga_steps::status.eq(StepStatus::Failed.to_string()))
            .select((saga_steps::id, saga_steps::step_name))
            .load(&mut conn)
        {
            Ok(rows) => rows,
            Err(_) => return,
        };

        for (step_id, step_name) in failed_steps {
            let Some(step_def) = def.step(&step_name) else { continue };
            let Some(compensation) = &step_def.compensating_action else { continue };
            if compensation.invoke(&saga.payload).await.is_ok() {
                let _ = diesel::update(saga_steps::table.filter(saga_steps::id.eq(step_id)))
                    .set((saga_steps::status.eq(StepStatus::Compensated.to_string()), saga_steps::updated_at.eq(Utc::now())))
                    .execute(&mut conn);
            }
        }
    }

    fn force_failed(&self, saga_id: uuid::Uuid) -> Result<()> {
        let mut conn = self.pool.get().map_err(CoreError::from)?;
        let now = Utc::now();
        diesel::update(sagas::table.filter(sagas::id.eq(saga_id)))
            .set((sagas::status.eq(SagaStatus::Failed.to_string()), sagas::completed_at.eq(Some(now)), sagas::updated_at.eq(now)))
            .execute(&mut conn)
            .map_err(CoreError::from)?;
        Ok(())
    }
}
