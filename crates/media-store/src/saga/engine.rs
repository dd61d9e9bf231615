//! The saga engine (spec.md section 4.3): the hardest subsystem. Polls
//! the event log independently of any projector, drives forward step
//! dispatch with retry/backoff, and runs the compensation protocol on
//! failure.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use media_core::error::{RetryPolicy, RetryableError};
use media_core::{CoreError, Result};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::session::DbPool;
use crate::events::{Event, EventLog};
use crate::offset;
use crate::saga::registry::{SagaRegistry, StepDefinition, WorkflowDefinition};
use crate::saga::types::{
    NewSagaRow, NewSagaStepRow, SagaRow, SagaStatus, SagaStepRow, StepStatus,
    PAYLOAD_AGGREGATE_ID_KEY,
};
use crate::schema::{saga_aggregate_index, saga_steps, sagas};

const OFFSET_NAME: &str = "saga_engine";

pub struct SagaEngine {
    pool: DbPool,
    event_log: Arc<dyn EventLog>,
    registry: Arc<SagaRegistry>,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
}

impl SagaEngine {
    pub fn new(
        pool: DbPool,
        event_log: Arc<dyn EventLog>,
        registry: Arc<SagaRegistry>,
        retry_policy: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self { pool, event_log, registry, retry_policy, poll_interval }
    }

    /// Runs forever. On restart, non-terminal sagas simply resume when
    /// their next trigger event is observed — all state lives in the
    /// store, so there is nothing to reload into memory (spec.md
    /// section 4.3, "Crash recovery").
    pub async fn run(self: Arc<Self>) {
        loop {
            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "saga engine tick failed, retrying next interval");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn conn(&self) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>> {
        self.pool.get().map_err(CoreError::from)
    }

    /// One tick: fetch the batch since the engine's own watermark,
    /// process events serially in order, advance the watermark through
    /// the contiguous prefix applied without error.
    pub async fn tick(&self) -> Result<()> {
        let _timer = crate::metrics::SAGA_ENGINE_TICK_SECONDS.start_timer();
        let watermark = {
            let mut conn = self.conn()?;
            offset::read_watermark(&mut conn, OFFSET_NAME)?
        };

        let batch = self.event_log.get_since(watermark).await?;
        let mut last_applied: Option<DateTime<Utc>> = None;

        for event in &batch {
            match self.process_event(event).await {
                Ok(()) => last_applied = Some(event.created_at),
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "saga engine failed to process event, halting batch");
                    break;
                }
            }
        }

        if let Some(created_at) = last_applied {
            let mut conn = self.conn()?;
            offset::write_watermark(&mut conn, OFFSET_NAME, offset::advance_past(created_at))?;
        }

        Ok(())
    }

    /// Feeds a single event through the same dispatch logic `tick` uses,
    /// bypassing the watermark. Used by the manual trigger-injection
    /// endpoint, where the caller wants the resulting state transition
    /// applied before the response returns rather than on the next poll.
    pub async fn notify(&self, event: &Event) -> Result<()> {
        self.process_event(event).await
    }

    async fn process_event(&self, event: &Event) -> Result<()> {
        if let Some(def) = self.registry.definition_for_start_trigger(event.event_type) {
            self.start_saga(def, event).await?;
            return Ok(());
        }

        let Some(saga) = self.find_active_saga(&event.aggregate_id)? else { return Ok(()) };
        if SagaStatus::from_str_status(&saga.status)?.is_terminal() {
            return Ok(());
        }
        let Some(def) = self.registry.get(&saga.saga_type) else { return Ok(()) };

        if def.failure_triggers.contains(&event.event_type) {
            self.begin_compensation(def, &saga).await?;
            return Ok(());
        }

        if let Some(step) = def.step(&saga.current_step) {
            if step.success_trigger == event.event_type {
                self.advance_saga(def, &saga, step).await?;
            }
        }

        Ok(())
    }

    /// spec.md section 4.3 step 2: create the instance and dispatch the
    /// first step's forward action.
    async fn start_saga(&self, def: &WorkflowDefinition, trigger: &Event) -> Result<()> {
        let saga_id = Uuid::new_v4();
        let first_step = def.first_step();
        let payload = serde_json::json!({
            PAYLOAD_AGGREGATE_ID_KEY: trigger.aggregate_id,
            "trigger_event_id": trigger.id,
            "context": trigger.data,
            "results": {},
        });

        {
            let mut conn = self.conn()?;
            let now = Utc::now();
            diesel::insert_into(sagas::table)
                .values(NewSagaRow {
                    id: saga_id,
                    saga_type: def.saga_type.to_string(),
                    current_step: first_step.name.to_string(),
                    status: SagaStatus::Started.to_string(),
                    payload,
                    started_at: now,
                    updated_at: now,
                })
                .execute(&mut conn)
                .map_err(CoreError::from)?;

            diesel::insert_into(saga_aggregate_index::table)
                .values((
                    saga_aggregate_index::aggregate_id.eq(&trigger.aggregate_id),
                    saga_aggregate_index::saga_id.eq(saga_id),
                ))
                .on_conflict(saga_aggregate_index::aggregate_id)
                .do_update()
                .set(saga_aggregate_index::saga_id.eq(saga_id))
                .execute(&mut conn)
                .map_err(CoreError::from)?;
        }

        self.set_saga_status(saga_id, SagaStatus::InProgress)?;
        self.dispatch_step(saga_id, first_step).await?;
        Ok(())
    }

    /// spec.md section 4.3 step 3: mark the completed step, advance
    /// `current_step`, dispatch the next forward action, or complete.
    async fn advance_saga(&self, def: &WorkflowDefinition, saga: &SagaRow, step: &StepDefinition) -> Result<()> {
        self.mark_step_completed_by_trigger(saga.id, step.name)?;

        if def.is_last_step(step.name) {
            self.finish_saga(saga.id, SagaStatus::Completed)?;
            return Ok(());
        }

        let next = def.step_after(step.name).expect("non-last step always has a successor");
        {
            let mut conn = self.conn()?;
            diesel::update(sagas::table.filter(sagas::id.eq(saga.id)))
                .set((sagas::current_step.eq(next.name), sagas::updated_at.eq(Utc::now())))
                .execute(&mut conn)
                .map_err(CoreError::from)?;
        }
        self.dispatch_step(saga.id, next).await
    }

    /// spec.md section 4.3, "Step dispatch": create the step row, invoke
    /// the forward action with retry/backoff, compensate on exhaustion.
    async fn dispatch_step(&self, saga_id: Uuid, step: &StepDefinition) -> Result<()> {
        let payload = self.load_payload(saga_id)?;
        let step_row_id = self.create_step_row(saga_id, step.name)?;
        crate::metrics::SAGA_STEPS_STARTED_TOTAL.inc();

        match self.run_with_retry(step_row_id, &step.forward_action, &payload).await {
            Ok(result) => {
                self.record_step_result(saga_id, step.name, &result)?;
                Ok(())
            }
            Err(e) => {
                crate::metrics::SAGA_STEPS_FAILED_TOTAL.inc();
                tracing::error!(saga_id = %saga_id, step = step.name, error = %e, "step failed after retries, compensating");
                // The triggering event (start or success trigger) has been
                // fully handled by reaching this point: the saga is driven
                // to a terminal `failed` status via compensation below.
                // Returning Ok keeps this event off the watermark-halt
                // path, which is reserved for errors the engine itself
                // couldn't process (e.g. a broken database connection) —
                // otherwise the same trigger would be replayed and a fresh
                // saga spawned on every subsequent tick forever.
                if let Some(def) = self.registry.all().find(|d| d.step(step.name).is_some()) {
                    if let Ok(Some(saga)) = self.saga_by_id(saga_id) {
                        self.begin_compensation(def, &saga).await?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Runs `action` up to `retry_policy.max_attempts` times, persisting
    /// `retry_count`/`last_error` between attempts so a crashed engine
    /// can observe progress on restart (spec.md section 4.3).
    async fn run_with_retry(
        &self,
        step_row_id: Uuid,
        action: &Arc<dyn crate::saga::collaborators::StepAction>,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut attempt = 1u32;
        loop {
            match action.invoke(payload).await {
                Ok(result) => {
                    self.mark_step_executing_progress(step_row_id, attempt - 1, None)?;
                    return Ok(result);
                }
                Err(e) if attempt < self.retry_policy.max_attempts && e.is_retryable() => {
                    crate::metrics::SAGA_STEPS_RETRIED_TOTAL.inc();
                    self.mark_step_executing_progress(step_row_id, attempt, Some(e.to_string()))?;
                    // spec.md section 4.3: attempt k sleeps 2^(k-1) seconds
                    // before its run, so the wait here is keyed on the
                    // *upcoming* attempt (attempt + 1), not the one that
                    // just failed.
                    let delay = self.retry_policy.delay_for_attempt(attempt + 1);
                    tracing::warn!(step_row_id = %step_row_id, attempt, ?delay, error = %e, "retrying saga step");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.mark_step_failed(step_row_id, attempt.saturating_sub(1), &e.to_string())?;
                    return Err(e);
                }
            }
        }
    }

    /// spec.md section 4.3, "Compensation protocol".
    async fn begin_compensation(&self, def: &WorkflowDefinition, saga: &SagaRow) -> Result<()> {
        // Terminate and (if it has a compensating action) compensate the
        // in-flight step before walking the genuinely completed steps that
        // came before it, otherwise it gets swept up by
        // completed_steps_reverse_chronological and ends `compensated`
        // instead of `failed`.
        self.compensate_current_step(def, saga.id, &saga.current_step).await?;

        {
            let mut conn = self.conn()?;
            diesel::update(sagas::table.filter(sagas::id.eq(saga.id)))
                .set((
                    sagas::status.eq(SagaStatus::Compensating.to_string()),
                    sagas::current_step.eq("compensating"),
                    sagas::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)
                .map_err(CoreError::from)?;
        }

        let completed_steps = self.completed_steps_reverse_chronological(saga.id)?;
        for row in completed_steps {
            let Some(step_def) = def.step(&row.step_name) else { continue };
            let Some(compensation) = &step_def.compensating_action else { continue };

            let payload = self.load_payload(saga.id)?;
            match compensation.invoke(&payload).await {
                Ok(_) => {
                    crate::metrics::SAGA_STEPS_COMPENSATED_TOTAL.inc();
                    self.set_step_status(row.id, StepStatus::Compensated)?
                }
                Err(e) => {
                    tracing::error!(saga_id = %saga.id, step = %row.step_name, error = %e, "compensation failed, operator intervention required");
                    self.set_step_status(row.id, StepStatus::Failed)?;
                }
            }
        }

        // Best-effort: the saga terminates as failed regardless of
        // whether every compensation succeeded (spec.md section 4.3).
        self.finish_saga(saga.id, SagaStatus::Failed)
    }

    // --- lookup helpers -------------------------------------------------

    /// Index lookup first, falling back to a linear scan over active
    /// sagas matching the stored aggregate_id key in `payload` (spec.md
    /// section 4.3 / section 9's design note).
    fn find_active_saga(&self, aggregate_id: &str) -> Result<Option<SagaRow>> {
        let mut conn = self.conn()?;

        if let Some(saga_id) = saga_aggregate_index::table
            .filter(saga_aggregate_index::aggregate_id.eq(aggregate_id))
            .select(saga_aggregate_index::saga_id)
            .first::<Uuid>(&mut conn)
            .optional()
            .map_err(CoreError::from)?
        {
            if let Some(saga) = sagas::table
                .filter(sagas::id.eq(saga_id))
                .select(SagaRow::as_select())
                .first::<SagaRow>(&mut conn)
                .optional()
                .map_err(CoreError::from)?
            {
                return Ok(Some(saga));
            }
        }

        let active: Vec<SagaRow> = sagas::table
            .filter(sagas::status.ne(SagaStatus::Completed.to_string()))
            .filter(sagas::status.ne(SagaStatus::Failed.to_string()))
            .select(SagaRow::as_select())
            .load(&mut conn)
            .map_err(CoreError::from)?;

        Ok(active.into_iter().find(|saga| {
            saga.payload.get(PAYLOAD_AGGREGATE_ID_KEY).and_then(|v| v.as_str()) == Some(aggregate_id)
        }))
    }

    fn saga_by_id(&self, saga_id: Uuid) -> Result<Option<SagaRow>> {
        let mut conn = self.conn()?;
        sagas::table
            .filter(sagas::id.eq(saga_id))
            .select(SagaRow::as_select())
            .first::<SagaRow>(&mut conn)
            .optional()
            .map_err(CoreError::from)
    }

    fn load_payload(&self, saga_id: Uuid) -> Result<serde_json::Value> {
        Ok(self.saga_by_id(saga_id)?.map(|s| s.payload).unwrap_or(serde_json::Value::Null))
    }

    fn completed_steps_reverse_chronological(&self, saga_id: Uuid) -> Result<Vec<SagaStepRow>> {
        let mut conn = self.conn()?;
        saga_steps::table
            .filter(saga_steps::saga_id.eq(saga_id))
            .filter(saga_steps::status.eq(StepStatus::Completed.to_string()))
            .order_by(saga_steps::started_at.desc())
            .select(SagaStepRow::as_select())
            .load(&mut conn)
            .map_err(CoreError::from)
    }

    fn step_row_by_name(&self, saga_id: Uuid, step_name: &str) -> Result<Option<SagaStepRow>> {
        let mut conn = self.conn()?;
        saga_steps::table
            .filter(saga_steps::saga_id.eq(saga_id))
            .filter(saga_steps::step_name.eq(step_name))
            .select(SagaStepRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(CoreError::from)
    }

    /// Terminates the step the saga was running when the abort (failure
    /// trigger or retry exhaustion) arrived. Unlike the steps walked by
    /// `completed_steps_reverse_chronological` afterward, this step never
    /// reached its own success trigger — the abort is what makes it an
    /// abort — so it ends `failed` rather than `compensated`, even though
    /// its compensating action (if any) is still invoked: spec.md section
    /// 8, seed scenario S2, "the compensate endpoint is called ... the
    /// process_media step has status failed." A no-op if the row has
    /// already reached a terminal status (dispatch_step marks it `failed`
    /// itself on retry exhaustion, before this ever runs).
    async fn compensate_current_step(&self, def: &WorkflowDefinition, saga_id: Uuid, step_name: &str) -> Result<()> {
        let Some(row) = self.step_row_by_name(saga_id, step_name)? else { return Ok(()) };
        if row.status == StepStatus::Failed.to_string() || row.status == StepStatus::Compensated.to_string() {
            return Ok(());
        }

        if let Some(compensation) = def.step(step_name).and_then(|s| s.compensating_action.as_ref()) {
            let payload = self.load_payload(saga_id)?;
            match compensation.invoke(&payload).await {
                Ok(_) => crate::metrics::SAGA_STEPS_COMPENSATED_TOTAL.inc(),
                Err(e) => {
                    tracing::error!(saga_id = %saga_id, step = step_name, error = %e, "compensation failed for aborted step, operator intervention required");
                }
            }
        }

        self.set_step_status(row.id, StepStatus::Failed)
    }

    // --- row mutation helpers -------------------------------------------

    fn create_step_row(&self, saga_id: Uuid, step_name: &str) -> Result<Uuid> {
        let mut conn = self.conn()?;
        let id = Uuid::new_v4();
        let now = Utc::now();
        diesel::insert_into(saga_steps::table)
            .values(NewSagaStepRow {
                id,
                saga_id,
                step_name: step_name.to_string(),
                status: StepStatus::Executing.to_string(),
                retry_count: 0,
                started_at: now,
                updated_at: now,
            })
            .execute(&mut conn)
            .map_err(CoreError::from)?;
        Ok(id)
    }

    fn mark_step_executing_progress(&self, step_row_id: Uuid, retry_count: u32, last_error: Option<String>) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(saga_steps::table.filter(saga_steps::id.eq(step_row_id)))
            .set((
                saga_steps::retry_count.eq(retry_count as i32),
                saga_steps::last_error.eq(last_error),
                saga_steps::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .map_err(CoreError::from)?;
        Ok(())
    }

    fn mark_step_failed(&self, step_row_id: Uuid, retry_count: u32, error: &str) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(saga_steps::table.filter(saga_steps::id.eq(step_row_id)))
            .set((
                saga_steps::status.eq(StepStatus::Failed.to_string()),
                saga_steps::retry_count.eq(retry_count as i32),
                saga_steps::last_error.eq(Some(error.to_string())),
                saga_steps::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .map_err(CoreError::from)?;
        Ok(())
    }

    fn record_step_result(&self, saga_id: Uuid, step_name: &str, result: &serde_json::Value) -> Result<()> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        diesel::update(
            saga_steps::table
                .filter(saga_steps::saga_id.eq(saga_id))
                .filter(saga_steps::step_name.eq(step_name)),
        )
        .set((
            saga_steps::status.eq(StepStatus::Completed.to_string()),
            saga_steps::result.eq(Some(result.clone())),
            saga_steps::completed_at.eq(Some(now)),
            saga_steps::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(CoreError::from)?;

        // Merge the step's result into the saga's accumulated payload
        // under results.<step_name>, so later steps/compensations can
        // see prior-step context.
        if let Some(mut saga) = self.saga_by_id(saga_id)? {
            if let Some(obj) = saga.payload.as_object_mut() {
                let results = obj.entry("results").or_insert_with(|| serde_json::json!({}));
                if let Some(results_obj) = results.as_object_mut() {
                    results_obj.insert(step_name.to_string(), result.clone());
                }
            }
            diesel::update(sagas::table.filter(sagas::id.eq(saga_id)))
                .set((sagas::payload.eq(&saga.payload), sagas::updated_at.eq(now)))
                .execute(&mut conn)
                .map_err(CoreError::from)?;
        }
        Ok(())
    }

    fn mark_step_completed_by_trigger(&self, saga_id: Uuid, step_name: &str) -> Result<()> {
        // The forward action already ran (and recorded a result) in
        // `dispatch_step`; this only fires if the step wasn't already
        // marked completed (e.g. engine restarted mid-step and the
        // success trigger is what's driving completion now).
        let mut conn = self.conn()?;
        diesel::update(
            saga_steps::table
                .filter(saga_steps::saga_id.eq(saga_id))
                .filter(saga_steps::step_name.eq(step_name))
                .filter(saga_steps::status.ne(StepStatus::Completed.to_string())),
        )
        .set((
            saga_steps::status.eq(StepStatus::Completed.to_string()),
            saga_steps::completed_at.eq(Some(Utc::now())),
            saga_steps::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .map_err(CoreError::from)?;
        Ok(())
    }

    fn set_step_status(&self, step_id: Uuid, status: StepStatus) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(saga_steps::table.filter(saga_steps::id.eq(step_id)))
            .set((saga_steps::status.eq(status.to_string()), saga_steps::updated_at.eq(Utc::now())))
            .execute(&mut conn)
            .map_err(CoreError::from)?;
        Ok(())
    }

    fn set_saga_status(&self, saga_id: Uuid, status: SagaStatus) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(sagas::table.filter(sagas::id.eq(saga_id)))
            .set((sagas::status.eq(status.to_string()), sagas::updated_at.eq(Utc::now())))
            .execute(&mut conn)
            .map_err(CoreError::from)?;
        Ok(())
    }

    fn finish_saga(&self, saga_id: Uuid, status: SagaStatus) -> Result<()> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        diesel::update(sagas::table.filter(sagas::id.eq(saga_id)))
            .set((sagas::status.eq(status.to_string()), sagas::completed_at.eq(Some(now)), sagas::updated_at.eq(now)))
            .execute(&mut conn)
            .map_err(CoreError::from)?;
        Ok(())
    }
}

impl SagaStatus {
    fn from_str_status(s: &str) -> Result<SagaStatus> {
        s.parse()
    }
}
