//! MO completion workflow.
//!
//! Inputs for a manufacturing order move from `active` to `completed` as a
//! group. Completion is all-or-nothing per MO: if an active row is still
//! present after the update, every completed row of that MO is put back to
//! active. Once an MO is fully completed the third-party dashboard is told
//! about it through the [`StatusNotifier`].

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::manufacturing_identity::{self, Entity as ManufacturingIdentity},
    errors::ServiceError,
    models::{
        compute_yield, compute_yield_checked, group_by_session, normalize_ranges, validate_ranges,
        InputStatus, NewProductionInput, ProductionInput, ProductionLine, RangeIssue, SessionGroup,
        UpdateProductionInput,
    },
    repositories::{lock_mo, ProductionStore},
    services::{
        mo_cache::MoCacheService,
        notifier::{
            completed_put_url, DeliveryMethod, EndpointResolver, ManufacturingPayload,
            Notification, StatusNotifier,
        },
    },
};

pub const NO_ACTIVE_INPUTS: &str = "No active inputs found for this MO";
pub const WARN_NOT_CONFIGURED: &str = "External API URL not configured";
pub const WARN_NOT_SENT: &str = "Could not send to external API";

/// Result of the post-update recheck for one MO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Complete,
    AutoReverted { active_count: u64, reverted: u64 },
}

/// What happened to the outbound notification
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotifyOutcome {
    pub sent: bool,
    pub manufacturing_id: Option<String>,
    pub warning: Option<String>,
}

impl NotifyOutcome {
    fn skipped(warning: &str) -> Self {
        Self {
            sent: false,
            manufacturing_id: None,
            warning: Some(warning.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertOutcome {
    pub id: i32,
    pub input: ProductionInput,
    pub range_issues: Vec<RangeIssue>,
    pub external_api_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub mo_number: String,
    pub updated_count: u64,
    pub auto_reverted: bool,
    pub active_count: u64,
    pub external_api_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevertOutcome {
    pub mo_number: String,
    pub reverted_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateOutcome {
    pub input: ProductionInput,
    pub auto_reverted: bool,
    pub active_count: u64,
    pub external_api_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Recheck after a completion update. If any input of the MO is still
/// active, every completed input is reverted so the MO never ends up mixed.
pub async fn reconcile_mo<C: ConnectionTrait>(
    conn: &C,
    store: &ProductionStore,
    mo_number: &str,
) -> Result<Reconciliation, ServiceError> {
    let active_count = store.count_active(conn, mo_number).await?;
    if active_count == 0 {
        return Ok(Reconciliation::Complete);
    }
    let reverted = store.revert_completed(conn, mo_number).await?;
    counter!("authenticity_mo.auto_reverts", 1);
    warn!(
        mo_number,
        line = %store.line(),
        active_count,
        reverted,
        "active inputs remain after completion, reverted MO to active"
    );
    Ok(Reconciliation::AutoReverted {
        active_count,
        reverted,
    })
}

/// Drives inputs through their lifecycle and notifies the dashboard
#[derive(Clone)]
pub struct MoCompletionService {
    db: Arc<DbPool>,
    mo_cache: MoCacheService,
    resolver: EndpointResolver,
    notifier: Arc<dyn StatusNotifier>,
    max_range_span: u64,
    report_utc_offset_hours: i32,
}

impl MoCompletionService {
    pub fn new(
        db: Arc<DbPool>,
        mo_cache: MoCacheService,
        resolver: EndpointResolver,
        notifier: Arc<dyn StatusNotifier>,
        max_range_span: u64,
        report_utc_offset_hours: i32,
    ) -> Self {
        Self {
            db,
            mo_cache,
            resolver,
            notifier,
            max_range_span,
            report_utc_offset_hours,
        }
    }

    pub fn max_range_span(&self) -> u64 {
        self.max_range_span
    }

    pub async fn get_input(
        &self,
        line: ProductionLine,
        id: i32,
    ) -> Result<ProductionInput, ServiceError> {
        ProductionStore::new(line)
            .get(&*self.db, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Production input {} not found", id)))
    }

    /// Inputs of a line grouped by session, newest session first.
    pub async fn list_sessions(
        &self,
        line: ProductionLine,
    ) -> Result<Vec<SessionGroup>, ServiceError> {
        let inputs = ProductionStore::new(line).list(&*self.db).await?;
        Ok(group_by_session(inputs))
    }

    /// Stores a new active input and announces the MO as in progress.
    ///
    /// Range problems are reported back but do not block the insert; the
    /// completion step re-validates.
    #[instrument(skip(self, input), fields(line = %line, mo_number = %input.mo_number))]
    pub async fn insert_input(
        &self,
        line: ProductionLine,
        mut input: NewProductionInput,
    ) -> Result<InsertOutcome, ServiceError> {
        input.validate()?;
        input.authenticity_data = normalize_ranges(std::mem::take(&mut input.authenticity_data));
        if input.authenticity_data.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one authenticity range is required".to_string(),
            ));
        }
        let report = compute_yield_checked(&input.authenticity_data, self.max_range_span);
        if !report.issues.is_empty() {
            warn!(issues = report.issues.len(), "input saved with invalid ranges");
        }

        let store = ProductionStore::new(line);
        let txn = self.db.begin().await?;
        lock_mo(&txn, &input.mo_number).await?;
        let id = store.insert(&txn, &input, Utc::now()).await?;
        let saved = store
            .get(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::InternalError("inserted input vanished".to_string()))?;
        txn.commit().await?;
        counter!("authenticity_inputs.created", 1);
        info!(id, "production input saved");

        let notify = self.notify_active(&saved).await;
        Ok(InsertOutcome {
            id,
            input: saved,
            range_issues: report.issues,
            external_api_sent: notify.sent,
            warning: notify.warning,
        })
    }

    /// Completes every active input of an MO across the whole line.
    #[instrument(skip(self), fields(line = %line))]
    pub async fn submit_mo_group(
        &self,
        line: ProductionLine,
        mo_number: &str,
        session_id: Option<&str>,
    ) -> Result<SubmitOutcome, ServiceError> {
        let mo_number = mo_number.trim();
        if mo_number.is_empty() {
            return Err(ServiceError::ValidationError(
                "mo_number is required".to_string(),
            ));
        }
        let store = ProductionStore::new(line);

        let txn = self.db.begin().await?;
        lock_mo(&txn, mo_number).await?;
        let active = store
            .list_by_mo(&txn, mo_number, Some(InputStatus::Active))
            .await?;
        if active.is_empty() {
            return Err(ServiceError::Conflict(NO_ACTIVE_INPUTS.to_string()));
        }
        for input in &active {
            validate_ranges(&input.authenticity_data, self.max_range_span).map_err(|e| {
                ServiceError::ValidationError(format!(
                    "MO {} has an invalid authenticity range (input {}): {}",
                    mo_number, input.id, e
                ))
            })?;
        }

        let updated_count = store.mark_completed(&txn, mo_number, Utc::now()).await?;
        let reconciliation = reconcile_mo(&txn, &store, mo_number).await?;
        txn.commit().await?;
        counter!("authenticity_mo.submissions", 1);
        info!(mo_number, updated_count, session_id, "MO group submitted");

        match reconciliation {
            Reconciliation::AutoReverted { active_count, .. } => Ok(SubmitOutcome {
                mo_number: mo_number.to_string(),
                updated_count,
                auto_reverted: true,
                active_count,
                external_api_sent: false,
                manufacturing_id: None,
                warning: None,
            }),
            Reconciliation::Complete => {
                let notify = self.notify_completed(line, mo_number).await;
                Ok(SubmitOutcome {
                    mo_number: mo_number.to_string(),
                    updated_count,
                    auto_reverted: false,
                    active_count: 0,
                    external_api_sent: notify.sent,
                    manufacturing_id: notify.manufacturing_id,
                    warning: notify.warning,
                })
            }
        }
    }

    /// Admin-only undo of a completion. Sends nothing to the dashboard.
    #[instrument(skip(self, user), fields(line = %line, user = %user.user_id))]
    pub async fn revert_mo_group(
        &self,
        user: &AuthUser,
        line: ProductionLine,
        mo_number: &str,
    ) -> Result<RevertOutcome, ServiceError> {
        if !user.is_admin() {
            return Err(ServiceError::Forbidden(
                "Only admin can revert MO groups".to_string(),
            ));
        }
        let mo_number = mo_number.trim();
        if mo_number.is_empty() {
            return Err(ServiceError::ValidationError(
                "mo_number is required".to_string(),
            ));
        }

        let store = ProductionStore::new(line);
        let txn = self.db.begin().await?;
        lock_mo(&txn, mo_number).await?;
        let reverted_count = store.revert_completed(&txn, mo_number).await?;
        txn.commit().await?;
        info!(mo_number, reverted_count, "MO group reverted");

        Ok(RevertOutcome {
            mo_number: mo_number.to_string(),
            reverted_count,
        })
    }

    /// Single-row status change with the same gate and recheck as a group submit.
    ///
    /// Reopening a completed row is an admin revert and reopens the whole MO.
    #[instrument(skip(self, user), fields(line = %line, user = %user.user_id))]
    pub async fn update_input_status(
        &self,
        user: &AuthUser,
        line: ProductionLine,
        id: i32,
        status: &str,
    ) -> Result<StatusUpdateOutcome, ServiceError> {
        let status: InputStatus = status.trim().parse().map_err(|_| {
            ServiceError::ValidationError(
                "Invalid status. Must be 'active' or 'completed'".to_string(),
            )
        })?;
        let store = ProductionStore::new(line);

        let txn = self.db.begin().await?;
        let current = store
            .get(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Production input {} not found", id)))?;
        lock_mo(&txn, &current.mo_number).await?;

        if status == InputStatus::Completed {
            validate_ranges(&current.authenticity_data, self.max_range_span).map_err(|e| {
                ServiceError::ValidationError(format!(
                    "MO {} has an invalid authenticity range (input {}): {}",
                    current.mo_number, id, e
                ))
            })?;
        }
        let reopening = status == InputStatus::Active && current.status == InputStatus::Completed;
        if reopening {
            if !user.is_admin() {
                return Err(ServiceError::Forbidden(
                    "Only admin can reopen completed inputs".to_string(),
                ));
            }
            let reverted = store.revert_completed(&txn, &current.mo_number).await?;
            info!(mo_number = %current.mo_number, reverted, "MO group reopened");
        } else {
            store.set_status(&txn, id, status, Utc::now()).await?;
        }

        let reconciliation = if status == InputStatus::Completed {
            reconcile_mo(&txn, &store, &current.mo_number).await?
        } else {
            Reconciliation::Complete
        };
        let updated = store
            .get(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Production input {} not found", id)))?;
        txn.commit().await?;
        info!(id, status = %status, "input status updated");

        let mut outcome = StatusUpdateOutcome {
            input: updated,
            auto_reverted: false,
            active_count: 0,
            external_api_sent: false,
            manufacturing_id: None,
            warning: None,
        };
        match (status, reconciliation) {
            (_, Reconciliation::AutoReverted { active_count, .. }) => {
                outcome.auto_reverted = true;
                outcome.active_count = active_count;
            }
            (InputStatus::Completed, Reconciliation::Complete) => {
                let notify = self.notify_completed(line, &outcome.input.mo_number).await;
                outcome.external_api_sent = notify.sent;
                outcome.manufacturing_id = notify.manufacturing_id;
                outcome.warning = notify.warning;
            }
            (InputStatus::Active, Reconciliation::Complete) => {}
        }
        Ok(outcome)
    }

    /// Edits PIC, MO, SKU or ranges of an input that is still active.
    #[instrument(skip(self, update), fields(line = %line))]
    pub async fn update_input_fields(
        &self,
        line: ProductionLine,
        id: i32,
        mut update: UpdateProductionInput,
    ) -> Result<ProductionInput, ServiceError> {
        if update.is_empty() {
            return Err(ServiceError::ValidationError(
                "No fields to update".to_string(),
            ));
        }
        for (name, value) in [
            ("pic", &update.pic),
            ("mo_number", &update.mo_number),
            ("sku_name", &update.sku_name),
        ] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(ServiceError::ValidationError(format!(
                    "{} must not be empty",
                    name
                )));
            }
        }
        if let Some(ranges) = update.authenticity_data.take() {
            let ranges = normalize_ranges(ranges);
            if ranges.is_empty() {
                return Err(ServiceError::ValidationError(
                    "At least one authenticity range is required".to_string(),
                ));
            }
            update.authenticity_data = Some(ranges);
        }

        let store = ProductionStore::new(line);
        let txn = self.db.begin().await?;
        let current = store
            .get(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Production input {} not found", id)))?;
        if current.status == InputStatus::Completed {
            return Err(ServiceError::Conflict(
                "Completed inputs cannot be edited".to_string(),
            ));
        }
        lock_mo(&txn, &current.mo_number).await?;
        store.update_fields(&txn, id, &update).await?;
        let updated = store
            .get(&txn, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Production input {} not found", id)))?;
        txn.commit().await?;
        info!(id, "input fields updated");
        Ok(updated)
    }

    /// Identifier the dashboard knows this MO by: the newest accepted
    /// manufacturing record, else the MO number itself.
    pub async fn manufacturing_identifier(&self, mo_number: &str) -> Result<String, ServiceError> {
        let latest = ManufacturingIdentity::find()
            .filter(manufacturing_identity::Column::ManufacturingId.eq(mo_number))
            .order_by_desc(manufacturing_identity::Column::CreatedAt)
            .order_by_desc(manufacturing_identity::Column::Id)
            .one(&*self.db)
            .await?;
        Ok(latest
            .map(|r| r.id.to_string())
            .unwrap_or_else(|| mo_number.to_string()))
    }

    async fn target_qty(&self, mo_number: &str) -> f64 {
        match self.mo_cache.lookup_quantity(mo_number).await {
            Ok(qty) => qty.unwrap_or(0.0),
            Err(e) => {
                warn!(mo_number, error = %e, "target quantity lookup failed");
                0.0
            }
        }
    }

    async fn notify_active(&self, input: &ProductionInput) -> NotifyOutcome {
        let url = match self.resolver.active_url().await {
            Ok(Some(url)) => url,
            Ok(None) => return NotifyOutcome::skipped(WARN_NOT_CONFIGURED),
            Err(e) => {
                warn!(error = %e, "could not resolve active endpoint");
                return NotifyOutcome::skipped(WARN_NOT_SENT);
            }
        };
        let target_qty = self.target_qty(&input.mo_number).await;
        let payload = ManufacturingPayload::new(
            &input.mo_number,
            &input.sku_name,
            target_qty,
            None,
            &input.leader_name,
            None,
            self.report_utc_offset_hours,
        );
        self.notifier.dispatch(Notification {
            method: DeliveryMethod::Post,
            url,
            payload,
        });
        NotifyOutcome {
            sent: true,
            manufacturing_id: Some(input.mo_number.clone()),
            warning: None,
        }
    }

    /// Aggregates a fully completed MO and PUTs it to the dashboard.
    pub async fn notify_completed(&self, line: ProductionLine, mo_number: &str) -> NotifyOutcome {
        match self.build_completed(line, mo_number).await {
            Ok(Some((notification, identifier))) => {
                self.notifier.dispatch(notification);
                NotifyOutcome {
                    sent: true,
                    manufacturing_id: Some(identifier),
                    warning: None,
                }
            }
            Ok(None) => NotifyOutcome::skipped(WARN_NOT_CONFIGURED),
            Err(e) => {
                warn!(mo_number, error = %e, "completed notification not sent");
                NotifyOutcome::skipped(WARN_NOT_SENT)
            }
        }
    }

    async fn build_completed(
        &self,
        line: ProductionLine,
        mo_number: &str,
    ) -> Result<Option<(Notification, String)>, ServiceError> {
        let Some(base) = self.resolver.completed_base().await? else {
            return Ok(None);
        };
        let store = ProductionStore::new(line);
        let completed = store
            .list_by_mo(&*self.db, mo_number, Some(InputStatus::Completed))
            .await?;
        let latest = store
            .latest_completed(&*self.db, mo_number)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No completed inputs for {}", mo_number)))?;

        let done_qty = completed
            .iter()
            .map(|i| compute_yield(&i.authenticity_data))
            .fold(0u64, u64::saturating_add);
        let finished_at: Option<DateTime<Utc>> =
            completed.iter().filter_map(|i| i.completed_at).max();
        let target_qty = self.target_qty(mo_number).await;
        let identifier = self.manufacturing_identifier(mo_number).await?;
        let url = completed_put_url(&base, &identifier)
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))?;

        let payload = ManufacturingPayload::new(
            mo_number,
            &latest.sku_name,
            target_qty,
            Some(done_qty),
            &latest.leader_name,
            finished_at,
            self.report_utc_offset_hours,
        );
        Ok(Some((
            Notification {
                method: DeliveryMethod::Put,
                url,
                payload,
            },
            identifier,
        )))
    }
}
