//! Read API for external consumers, guarded by the admin-issued API key.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    db::DbPool,
    errors::ServiceError,
    models::{
        AuthenticityRange, ExceptionKind, InputStatus, ProductionInput, ProductionLine,
    },
    repositories::{ExceptionStore, ProductionFilter, ProductionStore},
    services::reports::{day_bounds, lines_for, status_filter},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthenticityQuery {
    #[serde(rename = "type")]
    pub production_type: Option<String>,
    pub status: Option<String>,
    pub mo_number: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// A production input tagged with the line it came from
#[derive(Debug, Clone, Serialize)]
pub struct LineInput {
    pub production_type: ProductionLine,
    #[serde(flatten)]
    pub input: ProductionInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeView {
    pub first_authenticity: String,
    pub last_authenticity: String,
    pub roll_number: String,
}

impl From<AuthenticityRange> for RangeView {
    fn from(r: AuthenticityRange) -> Self {
        Self {
            first_authenticity: r.first_authenticity,
            last_authenticity: r.last_authenticity,
            roll_number: r.roll_number,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoData {
    pub mo_number: String,
    pub sku_name: String,
    pub pic: String,
    pub production_type: ProductionLine,
    pub completed_at: Option<DateTime<Utc>>,
    pub authenticity_data: Vec<RangeView>,
    pub buffered_auth: Vec<String>,
    pub rejected_auth: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session: String,
    pub leader: String,
    pub shift: String,
    pub mo_data: Vec<MoData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManufacturingData {
    pub mo_number: String,
    pub completed_at: String,
    pub total_sessions: usize,
    pub data: Vec<SessionReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedOnDate {
    pub completed_at: NaiveDate,
    pub total_mos: usize,
    pub mo_numbers: Vec<String>,
}

/// One completed input in the date-range report
#[derive(Debug, Clone, Serialize)]
pub struct CompletedRecord {
    pub mo_number: String,
    pub sku_name: String,
    pub pic: String,
    pub leader_name: String,
    pub shift_number: String,
    pub session_id: String,
    pub production_type: ProductionLine,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_records: usize,
    pub records: Vec<CompletedRecord>,
}

#[derive(Clone)]
pub struct ExternalDataService {
    db: Arc<DbPool>,
    report_utc_offset_hours: i32,
}

fn required_mo(mo_number: Option<&str>) -> Result<&str, ServiceError> {
    mo_number
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("MO Number is required".to_string()))
}

impl ExternalDataService {
    pub fn new(db: Arc<DbPool>, report_utc_offset_hours: i32) -> Self {
        Self {
            db,
            report_utc_offset_hours,
        }
    }

    fn completed_filter(&self, mo_number: &str, completed_on: Option<NaiveDate>) -> ProductionFilter {
        let mut filter = ProductionFilter::for_mo(mo_number).with_status(InputStatus::Completed);
        if let Some(date) = completed_on {
            let (from, to) = day_bounds(date, self.report_utc_offset_hours);
            filter.completed_from = Some(from);
            filter.completed_to = Some(to);
        }
        filter
    }

    /// Status of an MO across all lines: any active input makes it active.
    #[instrument(skip(self))]
    pub async fn mo_status(
        &self,
        mo_number: Option<&str>,
        completed_on: Option<NaiveDate>,
    ) -> Result<InputStatus, ServiceError> {
        let mo_number = required_mo(mo_number)?;
        let mut completed = 0u64;
        for line in ProductionLine::all() {
            let store = ProductionStore::new(line);
            if store.count_active(&*self.db, mo_number).await? > 0 {
                return Ok(InputStatus::Active);
            }
            completed += store
                .list_filtered(&*self.db, &self.completed_filter(mo_number, completed_on))
                .await?
                .len() as u64;
        }
        if completed > 0 {
            Ok(InputStatus::Completed)
        } else {
            Err(ServiceError::NotFound("MO number not found".to_string()))
        }
    }

    /// Completed inputs of an MO grouped by session, with its buffered and
    /// rejected serials attached.
    #[instrument(skip(self))]
    pub async fn manufacturing_data(
        &self,
        mo_number: Option<&str>,
        completed_on: Option<NaiveDate>,
    ) -> Result<ManufacturingData, ServiceError> {
        let mo_number = required_mo(mo_number)?;

        let mut inputs: Vec<(ProductionLine, ProductionInput)> = Vec::new();
        let mut buffered = Vec::new();
        let mut rejected = Vec::new();
        for line in ProductionLine::all() {
            let rows = ProductionStore::new(line)
                .list_filtered(&*self.db, &self.completed_filter(mo_number, completed_on))
                .await?;
            inputs.extend(rows.into_iter().map(|r| (line, r)));
            for (kind, sink) in [
                (ExceptionKind::Buffer, &mut buffered),
                (ExceptionKind::Reject, &mut rejected),
            ] {
                let mut entries = ExceptionStore::new(line, kind)
                    .list_by_mo(&*self.db, mo_number)
                    .await?;
                entries.reverse();
                sink.extend(entries.into_iter().flat_map(|e| e.authenticity_numbers));
            }
        }
        inputs.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at));

        let mut sessions: Vec<SessionReport> = Vec::new();
        for (line, input) in inputs {
            let idx = match sessions.iter().position(|s| s.session == input.session_id) {
                Some(idx) => idx,
                None => {
                    sessions.push(SessionReport {
                        session: input.session_id.clone(),
                        leader: input.leader_name.clone(),
                        shift: input.shift_number.clone(),
                        mo_data: Vec::new(),
                    });
                    sessions.len() - 1
                }
            };
            sessions[idx].mo_data.push(MoData {
                mo_number: input.mo_number,
                sku_name: input.sku_name,
                pic: input.pic,
                production_type: line,
                completed_at: input.completed_at,
                authenticity_data: input.authenticity_data.into_iter().map(RangeView::from).collect(),
                buffered_auth: buffered.clone(),
                rejected_auth: rejected.clone(),
            });
        }

        Ok(ManufacturingData {
            mo_number: mo_number.to_string(),
            completed_at: completed_on
                .map(|d| d.to_string())
                .unwrap_or_else(|| "all".to_string()),
            total_sessions: sessions.len(),
            data: sessions,
        })
    }

    /// Production inputs across lines, newest first.
    pub async fn authenticity(
        &self,
        query: &AuthenticityQuery,
    ) -> Result<Vec<LineInput>, ServiceError> {
        let lines = lines_for(query.production_type.as_deref())?;
        let filter = ProductionFilter {
            mo_number: query
                .mo_number
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            status: status_filter(query.status.as_deref())?,
            created_from: query
                .start_date
                .map(|d| day_bounds(d, self.report_utc_offset_hours).0),
            created_to: query
                .end_date
                .map(|d| day_bounds(d, self.report_utc_offset_hours).1),
            ..ProductionFilter::default()
        };

        let mut all = Vec::new();
        for line in lines {
            let rows = ProductionStore::new(line)
                .list_filtered(&*self.db, &filter)
                .await?;
            all.extend(rows.into_iter().map(|input| LineInput {
                production_type: line,
                input,
            }));
        }
        all.sort_by(|a, b| b.input.created_at.cmp(&a.input.created_at));
        Ok(all)
    }

    /// MO numbers with inputs completed on a given day.
    /// Completed inputs of every line whose completion day (in the reporting
    /// offset) falls within `start..=end`, oldest first.
    #[instrument(skip(self))]
    pub async fn completed_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CompletedReport, ServiceError> {
        if end < start {
            return Err(ServiceError::ValidationError(
                "end_date must not be before start_date".to_string(),
            ));
        }
        let (from, _) = day_bounds(start, self.report_utc_offset_hours);
        let (_, to) = day_bounds(end, self.report_utc_offset_hours);
        let filter = ProductionFilter {
            status: Some(InputStatus::Completed),
            completed_from: Some(from),
            completed_to: Some(to),
            ..ProductionFilter::default()
        };

        let mut records = Vec::new();
        for line in ProductionLine::all() {
            let rows = ProductionStore::new(line)
                .list_filtered(&*self.db, &filter)
                .await?;
            records.extend(rows.into_iter().map(|r| CompletedRecord {
                mo_number: r.mo_number,
                sku_name: r.sku_name,
                pic: r.pic,
                leader_name: r.leader_name,
                shift_number: r.shift_number,
                session_id: r.session_id,
                production_type: line,
                completed_at: r.completed_at,
            }));
        }
        records.sort_by_key(|r| r.completed_at);

        Ok(CompletedReport {
            start_date: start,
            end_date: end,
            total_records: records.len(),
            records,
        })
    }

    pub async fn completed_on(&self, date: NaiveDate) -> Result<CompletedOnDate, ServiceError> {
        let (from, to) = day_bounds(date, self.report_utc_offset_hours);
        let filter = ProductionFilter {
            status: Some(InputStatus::Completed),
            completed_from: Some(from),
            completed_to: Some(to),
            ..ProductionFilter::default()
        };
        let mut mo_numbers = BTreeSet::new();
        for line in ProductionLine::all() {
            let rows = ProductionStore::new(line)
                .list_filtered(&*self.db, &filter)
                .await?;
            mo_numbers.extend(rows.into_iter().map(|r| r.mo_number));
        }
        Ok(CompletedOnDate {
            completed_at: date,
            total_mos: mo_numbers.len(),
            mo_numbers: mo_numbers.into_iter().collect(),
        })
    }
}
