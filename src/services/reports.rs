//! Read-side views over the per-line tables: leader statistics, the
//! production report, per-MO summaries and usage checks.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    db::DbPool,
    errors::ServiceError,
    models::{
        compute_yield, net_production, ExceptionKind, InputStatus, ProductionInput,
        ProductionLine,
    },
    repositories::{ExceptionStore, ProductionFilter, ProductionStore},
};

/// Lines selected by a `type` parameter. Missing or `all` selects every line.
pub fn lines_for(production_type: Option<&str>) -> Result<Vec<ProductionLine>, ServiceError> {
    match production_type.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(ProductionLine::all()),
        Some(t) if t.eq_ignore_ascii_case("all") => Ok(ProductionLine::all()),
        Some(t) => ProductionLine::from_str(t)
            .map(|line| vec![line])
            .map_err(|_| ServiceError::ValidationError("Invalid production type".to_string())),
    }
}

/// Parses an optional `active`/`completed` filter. `all` means no filter.
pub fn status_filter(status: Option<&str>) -> Result<Option<InputStatus>, ServiceError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => InputStatus::from_str(&s.to_lowercase())
            .map(Some)
            .map_err(|_| {
                ServiceError::ValidationError(
                    "Invalid status. Must be 'active' or 'completed'".to_string(),
                )
            }),
    }
}

/// UTC instants bounding a calendar day at the reporting offset, end exclusive.
pub fn day_bounds(date: NaiveDate, utc_offset_hours: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
    let midnight = date.and_time(NaiveTime::default());
    let start = offset
        .from_local_datetime(&midnight)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));
    (start, start + Duration::days(1))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub leader: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeaderStats {
    pub leader_name: String,
    pub total_inputs: u64,
    pub unique_mos: u64,
    pub unique_sessions: u64,
    pub completed_inputs: u64,
    pub active_inputs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(rename = "type")]
    pub production_type: Option<String>,
    pub mo_number: Option<String>,
    pub pic: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// One report line: an input with its first range flattened out
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub id: i32,
    pub production_type: ProductionLine,
    pub pic_input: String,
    pub sku_name: String,
    pub mo_number: String,
    pub roll: Option<String>,
    pub first_authenticity_id: Option<String>,
    pub last_authenticity_id: Option<String>,
    pub yield_qty: u64,
    pub leader_name: String,
    pub shift_number: String,
    pub status: InputStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReportRow {
    fn new(line: ProductionLine, input: ProductionInput) -> Self {
        let first = input.authenticity_data.first();
        Self {
            id: input.id,
            production_type: line,
            pic_input: input.pic.clone(),
            sku_name: input.sku_name.clone(),
            mo_number: input.mo_number.clone(),
            roll: first.map(|r| r.roll_number.clone()),
            first_authenticity_id: first.map(|r| r.first_authenticity.clone()),
            last_authenticity_id: first.map(|r| r.last_authenticity.clone()),
            yield_qty: compute_yield(&input.authenticity_data),
            leader_name: input.leader_name,
            shift_number: input.shift_number,
            status: input.status,
            created_at: input.created_at,
            completed_at: input.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPage {
    pub total: usize,
    pub limit: Option<u64>,
    pub offset: u64,
    pub data: Vec<ReportRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineSummary {
    pub line: Option<ProductionLine>,
    pub active_inputs: u64,
    pub completed_inputs: u64,
    pub gross_yield: u64,
    pub reject_count: u64,
    pub buffer_count: u64,
    pub net_production: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoSummary {
    pub mo_number: String,
    pub total: LineSummary,
    pub lines: Vec<LineSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoUsage {
    pub used: bool,
    pub count: usize,
    pub active_count: usize,
    pub completed_count: usize,
    pub records: Vec<ProductionInput>,
}

#[derive(Clone)]
pub struct ReportService {
    db: Arc<DbPool>,
    report_utc_offset_hours: i32,
}

impl ReportService {
    pub fn new(db: Arc<DbPool>, report_utc_offset_hours: i32) -> Self {
        Self {
            db,
            report_utc_offset_hours,
        }
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.report_utc_offset_hours
    }

    fn created_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (
            from.map(|d| day_bounds(d, self.report_utc_offset_hours).0),
            to.map(|d| day_bounds(d, self.report_utc_offset_hours).1),
        )
    }

    /// Inputs from several lines, newest first.
    async fn collect(
        &self,
        lines: &[ProductionLine],
        filter: &ProductionFilter,
    ) -> Result<Vec<(ProductionLine, ProductionInput)>, ServiceError> {
        let mut all = Vec::new();
        for line in lines {
            let rows = ProductionStore::new(*line)
                .list_filtered(&*self.db, filter)
                .await?;
            all.extend(rows.into_iter().map(|r| (*line, r)));
        }
        all.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        Ok(all)
    }

    /// Input counts per leader across all lines, busiest first.
    #[instrument(skip(self))]
    pub async fn production_by_leader(
        &self,
        query: &LeaderQuery,
    ) -> Result<Vec<LeaderStats>, ServiceError> {
        let (created_from, created_to) = self.created_range(query.start_date, query.end_date);
        let filter = ProductionFilter {
            leader_name: query
                .leader
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            created_from,
            created_to,
            ..ProductionFilter::default()
        };
        let inputs = self.collect(&ProductionLine::all(), &filter).await?;

        let mut by_leader: BTreeMap<String, (LeaderStats, HashSet<String>, HashSet<String>)> =
            BTreeMap::new();
        for (_, input) in inputs {
            let entry = by_leader
                .entry(input.leader_name.clone())
                .or_insert_with(|| {
                    (
                        LeaderStats {
                            leader_name: input.leader_name.clone(),
                            ..LeaderStats::default()
                        },
                        HashSet::new(),
                        HashSet::new(),
                    )
                });
            entry.0.total_inputs += 1;
            match input.status {
                InputStatus::Active => entry.0.active_inputs += 1,
                InputStatus::Completed => entry.0.completed_inputs += 1,
            }
            entry.1.insert(input.mo_number);
            entry.2.insert(input.session_id);
        }

        let mut stats: Vec<LeaderStats> = by_leader
            .into_values()
            .map(|(mut s, mos, sessions)| {
                s.unique_mos = mos.len() as u64;
                s.unique_sessions = sessions.len() as u64;
                s
            })
            .collect();
        stats.sort_by(|a, b| b.total_inputs.cmp(&a.total_inputs));
        Ok(stats)
    }

    /// Distinct leader names across all lines, alphabetical.
    pub async fn leaders(&self) -> Result<Vec<String>, ServiceError> {
        let mut names = Vec::new();
        for line in ProductionLine::all() {
            names.extend(ProductionStore::new(line).leaders(&*self.db).await?);
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    #[instrument(skip(self))]
    pub async fn production_report(&self, query: &ReportQuery) -> Result<ReportPage, ServiceError> {
        let lines = lines_for(query.production_type.as_deref())?;
        let (created_from, created_to) = self.created_range(query.date_from, query.date_to);
        let filter = ProductionFilter {
            mo_number: query
                .mo_number
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            status: status_filter(query.status.as_deref())?,
            pic: query
                .pic
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            created_from,
            created_to,
            ..ProductionFilter::default()
        };
        let rows = self.collect(&lines, &filter).await?;
        let total = rows.len();
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.filter(|l| *l > 0);

        let page: Vec<ReportRow> = match limit {
            Some(limit) => rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|(line, input)| ReportRow::new(line, input))
                .collect(),
            None => rows
                .into_iter()
                .map(|(line, input)| ReportRow::new(line, input))
                .collect(),
        };
        Ok(ReportPage {
            total,
            limit,
            offset: if limit.is_some() { offset } else { 0 },
            data: page,
        })
    }

    /// Gross yield, rejects, buffers and net output for one MO.
    #[instrument(skip(self))]
    pub async fn mo_summary(
        &self,
        mo_number: &str,
        line: Option<ProductionLine>,
    ) -> Result<MoSummary, ServiceError> {
        let mo_number = mo_number.trim();
        if mo_number.is_empty() {
            return Err(ServiceError::ValidationError(
                "mo_number is required".to_string(),
            ));
        }
        let lines = line.map(|l| vec![l]).unwrap_or_else(ProductionLine::all);

        let mut per_line = Vec::with_capacity(lines.len());
        for line in lines {
            let inputs = ProductionStore::new(line)
                .list_by_mo(&*self.db, mo_number, None)
                .await?;
            let reject_count = ExceptionStore::new(line, ExceptionKind::Reject)
                .count_numbers(&*self.db, mo_number)
                .await?;
            let buffer_count = ExceptionStore::new(line, ExceptionKind::Buffer)
                .count_numbers(&*self.db, mo_number)
                .await?;
            let gross_yield = inputs
                .iter()
                .map(|i| compute_yield(&i.authenticity_data))
                .fold(0u64, u64::saturating_add);
            let completed = inputs
                .iter()
                .filter(|i| i.status == InputStatus::Completed)
                .count() as u64;
            per_line.push(LineSummary {
                line: Some(line),
                active_inputs: inputs.len() as u64 - completed,
                completed_inputs: completed,
                gross_yield,
                reject_count,
                buffer_count,
                net_production: net_production(gross_yield, reject_count, buffer_count),
            });
        }

        let mut total = per_line.iter().fold(LineSummary::default(), |mut acc, l| {
            acc.active_inputs += l.active_inputs;
            acc.completed_inputs += l.completed_inputs;
            acc.gross_yield = acc.gross_yield.saturating_add(l.gross_yield);
            acc.reject_count = acc.reject_count.saturating_add(l.reject_count);
            acc.buffer_count = acc.buffer_count.saturating_add(l.buffer_count);
            acc
        });
        total.net_production =
            net_production(total.gross_yield, total.reject_count, total.buffer_count);

        Ok(MoSummary {
            mo_number: mo_number.to_string(),
            total,
            lines: per_line,
        })
    }

    /// Whether an MO already has inputs on a line.
    pub async fn mo_usage(
        &self,
        line: ProductionLine,
        mo_number: &str,
    ) -> Result<MoUsage, ServiceError> {
        if mo_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "mo_number is required".to_string(),
            ));
        }
        let records = ProductionStore::new(line)
            .list_filtered(&*self.db, &ProductionFilter::for_mo(mo_number.trim()))
            .await?;
        let active_count = records
            .iter()
            .filter(|r| r.status == InputStatus::Active)
            .count();
        Ok(MoUsage {
            used: !records.is_empty(),
            count: records.len(),
            active_count,
            completed_count: records.len() - active_count,
            records,
        })
    }
}
