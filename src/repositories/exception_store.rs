//! Per-line buffer and reject tables.

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Alias, Expr, Order, Query, SelectStatement, SimpleExpr},
    ConnectionTrait, DbErr, DeriveIden, FromQueryResult,
};
use tracing::warn;

use crate::models::{
    ExceptionEntry, ExceptionKind, NewExceptionEntry, ProductionLine, UpdateExceptionEntry,
};

#[derive(Debug, Clone, Copy, DeriveIden)]
pub enum ExceptionColumn {
    Id,
    SessionId,
    Pic,
    MoNumber,
    SkuName,
    AuthenticityNumbers,
    CreatedAt,
}

#[derive(Debug, FromQueryResult)]
struct ExceptionRow {
    id: i32,
    session_id: String,
    pic: String,
    mo_number: String,
    sku_name: String,
    authenticity_numbers: String,
    created_at: DateTime<Utc>,
}

impl From<ExceptionRow> for ExceptionEntry {
    fn from(row: ExceptionRow) -> Self {
        let authenticity_numbers = serde_json::from_str(&row.authenticity_numbers)
            .unwrap_or_else(|e| {
                warn!(id = row.id, error = %e, "unreadable authenticity_numbers, treating as empty");
                Vec::new()
            });
        Self {
            id: row.id,
            session_id: row.session_id,
            pic: row.pic,
            mo_number: row.mo_number,
            sku_name: row.sku_name,
            authenticity_numbers,
            created_at: row.created_at,
        }
    }
}

/// Data access for one line's buffer or reject table
#[derive(Debug, Clone, Copy)]
pub struct ExceptionStore {
    line: ProductionLine,
    kind: ExceptionKind,
}

impl ExceptionStore {
    pub fn new(line: ProductionLine, kind: ExceptionKind) -> Self {
        Self { line, kind }
    }

    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    fn table(&self) -> Alias {
        Alias::new(self.line.exception_table(self.kind))
    }

    fn select(&self) -> SelectStatement {
        Query::select()
            .columns([
                ExceptionColumn::Id,
                ExceptionColumn::SessionId,
                ExceptionColumn::Pic,
                ExceptionColumn::MoNumber,
                ExceptionColumn::SkuName,
                ExceptionColumn::AuthenticityNumbers,
                ExceptionColumn::CreatedAt,
            ])
            .from(self.table())
            .to_owned()
    }

    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry: &NewExceptionEntry,
        now: DateTime<Utc>,
    ) -> Result<i32, DbErr> {
        let numbers = serde_json::to_string(&entry.authenticity_numbers)
            .map_err(|e| DbErr::Custom(format!("failed to encode authenticity_numbers: {}", e)))?;

        let query = Query::insert()
            .into_table(self.table())
            .columns([
                ExceptionColumn::SessionId,
                ExceptionColumn::Pic,
                ExceptionColumn::MoNumber,
                ExceptionColumn::SkuName,
                ExceptionColumn::AuthenticityNumbers,
                ExceptionColumn::CreatedAt,
            ])
            .values([
                entry.session_id.clone().into(),
                entry.pic.clone().into(),
                entry.mo_number.clone().into(),
                entry.sku_name.clone().into(),
                numbers.into(),
                now.into(),
            ])
            .map_err(|e| DbErr::Custom(e.to_string()))?
            .returning_col(ExceptionColumn::Id)
            .to_owned();

        let row = conn
            .query_one(conn.get_database_backend().build(&query))
            .await?
            .ok_or_else(|| DbErr::Custom("insert returned no id".to_string()))?;
        row.try_get::<i32>("", "id")
    }

    pub async fn get<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
    ) -> Result<Option<ExceptionEntry>, DbErr> {
        let query = self
            .select()
            .and_where(Expr::col(ExceptionColumn::Id).eq(id))
            .to_owned();
        let row = ExceptionRow::find_by_statement(conn.get_database_backend().build(&query))
            .one(conn)
            .await?;
        Ok(row.map(ExceptionEntry::from))
    }

    /// Entries for an MO, newest first.
    pub async fn list_by_mo<C: ConnectionTrait>(
        &self,
        conn: &C,
        mo_number: &str,
    ) -> Result<Vec<ExceptionEntry>, DbErr> {
        let query = self
            .select()
            .and_where(Expr::col(ExceptionColumn::MoNumber).eq(mo_number))
            .order_by(ExceptionColumn::CreatedAt, Order::Desc)
            .order_by(ExceptionColumn::Id, Order::Desc)
            .to_owned();
        let rows = ExceptionRow::find_by_statement(conn.get_database_backend().build(&query))
            .all(conn)
            .await?;
        Ok(rows.into_iter().map(ExceptionEntry::from).collect())
    }

    /// Total number of serials recorded against an MO.
    pub async fn count_numbers<C: ConnectionTrait>(
        &self,
        conn: &C,
        mo_number: &str,
    ) -> Result<u64, DbErr> {
        let entries = self.list_by_mo(conn, mo_number).await?;
        Ok(entries
            .iter()
            .map(|e| e.authenticity_numbers.len() as u64)
            .sum())
    }

    pub async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        update: &UpdateExceptionEntry,
    ) -> Result<u64, DbErr> {
        let mut values: Vec<(ExceptionColumn, SimpleExpr)> = Vec::new();
        if let Some(pic) = &update.pic {
            values.push((ExceptionColumn::Pic, pic.clone().into()));
        }
        if let Some(mo) = &update.mo_number {
            values.push((ExceptionColumn::MoNumber, mo.clone().into()));
        }
        if let Some(sku) = &update.sku_name {
            values.push((ExceptionColumn::SkuName, sku.clone().into()));
        }
        if let Some(numbers) = &update.authenticity_numbers {
            let encoded = serde_json::to_string(numbers).map_err(|e| {
                DbErr::Custom(format!("failed to encode authenticity_numbers: {}", e))
            })?;
            values.push((ExceptionColumn::AuthenticityNumbers, encoded.into()));
        }
        if values.is_empty() {
            return Ok(0);
        }

        let query = Query::update()
            .table(self.table())
            .values(values)
            .and_where(Expr::col(ExceptionColumn::Id).eq(id))
            .to_owned();
        let res = conn.execute(conn.get_database_backend().build(&query)).await?;
        Ok(res.rows_affected())
    }
}
