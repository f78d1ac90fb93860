//! Per-line production input tables.
//!
//! The three lines share one schema but live in separate tables, so queries
//! are built with `sea_query` against an aliased table name instead of a
//! static entity. Every method takes the connection explicitly so it can run
//! inside a caller-owned transaction.

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Alias, Expr, Order, Query, SelectStatement, SimpleExpr},
    ConnectionTrait, DbErr, DeriveIden, FromQueryResult, Statement,
};
use std::str::FromStr;
use tracing::warn;

use crate::models::{
    AuthenticityRange, InputStatus, NewProductionInput, ProductionInput, ProductionLine,
    UpdateProductionInput,
};

#[derive(Debug, Clone, Copy, DeriveIden)]
pub enum ProductionColumn {
    Id,
    SessionId,
    LeaderName,
    ShiftNumber,
    Pic,
    MoNumber,
    SkuName,
    AuthenticityData,
    Status,
    CreatedAt,
    CompletedAt,
}

const ALL_COLUMNS: [ProductionColumn; 11] = [
    ProductionColumn::Id,
    ProductionColumn::SessionId,
    ProductionColumn::LeaderName,
    ProductionColumn::ShiftNumber,
    ProductionColumn::Pic,
    ProductionColumn::MoNumber,
    ProductionColumn::SkuName,
    ProductionColumn::AuthenticityData,
    ProductionColumn::Status,
    ProductionColumn::CreatedAt,
    ProductionColumn::CompletedAt,
];

#[derive(Debug, FromQueryResult)]
struct ProductionRow {
    id: i32,
    session_id: String,
    leader_name: String,
    shift_number: String,
    pic: String,
    mo_number: String,
    sku_name: String,
    authenticity_data: String,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ProductionRow> for ProductionInput {
    fn from(row: ProductionRow) -> Self {
        let authenticity_data: Vec<AuthenticityRange> =
            serde_json::from_str(&row.authenticity_data).unwrap_or_else(|e| {
                warn!(id = row.id, error = %e, "unreadable authenticity_data, treating as empty");
                Vec::new()
            });
        let status = InputStatus::from_str(&row.status).unwrap_or_else(|_| {
            warn!(id = row.id, status = %row.status, "unknown input status, treating as active");
            InputStatus::Active
        });

        Self {
            id: row.id,
            session_id: row.session_id,
            leader_name: row.leader_name,
            shift_number: row.shift_number,
            pic: row.pic,
            mo_number: row.mo_number,
            sku_name: row.sku_name,
            authenticity_data,
            status,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

/// Optional filters for listing inputs
#[derive(Debug, Clone, Default)]
pub struct ProductionFilter {
    pub mo_number: Option<String>,
    pub status: Option<InputStatus>,
    /// Substring match
    pub pic: Option<String>,
    pub leader_name: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub completed_from: Option<DateTime<Utc>>,
    pub completed_to: Option<DateTime<Utc>>,
}

impl ProductionFilter {
    pub fn for_mo(mo_number: impl Into<String>) -> Self {
        Self {
            mo_number: Some(mo_number.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: InputStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn apply(&self, query: &mut SelectStatement) {
        if let Some(mo) = &self.mo_number {
            query.and_where(Expr::col(ProductionColumn::MoNumber).eq(mo.as_str()));
        }
        if let Some(status) = self.status {
            query.and_where(Expr::col(ProductionColumn::Status).eq(status.as_ref()));
        }
        if let Some(pic) = &self.pic {
            query.and_where(Expr::col(ProductionColumn::Pic).like(format!("%{}%", pic)));
        }
        if let Some(leader) = &self.leader_name {
            query.and_where(Expr::col(ProductionColumn::LeaderName).eq(leader.as_str()));
        }
        if let Some(from) = self.created_from {
            query.and_where(Expr::col(ProductionColumn::CreatedAt).gte(from));
        }
        if let Some(to) = self.created_to {
            query.and_where(Expr::col(ProductionColumn::CreatedAt).lt(to));
        }
        if let Some(from) = self.completed_from {
            query.and_where(Expr::col(ProductionColumn::CompletedAt).gte(from));
        }
        if let Some(to) = self.completed_to {
            query.and_where(Expr::col(ProductionColumn::CompletedAt).lt(to));
        }
    }
}

/// Data access for one line's production table
#[derive(Debug, Clone, Copy)]
pub struct ProductionStore {
    line: ProductionLine,
}

impl ProductionStore {
    pub fn new(line: ProductionLine) -> Self {
        Self { line }
    }

    pub fn line(&self) -> ProductionLine {
        self.line
    }

    fn table(&self) -> Alias {
        Alias::new(self.line.production_table())
    }

    fn select(&self) -> SelectStatement {
        Query::select()
            .columns(ALL_COLUMNS)
            .from(self.table())
            .to_owned()
    }

    async fn fetch_all<C: ConnectionTrait>(
        &self,
        conn: &C,
        query: &SelectStatement,
    ) -> Result<Vec<ProductionInput>, DbErr> {
        let stmt = conn.get_database_backend().build(query);
        let rows = ProductionRow::find_by_statement(stmt).all(conn).await?;
        Ok(rows.into_iter().map(ProductionInput::from).collect())
    }

    async fn fetch_one<C: ConnectionTrait>(
        &self,
        conn: &C,
        query: &SelectStatement,
    ) -> Result<Option<ProductionInput>, DbErr> {
        let stmt = conn.get_database_backend().build(query);
        let row = ProductionRow::find_by_statement(stmt).one(conn).await?;
        Ok(row.map(ProductionInput::from))
    }

    /// Inserts a new input with status `active` and returns its id.
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &NewProductionInput,
        now: DateTime<Utc>,
    ) -> Result<i32, DbErr> {
        let data = serde_json::to_string(&input.authenticity_data)
            .map_err(|e| DbErr::Custom(format!("failed to encode authenticity_data: {}", e)))?;

        let query = Query::insert()
            .into_table(self.table())
            .columns([
                ProductionColumn::SessionId,
                ProductionColumn::LeaderName,
                ProductionColumn::ShiftNumber,
                ProductionColumn::Pic,
                ProductionColumn::MoNumber,
                ProductionColumn::SkuName,
                ProductionColumn::AuthenticityData,
                ProductionColumn::Status,
                ProductionColumn::CreatedAt,
            ])
            .values([
                input.session_id.clone().into(),
                input.leader_name.clone().into(),
                input.shift_number.clone().into(),
                input.pic.clone().into(),
                input.mo_number.clone().into(),
                input.sku_name.clone().into(),
                data.into(),
                InputStatus::Active.as_ref().into(),
                now.into(),
            ])
            .map_err(|e| DbErr::Custom(e.to_string()))?
            .returning_col(ProductionColumn::Id)
            .to_owned();

        let stmt = conn.get_database_backend().build(&query);
        let row = conn
            .query_one(stmt)
            .await?
            .ok_or_else(|| DbErr::Custom("insert returned no id".to_string()))?;
        row.try_get::<i32>("", "id")
    }

    pub async fn get<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
    ) -> Result<Option<ProductionInput>, DbErr> {
        let query = self
            .select()
            .and_where(Expr::col(ProductionColumn::Id).eq(id))
            .to_owned();
        self.fetch_one(conn, &query).await
    }

    /// All inputs of the line, newest first.
    pub async fn list<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<ProductionInput>, DbErr> {
        self.list_filtered(conn, &ProductionFilter::default()).await
    }

    pub async fn list_filtered<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &ProductionFilter,
    ) -> Result<Vec<ProductionInput>, DbErr> {
        let mut query = self.select();
        filter.apply(&mut query);
        query
            .order_by(ProductionColumn::CreatedAt, Order::Desc)
            .order_by(ProductionColumn::Id, Order::Desc);
        self.fetch_all(conn, &query).await
    }

    /// Inputs for an MO in submission order.
    pub async fn list_by_mo<C: ConnectionTrait>(
        &self,
        conn: &C,
        mo_number: &str,
        status: Option<InputStatus>,
    ) -> Result<Vec<ProductionInput>, DbErr> {
        let mut query = self
            .select()
            .and_where(Expr::col(ProductionColumn::MoNumber).eq(mo_number))
            .to_owned();
        if let Some(status) = status {
            query.and_where(Expr::col(ProductionColumn::Status).eq(status.as_ref()));
        }
        query
            .order_by(ProductionColumn::CreatedAt, Order::Asc)
            .order_by(ProductionColumn::Id, Order::Asc);
        self.fetch_all(conn, &query).await
    }

    pub async fn count_by_status<C: ConnectionTrait>(
        &self,
        conn: &C,
        mo_number: &str,
        status: InputStatus,
    ) -> Result<u64, DbErr> {
        let query = Query::select()
            .expr_as(Expr::cust("COUNT(*)"), Alias::new("count"))
            .from(self.table())
            .and_where(Expr::col(ProductionColumn::MoNumber).eq(mo_number))
            .and_where(Expr::col(ProductionColumn::Status).eq(status.as_ref()))
            .to_owned();
        let stmt = conn.get_database_backend().build(&query);
        let count = match conn.query_one(stmt).await? {
            Some(row) => row.try_get::<i64>("", "count")?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    pub async fn count_active<C: ConnectionTrait>(
        &self,
        conn: &C,
        mo_number: &str,
    ) -> Result<u64, DbErr> {
        self.count_by_status(conn, mo_number, InputStatus::Active)
            .await
    }

    /// Flips every active row of the MO to completed.
    pub async fn mark_completed<C: ConnectionTrait>(
        &self,
        conn: &C,
        mo_number: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let query = Query::update()
            .table(self.table())
            .values([
                (ProductionColumn::Status, InputStatus::Completed.as_ref().into()),
                (ProductionColumn::CompletedAt, now.into()),
            ])
            .and_where(Expr::col(ProductionColumn::MoNumber).eq(mo_number))
            .and_where(Expr::col(ProductionColumn::Status).eq(InputStatus::Active.as_ref()))
            .to_owned();
        let res = conn.execute(conn.get_database_backend().build(&query)).await?;
        Ok(res.rows_affected())
    }

    /// Puts every completed row of the MO back to active and clears `completed_at`.
    pub async fn revert_completed<C: ConnectionTrait>(
        &self,
        conn: &C,
        mo_number: &str,
    ) -> Result<u64, DbErr> {
        let query = Query::update()
            .table(self.table())
            .values([
                (ProductionColumn::Status, InputStatus::Active.as_ref().into()),
                (
                    ProductionColumn::CompletedAt,
                    Option::<DateTime<Utc>>::None.into(),
                ),
            ])
            .and_where(Expr::col(ProductionColumn::MoNumber).eq(mo_number))
            .and_where(Expr::col(ProductionColumn::Status).eq(InputStatus::Completed.as_ref()))
            .to_owned();
        let res = conn.execute(conn.get_database_backend().build(&query)).await?;
        Ok(res.rows_affected())
    }

    /// Sets the status of a single row. `completed_at` follows the status.
    pub async fn set_status<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        status: InputStatus,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let completed_at = match status {
            InputStatus::Completed => Some(now),
            InputStatus::Active => None,
        };
        let query = Query::update()
            .table(self.table())
            .values([
                (ProductionColumn::Status, status.as_ref().into()),
                (ProductionColumn::CompletedAt, completed_at.into()),
            ])
            .and_where(Expr::col(ProductionColumn::Id).eq(id))
            .to_owned();
        let res = conn.execute(conn.get_database_backend().build(&query)).await?;
        Ok(res.rows_affected())
    }

    /// Applies the editable fields of `update`. Returns the number of rows changed.
    pub async fn update_fields<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
        update: &UpdateProductionInput,
    ) -> Result<u64, DbErr> {
        let mut values: Vec<(ProductionColumn, SimpleExpr)> = Vec::new();
        if let Some(pic) = &update.pic {
            values.push((ProductionColumn::Pic, pic.clone().into()));
        }
        if let Some(mo) = &update.mo_number {
            values.push((ProductionColumn::MoNumber, mo.clone().into()));
        }
        if let Some(sku) = &update.sku_name {
            values.push((ProductionColumn::SkuName, sku.clone().into()));
        }
        if let Some(data) = &update.authenticity_data {
            let encoded = serde_json::to_string(data).map_err(|e| {
                DbErr::Custom(format!("failed to encode authenticity_data: {}", e))
            })?;
            values.push((ProductionColumn::AuthenticityData, encoded.into()));
        }
        if values.is_empty() {
            return Ok(0);
        }

        let query = Query::update()
            .table(self.table())
            .values(values)
            .and_where(Expr::col(ProductionColumn::Id).eq(id))
            .to_owned();
        let res = conn.execute(conn.get_database_backend().build(&query)).await?;
        Ok(res.rows_affected())
    }

    /// Most recently completed row of the MO.
    pub async fn latest_completed<C: ConnectionTrait>(
        &self,
        conn: &C,
        mo_number: &str,
    ) -> Result<Option<ProductionInput>, DbErr> {
        let query = self
            .select()
            .and_where(Expr::col(ProductionColumn::MoNumber).eq(mo_number))
            .and_where(Expr::col(ProductionColumn::Status).eq(InputStatus::Completed.as_ref()))
            .order_by(ProductionColumn::CompletedAt, Order::Desc)
            .order_by(ProductionColumn::Id, Order::Desc)
            .limit(1)
            .to_owned();
        self.fetch_one(conn, &query).await
    }

    /// Distinct leader names that recorded input on this line.
    pub async fn leaders<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<String>, DbErr> {
        let query = Query::select()
            .distinct()
            .column(ProductionColumn::LeaderName)
            .from(self.table())
            .order_by(ProductionColumn::LeaderName, Order::Asc)
            .to_owned();
        let rows = conn.query_all(conn.get_database_backend().build(&query)).await?;
        rows.iter()
            .map(|row| row.try_get::<String>("", "leader_name"))
            .collect()
    }
}

/// Takes the transaction-scoped advisory lock for an MO on PostgreSQL. Other
/// backends serialize through the database's own write lock.
pub async fn lock_mo<C: ConnectionTrait>(conn: &C, mo_number: &str) -> Result<(), DbErr> {
    if conn.get_database_backend() == sea_orm::DbBackend::Postgres {
        conn.execute(Statement::from_sql_and_values(
            sea_orm::DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            [mo_number.into()],
        ))
        .await?;
    }
    Ok(())
}
