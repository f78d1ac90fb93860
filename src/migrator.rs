use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_production_tables::Migration),
            Box::new(m20240101_000002_create_mo_cache_table::Migration),
            Box::new(m20240101_000003_create_admin_config_table::Migration),
            Box::new(m20240101_000004_create_manufacturing_identity_table::Migration),
            Box::new(m20240101_000005_create_pic_list_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_production_tables {

    use crate::models::{ExceptionKind, ProductionLine};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_production_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for line in ProductionLine::all() {
                let table = line.production_table();
                manager
                    .create_table(
                        Table::create()
                            .table(Alias::new(table))
                            .if_not_exists()
                            .col(
                                ColumnDef::new(Production::Id)
                                    .integer()
                                    .not_null()
                                    .auto_increment()
                                    .primary_key(),
                            )
                            .col(ColumnDef::new(Production::SessionId).string().not_null())
                            .col(ColumnDef::new(Production::LeaderName).string().not_null())
                            .col(ColumnDef::new(Production::ShiftNumber).string().not_null())
                            .col(ColumnDef::new(Production::Pic).string().not_null())
                            .col(ColumnDef::new(Production::MoNumber).string().not_null())
                            .col(ColumnDef::new(Production::SkuName).string().not_null())
                            .col(ColumnDef::new(Production::AuthenticityData).text().not_null())
                            .col(
                                ColumnDef::new(Production::Status)
                                    .string()
                                    .not_null()
                                    .default("active"),
                            )
                            .col(
                                ColumnDef::new(Production::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null()
                                    .default(Expr::current_timestamp()),
                            )
                            .col(
                                ColumnDef::new(Production::CompletedAt)
                                    .timestamp_with_time_zone()
                                    .null(),
                            )
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(&format!("idx_{}_mo_status", table))
                            .table(Alias::new(table))
                            .col(Production::MoNumber)
                            .col(Production::Status)
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(&format!("idx_{}_session", table))
                            .table(Alias::new(table))
                            .col(Production::SessionId)
                            .to_owned(),
                    )
                    .await?;

                for kind in [ExceptionKind::Buffer, ExceptionKind::Reject] {
                    let exception_table = line.exception_table(kind);
                    manager
                        .create_table(
                            Table::create()
                                .table(Alias::new(exception_table))
                                .if_not_exists()
                                .col(
                                    ColumnDef::new(Exception::Id)
                                        .integer()
                                        .not_null()
                                        .auto_increment()
                                        .primary_key(),
                                )
                                .col(ColumnDef::new(Exception::SessionId).string().not_null())
                                .col(ColumnDef::new(Exception::Pic).string().not_null())
                                .col(ColumnDef::new(Exception::MoNumber).string().not_null())
                                .col(ColumnDef::new(Exception::SkuName).string().not_null())
                                .col(
                                    ColumnDef::new(Exception::AuthenticityNumbers)
                                        .text()
                                        .not_null(),
                                )
                                .col(
                                    ColumnDef::new(Exception::CreatedAt)
                                        .timestamp_with_time_zone()
                                        .not_null()
                                        .default(Expr::current_timestamp()),
                                )
                                .to_owned(),
                        )
                        .await?;

                    manager
                        .create_index(
                            Index::create()
                                .if_not_exists()
                                .name(&format!("idx_{}_mo", exception_table))
                                .table(Alias::new(exception_table))
                                .col(Exception::MoNumber)
                                .to_owned(),
                        )
                        .await?;
                }
            }
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for line in ProductionLine::all() {
                for kind in [ExceptionKind::Buffer, ExceptionKind::Reject] {
                    manager
                        .drop_table(
                            Table::drop()
                                .table(Alias::new(line.exception_table(kind)))
                                .if_exists()
                                .to_owned(),
                        )
                        .await?;
                }
                manager
                    .drop_table(
                        Table::drop()
                            .table(Alias::new(line.production_table()))
                            .if_exists()
                            .to_owned(),
                    )
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Production {
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

    #[derive(DeriveIden)]
    enum Exception {
        Id,
        SessionId,
        Pic,
        MoNumber,
        SkuName,
        AuthenticityNumbers,
        CreatedAt,
    }
}

mod m20240101_000002_create_mo_cache_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_mo_cache_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OdooMoCache::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OdooMoCache::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(OdooMoCache::MoNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(OdooMoCache::SkuName).string().not_null())
                        .col(
                            ColumnDef::new(OdooMoCache::Quantity)
                                .double()
                                .not_null()
                                .default(0.0),
                        )
                        .col(ColumnDef::new(OdooMoCache::Uom).string().null())
                        .col(ColumnDef::new(OdooMoCache::Note).text().null())
                        .col(
                            ColumnDef::new(OdooMoCache::CreateDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OdooMoCache::FetchedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OdooMoCache::LastUpdated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_odoo_mo_cache_create_date")
                        .table(OdooMoCache::Table)
                        .col(OdooMoCache::CreateDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OdooMoCache::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OdooMoCache {
        Table,
        Id,
        MoNumber,
        SkuName,
        Quantity,
        Uom,
        Note,
        CreateDate,
        FetchedAt,
        LastUpdated,
    }
}

mod m20240101_000003_create_admin_config_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_admin_config_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AdminConfig::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AdminConfig::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(AdminConfig::ConfigKey)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(AdminConfig::ConfigValue).text().not_null())
                        .col(
                            ColumnDef::new(AdminConfig::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AdminConfig::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AdminConfig {
        Table,
        Id,
        ConfigKey,
        ConfigValue,
        UpdatedAt,
    }
}

mod m20240101_000004_create_manufacturing_identity_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_manufacturing_identity_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ManufacturingIdentity::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ManufacturingIdentity::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingIdentity::ManufacturingId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ManufacturingIdentity::Sku).string().not_null())
                        .col(
                            ColumnDef::new(ManufacturingIdentity::SkuName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingIdentity::TargetQty)
                                .double()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ManufacturingIdentity::DoneQty).double().null())
                        .col(
                            ColumnDef::new(ManufacturingIdentity::LeaderName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingIdentity::FinishedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingIdentity::Status)
                                .string()
                                .not_null()
                                .default("active"),
                        )
                        .col(
                            ColumnDef::new(ManufacturingIdentity::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingIdentity::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_manufacturing_identity_mid")
                        .table(ManufacturingIdentity::Table)
                        .col(ManufacturingIdentity::ManufacturingId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ManufacturingIdentity::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ManufacturingIdentity {
        Table,
        Id,
        ManufacturingId,
        Sku,
        SkuName,
        TargetQty,
        DoneQty,
        LeaderName,
        FinishedAt,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_pic_list_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_pic_list_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PicList::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PicList::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(PicList::Name).string().not_null().unique_key())
                        .col(
                            ColumnDef::new(PicList::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(PicList::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PicList::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PicList::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PicList {
        Table,
        Id,
        Name,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}
