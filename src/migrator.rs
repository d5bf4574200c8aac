use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_pens_table::Migration),
            Box::new(m20240301_000002_create_cattle_lots_table::Migration),
            Box::new(m20240301_000003_create_allocation_tables::Migration),
            Box::new(m20240301_000004_create_cost_and_record_tables::Migration),
        ]
    }
}

mod m20240301_000001_create_pens_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_pens_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Pens::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Pens::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Pens::PenNumber)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Pens::Capacity).integer().not_null())
                        .col(
                            ColumnDef::new(Pens::OccupiedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Pens::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Pens::PenType).string_len(20).not_null())
                        .col(ColumnDef::new(Pens::Location).string().null())
                        .col(
                            ColumnDef::new(Pens::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Pens::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Pens::UpdatedAt)
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
                        .name("idx_pens_status")
                        .table(Pens::Table)
                        .col(Pens::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Pens::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Pens {
        Table,
        Id,
        PenNumber,
        Capacity,
        OccupiedQuantity,
        Status,
        PenType,
        Location,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_cattle_lots_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_cattle_lots_table"
        }
    }

    fn money(col: CattleLots) -> ColumnDef {
        ColumnDef::new(col)
            .decimal_len(16, 2)
            .not_null()
            .default(0)
            .to_owned()
    }

    fn counter(col: CattleLots) -> ColumnDef {
        ColumnDef::new(col).integer().not_null().default(0).to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CattleLots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CattleLots::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CattleLots::LotCode)
                                .string_len(20)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CattleLots::EntryQuantity).integer().not_null())
                        .col(
                            ColumnDef::new(CattleLots::CurrentQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(counter(CattleLots::DeathCount))
                        .col(counter(CattleLots::SoldQuantity))
                        .col(counter(CattleLots::AllocatedQuantity))
                        .col(
                            ColumnDef::new(CattleLots::EntryWeight)
                                .decimal_len(16, 3)
                                .not_null(),
                        )
                        .col(money(CattleLots::AcquisitionCost))
                        .col(money(CattleLots::FeedCost))
                        .col(money(CattleLots::HealthCost))
                        .col(money(CattleLots::OperationalCost))
                        .col(money(CattleLots::FreightCost))
                        .col(money(CattleLots::OtherCosts))
                        .col(money(CattleLots::TotalCost))
                        .col(
                            ColumnDef::new(CattleLots::EntryDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CattleLots::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(CattleLots::Status).string_len(20).not_null())
                        .col(ColumnDef::new(CattleLots::VendorName).string().null())
                        .col(ColumnDef::new(CattleLots::Notes).text().null())
                        .col(
                            ColumnDef::new(CattleLots::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CattleLots::UpdatedAt)
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
                        .name("idx_cattle_lots_status")
                        .table(CattleLots::Table)
                        .col(CattleLots::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CattleLots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum CattleLots {
        Table,
        Id,
        LotCode,
        EntryQuantity,
        CurrentQuantity,
        DeathCount,
        SoldQuantity,
        AllocatedQuantity,
        EntryWeight,
        AcquisitionCost,
        FeedCost,
        HealthCost,
        OperationalCost,
        FreightCost,
        OtherCosts,
        TotalCost,
        EntryDate,
        ReceivedAt,
        Status,
        VendorName,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_allocation_tables {
    use super::m20240301_000001_create_pens_table::Pens;
    use super::m20240301_000002_create_cattle_lots_table::CattleLots;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_allocation_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LotPenAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LotPenAllocations::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(LotPenAllocations::LotId).uuid().not_null())
                        .col(ColumnDef::new(LotPenAllocations::PenId).uuid().not_null())
                        .col(
                            ColumnDef::new(LotPenAllocations::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotPenAllocations::PercentageOfLot)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotPenAllocations::PercentageOfPen)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotPenAllocations::AllocationDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotPenAllocations::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotPenAllocations::RemovalDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(LotPenAllocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_lot_pen_allocations_lot")
                                .from(LotPenAllocations::Table, LotPenAllocations::LotId)
                                .to(CattleLots::Table, CattleLots::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_lot_pen_allocations_pen")
                                .from(LotPenAllocations::Table, LotPenAllocations::PenId)
                                .to(Pens::Table, Pens::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_lot_pen_allocations_pen_status")
                        .table(LotPenAllocations::Table)
                        .col(LotPenAllocations::PenId)
                        .col(LotPenAllocations::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_lot_pen_allocations_lot_status")
                        .table(LotPenAllocations::Table)
                        .col(LotPenAllocations::LotId)
                        .col(LotPenAllocations::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LotMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LotMovements::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(LotMovements::LotId).uuid().not_null())
                        .col(ColumnDef::new(LotMovements::FromPenId).uuid().null())
                        .col(ColumnDef::new(LotMovements::ToPenId).uuid().null())
                        .col(
                            ColumnDef::new(LotMovements::MovementType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(LotMovements::Quantity).integer().not_null())
                        .col(ColumnDef::new(LotMovements::Reason).string().not_null())
                        .col(ColumnDef::new(LotMovements::UserId).string().not_null())
                        .col(
                            ColumnDef::new(LotMovements::MovementDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_lot_movements_lot")
                                .from(LotMovements::Table, LotMovements::LotId)
                                .to(CattleLots::Table, CattleLots::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_lot_movements_lot_id")
                        .table(LotMovements::Table)
                        .col(LotMovements::LotId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LotMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(LotPenAllocations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum LotPenAllocations {
        Table,
        Id,
        LotId,
        PenId,
        Quantity,
        PercentageOfLot,
        PercentageOfPen,
        AllocationDate,
        Status,
        RemovalDate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum LotMovements {
        Table,
        Id,
        LotId,
        FromPenId,
        ToPenId,
        MovementType,
        Quantity,
        Reason,
        UserId,
        MovementDate,
    }
}

mod m20240301_000004_create_cost_and_record_tables {
    use super::m20240301_000002_create_cattle_lots_table::CattleLots;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_cost_and_record_tables"
        }
    }

    fn lot_fk(
        name: &str,
        table: impl IntoIden + 'static,
        column: impl IntoIden + 'static,
    ) -> ForeignKeyCreateStatement {
        ForeignKey::create()
            .name(name)
            .from_tbl(table)
            .from_col(column)
            .to(CattleLots::Table, CattleLots::Id)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CostPostings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CostPostings::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CostPostings::BatchId).uuid().not_null())
                        .col(ColumnDef::new(CostPostings::LotId).uuid().not_null())
                        .col(ColumnDef::new(CostPostings::PenId).uuid().null())
                        .col(ColumnDef::new(CostPostings::Target).string_len(20).not_null())
                        .col(
                            ColumnDef::new(CostPostings::Category)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CostPostings::Amount)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CostPostings::Percentage)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(CostPostings::Description).string().null())
                        .col(ColumnDef::new(CostPostings::PostedBy).string().not_null())
                        .col(
                            ColumnDef::new(CostPostings::PostedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut lot_fk(
                            "fk_cost_postings_lot",
                            CostPostings::Table,
                            CostPostings::LotId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cost_postings_lot_id")
                        .table(CostPostings::Table)
                        .col(CostPostings::LotId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WeightReadings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WeightReadings::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(WeightReadings::LotId).uuid().not_null())
                        .col(
                            ColumnDef::new(WeightReadings::TotalWeight)
                                .decimal_len(16, 3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WeightReadings::AnimalCount)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WeightReadings::ReadingDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WeightReadings::Notes).string().null())
                        .col(ColumnDef::new(WeightReadings::RecordedBy).string().not_null())
                        .col(
                            ColumnDef::new(WeightReadings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut lot_fk(
                            "fk_weight_readings_lot",
                            WeightReadings::Table,
                            WeightReadings::LotId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SaleRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaleRecords::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SaleRecords::LotId).uuid().not_null())
                        .col(ColumnDef::new(SaleRecords::PenId).uuid().null())
                        .col(ColumnDef::new(SaleRecords::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(SaleRecords::TotalWeight)
                                .decimal_len(16, 3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleRecords::PricePerArroba)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleRecords::TotalValue)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleRecords::BuyerName).string().null())
                        .col(
                            ColumnDef::new(SaleRecords::SaleDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleRecords::RecordedBy).string().not_null())
                        .foreign_key(&mut lot_fk(
                            "fk_sale_records_lot",
                            SaleRecords::Table,
                            SaleRecords::LotId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(NonCashExpenses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(NonCashExpenses::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(NonCashExpenses::LotId).uuid().not_null())
                        .col(
                            ColumnDef::new(NonCashExpenses::ExpenseType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(NonCashExpenses::Quantity).integer().null())
                        .col(
                            ColumnDef::new(NonCashExpenses::TotalValue)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NonCashExpenses::Description)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NonCashExpenses::RecordedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut lot_fk(
                            "fk_non_cash_expenses_lot",
                            NonCashExpenses::Table,
                            NonCashExpenses::LotId,
                        ))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                NonCashExpenses::Table.into_iden(),
                SaleRecords::Table.into_iden(),
                WeightReadings::Table.into_iden(),
                CostPostings::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum CostPostings {
        Table,
        Id,
        BatchId,
        LotId,
        PenId,
        Target,
        Category,
        Amount,
        Percentage,
        Description,
        PostedBy,
        PostedAt,
    }

    #[derive(DeriveIden)]
    enum WeightReadings {
        Table,
        Id,
        LotId,
        TotalWeight,
        AnimalCount,
        ReadingDate,
        Notes,
        RecordedBy,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum SaleRecords {
        Table,
        Id,
        LotId,
        PenId,
        Quantity,
        TotalWeight,
        PricePerArroba,
        TotalValue,
        BuyerName,
        SaleDate,
        RecordedBy,
    }

    #[derive(DeriveIden)]
    enum NonCashExpenses {
        Table,
        Id,
        LotId,
        ExpenseType,
        Quantity,
        TotalValue,
        Description,
        RecordedAt,
    }
}

/// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
