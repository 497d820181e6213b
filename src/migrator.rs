use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_suppliers_table::Migration),
            Box::new(m20240301_000002_create_products_table::Migration),
            Box::new(m20240301_000003_create_inventory_orders_table::Migration),
            Box::new(m20240301_000004_create_inventory_order_items_table::Migration),
            Box::new(m20240301_000005_create_supplier_returns_table::Migration),
            Box::new(m20240301_000006_create_supplier_return_items_table::Migration),
            Box::new(m20240301_000007_create_users_table::Migration),
            Box::new(m20240301_000008_create_document_counters_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_suppliers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_suppliers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Suppliers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::ContactName).string().null())
                        .col(ColumnDef::new(Suppliers::Email).string().null())
                        .col(ColumnDef::new(Suppliers::Phone).string().null())
                        .col(ColumnDef::new(Suppliers::Address).string().null())
                        .col(ColumnDef::new(Suppliers::PaymentTerms).string().null())
                        .col(
                            ColumnDef::new(Suppliers::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::UpdatedAt)
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
                        .name("idx_suppliers_name")
                        .table(Suppliers::Table)
                        .col(Suppliers::Name)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_suppliers_active")
                        .table(Suppliers::Table)
                        .col(Suppliers::Active)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
        Name,
        ContactName,
        Email,
        Phone,
        Address,
        PaymentTerms,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::Sku).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).string().null())
                        .col(
                            ColumnDef::new(Products::CostPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::SalePrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::MinStockLevel)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
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
                        .name("idx_products_sku")
                        .table(Products::Table)
                        .col(Products::Sku)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_name")
                        .table(Products::Table)
                        .col(Products::Name)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Sku,
        Name,
        Description,
        CostPrice,
        SalePrice,
        StockQuantity,
        MinStockLevel,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_inventory_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_inventory_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::OrderNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::SupplierId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(InventoryOrders::OrderDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::ExpectedDeliveryDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::TaxRate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::TaxAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::InvoiceNumber)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::InvoiceDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryOrders::Notes).string().null())
                        .col(
                            ColumnDef::new(InventoryOrders::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_orders_supplier_id")
                                .from(InventoryOrders::Table, InventoryOrders::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_orders_supplier_id")
                        .table(InventoryOrders::Table)
                        .col(InventoryOrders::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_orders_status")
                        .table(InventoryOrders::Table)
                        .col(InventoryOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_orders_order_number")
                        .table(InventoryOrders::Table)
                        .col(InventoryOrders::OrderNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_orders_created_at")
                        .table(InventoryOrders::Table)
                        .col(InventoryOrders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryOrders {
        Table,
        Id,
        OrderNumber,
        SupplierId,
        Status,
        OrderDate,
        ExpectedDeliveryDate,
        Subtotal,
        TaxRate,
        TaxAmount,
        TotalAmount,
        InvoiceNumber,
        InvoiceDate,
        Notes,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
    }
}

mod m20240301_000004_create_inventory_order_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_inventory_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrderItems::OrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrderItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrderItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrderItems::ReceivedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryOrderItems::UnitCost)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrderItems::LineTotal)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryOrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_order_items_order_id")
                                .from(InventoryOrderItems::Table, InventoryOrderItems::OrderId)
                                .to(InventoryOrders::Table, InventoryOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_order_items_product_id")
                                .from(InventoryOrderItems::Table, InventoryOrderItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_order_items_order_id")
                        .table(InventoryOrderItems::Table)
                        .col(InventoryOrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_order_items_product_id")
                        .table(InventoryOrderItems::Table)
                        .col(InventoryOrderItems::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryOrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryOrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        ReceivedQuantity,
        UnitCost,
        LineTotal,
        CreatedAt,
        UpdatedAt,
    }

    use super::m20240301_000003_create_inventory_orders_table::InventoryOrders;

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
    }
}

mod m20240301_000005_create_supplier_returns_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_supplier_returns_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupplierReturns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplierReturns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturns::ReturnNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturns::SupplierId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplierReturns::OrderId).uuid().null())
                        .col(ColumnDef::new(SupplierReturns::Status).string().not_null())
                        .col(ColumnDef::new(SupplierReturns::Reason).string().not_null())
                        .col(
                            ColumnDef::new(SupplierReturns::ItemCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplierReturns::TotalQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplierReturns::TotalValue)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplierReturns::CreditAmount)
                                .decimal()
                                .null(),
                        )
                        .col(ColumnDef::new(SupplierReturns::Notes).string().null())
                        .col(
                            ColumnDef::new(SupplierReturns::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturns::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_returns_supplier_id")
                                .from(SupplierReturns::Table, SupplierReturns::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_returns_order_id")
                                .from(SupplierReturns::Table, SupplierReturns::OrderId)
                                .to(InventoryOrders::Table, InventoryOrders::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_returns_supplier_id")
                        .table(SupplierReturns::Table)
                        .col(SupplierReturns::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_returns_status")
                        .table(SupplierReturns::Table)
                        .col(SupplierReturns::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_returns_return_number")
                        .table(SupplierReturns::Table)
                        .col(SupplierReturns::ReturnNumber)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SupplierReturns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SupplierReturns {
        Table,
        Id,
        ReturnNumber,
        SupplierId,
        OrderId,
        Status,
        Reason,
        ItemCount,
        TotalQuantity,
        TotalValue,
        CreditAmount,
        Notes,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    use super::m20240301_000003_create_inventory_orders_table::InventoryOrders;

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
    }
}

mod m20240301_000006_create_supplier_return_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_supplier_return_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupplierReturnItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplierReturnItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::ReturnId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::AcceptedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::UnitCost)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::ConditionNotes)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierReturnItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_return_items_return_id")
                                .from(SupplierReturnItems::Table, SupplierReturnItems::ReturnId)
                                .to(SupplierReturns::Table, SupplierReturns::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_return_items_product_id")
                                .from(SupplierReturnItems::Table, SupplierReturnItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_return_items_return_id")
                        .table(SupplierReturnItems::Table)
                        .col(SupplierReturnItems::ReturnId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_return_items_product_id")
                        .table(SupplierReturnItems::Table)
                        .col(SupplierReturnItems::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SupplierReturnItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SupplierReturnItems {
        Table,
        Id,
        ReturnId,
        ProductId,
        Quantity,
        AcceptedQuantity,
        UnitCost,
        Status,
        ConditionNotes,
        CreatedAt,
        UpdatedAt,
    }

    use super::m20240301_000005_create_supplier_returns_table::SupplierReturns;

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
    }
}

mod m20240301_000007_create_users_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Username).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null())
                        .col(ColumnDef::new(Users::PasswordHash).text().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(
                            ColumnDef::new(Users::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
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
                        .name("idx_users_username")
                        .table(Users::Table)
                        .col(Users::Username)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Username,
        Email,
        PasswordHash,
        Role,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000008_create_document_counters_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000008_create_document_counters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DocumentCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DocumentCounters::DocType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DocumentCounters::Year).integer().not_null())
                        .col(
                            ColumnDef::new(DocumentCounters::LastValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .primary_key(
                            Index::create()
                                .col(DocumentCounters::DocType)
                                .col(DocumentCounters::Year),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DocumentCounters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DocumentCounters {
        Table,
        DocType,
        Year,
        LastValue,
    }
}
