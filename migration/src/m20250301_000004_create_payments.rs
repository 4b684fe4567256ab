use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250301_000001_create_users::User;
use super::m20250301_000003_create_bookings::{Booking, PaymentStatus};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(PaymentMethod::Enum)
                    .values([PaymentMethod::Khalti, PaymentMethod::Paypal])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Payment::Table)
                    .if_not_exists()
                    .col(uuid(Payment::Id).primary_key())
                    .col(uuid(Payment::BookingId).not_null())
                    .col(uuid(Payment::UserId).not_null())
                    .col(
                        ColumnDef::new(Payment::Method)
                            .custom(PaymentMethod::Enum)
                            .not_null(),
                    )
                    .col(string_len(Payment::GatewayReference, 255).not_null().unique_key())
                    .col(string_len_null(Payment::TransactionId, 255))
                    .col(double(Payment::Amount).not_null())
                    .col(string_len(Payment::Currency, 3).not_null())
                    .col(
                        ColumnDef::new(Payment::Status)
                            .custom(PaymentStatus::Enum)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        timestamp_with_time_zone(Payment::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Payment::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Payment::PaidAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_booking")
                            .from(Payment::Table, Payment::BookingId)
                            .to(Booking::Table, Booking::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_user")
                            .from(Payment::Table, Payment::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payment::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(PaymentMethod::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Payment {
    Table,
    Id,
    BookingId,
    UserId,
    Method,
    GatewayReference,
    TransactionId,
    Amount,
    Currency,
    Status,
    CreatedAt,
    UpdatedAt,
    PaidAt,
}

#[derive(DeriveIden)]
pub enum PaymentMethod {
    #[sea_orm(iden = "payment_method")]
    Enum,
    #[sea_orm(iden = "khalti")]
    Khalti,
    #[sea_orm(iden = "paypal")]
    Paypal,
}
