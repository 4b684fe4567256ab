use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250301_000001_create_users::User;
use super::m20250301_000002_create_venues::Venue;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(BookingStatus::Enum)
                    .values([
                        BookingStatus::Pending,
                        BookingStatus::Confirmed,
                        BookingStatus::Cancelled,
                        BookingStatus::Completed,
                    ])
                    .to_owned(),
            )
            .await?;

        // Shared by booking.payment_status and payment.status
        manager
            .create_type(
                Type::create()
                    .as_enum(PaymentStatus::Enum)
                    .values([
                        PaymentStatus::Pending,
                        PaymentStatus::Paid,
                        PaymentStatus::Failed,
                        PaymentStatus::Refunded,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Booking::Table)
                    .if_not_exists()
                    .col(uuid(Booking::Id).primary_key())
                    .col(uuid(Booking::UserId).not_null())
                    .col(uuid(Booking::VenueId).not_null())
                    .col(date(Booking::Date).not_null())
                    .col(string_len(Booking::StartTime, 5).not_null())
                    .col(string_len(Booking::EndTime, 5).not_null())
                    .col(double(Booking::TotalPrice).not_null())
                    .col(
                        ColumnDef::new(Booking::Status)
                            .custom(BookingStatus::Enum)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Booking::PaymentStatus)
                            .custom(PaymentStatus::Enum)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        timestamp_with_time_zone(Booking::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_user")
                            .from(Booking::Table, Booking::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_venue")
                            .from(Booking::Table, Booking::VenueId)
                            .to(Venue::Table, Venue::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_booking_venue_date")
                    .table(Booking::Table)
                    .col(Booking::VenueId)
                    .col(Booking::Date)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Booking::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(PaymentStatus::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(BookingStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Booking {
    Table,
    Id,
    UserId,
    VenueId,
    Date,
    StartTime,
    EndTime,
    TotalPrice,
    Status,
    PaymentStatus,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum BookingStatus {
    #[sea_orm(iden = "booking_status")]
    Enum,
    #[sea_orm(iden = "pending")]
    Pending,
    #[sea_orm(iden = "confirmed")]
    Confirmed,
    #[sea_orm(iden = "cancelled")]
    Cancelled,
    #[sea_orm(iden = "completed")]
    Completed,
}

#[derive(DeriveIden)]
pub enum PaymentStatus {
    #[sea_orm(iden = "payment_status")]
    Enum,
    #[sea_orm(iden = "pending")]
    Pending,
    #[sea_orm(iden = "paid")]
    Paid,
    #[sea_orm(iden = "failed")]
    Failed,
    #[sea_orm(iden = "refunded")]
    Refunded,
}
