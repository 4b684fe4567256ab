use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250301_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(VenueStatus::Enum)
                    .values([
                        VenueStatus::Active,
                        VenueStatus::Inactive,
                        VenueStatus::Maintenance,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Venue::Table)
                    .if_not_exists()
                    .col(uuid(Venue::Id).primary_key())
                    .col(uuid(Venue::VendorId).not_null())
                    .col(string_len(Venue::Name, 150).not_null())
                    .col(string_len(Venue::LocationName, 255).not_null())
                    .col(double(Venue::Latitude).not_null())
                    .col(double(Venue::Longitude).not_null())
                    .col(double(Venue::PricePerHour).not_null())
                    .col(string_len(Venue::OpeningTime, 5).not_null())
                    .col(string_len(Venue::ClosingTime, 5).not_null())
                    .col(string_len(Venue::VenueType, 50).not_null())
                    .col(
                        ColumnDef::new(Venue::Status)
                            .custom(VenueStatus::Enum)
                            .not_null()
                            .default("active"),
                    )
                    .col(string_len_null(Venue::Image, 255))
                    .col(double_null(Venue::DiscountPercentage))
                    .col(date_null(Venue::DiscountValidFrom))
                    .col(date_null(Venue::DiscountValidUntil))
                    .col(double(Venue::AvgRating).not_null().default(0.0))
                    .col(integer(Venue::ReviewCount).not_null().default(0))
                    .col(
                        timestamp_with_time_zone(Venue::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_venue_vendor")
                            .from(Venue::Table, Venue::VendorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Venue::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(VenueStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Venue {
    Table,
    Id,
    VendorId,
    Name,
    LocationName,
    Latitude,
    Longitude,
    PricePerHour,
    OpeningTime,
    ClosingTime,
    VenueType,
    Status,
    Image,
    DiscountPercentage,
    DiscountValidFrom,
    DiscountValidUntil,
    AvgRating,
    ReviewCount,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum VenueStatus {
    #[sea_orm(iden = "venue_status")]
    Enum,
    #[sea_orm(iden = "active")]
    Active,
    #[sea_orm(iden = "inactive")]
    Inactive,
    #[sea_orm(iden = "maintenance")]
    Maintenance,
}
