use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::utils::pricing::Discount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "venue_status")]
#[serde(rename_all = "lowercase")]
pub enum VenueStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "venue")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub price_per_hour: f64,
    pub opening_time: String,
    pub closing_time: String,
    pub venue_type: String,
    pub status: VenueStatus,
    pub image: Option<String>,
    pub discount_percentage: Option<f64>,
    pub discount_valid_from: Option<Date>,
    pub discount_valid_until: Option<Date>,
    pub avg_rating: f64,
    pub review_count: i32,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// The venue's discount, if all three discount columns are set
    pub fn discount(&self) -> Option<Discount> {
        Some(Discount {
            percentage: self.discount_percentage?,
            valid_from: self.discount_valid_from?,
            valid_until: self.discount_valid_until?,
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::VendorId",
        to = "super::user::Column::Id"
    )]
    Vendor,
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vendor.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
