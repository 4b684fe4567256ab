pub mod booking;
pub mod dashboard;
pub mod payment;
pub mod review;
pub mod user;
pub mod venue;
