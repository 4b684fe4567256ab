pub mod geo;
pub mod jwt;
pub mod otp;
pub mod password;
pub mod pricing;
pub mod slot;
pub mod upload;
pub mod validation;
