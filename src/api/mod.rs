pub mod admin;
pub mod auth;
pub mod credits;
pub mod images;
pub mod referrals;
pub mod tasks;
