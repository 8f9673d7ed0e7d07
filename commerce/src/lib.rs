pub mod api;
pub mod cart;
pub mod checkout;
pub mod coupons;
pub mod error;
pub mod executable_utils;
pub mod gamification;
pub mod loyalty;
pub mod model;
pub mod products;
pub mod reports;
pub mod services;
pub mod status;
pub mod storage;
pub mod tracking;

#[cfg(test)]
mod test_fixtures;
