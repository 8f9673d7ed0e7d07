pub mod helpers;

pub mod auth_tests;
pub mod cart_tests;
pub mod catalog_tests;
pub mod coupon_tests;
pub mod delivery_tests;
pub mod failure_tests;
pub mod gamification_tests;
pub mod order_tests;
pub mod report_tests;
