//! Operations that span several stores or carry side effects beyond
//! persistence (realtime pushes, loyalty awards, metrics).

pub mod auth;
pub mod cart;
pub mod delivery;
pub mod gamification;
pub mod orders;

pub use auth::{AuthFailure, AuthService, Claims};
pub use cart::CartService;
pub use delivery::{DeliveryService, DeliveryStats, LocationReport};
pub use gamification::{GamificationService, GamificationStats, MyBadges};
pub use orders::{CheckoutRequest, OrderService, OrderTimeline};
