pub mod entities;
pub mod schema;
pub mod seed;
pub mod store;
