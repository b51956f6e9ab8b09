//! Polaris Core
//!
//! Resource model, provider abstraction and collection helpers shared by the
//! Polaris provider and its command line front end

pub mod differ;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod wait;
