// server/src/lib.rs

//! souk: a multi-vendor marketplace API. Catalog, carts, orders and
//! payment reconciliation on actix-web, with the multi-step writes run as
//! `souk_flow` sagas.

pub mod config;
pub mod errors;
pub mod models;
pub mod sagas;
pub mod services;
pub mod state;
pub mod store;
pub mod validation;
pub mod web;
