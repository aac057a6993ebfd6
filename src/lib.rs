//! Segment selection and overlap resolution for a SponsorBlock-compatible
//! skip-segments API.

pub mod cache;
pub mod config;
pub mod error;
pub mod grouping;
pub mod hashing;
pub mod models;
pub mod params;
pub mod repository;
pub mod reputation;
pub mod routes;
pub mod selection;
pub mod service;
pub mod shadow_hide;
pub mod state;
pub mod structs;
