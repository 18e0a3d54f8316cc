mod cache;
mod connection;
mod helpers;
mod migrations;
mod visits;

pub use cache::VisitCache;
