//! PlantKeeper backend: owned plants, species care data, watering schedules,
//! ad telemetry and daily KPIs behind an authenticated JSON API.

pub mod api;
pub mod care;
pub mod config;
pub mod db;
pub mod dto;
pub mod kpi;
pub mod prom_metrics;
