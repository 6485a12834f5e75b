//! HTTP API
//!
//! - **analyze** - `POST /analyze`
//! - **photo** - `GET /proxy-photo/*reference`
//! - **health** - `GET /health`, `GET /debug`
//! - **ui** - `GET /` and its script

pub mod analyze;
pub mod health;
pub mod photo;
pub mod ui;

pub use analyze::analyze_routes;
pub use health::health_routes;
pub use photo::photo_routes;
pub use ui::ui_routes;
