// Library root
// -----------
// This crate signs a user in to Azure AD and drives the Power BI REST API
// with the resulting bearer token. The binary (`main.rs`) wires the
// modules into an interactive CLI.
//
// Module responsibilities:
// - `config`: TOML file plus `PBI_*` environment overrides.
// - `auth`: credential variants, token acquisition, token validation.
// - `client`: the authenticated request executor (GET / POST JSON).
// - `api`: workspace listing, dataset lookup/creation and row appends.
// - `model`: wire types for the REST API.
// - `error`: typed failures for each layer.
// - `ui`: terminal menus that call into the modules above.
//
// Everything below `ui` is usable without a terminal, which is how the
// integration tests drive it.
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod ui;
