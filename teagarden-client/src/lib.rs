//! Teagarden Client - Domain Store, Gateway and UI State
//!
//! The [`store::Store`] is the single authoritative cache of remote
//! entities. Every mutation is applied optimistically, recorded in an
//! operation ledger and committed or rolled back once the [`gateway`]
//! answers. [`app::App`] drives it from UI intents and keeps the transient
//! [`ui_state::UiState`] in step.

pub mod app;
pub mod config;
pub mod error;
pub mod gateway;
pub mod notifications;
pub mod persistence;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod ui_state;

pub use app::App;
pub use config::{ClientConfig, ConfigError, LogConfig, StoreConfig};
pub use error::{ClientError, ErrorKind, StoreError, StoreResult};
pub use gateway::{Created, Gateway, GatewayError, GatewayErrorKind, GatewayResult, RestGateway};
pub use persistence::{AuthToken, FileTokenStorage, MemoryTokenStorage, TokenStorage};
pub use store::Store;
