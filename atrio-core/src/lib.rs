pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod ipc;
pub mod models;
pub mod relay;

pub use config::AtrioConfig;
pub use error::AtrioError;
pub use import::{parse_contacts, Contact, ImportReport};
pub use relay::{
    EndpointResolver, RelayAttempt, RelayClient, RelayEndpoint, RelayError, RelayOutcome,
    RelaySettings, StaticResolver,
};
