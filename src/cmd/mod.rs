//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `watch`  | `Watch`          |
//! | `status` | `Status`         |
//! | `config` | `Config`         |

pub mod config;
pub mod status;
pub mod watch;

pub use config::cmd_config;
pub use status::cmd_status;
pub use watch::{WatchArgs, cmd_watch};

use std::sync::Arc;

use pulse::credentials::{
    ChainedCredentials, CredentialStore, EnvCredentials, FileCredentials, StaticCredentials,
};

/// Token lookup order: `--token`, `PULSE_TOKEN`, then the token file.
pub(crate) fn credentials(token: Option<String>) -> Arc<dyn CredentialStore> {
    let mut chain = ChainedCredentials::new()
        .with(StaticCredentials::new(token))
        .with(EnvCredentials::default());
    if let Some(path) = FileCredentials::default_path() {
        chain = chain.with(FileCredentials::new(path));
    }
    Arc::new(chain)
}
