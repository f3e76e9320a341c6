//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `db`     | `InitDb`         |
//! | `config` | `Config`         |

pub mod config;
pub mod db;
pub mod serve;

pub use config::{cmd_config_init, cmd_config_show, cmd_config_validate};
pub use db::cmd_init_db;
pub use serve::cmd_serve;
