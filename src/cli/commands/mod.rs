//! CLI command implementations

pub mod check;
pub mod cleanup;
pub mod config;
pub mod list;
pub mod status;
pub mod sync;
pub mod unlock;

pub use check::execute as check;
pub use cleanup::execute as cleanup;
pub use config::execute as config;
pub use list::execute as list;
pub use status::execute as status;
pub use sync::execute as sync;
pub use unlock::execute as unlock;

use crate::cli::args::TargetArgs;
use crate::error::{RmirrorError, RmirrorResult};
use crate::sync::SyncOrchestrator;

/// Cache key from `--key`, or derived from a target description
pub(crate) fn resolve_key(key: Option<String>, target: &TargetArgs) -> RmirrorResult<String> {
    match key {
        Some(key) if target.is_set() => Err(RmirrorError::InvalidRequest(format!(
            "--key {} cannot be combined with a target description",
            key
        ))),
        Some(key) => Ok(key),
        None if target.is_set() => {
            let request = target.request()?;
            if request.paths.is_empty() {
                return Err(RmirrorError::InvalidRequest(
                    "at least one --dir or --file is required".to_string(),
                ));
            }
            Ok(SyncOrchestrator::cache_key(&request))
        }
        None => Err(RmirrorError::InvalidRequest(
            "pass --key, or --host/--user with --dir or --file".to_string(),
        )),
    }
}
