//! Terminal output for rmirror commands
//!
//! Interactive terminals get `cliclack` styling and an `indicatif` transfer
//! bar; CI and `--format json` runs get plain, parseable output.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    format_age, intro, key_value, key_value_status, outro_success, outro_warn, print_json,
    remark, section, step_error_detail, step_info, step_ok, step_ok_detail, step_warn,
    step_warn_hint,
};
pub use progress::{TaskSpinner, TransferBar};
pub use prompts::confirm;
