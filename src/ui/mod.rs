//! Terminal output for pcache commands
//!
//! Interactive terminals get `cliclack` styling and `indicatif` bars;
//! pipes and CI get plain prefixed lines, so command output stays
//! grep-friendly.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    format_bytes, intro, key_value, outro_success, step_info, step_ok, step_ok_detail, step_warn,
    step_warn_hint,
};
pub use progress::WarmProgress;
pub use prompts::confirm;
