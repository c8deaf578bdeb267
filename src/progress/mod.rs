//! Client-visible task progress.
//!
//! | From            | Event        | To           | Notes                              |
//! |-----------------|--------------|--------------|------------------------------------|
//! | pending/processing | `connected` | processing | "Connected, waiting for progress" |
//! | pending/processing | `progress`  | processing | dropped if the percentage regresses |
//! | pending/processing | `completed` | completed  | 100%, navigation after 2s          |
//! | pending/processing | `error`     | failed     | backend message kept verbatim      |
//! | completed/failed   | any         | unchanged  |                                    |

mod machine;
mod state;

pub use machine::{
    Effect, NAVIGATION_DELAY, NavigationSignal, ProgressMachine, run_progress_machine,
};
pub use state::{
    DEFAULT_STEP_LABELS, Lifecycle, StepProgress, StepStatus, TaskProgressState, step_status,
};
