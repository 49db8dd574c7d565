pub mod cue;
pub mod cue_list_player;
pub mod executor;
pub mod task_registry;
pub mod transition;

pub use cue::{Cue, CueId, CueList, CueStep};
pub use cue_list_player::CueListPlayer;
pub use executor::{CueExecutor, ExecutionStatus, ExecutorSettings};
pub use task_registry::{TaskKey, TaskRegistry};
pub use transition::{Transition, TransitionRunner};
