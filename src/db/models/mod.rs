mod campaign;
mod points_history;
mod swap;
mod task;
mod user;
mod user_task;

pub use campaign::{Campaign, NewCampaign};
pub use points_history::PointsHistoryEntry;
pub use swap::SwapRecord;
pub use task::{NewTask, Task, TaskKind};
pub use user::User;
pub use user_task::UserTaskProgress;
