pub mod assignments;
pub mod draw;
pub mod height;
pub mod teams;

pub use assignments::{handle_assignments_command, AssignmentsArgs};
pub use draw::{handle_draw_command, DrawArgs};
pub use height::handle_height_command;
pub use teams::handle_teams_command;
