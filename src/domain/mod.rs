pub mod capability;
pub mod dispatch;
pub mod permission;
pub mod recipient;
pub mod segment;
pub mod template;
pub mod token;
