pub mod agent;
pub mod capability;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod permission;
pub mod segments;
pub mod session;
pub mod tokens;
