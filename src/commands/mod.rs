pub mod closure;
pub mod merge;
pub mod status;
pub mod verify;
