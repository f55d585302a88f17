pub mod check;
pub mod list;
pub mod resolve;
pub mod sweep;
pub mod upload;
