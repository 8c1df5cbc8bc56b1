pub mod api;
pub mod map;
