pub mod attendance;
pub mod classes;
pub mod core;
pub mod settings;
pub mod students;
