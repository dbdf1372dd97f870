pub mod commands;
pub mod surface;

pub use commands::LecternCli;
pub use commands::run;
