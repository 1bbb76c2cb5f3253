pub mod analyse;
pub mod classify;
pub mod config_cmd;
