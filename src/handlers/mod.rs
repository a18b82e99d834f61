pub mod login;
pub mod register;
pub mod static_files;
