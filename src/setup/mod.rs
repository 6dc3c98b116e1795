pub mod init;
pub mod init_types;
