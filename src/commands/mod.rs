pub mod init;
pub mod profile;
pub mod serve;
pub mod task;
pub mod token;
