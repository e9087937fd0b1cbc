pub mod cycle;
pub mod grade;
pub mod init;
pub mod level;
pub mod list_models;
pub mod progress;
pub mod report;
pub mod validate;
