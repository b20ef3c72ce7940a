//! Secure File Transfer Module
//!
//! Password-authenticated SSH connection with SFTP upload and download.

pub mod sftp;

pub use sftp::{SftpClient, TransferDirection, TransferTarget};
