pub mod app;
pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod layout;
pub mod nifti;
pub mod output;
pub mod scans;
pub mod sidecar;
