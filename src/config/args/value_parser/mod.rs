pub mod duration;
pub mod file_exist;
pub mod human_bytes;
pub mod url;
