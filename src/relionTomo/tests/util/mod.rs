
#![allow(dead_code)]

pub mod cmd;
pub mod work_dir;
pub mod fixtures;
pub mod fake_relion;
