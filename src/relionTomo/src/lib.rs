
pub mod error;
pub mod logging;
pub mod config;
pub mod commands;

pub mod schema;
pub mod star;
pub mod scale;
pub mod geometry;
pub mod metadata;
pub mod dose;
pub mod mrc;

pub mod writers;
pub mod readers;
pub mod compare;
pub mod projector;

pub mod dispatch;
pub mod steps;
