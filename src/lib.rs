pub mod camera;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod exercise;
pub mod guide;
pub mod pose;
pub mod render;
pub mod session;
pub mod worker;
