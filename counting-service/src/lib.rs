//! counting-service: generates counting exercises for young learners.
//!
//! A language model writes a counting sentence, an image model draws it, the
//! image is kept per user in MongoDB and a vision model counts the objects.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
