pub mod config;
pub mod controller;
pub mod gateway;
pub mod records;
pub mod repository;
pub mod view_model;
