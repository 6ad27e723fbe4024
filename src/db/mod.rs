mod database;

pub use database::connect;
