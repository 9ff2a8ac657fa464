// utils
pub mod error;
pub mod xml;

// caldav calendar-query
pub mod decoder;
pub mod types;
