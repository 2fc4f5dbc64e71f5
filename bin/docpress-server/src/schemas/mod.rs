//! Request / response bodies exposed in the OpenAPI document.

pub mod convert;
pub mod health;
