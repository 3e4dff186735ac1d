//! REST API tests

mod health_tests;
mod room_tests;
mod user_tests;
