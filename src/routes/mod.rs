pub mod applications;
pub mod auth_routes;
pub mod bookings;
pub mod dev;
pub mod tasks;
pub mod users;
