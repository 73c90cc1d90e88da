pub mod aggregate;

pub use aggregate::{ServiceError, VehicleService, WindowQuery};
