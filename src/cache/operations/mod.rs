pub mod family;
pub mod geofence;
pub mod ghost;
pub mod location;
