pub mod family;
pub mod ghost;
