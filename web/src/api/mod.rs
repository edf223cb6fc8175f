pub mod admin;
pub mod price;
pub mod recover;
