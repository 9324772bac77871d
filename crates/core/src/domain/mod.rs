pub mod prestation;
pub mod proposal;
pub mod reminder;
