pub mod currency;
pub mod loader;
pub mod observation;
pub mod outcome;
pub mod trade;
