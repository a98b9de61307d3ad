pub mod meteomatics;
pub mod open_meteo;
pub mod registry;
