pub mod forecast_request;
pub mod location;
pub mod payload;
pub mod record;
