pub mod paths;
pub mod profiles;
