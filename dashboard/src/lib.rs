pub mod client;
pub mod model;
pub mod range;
pub mod view;
