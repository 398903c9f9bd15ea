pub mod lifecycle;
pub mod results;
pub mod send;
pub mod spawn;
pub mod status;
