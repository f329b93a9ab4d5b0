pub mod offer;
pub mod product;
pub mod status;
