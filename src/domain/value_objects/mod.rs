pub mod confidence;
pub mod price;
pub mod quantity;
