pub mod account;
pub mod instrument;
pub mod order_intent;
pub mod position;
