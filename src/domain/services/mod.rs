pub mod indicator_engine;
pub mod indicators;
pub mod market_window;
pub mod mode;
pub mod orchestrator;
pub mod risk_sizer;
pub mod scheduler;
pub mod signal_scorer;
