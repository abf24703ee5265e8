pub mod alerts;
pub mod fanout;
pub mod persistence;

pub use alerts::run_alert_processor;
pub use fanout::run_fanout_worker;
pub use persistence::run_persistence_worker;
