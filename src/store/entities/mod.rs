pub mod batches;
pub mod config_kv;
pub mod definitions;
pub mod global_checks;
pub mod instances;
