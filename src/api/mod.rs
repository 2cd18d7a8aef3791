pub mod prediction_api;
pub mod result_ledger;
